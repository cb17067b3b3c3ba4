//! Loading [`IngestConfig`] from TOML.
//!
//! Missing keys fall back to their defaults, so a file only needs to name
//! the limits it changes:
//!
//! ```toml
//! max_file_size = 10485760
//! honor_prj = false
//! ```

use std::path::Path;

use carbon_map_ingest_models::IngestConfig;

/// Errors from loading an ingest configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but is unusable.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Parses a TOML document into an [`IngestConfig`].
///
/// # Errors
///
/// * If the document is not valid TOML or has mistyped values
/// * If a limit is zero or a span is not a positive number
pub fn parse_config(toml_str: &str) -> Result<IngestConfig, ConfigError> {
    let config: IngestConfig = toml::de::from_str(toml_str)?;

    if config.max_file_size == 0 {
        return Err(ConfigError::Invalid("max_file_size must be positive".to_string()));
    }
    if config.progress_interval == 0 {
        return Err(ConfigError::Invalid(
            "progress_interval must be positive".to_string(),
        ));
    }
    if !(config.max_lng_span > 0.0 && config.max_lat_span > 0.0) {
        return Err(ConfigError::Invalid(format!(
            "spans must be positive (lng {}, lat {})",
            config.max_lng_span, config.max_lat_span
        )));
    }

    Ok(config)
}

/// Reads and parses an ingest configuration file.
///
/// # Errors
///
/// * If the file cannot be read
/// * If its contents fail [`parse_config`]
pub fn load_config(path: &Path) -> Result<IngestConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config = parse_config(&contents)?;
    log::debug!("Loaded ingest config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use carbon_map_ingest_models::config::{DEFAULT_MAX_FILE_SIZE, DEFAULT_PROGRESS_INTERVAL};

    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(parse_config("").unwrap(), IngestConfig::default());
    }

    #[test]
    fn overrides_named_keys_only() {
        let config = parse_config("max_file_size = 1024\nmax_lng_span = 20.0\n").unwrap();
        assert_eq!(config.max_file_size, 1024);
        assert!((config.max_lng_span - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.progress_interval, DEFAULT_PROGRESS_INTERVAL);
        assert!(config.honor_prj);
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(matches!(
            parse_config("max_file_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("progress_interval = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("max_lat_span = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_mistyped_values() {
        assert!(matches!(
            parse_config("max_file_size = \"big\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("carbon_map_ingest_missing_config.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
        assert_eq!(IngestConfig::default().max_file_size, DEFAULT_MAX_FILE_SIZE);
    }
}
