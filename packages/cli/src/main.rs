#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the upload ingestion pipeline.
//!
//! Ingests a `GeoJSON`, KML, KMZ or zipped shapefile from disk and writes
//! the canonical WGS84 `FeatureCollection`, reports layer bounds, or lists
//! the accepted formats.

use std::{
    fmt::Write as _,
    io::IsTerminal as _,
    path::{Path, PathBuf},
};

use carbon_map_cli_utils::{IndicatifStatus, MultiProgress};
use carbon_map_ingest::{
    IngestError,
    config::{ConfigError, load_config},
    status::LogStatus,
};
use carbon_map_ingest_models::{
    ACCEPTED_EXTENSIONS, FileFormat, IngestedLayer, config::IngestConfig,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "carbon_map", about = "Geospatial upload ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file and write the normalized `GeoJSON` layer
    Ingest {
        /// Path to a .geojson, .json, .kml, .kmz or zipped shapefile
        file: PathBuf,

        /// Write the `FeatureCollection` here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// TOML file with ingestion limits
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the maximum upload size, in megabytes
        #[arg(long)]
        max_size_mb: Option<u64>,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Ingest a file and print its bounds as `[[west, south], [east, north]]`
    Bounds {
        /// Path to the file to inspect
        file: PathBuf,

        /// TOML file with ingestion limits
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the accepted upload formats
    Formats {
        /// TOML file with ingestion limits
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = carbon_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            file,
            output,
            config,
            max_size_mb,
            pretty,
        } => {
            let config = resolve_config(config.as_deref(), max_size_mb)?;
            let layer = ingest_file(&multi, &file, &config).await?;

            let json = if pretty {
                serde_json::to_string_pretty(&layer.collection)?
            } else {
                serde_json::to_string(&layer.collection)?
            };

            if let Some(path) = output {
                tokio::fs::write(&path, json).await?;
                log::info!(
                    "Wrote {} features to {}",
                    layer.feature_count(),
                    path.display()
                );
            } else {
                println!("{json}");
            }
        }
        Commands::Bounds { file, config } => {
            let config = resolve_config(config.as_deref(), None)?;
            let layer = ingest_file(&multi, &file, &config).await?;
            println!("{}", serde_json::to_string(&layer.bounds.as_array())?);
        }
        Commands::Formats { config } => {
            let config = resolve_config(config.as_deref(), None)?;
            print!("{}", formats_table(&config));
        }
    }

    Ok(())
}

/// Loads the config file if given, then applies command-line overrides.
fn resolve_config(
    path: Option<&Path>,
    max_size_mb: Option<u64>,
) -> Result<IngestConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => IngestConfig::default(),
    };

    if let Some(mb) = max_size_mb {
        if mb == 0 {
            return Err(ConfigError::Invalid(
                "--max-size-mb must be greater than zero".to_string(),
            ));
        }
        config.max_file_size = mb.saturating_mul(1024 * 1024);
    }

    Ok(config)
}

/// Renders the `formats` listing.
fn formats_table(config: &IngestConfig) -> String {
    let mut out = format!("{:<12} EXTENSIONS\n", "FORMAT");
    for format in FileFormat::ALL {
        let _ = writeln!(
            out,
            "{:<12} {}",
            format.display_name(),
            format.extensions().join(", ")
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Accepted extensions: {}", ACCEPTED_EXTENSIONS.join(" "));
    let _ = writeln!(out, "Maximum upload size: {}MB", config.max_file_size_mb());
    out
}

fn summary(layer: &IngestedLayer) -> String {
    format!(
        "{}: {} features ({} dropped)",
        layer.file_name,
        layer.feature_count(),
        layer.dropped_features
    )
}

/// Ingests `file`, showing a spinner on a terminal and plain log lines
/// otherwise.
async fn ingest_file(
    multi: &MultiProgress,
    file: &Path,
    config: &IngestConfig,
) -> Result<IngestedLayer, Box<dyn std::error::Error>> {
    let result = if std::io::stderr().is_terminal() {
        ingest_with_spinner(multi, file, config).await
    } else {
        ingest_with_log(file, config).await
    };

    result.map_err(|e| {
        let failure = e.to_failure();
        log::error!("{} ({})", failure.message, failure.kind);
        e.into()
    })
}

async fn ingest_with_spinner(
    multi: &MultiProgress,
    file: &Path,
    config: &IngestConfig,
) -> Result<IngestedLayer, IngestError> {
    let status = IndicatifStatus::spinner(multi, &format!("Reading {}...", file.display()));
    let result = carbon_map_ingest::ingest_path(file, config, &status).await;

    match &result {
        Ok(layer) => status.finish(&summary(layer)),
        Err(_) => status.finish_and_clear(),
    }

    result
}

async fn ingest_with_log(file: &Path, config: &IngestConfig) -> Result<IngestedLayer, IngestError> {
    log::info!("Reading {}...", file.display());
    let layer = carbon_map_ingest::ingest_path(file, config, &LogStatus).await?;
    log::info!("{}", summary(&layer));
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_size_override_is_in_megabytes() {
        let config = resolve_config(None, Some(2)).unwrap();
        assert_eq!(config.max_file_size, 2 * 1024 * 1024);
        assert!((config.max_file_size_mb() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_max_size_is_rejected() {
        assert!(matches!(
            resolve_config(None, Some(0)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn override_applies_on_top_of_file() {
        let dir = std::env::temp_dir().join("carbon_map_cli_config_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ingest.toml");
        std::fs::write(&path, "progress_interval = 25\nmax_file_size = 10\n").unwrap();

        let config = resolve_config(Some(&path), Some(1)).unwrap();
        assert_eq!(config.progress_interval, 25);
        assert_eq!(config.max_file_size, 1024 * 1024);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn formats_table_lists_every_extension() {
        let table = formats_table(&IngestConfig::default());
        assert!(table.starts_with("FORMAT"));
        assert!(table.contains("KMZ          .kmz"));
        assert!(table.contains("Accepted extensions: .geojson .json .kml .kmz .zip"));
        assert!(table.contains("Maximum upload size: "));
    }

    #[tokio::test]
    async fn logged_ingestion_reads_from_disk() {
        let dir = std::env::temp_dir().join("carbon_map_cli_log_ingest_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pier.geojson");
        std::fs::write(
            &path,
            r#"{"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[-122.41,37.8]}}"#,
        )
        .unwrap();

        let layer = ingest_with_log(&path, &IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(layer.feature_count(), 1);
        assert_eq!(summary(&layer), "pier.geojson: 1 features (0 dropped)");

        let missing = ingest_with_log(&dir.join("missing.kml"), &IngestConfig::default()).await;
        assert!(missing.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cli_parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "carbon_map",
            "ingest",
            "parcels.kmz",
            "--output",
            "out.geojson",
            "--max-size-mb",
            "5",
            "--pretty",
        ])
        .unwrap();

        let Commands::Ingest {
            file,
            output,
            max_size_mb,
            pretty,
            ..
        } = cli.command
        else {
            panic!("expected ingest command");
        };
        assert_eq!(file, PathBuf::from("parcels.kmz"));
        assert_eq!(output, Some(PathBuf::from("out.geojson")));
        assert_eq!(max_size_mb, Some(5));
        assert!(pretty);
    }
}
