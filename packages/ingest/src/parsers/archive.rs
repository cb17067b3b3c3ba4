//! In-memory zip access shared by the KMZ and shapefile parsers.

use std::io::{Cursor, Read as _};

use zip::ZipArchive;

/// Resource forks macOS adds when compressing a folder.
const MACOS_METADATA_PREFIX: &str = "__MACOSX/";

/// A zip archive held entirely in memory.
pub type MemoryArchive<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// A file entry worth looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in the archive's central directory.
    pub index: usize,
    /// Full path inside the archive.
    pub name: String,
}

impl ArchiveEntry {
    /// Case-insensitive extension match; `extension` includes the dot.
    #[must_use]
    pub fn has_extension(&self, extension: &str) -> bool {
        self.name.to_ascii_lowercase().ends_with(extension)
    }

    /// Path without its final extension, lowercased, for pairing
    /// `parcels.shp` with `parcels.dbf`.
    #[must_use]
    pub fn stem(&self) -> String {
        let lower = self.name.to_ascii_lowercase();
        match lower.rfind('.') {
            Some(idx) => lower[..idx].to_string(),
            None => lower,
        }
    }
}

/// Opens an archive over `bytes`.
///
/// # Errors
///
/// * If `bytes` is not a readable zip archive
pub fn open(bytes: &[u8]) -> zip::result::ZipResult<MemoryArchive<'_>> {
    ZipArchive::new(Cursor::new(bytes))
}

/// Lists the file entries of an archive in directory order.
///
/// Directories and macOS metadata are skipped. Unreadable entries are
/// logged and skipped rather than failing the listing.
pub fn list_entries(archive: &mut MemoryArchive<'_>) -> Vec<ArchiveEntry> {
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = match archive.by_index(index) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping corrupt zip entry {index}: {e}");
                continue;
            }
        };

        if entry.is_dir() || entry.name().starts_with(MACOS_METADATA_PREFIX) {
            continue;
        }

        entries.push(ArchiveEntry {
            index,
            name: entry.name().to_string(),
        });
    }

    entries
}

/// Reads an entry's full decompressed contents.
///
/// # Errors
///
/// * If the entry cannot be opened or fails to decompress
pub fn read_entry(
    archive: &mut MemoryArchive<'_>,
    entry: &ArchiveEntry,
) -> zip::result::ZipResult<Vec<u8>> {
    let mut file = archive.by_index(entry.index)?;
    let mut contents = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
    file.read_to_end(&mut contents)?;
    Ok(contents)
}


#[cfg(test)]
mod tests {
    use super::{test_support::zip_bytes, *};

    #[test]
    fn lists_files_and_skips_noise() {
        let bytes = zip_bytes(&[
            ("data/", b""),
            ("__MACOSX/data/._doc.kml", b"junk"),
            ("data/doc.KML", b"<kml/>"),
            ("data/icon.png", b"png"),
        ]);
        let mut archive = open(&bytes).unwrap();
        let entries = list_entries(&mut archive);

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["data/doc.KML", "data/icon.png"]);
        assert!(entries[0].has_extension(".kml"));
        assert_eq!(entries[0].stem(), "data/doc");
    }

    #[test]
    fn reads_entry_contents() {
        let bytes = zip_bytes(&[("a.txt", b"hello")]);
        let mut archive = open(&bytes).unwrap();
        let entries = list_entries(&mut archive);
        assert_eq!(read_entry(&mut archive, &entries[0]).unwrap(), b"hello");
    }

    #[test]
    fn garbage_is_not_an_archive() {
        assert!(open(b"definitely not a zip").is_err());
    }
}
