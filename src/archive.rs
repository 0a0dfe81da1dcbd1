//! Zip archival of a finished bundle.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

/// A written archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    /// Files stored (directories not counted).
    pub entries: usize,
    pub bytes: u64,
}

/// `<bundle>.zip`, next to the bundle directory.
pub fn archive_path_for(bundle: &Path) -> PathBuf {
    let name = bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());
    bundle.with_file_name(format!("{}.zip", name))
}

/// Compress `bundle` into `archive`.
///
/// The archive is assembled under a `.partial` name and renamed into place,
/// so a failure never leaves a truncated `.zip` behind. The bundle itself is
/// only read.
pub fn zip_directory(bundle: &Path, archive: &Path) -> Result<ArchiveOutcome> {
    let partial = partial_path(archive);

    let entries = match write_zip(bundle, &partial) {
        Ok(entries) => entries,
        Err(e) => {
            if partial.is_file() {
                let _ = fs::remove_file(&partial);
            }
            return Err(e);
        }
    };

    fs::rename(&partial, archive).map_err(|e| archive_error(archive, e))?;
    let bytes = fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
    debug!("Archived {} files into {}", entries, archive.display());

    Ok(ArchiveOutcome {
        path: archive.to_path_buf(),
        entries,
        bytes,
    })
}

fn partial_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn write_zip(bundle: &Path, partial: &Path) -> Result<usize> {
    let file = File::create(partial).map_err(|e| archive_error(partial, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    for entry in WalkDir::new(bundle).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::ArchiveError {
            path: bundle.display().to_string(),
            reason: e.to_string(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(bundle)
            .map_err(|e| archive_error(entry.path(), e))?;
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| archive_error(partial, e))?;
        } else {
            zip.start_file(name, options)
                .map_err(|e| archive_error(partial, e))?;
            let mut source = File::open(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            io::copy(&mut source, &mut zip).map_err(|e| archive_error(partial, e))?;
            entries += 1;
        }
    }

    let mut writer = zip.finish().map_err(|e| archive_error(partial, e))?;
    io::Write::flush(&mut writer).map_err(|e| archive_error(partial, e))?;
    Ok(entries)
}

/// Zip entry names always use `/`.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn archive_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::ArchiveError {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn bundle_in(dir: &Path) -> PathBuf {
        let bundle = dir.join("debug-output-20260101-000000");
        fs::create_dir_all(bundle.join("nova")).unwrap();
        fs::write(bundle.join("nova/server_show.txt"), "server\n").unwrap();
        fs::write(bundle.join("summary.txt"), "=== Debug Summary ===\n").unwrap();
        bundle
    }

    #[test]
    fn test_archive_path_is_sibling() {
        assert_eq!(
            archive_path_for(Path::new("/tmp/out/debug-output-1")),
            PathBuf::from("/tmp/out/debug-output-1.zip")
        );
    }

    #[test]
    fn test_zip_directory() {
        let dir = TempDir::new().unwrap();
        let bundle = bundle_in(dir.path());
        let archive = archive_path_for(&bundle);

        let outcome = zip_directory(&bundle, &archive).unwrap();

        assert_eq!(outcome.entries, 2);
        assert!(outcome.bytes > 0);
        assert!(!partial_path(&archive).exists());

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["nova/", "nova/server_show.txt", "summary.txt"]);
    }

    #[test]
    fn test_failure_keeps_bundle() {
        let dir = TempDir::new().unwrap();
        let bundle = bundle_in(dir.path());
        let archive = archive_path_for(&bundle);
        fs::create_dir_all(partial_path(&archive)).unwrap();

        let err = zip_directory(&bundle, &archive).unwrap_err();

        assert!(matches!(err, Error::ArchiveError { .. }));
        assert!(!archive.exists());
        assert_eq!(
            fs::read_to_string(bundle.join("nova/server_show.txt")).unwrap(),
            "server\n"
        );
    }
}
