/// Directory <-> zip archive conversion

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;

use super::error::{BackupError, Result};

#[derive(Debug, Clone, Default)]
pub struct CompressOptions<'a> {
    /// Top-level folder every entry is placed under inside the archive
    pub wrapper: Option<&'a str>,
    /// Name of a top-level entry of the source directory to leave out
    pub exclude: Option<&'a str>,
}

/// Zip the full recursive contents of `source` into `destination`.
///
/// Never panics and never returns an error: any failure (missing source,
/// permissions, disk full) is logged and reported as `false`.
pub fn compress_folder(source: &Path, destination: &Path, options: &CompressOptions<'_>) -> bool {
    match write_archive(source, destination, options) {
        Ok(count) => {
            debug!(
                "Archived {} entries from {} into {}",
                count,
                source.display(),
                destination.display()
            );
            true
        }
        Err(e) => {
            warn!("Failed to archive {}: {}", source.display(), e);
            false
        }
    }
}

fn write_archive(source: &Path, destination: &Path, options: &CompressOptions<'_>) -> Result<usize> {
    if !source.is_dir() {
        return Err(BackupError::invalid(format!(
            "source directory {} does not exist",
            source.display()
        )));
    }

    let file = File::create(destination)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let file_options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let dir_options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let prefix = options
        .wrapper
        .map(|w| format!("{}/", w.trim_matches('/')))
        .unwrap_or_default();

    if !prefix.is_empty() {
        zip.add_directory(prefix.as_str(), dir_options)?;
    }

    let mut walker = WalkDir::new(source).min_depth(1).sort_by_file_name().into_iter();
    let mut count = 0usize;

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| BackupError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| BackupError::invalid(e.to_string()))?;

        if entry.depth() == 1 {
            if let Some(excluded) = options.exclude {
                if entry.file_name() == excluded {
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }
        }

        // Destination may live inside the source tree
        if entry.path() == destination {
            continue;
        }

        let name = format!("{}{}", prefix, zip_entry_name(rel));

        if entry.file_type().is_dir() {
            zip.add_directory(name, dir_options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, file_options)?;
            let mut reader = BufReader::new(File::open(entry.path())?);
            io::copy(&mut reader, &mut zip)?;
        } else {
            continue;
        }

        count += 1;
    }

    zip.finish()?;
    Ok(count)
}

/// Extract `archive` into `target`, removing `strip_prefix` from entry names.
///
/// Entries whose names would land outside `target` are rejected.
pub fn extract_archive(archive: &Path, target: &Path, strip_prefix: Option<&str>) -> Result<usize> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(target)?;

    let prefix = strip_prefix.map(|p| format!("{}/", p.trim_matches('/')));
    let mut count = 0usize;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();

        let relative = match &prefix {
            Some(prefix) => match name.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.to_string(),
                None => name.clone(),
            },
            None => name.clone(),
        };

        if relative.is_empty() {
            continue;
        }

        let out_path = safe_join(target, &relative).ok_or_else(|| {
            BackupError::invalid(format!("archive entry {} escapes the target directory", name))
        })?;

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(&out_path)?);
            io::copy(&mut entry, &mut out)?;
        }

        count += 1;
    }

    Ok(count)
}

fn zip_entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    let mut out = base.to_path_buf();

    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    Some(out)
}
