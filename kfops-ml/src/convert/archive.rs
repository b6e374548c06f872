//! Zip archive codec for model directories.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ConvertError;

/// Extract `archive` into `dest`, returning the number of files written.
///
/// Entries whose names would land outside `dest` are skipped.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, ConvertError> {
    let file = File::open(archive)?;
    let mut zip =
        ZipArchive::new(BufReader::new(file)).map_err(|e| ConvertError::archive(archive, e))?;
    std::fs::create_dir_all(dest)?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| ConvertError::archive(archive, e))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping archive entry outside target directory");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&out_path)?);
        std::io::copy(&mut entry, &mut out)?;
        out.flush()?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let mode = (mode & 0o777) | 0o600;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
        }
        extracted += 1;
    }

    debug!(archive = %archive.display(), files = extracted, "Extracted archive");
    Ok(extracted)
}

/// Zip the contents of `src_dir` into `archive` with deflate compression.
///
/// Entry names are relative to `src_dir` with `/` separators. Directories get
/// their own entries. Returns the number of entries written.
pub fn write_archive(src_dir: &Path, archive: &Path) -> Result<usize, ConvertError> {
    if !src_dir.is_dir() {
        return Err(ConvertError::invalid_input(format!(
            "Not a directory: {}",
            src_dir.display()
        )));
    }
    if let Some(parent) = archive.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(archive)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut entries = 0;
    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let name = entry_name(src_dir, entry.path())?;

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| ConvertError::archive(archive, e))?;
        } else {
            zip.start_file(name, options)
                .map_err(|e| ConvertError::archive(archive, e))?;
            let mut input = BufReader::new(File::open(entry.path())?);
            std::io::copy(&mut input, &mut zip)?;
        }
        entries += 1;
    }

    zip.finish()
        .map_err(|e| ConvertError::archive(archive, e))?
        .flush()?;
    debug!(archive = %archive.display(), entries, "Wrote archive");
    Ok(entries)
}

fn entry_name(root: &Path, path: &Path) -> Result<String, ConvertError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        ConvertError::invalid_input(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        ))
    })?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Ok(parts.join("/"))
}

/// Archive path for `base`: the suffix is appended to the path string, not
/// swapped in as an extension.
pub fn archive_output_path(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Total size in bytes of regular files under `dir`.
pub fn dir_size(dir: &Path) -> Result<u64, ConvertError> {
    let mut total = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
