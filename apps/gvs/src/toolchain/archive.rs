//! Zip extraction for Go toolchain archives.
//!
//! Entry names are untrusted. Every name is normalised lexically before
//! anything is written; a name that climbs above the extraction root, is
//! absolute, or carries a drive prefix aborts the whole extraction with
//! `PathTraversal`. The check runs over the central directory first, so a
//! malicious archive is rejected before a single file is created.
//!
//! Official archives wrap everything in a `go/` directory. A single shared
//! top-level directory is stripped so the destination directly contains
//! `bin/`, `pkg/` and `src/`.

use std::path::{Path, PathBuf};

use super::cancel::CancelToken;
use crate::errors::{GvsError, GvsResult};

/// Extracts a zip archive into `dest_dir`.
///
/// `dest_dir` is created if needed. Existing files in it are overwritten but
/// never removed; callers wanting a clean tree pass an empty directory.
///
/// # Errors
///
/// Returns:
/// - `PathTraversal` if any entry would resolve outside `dest_dir`
/// - `Cancelled` if `cancel` fires between entries
/// - `Io` if the archive is unreadable or a file cannot be written
pub fn extract_zip(archive_path: &Path, dest_dir: &Path, cancel: &CancelToken) -> GvsResult<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        GvsError::io(format!("Failed to open archive: {}", archive_path.display()), e)
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        GvsError::io(
            format!("Failed to read ZIP archive: {}", archive_path.display()),
            std::io::Error::other(e),
        )
    })?;

    let mut relative_paths = Vec::with_capacity(archive.len());
    for name in archive.file_names() {
        relative_paths.push(sanitize_entry_name(name)?);
    }
    let strip_prefix = find_common_root_folder(archive.file_names().zip(&relative_paths));

    std::fs::create_dir_all(dest_dir).map_err(|e| {
        GvsError::io(format!("Failed to create directory: {}", dest_dir.display()), e)
    })?;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(GvsError::Cancelled);
        }

        let mut entry = archive.by_index(i).map_err(|e| {
            GvsError::io(
                format!("Failed to read archive entry {i}"),
                std::io::Error::other(e),
            )
        })?;

        // The central directory was validated above; re-check the name the
        // entry itself reports.
        let entry_path = sanitize_entry_name(entry.name())?;
        let relative_path = match &strip_prefix {
            Some(prefix) => match entry_path.strip_prefix(prefix) {
                Ok(p) if p.as_os_str().is_empty() => continue,
                Ok(p) => p.to_path_buf(),
                Err(_) => entry_path,
            },
            None => entry_path,
        };
        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let output_path = dest_dir.join(&relative_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&output_path).map_err(|e| {
                GvsError::io(
                    format!("Failed to create directory: {}", output_path.display()),
                    e,
                )
            })?;
        } else {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GvsError::io(format!("Failed to create directory: {}", parent.display()), e)
                })?;
            }
            let mut outfile = std::fs::File::create(&output_path).map_err(|e| {
                GvsError::io(format!("Failed to create file: {}", output_path.display()), e)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                GvsError::io(format!("Failed to extract: {}", output_path.display()), e)
            })?;
        }
    }

    Ok(())
}

/// Normalises a raw entry name into a relative path below the extraction root.
///
/// Both `/` and `\` are treated as separators. `.` segments are dropped and
/// `..` segments consume the previous segment.
///
/// # Errors
///
/// Returns `PathTraversal` for absolute names, drive-qualified names, and names
/// whose `..` segments climb above the root.
pub fn sanitize_entry_name(raw: &str) -> GvsResult<PathBuf> {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(GvsError::path_traversal(raw));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(GvsError::path_traversal(raw));
                }
            }
            segment if segment.contains(':') => return Err(GvsError::path_traversal(raw)),
            segment => parts.push(segment),
        }
    }
    Ok(parts.iter().collect())
}

/// Finds the single top-level directory shared by every entry.
///
/// Returns `None` when entries have different roots, or when the shared root
/// is a lone file rather than a containing folder.
fn find_common_root_folder<'a>(
    entries: impl Iterator<Item = (&'a str, &'a PathBuf)>,
) -> Option<PathBuf> {
    let mut common_root: Option<PathBuf> = None;
    let mut has_nested_entries = false;

    for (raw, path) in entries {
        let Some(first) = path.components().next() else {
            continue;
        };
        if path.components().count() > 1 || raw.ends_with('/') {
            has_nested_entries = true;
        }

        let root = PathBuf::from(first.as_os_str());
        match &common_root {
            None => common_root = Some(root),
            Some(existing) if existing != &root => return None,
            Some(_) => {}
        }
    }

    if has_nested_entries { common_root } else { None }
}
