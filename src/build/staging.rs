//! Copies verified build output into an isolated staging directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recreates `staging_dir` and copies the tree under `output_dir` into it,
/// preserving structure and skipping `.git` directories.
///
/// Returns the number of files copied.
pub fn stage_output(output_dir: &Path, staging_dir: &Path) -> io::Result<usize> {
    if staging_dir.exists() {
        fs::remove_dir_all(staging_dir)?;
    }
    fs::create_dir_all(staging_dir)?;

    let mut copied = 0;
    let walker = WalkDir::new(output_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == ".git"));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(output_dir)
            .map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        // Staging inside the output tree would copy into itself
        if entry.path() == staging_dir {
            continue;
        }

        let target = staging_dir.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        } else if file_type.is_symlink() {
            // Only links resolving to regular files are published
            if let Ok(meta) = fs::metadata(entry.path()) {
                if meta.is_file() {
                    fs::copy(entry.path(), &target)?;
                    copied += 1;
                }
            }
        }
    }

    Ok(copied)
}

/// Every regular file under `root`, relative to it, sorted
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}
