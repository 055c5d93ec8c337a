//! Flat, sorted directory listings.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DiffLabelError;

/// Extensions decoded by the diff engine.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Lists the regular files directly inside `root`, sorted by file name.
///
/// With `extensions`, only files whose extension matches one of them
/// (case-insensitive, no dot) are returned.
pub fn list_files<S: AsRef<str>>(
    root: &Path,
    extensions: Option<&[S]>,
) -> Result<Vec<PathBuf>, DiffLabelError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| DiffLabelError::DirectoryScan {
            path: root.to_path_buf(),
            message: source.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        if extensions.is_some_and(|allowed| !has_extension(entry.path(), allowed)) {
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}

pub fn has_extension<S: AsRef<str>>(path: &Path, allowed: &[S]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext.as_ref()))
}

/// The final path component as UTF-8 (lossy).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
