//! Finding candidate screenshots in a directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

/// Extensions (lowercase) of files considered for stitching.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Returns `true` if `path` has a supported image extension, in any case.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// List the images under `dir`, sorted by path.
///
/// With `recursive`, subdirectories are searched too. Anything inside
/// `exclude` (typically the output directory) is skipped so a rerun does
/// not pick up previous results.
///
/// # Errors
///
/// Returns the first I/O error hit while reading a directory.
pub fn discover_images(
    dir: &Path,
    recursive: bool,
    exclude: Option<&Path>,
) -> io::Result<Vec<PathBuf>> {
    let exclude = exclude.and_then(|p| fs::canonicalize(p).ok());
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        if let Some(ref skip) = exclude
            && current != dir
            && fs::canonicalize(&current).is_ok_and(|c| c == *skip)
        {
            debug!(dir = %current.display(), "skipping output directory");
            continue;
        }

        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if is_supported_image(&path) {
                trace!(path = %path.display(), "found image");
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
