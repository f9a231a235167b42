//! Errors for the filesystem side of stitchshot.

use std::io;
use std::path::PathBuf;

/// Failure of one pair, or of setting up a batch.
///
/// Per-pair variants (`Decode`, `Encode`, `Save`, `NamesExhausted`) are
/// recorded against the pair and never stop the batch. `Discovery`,
/// `OmittedList` and `ThreadPool` happen before any pair starts and abort
/// the run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// A source image could not be read or decoded.
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        /// The unreadable image.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// The stitched image could not be encoded.
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        /// The output that was being written.
        path: PathBuf,
        /// Underlying encoder error.
        source: image::ImageError,
    },

    /// The stitched image could not be written.
    #[error("failed to save {}: {source}", path.display())]
    Save {
        /// The output that was being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Every candidate output name for a stem already exists.
    #[error("no free output name for '{stem}' in {}", dir.display())]
    NamesExhausted {
        /// Output directory.
        dir: PathBuf,
        /// Requested file stem.
        stem: String,
    },

    /// The input directory could not be listed.
    #[error("failed to list {}: {source}", path.display())]
    Discovery {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The unpaired-image list could not be written.
    #[error("failed to write omitted list {}: {source}", path.display())]
    OmittedList {
        /// List file being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
