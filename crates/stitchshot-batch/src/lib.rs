//! stitchshot-batch: Filesystem side of screenshot stitching.
//!
//! Wraps the pure `stitchshot-pipeline` core with everything that touches
//! the outside world:
//! folder discovery -> EXIF capture times -> pairing -> parallel
//! stitching -> encoded outputs.
//!
//! [`run_folder`] drives a whole folder from a validated
//! [`ResolvedConfig`]. The pieces are public for callers that already
//! have pairs ([`BatchRunner`]) or want their own sink or metadata
//! source.

pub mod batch;
pub mod config;
pub mod discovery;
pub mod error;
mod exif_reader;
pub mod output;

pub use batch::{
    BatchOptions, BatchReport, BatchRunner, BatchSummary, CancelToken, FailureSummary,
    PairOutcome, PairStatus, load_rgb, run_batch,
};
pub use config::{BatchConfig, ConfigError, ResolvedConfig};
pub use discovery::{discover_images, is_supported_image};
pub use error::BatchError;
pub use exif_reader::ExifReader;
pub use output::{
    Clock, DirectorySink, OutputNaming, OutputSink, SystemClock, output_format,
    write_omitted_list,
};

use stitchshot_pipeline::{MetadataReader, pair_paths};
use tracing::{info, warn};

/// Discover, pair and stitch every screenshot in the configured folder.
///
/// Images that find no partner are listed in the report and, when
/// configured, in the omitted-list file.
///
/// # Errors
///
/// Returns an error if the input folder cannot be listed, the omitted list
/// cannot be written or the worker pool cannot start. Failures of single
/// pairs are in the report instead.
pub fn run_folder<R, F>(
    config: &ResolvedConfig,
    reader: &R,
    cancel: CancelToken,
    on_outcome: F,
) -> Result<BatchReport, BatchError>
where
    R: MetadataReader + ?Sized,
    F: Fn(&PairOutcome) + Sync,
{
    let paths = discover_images(
        &config.input_dir,
        config.recursive,
        Some(config.output_dir.as_path()),
    )
    .map_err(|source| BatchError::Discovery {
        path: config.input_dir.clone(),
        source,
    })?;

    let pairing = pair_paths(&paths, reader, &config.extractor, config.tolerance);
    info!(
        images = paths.len(),
        pairs = pairing.pairs.len(),
        unpaired = pairing.unpaired.len(),
        "paired images"
    );
    for path in &pairing.unpaired {
        warn!(path = %path.display(), "no partner found");
    }

    if let Some(list) = &config.omitted_list_path {
        write_omitted_list(list, &pairing.unpaired).map_err(|source| {
            BatchError::OmittedList {
                path: list.clone(),
                source,
            }
        })?;
    }

    let sink = config.sink();
    let mut report = BatchRunner::new(&config.options, &sink)
        .with_cancel_token(cancel)
        .run(pairing.pairs, on_outcome)?;
    report.omitted = pairing.unpaired;

    let summary = report.summary();
    info!(
        written = summary.written,
        failed = summary.failed,
        cancelled = summary.cancelled,
        omitted = summary.omitted,
        "batch finished"
    );

    Ok(report)
}
