//! Parallel stitching of image pairs.
//!
//! Each pair is handled end to end by one worker of a dedicated rayon
//! pool: decode both images, order them by capture time, detect the
//! overlap, stitch, name and persist. Pairs are disjoint so workers share
//! nothing but the sink. A failing pair is recorded and the rest carry on.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use image::DynamicImage;
use rayon::prelude::*;
use serde::Serialize;
use stitchshot_pipeline::{
    Dimensions, ImagePair, OverlapConfig, OverlapOffset, RgbImage, stitch_pair,
};
use tracing::{debug, info, trace, warn};

use crate::error::BatchError;
use crate::output::{Clock, OutputNaming, OutputSink, SystemClock};

/// Shared flag for stopping a batch early.
///
/// Checked before each pair starts. Pairs already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run processing options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    /// Overlap search tuning.
    pub overlap: OverlapConfig,
    /// How outputs are named.
    pub naming: OutputNaming,
    /// Worker threads. `None` uses the available parallelism.
    pub workers: Option<NonZeroUsize>,
}

impl BatchOptions {
    /// Number of workers the pool will be built with.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.map_or_else(
            || thread::available_parallelism().map_or(1, NonZeroUsize::get),
            NonZeroUsize::get,
        )
    }
}

/// What happened to one pair.
#[derive(Debug)]
pub enum PairStatus {
    /// The stitched image was saved.
    Written {
        /// Where it was saved.
        path: PathBuf,
        /// The overlap that was removed.
        offset: OverlapOffset,
        /// Size of the stitched image.
        dimensions: Dimensions,
    },
    /// Decoding, encoding or saving failed.
    Failed(BatchError),
    /// The batch was cancelled before this pair started.
    Cancelled,
}

/// A pair and its result.
#[derive(Debug)]
pub struct PairOutcome {
    pub pair: ImagePair,
    pub status: PairStatus,
}

impl PairOutcome {
    /// The output path if the pair was written.
    #[must_use]
    pub const fn written(&self) -> Option<&PathBuf> {
        match &self.status {
            PairStatus::Written { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The error if the pair failed.
    #[must_use]
    pub const fn error(&self) -> Option<&BatchError> {
        match &self.status {
            PairStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Stitches pairs on a worker pool and writes them to a sink.
pub struct BatchRunner<'a> {
    options: &'a BatchOptions,
    sink: &'a dyn OutputSink,
    clock: &'a dyn Clock,
    cancel: CancelToken,
}

impl<'a> BatchRunner<'a> {
    /// Runner using the system clock and a fresh cancel token.
    #[must_use]
    pub fn new(options: &'a BatchOptions, sink: &'a dyn OutputSink) -> Self {
        Self {
            options,
            sink,
            clock: &SystemClock,
            cancel: CancelToken::new(),
        }
    }

    /// Use `clock` for outputs named after the current time.
    #[must_use]
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Observe `cancel` between pairs.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every pair.
    ///
    /// `on_outcome` is called from the worker threads as each pair
    /// finishes, in completion order. The report lists outcomes in input
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::ThreadPool`] if the worker pool cannot be
    /// started. Per-pair failures are reported in the [`BatchReport`].
    pub fn run<F>(&self, pairs: Vec<ImagePair>, on_outcome: F) -> Result<BatchReport, BatchError>
    where
        F: Fn(&PairOutcome) + Sync,
    {
        let start = Instant::now();
        let workers = self.options.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("stitchshot-{idx}"))
            .build()?;

        info!(pairs = pairs.len(), workers, "stitching pairs");

        let outcomes: Vec<PairOutcome> = pool.install(|| {
            pairs
                .into_par_iter()
                .map(|pair| {
                    let outcome = self.process_pair(pair);
                    on_outcome(&outcome);
                    outcome
                })
                .collect()
        });

        Ok(BatchReport {
            outcomes,
            omitted: Vec::new(),
            elapsed: start.elapsed(),
        })
    }

    /// Stitch and persist a single pair.
    #[must_use]
    pub fn process_pair(&self, pair: ImagePair) -> PairOutcome {
        if self.cancel.is_cancelled() {
            trace!(first = %pair.first.display(), "skipping pair after cancellation");
            return PairOutcome {
                pair,
                status: PairStatus::Cancelled,
            };
        }

        let status = match self.stitch_and_save(&pair) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    first = %pair.first.display(),
                    second = %pair.second.display(),
                    error = %e,
                    "pair failed"
                );
                PairStatus::Failed(e)
            }
        };

        PairOutcome { pair, status }
    }

    fn stitch_and_save(&self, pair: &ImagePair) -> Result<PairStatus, BatchError> {
        let (earlier, later) = pair.ordered();

        let stitched = {
            let upper = load_rgb(earlier)?;
            let lower = load_rgb(later)?;
            let overlap = &self.options.overlap;
            trace!(
                upper_width = upper.width(),
                upper_height = upper.height(),
                lower_width = lower.width(),
                lower_height = lower.height(),
                window_height = overlap.window_height,
                coarse_stride = overlap.coarse_stride,
                sample_stride = overlap.sample_stride,
                probe_column = overlap.probe_column,
                "searching for overlap"
            );
            stitch_pair(&upper, &lower, overlap)
        };
        trace!(
            offset = stitched.offset.total(),
            height = stitched.image.height(),
            "overlap search finished"
        );

        debug!(
            upper = %earlier.display(),
            lower = %later.display(),
            bottom_trim = stitched.offset.bottom_trim,
            top_trim = stitched.offset.top_trim,
            "overlap detected"
        );

        let stem = self.options.naming.stem(pair.output_time(), self.clock);
        let dimensions = stitched.dimensions();
        let path = self.sink.persist(&stitched.image, &stem)?;

        Ok(PairStatus::Written {
            path,
            offset: stitched.offset,
            dimensions,
        })
    }
}

/// Stitch `pairs` with the system clock.
///
/// # Errors
///
/// See [`BatchRunner::run`].
pub fn run_batch<F>(
    pairs: Vec<ImagePair>,
    options: &BatchOptions,
    sink: &dyn OutputSink,
    cancel: CancelToken,
    on_outcome: F,
) -> Result<BatchReport, BatchError>
where
    F: Fn(&PairOutcome) + Sync,
{
    BatchRunner::new(options, sink)
        .with_cancel_token(cancel)
        .run(pairs, on_outcome)
}

/// Decode an image file as 8-bit RGB.
///
/// # Errors
///
/// Returns [`BatchError::Decode`] if the file cannot be opened or decoded.
pub fn load_rgb(path: &Path) -> Result<RgbImage, BatchError> {
    image::open(path)
        .map(DynamicImage::into_rgb8)
        .map_err(|source| BatchError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Everything a batch produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per pair, in input order.
    pub outcomes: Vec<PairOutcome>,
    /// Images that found no partner.
    pub omitted: Vec<PathBuf>,
    /// Wall time spent stitching.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Counts and failure details.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            pairs: self.outcomes.len(),
            omitted: self.omitted.len(),
            elapsed_ms: self.elapsed.as_secs_f64() * 1000.0,
            ..BatchSummary::default()
        };

        for outcome in &self.outcomes {
            match &outcome.status {
                PairStatus::Written { path, .. } => {
                    summary.written += 1;
                    summary.outputs.push(path.clone());
                }
                PairStatus::Failed(e) => {
                    summary.failed += 1;
                    summary.failures.push(FailureSummary {
                        first: outcome.pair.first.clone(),
                        second: outcome.pair.second.clone(),
                        error: e.to_string(),
                    });
                }
                PairStatus::Cancelled => summary.cancelled += 1,
            }
        }

        summary
    }

    /// Whether every pair was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, PairStatus::Written { .. }))
    }
}

/// A failed pair, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub first: PathBuf,
    pub second: PathBuf,
    pub error: String,
}

/// Aggregate counts of a [`BatchReport`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub pairs: usize,
    pub written: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub omitted: usize,
    pub elapsed_ms: f64,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<FailureSummary>,
}

impl BatchSummary {
    /// Human-readable summary, one failure per line.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Batch Summary\n{}", "=".repeat(40)));
        lines.push(format!("{:<12} {:>8}", "Pairs", self.pairs));
        lines.push(format!("{:<12} {:>8}", "Written", self.written));
        lines.push(format!("{:<12} {:>8}", "Failed", self.failed));
        lines.push(format!("{:<12} {:>8}", "Cancelled", self.cancelled));
        lines.push(format!("{:<12} {:>8}", "Omitted", self.omitted));
        lines.push(format!("{:<12} {:>8.1}ms", "Elapsed", self.elapsed_ms));

        if !self.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failures:".to_string());
            for failure in &self.failures {
                lines.push(format!(
                    "  {} + {}: {}",
                    failure.first.display(),
                    failure.second.display(),
                    failure.error,
                ));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::fs;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use image::{ImageFormat, Rgb};
    use stitchshot_pipeline::Timestamp;
    use tempfile::TempDir;

    use super::*;
    use crate::output::DirectorySink;
    use crate::output::tests::FixedClock;

    fn ts(value: &str) -> Timestamp {
        Timestamp::parse(value).unwrap()
    }

    fn write_png(dir: &Path, name: &str, height: u32, shade: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(16, height, |x, y| {
            Rgb([shade, u8::try_from(y % 256).unwrap(), u8::try_from(x).unwrap()])
        })
        .save(&path)
        .unwrap();
        path
    }

    fn pair(first: PathBuf, first_time: &str, second: PathBuf, second_time: &str) -> ImagePair {
        ImagePair {
            first,
            first_time: Some(ts(first_time)),
            second,
            second_time: Some(ts(second_time)),
        }
    }

    /// Four pairs captured ten minutes apart, starting at 10:00.
    fn four_pairs(dir: &Path) -> Vec<ImagePair> {
        (0..4u8)
            .map(|i| {
                let minute = u32::from(i) * 10;
                pair(
                    write_png(dir, &format!("{i}a.png"), 30, i),
                    &format!("2023-11-20 10:{minute:02}:00"),
                    write_png(dir, &format!("{i}b.png"), 20, i),
                    &format!("2023-11-20 10:{minute:02}:10"),
                )
            })
            .collect()
    }

    /// Writes through a [`DirectorySink`] but fails one stem.
    struct FlakySink {
        inner: DirectorySink,
        fail_stem: String,
    }

    impl OutputSink for FlakySink {
        fn persist(&self, image: &RgbImage, stem: &str) -> Result<PathBuf, BatchError> {
            if stem == self.fail_stem {
                return Err(BatchError::Save {
                    path: self.inner.dir().join(stem),
                    source: io::Error::other("disk full"),
                });
            }
            self.inner.persist(image, stem)
        }
    }

    /// Records requested stems without writing anything.
    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl OutputSink for RecordingSink {
        fn persist(&self, _image: &RgbImage, stem: &str) -> Result<PathBuf, BatchError> {
            self.0.lock().unwrap().push(stem.to_string());
            Ok(PathBuf::from(stem))
        }
    }

    #[test]
    fn one_failed_save_leaves_others_written() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let sink = FlakySink {
            inner: DirectorySink::new(output.path(), "png", ImageFormat::Png),
            fail_stem: "2023-11-20-102005".to_string(),
        };
        let options = BatchOptions {
            workers: NonZeroUsize::new(2),
            ..BatchOptions::default()
        };
        let seen = AtomicUsize::new(0);

        let report = BatchRunner::new(&options, &sink)
            .run(four_pairs(input.path()), |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let summary = report.summary();
        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert_eq!(summary.pairs, 4);
        assert_eq!(summary.written, 3);
        assert_eq!(summary.failed, 1);
        assert!(!report.is_success());
        assert!(matches!(
            report.outcomes[2].error(),
            Some(BatchError::Save { .. })
        ));
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 3);
    }

    #[test]
    fn written_outputs_are_named_and_stacked() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let sink = DirectorySink::new(output.path(), "png", ImageFormat::Png);
        let options = BatchOptions::default();

        let report = BatchRunner::new(&options, &sink)
            .run(four_pairs(input.path()), |_| {})
            .unwrap();

        assert!(report.is_success());
        let first = &report.outcomes[0];
        assert_eq!(
            first.written().unwrap(),
            &output.path().join("2023-11-20-100005.png")
        );
        match &first.status {
            PairStatus::Written {
                offset, dimensions, ..
            } => {
                assert!(offset.is_none());
                assert_eq!(
                    *dimensions,
                    Dimensions {
                        width: 16,
                        height: 50
                    }
                );
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn later_first_member_is_stitched_below() {
        let input = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let options = BatchOptions::default();
        let later = write_png(input.path(), "later.png", 12, 200);
        let earlier = write_png(input.path(), "earlier.png", 7, 100);

        let outcome = BatchRunner::new(&options, &sink).process_pair(pair(
            later,
            "2023-11-20 10:05:00",
            earlier,
            "2023-11-20 10:00:00",
        ));

        match outcome.status {
            PairStatus::Written { dimensions, .. } => assert_eq!(dimensions.height, 19),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(*sink.0.lock().unwrap(), ["2023-11-20-100230"]);
    }

    #[test]
    fn undecodable_image_fails_only_its_pair() {
        let input = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let options = BatchOptions::default();
        let broken = input.path().join("broken.png");
        fs::write(&broken, b"not a png").unwrap();

        let mut pairs = four_pairs(input.path());
        pairs[1].second = broken.clone();

        let report = BatchRunner::new(&options, &sink).run(pairs, |_| {}).unwrap();

        let summary = report.summary();
        assert_eq!(summary.written, 3);
        assert_eq!(summary.failed, 1);
        match report.outcomes[1].error() {
            Some(BatchError::Decode { path, .. }) => assert_eq!(path, &broken),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(summary.report().contains("broken.png"));
    }

    #[test]
    fn cancelled_batch_writes_nothing() {
        let input = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let options = BatchOptions::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run_batch(four_pairs(input.path()), &options, &sink, cancel, |_| {}).unwrap();

        assert_eq!(report.summary().cancelled, 4);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn cancelling_mid_run_skips_remaining_pairs() {
        let input = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let options = BatchOptions {
            workers: NonZeroUsize::new(1),
            ..BatchOptions::default()
        };
        let cancel = CancelToken::new();
        let trigger = cancel.clone();

        let report = BatchRunner::new(&options, &sink)
            .with_cancel_token(cancel)
            .run(four_pairs(input.path()), |outcome| {
                if outcome.written().is_some() {
                    trigger.cancel();
                }
            })
            .unwrap();

        let summary = report.summary();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.cancelled, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_times_fall_back_to_clock() {
        let input = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let options = BatchOptions::default();
        let clock = FixedClock(ts("2024-02-03 04:05:06"));
        let pair = ImagePair {
            first: write_png(input.path(), "a.png", 5, 0),
            first_time: None,
            second: write_png(input.path(), "b.png", 5, 0),
            second_time: None,
        };

        let outcome = BatchRunner::new(&options, &sink)
            .with_clock(&clock)
            .process_pair(pair);

        assert!(outcome.written().is_some());
        assert_eq!(*sink.0.lock().unwrap(), ["2024-02-03-040506"]);
    }

    #[test]
    fn summary_report_lists_counts() {
        let summary = BatchSummary {
            pairs: 4,
            written: 3,
            failed: 1,
            omitted: 2,
            failures: vec![FailureSummary {
                first: PathBuf::from("a.png"),
                second: PathBuf::from("b.png"),
                error: "failed to save out.png: disk full".to_string(),
            }],
            ..BatchSummary::default()
        };

        let text = summary.report();
        assert!(text.starts_with("Batch Summary"));
        assert!(text.contains("Written             3"));
        assert!(text.contains("a.png + b.png: failed to save out.png: disk full"));
    }

    #[test]
    fn worker_count_defaults_to_parallelism() {
        assert!(BatchOptions::default().worker_count() >= 1);
        let options = BatchOptions {
            workers: NonZeroUsize::new(3),
            ..BatchOptions::default()
        };
        assert_eq!(options.worker_count(), 3);
    }
}
