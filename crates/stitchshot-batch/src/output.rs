//! Naming and persisting stitched images.
//!
//! Output names come from the pair's capture time. Workers share one
//! output directory, so [`DirectorySink`] reserves each file with
//! `create_new` and appends `-1`, `-2`, ... on collision instead of
//! overwriting a sibling's result.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use stitchshot_pipeline::{RgbImage, Timestamp};
use tracing::debug;

use crate::error::BatchError;

/// Highest collision suffix tried before giving up on a stem.
const MAX_NAME_SUFFIX: u32 = 9_999;

/// Source of the current wall-clock time.
///
/// Injected so naming fallbacks are deterministic under test.
pub trait Clock: Sync {
    /// The current local time.
    fn now(&self) -> Timestamp;
}

/// [`Clock`] backed by the system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(chrono::Local::now().naive_local())
    }
}

/// How stitched outputs are named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputNaming {
    /// Stem used when a pair has no capture time. Without it the current
    /// time is used.
    pub fallback_name: Option<String>,
}

impl OutputNaming {
    /// File stem (no extension) for an output captured at `time`.
    #[must_use]
    pub fn stem(&self, time: Option<Timestamp>, clock: &dyn Clock) -> String {
        match (time, &self.fallback_name) {
            (Some(t), _) => t.file_stem(),
            (None, Some(name)) => name.clone(),
            (None, None) => clock.now().file_stem(),
        }
    }
}

/// Destination for stitched images.
pub trait OutputSink: Sync {
    /// Store `image` under a name derived from `stem`, returning where it
    /// ended up.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] if the image could not be encoded or
    /// written.
    fn persist(&self, image: &RgbImage, stem: &str) -> Result<PathBuf, BatchError>;
}

/// Writes outputs into a directory as `<stem>.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    extension: String,
    format: ImageFormat,
}

impl DirectorySink {
    /// Sink writing `format` files with the given extension into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>, format: ImageFormat) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            format,
        }
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a fresh file for `stem`, suffixing on collision.
    fn reserve(&self, stem: &str) -> Result<(PathBuf, File), BatchError> {
        for suffix in 0..=MAX_NAME_SUFFIX {
            let name = if suffix == 0 {
                format!("{stem}.{}", self.extension)
            } else {
                format!("{stem}-{suffix}.{}", self.extension)
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => return Err(BatchError::Save { path, source }),
            }
        }

        Err(BatchError::NamesExhausted {
            dir: self.dir.clone(),
            stem: stem.to_string(),
        })
    }
}

impl OutputSink for DirectorySink {
    fn persist(&self, image: &RgbImage, stem: &str) -> Result<PathBuf, BatchError> {
        let (path, file) = self.reserve(stem)?;
        let mut writer = BufWriter::new(file);

        let written = image
            .write_to(&mut writer, self.format)
            .map_err(|source| BatchError::Encode {
                path: path.clone(),
                source,
            })
            .and_then(|()| {
                writer.flush().map_err(|source| BatchError::Save {
                    path: path.clone(),
                    source,
                })
            });

        if let Err(e) = written {
            drop(writer);
            // A reserved but half-written file would shadow the name on rerun.
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        debug!(path = %path.display(), "saved stitched image");
        Ok(path)
    }
}

/// Map an output extension to an encodable format.
///
/// Only formats this build can write are accepted.
#[must_use]
pub fn output_format(extension: &str) -> Option<ImageFormat> {
    match ImageFormat::from_extension(extension)? {
        format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::WebP) => {
            Some(format)
        }
        _ => None,
    }
}

/// Write the unpaired image paths to `path`, one per line.
///
/// # Errors
///
/// Returns any I/O error from creating or writing the file.
pub fn write_omitted_list(path: &Path, omitted: &[PathBuf]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in omitted {
        writeln!(writer, "{}", entry.display())?;
    }
    writer.flush()
}
