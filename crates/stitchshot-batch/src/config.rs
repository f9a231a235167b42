//! Batch configuration: TOML loading and validation.

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use stitchshot_pipeline::timestamp::{
    CAPTURE_TIME_TAG, DEFAULT_TOLERANCE_MINUTES, tolerance_minutes,
};
use stitchshot_pipeline::{OverlapConfig, PipelineError, TimestampExtractor};
use thiserror::Error;

use crate::batch::BatchOptions;
use crate::output::{DirectorySink, OutputNaming, output_format};

/// Default output extension.
pub const DEFAULT_OUTPUT_EXTENSION: &str = "png";

/// Errors that abort a run before any pair is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no input folder configured")]
    MissingInput,

    #[error("no output folder configured")]
    MissingOutput,

    #[error("input folder {} does not exist or is not a directory", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to create output folder {}: {source}", path.display())]
    CreateOutput { path: PathBuf, source: io::Error },

    #[error("unsupported output extension '{0}'")]
    UnsupportedExtension(String),

    #[error("tolerance must be at least one minute")]
    ZeroTolerance,

    #[error("empty timestamp tag")]
    EmptyTag,

    #[error(transparent)]
    Overlap(#[from] PipelineError),
}

/// Settings for a folder batch, as written in the config file.
///
/// Every field has a default so a partial file (or none) is valid; paths
/// are usually supplied on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Folder scanned for screenshots.
    pub input_folder_path: Option<PathBuf>,
    /// Folder receiving stitched images. Created if missing.
    pub output_folder_path: Option<PathBuf>,
    /// Maximum capture-time difference within a pair.
    pub tolerance_minutes: u32,
    /// Extension, and therefore format, of the outputs.
    pub output_extension: String,
    /// Also scan subfolders of the input folder.
    pub recursive: bool,
    /// Worker threads. Defaults to the available parallelism.
    pub workers: Option<NonZeroUsize>,
    /// Output stem for pairs without any capture time.
    pub fixed_output_name: Option<String>,
    /// Where to list the images left unpaired.
    pub omitted_list_path: Option<PathBuf>,
    /// Metadata tag holding the capture time.
    pub timestamp_tag: String,
    /// Debug-level logging.
    pub verbose: bool,
    /// Trace-level logging.
    pub spam: bool,
    /// Overlap search tuning.
    pub overlap: OverlapConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_folder_path: None,
            output_folder_path: None,
            tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
            recursive: false,
            workers: None,
            fixed_output_name: None,
            omitted_list_path: None,
            timestamp_tag: CAPTURE_TIME_TAG.to_string(),
            verbose: false,
            spam: false,
            overlap: OverlapConfig::default(),
        }
    }
}

/// A validated configuration, ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub recursive: bool,
    pub tolerance: TimeDelta,
    pub extension: String,
    pub format: ImageFormat,
    pub extractor: TimestampExtractor,
    pub omitted_list_path: Option<PathBuf>,
    pub options: BatchOptions,
}

impl ResolvedConfig {
    /// Sink writing into the output folder in the configured format.
    #[must_use]
    pub fn sink(&self) -> DirectorySink {
        DirectorySink::new(&self.output_dir, &self.extension, self.format)
    }
}

impl BatchConfig {
    /// Parse a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown value
    /// types.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the settings and prepare the output folder.
    ///
    /// The output folder is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the first problem found. Nothing is processed on error.
    pub fn validate(&self) -> Result<ResolvedConfig, ConfigError> {
        let input_dir = self
            .input_folder_path
            .clone()
            .ok_or(ConfigError::MissingInput)?;
        let output_dir = self
            .output_folder_path
            .clone()
            .ok_or(ConfigError::MissingOutput)?;

        if !input_dir.is_dir() {
            return Err(ConfigError::InputNotFound(input_dir));
        }
        if self.tolerance_minutes == 0 {
            return Err(ConfigError::ZeroTolerance);
        }
        if self.timestamp_tag.trim().is_empty() {
            return Err(ConfigError::EmptyTag);
        }
        self.overlap.validate()?;

        let extension = self.output_extension.trim_start_matches('.').to_string();
        let format = output_format(&extension)
            .ok_or_else(|| ConfigError::UnsupportedExtension(self.output_extension.clone()))?;

        fs::create_dir_all(&output_dir).map_err(|source| ConfigError::CreateOutput {
            path: output_dir.clone(),
            source,
        })?;

        Ok(ResolvedConfig {
            input_dir,
            output_dir,
            recursive: self.recursive,
            tolerance: tolerance_minutes(self.tolerance_minutes),
            extension,
            format,
            extractor: TimestampExtractor::new(self.timestamp_tag.trim()),
            omitted_list_path: self.omitted_list_path.clone(),
            options: BatchOptions {
                overlap: self.overlap.clone(),
                naming: OutputNaming {
                    fallback_name: self.fixed_output_name.clone(),
                },
                workers: self.workers,
            },
        })
    }
}
