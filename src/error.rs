//! Error and Result types for extraction.

use std::io;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// A convenience `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Everything that can abort an extraction.
///
/// Non-fatal conditions (a tag missing from one file, a file whose name does
/// not carry a start time) are not errors; they are collected as
/// [`Warning`](crate::data::model::Warning)s next to the result.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Date text could not be interpreted.
    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    /// Time-of-day text could not be interpreted.
    #[error("Invalid time: {0:?}")]
    InvalidTime(String),

    /// Only `csv` and `txt` files can be streamed.
    #[error("Unsupported file type .{extension} for {path}")]
    UnsupportedFileType { path: PathBuf, extension: String },

    /// The requested window ends before the earliest file starts.
    #[error("Requested range ending {requested_end} is not available; earliest file starts {earliest}")]
    RangeUnavailable {
        requested_end: NaiveDateTime,
        earliest: NaiveDateTime,
    },

    /// The first two distinct samples give a non-positive point estimate.
    #[error("Degenerate time base: sample interval of {interval_ms} ms gives an estimate of {estimate} points")]
    DegenerateTimeBase { interval_ms: i64, estimate: i64 },

    /// The catalog ended up empty.
    #[error("No usable data files")]
    NoUsableFiles,

    /// A requested field holds text that is not a number.
    #[error("Column {column} holds {text:?}, which is not a number")]
    InvalidValue { column: usize, text: String },

    /// A caller-supplied timestamp pattern is not a valid strftime pattern.
    #[error("Invalid timestamp format {0:?}")]
    InvalidFormat(String),

    /// Decimation interval must keep at least every sample.
    #[error("Decimation interval must be at least 1")]
    InvalidInterval,

    /// Malformed XLSX package contents.
    #[error("XLSX error: {0}")]
    Xlsx(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A per-line failure, located.
    #[error("{path}:{line}: {source}")]
    AtLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<ExtractError>,
    },
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn at_line(self, path: impl Into<PathBuf>, line: usize) -> Self {
        ExtractError::AtLine {
            path: path.into(),
            line,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`ExtractError::AtLine`].
    pub fn root(&self) -> &ExtractError {
        match self {
            ExtractError::AtLine { source, .. } => source.root(),
            other => other,
        }
    }
}
