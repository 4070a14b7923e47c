use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDateTime;

// ---------------------------------------------------------------------------
// Tag – a requested column
// ---------------------------------------------------------------------------

/// A column name requested by the caller. Its position in the request is the
/// output channel number.
pub type Tag = String;

/// Column index recorded for a tag that a file's header does not contain.
pub const TAG_NOT_FOUND: usize = usize::MAX;

// ---------------------------------------------------------------------------
// IndexWithPosition – where a requested tag sits in one file
// ---------------------------------------------------------------------------

/// Pairs a column index in the current file with the output channel it feeds.
///
/// Sorting a file's pairs by `column` lets one left-to-right pass over a line
/// harvest every requested field. Missing tags carry [`TAG_NOT_FOUND`] and so
/// sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexWithPosition {
    pub column: usize,
    pub position: usize,
}

impl IndexWithPosition {
    pub fn new(column: usize, position: usize) -> Self {
        Self { column, position }
    }

    pub fn missing(position: usize) -> Self {
        Self::new(TAG_NOT_FOUND, position)
    }

    pub fn is_missing(&self) -> bool {
        self.column == TAG_NOT_FOUND
    }
}

// ---------------------------------------------------------------------------
// Warning – recoverable conditions reported next to the result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// File name does not end in `{yyyyMMdd}[sep]{HHmmss}.{ext}`; file skipped.
    InvalidFileName { path: PathBuf },
    /// A requested tag is absent from one file; its channel is NaN for that
    /// file's rows.
    TagNotFound { tag: Tag, path: PathBuf },
    /// A file holds a header but no data lines.
    EmptyFile { path: PathBuf },
    /// Rows stamped earlier than the last written row were dropped.
    OutOfOrder { path: PathBuf, dropped: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::InvalidFileName { path } => write!(
                f,
                "File name {} is not valid: it must end with the start time as yyyyMMddHHmmss and an extension",
                path.display()
            ),
            Warning::TagNotFound { tag, path } => {
                write!(f, "Cannot find tag {tag:?} in data file {}", path.display())
            }
            Warning::EmptyFile { path } => {
                write!(f, "Data file {} holds no data lines", path.display())
            }
            Warning::OutOfOrder { path, dropped } => write!(
                f,
                "Dropped {dropped} row(s) of {} stamped earlier than data already extracted",
                path.display()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset – the merged result
// ---------------------------------------------------------------------------

/// Time-aligned output of one extraction: a non-decreasing timestamp column
/// and one value column per requested tag, all of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    tags: Vec<Tag>,
    timestamps: Vec<NaiveDateTime>,
    series: Vec<Vec<f64>>,
}

impl Dataset {
    /// Assemble a dataset from parallel columns.
    ///
    /// # Panics
    ///
    /// If the number of value columns differs from the number of tags, or a
    /// value column's length differs from the timestamp column's.
    pub fn new(tags: Vec<Tag>, timestamps: Vec<NaiveDateTime>, series: Vec<Vec<f64>>) -> Self {
        assert_eq!(tags.len(), series.len(), "one value column per tag");
        assert!(
            series.iter().all(|s| s.len() == timestamps.len()),
            "value columns must match the timestamp column"
        );
        Self {
            tags,
            timestamps,
            series,
        }
    }

    pub fn empty(tags: Vec<Tag>) -> Self {
        let series = vec![Vec::new(); tags.len()];
        Self::new(tags, Vec::new(), series)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// All value columns, in request order.
    pub fn series(&self) -> &[Vec<f64>] {
        &self.series
    }

    /// One value column.
    pub fn channel(&self, position: usize) -> Option<&[f64]> {
        self.series.get(position).map(Vec::as_slice)
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    /// Index of the first row at or after `ts` (`len()` if none).
    pub fn first_index_at_or_after(&self, ts: NaiveDateTime) -> usize {
        self.timestamps.partition_point(|&t| t < ts)
    }

    /// Index of the last row at or before `ts`.
    pub fn last_index_at_or_before(&self, ts: NaiveDateTime) -> Option<usize> {
        self.timestamps.partition_point(|&t| t <= ts).checked_sub(1)
    }

    /// Index of the row stamped exactly `ts`.
    pub fn position_of(&self, ts: NaiveDateTime) -> Option<usize> {
        let index = self.first_index_at_or_after(ts);
        (self.timestamps.get(index) == Some(&ts)).then_some(index)
    }

    /// Every channel's value at one row, in request order.
    pub fn values_at(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.len()).then(|| self.series.iter().map(|s| s[index]).collect())
    }
}

// ---------------------------------------------------------------------------
// Extraction – dataset plus diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Extraction {
    pub dataset: Dataset,
    pub warnings: Vec<Warning>,
}
