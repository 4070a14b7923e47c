use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDateTime;

use super::datetime::parse_datetime;
use super::model::Dataset;
use crate::error::{ExtractError, Result};

/// Label pattern that `parse_datetime` reads back to the exact second.
pub const DEFAULT_LABEL_FORMAT: &str = "%Y/%-m/%-d %-H:%M:%S";

/// Shorter axis label pattern; not reversible.
pub const AXIS_LABEL_FORMAT: &str = "%-m/%-d %-H:%M";

// ---------------------------------------------------------------------------
// LabelFormat – validated strftime pattern
// ---------------------------------------------------------------------------

/// A chrono strftime pattern checked up front, so formatting never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFormat(String);

impl LabelFormat {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(ExtractError::InvalidFormat(pattern));
        }
        Ok(Self(pattern))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn format(&self, ts: NaiveDateTime) -> String {
        ts.format(&self.0).to_string()
    }
}

impl Default for LabelFormat {
    fn default() -> Self {
        Self(DEFAULT_LABEL_FORMAT.to_string())
    }
}

// ---------------------------------------------------------------------------
// ResampledView – display decimation of a dataset window
// ---------------------------------------------------------------------------

/// Every `stride`-th row of a dataset window, starting at `start_index`,
/// with one formatted label per emitted row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResampledView {
    /// One column per tag, in request order.
    pub series: Vec<Vec<f64>>,
    pub labels: Vec<String>,
    pub start_index: usize,
    pub stride: usize,
}

impl ResampledView {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Dataset row behind the `i`-th emitted point.
    pub fn source_index(&self, i: usize) -> usize {
        self.start_index + i * self.stride
    }
}

/// Thin the rows of `dataset` stamped within `[start, end]` (either order)
/// down to roughly `target_points` for display.
///
/// The stride is `max(1, span / (target_points - 1))` where `span` is the
/// index distance between the first and last row in range, and
/// `span / stride + 1` points are emitted, so the first row in range is
/// always present. `target_points` below 2 is treated as 2. The dataset is
/// only read.
pub fn resample(
    dataset: &Dataset,
    start: NaiveDateTime,
    end: NaiveDateTime,
    target_points: usize,
    format: &LabelFormat,
) -> ResampledView {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };

    let first = dataset.first_index_at_or_after(start);
    let last = match dataset.last_index_at_or_before(end) {
        Some(last) if last >= first => last,
        _ => {
            return ResampledView {
                series: vec![Vec::new(); dataset.series().len()],
                labels: Vec::new(),
                start_index: first,
                stride: 1,
            }
        }
    };

    let span = last - first;
    let target = target_points.max(2);
    let stride = (span / (target - 1)).max(1);
    let count = span / stride + 1;

    let rows = move || (0..count).map(move |k| first + k * stride);
    let series = dataset
        .series()
        .iter()
        .map(|column| rows().map(|i| column[i]).collect())
        .collect();
    let timestamps = dataset.timestamps();
    let labels = rows().map(|i| format.format(timestamps[i])).collect();

    ResampledView {
        series,
        labels,
        start_index: first,
        stride,
    }
}

/// Row of `dataset` whose timestamp is the one written in `label`.
pub fn lookup_label(dataset: &Dataset, label: &str) -> Result<Option<usize>> {
    Ok(dataset.position_of(parse_datetime(label)?))
}
