use chrono::NaiveDateTime;

use crate::data::datetime::parse_datetime;
use crate::data::model::{Dataset, Tag};
use crate::data::resample::{resample, LabelFormat, ResampledView};
use crate::error::Result;

/// Display points per tag when nothing else is asked for.
pub const DEFAULT_POINTS_PER_LINE: usize = 500;

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// What a chart of an extracted dataset shows, independent of rendering.
///
/// Any change to the range, the point budget or the label format rebuilds
/// `view` from the dataset; the dataset itself is never touched.
pub struct ViewState {
    /// Extracted dataset (None until an extraction finished).
    pub dataset: Option<Dataset>,

    /// Current zoom window.
    pub range: Option<(NaiveDateTime, NaiveDateTime)>,

    /// Display points per tag.
    pub points_per_line: usize,

    pub label_format: LabelFormat,

    /// Resampled contents of `range`.
    pub view: ResampledView,

    /// Status / error message for the user.
    pub status_message: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            dataset: None,
            range: None,
            points_per_line: DEFAULT_POINTS_PER_LINE,
            label_format: LabelFormat::default(),
            view: ResampledView::default(),
            status_message: None,
        }
    }
}

impl ViewState {
    /// Show a newly extracted dataset over its full time span.
    pub fn set_dataset(&mut self, dataset: Dataset) {
        self.range = full_range(&dataset);
        self.status_message = Some(format!(
            "{} rows x {} tags",
            dataset.len(),
            dataset.tags().len()
        ));
        self.dataset = Some(dataset);
        self.rebuild();
    }

    /// Zoom to `[start, end]` (either order).
    pub fn set_range(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        self.range = Some(if start <= end { (start, end) } else { (end, start) });
        self.rebuild();
    }

    pub fn set_points_per_line(&mut self, points: usize) {
        self.points_per_line = points;
        self.rebuild();
    }

    pub fn set_label_format(&mut self, format: LabelFormat) {
        self.label_format = format;
        self.rebuild();
    }

    /// Zoom to the instants written in two labels, e.g. typed bounds.
    ///
    /// Only exact when the label format keeps year, date and seconds (as
    /// the default does); a format like [`AXIS_LABEL_FORMAT`] loses them
    /// and the missing year is taken as the current one.
    ///
    /// [`AXIS_LABEL_FORMAT`]: crate::data::resample::AXIS_LABEL_FORMAT
    pub fn zoom_to_labels(&mut self, from: &str, to: &str) -> Result<()> {
        let start = parse_datetime(from)?;
        let end = parse_datetime(to)?;
        self.set_range(start, end);
        Ok(())
    }

    /// Zoom to the span between two emitted points of the current view.
    /// Returns false if either index is out of range.
    pub fn zoom_to_points(&mut self, a: usize, b: usize) -> bool {
        let Some(dataset) = &self.dataset else {
            return false;
        };
        let len = self.view.len();
        if a >= len || b >= len {
            return false;
        }
        let timestamps = dataset.timestamps();
        let (Some(&start), Some(&end)) = (
            timestamps.get(self.view.source_index(a)),
            timestamps.get(self.view.source_index(b)),
        ) else {
            return false;
        };
        self.set_range(start, end);
        true
    }

    /// Back to the dataset's full time span.
    pub fn reset_zoom(&mut self) {
        self.range = self.dataset.as_ref().and_then(full_range);
        self.rebuild();
    }

    /// Label and per-tag values under the `point`-th emitted point.
    pub fn legend_values(&self, point: usize) -> Option<(&str, Vec<(&Tag, f64)>)> {
        let dataset = self.dataset.as_ref()?;
        let label = self.view.labels.get(point)?;
        let values = dataset.values_at(self.view.source_index(point))?;
        Some((label, dataset.tags().iter().zip(values).collect()))
    }

    fn rebuild(&mut self) {
        self.view = match (&self.dataset, self.range) {
            (Some(dataset), Some((start, end))) => {
                resample(dataset, start, end, self.points_per_line, &self.label_format)
            }
            _ => ResampledView::default(),
        };
    }
}

fn full_range(dataset: &Dataset) -> Option<(NaiveDateTime, NaiveDateTime)> {
    Some((dataset.first_timestamp()?, dataset.last_timestamp()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resample::AXIS_LABEL_FORMAT;
    use chrono::{Duration, NaiveDate};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 9, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn state(rows: i64) -> ViewState {
        let timestamps = (0..rows).map(|i| base() + Duration::seconds(i)).collect();
        let a = (0..rows).map(|i| i as f64).collect();
        let b = (0..rows).map(|i| -(i as f64)).collect();
        let mut state = ViewState::default();
        state.set_dataset(Dataset::new(
            vec!["a".into(), "b".into()],
            timestamps,
            vec![a, b],
        ));
        state
    }

    #[test]
    fn test_full_range_on_load() {
        let state = state(1001);
        assert_eq!(
            state.range,
            Some((base(), base() + Duration::seconds(1000)))
        );
        assert_eq!(state.view.stride, 2);
        assert_eq!(state.view.len(), 501);
    }

    #[test]
    fn test_zoom_and_reset() {
        let mut state = state(1001);
        state.zoom_to_labels("2018/9/1 0:00:10", "2018/9/1 0:00:05").unwrap();
        assert_eq!(state.view.stride, 1);
        assert_eq!(state.view.series[0], vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);

        assert!(state.zoom_to_points(1, 3));
        assert_eq!(state.view.series[0], vec![6.0, 7.0, 8.0]);
        assert!(!state.zoom_to_points(1, 30));

        state.reset_zoom();
        assert_eq!(state.view.len(), 501);
        assert!(state.zoom_to_labels("bogus", "2018/9/1 0:00:05").is_err());
    }

    #[test]
    fn test_zoom_to_points_with_lossy_labels() {
        let start = NaiveDate::from_ymd_opt(2015, 3, 7)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let timestamps = (0..1001).map(|i| start + Duration::seconds(i)).collect();
        let values = (0..1001).map(|i| i as f64).collect();
        let mut state = ViewState::default();
        state.label_format = LabelFormat::new(AXIS_LABEL_FORMAT).unwrap();
        state.set_dataset(Dataset::new(vec!["a".into()], timestamps, vec![values]));
        assert_eq!(state.view.stride, 2);

        assert!(state.zoom_to_points(0, 50));
        assert_eq!(state.range, Some((start, start + Duration::seconds(100))));
        assert_eq!(state.view.len(), 101);
        assert_eq!(state.view.series[0][100], 100.0);
        assert_eq!(state.view.labels[0], "3/7 6:00");
    }

    #[test]
    fn test_points_per_line() {
        let mut state = state(1001);
        state.set_points_per_line(11);
        assert_eq!(state.view.stride, 100);
        assert_eq!(state.view.len(), 11);
    }

    #[test]
    fn test_legend_values() {
        let mut state = state(1001);
        state.set_points_per_line(11);
        let (label, values) = state.legend_values(3).unwrap();
        assert_eq!(label, "2018/9/1 0:05:00");
        assert_eq!(values, vec![(&"a".to_string(), 300.0), (&"b".to_string(), -300.0)]);
        assert!(state.legend_values(11).is_none());
        assert!(ViewState::default().legend_values(0).is_none());
    }
}
