use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::model::Warning;
use crate::error::{ExtractError, Result};

// ---------------------------------------------------------------------------
// FileKind – streamable delimited-text variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Comma separated.
    Csv,
    /// Tab separated.
    Txt,
}

impl FileKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "txt" => Some(FileKind::Txt),
            _ => None,
        }
    }

    pub fn delimiter(self) -> u8 {
        match self {
            FileKind::Csv => b',',
            FileKind::Txt => b'\t',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Txt => "txt",
        }
    }
}

// ---------------------------------------------------------------------------
// FileRecord – one input file and its nominal start time
// ---------------------------------------------------------------------------

/// An input file whose name ends in `{yyyyMMdd}[separators]{HHmmss}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Extension as written in the file name.
    pub extension: String,
    /// Start time encoded in the file name.
    pub start: NaiveDateTime,
}

impl FileRecord {
    /// Derive the record from the file name, `None` if the name does not
    /// follow the convention or encodes an impossible date or time.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = path.file_name()?.to_str()?;
        let (date, time, extension) = split_file_name(name)?;

        let digits = |s: &str| s.parse::<u32>().ok();
        let start = NaiveDate::from_ymd_opt(
            i32::try_from(digits(&date[0..4])?).ok()?,
            digits(&date[4..6])?,
            digits(&date[6..8])?,
        )?
        .and_hms_opt(
            digits(&time[0..2])?,
            digits(&time[2..4])?,
            digits(&time[4..6])?,
        )?;

        let extension = extension.to_string();
        Some(Self {
            path,
            extension,
            start,
        })
    }

    /// The delimited-text variant, or `UnsupportedFileType`.
    pub fn kind(&self) -> Result<FileKind> {
        FileKind::from_extension(&self.extension).ok_or_else(|| {
            ExtractError::UnsupportedFileType {
                path: self.path.clone(),
                extension: self.extension.clone(),
            }
        })
    }
}

/// Split `...{8 digits}{non-alphanumerics}{6 digits}.{word chars}` into its
/// date, time and extension parts.
fn split_file_name(name: &str) -> Option<(&str, &str, &str)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if extension.is_empty() || !extension.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let bytes = stem.as_bytes();
    let time_start = bytes.len().checked_sub(6)?;
    if !bytes[time_start..].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let mut date_end = time_start;
    while date_end > 0 && !bytes[date_end - 1].is_ascii_alphanumeric() {
        date_end -= 1;
    }
    let date_start = date_end.checked_sub(8)?;
    if !bytes[date_start..date_end].iter().all(u8::is_ascii_digit) {
        return None;
    }

    Some((&stem[date_start..date_end], &stem[time_start..], extension))
}

// ---------------------------------------------------------------------------
// Catalog – ordered, windowed file set
// ---------------------------------------------------------------------------

/// Input files ordered by start time, plus the names that were rejected.
#[derive(Debug, Clone)]
pub struct Catalog {
    files: Vec<FileRecord>,
    warnings: Vec<Warning>,
}

impl Catalog {
    /// Parse and sort every path. Badly named files are dropped with a
    /// warning; an empty result is `NoUsableFiles`.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        let mut warnings = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match FileRecord::from_path(path) {
                Some(record) => files.push(record),
                None => {
                    let warning = Warning::InvalidFileName {
                        path: path.to_path_buf(),
                    };
                    log::warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }

        if files.is_empty() {
            return Err(ExtractError::NoUsableFiles);
        }
        files.sort_by_key(|f| f.start);

        Ok(Self { files, warnings })
    }

    /// [`Catalog::from_paths`] followed by [`Catalog::restrict_to`].
    pub fn build<P: AsRef<Path>>(
        paths: &[P],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self> {
        let mut catalog = Self::from_paths(paths)?;
        catalog.restrict_to(start, end)?;
        Ok(catalog)
    }

    /// Keep only the files that can hold samples in `[start, end]`: the last
    /// file starting at or before `start` (or the first file if none does),
    /// and every later file starting at or before `end`.
    pub fn restrict_to(&mut self, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
        let earliest = match self.files.first() {
            Some(first) => first.start,
            None => return Err(ExtractError::NoUsableFiles),
        };
        if end < earliest {
            return Err(ExtractError::RangeUnavailable {
                requested_end: end,
                earliest,
            });
        }

        let first = self.files.iter().rposition(|f| f.start <= start).unwrap_or(0);
        self.files.drain(..first);

        let past_end = self
            .files
            .iter()
            .position(|f| f.start > end)
            .unwrap_or(self.files.len());
        self.files.truncate(past_end);

        log::debug!(
            "{} file(s) cover {start} .. {end}",
            self.files.len()
        );
        Ok(())
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<FileRecord>, Vec<Warning>) {
        (self.files, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn names(catalog: &Catalog) -> Vec<String> {
        catalog
            .files()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_file_name_patterns() {
        let record = FileRecord::from_path("/logs/Plant_20180901-130000.csv").unwrap();
        assert_eq!(record.start, at(2018, 9, 1, 13));
        assert_eq!(record.extension, "csv");
        assert_eq!(record.kind().unwrap(), FileKind::Csv);

        let record = FileRecord::from_path("20180901130000.TXT").unwrap();
        assert_eq!(record.kind().unwrap(), FileKind::Txt);

        let record = FileRecord::from_path("x 20180901 _ 130000.dat").unwrap();
        assert_eq!(record.start, at(2018, 9, 1, 13));
        assert!(matches!(
            record.kind(),
            Err(ExtractError::UnsupportedFileType { .. })
        ));
    }

    #[test]
    fn test_rejected_file_names() {
        for name in [
            "notes.csv",
            "20180901-13000.csv",
            "2018091-130000.csv",
            "20180901a130000.csv",
            "20180901-130000",
            "20180901-130000.csv.bak",
            "20181301-130000.csv",
            "20180901-250000.csv",
        ] {
            assert!(FileRecord::from_path(name).is_none(), "{name} accepted");
        }
    }

    #[test]
    fn test_sorts_and_reports_invalid_names() {
        let catalog = Catalog::from_paths(&[
            "b_20180902-000000.csv",
            "junk.csv",
            "a_20180901-000000.csv",
        ])
        .unwrap();
        assert_eq!(
            names(&catalog),
            vec!["a_20180901-000000.csv", "b_20180902-000000.csv"]
        );
        assert_eq!(catalog.warnings().len(), 1);
    }

    #[test]
    fn test_no_usable_files() {
        let err = Catalog::from_paths(&["junk.csv"]).unwrap_err();
        assert!(matches!(err, ExtractError::NoUsableFiles));
    }

    #[test]
    fn test_window_before_first_file() {
        let err = Catalog::build(
            &["20180901-000000.csv"],
            at(2018, 8, 1, 0),
            at(2018, 8, 31, 0),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::RangeUnavailable { .. }));
    }

    #[test]
    fn test_window_selection() {
        let paths = [
            "20180901-000000.csv",
            "20180902-000000.csv",
            "20180903-000000.csv",
            "20180904-000000.csv",
            "20180905-000000.csv",
        ];
        let catalog = Catalog::build(&paths, at(2018, 9, 2, 12), at(2018, 9, 3, 12)).unwrap();
        assert_eq!(
            names(&catalog),
            vec!["20180902-000000.csv", "20180903-000000.csv"]
        );

        // Window starting before every file keeps the first one.
        let catalog = Catalog::build(&paths, at(2018, 8, 1, 0), at(2018, 9, 1, 12)).unwrap();
        assert_eq!(names(&catalog), vec!["20180901-000000.csv"]);

        // Window starting after every file keeps only the last one.
        let catalog = Catalog::build(&paths, at(2018, 9, 9, 0), at(2018, 9, 10, 0)).unwrap();
        assert_eq!(names(&catalog), vec!["20180905-000000.csv"]);
    }

    #[test]
    fn test_file_starting_at_window_end_is_included() {
        let paths = [
            "20180901-000000.csv",
            "20180902-000000.csv",
            "20180903-000000.csv",
        ];
        let catalog = Catalog::build(&paths, at(2018, 9, 1, 6), at(2018, 9, 2, 0)).unwrap();
        assert_eq!(
            names(&catalog),
            vec!["20180901-000000.csv", "20180902-000000.csv"]
        );
    }

    proptest! {
        #[test]
        fn test_window_end_on_a_file_start_keeps_that_file(
            hours in prop::collection::btree_set(0i64..2_000, 1..20),
            pick in any::<prop::sample::Index>(),
            lead in 0i64..3_000,
        ) {
            let base = at(2018, 9, 1, 0);
            let starts: Vec<NaiveDateTime> =
                hours.iter().map(|&h| base + Duration::hours(h)).collect();
            let paths: Vec<String> = starts
                .iter()
                .map(|s| format!("{}.csv", s.format("%Y%m%d-%H%M%S")))
                .collect();
            let end = starts[pick.index(starts.len())];
            let start = end - Duration::hours(lead);

            let catalog = Catalog::build(&paths, start, end).unwrap();
            let kept: Vec<NaiveDateTime> = catalog.files().iter().map(|f| f.start).collect();
            prop_assert_eq!(kept.last(), Some(&end));
            for s in starts.iter().filter(|&&s| s > start && s <= end) {
                prop_assert!(kept.contains(s));
            }
        }
    }

    #[test]
    fn test_file_starting_at_window_start_replaces_earlier() {
        let paths = ["20180901-000000.csv", "20180902-000000.csv"];
        let catalog = Catalog::build(&paths, at(2018, 9, 2, 0), at(2018, 9, 2, 6)).unwrap();
        assert_eq!(names(&catalog), vec!["20180902-000000.csv"]);
    }
}
