//! Field extraction from single delimited lines.
//!
//! Lines are scanned left to right exactly once and only the requested fields
//! are looked at; nothing is allocated for the columns in between, which
//! matters for log files with thousands of mostly irrelevant columns.

use chrono::NaiveDateTime;

use super::datetime::{parse_date_in_year, parse_time};
use super::model::IndexWithPosition;
use crate::error::{ExtractError, Result};

// ---------------------------------------------------------------------------
// Raw field access
// ---------------------------------------------------------------------------

/// The bytes between the `nth` and `nth + 1` occurrence of `delimiter`
/// (zero-based). Empty when the line has fewer fields.
pub fn field_at(line: &[u8], delimiter: u8, nth: usize) -> &[u8] {
    line.split(|&b| b == delimiter).nth(nth).unwrap_or(&[])
}

/// Several fields in one pass. `columns` must be sorted ascending; repeats
/// are allowed.
pub fn fields_at<'a>(line: &'a [u8], delimiter: u8, columns: &[usize]) -> Vec<&'a [u8]> {
    let mut cursor = FieldCursor::new(line, delimiter);
    columns
        .iter()
        .map(|&column| cursor.seek(column).unwrap_or(&[]))
        .collect()
}

/// Parse the requested fields of `line` straight into `out`.
///
/// `columns` must be sorted by column index. Each value lands in
/// `out[position]`. Tags missing from the file sort last and get NaN without
/// any further scanning; so do fields beyond the end of a short line and
/// empty fields.
pub fn scan_values(
    line: &[u8],
    delimiter: u8,
    columns: &[IndexWithPosition],
    out: &mut [f64],
) -> Result<()> {
    let mut cursor = FieldCursor::new(line, delimiter);
    for (i, target) in columns.iter().enumerate() {
        if target.is_missing() {
            for rest in &columns[i..] {
                out[rest.position] = f64::NAN;
            }
            return Ok(());
        }
        out[target.position] = match cursor.seek(target.column) {
            Some(raw) => parse_value(raw, target.column)?,
            None => f64::NAN,
        };
    }
    Ok(())
}

fn parse_value(raw: &[u8], column: usize) -> Result<f64> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Ok(f64::NAN);
    }
    std::str::from_utf8(trimmed)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ExtractError::InvalidValue {
            column,
            text: String::from_utf8_lossy(raw).into_owned(),
        })
}

/// Forward-only walk over a line's fields.
struct FieldCursor<'a> {
    rest: Option<&'a [u8]>,
    delimiter: u8,
    next_index: usize,
    current: Option<(usize, &'a [u8])>,
}

impl<'a> FieldCursor<'a> {
    fn new(line: &'a [u8], delimiter: u8) -> Self {
        Self {
            rest: Some(line),
            delimiter,
            next_index: 0,
            current: None,
        }
    }

    fn advance(&mut self) -> Option<(usize, &'a [u8])> {
        let rest = self.rest?;
        let (field, remaining) = match rest.iter().position(|&b| b == self.delimiter) {
            Some(end) => (&rest[..end], Some(&rest[end + 1..])),
            None => (rest, None),
        };
        self.rest = remaining;
        let index = self.next_index;
        self.next_index += 1;
        self.current = Some((index, field));
        Some((index, field))
    }

    fn seek(&mut self, column: usize) -> Option<&'a [u8]> {
        if let Some((index, field)) = self.current {
            if index == column {
                return Some(field);
            }
        }
        while let Some((index, field)) = self.advance() {
            if index == column {
                return Some(field);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Where a file keeps its timestamps, decided once from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampLayout {
    /// Header starts with `date` (or `;date`): field 0 is the date and
    /// field 1 the time.
    DateTimeColumns,
    /// Field 0 holds `"<date> <time>"`, split at the first space.
    CombinedColumn,
}

impl TimestampLayout {
    pub fn from_first_column(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        if name == "date" || name == ";date" {
            TimestampLayout::DateTimeColumns
        } else {
            TimestampLayout::CombinedColumn
        }
    }

    /// Timestamp of one data line. `current_year` fills in dates without one.
    pub fn timestamp(
        &self,
        line: &[u8],
        delimiter: u8,
        current_year: i32,
    ) -> Result<NaiveDateTime> {
        let (date, time) = match self {
            TimestampLayout::DateTimeColumns => {
                let mut fields = line.split(|&b| b == delimiter);
                (
                    fields.next().unwrap_or(&[]),
                    fields.next().unwrap_or(&[]),
                )
            }
            TimestampLayout::CombinedColumn => {
                let first = field_at(line, delimiter, 0);
                match first.iter().position(|&b| b == b' ') {
                    Some(space) => (&first[..space], &first[space + 1..]),
                    None => (first, &[][..]),
                }
            }
        };
        let date = parse_date_in_year(&String::from_utf8_lossy(date), current_year)?;
        let time = parse_time(&String::from_utf8_lossy(time))?;
        Ok(date.and_time(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::TAG_NOT_FOUND;
    use chrono::NaiveDate;

    #[test]
    fn test_field_at() {
        let line = b"a,b,,d";
        assert_eq!(field_at(line, b',', 0), b"a");
        assert_eq!(field_at(line, b',', 1), b"b");
        assert_eq!(field_at(line, b',', 2), b"");
        assert_eq!(field_at(line, b',', 3), b"d");
        assert_eq!(field_at(line, b',', 9), b"");
    }

    #[test]
    fn test_fields_at_with_repeats() {
        let line = b"t\t1\t2\t3";
        let fields = fields_at(line, b'\t', &[1, 1, 3, 7]);
        assert_eq!(fields, vec![&b"1"[..], b"1", b"3", b""]);
    }

    #[test]
    fn test_scan_values_writes_by_position() {
        let line = b"9/1/2018,0:00:01,x,1.5,y, 2.5 ,z";
        let mut columns = vec![
            IndexWithPosition::new(5, 0),
            IndexWithPosition::new(3, 1),
        ];
        columns.sort();
        let mut out = [0.0; 2];
        scan_values(line, b',', &columns, &mut out).unwrap();
        assert_eq!(out, [2.5, 1.5]);
    }

    #[test]
    fn test_missing_tags_become_nan() {
        let line = b"d,t,1,2";
        let columns = vec![
            IndexWithPosition::new(3, 2),
            IndexWithPosition::missing(0),
            IndexWithPosition::missing(1),
        ];
        let mut out = [0.0; 3];
        scan_values(line, b',', &columns, &mut out).unwrap();
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(columns[1].column, TAG_NOT_FOUND);
    }

    #[test]
    fn test_short_lines_and_empty_fields() {
        let line = b"d,t,,4";
        let columns = vec![
            IndexWithPosition::new(2, 0),
            IndexWithPosition::new(3, 1),
            IndexWithPosition::new(8, 2),
        ];
        let mut out = [0.0; 3];
        scan_values(line, b',', &columns, &mut out).unwrap();
        assert!(out[0].is_nan());
        assert_eq!(out[1], 4.0);
        assert!(out[2].is_nan());
    }

    #[test]
    fn test_duplicate_columns() {
        let columns = vec![IndexWithPosition::new(1, 0), IndexWithPosition::new(1, 1)];
        let mut out = [0.0; 2];
        scan_values(b"t,7", b',', &columns, &mut out).unwrap();
        assert_eq!(out, [7.0, 7.0]);
    }

    #[test]
    fn test_non_numeric_field_is_an_error() {
        let columns = vec![IndexWithPosition::new(1, 0)];
        let mut out = [0.0; 1];
        let err = scan_values(b"t,abc", b',', &columns, &mut out).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidValue { column: 1, .. }));
    }

    #[test]
    fn test_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2018, 9, 1)
            .unwrap()
            .and_hms_opt(13, 0, 5)
            .unwrap();

        let layout = TimestampLayout::from_first_column("Date");
        assert_eq!(layout, TimestampLayout::DateTimeColumns);
        let ts = layout.timestamp(b"09/01/2018,13:00:05,1.0", b',', 2020).unwrap();
        assert_eq!(ts, expected);

        let layout = TimestampLayout::from_first_column(";DATE");
        assert_eq!(layout, TimestampLayout::DateTimeColumns);

        let layout = TimestampLayout::from_first_column("Time");
        assert_eq!(layout, TimestampLayout::CombinedColumn);
        let ts = layout
            .timestamp(b"2018/09/01 1:00:05 PM\t1.0\t2.0", b'\t', 2020)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_combined_column_without_time_fails() {
        let err = TimestampLayout::CombinedColumn
            .timestamp(b"2018/09/01,1.0", b',', 2020)
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidTime(_)));
    }
}
