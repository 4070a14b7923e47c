use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;

use crate::data::catalog::FileKind;
use crate::data::model::Dataset;

/// Timestamp layout of exported rows.
pub const EXPORT_TIME_FORMAT: &str = "%-m/%-d/%Y %H:%M:%S";

/// `ExtractedData_yyyyMMdd-HHmmss`, stamped with `now`.
pub fn default_file_name(now: NaiveDateTime) -> String {
    format!("ExtractedData_{}", now.format("%Y%m%d-%H%M%S"))
}

/// Write the rows of `dataset` stamped within `[start, end]` (either order):
/// a `Time` + tags header, then one row per sample. Returns the number of
/// data rows written.
pub fn write_delimited<W: Write>(
    writer: W,
    dataset: &Dataset,
    start: NaiveDateTime,
    end: NaiveDateTime,
    kind: FileKind,
) -> Result<usize> {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    let mut out = csv::WriterBuilder::new()
        .delimiter(kind.delimiter())
        .from_writer(writer);

    let mut header = Vec::with_capacity(dataset.tags().len() + 1);
    header.push("Time");
    header.extend(dataset.tags().iter().map(String::as_str));
    out.write_record(&header).context("writing header")?;

    let first = dataset.first_index_at_or_after(start);
    let rows = match dataset.last_index_at_or_before(end) {
        Some(last) if last >= first => first..last + 1,
        _ => first..first,
    };

    let mut record = Vec::with_capacity(header.len());
    for row in rows.clone() {
        record.clear();
        record.push(dataset.timestamps()[row].format(EXPORT_TIME_FORMAT).to_string());
        record.extend(dataset.series().iter().map(|column| column[row].to_string()));
        out.write_record(&record)
            .with_context(|| format!("writing row {row}"))?;
    }
    out.flush().context("flushing export")?;
    Ok(rows.len())
}

/// [`write_delimited`] into a new file. Without an explicit `kind` the
/// extension (`.csv` or `.txt`) picks the delimiter.
pub fn export_to_path(
    path: &Path,
    kind: Option<FileKind>,
    dataset: &Dataset,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<usize> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    let Some(kind) = kind.or_else(|| FileKind::from_extension(ext)) else {
        bail!("Cannot export to .{ext}: use .csv or .txt");
    };

    let file = File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let rows = write_delimited(BufWriter::new(file), dataset, start, end, kind)?;
    log::info!("exported {rows} rows to {}", path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 9, 1)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap()
    }

    fn sample() -> Dataset {
        let timestamps = (0..5).map(|i| base() + Duration::seconds(i)).collect();
        Dataset::new(
            vec!["FT101".into(), "PT2".into()],
            timestamps,
            vec![
                vec![0.0, 1.5, 2.0, 3.0, 4.0],
                vec![10.0, f64::NAN, 12.0, 13.0, 14.25],
            ],
        )
    }

    #[test]
    fn test_default_file_name() {
        assert_eq!(default_file_name(base()), "ExtractedData_20180901-130000");
    }

    #[test]
    fn test_write_csv_sub_window() {
        let mut buf = Vec::new();
        let rows = write_delimited(
            &mut buf,
            &sample(),
            base() + Duration::seconds(3),
            base() + Duration::seconds(1),
            FileKind::Csv,
        )
        .unwrap();
        assert_eq!(rows, 3);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Time,FT101,PT2\n\
             9/1/2018 13:00:01,1.5,NaN\n\
             9/1/2018 13:00:02,2,12\n\
             9/1/2018 13:00:03,3,13\n"
        );
    }

    #[test]
    fn test_write_txt_empty_window() {
        let mut buf = Vec::new();
        let rows = write_delimited(
            &mut buf,
            &sample(),
            base() + Duration::hours(1),
            base() + Duration::hours(2),
            FileKind::Txt,
        )
        .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(String::from_utf8(buf).unwrap(), "Time\tFT101\tPT2\n");
    }

    #[test]
    fn test_export_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = export_to_path(&dir.path().join("out.xlsx"), None, &sample(), base(), base())
            .unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }

    #[test]
    fn test_export_with_explicit_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.dat");
        let rows = export_to_path(
            &path,
            Some(FileKind::Txt),
            &sample(),
            base(),
            base() + Duration::seconds(10),
        )
        .unwrap();
        assert_eq!(rows, 5);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Time\tFT101\tPT2\n9/1/2018 13:00:00\t0\t10\n"));
    }
}
