//! Common test utilities: log files written into a temporary directory.

#![allow(dead_code)] // Test utilities may not all be used in every test file

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

/// Seconds after 2018-09-01 00:00:00.
pub fn at(seconds: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 9, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::seconds(seconds)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

pub fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A temporary directory of log files.
pub struct LogDir {
    pub dir: TempDir,
}

impl LogDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` verbatim.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("Failed to write log file");
        path
    }

    /// Comma-separated log with `Date` and `Time` columns. Each row is a
    /// second offset from [`at`] and the tag values in column order.
    pub fn csv_log(&self, name: &str, columns: &[&str], rows: &[(i64, Vec<f64>)]) -> PathBuf {
        let mut text = format!("Date,Time,{}\n", columns.join(","));
        for (seconds, values) in rows {
            let ts = at(*seconds);
            text.push_str(&format!("{},{}", ts.format("%-m/%-d/%Y"), ts.format("%-H:%M:%S")));
            for value in values {
                text.push_str(&format!(",{value}"));
            }
            text.push('\n');
        }
        self.write(name, &text)
    }

    /// Tab-separated log with one combined timestamp column.
    pub fn txt_log(&self, name: &str, columns: &[&str], rows: &[(i64, Vec<f64>)]) -> PathBuf {
        let mut text = format!("Timestamp\t{}\r\n", columns.join("\t"));
        for (seconds, values) in rows {
            text.push_str(&at(*seconds).format("%Y/%-m/%-d %-I:%M:%S %p").to_string());
            for value in values {
                text.push_str(&format!("\t{value}"));
            }
            text.push_str("\r\n");
        }
        self.write(name, &text)
    }
}

/// `(offset, [offset as value, -offset])` rows for offsets in `range`.
pub fn ramp(range: std::ops::Range<i64>) -> Vec<(i64, Vec<f64>)> {
    range.map(|s| (s, vec![s as f64, -(s as f64)])).collect()
}
