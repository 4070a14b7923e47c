//! Streaming merge of many log files into one time-aligned dataset.
//!
//! Files are walked strictly in start-time order, one at a time. Each line's
//! timestamp is checked against the requested window; in-window lines go
//! through [`MergeState::admit`], which implements decimation and
//! last-writer-wins for repeated timestamps. That state is carried across
//! file boundaries so the seam between two files behaves like any other pair
//! of lines.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use chrono::{Datelike, Local, NaiveDateTime};

use super::catalog::{Catalog, FileKind, FileRecord};
use super::model::{Dataset, Extraction, IndexWithPosition, Tag, Warning};
use super::scanner::{scan_values, TimestampLayout};
use crate::error::{ExtractError, Result};

/// Upper bound on rows allocated up front from the sizing estimate.
const MAX_PREALLOCATED_ROWS: usize = 1 << 20;

// ---------------------------------------------------------------------------
// ExtractRequest
// ---------------------------------------------------------------------------

/// What to extract: a time window, the tags in output order and the
/// decimation interval (keep every `interval`-th in-window sample).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub tags: Vec<Tag>,
    pub interval: usize,
    /// Year assumed for file dates that carry none.
    pub current_year: i32,
    /// Initial buffer size, replacing the estimate derived from the first
    /// file's sample interval.
    pub capacity_hint: Option<usize>,
}

impl ExtractRequest {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, tags: Vec<Tag>) -> Self {
        Self {
            start,
            end,
            tags,
            interval: 1,
            current_year: Local::now().year(),
            capacity_hint: None,
        }
    }

    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_capacity_hint(mut self, rows: usize) -> Self {
        self.capacity_hint = Some(rows);
        self
    }

    /// `(start, end)` in ascending order.
    pub fn window(&self) -> (NaiveDateTime, NaiveDateTime) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }
}

// ---------------------------------------------------------------------------
// MergeState – decimation and duplicate handling across files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    Idle,
    HeaderResolved,
    EstimatingInterval,
    Streaming,
    FileBoundary,
    Finalizing,
}

/// What to do with one in-window sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Write a new row.
    Append,
    /// Same timestamp as the last written row: replace it.
    Overwrite,
    /// Dropped by decimation.
    Skip,
    /// Earlier than the last written row: dropped.
    Stale,
}

#[derive(Debug, Clone)]
pub struct MergeState {
    interval: usize,
    skip_counter: usize,
    last_written: Option<NaiveDateTime>,
    phase: MergePhase,
}

impl MergeState {
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            // The first in-window sample is always kept.
            skip_counter: interval,
            last_written: None,
            phase: MergePhase::Idle,
        }
    }

    /// Decide the fate of an in-window sample stamped `ts`.
    pub fn admit(&mut self, ts: NaiveDateTime) -> Admission {
        match self.last_written {
            Some(last) if ts == last => {
                self.skip_counter = 1;
                return Admission::Overwrite;
            }
            Some(last) if ts < last => return Admission::Stale,
            _ => {}
        }
        if self.skip_counter >= self.interval {
            self.skip_counter = 1;
            self.last_written = Some(ts);
            Admission::Append
        } else {
            self.skip_counter += 1;
            Admission::Skip
        }
    }

    pub fn last_written(&self) -> Option<NaiveDateTime> {
        self.last_written
    }

    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    fn enter(&mut self, phase: MergePhase) {
        log::debug!("merge phase {:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }
}

// ---------------------------------------------------------------------------
// SeriesBuffer – growable output columns
// ---------------------------------------------------------------------------

/// Timestamp column plus one value column per tag, all filled in lockstep.
/// Capacity doubles whenever a push finds the buffers full.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    timestamps: Vec<NaiveDateTime>,
    series: Vec<Vec<f64>>,
    capacity: usize,
}

impl SeriesBuffer {
    pub fn with_capacity(channels: usize, rows: usize) -> Self {
        let capacity = rows.max(1);
        Self {
            timestamps: Vec::with_capacity(capacity),
            series: (0..channels).map(|_| Vec::with_capacity(capacity)).collect(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a row. `row` holds one value per channel.
    pub fn push(&mut self, ts: NaiveDateTime, row: &[f64]) {
        if self.len() == self.capacity {
            self.grow();
        }
        self.timestamps.push(ts);
        for (column, &value) in self.series.iter_mut().zip(row) {
            column.push(value);
        }
    }

    /// Replace the values of the last row, keeping its timestamp.
    pub fn overwrite_last(&mut self, row: &[f64]) {
        for (column, &value) in self.series.iter_mut().zip(row) {
            if let Some(slot) = column.last_mut() {
                *slot = value;
            }
        }
    }

    fn grow(&mut self) {
        let capacity = self.capacity * 2;
        log::debug!("growing series buffers from {} to {capacity} rows", self.capacity);
        let additional = capacity - self.len();
        self.timestamps.reserve_exact(additional);
        for column in &mut self.series {
            column.reserve_exact(additional);
        }
        self.capacity = capacity;
    }

    /// Trim to the filled length and hand the columns over.
    pub fn finish(mut self, tags: Vec<Tag>) -> Dataset {
        self.timestamps.shrink_to_fit();
        for column in &mut self.series {
            column.shrink_to_fit();
        }
        Dataset::new(tags, self.timestamps, self.series)
    }
}

/// Rows needed for `[start, end]` given the first two distinct sample times
/// and the decimation interval: `ceil(span / (step * interval)) + 1`.
pub fn estimate_point_count(
    start: NaiveDateTime,
    end: NaiveDateTime,
    first: NaiveDateTime,
    second: NaiveDateTime,
    interval: usize,
) -> Result<usize> {
    let step_ms = (second - first).num_milliseconds();
    let span_ms = (end - start).num_milliseconds();
    let per_row = step_ms.saturating_mul(i64::try_from(interval).unwrap_or(i64::MAX));
    if per_row == 0 {
        return Err(ExtractError::DegenerateTimeBase {
            interval_ms: step_ms,
            estimate: 0,
        });
    }

    let quotient = span_ms / per_row;
    let remainder = span_ms % per_row;
    let ceil = if remainder != 0 && (remainder > 0) == (per_row > 0) {
        quotient + 1
    } else {
        quotient
    };
    let estimate = ceil + 1;

    usize::try_from(estimate)
        .ok()
        .filter(|&rows| rows > 0)
        .ok_or(ExtractError::DegenerateTimeBase {
            interval_ms: step_ms,
            estimate,
        })
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Catalog `paths`, select the files covering the request window and merge
/// them. Catalog warnings are returned with the merge warnings.
pub fn extract<P: AsRef<Path>>(paths: &[P], request: &ExtractRequest) -> Result<Extraction> {
    if request.interval == 0 {
        return Err(ExtractError::InvalidInterval);
    }
    let (start, end) = request.window();
    let (files, mut warnings) = Catalog::build(paths, start, end)?.into_parts();

    let mut extraction = merge_files(&files, request)?;
    warnings.append(&mut extraction.warnings);
    extraction.warnings = warnings;
    Ok(extraction)
}

/// Merge already ordered `files`.
///
/// Every file must be a csv or txt file; this is checked before any file is
/// opened.
pub fn merge_files(files: &[FileRecord], request: &ExtractRequest) -> Result<Extraction> {
    if request.interval == 0 {
        return Err(ExtractError::InvalidInterval);
    }
    let kinds = files
        .iter()
        .map(FileRecord::kind)
        .collect::<Result<Vec<_>>>()?;

    let timer = Instant::now();
    let mut merger = Merger::new(request);

    for (record, kind) in files.iter().zip(kinds) {
        log::info!("reading {}", record.path.display());
        let flow = merger.stream_file(record, kind)?;
        if flow == Flow::PastWindowEnd {
            break;
        }
        merger.state.enter(MergePhase::FileBoundary);
    }

    merger.state.enter(MergePhase::Finalizing);
    let dataset = merger.buffer.finish(request.tags.clone());
    log::info!(
        "Data extraction completed in {} ms: {} rows x {} tags",
        timer.elapsed().as_millis(),
        dataset.len(),
        dataset.tags().len()
    );

    Ok(Extraction {
        dataset,
        warnings: merger.warnings,
    })
}

// ---------------------------------------------------------------------------
// Per-file streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    PastWindowEnd,
}

/// Column mapping and timestamp layout of the file being streamed.
struct FileLayout {
    delimiter: u8,
    columns: Vec<IndexWithPosition>,
    timestamps: TimestampLayout,
}

struct Merger<'a> {
    request: &'a ExtractRequest,
    start: NaiveDateTime,
    end: NaiveDateTime,
    state: MergeState,
    buffer: SeriesBuffer,
    sized: bool,
    row: Vec<f64>,
    stale: usize,
    warnings: Vec<Warning>,
}

impl<'a> Merger<'a> {
    fn new(request: &'a ExtractRequest) -> Self {
        let (start, end) = request.window();
        Self {
            request,
            start,
            end,
            state: MergeState::new(request.interval),
            buffer: SeriesBuffer::with_capacity(request.tags.len(), 1),
            sized: false,
            row: vec![f64::NAN; request.tags.len()],
            stale: 0,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn stream_file(&mut self, record: &FileRecord, kind: FileKind) -> Result<Flow> {
        let path = record.path.as_path();
        let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
        let mut lines = LineReader::new(BufReader::new(file));

        let Some(header) = lines.next_line().map_err(|e| ExtractError::io(path, e))? else {
            self.warn(Warning::EmptyFile {
                path: path.to_path_buf(),
            });
            return Ok(Flow::Continue);
        };
        let layout = self.resolve_header(header, kind.delimiter(), path);
        self.state.enter(MergePhase::HeaderResolved);

        self.stale = 0;
        let mut saw_data = false;
        let flow = self.stream_lines(&mut lines, &layout, path, &mut saw_data);

        if !saw_data {
            self.warn(Warning::EmptyFile {
                path: path.to_path_buf(),
            });
        }
        if self.stale > 0 {
            self.warn(Warning::OutOfOrder {
                path: path.to_path_buf(),
                dropped: self.stale,
            });
        }
        flow
    }

    fn stream_lines<R: BufRead>(
        &mut self,
        lines: &mut LineReader<R>,
        layout: &FileLayout,
        path: &Path,
        saw_data: &mut bool,
    ) -> Result<Flow> {
        let year = self.request.current_year;
        let stamp = |line: &[u8], line_no: usize| {
            layout
                .timestamps
                .timestamp(line, layout.delimiter, year)
                .map_err(|e| e.at_line(path, line_no))
        };

        if !self.sized {
            self.state.enter(MergePhase::EstimatingInterval);
            let mut lead = Vec::with_capacity(3);
            while lead.len() < 3 {
                let Some((line_no, line)) =
                    lines.next_data_line().map_err(|e| ExtractError::io(path, e))?
                else {
                    break;
                };
                let ts = stamp(line, line_no)?;
                lead.push((line_no, ts, line.to_vec()));
                if lead.len() == 2 && lead[0].1 != lead[1].1 {
                    break;
                }
            }
            *saw_data = !lead.is_empty();

            if let Some((_, first_ts, _)) = lead.first() {
                if *first_ts > self.end {
                    return Ok(Flow::PastWindowEnd);
                }
            }
            self.size_buffer(&lead)?;

            self.state.enter(MergePhase::Streaming);
            for (line_no, ts, line) in &lead {
                if self.take(*ts, line, layout, path, *line_no)? == Flow::PastWindowEnd {
                    return Ok(Flow::PastWindowEnd);
                }
            }
        } else {
            self.state.enter(MergePhase::Streaming);
        }

        while let Some((line_no, line)) =
            lines.next_data_line().map_err(|e| ExtractError::io(path, e))?
        {
            *saw_data = true;
            let ts = stamp(line, line_no)?;
            if self.take(ts, line, layout, path, line_no)? == Flow::PastWindowEnd {
                return Ok(Flow::PastWindowEnd);
            }
        }
        Ok(Flow::Continue)
    }

    /// Map every requested tag to its column in this file's header.
    fn resolve_header(&mut self, header: &[u8], delimiter: u8, path: &Path) -> FileLayout {
        let header = header.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(header);
        let text = String::from_utf8_lossy(header);
        let names: Vec<&str> = text.split(char::from(delimiter)).collect();

        let mut columns = Vec::with_capacity(self.request.tags.len());
        let mut missing = Vec::new();
        for (position, tag) in self.request.tags.iter().enumerate() {
            match names.iter().position(|&name| name == tag.as_str()) {
                Some(column) => columns.push(IndexWithPosition::new(column, position)),
                None => {
                    missing.push(tag.clone());
                    columns.push(IndexWithPosition::missing(position));
                }
            }
        }
        columns.sort();

        for tag in missing {
            self.warn(Warning::TagNotFound {
                tag,
                path: path.to_path_buf(),
            });
        }

        FileLayout {
            delimiter,
            columns,
            timestamps: TimestampLayout::from_first_column(names.first().copied().unwrap_or("")),
        }
    }

    /// Size the output buffers from the first two distinct sample times of
    /// the first file. `lead` holds up to three leading lines; a repeated
    /// first timestamp is skipped over.
    fn size_buffer(&mut self, lead: &[(usize, NaiveDateTime, Vec<u8>)]) -> Result<()> {
        self.sized = true;
        let pair = match lead {
            [(_, a, _), (_, b, _)] if a != b => Some((*a, *b)),
            [_, (_, b, _), (_, c, _)] if b != c => Some((*b, *c)),
            _ => None,
        };

        let estimate = match pair {
            Some((first, second)) => Some(estimate_point_count(
                self.start,
                self.end,
                first,
                second,
                self.request.interval,
            )?),
            None => None,
        };

        let rows = self
            .request
            .capacity_hint
            .or(estimate)
            .unwrap_or(1)
            .min(MAX_PREALLOCATED_ROWS);
        log::debug!("estimated {estimate:?} points, allocating {rows} rows");
        self.buffer = SeriesBuffer::with_capacity(self.request.tags.len(), rows);
        Ok(())
    }

    fn take(
        &mut self,
        ts: NaiveDateTime,
        line: &[u8],
        layout: &FileLayout,
        path: &Path,
        line_no: usize,
    ) -> Result<Flow> {
        if ts > self.end {
            return Ok(Flow::PastWindowEnd);
        }
        if ts < self.start {
            return Ok(Flow::Continue);
        }

        let admission = self.state.admit(ts);
        if matches!(admission, Admission::Append | Admission::Overwrite) {
            scan_values(line, layout.delimiter, &layout.columns, &mut self.row)
                .map_err(|e| e.at_line(path, line_no))?;
        }
        match admission {
            Admission::Append => self.buffer.push(ts, &self.row),
            Admission::Overwrite => self.buffer.overwrite_last(&self.row),
            Admission::Skip => {}
            Admission::Stale => self.stale += 1,
        }
        Ok(Flow::Continue)
    }
}

/// Reads raw lines without assuming UTF-8, stripping line terminators.
struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            line_no: 0,
        }
    }

    fn fill(&mut self) -> io::Result<bool> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        Ok(true)
    }

    fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        if self.fill()? {
            Ok(Some(&self.buf))
        } else {
            Ok(None)
        }
    }

    /// Next line that is not blank, with its 1-based line number.
    fn next_data_line(&mut self) -> io::Result<Option<(usize, &[u8])>> {
        loop {
            if !self.fill()? {
                return Ok(None);
            }
            if !self.buf.trim_ascii().is_empty() {
                return Ok(Some((self.line_no, &self.buf)));
            }
        }
    }
}
