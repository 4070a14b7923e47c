//! Header names of an XLSX workbook without loading it.
//!
//! Only two package parts are touched: the shared-string table and the first
//! row of the first worksheet. Both are read through a small pull scanner
//! that yields start tags, end tags and text, so neither part is ever held
//! in memory as a tree.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ExtractError, Result};

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const FIRST_SHEET: &str = "xl/worksheets/sheet1.xml";

/// One cell of the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    /// Column letters, e.g. `"B"` or `"AA"`.
    pub column: String,
    pub name: String,
}

/// Header cells of `xl/worksheets/sheet1.xml`, left to right. Empty cells
/// are left out.
pub fn read_header(path: &Path) -> Result<Vec<HeaderCell>> {
    let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let shared = match archive.by_name(SHARED_STRINGS) {
        Ok(entry) => read_shared_strings(BufReader::new(entry)),
        Err(ZipError::FileNotFound) => Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    }
    .map_err(|e| part_error(path, SHARED_STRINGS, e))?;

    let sheet = archive.by_name(FIRST_SHEET)?;
    let cells = read_first_row(BufReader::new(sheet), &shared)
        .map_err(|e| part_error(path, FIRST_SHEET, e))?;
    log::debug!("{} header cells in {}", cells.len(), path.display());
    Ok(cells)
}

fn part_error(path: &Path, part: &str, e: io::Error) -> ExtractError {
    if e.kind() == io::ErrorKind::InvalidData {
        ExtractError::Xlsx(format!("{part} in {}: {e}", path.display()))
    } else {
        ExtractError::io(path, e)
    }
}

fn malformed(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

// ---------------------------------------------------------------------------
// Package parts
// ---------------------------------------------------------------------------

/// Every `<si>` entry, rich-text runs concatenated. Phonetic runs (`<rPh>`)
/// are not part of the visible text and are dropped.
fn read_shared_strings<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut scanner = XmlScanner::new(reader);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut phonetic = 0usize;

    loop {
        match scanner.next_event()? {
            Event::Start { name, empty, .. } => match name.as_str() {
                "si" if empty => strings.push(String::new()),
                "si" => {
                    in_item = true;
                    current.clear();
                }
                "rPh" if !empty => phonetic += 1,
                "t" if in_item && phonetic == 0 && !empty => in_text = true,
                _ => {}
            },
            Event::End { name } => match name.as_str() {
                "si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                "rPh" => phonetic = phonetic.saturating_sub(1),
                "t" => in_text = false,
                _ => {}
            },
            Event::Text(text) if in_text => current.push_str(&text),
            Event::Text(_) => {}
            Event::Eof => return Ok(strings),
        }
    }
}

/// Cells of the first `<row>` of a worksheet.
fn read_first_row<R: BufRead>(reader: R, shared: &[String]) -> io::Result<Vec<HeaderCell>> {
    let mut scanner = XmlScanner::new(reader);
    let mut cells = Vec::new();
    let mut in_row = false;
    let mut cell: Option<PendingCell> = None;
    let mut capture = false;

    loop {
        match scanner.next_event()? {
            Event::Start { name, attrs, empty } => match name.as_str() {
                "row" if !in_row => {
                    if empty {
                        return Ok(cells);
                    }
                    in_row = true;
                }
                "c" if in_row && !empty => {
                    let column = match attribute(&attrs, "r") {
                        Some(reference) => column_letters_of(reference).to_string(),
                        None => column_name(cells.len()),
                    };
                    cell = Some(PendingCell {
                        column,
                        kind: attribute(&attrs, "t").unwrap_or("n").to_string(),
                        value: String::new(),
                    });
                }
                "v" | "t" if cell.is_some() && !empty => capture = true,
                _ => {}
            },
            Event::End { name } => match name.as_str() {
                "v" | "t" => capture = false,
                "c" => {
                    if let Some(done) = cell.take() {
                        if let Some(header) = done.resolve(shared)? {
                            cells.push(header);
                        }
                    }
                }
                "row" if in_row => return Ok(cells),
                _ => {}
            },
            Event::Text(text) if capture => {
                if let Some(pending) = cell.as_mut() {
                    pending.value.push_str(&text);
                }
            }
            Event::Text(_) => {}
            Event::Eof => return Ok(cells),
        }
    }
}

struct PendingCell {
    column: String,
    kind: String,
    value: String,
}

impl PendingCell {
    fn resolve(self, shared: &[String]) -> io::Result<Option<HeaderCell>> {
        let name = match self.kind.as_str() {
            "s" => {
                let index: usize = self
                    .value
                    .trim()
                    .parse()
                    .map_err(|_| malformed(format!("bad shared-string index {:?}", self.value)))?;
                shared
                    .get(index)
                    .cloned()
                    .ok_or_else(|| malformed(format!("shared-string index {index} out of range")))?
            }
            _ => self.value,
        };
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(HeaderCell {
            column: self.column,
            name,
        }))
    }
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `"AB12"` -> `"AB"`.
fn column_letters_of(reference: &str) -> &str {
    let end = reference
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    &reference[..end]
}

/// Zero-based column index to spreadsheet letters (0 -> `A`, 26 -> `AA`).
fn column_name(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().map(|&b| char::from(b)).collect()
}

// ---------------------------------------------------------------------------
// XmlScanner – minimal pull parser
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Event {
    /// Element name without namespace prefix.
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        empty: bool,
    },
    End {
        name: String,
    },
    /// Character data with entities expanded.
    Text(String),
    Eof,
}

/// Pulls events from well-formed XML. Declarations, processing instructions
/// and comments are skipped; CDATA is not supported.
struct XmlScanner<R> {
    reader: R,
    buf: Vec<u8>,
    at_tag: bool,
}

impl<R: BufRead> XmlScanner<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            at_tag: false,
        }
    }

    fn next_event(&mut self) -> io::Result<Event> {
        loop {
            if self.at_tag {
                self.at_tag = false;
                if let Some(event) = self.read_tag()? {
                    return Ok(event);
                }
                continue;
            }

            self.buf.clear();
            if self.reader.read_until(b'<', &mut self.buf)? == 0 {
                return Ok(Event::Eof);
            }
            if self.buf.last() == Some(&b'<') {
                self.buf.pop();
                self.at_tag = true;
            }
            if !self.buf.is_empty() {
                return Ok(Event::Text(unescape(&String::from_utf8_lossy(&self.buf))?));
            }
        }
    }

    /// Read up to the closing `>` of a tag whose `<` was consumed. `None`
    /// for markup that carries no element.
    fn read_tag(&mut self) -> io::Result<Option<Event>> {
        self.buf.clear();
        let mut quote = None;
        loop {
            let byte = self.next_byte()?.ok_or_else(|| malformed("unterminated tag"))?;
            match (quote, byte) {
                (None, b'>') => {
                    // Comments may hold a bare '>'.
                    if self.buf.starts_with(b"!--") && !self.buf.ends_with(b"--") {
                        self.buf.push(byte);
                        continue;
                    }
                    break;
                }
                (None, b'"' | b'\'') => quote = Some(byte),
                (Some(q), b) if b == q => quote = None,
                _ => {}
            }
            self.buf.push(byte);
        }

        let body = String::from_utf8_lossy(&self.buf).into_owned();
        if body.starts_with('?') || body.starts_with('!') {
            return Ok(None);
        }
        if let Some(name) = body.strip_prefix('/') {
            return Ok(Some(Event::End {
                name: local_name(name.trim()).to_string(),
            }));
        }

        let (body, empty) = match body.strip_suffix('/') {
            Some(inner) => (inner, true),
            None => (body.as_str(), false),
        };
        let name_end = body
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(body.len());
        Ok(Some(Event::Start {
            name: local_name(&body[..name_end]).to_string(),
            attrs: parse_attributes(&body[name_end..])?,
            empty,
        }))
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.reader.fill_buf()? {
            [] => return Ok(None),
            [first, ..] => *first,
        };
        self.reader.consume(1);
        Ok(Some(byte))
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn parse_attributes(mut rest: &str) -> io::Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(attrs);
        }
        let (key, after) = rest
            .split_once('=')
            .ok_or_else(|| malformed(format!("attribute without value in {rest:?}")))?;
        let after = after.trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| malformed(format!("unquoted attribute {key:?}")))?;
        let (value, remaining) = after[1..]
            .split_once(quote)
            .ok_or_else(|| malformed(format!("unterminated attribute {key:?}")))?;
        attrs.push((local_name(key.trim()).to_string(), unescape(value)?));
        rest = remaining;
    }
}

/// Expand the predefined entities and numeric character references.
fn unescape(text: &str) -> io::Result<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let (entity, after) = rest[amp + 1..]
            .split_once(';')
            .ok_or_else(|| malformed("unterminated entity"))?;
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| malformed(format!("unknown entity &{entity};")))?
            }
        };
        out.push(decoded);
        rest = after;
    }
    out.push_str(rest);
    Ok(out)
}
