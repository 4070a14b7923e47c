use std::path::Path;

use anyhow::{Context, Result, bail};

use super::catalog::FileKind;
use super::model::Tag;
use super::xlsx;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// List the column names a data file offers.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`  – comma separated, first line is the header
/// * `.txt`  – tab separated, first line is the header
/// * `.xlsx` – first row of the first worksheet
pub fn read_tags(path: &Path) -> Result<Vec<Tag>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let tags = match ext.as_str() {
        "xlsx" => read_xlsx_tags(path)?,
        other => match FileKind::from_extension(other) {
            Some(kind) => read_delimited_tags(path, kind)?,
            None => bail!("Unsupported file extension: .{other}"),
        },
    };
    log::info!("{} tags in {}", tags.len(), path.display());
    Ok(tags)
}

/// Read a tag-list file: names separated by spaces, commas, tabs or line
/// breaks.
pub fn load_tag_list(path: &Path) -> Result<Vec<Tag>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading tag list {}", path.display()))?;
    let tags = parse_tag_list(&text);
    if tags.is_empty() {
        bail!("Tag list {} names no tags", path.display());
    }
    Ok(tags)
}

/// Split tag-list text, dropping empty entries.
pub fn parse_tag_list(text: &str) -> Vec<Tag> {
    text.split([' ', ',', '\t', '\r', '\n'])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// CSV / TXT header
// ---------------------------------------------------------------------------

/// Header names exactly as the merge engine compares them: split on the
/// delimiter, no unquoting, no trimming.
fn read_delimited_tags(path: &Path, kind: FileKind) -> Result<Vec<Tag>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(kind.delimiter())
        .quoting(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {} file", kind.extension()))?;

    let headers = reader
        .byte_headers()
        .with_context(|| format!("reading header of {}", path.display()))?;

    Ok(headers
        .iter()
        .map(|raw| {
            String::from_utf8_lossy(raw)
                .trim_start_matches('\u{feff}')
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect())
}

// ---------------------------------------------------------------------------
// XLSX header
// ---------------------------------------------------------------------------

fn read_xlsx_tags(path: &Path) -> Result<Vec<Tag>> {
    let cells = xlsx::read_header(path)
        .with_context(|| format!("reading workbook header of {}", path.display()))?;
    Ok(cells.into_iter().map(|cell| cell.name).collect())
}
