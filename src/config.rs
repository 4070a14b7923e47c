//! Extraction job files.
//!
//! A job is a JSON document naming the input files, the tags, the window and
//! what to do with the result:
//!
//! ```json
//! {
//!   "files": ["logs/Plant_20180901-000000.csv", "logs/Plant_20180902-000000.csv"],
//!   "tags": ["FT101", "PT2"],
//!   "start": "2018/9/1 06:00:00",
//!   "end": "2018/9/2 06:00:00",
//!   "interval": 10,
//!   "export": { "path": "out.txt", "kind": "txt" }
//! }
//! ```
//!
//! Relative paths are taken from the job file's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::data::catalog::FileKind;
use crate::data::datetime::parse_datetime;
use crate::data::loader::load_tag_list;
use crate::data::merge::ExtractRequest;
use crate::data::model::Tag;
use crate::data::resample::{LabelFormat, DEFAULT_LABEL_FORMAT};

fn default_interval() -> usize {
    1
}

fn default_points() -> usize {
    500
}

fn default_label_format() -> String {
    DEFAULT_LABEL_FORMAT.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractJob {
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Tag-list file, appended after `tags`.
    #[serde(default)]
    pub tag_file: Option<PathBuf>,
    /// Window bounds in any layout `parse_datetime` accepts.
    pub start: String,
    pub end: String,
    /// Keep every `interval`-th in-window sample.
    #[serde(default = "default_interval")]
    pub interval: usize,
    /// Display points per tag.
    #[serde(default = "default_points")]
    pub points: usize,
    #[serde(default = "default_label_format")]
    pub label_format: String,
    #[serde(default)]
    pub export: Option<ExportTarget>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportTarget {
    pub path: PathBuf,
    /// Delimiter choice; taken from the extension when absent.
    #[serde(default)]
    pub kind: Option<FileKind>,
}

impl ExtractJob {
    /// A job with defaults for everything but files, tags and window.
    pub fn new(files: Vec<PathBuf>, tags: Vec<Tag>, start: String, end: String) -> Self {
        Self {
            files,
            tags,
            tag_file: None,
            start,
            end,
            interval: default_interval(),
            points: default_points(),
            label_format: default_label_format(),
            export: None,
        }
    }

    /// Load a job file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading job file {}", path.display()))?;
        let mut job: ExtractJob = serde_json::from_str(&text)
            .with_context(|| format!("parsing job file {}", path.display()))?;
        if let Some(dir) = path.parent() {
            job.resolve_relative(dir);
        }
        Ok(job)
    }

    /// Anchor relative paths at `dir`.
    pub fn resolve_relative(&mut self, dir: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        for file in &mut self.files {
            anchor(file);
        }
        if let Some(tag_file) = self.tag_file.as_mut() {
            anchor(tag_file);
        }
        if let Some(export) = self.export.as_mut() {
            anchor(&mut export.path);
        }
    }

    /// Requested tags, with the tag-list file's entries after the inline
    /// ones.
    pub fn resolve_tags(&self) -> Result<Vec<Tag>> {
        let mut tags = self.tags.clone();
        if let Some(tag_file) = &self.tag_file {
            tags.extend(load_tag_list(tag_file)?);
        }
        if tags.is_empty() {
            bail!("No tags requested: give `tags` or `tag_file`");
        }
        Ok(tags)
    }

    pub fn label_format(&self) -> Result<LabelFormat> {
        LabelFormat::new(self.label_format.clone()).context("invalid label_format")
    }

    /// Validate the job and build the engine request.
    pub fn request(&self) -> Result<ExtractRequest> {
        if self.files.is_empty() {
            bail!("No input files given");
        }
        if self.interval == 0 {
            bail!("interval must be at least 1");
        }
        let start = parse_datetime(&self.start)
            .with_context(|| format!("invalid start {:?}", self.start))?;
        let end = parse_datetime(&self.end)
            .with_context(|| format!("invalid end {:?}", self.end))?;

        Ok(ExtractRequest::new(start, end, self.resolve_tags()?).with_interval(self.interval))
    }
}
