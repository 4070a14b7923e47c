use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};

use data_extractor::config::{ExportTarget, ExtractJob};
use data_extractor::data::catalog::FileKind;
use data_extractor::data::loader;
use data_extractor::data::merge::extract;
use data_extractor::export::{default_file_name, export_to_path};
use data_extractor::state::ViewState;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "data-extractor")]
#[command(about = "Extract time-aligned tag values from timestamped log files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the column names of a csv, txt or xlsx file
    Tags {
        /// Data file to inspect
        file: PathBuf,
    },
    /// Merge log files over a time window and print a resampled view
    Extract(ExtractArgs),
}

#[derive(Args)]
pub struct ExtractArgs {
    /// JSON job file; other flags override its fields
    #[arg(long)]
    job: Option<PathBuf>,

    /// Input files named like `Plant_20180901-000000.csv`
    #[arg(long, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Tags to extract (comma separated or repeated)
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// File listing tags separated by spaces, commas, tabs or newlines
    #[arg(long)]
    tag_file: Option<PathBuf>,

    /// Window start, e.g. "2018/9/1 06:00:00"
    #[arg(long)]
    start: Option<String>,

    /// Window end
    #[arg(long)]
    end: Option<String>,

    /// Keep every N-th in-window sample
    #[arg(long)]
    interval: Option<usize>,

    /// Display points per tag
    #[arg(long)]
    points: Option<usize>,

    /// strftime pattern for point labels
    #[arg(long)]
    label_format: Option<String>,

    /// Write the extracted window to this file (.csv or .txt); a directory
    /// gets a timestamped default name
    #[arg(long)]
    export: Option<PathBuf>,

    /// Export delimiter, overriding the export file's extension
    #[arg(long, value_parser = parse_kind)]
    kind: Option<FileKind>,
}

fn parse_kind(text: &str) -> Result<FileKind, String> {
    FileKind::from_extension(text).ok_or_else(|| format!("expected csv or txt, got {text:?}"))
}

impl ExtractArgs {
    /// The job file (if any) with every given flag applied on top.
    fn into_job(self) -> Result<ExtractJob> {
        let mut job = match &self.job {
            Some(path) => ExtractJob::from_path(path)?,
            None => {
                let (Some(start), Some(end)) = (&self.start, &self.end) else {
                    bail!("--start and --end are required without --job");
                };
                ExtractJob::new(Vec::new(), Vec::new(), start.clone(), end.clone())
            }
        };

        if !self.files.is_empty() {
            job.files = self.files;
        }
        if !self.tags.is_empty() {
            job.tags = self.tags;
        }
        if let Some(tag_file) = self.tag_file {
            job.tag_file = Some(tag_file);
        }
        if let Some(start) = self.start {
            job.start = start;
        }
        if let Some(end) = self.end {
            job.end = end;
        }
        if let Some(interval) = self.interval {
            job.interval = interval;
        }
        if let Some(points) = self.points {
            job.points = points;
        }
        if let Some(label_format) = self.label_format {
            job.label_format = label_format;
        }
        if let Some(path) = self.export {
            job.export = Some(ExportTarget {
                path,
                kind: self.kind,
            });
        } else if let (Some(export), Some(kind)) = (job.export.as_mut(), self.kind) {
            export.kind = Some(kind);
        }
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Tags { file } => list_tags(&file),
        Command::Extract(args) => run_extract(args.into_job()?),
    }
}

fn list_tags(file: &std::path::Path) -> Result<()> {
    let tags = loader::read_tags(file)?;
    let mut out = io::stdout().lock();
    for tag in tags {
        writeln!(out, "{tag}")?;
    }
    Ok(())
}

fn run_extract(job: ExtractJob) -> Result<()> {
    let request = job.request()?;
    let label_format = job.label_format()?;
    let (start, end) = request.window();

    let extraction = extract(&job.files, &request).context("extraction failed")?;
    for warning in &extraction.warnings {
        eprintln!("warning: {warning}");
    }

    let mut state = ViewState::default();
    state.points_per_line = job.points;
    state.label_format = label_format;
    state.set_dataset(extraction.dataset);
    if let Some(message) = &state.status_message {
        log::info!("{message}");
    }

    if let (Some(target), Some(dataset)) = (&job.export, &state.dataset) {
        let path = if target.path.is_dir() {
            let ext = target.kind.unwrap_or(FileKind::Csv).extension();
            target
                .path
                .join(format!("{}.{ext}", default_file_name(Local::now().naive_local())))
        } else {
            target.path.clone()
        };
        let rows = export_to_path(&path, target.kind, dataset, start, end)?;
        eprintln!("exported {rows} rows to {}", path.display());
    }

    print_view(&state)
}

/// Tab-separated table of the resampled view on stdout.
fn print_view(state: &ViewState) -> Result<()> {
    let Some(dataset) = &state.dataset else {
        return Ok(());
    };
    let mut out = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(io::stdout().lock());

    let mut header = vec!["Time"];
    header.extend(dataset.tags().iter().map(String::as_str));
    out.write_record(&header)?;

    for (i, label) in state.view.labels.iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(state.view.series.iter().map(|column| column[i].to_string()));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}
