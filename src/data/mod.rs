/// Data layer: file catalog, line scanning, merging and resampling.
///
/// Architecture:
/// ```text
///  *_yyyyMMdd-HHmmss.csv / .txt
///        │
///        ▼
///   ┌──────────┐
///   │ catalog   │  file name → start time, sort, select window
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  merge    │  stream files in order → Dataset
///   └──────────┘   (scanner: fields + timestamps per line,
///        │           datetime: loose date/time text)
///        ▼
///   ┌──────────┐
///   │ resample  │  thin a window for display → labels + values
///   └──────────┘
/// ```
///
/// `loader` and `xlsx` only read headers, for picking tags.

pub mod catalog;
pub mod datetime;
pub mod loader;
pub mod merge;
pub mod model;
pub mod resample;
pub mod scanner;
pub mod xlsx;

pub use merge::{extract, ExtractRequest};
pub use model::{Dataset, Extraction, Tag, Warning};
