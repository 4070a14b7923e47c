//! Time-aligned extraction of tagged samples from sequences of log files.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod state;

pub use error::{ExtractError, Result};
