//! Crawl run reporting
//!
//! # Components
//!
//! - `ExitCode`: Terminal status of a crawl or clear run
//! - `CrawlReport`: Per-run counters and timestamps, persisted as TOML

mod crawl_report;
mod exit_code;

pub use crawl_report::CrawlReport;
pub use exit_code::ExitCode;

use thiserror::Error;

/// Errors that can occur while persisting reports
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode report: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Failed to decode report: {0}")]
    Decode(#[from] toml::de::Error),
}

/// Result type for report operations
pub type ReportResult<T> = Result<T, ReportError>;
