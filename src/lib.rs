//! Burrow: an incremental content crawler
//!
//! This crate walks a changing, possibly deeply nested data domain (file trees,
//! archives, compressed streams, mailboxes, contact lists embedded in other
//! files) and reports each resource once per logical change. Fingerprints are
//! persisted between runs so unchanged resources are not processed again.
//! Containers are unwrapped into child resources by pluggable unwrappers
//! selected from a registry by content type.

pub mod config;
pub mod crawler;
pub mod id;
pub mod report;
pub mod resource;
pub mod source;
pub mod store;
pub mod unwrap;

use thiserror::Error;

/// Main error type for Burrow operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identifier error: {0}")]
    Id(#[from] IdError),

    #[error("Fingerprint store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Data source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Unwrap error: {0}")]
    Unwrap(#[from] unwrap::UnwrapError),

    #[error("Report error: {0}")]
    Report(#[from] report::ReportError),

    #[error("Crawler is busy: {0}")]
    Busy(crawler::CrawlerState),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Resource identifier errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Empty resource identifier")]
    Empty,

    #[error("Malformed resource identifier '{id}': {reason}")]
    Malformed { id: String, reason: String },

    #[error("Invalid scheme prefix: '{0}'")]
    InvalidScheme(String),
}

/// Result type alias for Burrow operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for identifier operations
pub type IdResult<T> = std::result::Result<T, IdError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CancelToken, Crawler, CrawlerHandler, CrawlerState};
pub use report::{CrawlReport, ExitCode};
pub use resource::Resource;
pub use source::DataSource;
pub use store::FingerprintStore;
pub use unwrap::{default_registry, Unwrapper, UnwrapperRegistry};
