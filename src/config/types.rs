use serde::Deserialize;
use std::path::PathBuf;

/// Default nesting limit for container unwrapping
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// Default number of bytes peeked for content type sniffing
pub const DEFAULT_SNIFF_BYTES: usize = 512;

/// Main configuration structure for Burrow
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub source: SourceConfig,
    pub state: StateConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum container nesting below a top-level resource
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of leading bytes inspected to identify a content type
    #[serde(rename = "sniff-bytes", default = "default_sniff_bytes")]
    pub sniff_bytes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            sniff_bytes: DEFAULT_SNIFF_BYTES,
        }
    }
}

/// Filesystem data source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Directory whose files are crawled
    pub root: PathBuf,

    #[serde(rename = "follow-symlinks", default)]
    pub follow_symlinks: bool,

    /// Whether dot-files and dot-directories are crawled
    #[serde(rename = "include-hidden", default)]
    pub include_hidden: bool,
}

/// Persistent state configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Path to the SQLite fingerprint database
    #[serde(rename = "fingerprint-path")]
    pub fingerprint_path: PathBuf,

    /// Where the report of the last run is written
    #[serde(rename = "report-path", default)]
    pub report_path: Option<PathBuf>,
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_sniff_bytes() -> usize {
    DEFAULT_SNIFF_BYTES
}
