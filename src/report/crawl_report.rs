use crate::report::{ExitCode, ReportResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Counters and timestamps for one crawl run
///
/// A report is created when a crawl starts and is only mutated by the crawler
/// that owns it. Once [`finish`](Self::finish) has set the exit code the
/// counters no longer change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlReport {
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<ExitCode>,

    #[serde(default)]
    pub new_count: u64,

    #[serde(default)]
    pub changed_count: u64,

    #[serde(default)]
    pub removed_count: u64,

    #[serde(default)]
    pub unchanged_count: u64,
}

impl CrawlReport {
    /// Starts a report at the current time
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            stopped_at: None,
            exit_code: None,
            new_count: 0,
            changed_count: 0,
            removed_count: 0,
            unchanged_count: 0,
        }
    }

    /// Returns true while the run has not finished
    pub fn is_running(&self) -> bool {
        self.exit_code.is_none()
    }

    pub fn record_new(&mut self) {
        if self.is_running() {
            self.new_count += 1;
        }
    }

    pub fn record_changed(&mut self) {
        if self.is_running() {
            self.changed_count += 1;
        }
    }

    pub fn record_unchanged(&mut self) {
        if self.is_running() {
            self.unchanged_count += 1;
        }
    }

    pub fn record_removed(&mut self) {
        if self.is_running() {
            self.removed_count += 1;
        }
    }

    /// Total number of resources the run reported on
    pub fn total(&self) -> u64 {
        self.new_count + self.changed_count + self.removed_count + self.unchanged_count
    }

    /// Finalizes the report
    ///
    /// Has no effect on a report that is already finished.
    pub fn finish(&mut self, exit_code: ExitCode) {
        if self.is_running() {
            self.stopped_at = Some(Utc::now());
            self.exit_code = Some(exit_code);
        }
    }

    /// Serializes the report to TOML
    pub fn to_toml(&self) -> ReportResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Parses a report from TOML
    pub fn from_toml(content: &str) -> ReportResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Writes the report to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> ReportResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Reads a report previously written by [`save`](Self::save)
    pub fn load(path: &Path) -> ReportResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
