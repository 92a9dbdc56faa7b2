/// Exit code definitions for crawl and clear runs
///
/// This module defines the terminal status of one crawl or clear invocation.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Terminal status of one crawl or clear invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    /// Every resource was visited
    Completed,

    /// A stop was requested before every resource was visited
    StopRequested,

    /// Enumerating the data source failed
    FatalError,
}

impl ExitCode {
    /// Returns true if the run visited every resource
    ///
    /// Only completed runs may report removals.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the process exit status used by the command-line driver
    pub fn process_code(&self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::FatalError => 1,
            Self::StopRequested => 2,
        }
    }

    /// Converts the exit code to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StopRequested => "stop_requested",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExitCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "stop_requested" => Ok(Self::StopRequested),
            "fatal_error" => Ok(Self::FatalError),
            other => Err(format!("unknown exit code '{}'", other)),
        }
    }
}
