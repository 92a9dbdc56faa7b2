/// Crawler lifecycle states
///
/// A crawler moves `Idle -> Running -> ReportingRemovals -> Idle` for a
/// completed crawl, `Idle -> Running -> Idle` for an interrupted one, and
/// `Idle -> Clearing -> Idle` for a clear.
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Current activity of a crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlerState {
    /// Ready to start a crawl or clear
    Idle,

    /// Visiting resources
    Running,

    /// Reporting the resources a completed crawl did not see again
    ReportingRemovals,

    /// Discarding every fingerprint
    Clearing,
}

impl CrawlerState {
    /// Returns true if a crawl or clear may start
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::ReportingRemovals => "reporting_removals",
            Self::Clearing => "clearing",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::ReportingRemovals => 2,
            Self::Clearing => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::ReportingRemovals,
            3 => Self::Clearing,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for CrawlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shared view of a crawler's state, readable from other threads
#[derive(Debug, Clone, Default)]
pub struct StateWatcher {
    state: Arc<AtomicU8>,
}

impl StateWatcher {
    pub fn get(&self) -> CrawlerState {
        CrawlerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: CrawlerState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Moves from `from` to `to`, or returns the state that prevented it
    pub(crate) fn transition(&self, from: CrawlerState, to: CrawlerState) -> Result<(), CrawlerState> {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(CrawlerState::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            CrawlerState::Idle,
            CrawlerState::Running,
            CrawlerState::ReportingRemovals,
            CrawlerState::Clearing,
        ] {
            assert_eq!(CrawlerState::from_u8(state.to_u8()), state);
        }
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let watcher = StateWatcher::default();
        assert_eq!(watcher.get(), CrawlerState::Idle);

        watcher
            .transition(CrawlerState::Idle, CrawlerState::Running)
            .unwrap();
        assert_eq!(
            watcher.transition(CrawlerState::Idle, CrawlerState::Clearing),
            Err(CrawlerState::Running)
        );

        watcher.set(CrawlerState::Idle);
        assert!(watcher.get().is_idle());
    }

    #[test]
    fn test_display() {
        assert_eq!(CrawlerState::ReportingRemovals.to_string(), "reporting_removals");
    }
}
