use crate::snapshot::Fingerprint;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// The element was stale, unreachable, or the click was rejected.
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Backtracking could not bring the live session back to a known state.
    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("Ranker unavailable: {0}")]
    RankerUnavailable(String),

    /// A state was marked visited twice. This is a bug in the caller, never a
    /// runtime condition.
    #[error("State {0} was already marked visited")]
    DuplicateState(Fingerprint),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl ScanError {
    /// Only invariant violations abort a run; everything else is counted and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::DuplicateState(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
