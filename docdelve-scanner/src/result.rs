use crate::state::DiscoveredDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why an exploration run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Every reachable state within the depth cap was expanded.
    Exhausted,
    StepBudget,
    TimeBudget,
    Cancelled,
    /// An unrecoverable condition ended the run early.
    Aborted { reason: String },
}

impl Termination {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Termination::Aborted { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Exhausted => "exhausted",
            Termination::StepBudget => "step_budget",
            Termination::TimeBudget => "time_budget",
            Termination::Cancelled => "cancelled",
            Termination::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Aborted { reason } => write!(f, "aborted: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    Restore,
    Ranker,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Navigation => "navigation",
            FailureKind::Restore => "restore",
            FailureKind::Ranker => "ranker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "navigation" => Some(FailureKind::Navigation),
            "restore" => Some(FailureKind::Restore),
            "ranker" => Some(FailureKind::Ranker),
            _ => None,
        }
    }
}

/// One recoverable failure, kept for the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub depth: usize,
    /// Label of the element involved, when there was one.
    pub element: Option<String>,
    pub reason: String,
}

/// Outcome of one exploration run. Partial results survive every
/// termination, including aborts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub start_url: String,
    pub documents: Vec<DiscoveredDocument>,
    pub states_visited: usize,
    pub steps: usize,
    pub navigation_failures: usize,
    pub restore_failures: usize,
    pub ranker_failures: usize,
    pub failures: Vec<FailureRecord>,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            documents: Vec::new(),
            states_visited: 0,
            steps: 0,
            navigation_failures: 0,
            restore_failures: 0,
            ranker_failures: 0,
            failures: Vec::new(),
            termination: Termination::Exhausted,
            elapsed: Duration::from_secs(0),
        }
    }

    pub fn document_urls(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.url.as_str()).collect()
    }

    pub fn total_failures(&self) -> usize {
        self.navigation_failures + self.restore_failures + self.ranker_failures
    }

    pub(crate) fn record_failure(
        &mut self,
        kind: FailureKind,
        depth: usize,
        element: Option<&str>,
        reason: impl Into<String>,
    ) {
        match kind {
            FailureKind::Navigation => self.navigation_failures += 1,
            FailureKind::Restore => self.restore_failures += 1,
            FailureKind::Ranker => self.ranker_failures += 1,
        }
        self.failures.push(FailureRecord {
            kind,
            depth,
            element: element.map(str::to_string),
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_updates_counters() {
        let mut result = RunResult::new("https://a.test/");
        result.record_failure(FailureKind::Navigation, 1, Some("Details"), "stale element");
        result.record_failure(FailureKind::Ranker, 0, None, "timed out");
        result.record_failure(FailureKind::Navigation, 2, None, "click rejected");

        assert_eq!(result.navigation_failures, 2);
        assert_eq!(result.ranker_failures, 1);
        assert_eq!(result.restore_failures, 0);
        assert_eq!(result.total_failures(), 3);
        assert_eq!(result.failures[0].element.as_deref(), Some("Details"));
    }

    #[test]
    fn test_failure_kind_parse() {
        for kind in [FailureKind::Navigation, FailureKind::Restore, FailureKind::Ranker] {
            assert_eq!(FailureKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FailureKind::parse("timeout"), None);
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::StepBudget.to_string(), "step_budget");
        let aborted = Termination::Aborted {
            reason: "browser crashed".to_string(),
        };
        assert!(aborted.is_aborted());
        assert_eq!(aborted.to_string(), "aborted: browser crashed");
    }
}
