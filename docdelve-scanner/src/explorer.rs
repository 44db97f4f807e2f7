//! The exploration loop: a depth-bounded, dedup-aware search over page states.
//!
//! ```text
//! Init ──► Expanding ──► Done
//!            │   ▲
//!            └───┘  pop, restore origin, interact, accept state
//! ```
//!
//! Every state is expanded at most once and every accepted expansion is one
//! level deeper than its origin, so a run over a finite site terminates even
//! without budgets.

use crate::error::{Result, ScanError};
use crate::frontier::{Frontier, FrontierEntry};
use crate::navigator::Navigator;
use crate::ranker::{Ranker, rank_elements};
use crate::result::{FailureKind, RunResult, Termination};
use crate::snapshot::{Fingerprint, PageSnapshot};
use crate::state::{DocumentRegistry, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress notifications, delivered synchronously from the exploration loop.
#[derive(Debug, Clone)]
pub enum ExploreEvent {
    StateDiscovered {
        fingerprint: Fingerprint,
        depth: usize,
        url: String,
        elements: usize,
    },
    DocumentFound {
        url: String,
        depth: usize,
    },
    /// A click led back into a state that was already expanded.
    Converged {
        fingerprint: Fingerprint,
        depth: usize,
    },
    NavigationFailed {
        element: String,
        depth: usize,
        reason: String,
    },
    RestoreFailed {
        fingerprint: Fingerprint,
        reason: String,
    },
    RankerDegraded {
        fingerprint: Fingerprint,
        reason: String,
    },
    Step {
        steps: usize,
        frontier: usize,
        states: usize,
        documents: usize,
    },
}

pub type EventCallback = Arc<dyn Fn(ExploreEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// Hard cap on the number of clicks from the start state.
    pub max_depth: usize,
    /// Safety valve on the number of frontier entries processed.
    pub step_budget: usize,
    pub time_budget: Option<Duration>,
    pub interaction_timeout: Duration,
    pub rank_timeout: Duration,
    /// Consecutive unrecoverable backtracks before the run is abandoned.
    pub max_restore_failures: usize,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            step_budget: 200,
            time_budget: None,
            interaction_timeout: Duration::from_secs(30),
            rank_timeout: Duration::from_secs(60),
            max_restore_failures: 3,
        }
    }
}

impl ExploreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_step_budget(mut self, steps: usize) -> Self {
        self.step_budget = steps;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_interaction_timeout(mut self, timeout: Duration) -> Self {
        self.interaction_timeout = timeout;
        self
    }

    pub fn with_rank_timeout(mut self, timeout: Duration) -> Self {
        self.rank_timeout = timeout;
        self
    }

    pub fn with_max_restore_failures(mut self, failures: usize) -> Self {
        self.max_restore_failures = failures.max(1);
        self
    }

    /// Restoring replays up to `max_depth` clicks after a reload.
    fn restore_timeout(&self) -> Duration {
        let clicks = u32::try_from(self.max_depth.saturating_add(1)).unwrap_or(u32::MAX);
        self.interaction_timeout.saturating_mul(clicks)
    }
}

pub struct Explorer<N, R> {
    navigator: N,
    ranker: R,
    config: ExploreConfig,
    store: StateStore,
    frontier: Frontier,
    documents: DocumentRegistry,
    event_callback: Option<EventCallback>,
    cancel: CancellationToken,
}

impl<N: Navigator, R: Ranker> Explorer<N, R> {
    pub fn new(navigator: N, ranker: R, config: ExploreConfig) -> Self {
        Self {
            navigator,
            ranker,
            config,
            store: StateStore::new(),
            frontier: Frontier::new(),
            documents: DocumentRegistry::new(),
            event_callback: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Checked before every frontier pop.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ExploreConfig {
        &self.config
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut N {
        &mut self.navigator
    }

    pub fn ranker(&self) -> &R {
        &self.ranker
    }

    pub fn into_parts(self) -> (N, R) {
        (self.navigator, self.ranker)
    }

    /// Explore from whatever state the navigator is in now. Never fails:
    /// errors end up as counters, failure records or an `Aborted` termination,
    /// and the documents found so far are always returned.
    pub async fn run(&mut self) -> RunResult {
        let started = Instant::now();
        self.store.clear();
        self.frontier.clear();
        self.documents.clear();

        let mut result = RunResult::new(String::new());
        result.termination = self.explore(&mut result, started).await;
        result.documents = self.documents.documents().to_vec();
        result.states_visited = self.store.len();
        result.elapsed = started.elapsed();

        info!(
            "Exploration finished ({}): {} states, {} documents, {} steps, {} failures",
            result.termination,
            result.states_visited,
            result.documents.len(),
            result.steps,
            result.total_failures()
        );
        debug!("Frontier peaked at {} entries", self.frontier.high_water());

        result
    }

    async fn explore(&mut self, result: &mut RunResult, started: Instant) -> Termination {
        let root = match tokio::time::timeout(
            self.config.interaction_timeout,
            self.navigator.current_snapshot(0),
        )
        .await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                return Termination::Aborted {
                    reason: format!("could not capture start state: {}", e),
                };
            }
            Err(_) => {
                return Termination::Aborted {
                    reason: format!(
                        "could not capture start state: timed out after {:?}",
                        self.config.interaction_timeout
                    ),
                };
            }
        };

        result.start_url = root.url().to_string();
        info!(
            "Exploring {} (max depth {}, step budget {})",
            result.start_url, self.config.max_depth, self.config.step_budget
        );

        if let Err(e) = self.accept_state(&root, 0, result).await {
            return Termination::Aborted {
                reason: e.to_string(),
            };
        }

        let mut consecutive_restore_failures = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!("Exploration cancelled");
                return Termination::Cancelled;
            }
            if result.steps >= self.config.step_budget {
                info!("Step budget of {} reached", self.config.step_budget);
                return Termination::StepBudget;
            }
            if let Some(budget) = self.config.time_budget
                && started.elapsed() >= budget
            {
                info!("Time budget of {:?} reached", budget);
                return Termination::TimeBudget;
            }

            let Some(entry) = self.frontier.pop() else {
                return Termination::Exhausted;
            };

            if entry.depth > self.config.max_depth {
                debug!(
                    "Discarding '{}' at depth {} (max {})",
                    entry.element.label, entry.depth, self.config.max_depth
                );
                continue;
            }

            result.steps += 1;
            self.emit(ExploreEvent::Step {
                steps: result.steps,
                frontier: self.frontier.len(),
                states: self.store.len(),
                documents: self.documents.len(),
            });

            if let Err(reason) = self.backtrack(&entry.origin).await {
                consecutive_restore_failures += 1;
                warn!(
                    "Skipping '{}': could not return to {} ({})",
                    entry.element.label,
                    entry.origin.short(),
                    reason
                );
                result.record_failure(
                    FailureKind::Restore,
                    entry.depth,
                    Some(&entry.element.label),
                    reason.clone(),
                );
                self.emit(ExploreEvent::RestoreFailed {
                    fingerprint: entry.origin.clone(),
                    reason: reason.clone(),
                });

                if consecutive_restore_failures >= self.config.max_restore_failures {
                    return Termination::Aborted {
                        reason: format!(
                            "{} consecutive restore failures, last: {}",
                            consecutive_restore_failures, reason
                        ),
                    };
                }
                continue;
            }
            consecutive_restore_failures = 0;

            let snapshot = match self.interact(&entry).await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_fatal() => {
                    return Termination::Aborted {
                        reason: e.to_string(),
                    };
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(
                        "Interaction with '{}' at depth {} failed: {}",
                        entry.element.label, entry.depth, reason
                    );
                    result.record_failure(
                        FailureKind::Navigation,
                        entry.depth,
                        Some(&entry.element.label),
                        reason.clone(),
                    );
                    self.emit(ExploreEvent::NavigationFailed {
                        element: entry.element.label.clone(),
                        depth: entry.depth,
                        reason,
                    });
                    continue;
                }
            };

            if let Err(e) = self.accept_state(&snapshot, entry.depth, result).await {
                return Termination::Aborted {
                    reason: e.to_string(),
                };
            }
        }
    }

    /// Bring the session to `origin`, reloading the start state and retrying
    /// once if the first attempt fails.
    async fn backtrack(&mut self, origin: &Fingerprint) -> std::result::Result<(), String> {
        let first = match self.restore(origin).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!(
            "Restore to {} failed ({}), reloading start state",
            origin.short(),
            first
        );

        match tokio::time::timeout(self.config.interaction_timeout, self.navigator.reset()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("{}; reload failed: {}", first, e)),
            Err(_) => {
                self.navigator.invalidate();
                return Err(format!(
                    "{}; reload timed out after {:?}",
                    first, self.config.interaction_timeout
                ));
            }
        }

        self.restore(origin)
            .await
            .map_err(|retry| format!("{}; retry: {}", first, retry))
    }

    async fn restore(&mut self, origin: &Fingerprint) -> Result<()> {
        let limit = self.config.restore_timeout();
        match tokio::time::timeout(limit, self.navigator.restore_to(origin)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.navigator.invalidate();
                Err(ScanError::Timeout(limit))
            }
        }
    }

    async fn interact(&mut self, entry: &FrontierEntry) -> Result<PageSnapshot> {
        let limit = self.config.interaction_timeout;
        match tokio::time::timeout(limit, self.navigator.interact(&entry.element, entry.depth)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                // The click may have landed half-way; make the next restore replay.
                self.navigator.invalidate();
                Err(ScanError::Navigation(format!(
                    "interaction timed out after {:?}",
                    limit
                )))
            }
        }
    }

    /// Merge a state's documents and, if it is new, mark it and queue its
    /// elements one level deeper.
    async fn accept_state(
        &mut self,
        snapshot: &PageSnapshot,
        depth: usize,
        result: &mut RunResult,
    ) -> Result<()> {
        for url in self.documents.merge(snapshot.document_links(), depth) {
            info!("Found document at depth {}: {}", depth, url);
            self.emit(ExploreEvent::DocumentFound { url, depth });
        }

        let fingerprint = snapshot.fingerprint();
        if self.store.has_visited(fingerprint) {
            debug!("State {} already expanded, dropping branch", fingerprint.short());
            self.emit(ExploreEvent::Converged {
                fingerprint: fingerprint.clone(),
                depth,
            });
            return Ok(());
        }

        self.expand(snapshot, depth, result).await
    }

    /// Mark an unvisited state and queue its ranked elements. Marking a state
    /// twice is an invariant violation and aborts the run.
    async fn expand(
        &mut self,
        snapshot: &PageSnapshot,
        depth: usize,
        result: &mut RunResult,
    ) -> Result<()> {
        let fingerprint = snapshot.fingerprint();
        self.store.mark_visited(fingerprint.clone(), depth)?;
        debug!(
            "New state {} at depth {} with {} elements ({})",
            fingerprint.short(),
            depth,
            snapshot.elements().len(),
            snapshot.url()
        );
        self.emit(ExploreEvent::StateDiscovered {
            fingerprint: fingerprint.clone(),
            depth,
            url: snapshot.url().to_string(),
            elements: snapshot.elements().len(),
        });

        // Children of a state at the cap could never be clicked.
        if depth >= self.config.max_depth {
            return Ok(());
        }

        let ranking = rank_elements(&self.ranker, snapshot, self.config.rank_timeout).await;
        if let Some(reason) = &ranking.degraded {
            result.record_failure(FailureKind::Ranker, depth, None, reason.clone());
            self.emit(ExploreEvent::RankerDegraded {
                fingerprint: fingerprint.clone(),
                reason: reason.clone(),
            });
        }

        for ranked in ranking.elements {
            self.frontier.push(FrontierEntry::new(
                fingerprint.clone(),
                ranked.element,
                ranked.score,
                depth + 1,
            ));
        }
        Ok(())
    }

    fn emit(&self, event: ExploreEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }
}
