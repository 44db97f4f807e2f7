//! Ranking interface to the external oracle, plus the adapter that makes the
//! oracle's output total and its failures harmless.

use crate::error::Result;
use crate::snapshot::{ElementId, InteractiveElement, PageSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Score given to every element when the oracle cannot be used.
pub const FALLBACK_SCORE: f64 = 0.0;

/// Scores the interactive elements of a snapshot. Higher is more interesting.
///
/// Implementations may omit elements or fail outright; [`rank_elements`]
/// takes care of both.
#[async_trait]
pub trait Ranker: Send + Sync {
    async fn rank(&self, snapshot: &PageSnapshot) -> Result<Vec<(ElementId, f64)>>;
}

#[async_trait]
impl<T: Ranker + ?Sized> Ranker for Box<T> {
    async fn rank(&self, snapshot: &PageSnapshot) -> Result<Vec<(ElementId, f64)>> {
        (**self).rank(snapshot).await
    }
}

/// Deterministic ranker: every element gets the same score, so the frontier
/// falls back to document order.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentOrderRanker;

#[async_trait]
impl Ranker for DocumentOrderRanker {
    async fn rank(&self, snapshot: &PageSnapshot) -> Result<Vec<(ElementId, f64)>> {
        Ok(snapshot
            .elements()
            .iter()
            .map(|element| (element.id.clone(), FALLBACK_SCORE))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct RankedElement {
    pub element: InteractiveElement,
    pub score: f64,
}

/// Every element of a snapshot with a score, best first.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub elements: Vec<RankedElement>,
    /// Why the oracle result was discarded, if it was.
    pub degraded: Option<String>,
}

impl Ranking {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Ask the ranker for scores, bounded by `timeout`.
///
/// Elements the ranker left out (or scored with NaN) get `-inf` and keep
/// their document order behind the ranked ones. A failed or timed-out call
/// degrades to document order.
pub async fn rank_elements<R>(ranker: &R, snapshot: &PageSnapshot, timeout: Duration) -> Ranking
where
    R: Ranker + ?Sized,
{
    if snapshot.elements().is_empty() {
        return Ranking {
            elements: Vec::new(),
            degraded: None,
        };
    }

    let reason = match tokio::time::timeout(timeout, ranker.rank(snapshot)).await {
        Ok(Ok(scores)) => {
            debug!(
                "Ranker scored {}/{} elements of {}",
                scores.len(),
                snapshot.elements().len(),
                snapshot.fingerprint().short()
            );
            return Ranking {
                elements: apply_scores(snapshot, &scores),
                degraded: None,
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("ranker timed out after {:?}", timeout),
    };

    warn!(
        "Ranking {} fell back to document order: {}",
        snapshot.fingerprint().short(),
        reason
    );
    Ranking {
        elements: fallback_ranking(snapshot),
        degraded: Some(reason),
    }
}

/// Document order, all elements scored equally.
pub fn fallback_ranking(snapshot: &PageSnapshot) -> Vec<RankedElement> {
    snapshot
        .elements()
        .iter()
        .map(|element| RankedElement {
            element: element.clone(),
            score: FALLBACK_SCORE,
        })
        .collect()
}

/// Attach scores to elements. Unknown ids are ignored; the first score for a
/// given id wins.
pub fn apply_scores(snapshot: &PageSnapshot, scores: &[(ElementId, f64)]) -> Vec<RankedElement> {
    let mut by_id: HashMap<&ElementId, f64> = HashMap::new();
    for (id, score) in scores {
        if !score.is_nan() {
            by_id.entry(id).or_insert(*score);
        }
    }

    let mut ranked: Vec<RankedElement> = snapshot
        .elements()
        .iter()
        .map(|element| RankedElement {
            element: element.clone(),
            score: by_id.get(&element.id).copied().unwrap_or(f64::NEG_INFINITY),
        })
        .collect();

    // Stable: equal scores keep document order.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
