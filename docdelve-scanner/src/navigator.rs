//! The live-session seam between the exploration engine and a browser.

use crate::error::Result;
use crate::snapshot::{ElementHandle, Fingerprint, InteractiveElement, PageSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;

/// One live, stateful page session.
///
/// The engine drives exactly one navigator and never calls it concurrently.
/// Before every [`interact`](Navigator::interact) the engine makes sure the
/// session is at the element's origin state via
/// [`restore_to`](Navigator::restore_to).
#[async_trait]
pub trait Navigator: Send {
    /// Snapshot of whatever state the session is in right now.
    async fn current_snapshot(&mut self, depth: usize) -> Result<PageSnapshot>;

    /// Click `element` and return the state it leads to. Fails with
    /// [`ScanError::Navigation`](crate::ScanError::Navigation) when the element
    /// is gone or the click is rejected.
    async fn interact(
        &mut self,
        element: &InteractiveElement,
        depth: usize,
    ) -> Result<PageSnapshot>;

    /// Bring the session back to a previously observed state. A no-op when
    /// the session is already there.
    async fn restore_to(&mut self, fingerprint: &Fingerprint) -> Result<()>;

    /// Return to the entry page.
    async fn reset(&mut self) -> Result<()>;

    /// Forget what is known about the current state, e.g. after an
    /// interaction was abandoned half-way.
    fn invalidate(&mut self) {}
}

#[async_trait]
impl<T: Navigator + ?Sized> Navigator for Box<T> {
    async fn current_snapshot(&mut self, depth: usize) -> Result<PageSnapshot> {
        (**self).current_snapshot(depth).await
    }

    async fn interact(
        &mut self,
        element: &InteractiveElement,
        depth: usize,
    ) -> Result<PageSnapshot> {
        (**self).interact(element, depth).await
    }

    async fn restore_to(&mut self, fingerprint: &Fingerprint) -> Result<()> {
        (**self).restore_to(fingerprint).await
    }

    async fn reset(&mut self) -> Result<()> {
        (**self).reset().await
    }

    fn invalidate(&mut self) {
        (**self).invalidate()
    }
}

/// How to reach each known state from the entry page: the click path that
/// first produced it. Used for replay-based backtracking.
#[derive(Debug, Default, Clone)]
pub struct ReplayLog {
    paths: HashMap<Fingerprint, Vec<ElementHandle>>,
}

impl ReplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_root(&mut self, root: &Fingerprint) {
        self.paths.entry(root.clone()).or_default();
    }

    /// Record that clicking `handle` in `from` produced `to`. The first path
    /// found for a state is kept, which is also the shortest under
    /// shallow-first exploration.
    pub fn record_step(&mut self, from: &Fingerprint, handle: &ElementHandle, to: &Fingerprint) {
        if self.paths.contains_key(to) {
            return;
        }
        let Some(prefix) = self.paths.get(from) else {
            return;
        };
        let mut path = prefix.clone();
        path.push(handle.clone());
        self.paths.insert(to.clone(), path);
    }

    pub fn path_to(&self, fingerprint: &Fingerprint) -> Option<&[ElementHandle]> {
        self.paths.get(fingerprint).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::new(s)
    }

    fn handle(s: &str) -> ElementHandle {
        ElementHandle::new(s)
    }

    #[test]
    fn test_paths_extend_from_parent() {
        let mut log = ReplayLog::new();
        log.record_root(&fp("root"));
        log.record_step(&fp("root"), &handle("#a"), &fp("s1"));
        log.record_step(&fp("s1"), &handle("#b"), &fp("s2"));

        assert_eq!(log.path_to(&fp("root")).unwrap().len(), 0);
        assert_eq!(log.path_to(&fp("s2")).unwrap(), &[handle("#a"), handle("#b")]);
    }

    #[test]
    fn test_first_path_wins() {
        let mut log = ReplayLog::new();
        log.record_root(&fp("root"));
        log.record_step(&fp("root"), &handle("#a"), &fp("s1"));
        log.record_step(&fp("root"), &handle("#z"), &fp("s1"));

        assert_eq!(log.path_to(&fp("s1")).unwrap(), &[handle("#a")]);
    }

    #[test]
    fn test_unknown_origin_is_ignored() {
        let mut log = ReplayLog::new();
        log.record_step(&fp("nowhere"), &handle("#a"), &fp("s1"));

        assert!(log.path_to(&fp("s1")).is_none());
        assert!(log.is_empty());
    }
}
