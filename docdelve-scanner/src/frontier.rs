//! Pending (state, element) work items.
//!
//! Ordering: shallower depth first, then higher rank, then insertion order.
//! Shallow-first keeps the depth cap from being reached on one branch while
//! siblings at the same level are still untried.

use crate::snapshot::{ElementId, Fingerprint, InteractiveElement};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
pub struct FrontierEntry {
    /// State the element belongs to; the session must be restored here first.
    pub origin: Fingerprint,
    pub element: InteractiveElement,
    /// Ranker score, higher is more interesting. `-inf` for unranked elements.
    pub rank: f64,
    /// Depth of the state the interaction leads to.
    pub depth: usize,
}

impl FrontierEntry {
    pub fn new(origin: Fingerprint, element: InteractiveElement, rank: f64, depth: usize) -> Self {
        Self {
            origin,
            element,
            rank,
            depth,
        }
    }

    pub fn element_id(&self) -> &ElementId {
        &self.element.id
    }
}

#[derive(Debug)]
struct QueuedEntry {
    sequence: u64,
    entry: FrontierEntry,
}

impl QueuedEntry {
    /// Max-heap order: "greater" pops first.
    fn priority(&self, other: &Self) -> Ordering {
        other
            .entry
            .depth
            .cmp(&self.entry.depth)
            .then_with(|| self.entry.rank.total_cmp(&other.entry.rank))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority(other) == Ordering::Equal
    }
}

impl Eq for QueuedEntry {}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority(other)
    }
}

#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<QueuedEntry>,
    next_sequence: u64,
    high_water: usize,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FrontierEntry) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedEntry { sequence, entry });
        self.high_water = self.high_water.max(self.heap.len());
    }

    /// `None` means the frontier is exhausted.
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.heap.pop().map(|queued| queued.entry)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Largest size the frontier reached.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_sequence = 0;
        self.high_water = 0;
    }
}
