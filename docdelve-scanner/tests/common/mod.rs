#![allow(dead_code)]

use async_trait::async_trait;
use docdelve_scanner::error::{Result, ScanError};
use docdelve_scanner::snapshot::ElementKind;
use docdelve_scanner::{ElementId, Fingerprint, InteractiveElement, Navigator, PageSnapshot, Ranker};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct ScriptedState {
    elements: Vec<String>,
    documents: Vec<String>,
}

#[derive(Debug, Clone)]
enum Outcome {
    To(String),
    Fail(String),
    Hang,
}

/// One recorded `interact` call: origin state, element id, requested depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub origin: String,
    pub element: String,
    pub depth: usize,
}

/// In-memory site: named states, the elements on each, and where each click
/// leads. Restoring teleports between known states.
pub struct ScriptedNavigator {
    root: String,
    states: HashMap<String, ScriptedState>,
    transitions: HashMap<(String, String), Outcome>,
    unrestorable: HashSet<String>,
    flaky_restores: usize,
    click_delay: Duration,
    current: Option<String>,
    pub interactions: Vec<Interaction>,
    pub resets: usize,
    pub invalidations: usize,
}

impl ScriptedNavigator {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            states: HashMap::new(),
            transitions: HashMap::new(),
            unrestorable: HashSet::new(),
            flaky_restores: 0,
            click_delay: Duration::ZERO,
            current: Some(root.to_string()),
            interactions: Vec::new(),
            resets: 0,
            invalidations: 0,
        }
    }

    pub fn state(mut self, name: &str, elements: &[&str], documents: &[&str]) -> Self {
        self.states.insert(
            name.to_string(),
            ScriptedState {
                elements: elements.iter().map(|e| e.to_string()).collect(),
                documents: documents.iter().map(|d| d.to_string()).collect(),
            },
        );
        self
    }

    pub fn click(mut self, from: &str, element: &str, to: &str) -> Self {
        self.transitions
            .insert((from.to_string(), element.to_string()), Outcome::To(to.to_string()));
        self
    }

    pub fn failing(mut self, from: &str, element: &str, reason: &str) -> Self {
        self.transitions.insert(
            (from.to_string(), element.to_string()),
            Outcome::Fail(reason.to_string()),
        );
        self
    }

    pub fn hanging(mut self, from: &str, element: &str) -> Self {
        self.transitions
            .insert((from.to_string(), element.to_string()), Outcome::Hang);
        self
    }

    pub fn unrestorable(mut self, state: &str) -> Self {
        self.unrestorable.insert(state.to_string());
        self
    }

    /// The next `count` restores that need to move the session fail.
    pub fn fail_restores(mut self, count: usize) -> Self {
        self.flaky_restores = count;
        self
    }

    /// Every successful click takes this long.
    pub fn with_click_delay(mut self, delay: Duration) -> Self {
        self.click_delay = delay;
        self
    }

    pub fn clicked(&self) -> Vec<&str> {
        self.interactions.iter().map(|i| i.element.as_str()).collect()
    }

    fn snapshot(&self, name: &str, depth: usize) -> Result<PageSnapshot> {
        let state = self
            .states
            .get(name)
            .ok_or_else(|| ScanError::Browser(format!("unknown state {}", name)))?;
        let elements = state
            .elements
            .iter()
            .map(|id| InteractiveElement::new(id.as_str(), id.as_str(), ElementKind::Button, format!("#{}", id)))
            .collect();
        Ok(PageSnapshot::new(
            Fingerprint::new(name),
            depth,
            format!("https://site.test/{}", name),
            elements,
            state.documents.clone(),
        ))
    }
}

#[async_trait]
impl Navigator for ScriptedNavigator {
    async fn current_snapshot(&mut self, depth: usize) -> Result<PageSnapshot> {
        let current = self
            .current
            .clone()
            .ok_or_else(|| ScanError::Browser("session state unknown".to_string()))?;
        self.snapshot(&current, depth)
    }

    async fn interact(
        &mut self,
        element: &InteractiveElement,
        depth: usize,
    ) -> Result<PageSnapshot> {
        let origin = self
            .current
            .clone()
            .ok_or_else(|| ScanError::Navigation("session state unknown".to_string()))?;
        self.interactions.push(Interaction {
            origin: origin.clone(),
            element: element.id.to_string(),
            depth,
        });

        match self.transitions.get(&(origin, element.id.to_string())).cloned() {
            Some(Outcome::To(target)) => {
                if !self.click_delay.is_zero() {
                    tokio::time::sleep(self.click_delay).await;
                }
                self.current = Some(target.clone());
                self.snapshot(&target, depth)
            }
            Some(Outcome::Fail(reason)) => Err(ScanError::Navigation(reason)),
            Some(Outcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(ScanError::Navigation("never returns".to_string()))
            }
            None => Err(ScanError::Navigation(format!("{} does nothing", element.id))),
        }
    }

    async fn restore_to(&mut self, fingerprint: &Fingerprint) -> Result<()> {
        let target = fingerprint.as_str();
        if self.current.as_deref() == Some(target) {
            return Ok(());
        }
        if self.flaky_restores > 0 {
            self.flaky_restores -= 1;
            return Err(ScanError::Restore(format!("replay to {} diverged", target)));
        }
        if self.unrestorable.contains(target) || !self.states.contains_key(target) {
            return Err(ScanError::Restore(format!("cannot reach {}", target)));
        }
        self.current = Some(target.to_string());
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.resets += 1;
        self.current = Some(self.root.clone());
        Ok(())
    }

    fn invalidate(&mut self) {
        self.invalidations += 1;
        self.current = None;
    }
}

/// Fixed scores per state; unscripted states get an empty answer, which
/// ranks everything at `-inf` in document order.
#[derive(Default)]
pub struct ScriptedRanker {
    scores: HashMap<String, Vec<(String, f64)>>,
    unavailable: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedRanker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scores(mut self, state: &str, scores: &[(&str, f64)]) -> Self {
        self.scores.insert(
            state.to_string(),
            scores.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
        );
        self
    }

    pub fn unavailable_for(mut self, state: &str) -> Self {
        self.unavailable.insert(state.to_string());
        self
    }

    pub fn ranked_states(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ranker for ScriptedRanker {
    async fn rank(&self, snapshot: &PageSnapshot) -> Result<Vec<(ElementId, f64)>> {
        let state = snapshot.fingerprint().as_str().to_string();
        self.calls.lock().unwrap().push(state.clone());

        if self.unavailable.contains(&state) {
            return Err(ScanError::RankerUnavailable("oracle offline".to_string()));
        }
        Ok(self
            .scores
            .get(&state)
            .map(|scores| {
                scores
                    .iter()
                    .map(|(id, score)| (ElementId::new(id.as_str()), *score))
                    .collect()
            })
            .unwrap_or_default())
    }
}
