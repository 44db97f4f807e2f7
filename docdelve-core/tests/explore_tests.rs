// Tests for run orchestration

use async_trait::async_trait;
use docdelve_core::explore::{
    ExploreOptions, ExploreProgressCallback, RankerChoice, explore_with, validate_start_url,
};
use docdelve_scanner::error::{Result, ScanError};
use docdelve_scanner::snapshot::ElementKind;
use docdelve_scanner::{
    DocumentOrderRanker, Fingerprint, InteractiveElement, Navigator, PageSnapshot, Termination,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Two-page site: a listing with one "Details" button leading to a page
/// that links a PDF. Any other click is rejected.
struct TwoPageSite {
    on_detail: bool,
    clicks: usize,
}

impl TwoPageSite {
    fn new() -> Self {
        Self {
            on_detail: false,
            clicks: 0,
        }
    }

    fn snapshot(&self, depth: usize) -> PageSnapshot {
        if self.on_detail {
            PageSnapshot::new(
                Fingerprint::new("detail"),
                depth,
                "https://tenders.test/detail",
                vec![InteractiveElement::new("back", "Zurück", ElementKind::Button, "back")],
                vec!["https://tenders.test/files/lv.pdf".to_string()],
            )
        } else {
            PageSnapshot::new(
                Fingerprint::new("listing"),
                depth,
                "https://tenders.test/",
                vec![InteractiveElement::new("details", "Details", ElementKind::Button, "details")],
                Vec::new(),
            )
        }
    }
}

#[async_trait]
impl Navigator for TwoPageSite {
    async fn current_snapshot(&mut self, depth: usize) -> Result<PageSnapshot> {
        Ok(self.snapshot(depth))
    }

    async fn interact(&mut self, element: &InteractiveElement, depth: usize) -> Result<PageSnapshot> {
        self.clicks += 1;
        match element.id.as_str() {
            "details" => {
                self.on_detail = true;
                Ok(self.snapshot(depth))
            }
            other => Err(ScanError::Navigation(format!("{} is disabled", other))),
        }
    }

    async fn restore_to(&mut self, fingerprint: &Fingerprint) -> Result<()> {
        self.on_detail = fingerprint.as_str() == "detail";
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.on_detail = false;
        Ok(())
    }
}

fn collecting_callback() -> (ExploreProgressCallback, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let callback: ExploreProgressCallback = Arc::new(move |message: String| {
        sink.lock().unwrap().push(message);
    });
    (callback, messages)
}

// ============================================================================
// Options Tests
// ============================================================================

#[test]
fn test_options_defaults() {
    let options = ExploreOptions::new("https://tenders.test/");

    assert_eq!(options.max_depth, 3);
    assert_eq!(options.step_budget, 200);
    assert_eq!(options.time_budget, None);
    assert_eq!(options.interaction_timeout, Duration::from_secs(30));
    assert_eq!(options.rank_timeout, Duration::from_secs(60));
    assert_eq!(options.max_restore_failures, 3);
    assert!(options.headless);
    assert_eq!(options.document_extensions, vec!["pdf".to_string()]);
    assert!(matches!(options.ranker, RankerChoice::Ollama { .. }));
}

#[test]
fn test_explore_config_mapping() {
    let mut options = ExploreOptions::new("https://tenders.test/");
    options.max_depth = 5;
    options.step_budget = 10;
    options.time_budget = Some(Duration::from_secs(120));
    options.max_restore_failures = 0;

    let config = options.explore_config();
    assert_eq!(config.max_depth, 5);
    assert_eq!(config.step_budget, 10);
    assert_eq!(config.time_budget, Some(Duration::from_secs(120)));
    // At least one restore failure is always tolerated
    assert_eq!(config.max_restore_failures, 1);
}

#[test]
fn test_options_json() {
    let mut options = ExploreOptions::new("https://tenders.test/");
    options.ranker = RankerChoice::DocumentOrder;

    let value: serde_json::Value = serde_json::from_str(&options.to_json()).unwrap();
    assert_eq!(value["url"], "https://tenders.test/");
    assert_eq!(value["max_depth"], 3);
    assert_eq!(value["ranker"], "DocumentOrder");
    assert!(value.get("show_progress_bars").is_none());
}

#[test]
fn test_validate_start_url() {
    assert!(validate_start_url("https://tenders.test/").is_ok());
    assert!(validate_start_url("http://localhost:8080/list").is_ok());

    let err = validate_start_url("ftp://tenders.test/").unwrap_err();
    assert!(err.contains("ftp"));
    assert!(validate_start_url("not a url").is_err());
}

// ============================================================================
// Orchestration Tests
// ============================================================================

#[tokio::test]
async fn test_explore_with_finds_document() {
    let options = ExploreOptions::new("https://tenders.test/");
    let (callback, messages) = collecting_callback();

    let (result, site) = explore_with(
        TwoPageSite::new(),
        DocumentOrderRanker,
        &options,
        Some(callback),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(result.termination, Termination::Exhausted);
    assert_eq!(result.document_urls(), vec!["https://tenders.test/files/lv.pdf"]);
    assert_eq!(result.states_visited, 2);
    assert_eq!(result.navigation_failures, 1);
    assert_eq!(site.clicks, 2);

    let messages = messages.lock().unwrap();
    assert!(messages
        .iter()
        .any(|m| m.contains("[+]") && m.contains("lv.pdf")));
    assert!(messages
        .iter()
        .any(|m| m.contains("[!]") && m.contains("Zurück")));
}

#[tokio::test]
async fn test_explore_with_cancelled_token() {
    let options = ExploreOptions::new("https://tenders.test/");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (result, site) =
        explore_with(TwoPageSite::new(), DocumentOrderRanker, &options, None, cancel).await;

    assert_eq!(result.termination, Termination::Cancelled);
    assert_eq!(site.clicks, 0);
}

#[tokio::test]
async fn test_explore_with_depth_zero() {
    let mut options = ExploreOptions::new("https://tenders.test/");
    options.max_depth = 0;

    let (result, site) = explore_with(
        TwoPageSite::new(),
        DocumentOrderRanker,
        &options,
        None,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(result.states_visited, 1);
    assert!(result.documents.is_empty());
    assert_eq!(site.clicks, 0);
}
