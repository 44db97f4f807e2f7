use docdelve_scanner::ollama::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use docdelve_scanner::{
    ChromeNavigator, ChromeOptions, DocumentOrderRanker, EventCallback, ExploreConfig,
    ExploreEvent, Explorer, Navigator, OllamaRanker, Ranker, RunResult, SnapshotExtractor,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

/// Which oracle orders the elements of each state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankerChoice {
    Ollama { url: String, model: String },
    /// No oracle: elements are tried in document order.
    DocumentOrder,
}

impl Default for RankerChoice {
    fn default() -> Self {
        RankerChoice::Ollama {
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Options for configuring an exploration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreOptions {
    pub url: String,
    pub max_depth: usize,
    pub step_budget: usize,
    pub time_budget: Option<Duration>,
    pub interaction_timeout: Duration,
    pub rank_timeout: Duration,
    pub max_restore_failures: usize,
    pub ranker: RankerChoice,
    /// Replaces the ranker's default description of what to look for.
    pub goal: Option<String>,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub settle: Duration,
    pub document_extensions: Vec<String>,
    #[serde(skip)]
    pub show_progress_bars: bool,
}

impl ExploreOptions {
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = ExploreConfig::default();
        let chrome = ChromeOptions::default();
        Self {
            url: url.into(),
            max_depth: defaults.max_depth,
            step_budget: defaults.step_budget,
            time_budget: defaults.time_budget,
            interaction_timeout: defaults.interaction_timeout,
            rank_timeout: defaults.rank_timeout,
            max_restore_failures: defaults.max_restore_failures,
            ranker: RankerChoice::default(),
            goal: None,
            headless: chrome.headless,
            chrome_executable: chrome.executable,
            settle: chrome.settle,
            document_extensions: vec!["pdf".to_string()],
            show_progress_bars: false,
        }
    }

    pub fn explore_config(&self) -> ExploreConfig {
        let mut config = ExploreConfig::new()
            .with_max_depth(self.max_depth)
            .with_step_budget(self.step_budget)
            .with_interaction_timeout(self.interaction_timeout)
            .with_rank_timeout(self.rank_timeout)
            .with_max_restore_failures(self.max_restore_failures);
        if let Some(budget) = self.time_budget {
            config = config.with_time_budget(budget);
        }
        config
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            headless: self.headless,
            executable: self.chrome_executable.clone(),
            settle: self.settle,
        }
    }

    /// JSON snapshot of the options, stored with each run.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Callback for reporting exploration progress
pub type ExploreProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Exploration only makes sense for web pages.
pub fn validate_start_url(url: &str) -> Result<Url, String> {
    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL '{}': {}", url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(format!(
            "Unsupported scheme '{}' in {}: only http and https can be explored",
            other, url
        )),
    }
}

fn progress_message(event: &ExploreEvent) -> Option<String> {
    match event {
        ExploreEvent::DocumentFound { url, depth } => {
            Some(format!("[+] Document found at depth {}: {}", depth, url))
        }
        ExploreEvent::NavigationFailed {
            element,
            depth,
            reason,
        } => Some(format!(
            "[!] Click on '{}' at depth {} failed: {}",
            element, depth, reason
        )),
        ExploreEvent::RestoreFailed {
            fingerprint,
            reason,
        } => Some(format!(
            "[!] Could not return to state {}: {}",
            fingerprint.short(),
            reason
        )),
        ExploreEvent::RankerDegraded { reason, .. } => Some(format!(
            "[!] Ranker unavailable, using document order: {}",
            reason
        )),
        ExploreEvent::StateDiscovered { .. }
        | ExploreEvent::Converged { .. }
        | ExploreEvent::Step { .. } => None,
    }
}

/// Run the exploration loop over an already-open session.
/// Returns the result together with the navigator so the caller can close it.
pub async fn explore_with<N, R>(
    navigator: N,
    ranker: R,
    options: &ExploreOptions,
    progress_callback: Option<ExploreProgressCallback>,
    cancel: CancellationToken,
) -> (RunResult, N)
where
    N: Navigator,
    R: Ranker,
{
    // Single spinner for the whole run (only if enabled)
    let progress_bar = if options.show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Capturing start state...");
        Some(pb)
    } else {
        None
    };

    let pb_events = progress_bar.clone();
    let events: EventCallback = Arc::new(move |event: ExploreEvent| {
        if let (
            Some(pb),
            ExploreEvent::Step {
                steps,
                frontier,
                states,
                documents,
            },
        ) = (&pb_events, &event)
        {
            pb.set_message(format!(
                "Exploring... {} clicks, {} states, {} documents, {} queued",
                steps, states, documents, frontier
            ));
        }

        if let (Some(message), Some(callback)) = (progress_message(&event), &progress_callback) {
            match &pb_events {
                Some(pb) => pb.suspend(|| callback(message)),
                None => callback(message),
            }
        }
    });

    let mut explorer = Explorer::new(navigator, ranker, options.explore_config())
        .with_event_callback(events)
        .with_cancellation(cancel);
    let result = explorer.run().await;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Exploration {}: {} documents in {} states",
            result.termination.as_str().replace('_', " "),
            result.documents.len(),
            result.states_visited
        ));
    }

    let (navigator, _) = explorer.into_parts();
    (result, navigator)
}

async fn build_ranker(
    options: &ExploreOptions,
    progress_callback: Option<&ExploreProgressCallback>,
) -> Box<dyn Ranker> {
    match &options.ranker {
        RankerChoice::DocumentOrder => Box::new(DocumentOrderRanker),
        RankerChoice::Ollama { url, model } => {
            let mut ranker = OllamaRanker::with_url(url.as_str()).with_model(model.as_str());
            if let Some(goal) = &options.goal {
                ranker = ranker.with_goal(goal.as_str());
            }
            // Keep going: every state will just fall back to document order.
            if let Err(e) = ranker.check_connection().await {
                warn!("Ollama check failed: {}", e);
                if let Some(callback) = progress_callback {
                    callback(format!(
                        "[!] Ollama at {} is not reachable, elements will be tried in document order",
                        url
                    ));
                }
            }
            Box::new(ranker)
        }
    }
}

/// Launch Chrome on the start URL, explore, and close the browser.
pub async fn execute_explore(
    options: ExploreOptions,
    progress_callback: Option<ExploreProgressCallback>,
    cancel: CancellationToken,
) -> Result<RunResult, String> {
    let start = validate_start_url(&options.url)?;
    let extractor =
        SnapshotExtractor::new().with_document_extensions(&options.document_extensions);
    let ranker = build_ranker(&options, progress_callback.as_ref()).await;

    let navigator = ChromeNavigator::launch(start.as_str(), options.chrome_options(), extractor)
        .await
        .map_err(|e| format!("Failed to open {}: {}", start, e))?;

    let (result, navigator) =
        explore_with(navigator, ranker, &options, progress_callback, cancel).await;
    navigator.shutdown().await;

    Ok(result)
}
