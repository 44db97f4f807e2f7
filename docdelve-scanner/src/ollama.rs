//! Element ranking through a local Ollama model.

use crate::error::{Result, ScanError};
use crate::ranker::Ranker;
use crate::snapshot::{ElementId, ElementKind, InteractiveElement, PageSnapshot};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "deepseek-v2:latest";

const DEFAULT_GOAL: &str = "You are helping to find tender/bid documents \
(\"Ausschreibungsunterlagen\", \"Vergabeunterlagen\") on a German procurement platform.";

const STRATEGY: &str = "\
1. Look for info buttons (\"i\") or detail buttons near tender titles
2. Check for elements containing words like \"Unterlagen\", \"Dokumente\", \"Details\"
3. Consider table rows that might be clickable to reveal more information
4. Examine any elements marked as information or detail indicators";

const RESPONSE_FORMAT: &str = r#"{
    "actions": [
        {
            "identifier": "element id from the list, e.g. e3",
            "reason": "why this element looks promising",
            "priority": 1-5 (5 highest)
        }
    ],
    "analysis": "your reasoning about the page structure and suggested approach"
}"#;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct Analysis {
    #[serde(default)]
    actions: Vec<SuggestedAction>,
    #[serde(default)]
    analysis: String,
}

#[derive(Debug, Deserialize)]
struct SuggestedAction {
    #[serde(default)]
    identifier: String,
    #[serde(default)]
    priority: serde_json::Value,
}

impl SuggestedAction {
    /// Models return the priority as a number or as a quoted number.
    fn priority(&self) -> Option<f64> {
        match &self.priority {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

pub struct OllamaRanker {
    client: Client,
    base_url: String,
    model: String,
    goal: String,
}

impl OllamaRanker {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_OLLAMA_URL)
    }

    pub fn with_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            goal: DEFAULT_GOAL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// One or two sentences describing what documents the run is after.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Probe `/api/version` so front ends can warn before a run starts.
    pub async fn check_connection(&self) -> Result<()> {
        let url = format!("{}/api/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScanError::RankerUnavailable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ScanError::RankerUnavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    fn build_prompt(&self, snapshot: &PageSnapshot) -> String {
        let elements = snapshot.elements();
        let count = |kind: ElementKind| elements.iter().filter(|e| e.kind == kind).count();

        let listing = elements
            .iter()
            .map(|e| format!("- [{}] {}: {}", e.id, e.kind.as_str(), e.label))
            .collect::<Vec<_>>()
            .join("\n");

        let documents = if snapshot.document_links().is_empty() {
            "none yet".to_string()
        } else {
            snapshot.document_links().join("\n")
        };

        format!(
            "Analyze this webpage for potential paths to PDF documents. {goal}\n\n\
             Current state: depth {depth}, {url}\n\n\
             Page Structure:\n\
             1. Clickable Table Rows: {rows}\n\
             2. Interactive Buttons: {buttons}\n\
             3. Interesting Elements: {details}\n\
             4. Current Document Links: {doc_count}\n\n\
             Interactive elements (id, type, text):\n{listing}\n\n\
             Documents already visible:\n{documents}\n\n\
             Strategy:\n{strategy}\n\n\
             Return a JSON response in this exact format:\n{format}\n\n\
             Use the element ids from the list as identifiers. \
             Focus on finding interactive elements that could lead to document sections.",
            goal = self.goal,
            depth = snapshot.depth(),
            url = snapshot.url(),
            rows = count(ElementKind::Row),
            buttons = count(ElementKind::Button),
            details = count(ElementKind::Detail) + count(ElementKind::Link),
            doc_count = snapshot.document_links().len(),
            listing = listing,
            documents = documents,
            strategy = STRATEGY,
            format = RESPONSE_FORMAT,
        )
    }
}

impl Default for OllamaRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ranker for OllamaRanker {
    async fn rank(&self, snapshot: &PageSnapshot) -> Result<Vec<(ElementId, f64)>> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt: self.build_prompt(snapshot),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScanError::RankerUnavailable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ScanError::RankerUnavailable(format!(
                "ollama returned {}: {}",
                status, text
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ScanError::RankerUnavailable(format!("malformed response: {}", e)))?;

        let analysis = parse_analysis(&body.response)?;
        debug!("Model analysis: {}", analysis.analysis);

        Ok(resolve_actions(snapshot.elements(), &analysis.actions))
    }
}

/// The model wraps its JSON in prose; take the outermost `{...}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_analysis(text: &str) -> Result<Analysis> {
    let json = extract_json_object(text).ok_or_else(|| {
        ScanError::RankerUnavailable("model response contained no JSON object".to_string())
    })?;
    serde_json::from_str(json)
        .map_err(|e| ScanError::RankerUnavailable(format!("unparsable model JSON: {}", e)))
}

/// Map the model's identifiers onto element ids: exact id, then exact label,
/// then label containment. Each element is scored at most once.
fn resolve_actions(
    elements: &[InteractiveElement],
    actions: &[SuggestedAction],
) -> Vec<(ElementId, f64)> {
    let mut claimed: HashSet<&ElementId> = HashSet::new();
    let mut scores = Vec::new();

    for action in actions {
        let Some(priority) = action.priority() else {
            continue;
        };
        let wanted = action.identifier.trim().to_lowercase();
        if wanted.is_empty() {
            continue;
        }

        let matched = elements
            .iter()
            .filter(|e| !claimed.contains(&e.id))
            .find(|e| e.id.as_str().eq_ignore_ascii_case(&wanted))
            .or_else(|| {
                elements
                    .iter()
                    .filter(|e| !claimed.contains(&e.id))
                    .find(|e| e.label.to_lowercase() == wanted)
            })
            .or_else(|| {
                elements
                    .iter()
                    .filter(|e| !claimed.contains(&e.id))
                    .find(|e| wanted.len() >= 3 && e.label.to_lowercase().contains(&wanted))
            });

        if let Some(element) = matched {
            claimed.insert(&element.id);
            scores.push((element.id.clone(), priority));
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Fingerprint;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn tender_snapshot() -> PageSnapshot {
        let elements = vec![
            InteractiveElement::new("e0", "Suchen", ElementKind::Button, "#s"),
            InteractiveElement::new("e1", "Neubau Grundschule Nord", ElementKind::Row, "#r1"),
            InteractiveElement::new("e2", "Details", ElementKind::Detail, "#d"),
        ];
        PageSnapshot::new(
            Fingerprint::new("root"),
            0,
            "https://vergabe.example.com/",
            elements,
            Vec::new(),
        )
    }

    fn model_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": DEFAULT_MODEL,
            "response": text,
            "done": true
        }))
    }

    #[tokio::test]
    async fn test_rank_maps_identifiers_to_elements() {
        let mock_server = MockServer::start().await;

        let reply = r#"Sure! Here is my plan:
        {"actions": [
            {"element_type": "button", "identifier": "e2", "reason": "detail view", "priority": 5},
            {"element_type": "row", "identifier": "Neubau Grundschule", "reason": "tender", "priority": "3"},
            {"element_type": "button", "identifier": "Nonexistent", "priority": 4}
        ], "analysis": "rows open tenders"}
        Good luck."#;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"model": "llama3", "stream": false})))
            .respond_with(model_reply(reply))
            .mount(&mock_server)
            .await;

        let ranker = OllamaRanker::with_url(mock_server.uri()).with_model("llama3");
        let scores = ranker.rank(&tender_snapshot()).await.unwrap();

        assert_eq!(
            scores,
            vec![(ElementId::from("e2"), 5.0), (ElementId::from("e1"), 3.0)]
        );
    }

    #[tokio::test]
    async fn test_rank_without_json_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(model_reply("I cannot help with that."))
            .mount(&mock_server)
            .await;

        let ranker = OllamaRanker::with_url(mock_server.uri());
        let err = ranker.rank(&tender_snapshot()).await.unwrap_err();
        assert!(matches!(err, ScanError::RankerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rank_server_error_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&mock_server)
            .await;

        let ranker = OllamaRanker::with_url(mock_server.uri());
        let err = ranker.rank(&tender_snapshot()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "0.5.1"})))
            .mount(&mock_server)
            .await;

        let ranker = OllamaRanker::with_url(format!("{}/", mock_server.uri()));
        assert!(ranker.check_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let ranker = OllamaRanker::with_url("http://127.0.0.1:9");
        let err = ranker.rank(&tender_snapshot()).await.unwrap_err();
        assert!(matches!(err, ScanError::RankerUnavailable(_)));
    }

    #[test]
    fn test_prompt_lists_elements_with_ids() {
        let prompt = OllamaRanker::new().build_prompt(&tender_snapshot());

        assert!(prompt.contains("- [e1] row: Neubau Grundschule Nord"));
        assert!(prompt.contains("Vergabeunterlagen"));
        assert!(prompt.contains("Clickable Table Rows: 1"));
        assert!(prompt.contains("none yet"));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\": {}} y"), Some("{\"a\": {}}"));
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("} {"), None);
    }
}
