// Report generation from the run ledger

use crate::data::{Database, RunRecord, RunStatus};
use docdelve_scanner::{DiscoveredDocument, FailureRecord, RunResult, Termination};
use rusqlite::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
    /// One document URL per line, nothing else.
    List,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "list" => Some(ReportFormat::List),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub run: RunRecord,
    pub documents: Vec<DiscoveredDocument>,
    pub failures: Vec<FailureRecord>,
}

impl ReportData {
    fn total_failures(&self) -> i64 {
        self.run.navigation_failures + self.run.restore_failures + self.run.ranker_failures
    }

    fn duration_seconds(&self) -> Option<i64> {
        self.run.end_time.map(|end| end - self.run.start_time)
    }

    fn status_label(&self) -> &'static str {
        match self.run.status.as_str() {
            "completed" => "Completed",
            "failed" => "Failed",
            "running" => "Running",
            "cancelled" => "Cancelled",
            _ => "Unknown",
        }
    }
}

/// Load everything a report needs for one run. `Ok(None)` if the run id is unknown.
pub fn gather_report_data(db: &Database, run_id: &str) -> Result<Option<ReportData>> {
    let Some(run) = db.get_run(run_id)? else {
        return Ok(None);
    };

    Ok(Some(ReportData {
        documents: db.get_documents(run_id)?,
        failures: db.get_failures(run_id)?,
        run,
    }))
}

/// Report data for a run that was never stored.
pub fn report_data_from_result(run_id: &str, result: &RunResult) -> ReportData {
    let end_time = chrono::Utc::now().timestamp();
    let error = match &result.termination {
        Termination::Aborted { reason } => Some(reason.clone()),
        _ => None,
    };

    ReportData {
        run: RunRecord {
            id: run_id.to_string(),
            start_url: result.start_url.clone(),
            start_time: end_time - result.elapsed.as_secs() as i64,
            end_time: Some(end_time),
            status: RunStatus::from_termination(&result.termination),
            states_visited: result.states_visited as i64,
            steps: result.steps as i64,
            navigation_failures: result.navigation_failures as i64,
            restore_failures: result.restore_failures as i64,
            ranker_failures: result.ranker_failures as i64,
            termination: Some(result.termination.as_str().to_string()),
            error,
            configuration: None,
        },
        documents: result.documents.clone(),
        failures: result.failures.clone(),
    }
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
        ReportFormat::List => Ok(generate_document_list(&data.documents)),
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                        DOCDELVE EXPLORATION REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Run ID:       {}\n", data.run.id));
    report.push_str(&format!("Start URL:    {}\n", data.run.start_url));
    report.push_str(&format!("Status:       {}\n", data.status_label()));
    report.push_str(&format!("Started:      {}\n", format_timestamp(data.run.start_time)));
    if let Some(duration) = data.duration_seconds() {
        report.push_str(&format!("Duration:     {} seconds\n", duration));
    }
    if let Some(ref termination) = data.run.termination {
        report.push_str(&format!("Stopped by:   {}\n", termination.replace('_', " ")));
    }
    if let Some(ref error) = data.run.error {
        report.push_str(&format!("Error:        {}\n", error));
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("SUMMARY\n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!("  Documents found:      {}\n", data.documents.len()));
    report.push_str(&format!("  States explored:      {}\n", data.run.states_visited));
    report.push_str(&format!("  Interactions:         {}\n", data.run.steps));
    report.push_str(&format!("  Navigation failures:  {}\n", data.run.navigation_failures));
    report.push_str(&format!("  Restore failures:     {}\n", data.run.restore_failures));
    report.push_str(&format!("  Ranker fallbacks:     {}\n", data.run.ranker_failures));
    report.push('\n');

    if !data.documents.is_empty() {
        report.push_str(RULE);
        report.push_str("DOCUMENTS\n");
        report.push_str(RULE);
        report.push('\n');
        for (idx, document) in data.documents.iter().enumerate() {
            report.push_str(&format!(
                "  [{}] {}  (depth {})\n",
                idx + 1,
                document.url,
                document.depth
            ));
        }
        report.push('\n');
    }

    if !data.failures.is_empty() {
        report.push_str(RULE);
        report.push_str("FAILURES\n");
        report.push_str(RULE);
        report.push('\n');
        for failure in &data.failures {
            let element = failure
                .element
                .as_deref()
                .map(|label| format!(" '{}'", label))
                .unwrap_or_default();
            report.push_str(&format!(
                "  [{}] depth {}{}: {}\n",
                failure.kind.as_str().to_uppercase(),
                failure.depth,
                element,
                failure.reason
            ));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("                          End of Report\n");
    report.push_str(RULE);

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "docdelve",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": data.run.id,
                "start_url": data.run.start_url,
                "status": data.run.status.as_str(),
                "termination": data.run.termination,
                "error": data.run.error,
                "start_time": format_iso8601_timestamp(data.run.start_time),
                "end_time": data.run.end_time.map(format_iso8601_timestamp),
                "duration_seconds": data.duration_seconds(),
            },
            "summary": {
                "documents": data.documents.len(),
                "states_visited": data.run.states_visited,
                "steps": data.run.steps,
                "failures": {
                    "total": data.total_failures(),
                    "navigation": data.run.navigation_failures,
                    "restore": data.run.restore_failures,
                    "ranker": data.run.ranker_failures
                }
            },
            "documents": data.documents,
            "failures": data.failures
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str("# docdelve exploration report\n\n");
    report.push_str("| | |\n|---|---|\n");
    report.push_str(&format!("| Run | `{}` |\n", data.run.id));
    report.push_str(&format!("| Start URL | {} |\n", data.run.start_url));
    report.push_str(&format!("| Status | {} |\n", data.status_label()));
    report.push_str(&format!("| Started | {} |\n", format_timestamp(data.run.start_time)));
    if let Some(ref termination) = data.run.termination {
        report.push_str(&format!("| Stopped by | {} |\n", termination.replace('_', " ")));
    }
    report.push_str(&format!("| States explored | {} |\n", data.run.states_visited));
    report.push_str(&format!("| Interactions | {} |\n", data.run.steps));
    report.push_str(&format!("| Failures | {} |\n", data.total_failures()));
    if let Some(ref error) = data.run.error {
        report.push_str(&format!("| Error | {} |\n", escape_markdown_cell(error)));
    }

    report.push_str(&format!("\n## Documents ({})\n\n", data.documents.len()));
    if data.documents.is_empty() {
        report.push_str("_No documents found._\n");
    } else {
        for document in &data.documents {
            report.push_str(&format!(
                "- <{}> (depth {})\n",
                document.url, document.depth
            ));
        }
    }

    if !data.failures.is_empty() {
        report.push_str("\n## Failures\n\n");
        report.push_str("| Kind | Depth | Element | Reason |\n|---|---|---|---|\n");
        for failure in &data.failures {
            report.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                failure.kind.as_str(),
                failure.depth,
                failure
                    .element
                    .as_deref()
                    .map(escape_markdown_cell)
                    .unwrap_or_default(),
                escape_markdown_cell(&failure.reason)
            ));
        }
    }

    report
}

/// Plain newline-separated URL list, suitable for `wget -i` or `xargs curl -O`.
pub fn generate_document_list(documents: &[DiscoveredDocument]) -> String {
    documents
        .iter()
        .map(|document| format!("{}\n", document.url))
        .collect()
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn escape_markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_iso8601_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.to_rfc3339()
}
