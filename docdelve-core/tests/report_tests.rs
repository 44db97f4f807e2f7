// Tests for report generation functionality

use docdelve_core::data::{Database, RunRecord, RunStatus};
use docdelve_core::report::{
    ReportData, ReportFormat, gather_report_data, generate_document_list, generate_json_report,
    generate_markdown_report, generate_report, generate_text_report, report_data_from_result,
    save_report,
};
use docdelve_scanner::{DiscoveredDocument, FailureKind, FailureRecord, RunResult, Termination};
use tempfile::TempDir;

fn sample_data() -> ReportData {
    ReportData {
        run: RunRecord {
            id: "run-1".to_string(),
            start_url: "https://tenders.test/".to_string(),
            start_time: 1_700_000_000,
            end_time: Some(1_700_000_042),
            status: RunStatus::Completed,
            states_visited: 5,
            steps: 9,
            navigation_failures: 1,
            restore_failures: 0,
            ranker_failures: 2,
            termination: Some("step_budget".to_string()),
            error: None,
            configuration: None,
        },
        documents: vec![
            DiscoveredDocument {
                url: "https://tenders.test/files/lv.pdf".to_string(),
                depth: 2,
            },
            DiscoveredDocument {
                url: "https://tenders.test/files/plan.pdf".to_string(),
                depth: 3,
            },
        ],
        failures: vec![FailureRecord {
            kind: FailureKind::Navigation,
            depth: 1,
            element: Some("Details | mehr".to_string()),
            reason: "click rejected".to_string(),
        }],
    }
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("txt"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("json"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("markdown"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("md"), Some(ReportFormat::Markdown));
    assert_eq!(ReportFormat::from_str("list"), Some(ReportFormat::List));
}

#[test]
fn test_report_format_from_str_case_insensitive() {
    assert_eq!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("Md"), Some(ReportFormat::Markdown));
}

#[test]
fn test_report_format_from_str_invalid() {
    assert_eq!(ReportFormat::from_str("html"), None);
    assert_eq!(ReportFormat::from_str(""), None);
}

// ============================================================================
// Text Report Tests
// ============================================================================

#[test]
fn test_text_report_contents() {
    let report = generate_text_report(&sample_data());

    assert!(report.contains("DOCDELVE EXPLORATION REPORT"));
    assert!(report.contains("Run ID:       run-1"));
    assert!(report.contains("Status:       Completed"));
    assert!(report.contains("Duration:     42 seconds"));
    assert!(report.contains("Stopped by:   step budget"));
    assert!(report.contains("Documents found:      2"));
    assert!(report.contains("[1] https://tenders.test/files/lv.pdf  (depth 2)"));
    assert!(report.contains("[NAVIGATION] depth 1 'Details | mehr': click rejected"));
    assert!(report.contains("End of Report"));
}

#[test]
fn test_text_report_without_documents_or_failures() {
    let mut data = sample_data();
    data.documents.clear();
    data.failures.clear();

    let report = generate_text_report(&data);
    assert!(report.contains("Documents found:      0"));
    assert!(!report.contains("DOCUMENTS\n"));
    assert!(!report.contains("FAILURES\n"));
}

#[test]
fn test_text_report_shows_error() {
    let mut data = sample_data();
    data.run.status = RunStatus::Failed;
    data.run.error = Some("could not capture the start page".to_string());

    let report = generate_text_report(&data);
    assert!(report.contains("Status:       Failed"));
    assert!(report.contains("Error:        could not capture the start page"));
}

// ============================================================================
// JSON Report Tests
// ============================================================================

#[test]
fn test_json_report_structure() {
    let json = generate_json_report(&sample_data()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let report = &value["report"];

    assert_eq!(report["metadata"]["generator"], "docdelve");
    assert_eq!(report["run"]["id"], "run-1");
    assert_eq!(report["run"]["status"], "completed");
    assert_eq!(report["run"]["termination"], "step_budget");
    assert_eq!(report["run"]["duration_seconds"], 42);
    assert_eq!(report["summary"]["documents"], 2);
    assert_eq!(report["summary"]["failures"]["total"], 3);
    assert_eq!(report["summary"]["failures"]["ranker"], 2);
    assert_eq!(report["documents"][1]["url"], "https://tenders.test/files/plan.pdf");
    assert_eq!(report["failures"][0]["kind"], "navigation");
}

// ============================================================================
// Markdown and List Tests
// ============================================================================

#[test]
fn test_markdown_report_contents() {
    let report = generate_markdown_report(&sample_data());

    assert!(report.starts_with("# docdelve exploration report"));
    assert!(report.contains("## Documents (2)"));
    assert!(report.contains("- <https://tenders.test/files/lv.pdf> (depth 2)"));
    // Pipes inside cells are escaped
    assert!(report.contains("| navigation | 1 | Details \\| mehr | click rejected |"));
}

#[test]
fn test_markdown_report_no_documents() {
    let mut data = sample_data();
    data.documents.clear();

    let report = generate_markdown_report(&data);
    assert!(report.contains("_No documents found._"));
}

#[test]
fn test_document_list() {
    let data = sample_data();
    assert_eq!(
        generate_document_list(&data.documents),
        "https://tenders.test/files/lv.pdf\nhttps://tenders.test/files/plan.pdf\n"
    );
    assert_eq!(generate_document_list(&[]), "");
}

#[test]
fn test_generate_report_dispatch() {
    let data = sample_data();
    let list = generate_report(&data, ReportFormat::List).unwrap();
    assert_eq!(list.lines().count(), 2);

    let text = generate_report(&data, ReportFormat::Text).unwrap();
    assert_eq!(text, generate_text_report(&data));
}

// ============================================================================
// Database Round Trip Tests
// ============================================================================

#[test]
fn test_gather_report_data() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
    let run_id = db.create_run("https://tenders.test/", None).unwrap();

    let mut result = RunResult::new("https://tenders.test/");
    result.documents = sample_data().documents;
    result.states_visited = 3;
    result.termination = Termination::Cancelled;
    db.complete_run(&run_id, &result).unwrap();

    let data = gather_report_data(&db, &run_id).unwrap().unwrap();
    assert_eq!(data.run.status, RunStatus::Cancelled);
    assert_eq!(data.documents.len(), 2);
    assert!(data.failures.is_empty());

    assert!(gather_report_data(&db, "unknown").unwrap().is_none());
}

#[test]
fn test_report_data_from_result() {
    let mut result = RunResult::new("https://tenders.test/");
    result.documents = sample_data().documents;
    result.steps = 7;
    result.elapsed = std::time::Duration::from_secs(30);
    result.termination = Termination::Aborted {
        reason: "start page unreadable".to_string(),
    };

    let data = report_data_from_result("unsaved", &result);
    assert_eq!(data.run.id, "unsaved");
    assert_eq!(data.run.status, RunStatus::Failed);
    assert_eq!(data.run.steps, 7);
    assert_eq!(data.run.end_time.map(|end| end - data.run.start_time), Some(30));
    assert_eq!(data.run.error.as_deref(), Some("start page unreadable"));
    assert_eq!(data.documents.len(), 2);
}

#[test]
fn test_save_report() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("report.txt");

    save_report("hello\n", &path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
}
