use docdelve_scanner::{DiscoveredDocument, FailureKind, FailureRecord, RunResult, Termination};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Budget stops are normal completions; only aborts count as failures.
    pub fn from_termination(termination: &Termination) -> Self {
        match termination {
            Termination::Cancelled => RunStatus::Cancelled,
            Termination::Aborted { .. } => RunStatus::Failed,
            Termination::Exhausted | Termination::StepBudget | Termination::TimeBudget => {
                RunStatus::Completed
            }
        }
    }
}

/// A row of the `runs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub start_url: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: RunStatus,
    pub states_visited: i64,
    pub steps: i64,
    pub navigation_failures: i64,
    pub restore_failures: i64,
    pub ranker_failures: i64,
    pub termination: Option<String>,
    pub error: Option<String>,
    pub configuration: Option<String>,
}

impl RunRecord {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        let status: String = row.get(4)?;
        Ok(RunRecord {
            id: row.get(0)?,
            start_url: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            states_visited: row.get(5)?,
            steps: row.get(6)?,
            navigation_failures: row.get(7)?,
            restore_failures: row.get(8)?,
            ranker_failures: row.get(9)?,
            termination: row.get(10)?,
            error: row.get(11)?,
            configuration: row.get(12)?,
        })
    }
}

const RUN_COLUMNS: &str = "id, start_url, start_time, end_time, status, states_visited, steps,
    navigation_failures, restore_failures, ranker_failures, termination, error, configuration";

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn drop(path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    start_url TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed', 'cancelled')),
    states_visited INTEGER NOT NULL DEFAULT 0,
    steps INTEGER NOT NULL DEFAULT 0,
    navigation_failures INTEGER NOT NULL DEFAULT 0,
    restore_failures INTEGER NOT NULL DEFAULT 0,
    ranker_failures INTEGER NOT NULL DEFAULT 0,
    termination TEXT,         -- exhausted, step_budget, time_budget, cancelled, aborted
    error TEXT,               -- abort reason
    configuration TEXT        -- JSON options used
);

-- Documents found by a run, in discovery order
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    discovered_at INTEGER NOT NULL,
    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, url)
);

CREATE INDEX IF NOT EXISTS idx_documents_run ON documents(run_id);
CREATE INDEX IF NOT EXISTS idx_documents_url ON documents(url);

-- Recoverable failures recorded during a run
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('navigation', 'restore', 'ranker')),
    depth INTEGER NOT NULL,
    element TEXT,
    reason TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_failures_run ON failures(run_id);
            ",
        )?;
        Ok(())
    }

    // Run management
    pub fn create_run(&self, start_url: &str, configuration: Option<&str>) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO runs (id, start_url, start_time, status, configuration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&run_id, start_url, current_timestamp(), RunStatus::Running.as_str(), configuration],
        )?;

        Ok(run_id)
    }

    /// Store the outcome of a run together with its documents and failures.
    pub fn complete_run(&self, run_id: &str, result: &RunResult) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let error = match &result.termination {
            Termination::Aborted { reason } => Some(reason.as_str()),
            _ => None,
        };

        tx.execute(
            "UPDATE runs SET status = ?1, end_time = ?2, states_visited = ?3, steps = ?4,
                navigation_failures = ?5, restore_failures = ?6, ranker_failures = ?7,
                termination = ?8, error = ?9
             WHERE id = ?10",
            params![
                RunStatus::from_termination(&result.termination).as_str(),
                current_timestamp(),
                result.states_visited as i64,
                result.steps as i64,
                result.navigation_failures as i64,
                result.restore_failures as i64,
                result.ranker_failures as i64,
                result.termination.as_str(),
                error,
                run_id,
            ],
        )?;

        for document in &result.documents {
            insert_document(&tx, run_id, document)?;
        }
        for failure in &result.failures {
            insert_failure(&tx, run_id, failure)?;
        }

        tx.commit()
    }

    /// Mark a run failed before exploration produced any result.
    pub fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1, end_time = ?2, termination = ?3, error = ?4 WHERE id = ?5",
            params![
                RunStatus::Failed.as_str(),
                current_timestamp(),
                "aborted",
                error,
                run_id
            ],
        )?;
        Ok(())
    }

    /// Returns `false` when the run already had this URL.
    pub fn insert_document(&self, run_id: &str, document: &DiscoveredDocument) -> Result<bool> {
        insert_document(&self.conn, run_id, document)
    }

    pub fn insert_failure(&self, run_id: &str, failure: &FailureRecord) -> Result<i64> {
        insert_failure(&self.conn, run_id, failure)
    }

    // Query methods
    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;

        stmt.query_row(params![run_id], RunRecord::from_row).optional()
    }

    /// Newest first.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY start_time DESC, rowid DESC",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map([], RunRecord::from_row)?
            .collect::<Result<Vec<_>>>()?;

        Ok(runs)
    }

    pub fn latest_run_id(&self) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT id FROM runs ORDER BY start_time DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn get_documents(&self, run_id: &str) -> Result<Vec<DiscoveredDocument>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, depth FROM documents WHERE run_id = ?1 ORDER BY id")?;

        let documents = stmt
            .query_map(params![run_id], |row| {
                Ok(DiscoveredDocument {
                    url: row.get(0)?,
                    depth: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(documents)
    }

    pub fn get_failures(&self, run_id: &str) -> Result<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, depth, element, reason FROM failures WHERE run_id = ?1 ORDER BY id",
        )?;

        let failures = stmt
            .query_map(params![run_id], |row| {
                let kind: String = row.get(0)?;
                Ok(FailureRecord {
                    // The CHECK constraint keeps unknown kinds out.
                    kind: FailureKind::parse(&kind).unwrap_or(FailureKind::Navigation),
                    depth: row.get::<_, i64>(1)? as usize,
                    element: row.get(2)?,
                    reason: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(failures)
    }

    /// Every document URL ever found, across all runs, first discovery first.
    pub fn all_document_urls(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM documents GROUP BY url ORDER BY MIN(id)")?;

        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;

        Ok(urls)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn insert_document(conn: &Connection, run_id: &str, document: &DiscoveredDocument) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO documents (run_id, url, depth, discovered_at) VALUES (?1, ?2, ?3, ?4)",
        params![run_id, &document.url, document.depth as i64, current_timestamp()],
    )?;
    Ok(inserted > 0)
}

fn insert_failure(conn: &Connection, run_id: &str, failure: &FailureRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO failures (run_id, kind, depth, element, reason, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run_id,
            failure.kind.as_str(),
            failure.depth as i64,
            &failure.element,
            &failure.reason,
            current_timestamp()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
