use crate::assembler::{IntegrationResult, View};
use crate::persistence::ResultSink;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// What happened when a run reached the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Stored,
    /// The run id was already present; nothing was written to `results`
    Duplicate,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Stored => "stored",
            AuditOutcome::Duplicate => "duplicate",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "stored" => Some(AuditOutcome::Stored),
            "duplicate" => Some(AuditOutcome::Duplicate),
            _ => None,
        }
    }
}

/// Audit trail entry: one per persist call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAudit {
    pub audit_id: String,
    pub recorded_at: DateTime<Utc>,
    pub run_id: String,
    pub mst: String,
    pub outcome: AuditOutcome,
    pub view: String,
    pub content_hash: String,
    pub live_sources: u8,
    pub risk_tier: String,
}

impl RunAudit {
    pub fn for_result(
        result: &IntegrationResult,
        view: View,
        content_hash: &str,
        outcome: AuditOutcome,
    ) -> Self {
        let live_sources = u8::from(result.enterprise.is_live()) + u8::from(result.insurance.is_live());
        RunAudit {
            audit_id: uuid::Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            run_id: result.run_id.clone(),
            mst: result.mst.to_string(),
            outcome,
            view: view.as_str().to_string(),
            content_hash: content_hash.to_string(),
            live_sources,
            risk_tier: result.risk.tier.as_str().to_string(),
        }
    }
}

/// One row of the results table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub run_id: String,
    pub mst: String,
    pub company_name: String,
    pub enterprise_provenance: String,
    pub insurance_provenance: String,
    pub integration_confidence: f64,
    pub compliance_score: f64,
    pub risk_score: f64,
    pub risk_tier: String,
    pub view: String,
    pub content_hash: String,
    pub payload: serde_json::Value,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Results Table (one row per integration run)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            mst TEXT NOT NULL,
            company_name TEXT NOT NULL,
            enterprise_provenance TEXT NOT NULL,
            insurance_provenance TEXT NOT NULL,
            integration_confidence REAL NOT NULL,
            compliance_score REAL NOT NULL,
            risk_score REAL NOT NULL,
            risk_tier TEXT NOT NULL,
            view TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            payload TEXT NOT NULL,
            generated_at TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Run Audit Table (one row per persist call, duplicates included)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS run_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            audit_id TEXT UNIQUE NOT NULL,
            recorded_at TEXT NOT NULL,
            run_id TEXT NOT NULL,
            mst TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('stored', 'duplicate')),
            view TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            live_sources INTEGER NOT NULL,
            risk_tier TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute("CREATE INDEX IF NOT EXISTS idx_results_mst ON results(mst)", [])?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_run_audit_mst ON run_audit(mst)",
        [],
    )?;

    Ok(())
}

/// SHA-256 of the stored payload
pub fn compute_content_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Store a result in the requested view. Returns false when the run was
/// already stored.
pub fn insert_result(conn: &Connection, result: &IntegrationResult, view: View) -> Result<bool> {
    let payload = serde_json::to_string(&result.view(view))?;
    let hash = compute_content_hash(&payload);

    let inserted = conn.execute(
        "INSERT INTO results (
            run_id, mst, company_name, enterprise_provenance, insurance_provenance,
            integration_confidence, compliance_score, risk_score, risk_tier,
            view, content_hash, payload, generated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            result.run_id,
            result.mst.as_str(),
            result.company_name(),
            result.enterprise.provenance().as_str(),
            result.insurance.provenance().as_str(),
            result.integration_confidence,
            result.compliance.score,
            result.risk.score,
            result.risk.tier.as_str(),
            view.as_str(),
            hash,
            payload,
            result.generated_at.to_rfc3339(),
        ],
    );

    let outcome = match inserted {
        Ok(_) => AuditOutcome::Stored,
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AuditOutcome::Duplicate
        }
        Err(e) => return Err(e.into()),
    };

    record_audit(conn, &RunAudit::for_result(result, view, &hash, outcome))?;
    Ok(outcome == AuditOutcome::Stored)
}

pub fn record_audit(conn: &Connection, audit: &RunAudit) -> Result<()> {
    conn.execute(
        "INSERT INTO run_audit (
            audit_id, recorded_at, run_id, mst, outcome, view, content_hash,
            live_sources, risk_tier
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            audit.audit_id,
            audit.recorded_at.to_rfc3339(),
            audit.run_id,
            audit.mst,
            audit.outcome.as_str(),
            audit.view,
            audit.content_hash,
            audit.live_sources,
            audit.risk_tier,
        ],
    )?;
    Ok(())
}

/// Audit trail for one MST, oldest first
pub fn audit_trail(conn: &Connection, mst: &str) -> Result<Vec<RunAudit>> {
    let mut stmt = conn.prepare(
        "SELECT audit_id, recorded_at, run_id, mst, outcome, view, content_hash,
                live_sources, risk_tier
         FROM run_audit
         WHERE mst = ?1
         ORDER BY id",
    )?;

    let trail = stmt
        .query_map(params![mst], |row| {
            let recorded_at: String = row.get(1)?;
            let outcome: String = row.get(4)?;
            Ok(RunAudit {
                audit_id: row.get(0)?,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                run_id: row.get(2)?,
                mst: row.get(3)?,
                outcome: AuditOutcome::parse(&outcome).ok_or(rusqlite::Error::InvalidQuery)?,
                view: row.get(5)?,
                content_hash: row.get(6)?,
                live_sources: row.get(7)?,
                risk_tier: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(trail)
}

/// Stored results for one MST, newest first
pub fn get_results_for_mst(conn: &Connection, mst: &str) -> Result<Vec<StoredResult>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, mst, company_name, enterprise_provenance, insurance_provenance,
                integration_confidence, compliance_score, risk_score, risk_tier,
                view, content_hash, payload
         FROM results
         WHERE mst = ?1
         ORDER BY id DESC",
    )?;

    let results = stmt
        .query_map(params![mst], |row| {
            let payload: String = row.get(11)?;
            Ok(StoredResult {
                run_id: row.get(0)?,
                mst: row.get(1)?,
                company_name: row.get(2)?,
                enterprise_provenance: row.get(3)?,
                insurance_provenance: row.get(4)?,
                integration_confidence: row.get(5)?,
                compliance_score: row.get(6)?,
                risk_score: row.get(7)?,
                risk_tier: row.get(8)?,
                view: row.get(9)?,
                content_hash: row.get(10)?,
                payload: serde_json::from_str(&payload)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(results)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// SQLITE SINK
// ============================================================================

/// Results table plus audit log behind one connection
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        setup_database(&conn).context("Failed to set up database")?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read against the underlying connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }
}

impl ResultSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn persist(&self, result: &IntegrationResult, view: View) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let stored = insert_result(&conn, result, view).context("Failed to store result")?;
        if !stored {
            tracing::debug!(mst = %result.mst, run_id = %result.run_id, "run already stored");
        }
        Ok(())
    }
}
