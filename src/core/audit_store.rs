//! Durable SQLite mirror for the audit trail.
//!
//! Writes are serialized through a mutex and each operation opens a fresh
//! connection; reads run without the mutex and rely on WAL for concurrency.

use crate::core::audit::{AuditEventType, AuditRecord, AuditStatistics, AuditStorage};
use crate::core::db;
use crate::core::error::GovernanceError;
use crate::core::time::{parse_timestamp, to_storage_ts};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ToSql, params};
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SELECT_COLUMNS: &str = "id, ts, event_type, request_id, agent_id, target_id, target_type, \
     result_json, decision, metadata_json";

pub struct SqliteAuditStore {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

struct RawAuditRow {
    id: String,
    ts: String,
    event_type: String,
    request_id: Option<String>,
    agent_id: Option<String>,
    target_id: Option<String>,
    target_type: Option<String>,
    result_json: Option<String>,
    decision: Option<String>,
    metadata_json: String,
}

impl RawAuditRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ts: row.get(1)?,
            event_type: row.get(2)?,
            request_id: row.get(3)?,
            agent_id: row.get(4)?,
            target_id: row.get(5)?,
            target_type: row.get(6)?,
            result_json: row.get(7)?,
            decision: row.get(8)?,
            metadata_json: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<AuditRecord, GovernanceError> {
        let timestamp = parse_timestamp(&JsonValue::String(self.ts.clone())).ok_or_else(|| {
            GovernanceError::EngineError(format!("bad audit timestamp '{}'", self.ts))
        })?;
        let event_type = AuditEventType::parse(&self.event_type).ok_or_else(|| {
            GovernanceError::EngineError(format!("unknown audit event type '{}'", self.event_type))
        })?;
        let result = self
            .result_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let metadata: Map<String, JsonValue> = serde_json::from_str(&self.metadata_json)?;
        Ok(AuditRecord {
            id: self.id,
            timestamp,
            event_type,
            request_id: self.request_id,
            agent_id: self.agent_id,
            target_id: self.target_id,
            target_type: self.target_type,
            result,
            decision: self.decision,
            metadata,
        })
    }
}

impl SqliteAuditStore {
    /// Opens (creating if needed) the mirror database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, GovernanceError> {
        db::initialize_audit_db(db_path)?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn read_conn(&self) -> Result<Connection, GovernanceError> {
        db::db_connect(&self.db_path)
    }

    fn query_records(
        &self,
        where_clause: &str,
        params: &[&dyn ToSql],
        limit: usize,
    ) -> Result<Vec<AuditRecord>, GovernanceError> {
        let conn = self.read_conn()?;
        // SQLite reads LIMIT as a signed 64-bit integer.
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY ts DESC, seq DESC LIMIT {}",
            SELECT_COLUMNS, where_clause, limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params, RawAuditRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawAuditRow::into_record).collect()
    }

    /// Newest-first history of records about one target.
    pub fn audit_trail_for_target(
        &self,
        target_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, GovernanceError> {
        self.query_records("WHERE target_id = ?1", &[&target_id], limit)
    }

    pub fn validation_history(
        &self,
        agent_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, GovernanceError> {
        let since = since.map(|ts| to_storage_ts(&ts));
        let mut clauses = vec!["event_type = 'validation'".to_string()];
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(agent) = &agent_id {
            params.push(agent);
            clauses.push(format!("agent_id = ?{}", params.len()));
        }
        if let Some(since) = &since {
            params.push(since);
            clauses.push(format!("ts >= ?{}", params.len()));
        }
        let where_clause = format!("WHERE {}", clauses.join(" AND "));
        self.query_records(&where_clause, &params, limit)
    }

    pub fn events_by_type(
        &self,
        event_type: AuditEventType,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, GovernanceError> {
        let kind = event_type.as_str();
        match since.map(|ts| to_storage_ts(&ts)) {
            Some(since) => {
                self.query_records("WHERE event_type = ?1 AND ts >= ?2", &[&kind, &since], limit)
            }
            None => self.query_records("WHERE event_type = ?1", &[&kind], limit),
        }
    }

    /// Totals by event type, decision and agent, optionally since a point in
    /// time.
    pub fn statistics(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<AuditStatistics, GovernanceError> {
        let conn = self.read_conn()?;
        let since = since.map(|ts| to_storage_ts(&ts)).unwrap_or_default();
        let mut stats = AuditStatistics::default();

        let (total, earliest, latest): (i64, Option<String>, Option<String>) = conn.query_row(
            "SELECT count(*), min(ts), max(ts) FROM audit_events WHERE ts >= ?1",
            params![since],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        stats.total_records = total as usize;
        stats.earliest_record = earliest.and_then(|ts| parse_timestamp(&JsonValue::String(ts)));
        stats.latest_record = latest.and_then(|ts| parse_timestamp(&JsonValue::String(ts)));

        for (column, bucket) in [
            ("event_type", &mut stats.by_event_type),
            ("decision", &mut stats.by_decision),
            ("agent_id", &mut stats.by_agent),
        ] {
            let sql = format!(
                "SELECT {col}, count(*) FROM audit_events \
                 WHERE ts >= ?1 AND {col} IS NOT NULL GROUP BY {col}",
                col = column
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (key, count) = row?;
                bucket.insert(key, count as usize);
            }
        }
        Ok(stats)
    }
}

impl AuditStorage for SqliteAuditStore {
    fn store_audit_record(&self, record: &AuditRecord) -> Result<(), GovernanceError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| GovernanceError::EngineError("audit write lock poisoned".to_string()))?;
        let conn = db::db_connect(&self.db_path)?;
        let result_json = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metadata_json = serde_json::to_string(&record.metadata)?;
        conn.execute(
            "INSERT INTO audit_events(id, ts, event_type, request_id, agent_id, target_id, \
             target_type, result_json, decision, metadata_json) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                to_storage_ts(&record.timestamp),
                record.event_type.as_str(),
                record.request_id,
                record.agent_id,
                record.target_id,
                record.target_type,
                result_json,
                record.decision,
                metadata_json,
            ],
        )?;
        Ok(())
    }
}
