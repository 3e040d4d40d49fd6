//! Append-only audit trail.
//!
//! Every validation verdict, governance decision and drift scan becomes one
//! [`AuditRecord`]. Records are appended under a single mutex, optionally
//! mirrored to durable storage while the lock is held, and never mutated or
//! removed. A record's effect is neutralized only by a later record that
//! names it (see [`Decision::superseding`]).

use crate::core::audit_store::SqliteAuditStore;
use crate::core::config::AuditConfig;
use crate::core::error::GovernanceError;
use crate::core::models::{DriftViolation, ValidationResult};
use crate::core::request::{AgentRequest, Decision};
use crate::core::time::{new_prefixed_id, now_utc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Validation,
    Decision,
    DriftDetection,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Validation => "validation",
            AuditEventType::Decision => "decision",
            AuditEventType::DriftDetection => "drift_detection",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "validation" => Some(AuditEventType::Validation),
            "decision" => Some(AuditEventType::Decision),
            "drift_detection" => Some(AuditEventType::DriftDetection),
            _ => None,
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub request_id: Option<String>,
    pub agent_id: Option<String>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub result: Option<JsonValue>,
    pub decision: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl AuditRecord {
    fn new(event_type: AuditEventType) -> Self {
        Self {
            id: new_prefixed_id("AUD"),
            timestamp: now_utc(),
            event_type,
            request_id: None,
            agent_id: None,
            target_id: None,
            target_type: None,
            result: None,
            decision: None,
            metadata: Map::new(),
        }
    }
}

/// Durable destination for audit records.
pub trait AuditStorage: Send + Sync {
    fn store_audit_record(&self, record: &AuditRecord) -> Result<(), GovernanceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_records: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_decision: BTreeMap<String, usize>,
    pub by_agent: BTreeMap<String, usize>,
    pub earliest_record: Option<DateTime<Utc>>,
    pub latest_record: Option<DateTime<Utc>>,
}

impl AuditStatistics {
    pub(crate) fn count(&mut self, record: &AuditRecord) {
        self.total_records += 1;
        *self
            .by_event_type
            .entry(record.event_type.as_str().to_string())
            .or_default() += 1;
        if let Some(decision) = &record.decision {
            *self.by_decision.entry(decision.clone()).or_default() += 1;
        }
        if let Some(agent) = &record.agent_id {
            *self.by_agent.entry(agent.clone()).or_default() += 1;
        }
        self.earliest_record = Some(match self.earliest_record {
            Some(ts) => ts.min(record.timestamp),
            None => record.timestamp,
        });
        self.latest_record = Some(match self.latest_record {
            Some(ts) => ts.max(record.timestamp),
            None => record.timestamp,
        });
    }
}

#[derive(Default)]
pub struct AuditTrail {
    records: Mutex<Vec<AuditRecord>>,
    storage: Option<Arc<dyn AuditStorage>>,
}

impl AuditTrail {
    /// In-process trail with no durable mirror.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(storage: Arc<dyn AuditStorage>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            storage: Some(storage),
        }
    }

    /// Opens the SQLite mirror when `mirror_db` is set.
    pub fn from_config(config: &AuditConfig) -> Result<Self, GovernanceError> {
        match &config.mirror_db {
            Some(path) => {
                let store = SqliteAuditStore::open(path)?;
                Ok(Self::with_storage(Arc::new(store)))
            }
            None => Ok(Self::new()),
        }
    }

    pub fn log_validation(&self, request: &AgentRequest, result: &ValidationResult) -> String {
        let mut record = AuditRecord::new(AuditEventType::Validation);
        record.request_id = Some(request.id.clone());
        record.agent_id = Some(request.agent_id.clone());
        record.target_id = request.target_id.clone();
        record.target_type = Some(request.target_type.as_str().to_string());
        record.decision = Some(result.status.as_str().to_string());
        record.result = to_json(result);
        record.metadata.insert(
            "processing_time_ms".into(),
            json!(result.processing_time_ms),
        );
        record
            .metadata
            .insert("violations_count".into(), json!(result.violations.len()));
        record.metadata.insert(
            "rules_executed".into(),
            result
                .metadata
                .get("rules_executed")
                .cloned()
                .unwrap_or(json!(0)),
        );
        if let Some(session) = &request.session_id {
            record
                .metadata
                .insert("session_id".into(), JsonValue::from(session.as_str()));
        }
        self.append(record)
    }

    pub fn log_decision(&self, decision: &Decision) -> String {
        let mut record = AuditRecord::new(AuditEventType::Decision);
        record.request_id = decision.request_id.clone();
        record.decision = Some(decision.decision_type.clone());
        record.result = to_json(decision);
        let meta = &mut record.metadata;
        meta.insert("decision_id".into(), JsonValue::from(decision.id.as_str()));
        meta.insert("author".into(), JsonValue::from(decision.author.as_str()));
        meta.insert("author_type".into(), json!(decision.author_type));
        meta.insert("rationale".into(), JsonValue::from(decision.rationale.as_str()));
        meta.insert("confidence".into(), json!(decision.confidence));
        meta.insert("impact_level".into(), json!(decision.impact_level));
        if let Some(superseded) = decision.supersedes() {
            meta.insert("supersedes".into(), JsonValue::from(superseded));
        }
        self.append(record)
    }

    pub fn log_drift_detection(&self, violations: &[DriftViolation]) -> String {
        let mut record = AuditRecord::new(AuditEventType::DriftDetection);
        record
            .metadata
            .insert("violations_count".into(), json!(violations.len()));
        record.metadata.insert(
            "violations".into(),
            to_json(violations).unwrap_or(JsonValue::Array(Vec::new())),
        );
        self.append(record)
    }

    fn append(&self, mut record: AuditRecord) -> String {
        let mut records = self.lock();
        // Keep in-process order and timestamp order identical.
        if let Some(last) = records.last()
            && record.timestamp < last.timestamp
        {
            record.timestamp = last.timestamp;
        }
        if let Some(storage) = &self.storage
            && let Err(e) = storage.store_audit_record(&record)
        {
            warn!(record_id = %record.id, error = %e, "audit mirror write failed");
        }
        debug!(record_id = %record.id, event_type = %record.event_type, "audit record appended");
        let id = record.id.clone();
        records.push(record);
        id
    }

    pub fn get_record(&self, record_id: &str) -> Option<AuditRecord> {
        self.lock().iter().find(|r| r.id == record_id).cloned()
    }

    pub fn get_records_by_request(&self, request_id: &str) -> Vec<AuditRecord> {
        self.lock()
            .iter()
            .filter(|r| r.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect()
    }

    /// Records for `agent_id`, optionally bounded by inclusive timestamps.
    pub fn get_records_by_agent(
        &self,
        agent_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<AuditRecord> {
        self.lock()
            .iter()
            .filter(|r| r.agent_id.as_deref() == Some(agent_id))
            .filter(|r| start.is_none_or(|s| r.timestamp >= s))
            .filter(|r| end.is_none_or(|e| r.timestamp <= e))
            .cloned()
            .collect()
    }

    /// Newest first, at most `limit` records.
    pub fn get_recent_records(
        &self,
        limit: usize,
        event_type: Option<AuditEventType>,
    ) -> Vec<AuditRecord> {
        self.lock()
            .iter()
            .rev()
            .filter(|r| event_type.is_none_or(|t| r.event_type == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_statistics(&self) -> AuditStatistics {
        let mut stats = AuditStatistics::default();
        for record in self.lock().iter() {
            stats.count(record);
        }
        stats
    }

    /// Decision records that supersede `record_id`, oldest first.
    pub fn superseded_by(&self, record_id: &str) -> Vec<AuditRecord> {
        self.lock()
            .iter()
            .filter(|r| r.event_type == AuditEventType::Decision)
            .filter(|r| r.metadata.get("supersedes").and_then(JsonValue::as_str) == Some(record_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        // Appends are a single push, so a poisoned log is still consistent.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Option<JsonValue> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "failed to serialize audit payload");
            None
        }
    }
}
