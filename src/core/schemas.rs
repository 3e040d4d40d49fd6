//! SQLite schema for the durable audit mirror.
//!
//! The mirror is append-only at the storage layer as well: triggers abort any
//! UPDATE or DELETE against `audit_events`.

pub const AUDIT_DB_SCHEMA_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS audit_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        ts TEXT NOT NULL,
        event_type TEXT NOT NULL,
        request_id TEXT,
        agent_id TEXT,
        target_id TEXT,
        target_type TEXT,
        result_json TEXT,
        decision TEXT,
        metadata_json TEXT NOT NULL
    )
";
pub const AUDIT_DB_SCHEMA_INDEX_TS: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_events_ts ON audit_events(ts)";
pub const AUDIT_DB_SCHEMA_INDEX_TARGET: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_events_target ON audit_events(target_id, ts)";
pub const AUDIT_DB_SCHEMA_INDEX_AGENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_events_agent ON audit_events(agent_id, ts)";
pub const AUDIT_DB_SCHEMA_INDEX_TYPE: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_events_type ON audit_events(event_type, ts)";

pub const AUDIT_DB_TRIGGER_NO_UPDATE: &str = "
    CREATE TRIGGER IF NOT EXISTS audit_events_no_update
    BEFORE UPDATE ON audit_events
    BEGIN
        SELECT RAISE(ABORT, 'audit_events is append-only');
    END
";
pub const AUDIT_DB_TRIGGER_NO_DELETE: &str = "
    CREATE TRIGGER IF NOT EXISTS audit_events_no_delete
    BEFORE DELETE ON audit_events
    BEGIN
        SELECT RAISE(ABORT, 'audit_events is append-only');
    END
";

/// Statements applied, in order, when the mirror is opened.
pub const AUDIT_DB_SCHEMA: [&str; 7] = [
    AUDIT_DB_SCHEMA_EVENTS,
    AUDIT_DB_SCHEMA_INDEX_TS,
    AUDIT_DB_SCHEMA_INDEX_TARGET,
    AUDIT_DB_SCHEMA_INDEX_AGENT,
    AUDIT_DB_SCHEMA_INDEX_TYPE,
    AUDIT_DB_TRIGGER_NO_UPDATE,
    AUDIT_DB_TRIGGER_NO_DELETE,
];
