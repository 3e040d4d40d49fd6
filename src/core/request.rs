//! Change proposals and governance decisions.

use crate::core::time::{new_prefixed_id, now_utc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of node a request targets.
///
/// The last three are audit-class entities: they can be referenced by a
/// request but never deleted through one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Architecture,
    Design,
    Code,
    Requirement,
    Tasks,
    Research,
    Decision,
    AuditEvent,
    AgentRequest,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Architecture => "architecture",
            TargetType::Design => "design",
            TargetType::Code => "code",
            TargetType::Requirement => "requirement",
            TargetType::Tasks => "tasks",
            TargetType::Research => "research",
            TargetType::Decision => "decision",
            TargetType::AuditEvent => "audit_event",
            TargetType::AgentRequest => "agent_request",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let t = match raw.trim().to_ascii_lowercase().as_str() {
            "architecture" => TargetType::Architecture,
            "design" => TargetType::Design,
            "code" => TargetType::Code,
            "requirement" | "requirements" => TargetType::Requirement,
            "tasks" | "task" => TargetType::Tasks,
            "research" => TargetType::Research,
            "decision" => TargetType::Decision,
            "audit_event" => TargetType::AuditEvent,
            "agent_request" => TargetType::AgentRequest,
            _ => return None,
        };
        Some(t)
    }

    pub fn is_audit_class(&self) -> bool {
        matches!(
            self,
            TargetType::Decision | TargetType::AuditEvent | TargetType::AgentRequest
        )
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload of a request. `frontmatter` and `path` are read by name
/// by the document rules; anything else a parser adds is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContent {
    #[serde(default)]
    pub frontmatter: Map<String, JsonValue>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub body: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl RequestContent {
    pub fn new(frontmatter: Map<String, JsonValue>, path: impl Into<String>) -> Self {
        Self {
            frontmatter,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Frontmatter scalar as text. Numbers and booleans are stringified so a
    /// YAML `version: 1.0` still reaches the version checks.
    pub fn fm_str(&self, key: &str) -> Option<String> {
        scalar_text(self.frontmatter.get(key)?)
    }

    pub fn version(&self) -> Option<String> {
        self.fm_str("version").filter(|v| !v.is_empty())
    }

    pub fn implements(&self) -> Option<String> {
        self.fm_str("implements").filter(|v| !v.is_empty())
    }

    /// Requirement ids from `satisfies`, given either as a list or a single id.
    pub fn satisfies(&self) -> Vec<String> {
        match self.frontmatter.get("satisfies") {
            Some(JsonValue::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            Some(other) => scalar_text(other)
                .filter(|s| !s.is_empty())
                .into_iter()
                .collect(),
            None => Vec::new(),
        }
    }
}

pub(crate) fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A proposed change to the specification corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub id: String,
    pub agent_id: String,
    pub action: Action,
    pub target_type: TargetType,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub content: RequestContent,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, deserialize_with = "deserialize_references")]
    pub references: Vec<String>,
    #[serde(default = "now_utc")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl AgentRequest {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        action: Action,
        target_type: TargetType,
        content: RequestContent,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            action,
            target_type,
            target_id: None,
            content,
            rationale: String::new(),
            references: Vec::new(),
            timestamp: now_utc(),
            session_id: None,
            metadata: Map::new(),
        }
    }

    pub fn with_target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets references, dropping repeats while keeping first-seen order.
    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = dedup_preserving_order(references.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub fn dedup_preserving_order<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn deserialize_references<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(dedup_preserving_order(raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorType {
    Agent,
    Human,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

pub const SUPERSEDE_DECISION_TYPE: &str = "supersede";

/// A governance decision, distinct from a validation verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub decision_type: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub author_type: AuthorType,
    pub rationale: String,
    pub confidence: f64,
    pub impact_level: ImpactLevel,
    pub reversible: bool,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub affected_nodes: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

impl Decision {
    pub fn new(
        decision_type: impl Into<String>,
        author: impl Into<String>,
        author_type: AuthorType,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: new_prefixed_id("DEC"),
            decision_type: decision_type.into(),
            timestamp: now_utc(),
            author: author.into(),
            author_type,
            rationale: rationale.into(),
            confidence: 1.0,
            impact_level: ImpactLevel::Medium,
            reversible: true,
            request_id: None,
            affected_nodes: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// A decision that neutralizes an earlier audit record without touching it.
    pub fn superseding(
        record_id: &str,
        author: impl Into<String>,
        author_type: AuthorType,
        rationale: impl Into<String>,
    ) -> Self {
        let mut decision = Self::new(SUPERSEDE_DECISION_TYPE, author, author_type, rationale);
        decision.reversible = false;
        decision
            .metadata
            .insert("supersedes".to_string(), JsonValue::from(record_id));
        decision
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_impact(mut self, impact_level: ImpactLevel) -> Self {
        self.impact_level = impact_level;
        self
    }

    pub fn with_affected_nodes(mut self, nodes: Vec<String>) -> Self {
        self.affected_nodes = nodes;
        self
    }

    pub fn supersedes(&self) -> Option<&str> {
        self.metadata.get("supersedes").and_then(JsonValue::as_str)
    }
}
