//! Converts parsed documents into change proposals.
//!
//! This is the one boundary where construction-time checks are fatal: a
//! document without an `id` cannot be correlated with anything in the audit
//! trail, so it never becomes a request.

use crate::core::error::GovernanceError;
use crate::core::request::{
    Action, AgentRequest, RequestContent, TargetType, dedup_preserving_order, scalar_text,
};
use crate::core::time::{now_utc, to_storage_ts};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use tracing::debug;

static REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // [[ARCH-001]]
        Regex::new(r"\[\[([A-Z]+-[0-9]+)\]\]").unwrap(),
        // [ARCH-001]
        Regex::new(r"\[([A-Z]+-[0-9]+)\]").unwrap(),
        // spec:ARCH-001
        Regex::new(r"spec:([A-Z]+-[0-9]+)").unwrap(),
    ]
});

/// Output of the external document parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub path: String,
    pub doc_type: String,
    #[serde(default)]
    pub frontmatter: Map<String, JsonValue>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub sections: Vec<JsonValue>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ParsedDocument {
    fn fm_text(&self, key: &str) -> Option<String> {
        self.frontmatter.get(key).and_then(scalar_text)
    }
}

pub struct RequestAdapter;

impl RequestAdapter {
    pub fn document_to_request(
        doc: &ParsedDocument,
        agent_id: &str,
        action: Action,
        session_id: Option<&str>,
        target_id: Option<&str>,
    ) -> Result<AgentRequest, GovernanceError> {
        let doc_id = doc
            .fm_text("id")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                GovernanceError::MalformedRequest(format!(
                    "document {} missing required 'id' in frontmatter",
                    doc.path
                ))
            })?;
        let target_type = TargetType::parse(&doc.doc_type).ok_or_else(|| {
            GovernanceError::MalformedRequest(format!(
                "document {} has unknown doc_type '{}'",
                doc.path, doc.doc_type
            ))
        })?;

        let request_id = Self::request_id(doc, &doc_id, action);
        let references = Self::extract_references(doc);
        debug!(
            request_id = %request_id,
            references = references.len(),
            "built request from document"
        );

        let mut request = AgentRequest::new(
            request_id,
            agent_id,
            action,
            target_type,
            Self::build_content(doc, &doc_id),
        )
        .with_rationale(Self::rationale(doc, &doc_id, target_type, action))
        .with_references(references)
        .with_target_id(target_id.map(str::to_string).unwrap_or(doc_id))
        .with_metadata("source_path", doc.path.as_str())
        .with_metadata("content_hash", doc.hash.as_str())
        .with_metadata("doc_type", doc.doc_type.as_str())
        .with_metadata("size_bytes", doc.size_bytes)
        .with_metadata("section_count", doc.sections.len());
        if let Some(session) = session_id {
            request = request.with_session(session);
        }
        Ok(request)
    }

    /// 16 hex chars of SHA-256 over action, document id, time and content hash.
    fn request_id(doc: &ParsedDocument, doc_id: &str, action: Action) -> String {
        let hash_prefix: String = doc.hash.chars().take(8).collect();
        let id_string = format!(
            "{}:{}:{}:{}",
            action,
            doc_id,
            to_storage_ts(&now_utc()),
            hash_prefix
        );
        let mut hasher = Sha256::new();
        hasher.update(id_string.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }

    /// Frontmatter `references`, then `architecture_ref`, then id mentions in
    /// the body; first occurrence wins.
    pub fn extract_references(doc: &ParsedDocument) -> Vec<String> {
        let mut refs = Vec::new();
        match doc.frontmatter.get("references") {
            Some(JsonValue::Array(items)) => refs.extend(items.iter().filter_map(scalar_text)),
            Some(JsonValue::Null) | None => {}
            Some(other) => refs.extend(scalar_text(other)),
        }
        if let Some(arch_ref) = doc.fm_text("architecture_ref").filter(|r| !r.is_empty()) {
            refs.push(arch_ref);
        }
        for pattern in REFERENCE_PATTERNS.iter() {
            for caps in pattern.captures_iter(&doc.content) {
                refs.push(caps[1].to_string());
            }
        }
        dedup_preserving_order(refs)
    }

    fn build_content(doc: &ParsedDocument, doc_id: &str) -> RequestContent {
        let fm = |key: &str, default: JsonValue| {
            doc.frontmatter.get(key).cloned().unwrap_or(default)
        };
        let mut content = RequestContent::new(doc.frontmatter.clone(), doc.path.clone())
            .with_body(doc.content.clone());
        let extra = &mut content.extra;
        extra.insert("id".into(), JsonValue::from(doc_id));
        extra.insert("title".into(), fm("title", json!("")));
        extra.insert("doc_type".into(), JsonValue::from(doc.doc_type.as_str()));
        extra.insert("subsystem".into(), fm("subsystem", json!("")));
        extra.insert("version".into(), fm("version", json!("1.0.0")));
        extra.insert("status".into(), fm("status", json!("draft")));
        extra.insert("owners".into(), fm("owners", json!([])));
        extra.insert("content_hash".into(), JsonValue::from(doc.hash.as_str()));
        extra.insert("size_bytes".into(), json!(doc.size_bytes));
        extra.insert(
            "modified_at".into(),
            doc.modified_at
                .map(|ts| JsonValue::from(to_storage_ts(&ts)))
                .unwrap_or(JsonValue::Null),
        );
        extra.insert("sections".into(), JsonValue::Array(doc.sections.clone()));
        extra.insert("section_count".into(), json!(doc.sections.len()));

        match doc.doc_type.to_ascii_lowercase().as_str() {
            "architecture" => {
                extra.insert(
                    "compliance_level".into(),
                    fm("compliance_level", json!("strict")),
                );
                extra.insert(
                    "drift_tolerance".into(),
                    fm("drift_tolerance", json!("none")),
                );
            }
            "design" => {
                extra.insert("component".into(), fm("component", json!("")));
                extra.insert(
                    "architecture_ref".into(),
                    fm("architecture_ref", json!("")),
                );
            }
            _ => {}
        }
        content
    }

    fn rationale(
        doc: &ParsedDocument,
        doc_id: &str,
        target_type: TargetType,
        action: Action,
    ) -> String {
        let status = doc.fm_text("status").unwrap_or_else(|| "draft".to_string());
        match action {
            Action::Create => format!(
                "Creating new {} document '{}' with status '{}'. Validating compliance with \
                 documentation standards, architecture alignment, and required field presence.",
                target_type, doc_id, status
            ),
            Action::Update => format!(
                "Updating {} document '{}' to status '{}'. Validating changes for \
                 compatibility, drift detection, and continued compliance with established \
                 standards.",
                target_type, doc_id, status
            ),
            Action::Delete => format!(
                "Requesting deletion of {} document '{}'. Validating that removal will not \
                 break dependencies or violate architectural constraints.",
                target_type, doc_id
            ),
        }
    }

    /// Facts about a document that help a reviewer judge a verdict.
    pub fn validation_metadata(doc: &ParsedDocument) -> Map<String, JsonValue> {
        let owners = doc
            .frontmatter
            .get("owners")
            .and_then(JsonValue::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        let reference_count = Self::extract_references(doc).len();
        let mut meta = Map::new();
        meta.insert("has_title".into(), json!(doc.frontmatter.contains_key("title")));
        meta.insert("has_owners".into(), json!(owners > 0));
        meta.insert("owner_count".into(), json!(owners));
        meta.insert("has_version".into(), json!(doc.frontmatter.contains_key("version")));
        meta.insert("section_count".into(), json!(doc.sections.len()));
        meta.insert("content_length".into(), json!(doc.content.chars().count()));
        meta.insert("has_references".into(), json!(reference_count > 0));
        meta.insert("reference_count".into(), json!(reference_count));
        meta
    }
}
