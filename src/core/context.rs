//! Read-only inputs shared by every rule in one validation call.

use crate::core::graph::GraphQuery;
use crate::core::request::scalar_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A known specification as the caller last saw it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecRecord(pub Map<String, JsonValue>);

impl SpecRecord {
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(scalar_text)
    }

    pub fn status(&self) -> Option<String> {
        self.text("status")
    }

    pub fn version(&self) -> Option<String> {
        self.text("version")
    }

    pub fn doc_type(&self) -> Option<String> {
        self.text("doc_type")
    }

    pub fn implements(&self) -> Option<String> {
        self.text("implements")
    }
}

impl From<JsonValue> for SpecRecord {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => SpecRecord(map),
            _ => SpecRecord::default(),
        }
    }
}

/// Specification id to record.
pub type SpecSnapshot = HashMap<String, SpecRecord>;

/// Cooperative cancellation flag shared between a caller and rule workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of known specs plus an optional graph handle. Cloning is cheap;
/// nothing here can be mutated by a rule.
#[derive(Clone, Default)]
pub struct ValidationContext {
    current_specs: Arc<SpecSnapshot>,
    graph: Option<Arc<dyn GraphQuery>>,
}

impl ValidationContext {
    pub fn new(current_specs: SpecSnapshot) -> Self {
        Self {
            current_specs: Arc::new(current_specs),
            graph: None,
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphQuery>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn current_specs(&self) -> &SpecSnapshot {
        &self.current_specs
    }

    pub fn spec(&self, id: &str) -> Option<&SpecRecord> {
        self.current_specs.get(id)
    }

    pub fn graph(&self) -> Option<&dyn GraphQuery> {
        self.graph.as_deref()
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("current_specs", &self.current_specs.len())
            .field("graph", &self.graph.is_some())
            .finish()
    }
}
