//! Read-only query seam into the specification graph.
//!
//! The graph store is an external collaborator. This core only names the
//! questions it asks ([`QueryKind`]) and ships the Cypher text a property-graph
//! backend can run for each; backends that are not Cypher-speaking can match on
//! the kind instead.

use serde_json::{Map, Value as JsonValue};
use std::fmt;
use tracing::warn;

/// One result row, column name to value.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    DesignDrift,
    UndocumentedCode,
    UncoveredRequirements,
    VersionMismatches,
    SubsystemArchitectureCount,
    SubsystemImplementedCount,
    SubsystemDesignDrift,
    SubsystemUncoveredRequirements,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::DesignDrift => "design_drift",
            QueryKind::UndocumentedCode => "undocumented_code",
            QueryKind::UncoveredRequirements => "uncovered_requirements",
            QueryKind::VersionMismatches => "version_mismatches",
            QueryKind::SubsystemArchitectureCount => "subsystem_architecture_count",
            QueryKind::SubsystemImplementedCount => "subsystem_implemented_count",
            QueryKind::SubsystemDesignDrift => "subsystem_design_drift",
            QueryKind::SubsystemUncoveredRequirements => "subsystem_uncovered_requirements",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DESIGN_DRIFT_CYPHER: &str = "
MATCH (d:Design)-[:IMPLEMENTS]->(a:Architecture)
WHERE d.modified_at > a.modified_at
  AND NOT exists((:Decision)-[:APPROVES]->(:AgentRequest)-[:TARGETS]->(d))
RETURN d.id AS design_id,
       a.id AS arch_id,
       d.modified_at AS design_modified,
       a.modified_at AS arch_modified
";

const UNDOCUMENTED_CODE_CYPHER: &str = "
MATCH (c:Code)
WHERE NOT exists((c)-[:IMPLEMENTS]->(:Design))
  AND c.status = 'active'
RETURN c.id AS code_id,
       c.path AS code_path,
       c.created_at AS created_at
";

const UNCOVERED_REQUIREMENTS_CYPHER: &str = "
MATCH (r:Requirement {status: 'active'})
WHERE NOT exists((r)<-[:SATISFIES]-())
RETURN r.id AS req_id,
       r.priority AS priority,
       r.text AS text,
       r.created_at AS created_at
";

const VERSION_MISMATCHES_CYPHER: &str = "
MATCH (child)-[:IMPLEMENTS]->(parent)
WHERE child.version IS NOT NULL
  AND parent.version IS NOT NULL
  AND split(child.version, '.')[0] <> split(parent.version, '.')[0]
RETURN child.id AS child_id,
       parent.id AS parent_id,
       child.version AS child_version,
       parent.version AS parent_version
";

const SUBSYSTEM_ARCHITECTURE_COUNT_CYPHER: &str = "
MATCH (a:Architecture {subsystem: $subsystem})
RETURN count(a) AS total
";

const SUBSYSTEM_IMPLEMENTED_COUNT_CYPHER: &str = "
MATCH (a:Architecture {subsystem: $subsystem})
WHERE exists((a)<-[:IMPLEMENTS]-(:Design))
RETURN count(a) AS implemented
";

const SUBSYSTEM_DESIGN_DRIFT_CYPHER: &str = "
MATCH (d:Design)-[:IMPLEMENTS]->(a:Architecture {subsystem: $subsystem})
WHERE d.modified_at > a.modified_at
  AND NOT exists((:Decision)-[:APPROVES]->(:AgentRequest)-[:TARGETS]->(d))
RETURN d.id AS design_id, d.modified_at AS modified, a.id AS arch_id
LIMIT 50
";

const SUBSYSTEM_UNCOVERED_REQUIREMENTS_CYPHER: &str = "
MATCH (r:Requirement {subsystem: $subsystem, status: 'active'})
WHERE NOT exists((r)<-[:SATISFIES]-())
RETURN r.id AS req_id, r.text AS text, r.priority AS priority
LIMIT 50
";

/// A named graph question plus the text a Cypher backend would execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub kind: QueryKind,
}

impl QueryDescriptor {
    pub const fn new(kind: QueryKind) -> Self {
        Self { kind }
    }

    pub fn cypher(&self) -> &'static str {
        match self.kind {
            QueryKind::DesignDrift => DESIGN_DRIFT_CYPHER,
            QueryKind::UndocumentedCode => UNDOCUMENTED_CODE_CYPHER,
            QueryKind::UncoveredRequirements => UNCOVERED_REQUIREMENTS_CYPHER,
            QueryKind::VersionMismatches => VERSION_MISMATCHES_CYPHER,
            QueryKind::SubsystemArchitectureCount => SUBSYSTEM_ARCHITECTURE_COUNT_CYPHER,
            QueryKind::SubsystemImplementedCount => SUBSYSTEM_IMPLEMENTED_COUNT_CYPHER,
            QueryKind::SubsystemDesignDrift => SUBSYSTEM_DESIGN_DRIFT_CYPHER,
            QueryKind::SubsystemUncoveredRequirements => SUBSYSTEM_UNCOVERED_REQUIREMENTS_CYPHER,
        }
    }
}

/// Blocking, stateless query capability.
///
/// Implementations are called concurrently from rule workers and detectors,
/// so they must not hold a shared cursor.
pub trait GraphQuery: Send + Sync {
    fn query(&self, descriptor: &QueryDescriptor, params: &Row) -> anyhow::Result<Vec<Row>>;
}

impl<F> GraphQuery for F
where
    F: Fn(&QueryDescriptor, &Row) -> anyhow::Result<Vec<Row>> + Send + Sync,
{
    fn query(&self, descriptor: &QueryDescriptor, params: &Row) -> anyhow::Result<Vec<Row>> {
        self(descriptor, params)
    }
}

/// Runs `kind` and treats a backend failure as "no data".
pub(crate) fn query_or_empty(graph: &dyn GraphQuery, kind: QueryKind, params: &Row) -> Vec<Row> {
    let descriptor = QueryDescriptor::new(kind);
    match graph.query(&descriptor, params) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(query = %kind, error = %e, "graph query failed, treating as no data");
            Vec::new()
        }
    }
}

pub(crate) fn row_str(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(crate::core::request::scalar_text)
}
