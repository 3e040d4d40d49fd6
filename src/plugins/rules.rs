//! Governance rules evaluated against a single change proposal.
//!
//! A rule is a pure function of `(request, context)`. It must not read
//! another rule's output and must not mutate the context; the engine runs
//! every enabled rule concurrently against the same inputs.

use crate::core::context::ValidationContext;
use crate::core::error::GovernanceError;
use crate::core::models::{Severity, Violation};
use crate::core::request::{Action, AgentRequest, TargetType};
use regex::Regex;
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, LazyLock};

pub trait Rule: Send + Sync {
    /// Stable identifier, e.g. `DOC-001`.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Returns the findings in a deterministic order. `Err` means the rule
    /// itself could not run, not that the request is bad.
    fn evaluate(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError>;
}

/// The five rules enabled on a fresh engine.
pub fn default_rules() -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(DocumentStandardsRule),
        Arc::new(VersionCompatibilityRule),
        Arc::new(ArchitectureAlignmentRule),
        Arc::new(RequirementCoverageRule),
        Arc::new(ConstitutionComplianceRule),
    ]
}

static LOOSE_SEMVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+(-[\w.]+)?(\+[\w.]+)?$").unwrap());

static STRICT_SEMVER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

// Prefix match: anything under the directory ending in `.md`.
static EXPECTED_PATHS: LazyLock<Vec<(TargetType, &'static str, Regex)>> = LazyLock::new(|| {
    [
        (TargetType::Architecture, r"docs/architecture/.*\.md"),
        (TargetType::Design, r"docs/design/.*\.md"),
        (TargetType::Tasks, r"docs/tasks/.*\.md"),
        (TargetType::Requirement, r"docs/requirements/.*\.md"),
    ]
    .into_iter()
    .map(|(t, p)| (t, p, Regex::new(&format!("^{}", p)).unwrap()))
    .collect()
});

fn required_frontmatter(target_type: TargetType) -> &'static [&'static str] {
    match target_type {
        TargetType::Architecture => &["doc", "subsystem", "id", "version", "status", "owners"],
        TargetType::Design => &["doc", "component", "id", "version", "status", "owners"],
        TargetType::Tasks => &["doc", "sprint", "status", "assignee"],
        TargetType::Requirement => &["doc", "id", "version", "status"],
        _ => &[],
    }
}

/// DOC-001: frontmatter keys, version shape and file location.
pub struct DocumentStandardsRule;

impl Rule for DocumentStandardsRule {
    fn id(&self) -> &str {
        "DOC-001"
    }

    fn name(&self) -> &str {
        "Document Standards"
    }

    fn evaluate(
        &self,
        request: &AgentRequest,
        _context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError> {
        let mut violations = Vec::new();
        let doc_type = request.target_type;
        let content = &request.content;

        let missing: Vec<&str> = required_frontmatter(doc_type)
            .iter()
            .copied()
            .filter(|key| !content.frontmatter.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            violations.push(
                Violation::new(
                    self.id(),
                    Severity::High,
                    format!("Missing required frontmatter fields for {}", doc_type),
                )
                .with_detail("missing_fields", json!(missing))
                .with_suggestion(format!(
                    "Add the following fields to frontmatter: {}",
                    missing.join(", ")
                )),
            );
        }

        if let Some(version) = content.version()
            && !LOOSE_SEMVER.is_match(&version)
        {
            violations.push(
                Violation::new(
                    self.id(),
                    Severity::Medium,
                    "Version must use semantic versioning (x.y.z)",
                )
                .with_detail("version", version)
                .with_suggestion("Use semantic versioning format like 1.0.0"),
            );
        }

        if !content.path.is_empty()
            && let Some((_, pattern, re)) = EXPECTED_PATHS.iter().find(|(t, _, _)| *t == doc_type)
        {
            let normalized = content.path.replace('\\', "/");
            if !re.is_match(&normalized) {
                violations.push(
                    Violation::new(
                        self.id(),
                        Severity::Medium,
                        format!("Document type '{}' should be in correct location", doc_type),
                    )
                    .with_detail("path", content.path.clone())
                    .with_detail("expected_pattern", *pattern)
                    .with_suggestion(format!("Move document to match pattern: {}", pattern)),
                );
            }
        }

        Ok(violations)
    }
}

/// VER-001: version presence, strict format and compatibility with the parent.
pub struct VersionCompatibilityRule;

impl VersionCompatibilityRule {
    /// Same major, child minor not behind the parent's.
    pub fn versions_compatible(child: &str, parent: &str) -> bool {
        let parse = |v: &str| -> Option<(u64, u64)> {
            let mut parts = v.split('.');
            let major = parts.next()?.parse().ok()?;
            let minor = parts.next()?.parse().ok()?;
            Some((major, minor))
        };
        match (parse(child), parse(parent)) {
            (Some((c_major, c_minor)), Some((p_major, p_minor))) => {
                c_major == p_major && c_minor >= p_minor
            }
            _ => false,
        }
    }
}

impl Rule for VersionCompatibilityRule {
    fn id(&self) -> &str {
        "VER-001"
    }

    fn name(&self) -> &str {
        "Version Compatibility"
    }

    fn evaluate(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError> {
        let mut violations = Vec::new();
        let content = &request.content;

        let Some(version) = content.version() else {
            violations.push(
                Violation::new(
                    self.id(),
                    Severity::High,
                    "Version is required for all specifications",
                )
                .with_suggestion("Add a 'version' field to frontmatter"),
            );
            return Ok(violations);
        };

        if !STRICT_SEMVER.is_match(&version) {
            violations.push(
                Violation::new(self.id(), Severity::Critical, "Invalid semantic version format")
                    .with_detail("version", version.clone())
                    .with_suggestion("Use semantic versioning format: major.minor.patch"),
            );
        }

        if let Some(implements) = content.implements()
            && let Some(parent_version) = context.spec(&implements).and_then(|s| s.version())
            && !Self::versions_compatible(&version, &parent_version)
        {
            violations.push(
                Violation::new(
                    self.id(),
                    Severity::High,
                    "Version incompatible with parent specification",
                )
                .with_detail("version", version)
                .with_detail("parent_version", parent_version)
                .with_detail("implements", implements)
                .with_suggestion("Ensure version is compatible with parent specification"),
            );
        }

        Ok(violations)
    }
}

/// ARCH-001: designs implement approved architectures, code implements a
/// design, and a parent must not implement its own child.
pub struct ArchitectureAlignmentRule;

impl Rule for ArchitectureAlignmentRule {
    fn id(&self) -> &str {
        "ARCH-001"
    }

    fn name(&self) -> &str {
        "Architecture Alignment"
    }

    fn evaluate(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError> {
        let mut violations = Vec::new();
        let implements = request.content.implements();

        match (request.target_type, implements.as_deref()) {
            (TargetType::Design, None) => violations.push(
                Violation::new(
                    self.id(),
                    Severity::Critical,
                    "Design must reference an approved architecture",
                )
                .with_suggestion(
                    "Add 'implements' field to frontmatter referencing architecture ID",
                ),
            ),
            (TargetType::Design, Some(arch_id)) => match context.spec(arch_id) {
                None => violations.push(
                    Violation::new(
                        self.id(),
                        Severity::Critical,
                        format!("Referenced architecture '{}' not found", arch_id),
                    )
                    .with_detail("implements", arch_id)
                    .with_suggestion("Ensure the architecture ID is correct and exists"),
                ),
                Some(arch) if arch.status().as_deref() != Some("approved") => violations.push(
                    Violation::new(
                        self.id(),
                        Severity::Critical,
                        format!("Referenced architecture '{}' is not approved", arch_id),
                    )
                    .with_detail("implements", arch_id)
                    .with_detail(
                        "status",
                        arch.status().map(JsonValue::from).unwrap_or(JsonValue::Null),
                    )
                    .with_suggestion(
                        "Reference an approved architecture or get current architecture approved",
                    ),
                ),
                Some(_) => {}
            },
            (TargetType::Code, None) => violations.push(
                Violation::new(
                    self.id(),
                    Severity::High,
                    "Code must reference an approved design",
                )
                .with_suggestion("Add 'implements' field referencing design ID"),
            ),
            _ => {}
        }

        if let Some(parent_id) = implements.as_deref()
            && context
                .spec(parent_id)
                .and_then(|parent| parent.implements())
                .is_some_and(|grandparent| grandparent == request.id)
        {
            violations.push(
                Violation::new(self.id(), Severity::Critical, "Circular dependency detected")
                    .with_detail("id", request.id.clone())
                    .with_detail("implements", parent_id)
                    .with_suggestion("Remove circular dependency in specification hierarchy"),
            );
        }

        Ok(violations)
    }
}

/// REQ-001: designs and code name the active requirements they satisfy.
pub struct RequirementCoverageRule;

impl Rule for RequirementCoverageRule {
    fn id(&self) -> &str {
        "REQ-001"
    }

    fn name(&self) -> &str {
        "Requirement Coverage"
    }

    fn evaluate(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError> {
        let label = match request.target_type {
            TargetType::Design => "Design",
            TargetType::Code => "Code",
            _ => return Ok(Vec::new()),
        };

        let satisfies = request.content.satisfies();
        if satisfies.is_empty() {
            return Ok(vec![
                Violation::new(
                    self.id(),
                    Severity::Medium,
                    format!("{} should reference requirements it satisfies", label),
                )
                .with_suggestion("Add 'satisfies' field to frontmatter with requirement IDs"),
            ]);
        }

        let mut violations = Vec::new();
        for req_id in satisfies {
            match context.spec(&req_id) {
                None => violations.push(
                    Violation::new(
                        self.id(),
                        Severity::High,
                        format!("Referenced requirement '{}' not found", req_id),
                    )
                    .with_detail("requirement_id", req_id)
                    .with_suggestion("Ensure requirement ID is correct"),
                ),
                Some(req) if req.status().as_deref() != Some("active") => violations.push(
                    Violation::new(
                        self.id(),
                        Severity::Medium,
                        format!("Referenced requirement '{}' is not active", req_id),
                    )
                    .with_detail("requirement_id", req_id)
                    .with_detail(
                        "status",
                        req.status().map(JsonValue::from).unwrap_or(JsonValue::Null),
                    )
                    .with_suggestion("Reference only active requirements"),
                ),
                Some(_) => {}
            }
        }
        Ok(violations)
    }
}

const IMMUTABLE_PROPERTIES: [&str; 3] = ["id", "created_at", "creator"];
const PROTECTED_STATUSES: [&str; 2] = ["approved", "published"];

/// CONST-001: audit immutability, in-place edits of protected specs and the
/// direction of the architecture/design/code hierarchy.
pub struct ConstitutionComplianceRule;

impl Rule for ConstitutionComplianceRule {
    fn id(&self) -> &str {
        "CONST-001"
    }

    fn name(&self) -> &str {
        "Constitution Compliance"
    }

    fn evaluate(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError> {
        let mut violations = Vec::new();
        let frontmatter = &request.content.frontmatter;

        if request.action == Action::Delete && request.target_type.is_audit_class() {
            violations.push(
                Violation::new(
                    self.id(),
                    Severity::Critical,
                    format!(
                        "Cannot delete {} - audit trail is immutable",
                        request.target_type
                    ),
                )
                .with_suggestion("Audit records cannot be deleted, only marked as superseded"),
            );
        }

        if request.action == Action::Update
            && let Some(existing) = request.target_id.as_deref().and_then(|id| context.spec(id))
        {
            for prop in IMMUTABLE_PROPERTIES {
                if let (Some(proposed), Some(current)) = (frontmatter.get(prop), existing.get(prop))
                    && proposed != current
                {
                    violations.push(
                        Violation::new(
                            self.id(),
                            Severity::Critical,
                            format!("Cannot modify immutable property '{}'", prop),
                        )
                        .with_detail("property", prop)
                        .with_suggestion("Immutable properties cannot be changed after creation"),
                    );
                }
            }

            if let Some(status) = existing.status()
                && PROTECTED_STATUSES.contains(&status.as_str())
            {
                violations.push(
                    Violation::new(
                        self.id(),
                        Severity::Critical,
                        format!("Cannot modify {} specification", status),
                    )
                    .with_detail("status", status)
                    .with_suggestion("Create a new version with SUPERSEDES relationship instead"),
                );
            }
        }

        if matches!(request.action, Action::Create | Action::Update)
            && let Some(parent_id) = request.content.implements()
            && let Some(parent_type) = context.spec(&parent_id).and_then(|p| p.doc_type())
        {
            match (request.target_type, parent_type.as_str()) {
                (TargetType::Architecture, "design" | "code") => violations.push(
                    Violation::new(
                        self.id(),
                        Severity::Critical,
                        "Architecture cannot implement lower-level specifications",
                    )
                    .with_detail("implements", parent_id.clone())
                    .with_detail("parent_type", parent_type.clone())
                    .with_suggestion(
                        "Architecture is top-level and should not implement other specs",
                    ),
                ),
                (TargetType::Design, "code") => violations.push(
                    Violation::new(self.id(), Severity::Critical, "Design cannot implement code")
                        .with_detail("implements", parent_id.clone())
                        .with_suggestion("Design should implement architecture, not code"),
                ),
                _ => {}
            }
        }

        Ok(violations)
    }
}
