use serde_json::{Map, Value, json};
use specgate::{
    Action, AgentRequest, ArchitectureAlignmentRule, ConstitutionComplianceRule,
    DocumentStandardsRule, RequestContent, RequirementCoverageRule, Rule, Severity, SpecRecord,
    SpecSnapshot, TargetType, ValidationContext, VersionCompatibilityRule, Violation,
};

fn frontmatter(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn request(action: Action, target_type: TargetType, fm: Value, path: &str) -> AgentRequest {
    AgentRequest::new(
        "REQ-100",
        "agent-7",
        action,
        target_type,
        RequestContent::new(frontmatter(fm), path),
    )
}

fn context(specs: &[(&str, Value)]) -> ValidationContext {
    let mut snapshot = SpecSnapshot::new();
    for (id, record) in specs {
        snapshot.insert(id.to_string(), SpecRecord::from(record.clone()));
    }
    ValidationContext::new(snapshot)
}

fn run(rule: &dyn Rule, req: &AgentRequest, ctx: &ValidationContext) -> Vec<Violation> {
    rule.evaluate(req, ctx).unwrap()
}

// --- DOC-001 ---

#[test]
fn test_doc_missing_frontmatter_fields() {
    let req = request(
        Action::Create,
        TargetType::Architecture,
        json!({"doc": "architecture", "id": "ARCH-1", "version": "1.0.0"}),
        "docs/architecture/core.md",
    );
    let violations = run(&DocumentStandardsRule, &req, &ValidationContext::default());
    assert_eq!(violations.len(), 1);
    let v = &violations[0];
    assert_eq!(v.rule, "DOC-001");
    assert_eq!(v.severity, Severity::High);
    assert_eq!(
        v.details["missing_fields"],
        json!(["subsystem", "status", "owners"])
    );
    assert!(v.suggestion.as_deref().unwrap().contains("subsystem, status, owners"));
}

#[test]
fn test_doc_complete_design_passes() {
    let req = request(
        Action::Create,
        TargetType::Design,
        json!({
            "doc": "design", "component": "ingest", "id": "DES-1",
            "version": "1.2.0-rc.1", "status": "draft", "owners": ["ana"]
        }),
        "docs\\design\\ingest.md",
    );
    assert!(run(&DocumentStandardsRule, &req, &ValidationContext::default()).is_empty());
}

#[test]
fn test_doc_bad_version_and_location() {
    let req = request(
        Action::Create,
        TargetType::Tasks,
        json!({"doc": "tasks", "sprint": 4, "status": "open", "assignee": "bo", "version": "v2"}),
        "notes/sprint4.md",
    );
    let violations = run(&DocumentStandardsRule, &req, &ValidationContext::default());
    assert_eq!(violations.len(), 2);
    assert!(violations.iter().all(|v| v.severity == Severity::Medium));
    assert_eq!(violations[0].details["version"], "v2");
    assert_eq!(violations[1].details["expected_pattern"], r"docs/tasks/.*\.md");
}

#[test]
fn test_doc_unlisted_type_has_no_requirements() {
    let req = request(Action::Create, TargetType::Research, json!({}), "anywhere.txt");
    assert!(run(&DocumentStandardsRule, &req, &ValidationContext::default()).is_empty());
}

// --- VER-001 ---

#[test]
fn test_version_regex_accepts_strict_semver() {
    for version in ["1.0.0", "2.1.3", "0.0.1"] {
        let req = request(
            Action::Create,
            TargetType::Research,
            json!({"version": version}),
            "",
        );
        assert!(
            run(&VersionCompatibilityRule, &req, &ValidationContext::default()).is_empty(),
            "{} should pass",
            version
        );
    }
}

#[test]
fn test_version_regex_rejects_malformed() {
    for version in ["1.0", "v1.0.0", "1.0.0.0", ""] {
        let req = request(
            Action::Create,
            TargetType::Research,
            json!({"version": version}),
            "",
        );
        let violations = run(&VersionCompatibilityRule, &req, &ValidationContext::default());
        assert!(
            violations.iter().any(|v| v.rule == "VER-001"),
            "{:?} should be rejected",
            version
        );
    }
}

#[test]
fn test_version_missing_is_high() {
    let req = request(Action::Create, TargetType::Research, json!({}), "");
    let violations = run(&VersionCompatibilityRule, &req, &ValidationContext::default());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
}

#[test]
fn test_version_malformed_is_critical() {
    let req = request(
        Action::Create,
        TargetType::Research,
        json!({"version": "1.0"}),
        "",
    );
    let violations = run(&VersionCompatibilityRule, &req, &ValidationContext::default());
    assert_eq!(violations[0].severity, Severity::Critical);
}

#[test]
fn test_version_parent_compatibility() {
    let ctx = context(&[("ARCH-1", json!({"version": "2.3.0", "status": "approved"}))]);

    let behind = request(
        Action::Create,
        TargetType::Design,
        json!({"version": "2.1.0", "implements": "ARCH-1"}),
        "",
    );
    let violations = run(&VersionCompatibilityRule, &behind, &ctx);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
    assert_eq!(violations[0].details["parent_version"], "2.3.0");

    let major = request(
        Action::Create,
        TargetType::Design,
        json!({"version": "3.4.0", "implements": "ARCH-1"}),
        "",
    );
    assert_eq!(run(&VersionCompatibilityRule, &major, &ctx).len(), 1);

    let ok = request(
        Action::Create,
        TargetType::Design,
        json!({"version": "2.3.1", "implements": "ARCH-1"}),
        "",
    );
    assert!(run(&VersionCompatibilityRule, &ok, &ctx).is_empty());

    let unknown_parent = request(
        Action::Create,
        TargetType::Design,
        json!({"version": "9.0.0", "implements": "ARCH-404"}),
        "",
    );
    assert!(run(&VersionCompatibilityRule, &unknown_parent, &ctx).is_empty());
}

// --- ARCH-001 ---

#[test]
fn test_arch_design_without_implements() {
    let req = request(Action::Create, TargetType::Design, json!({}), "");
    let violations = run(&ArchitectureAlignmentRule, &req, &ValidationContext::default());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Critical);
}

#[test]
fn test_arch_missing_and_unapproved_architecture() {
    let ctx = context(&[("ARCH-2", json!({"status": "draft", "doc_type": "architecture"}))]);

    let missing = request(
        Action::Create,
        TargetType::Design,
        json!({"implements": "ARCH-1"}),
        "",
    );
    let violations = run(&ArchitectureAlignmentRule, &missing, &ctx);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("not found"));

    let draft = request(
        Action::Create,
        TargetType::Design,
        json!({"implements": "ARCH-2"}),
        "",
    );
    let violations = run(&ArchitectureAlignmentRule, &draft, &ctx);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("not approved"));
    assert_eq!(violations[0].details["status"], "draft");
}

#[test]
fn test_arch_code_without_design_is_high() {
    let req = request(Action::Create, TargetType::Code, json!({}), "");
    let violations = run(&ArchitectureAlignmentRule, &req, &ValidationContext::default());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
}

#[test]
fn test_arch_one_hop_cycle() {
    let ctx = context(&[(
        "DES-9",
        json!({"status": "approved", "doc_type": "design", "implements": "REQ-100"}),
    )]);
    let req = request(
        Action::Create,
        TargetType::Code,
        json!({"implements": "DES-9"}),
        "",
    );
    let violations = run(&ArchitectureAlignmentRule, &req, &ctx);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].message, "Circular dependency detected");
    assert_eq!(violations[0].severity, Severity::Critical);
}

// --- REQ-001 ---

#[test]
fn test_req_missing_satisfies_is_advisory() {
    let req = request(Action::Create, TargetType::Code, json!({}), "");
    let violations = run(&RequirementCoverageRule, &req, &ValidationContext::default());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Medium);
    assert_eq!(
        violations[0].message,
        "Code should reference requirements it satisfies"
    );
}

#[test]
fn test_req_missing_and_inactive_requirements() {
    let ctx = context(&[
        ("RQ-1", json!({"status": "active"})),
        ("RQ-2", json!({"status": "retired"})),
    ]);
    let req = request(
        Action::Create,
        TargetType::Design,
        json!({"satisfies": ["RQ-1", "RQ-2", "RQ-3"]}),
        "",
    );
    let violations = run(&RequirementCoverageRule, &req, &ctx);
    assert_eq!(violations.len(), 2);
    assert_eq!(violations[0].severity, Severity::Medium);
    assert_eq!(violations[0].details["requirement_id"], "RQ-2");
    assert_eq!(violations[1].severity, Severity::High);
    assert_eq!(violations[1].details["requirement_id"], "RQ-3");
}

#[test]
fn test_req_ignores_other_types() {
    let req = request(Action::Create, TargetType::Architecture, json!({}), "");
    assert!(run(&RequirementCoverageRule, &req, &ValidationContext::default()).is_empty());
}

// --- CONST-001 ---

#[test]
fn test_const_audit_class_deletion() {
    for target in [
        TargetType::Decision,
        TargetType::AuditEvent,
        TargetType::AgentRequest,
    ] {
        let req = request(Action::Delete, target, json!({}), "").with_target_id("X-1");
        let violations = run(
            &ConstitutionComplianceRule,
            &req,
            &ValidationContext::default(),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Critical);
        assert!(violations[0].message.contains("audit trail is immutable"));
    }

    let design = request(Action::Delete, TargetType::Design, json!({}), "").with_target_id("D");
    assert!(run(&ConstitutionComplianceRule, &design, &ValidationContext::default()).is_empty());
}

#[test]
fn test_const_published_spec_cannot_be_updated() {
    let ctx = context(&[("DES-1", json!({"status": "published", "id": "DES-1"}))]);
    let req = request(
        Action::Update,
        TargetType::Design,
        json!({"id": "DES-1", "version": "1.1.0"}),
        "",
    )
    .with_target_id("DES-1");
    let violations = run(&ConstitutionComplianceRule, &req, &ctx);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Critical);
    assert_eq!(violations[0].message, "Cannot modify published specification");
}

#[test]
fn test_const_immutable_properties() {
    let ctx = context(&[(
        "DES-1",
        json!({"status": "draft", "id": "DES-1", "creator": "ana", "created_at": "2026-01-01"}),
    )]);
    let req = request(
        Action::Update,
        TargetType::Design,
        json!({"id": "DES-2", "creator": "bo", "created_at": "2026-01-01"}),
        "",
    )
    .with_target_id("DES-1");
    let violations = run(&ConstitutionComplianceRule, &req, &ctx);
    let props: Vec<&str> = violations
        .iter()
        .filter_map(|v| v.details["property"].as_str())
        .collect();
    assert_eq!(props, vec!["id", "creator"]);
}

#[test]
fn test_const_hierarchy_direction() {
    let ctx = context(&[
        ("DES-1", json!({"doc_type": "design"})),
        ("CODE-1", json!({"doc_type": "code"})),
    ]);
    let arch = request(
        Action::Create,
        TargetType::Architecture,
        json!({"implements": "DES-1"}),
        "",
    );
    let violations = run(&ConstitutionComplianceRule, &arch, &ctx);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].details["parent_type"], "design");

    let design = request(
        Action::Create,
        TargetType::Design,
        json!({"implements": "CODE-1"}),
        "",
    );
    let violations = run(&ConstitutionComplianceRule, &design, &ctx);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].message, "Design cannot implement code");
}
