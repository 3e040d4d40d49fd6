use serde_json::{Map, Value, json};
use specgate::{
    Action, AgentRequest, AuditEventType, AuditTrail, CancelToken, CompletionReport,
    ConstitutionComplianceRule, DriftDetector, EngineConfig, GovernanceError, ParsedDocument, RequestAdapter, RequestContent,
    RequestProtocol, RequestState, Rule, Severity, SpecRecord, SpecSnapshot, TargetType,
    ValidationContext, ValidationEngine, ValidationStatus, Violation,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn fm(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn corpus() -> ValidationContext {
    let mut specs = SpecSnapshot::new();
    for (id, record) in [
        (
            "ARCH-1",
            json!({"id": "ARCH-1", "doc_type": "architecture", "status": "approved", "version": "1.0.0"}),
        ),
        ("RQ-1", json!({"id": "RQ-1", "doc_type": "requirement", "status": "active"})),
        (
            "DES-7",
            json!({"id": "DES-7", "doc_type": "design", "status": "published", "version": "1.0.0"}),
        ),
    ] {
        specs.insert(id.to_string(), SpecRecord::from(record));
    }
    ValidationContext::new(specs)
}

fn design_request(id: &str, implements: &str) -> AgentRequest {
    AgentRequest::new(
        id,
        "designer",
        Action::Create,
        TargetType::Design,
        RequestContent::new(
            fm(json!({
                "doc": "design",
                "component": "ingest",
                "id": "DES-1",
                "version": "1.0.0",
                "status": "draft",
                "owners": ["ana"],
                "implements": implements,
                "satisfies": ["RQ-1"]
            })),
            "docs/design/ingest.md",
        ),
    )
}

fn default_engine() -> ValidationEngine {
    ValidationEngine::with_default_rules(&EngineConfig::default()).expect("engine should build")
}

struct Scripted {
    id: &'static str,
    behavior: Behavior,
}

enum Behavior {
    Report(Vec<Violation>),
    Fail,
    Panic,
    Sleep(Duration),
}

impl Rule for Scripted {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn evaluate(
        &self,
        _request: &AgentRequest,
        _context: &ValidationContext,
    ) -> Result<Vec<Violation>, GovernanceError> {
        match &self.behavior {
            Behavior::Report(violations) => Ok(violations.clone()),
            Behavior::Fail => Err(GovernanceError::rule(self.id, "backing store unavailable")),
            Behavior::Panic => panic!("rule exploded"),
            Behavior::Sleep(d) => {
                thread::sleep(*d);
                Ok(Vec::new())
            }
        }
    }
}

fn scripted(id: &'static str, behavior: Behavior) -> Arc<dyn Rule> {
    Arc::new(Scripted { id, behavior })
}

fn plain_request() -> AgentRequest {
    AgentRequest::new(
        "req-plain",
        "agent-1",
        Action::Create,
        TargetType::Research,
        RequestContent::default(),
    )
}

// --- engine ---

#[test]
fn test_complete_design_is_approved() {
    let result = default_engine().validate(&design_request("REQ-1", "ARCH-1"), &corpus());
    assert_eq!(result.status, ValidationStatus::Approved, "{:?}", result.violations);
    assert!(result.violations.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(result.confidence, 1.0);
    assert_eq!(result.metadata["rules_executed"], 5);
    assert_eq!(
        result.reasoning,
        "All validation rules passed. Request is approved for processing."
    );
}

#[test]
fn test_missing_architecture_escalates() {
    let result = default_engine().validate(&design_request("REQ-2", "ARCH-404"), &corpus());
    assert_eq!(result.status, ValidationStatus::Escalated);
    let critical = result.critical_violations();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].rule, "ARCH-001");
    assert!(result.reasoning.contains("ARCH-001"));
}

#[test]
fn test_published_update_escalates() {
    let request = AgentRequest::new(
        "REQ-3",
        "designer",
        Action::Update,
        TargetType::Design,
        RequestContent::new(fm(json!({"version": "1.1.0"})), "docs/design/x.md"),
    )
    .with_target_id("DES-7");
    let result = default_engine().validate(&request, &corpus());
    assert_eq!(result.status, ValidationStatus::Escalated);
    assert!(result.violations.iter().any(|v| v.rule == "CONST-001"
        && v.severity == Severity::Critical
        && v.message == "Cannot modify published specification"));
}

#[test]
fn test_escalated_reasoning_lists_sorted_rule_ids() {
    let engine = ValidationEngine::new(&EngineConfig::default()).unwrap();
    engine.add_rule(scripted(
        "ZZZ-9",
        Behavior::Report(vec![Violation::new("ZZZ-9", Severity::Critical, "z")]),
    ));
    engine.add_rule(scripted(
        "AAA-1",
        Behavior::Report(vec![Violation::new("AAA-1", Severity::Critical, "a")]),
    ));
    let result = engine.validate(&plain_request(), &ValidationContext::default());
    assert_eq!(
        result.reasoning,
        "Request requires human review due to 2 critical violation(s) in rules: AAA-1, ZZZ-9. \
         These violations cannot be auto-resolved."
    );
}

#[test]
fn test_three_high_violations_need_revision() {
    let engine = ValidationEngine::new(&EngineConfig::default()).unwrap();
    engine.add_rule(scripted(
        "H-1",
        Behavior::Report(vec![
            Violation::new("H-1", Severity::High, "a"),
            Violation::new("H-1", Severity::High, "b"),
            Violation::new("H-1", Severity::High, "c"),
        ]),
    ));
    let result = engine.validate(&plain_request(), &ValidationContext::default());
    assert_eq!(result.status, ValidationStatus::RevisionRequired);
    assert!(result.reasoning.contains("3 high"));
    assert!(result.reasoning.contains("substantial rework"));
}

#[test]
fn test_failing_and_panicking_rules_are_isolated() {
    let engine = ValidationEngine::new(&EngineConfig::default()).unwrap();
    engine.add_rule(scripted("ERR-1", Behavior::Fail));
    engine.add_rule(scripted("PANIC-1", Behavior::Panic));
    engine.add_rule(scripted(
        "OK-1",
        Behavior::Report(vec![Violation::new("OK-1", Severity::Medium, "advisory")]),
    ));

    let result = engine.validate(&plain_request(), &ValidationContext::default());
    assert_eq!(result.status, ValidationStatus::RevisionRequired);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.warnings.len(), 2);
    assert!(result.warnings.iter().all(|w| w.severity == Severity::Low));

    let fault_of = |rule: &str| {
        result
            .warnings
            .iter()
            .find(|w| w.rule == rule)
            .map(|w| w.details["fault"].clone())
    };
    assert_eq!(fault_of("ERR-1"), Some(json!("error")));
    assert_eq!(fault_of("PANIC-1"), Some(json!("panic")));
    assert!((result.confidence - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(result.metadata["rules_completed"], 1);
}

#[test]
fn test_slow_rule_times_out() {
    let config = EngineConfig {
        rule_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let engine = ValidationEngine::new(&config).unwrap();
    engine.add_rule(scripted("SLOW-1", Behavior::Sleep(Duration::from_millis(1_000))));
    engine.add_rule(scripted("FAST-1", Behavior::Report(Vec::new())));

    let result = engine.validate(&plain_request(), &ValidationContext::default());
    assert_eq!(result.status, ValidationStatus::Approved);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].rule, "SLOW-1");
    assert_eq!(result.warnings[0].details["fault"], "timeout");
    assert_eq!(result.metadata["rules_timed_out"], json!(["SLOW-1"]));
    assert_eq!(result.confidence, 0.5);
    assert!(result.processing_time_ms < 1_000.0);
}

fn audit_deletion() -> AgentRequest {
    AgentRequest::new(
        "req-delete",
        "agent-1",
        Action::Delete,
        TargetType::AuditEvent,
        RequestContent::default(),
    )
    .with_target_id("AUD-1")
}

#[test]
fn test_slow_rule_does_not_hide_critical_finding() {
    let config = EngineConfig {
        rule_timeout_ms: 100,
        ..EngineConfig::default()
    };
    let engine = ValidationEngine::new(&config).unwrap();
    engine.add_rule(scripted("SLOW-1", Behavior::Sleep(Duration::from_millis(800))));
    engine.add_rule(Arc::new(ConstitutionComplianceRule));

    let result = engine.validate(&audit_deletion(), &ValidationContext::default());
    assert_eq!(result.status, ValidationStatus::Escalated);
    assert!(
        result
            .violations
            .iter()
            .any(|v| v.rule == "CONST-001" && v.severity == Severity::Critical)
    );
    assert_eq!(result.metadata["rules_timed_out"], json!(["SLOW-1"]));
    assert_eq!(result.metadata["rules_completed"], 1);
}

#[test]
fn test_hung_rules_from_earlier_calls_do_not_starve_later_ones() {
    let config = EngineConfig {
        rule_timeout_ms: 100,
        ..EngineConfig::default()
    };
    let engine = ValidationEngine::with_default_rules(&config).unwrap();
    engine.add_rule(scripted("SLOW-1", Behavior::Sleep(Duration::from_millis(2_000))));

    for _ in 0..4 {
        let result = engine.validate(&audit_deletion(), &ValidationContext::default());
        assert_eq!(result.status, ValidationStatus::Escalated);
        assert!(result.violations.iter().any(|v| v.rule == "CONST-001"));
        assert_eq!(result.metadata["rules_timed_out"], json!(["SLOW-1"]));
        assert_eq!(result.metadata["rules_completed"], 5);
    }
}

#[test]
fn test_cancelled_before_start() {
    let engine = default_engine();
    let token = CancelToken::new();
    token.cancel();
    let outcome = engine.validate_cancellable(
        &design_request("REQ-4", "ARCH-1"),
        &corpus(),
        &token,
    );
    assert!(matches!(outcome, Err(GovernanceError::Cancelled)));
}

#[test]
fn test_cancelled_mid_run_from_another_thread() {
    let engine = ValidationEngine::new(&EngineConfig::default()).unwrap();
    engine.add_rule(scripted("SLOW-1", Behavior::Sleep(Duration::from_millis(300))));
    engine.add_rule(scripted(
        "CRIT-1",
        Behavior::Report(vec![Violation::new("CRIT-1", Severity::Critical, "forbidden")]),
    ));

    let token = CancelToken::new();
    let remote = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        remote.cancel();
    });
    let outcome = engine.validate_cancellable(&plain_request(), &ValidationContext::default(), &token);
    canceller.join().unwrap();
    assert!(matches!(outcome, Err(GovernanceError::Cancelled)));
}

#[test]
fn test_uncancelled_token_returns_full_result() {
    let engine = default_engine();
    let result = engine
        .validate_cancellable(&design_request("REQ-5", "ARCH-1"), &corpus(), &CancelToken::new())
        .unwrap();
    assert_eq!(result.status, ValidationStatus::Approved);
}

#[test]
fn test_registry_management() {
    let config = EngineConfig {
        disabled_rules: vec!["REQ-001".to_string()],
        ..EngineConfig::default()
    };
    let engine = ValidationEngine::with_default_rules(&config).unwrap();
    assert_eq!(
        engine.rule_ids(),
        vec!["DOC-001", "VER-001", "ARCH-001", "REQ-001", "CONST-001"]
    );

    let result = engine.validate(&design_request("REQ-6", "ARCH-1"), &ValidationContext::default());
    assert!(result.violations.iter().all(|v| v.rule != "REQ-001"));
    assert_eq!(result.metadata["rules_executed"], 4);

    assert!(engine.set_rule_enabled("REQ-001", true));
    assert!(!engine.set_rule_enabled("NOPE-1", true));
    assert!(engine.remove_rule("DOC-001").is_some());
    assert!(engine.get_rule("DOC-001").is_none());
    assert_eq!(engine.rule_ids().len(), 4);

    let replaced = engine.add_rule(scripted("VER-001", Behavior::Report(Vec::new())));
    assert_eq!(replaced.map(|r| r.name().to_string()).as_deref(), Some("Version Compatibility"));
    assert_eq!(engine.rule_ids()[0], "VER-001");
}

// --- audit trail ---

#[test]
fn test_recent_records_descending() {
    let engine = default_engine();
    let trail = AuditTrail::new();
    for i in 0..7 {
        let request = design_request(&format!("REQ-{}", i), "ARCH-1");
        let result = engine.validate(&request, &corpus());
        trail.log_validation(&request, &result);
    }
    for k in [0, 3, 7, 20] {
        let recent = trail.get_recent_records(k, None);
        assert_eq!(recent.len(), k.min(7));
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
    assert_eq!(
        trail.get_recent_records(1, None)[0].request_id.as_deref(),
        Some("REQ-6")
    );
    assert_eq!(trail.get_records_by_agent("designer", None, None).len(), 7);
    assert!(trail.get_records_by_agent("nobody", None, None).is_empty());
}

#[test]
fn test_concurrent_submissions_are_all_recorded() {
    let protocol = RequestProtocol::new(Arc::new(default_engine()), Arc::new(AuditTrail::new()));
    let ctx = corpus();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let protocol = protocol.clone();
            let ctx = ctx.clone();
            thread::spawn(move || {
                protocol
                    .submit(&design_request(&format!("REQ-C{}", i), "ARCH-1"), &ctx)
                    .expect("submit should succeed")
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().state, RequestState::Approved);
    }
    assert_eq!(protocol.audit().len(), 8);
    let records = protocol.audit().get_recent_records(8, None);
    assert!(records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

// --- protocol ---

fn protocol() -> RequestProtocol {
    RequestProtocol::new(Arc::new(default_engine()), Arc::new(AuditTrail::new()))
}

#[test]
fn test_submit_approved_request() {
    let protocol = protocol();
    let response = protocol
        .submit(&design_request("REQ-10", "ARCH-1"), &corpus())
        .unwrap();
    assert_eq!(response.state, RequestState::Approved);
    assert_eq!(response.status, ValidationStatus::Approved);
    assert_eq!(
        response.approved_location.as_deref(),
        Some("docs/design/REQ-10.md")
    );
    assert_eq!(response.next_steps[0], "Write content to docs/design/REQ-10.md");
    assert!(response.required_changes.is_empty());

    let record_id = response.audit_record_id.expect("audit record id");
    let record = protocol.audit().get_record(&record_id).unwrap();
    assert_eq!(record.event_type, AuditEventType::Validation);
    assert_eq!(record.decision.as_deref(), Some("approved"));
    assert_eq!(record.request_id.as_deref(), Some("REQ-10"));
}

#[test]
fn test_submit_escalated_request() {
    let response = protocol()
        .submit(&design_request("REQ-11", "ARCH-404"), &corpus())
        .unwrap();
    assert_eq!(response.state, RequestState::Escalated);
    assert!(response.approved_location.is_none());
    assert_eq!(response.next_steps[0], "Wait for human review");
    assert_eq!(
        response.required_changes,
        vec!["Ensure the architecture ID is correct and exists"]
    );
}

#[test]
fn test_submit_rejects_malformed_request() {
    let protocol = protocol();
    let request = AgentRequest::new(
        "REQ-12",
        "designer",
        Action::Delete,
        TargetType::Design,
        RequestContent::default(),
    );
    assert!(matches!(
        protocol.submit(&request, &corpus()),
        Err(GovernanceError::MalformedRequest(_))
    ));
    assert!(protocol.audit().is_empty());
}

#[test]
fn test_completion_report_is_recorded() {
    let protocol = protocol();
    let ack = protocol.report_completion(&CompletionReport {
        request_id: "REQ-13".into(),
        completed: false,
        changes_made: vec!["docs/design/REQ-13.md".into()],
        ..Default::default()
    });
    assert!(ack.acknowledged);
    assert!(ack.decision_id.starts_with("DEC-"));
    assert_eq!(ack.next_steps[0], "Review failure reasons");

    let record = protocol.audit().get_record(&ack.audit_record_id).unwrap();
    assert_eq!(record.event_type, AuditEventType::Decision);
    assert_eq!(record.decision.as_deref(), Some("completion_report"));
    assert_eq!(record.metadata["rationale"], "Task failed");
    assert_eq!(protocol.audit().get_records_by_request("REQ-13").len(), 1);
}

#[test]
fn test_scan_drift_without_graph_is_recorded() {
    let protocol = protocol();
    let (violations, record_id) = protocol.scan_drift(&DriftDetector::new(None));
    assert!(violations.is_empty());
    let record = protocol.audit().get_record(&record_id).unwrap();
    assert_eq!(record.event_type, AuditEventType::DriftDetection);
    assert_eq!(record.metadata["violations_count"], 0);
}

// --- adapter ---

#[test]
fn test_parsed_document_flows_through_protocol() {
    let doc = ParsedDocument {
        path: "docs/design/ingest.md".into(),
        doc_type: "design".into(),
        frontmatter: fm(json!({
            "doc": "design",
            "component": "ingest",
            "id": "DES-1",
            "version": "1.0.0",
            "status": "draft",
            "owners": ["ana"],
            "implements": "ARCH-1",
            "satisfies": "RQ-1",
            "architecture_ref": "ARCH-1"
        })),
        content: "Implements [[ARCH-1]] for spec:RQ-1.".into(),
        hash: "0123456789abcdef".into(),
        ..Default::default()
    };

    let request =
        RequestAdapter::document_to_request(&doc, "ingest-bot", Action::Create, None, None)
            .unwrap();
    assert_eq!(request.target_type, TargetType::Design);
    assert_eq!(request.references, vec!["ARCH-1", "RQ-1"]);
    assert_eq!(request.content.extra["component"], "ingest");
    assert!(!request.content.extra.contains_key("drift_tolerance"));

    let response = protocol().submit(&request, &corpus()).unwrap();
    assert_eq!(response.state, RequestState::Approved);

    let meta = RequestAdapter::validation_metadata(&doc);
    assert_eq!(meta["owner_count"], 1);
    assert_eq!(meta["reference_count"], 2);
}
