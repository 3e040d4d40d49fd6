//! Agent request/response protocol.
//!
//! Binds the engine and the audit trail together for one change proposal:
//! `submitted -> validating -> {approved | revision_required | escalated}`.
//! `rejected` is a legal terminal state for externally recorded verdicts but
//! validation never lands there on its own.

use crate::core::audit::AuditTrail;
use crate::core::context::ValidationContext;
use crate::core::error::GovernanceError;
use crate::core::models::{DriftViolation, ValidationResult, ValidationStatus, Violation};
use crate::core::request::{Action, AgentRequest, AuthorType, Decision, ImpactLevel, TargetType};
use crate::core::time::now_utc;
use crate::core::validate::ValidationEngine;
use crate::plugins::drift::DriftDetector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Submitted,
    Validating,
    Approved,
    RevisionRequired,
    Escalated,
    Rejected,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Submitted => "submitted",
            RequestState::Validating => "validating",
            RequestState::Approved => "approved",
            RequestState::RevisionRequired => "revision_required",
            RequestState::Escalated => "escalated",
            RequestState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Submitted | RequestState::Validating)
    }

    pub fn can_transition_to(&self, next: RequestState) -> bool {
        match self {
            RequestState::Submitted => next == RequestState::Validating,
            RequestState::Validating => next.is_terminal(),
            _ => false,
        }
    }

    pub fn transition(self, next: RequestState) -> Result<RequestState, GovernanceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GovernanceError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl From<ValidationStatus> for RequestState {
    fn from(status: ValidationStatus) -> Self {
        match status {
            ValidationStatus::Approved => RequestState::Approved,
            ValidationStatus::Rejected => RequestState::Rejected,
            ValidationStatus::Escalated => RequestState::Escalated,
            ValidationStatus::RevisionRequired => RequestState::RevisionRequired,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where approved content for a request is expected to be written.
pub fn approved_location(target_type: TargetType, request_id: &str) -> String {
    format!("docs/{}/{}.md", target_type, request_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub request_id: String,
    pub state: RequestState,
    pub status: ValidationStatus,
    pub feedback: String,
    pub approved_location: Option<String>,
    pub required_changes: Vec<String>,
    pub next_steps: Vec<String>,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, JsonValue>,
    pub audit_record_id: Option<String>,
}

/// Builds the caller-facing response for a finished validation.
pub fn create_response_from_validation(
    result: &ValidationResult,
    request: &AgentRequest,
    location: Option<String>,
) -> AgentResponse {
    let required_changes = result
        .violations
        .iter()
        .filter_map(|v| v.suggestion.clone())
        .filter(|s| !s.is_empty())
        .collect();

    let approved = result.status == ValidationStatus::Approved;
    let approved_location = if approved { location } else { None };

    let next_steps: Vec<String> = match result.status {
        ValidationStatus::Approved => vec![
            format!(
                "Write content to {}",
                approved_location.as_deref().unwrap_or("the approved location")
            ),
            "Update graph database with new node".to_string(),
            "Create relationships to referenced specs".to_string(),
        ],
        ValidationStatus::RevisionRequired => vec![
            "Address the violations listed above".to_string(),
            "Resubmit request with corrections".to_string(),
            "Ensure all required fields are present".to_string(),
        ],
        ValidationStatus::Escalated => vec![
            "Wait for human review".to_string(),
            "Review critical violations".to_string(),
            "Prepare additional context if needed".to_string(),
        ],
        ValidationStatus::Rejected => Vec::new(),
    };

    AgentResponse {
        request_id: request.id.clone(),
        state: RequestState::from(result.status),
        status: result.status,
        feedback: result.reasoning.clone(),
        approved_location,
        required_changes,
        next_steps,
        violations: result.violations.clone(),
        warnings: result.warnings.clone(),
        confidence: result.confidence,
        processing_time_ms: result.processing_time_ms,
        timestamp: now_utc(),
        metadata: result.metadata.clone(),
        audit_record_id: None,
    }
}

/// An agent's report after acting (or failing to act) on an approval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub request_id: String,
    pub completed: bool,
    #[serde(default)]
    pub changes_made: Vec<String>,
    #[serde(default)]
    pub deviations: Vec<Map<String, JsonValue>>,
    #[serde(default)]
    pub test_results: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionAck {
    pub acknowledged: bool,
    pub decision_id: String,
    pub audit_record_id: String,
    pub next_steps: Vec<String>,
}

/// Request handling entry point built from explicit engine and audit handles.
#[derive(Clone)]
pub struct RequestProtocol {
    engine: Arc<ValidationEngine>,
    audit: Arc<AuditTrail>,
}

impl RequestProtocol {
    pub fn new(engine: Arc<ValidationEngine>, audit: Arc<AuditTrail>) -> Self {
        Self { engine, audit }
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Validates `request`, records the verdict and answers the agent.
    pub fn submit(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
    ) -> Result<AgentResponse, GovernanceError> {
        check_well_formed(request)?;
        let state = RequestState::Submitted.transition(RequestState::Validating)?;

        let result = self.engine.validate(request, context);
        let state = state.transition(RequestState::from(result.status))?;

        let location = approved_location(request.target_type, &request.id);
        let mut response = create_response_from_validation(&result, request, Some(location));
        response.state = state;
        response.audit_record_id = Some(self.audit.log_validation(request, &result));

        info!(
            request_id = %request.id,
            agent_id = %request.agent_id,
            state = %response.state,
            violations = response.violations.len(),
            warnings = response.warnings.len(),
            "request processed"
        );
        Ok(response)
    }

    pub fn report_completion(&self, report: &CompletionReport) -> CompletionAck {
        let outcome = if report.completed { "completed" } else { "failed" };
        let mut decision = Decision::new(
            "completion_report",
            report.request_id.clone(),
            AuthorType::Agent,
            format!("Task {}", outcome),
        )
        .with_request(report.request_id.clone())
        .with_confidence(if report.completed { 1.0 } else { 0.5 })
        .with_impact(ImpactLevel::Medium);
        decision.metadata.insert("completed".into(), json!(report.completed));
        decision
            .metadata
            .insert("changes_made".into(), json!(report.changes_made));
        decision
            .metadata
            .insert("deviations".into(), json!(report.deviations));
        decision
            .metadata
            .insert("test_results".into(), JsonValue::Object(report.test_results.clone()));

        let audit_record_id = self.audit.log_decision(&decision);

        let next_steps = if report.completed {
            vec![
                "Changes have been recorded in audit trail",
                "Graph database will be updated with new relationships",
                "Drift detection will monitor for consistency",
            ]
        } else {
            vec![
                "Review failure reasons",
                "Submit revised request if needed",
                "Consult additional specifications",
            ]
        };

        info!(
            request_id = %report.request_id,
            decision_id = %decision.id,
            outcome,
            "completion report acknowledged"
        );
        CompletionAck {
            acknowledged: true,
            decision_id: decision.id,
            audit_record_id,
            next_steps: next_steps.into_iter().map(String::from).collect(),
        }
    }

    /// Runs a full drift scan and records it. Returns the findings and the
    /// audit record id.
    pub fn scan_drift(&self, detector: &DriftDetector) -> (Vec<DriftViolation>, String) {
        let violations = detector.detect_all_drift();
        let record_id = self.audit.log_drift_detection(&violations);
        (violations, record_id)
    }
}

fn check_well_formed(request: &AgentRequest) -> Result<(), GovernanceError> {
    if request.id.trim().is_empty() {
        return Err(GovernanceError::MalformedRequest(
            "request id is empty".to_string(),
        ));
    }
    if request.agent_id.trim().is_empty() {
        return Err(GovernanceError::MalformedRequest(format!(
            "request {} has no agent_id",
            request.id
        )));
    }
    let needs_target = matches!(request.action, Action::Update | Action::Delete);
    if needs_target && request.target_id.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return Err(GovernanceError::MalformedRequest(format!(
            "{} request {} requires target_id",
            request.action, request.id
        )));
    }
    Ok(())
}
