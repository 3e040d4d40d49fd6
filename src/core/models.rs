//! Value types shared by every governance component.
//!
//! Violations, results and drift findings are immutable once built: the
//! builders below consume `self` and nothing hands out `&mut` to a finished
//! value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Number of high-severity findings at which a request is considered to
/// need substantial rework.
pub const HIGH_VIOLATION_THRESHOLD: usize = 3;

/// Ordinal severity scale, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal verdict of one validation run.
///
/// `Rejected` is never produced by [`ValidationStatus::from_violations`]; it
/// exists for verdicts recorded by humans or downstream systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Approved,
    Rejected,
    Escalated,
    RevisionRequired,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::Escalated => "escalated",
            ValidationStatus::RevisionRequired => "revision_required",
        }
    }

    /// Deterministic verdict for a violation multiset.
    ///
    /// - no violations: approved
    /// - any critical: escalated
    /// - three or more high: revision required
    /// - anything else: revision required
    pub fn from_violations(violations: &[Violation]) -> Self {
        if violations.is_empty() {
            return ValidationStatus::Approved;
        }
        if violations.iter().any(|v| v.severity == Severity::Critical) {
            return ValidationStatus::Escalated;
        }
        let high_count = count_severity(violations, Severity::High);
        if high_count >= HIGH_VIOLATION_THRESHOLD {
            return ValidationStatus::RevisionRequired;
        }
        ValidationStatus::RevisionRequired
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn count_severity(violations: &[Violation], severity: Severity) -> usize {
    violations.iter().filter(|v| v.severity == severity).count()
}

/// One rule's finding against a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, JsonValue>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl Violation {
    pub fn new(rule: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity,
            message: message.into(),
            details: Map::new(),
            suggestion: None,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub violations: Vec<Violation>,
    pub warnings: Vec<Violation>,
    pub metadata: Map<String, JsonValue>,
    pub reasoning: String,
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// Builds a result whose status is derived from `violations`, so the
    /// approved-iff-empty invariant holds by construction.
    pub fn from_violations(violations: Vec<Violation>, warnings: Vec<Violation>) -> Self {
        let status = ValidationStatus::from_violations(&violations);
        let reasoning = generate_reasoning(status, &violations);
        Self {
            status,
            violations,
            warnings,
            metadata: Map::new(),
            reasoning,
            confidence: 1.0,
            processing_time_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Approved
    }

    pub fn critical_violations(&self) -> Vec<&Violation> {
        self.by_severity(Severity::Critical)
    }

    pub fn high_violations(&self) -> Vec<&Violation> {
        self.by_severity(Severity::High)
    }

    fn by_severity(&self, severity: Severity) -> Vec<&Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .collect()
    }
}

/// Human-readable explanation for a verdict.
pub fn generate_reasoning(status: ValidationStatus, violations: &[Violation]) -> String {
    match status {
        ValidationStatus::Approved => {
            "All validation rules passed. Request is approved for processing.".to_string()
        }
        ValidationStatus::Escalated => {
            let critical: Vec<&Violation> = violations
                .iter()
                .filter(|v| v.severity == Severity::Critical)
                .collect();
            let rules: std::collections::BTreeSet<&str> =
                critical.iter().map(|v| v.rule.as_str()).collect();
            format!(
                "Request requires human review due to {} critical violation(s) in rules: {}. \
                 These violations cannot be auto-resolved.",
                critical.len(),
                rules.into_iter().collect::<Vec<_>>().join(", ")
            )
        }
        ValidationStatus::RevisionRequired => {
            let summary = Severity::ALL
                .iter()
                .filter_map(|s| {
                    let n = count_severity(violations, *s);
                    (n > 0).then(|| format!("{} {}", n, s))
                })
                .collect::<Vec<_>>()
                .join(", ");
            let mut text = format!(
                "Request has {} violation(s): {}.",
                violations.len(),
                summary
            );
            if count_severity(violations, Severity::High) >= HIGH_VIOLATION_THRESHOLD {
                text.push_str(" Multiple high-severity violations indicate substantial rework.");
            }
            text.push_str(" Please address the violations and resubmit.");
            text
        }
        ValidationStatus::Rejected => "Request was rejected.".to_string(),
    }
}

/// Category of a detected inconsistency in the specification graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    DesignAheadOfArchitecture,
    UndocumentedCode,
    UncoveredRequirement,
    VersionMismatch,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::DesignAheadOfArchitecture => "design_ahead_of_architecture",
            DriftKind::UndocumentedCode => "undocumented_code",
            DriftKind::UncoveredRequirement => "uncovered_requirement",
            DriftKind::VersionMismatch => "version_mismatch",
        }
    }
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftViolation {
    #[serde(rename = "type")]
    pub kind: DriftKind,
    pub severity: Severity,
    pub source: String,
    pub target: Option<String>,
    pub description: String,
    /// Seconds.
    pub time_delta: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

impl DriftViolation {
    pub fn new(
        kind: DriftKind,
        severity: Severity,
        source: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            source: source.into(),
            target: None,
            description: description.into(),
            time_delta: None,
            detected_at: Utc::now(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_time_delta(mut self, seconds: Option<f64>) -> Self {
        self.time_delta = seconds;
        self
    }
}
