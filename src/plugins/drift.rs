//! Specification drift detection.
//!
//! Scans are read-only and independent of any request. Without a graph
//! handle every scan returns an empty list; a failing query is logged and
//! treated the same way.

use crate::core::config::DriftConfig;
use crate::core::graph::{GraphQuery, QueryKind, Row, query_or_empty, row_str};
use crate::core::models::{DriftKind, DriftViolation, Severity};
use crate::core::time::{now_utc, parse_timestamp, seconds_between};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const REQUIREMENT_TEXT_PREVIEW: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub total_violations: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub critical_violations: Vec<DriftViolation>,
}

impl DriftSummary {
    pub fn from_violations(violations: &[DriftViolation]) -> Self {
        let mut summary = DriftSummary {
            total_violations: violations.len(),
            ..Default::default()
        };
        for v in violations {
            *summary.by_type.entry(v.kind.as_str().to_string()).or_default() += 1;
            *summary
                .by_severity
                .entry(v.severity.as_str().to_string())
                .or_default() += 1;
            if v.severity == Severity::Critical {
                summary.critical_violations.push(v.clone());
            }
        }
        summary
    }
}

#[derive(Clone, Default)]
pub struct DriftDetector {
    graph: Option<Arc<dyn GraphQuery>>,
    include_version_mismatch: bool,
}

impl DriftDetector {
    pub fn new(graph: Option<Arc<dyn GraphQuery>>) -> Self {
        Self {
            graph,
            include_version_mismatch: false,
        }
    }

    pub fn with_config(graph: Option<Arc<dyn GraphQuery>>, config: &DriftConfig) -> Self {
        Self {
            graph,
            include_version_mismatch: config.include_version_mismatch,
        }
    }

    fn rows(&self, kind: QueryKind) -> Vec<Row> {
        match &self.graph {
            Some(graph) => query_or_empty(graph.as_ref(), kind, &Row::new()),
            None => Vec::new(),
        }
    }

    /// Design drift, undocumented code and uncovered requirements. Version
    /// mismatches are folded in only when configured.
    ///
    /// The scans query the graph concurrently; output keeps scan order.
    pub fn detect_all_drift(&self) -> Vec<DriftViolation> {
        let ((design, undocumented), (uncovered, mismatches)) = rayon::join(
            || {
                rayon::join(
                    || self.detect_design_drift(),
                    || self.detect_undocumented_code(),
                )
            },
            || {
                rayon::join(
                    || self.detect_uncovered_requirements(),
                    || {
                        if self.include_version_mismatch {
                            self.detect_version_mismatches()
                        } else {
                            Vec::new()
                        }
                    },
                )
            },
        );
        let mut violations = design;
        violations.extend(undocumented);
        violations.extend(uncovered);
        violations.extend(mismatches);
        info!(total = violations.len(), "drift scan finished");
        violations
    }

    /// Designs modified strictly after the architecture they implement with
    /// no approved exception.
    pub fn detect_design_drift(&self) -> Vec<DriftViolation> {
        self.rows(QueryKind::DesignDrift)
            .iter()
            .filter_map(design_drift_from_row)
            .collect()
    }

    pub fn detect_undocumented_code(&self) -> Vec<DriftViolation> {
        let now = now_utc();
        self.rows(QueryKind::UndocumentedCode)
            .iter()
            .map(|row| {
                let code_id = row_str(row, "code_id").unwrap_or_else(|| "unknown".to_string());
                let path = row_str(row, "code_path").unwrap_or_else(|| "unknown".to_string());
                DriftViolation::new(
                    DriftKind::UndocumentedCode,
                    Severity::Medium,
                    code_id,
                    format!("Code at '{}' has no corresponding design documentation", path),
                )
                .with_time_delta(age_seconds(row, "created_at", &now))
            })
            .collect()
    }

    /// Active requirements nothing satisfies; `high` priority ones are high
    /// severity, everything else medium.
    pub fn detect_uncovered_requirements(&self) -> Vec<DriftViolation> {
        let now = now_utc();
        self.rows(QueryKind::UncoveredRequirements)
            .iter()
            .filter_map(|row| {
                let req_id = row_str(row, "req_id")?;
                let severity = match row_str(row, "priority").as_deref() {
                    Some("high") => Severity::High,
                    _ => Severity::Medium,
                };
                let text = row_str(row, "text").unwrap_or_default();
                let description = format!(
                    "Requirement '{}' not satisfied: {}",
                    req_id,
                    truncate_with_ellipsis(&text, REQUIREMENT_TEXT_PREVIEW)
                );
                Some(
                    DriftViolation::new(
                        DriftKind::UncoveredRequirement,
                        severity,
                        req_id,
                        description,
                    )
                    .with_time_delta(age_seconds(row, "created_at", &now)),
                )
            })
            .collect()
    }

    /// Children whose major version differs from their parent's.
    pub fn detect_version_mismatches(&self) -> Vec<DriftViolation> {
        self.rows(QueryKind::VersionMismatches)
            .iter()
            .filter_map(|row| {
                let child_id = row_str(row, "child_id")?;
                let parent_id = row_str(row, "parent_id")?;
                let child_version = row_str(row, "child_version")?;
                let parent_version = row_str(row, "parent_version")?;
                if major(&child_version) == major(&parent_version) {
                    return None;
                }
                Some(
                    DriftViolation::new(
                        DriftKind::VersionMismatch,
                        Severity::High,
                        child_id.clone(),
                        format!(
                            "Version mismatch: {} (v{}) implements {} (v{})",
                            child_id, child_version, parent_id, parent_version
                        ),
                    )
                    .with_target(parent_id),
                )
            })
            .collect()
    }

    pub fn get_drift_summary(&self) -> DriftSummary {
        DriftSummary::from_violations(&self.detect_all_drift())
    }
}

pub(crate) fn design_drift_from_row(row: &Row) -> Option<DriftViolation> {
    if row.get("exception_approved").and_then(JsonValue::as_bool) == Some(true) {
        return None;
    }
    let design_id = row_str(row, "design_id")?;
    let arch_id = row_str(row, "arch_id")?;
    let design_modified = row
        .get("design_modified")
        .or_else(|| row.get("modified"))
        .and_then(parse_timestamp);
    let arch_modified = row.get("arch_modified").and_then(parse_timestamp);

    let time_delta = match (design_modified, arch_modified) {
        (Some(d), Some(a)) if d <= a => return None,
        (Some(d), Some(a)) => Some(seconds_between(&d, &a)),
        _ => None,
    };

    Some(
        DriftViolation::new(
            DriftKind::DesignAheadOfArchitecture,
            Severity::High,
            design_id.clone(),
            format!(
                "Design '{}' modified after architecture '{}' without approval",
                design_id, arch_id
            ),
        )
        .with_target(arch_id)
        .with_time_delta(time_delta),
    )
}

fn age_seconds(row: &Row, key: &str, now: &chrono::DateTime<chrono::Utc>) -> Option<f64> {
    let created = row.get(key).and_then(parse_timestamp)?;
    Some(seconds_between(now, &created))
}

fn major(version: &str) -> &str {
    let trimmed = version.trim_start_matches(['v', 'V']);
    trimmed.split('.').next().unwrap_or(trimmed)
}

pub(crate) fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
