//! Per-subsystem compliance rate.

use crate::core::graph::{GraphQuery, QueryKind, Row, query_or_empty, row_str};
use crate::core::models::DriftViolation;
use crate::plugins::drift::{design_drift_from_row, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

const MAX_LISTED: usize = 50;
const UNCOVERED_TEXT_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncoveredRequirement {
    pub id: String,
    pub text: String,
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub subsystem: String,
    pub total_specs: u64,
    pub implemented: u64,
    /// `implemented / total_specs`; 1.0 for an empty subsystem.
    pub compliance_rate: f64,
    pub violations: Vec<DriftViolation>,
    pub uncovered_requirements: Vec<UncoveredRequirement>,
}

#[derive(Clone, Default)]
pub struct ComplianceChecker {
    graph: Option<Arc<dyn GraphQuery>>,
}

impl ComplianceChecker {
    pub fn new(graph: Option<Arc<dyn GraphQuery>>) -> Self {
        Self { graph }
    }

    pub fn check(&self, subsystem: &str) -> ComplianceReport {
        let mut report = ComplianceReport {
            subsystem: subsystem.to_string(),
            total_specs: 0,
            implemented: 0,
            compliance_rate: 1.0,
            violations: Vec::new(),
            uncovered_requirements: Vec::new(),
        };
        let Some(graph) = &self.graph else {
            return report;
        };

        let mut params = Row::new();
        params.insert("subsystem".into(), JsonValue::from(subsystem));
        let run = |kind| query_or_empty(graph.as_ref(), kind, &params);

        report.total_specs = first_count(&run(QueryKind::SubsystemArchitectureCount), "total");
        report.implemented = first_count(&run(QueryKind::SubsystemImplementedCount), "implemented")
            .min(report.total_specs);
        if report.total_specs > 0 {
            report.compliance_rate = report.implemented as f64 / report.total_specs as f64;
        }

        report.violations = run(QueryKind::SubsystemDesignDrift)
            .iter()
            .filter_map(design_drift_from_row)
            .take(MAX_LISTED)
            .collect();

        report.uncovered_requirements = run(QueryKind::SubsystemUncoveredRequirements)
            .iter()
            .filter_map(|row| {
                Some(UncoveredRequirement {
                    id: row_str(row, "req_id")?,
                    text: truncate_chars(
                        &row_str(row, "text").unwrap_or_default(),
                        UNCOVERED_TEXT_LIMIT,
                    ),
                    priority: row_str(row, "priority").unwrap_or_else(|| "medium".to_string()),
                })
            })
            .take(MAX_LISTED)
            .collect();

        info!(
            subsystem,
            rate = report.compliance_rate,
            implemented = report.implemented,
            total = report.total_specs,
            violations = report.violations.len(),
            uncovered = report.uncovered_requirements.len(),
            "compliance check finished"
        );
        report
    }
}

fn first_count(rows: &[Row], column: &str) -> u64 {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(|v| match v {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}
