//! specgate: governance decisions for specification corpora
//!
//! **specgate decides whether a proposed change to a hierarchical specification
//! corpus may proceed, needs revision, or must go to a human.**
//!
//! The corpus is layered Architecture → Design → Code, with Requirements
//! cross-referenced. Agents propose changes; specgate validates them against a
//! rule set, records every verdict in an append-only audit trail, and scans the
//! specification graph for drift between layers.
//!
//! # Core Principles
//!
//! - **Deterministic verdicts**: status depends only on the severity multiset
//! - **Fault isolation**: one broken rule never blocks a decision
//! - **Append-only history**: audit records are never updated or deleted
//! - **Graceful degradation**: no graph handle means "no data", not an error
//! - **Explicit handles**: engine and audit trail are constructed once and
//!   passed around, never global
//!
//! # Architecture
//!
//! ## Decision Path
//!
//! 1. A caller builds an [`AgentRequest`] (directly or via [`RequestAdapter`])
//! 2. [`ValidationEngine`] runs every enabled [`Rule`] concurrently against a
//!    [`ValidationContext`] snapshot
//! 3. The [`ValidationResult`] is appended to the [`AuditTrail`]
//! 4. [`RequestProtocol`] turns the verdict into an [`AgentResponse`]
//!
//! ## Independent Scans
//!
//! - [`DriftDetector`]: design drift, undocumented code, uncovered
//!   requirements and version mismatches
//! - [`ComplianceChecker`]: per-subsystem compliance rate
//!
//! # Example
//!
//! ```no_run
//! use specgate::{
//!     Action, AgentRequest, AuditTrail, EngineConfig, RequestContent, RequestProtocol,
//!     TargetType, ValidationContext, ValidationEngine,
//! };
//! use std::sync::Arc;
//!
//! let engine = Arc::new(ValidationEngine::with_default_rules(&EngineConfig::default())?);
//! let protocol = RequestProtocol::new(engine, Arc::new(AuditTrail::new()));
//! let request = AgentRequest::new(
//!     "req-1",
//!     "planner",
//!     Action::Create,
//!     TargetType::Research,
//!     RequestContent::default(),
//! );
//! let response = protocol.submit(&request, &ValidationContext::default())?;
//! println!("{}", response.status);
//! # Ok::<(), specgate::GovernanceError>(())
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: value types, engine, audit trail, protocol, adapter
//! - [`plugins`]: rule set, drift detection, compliance

pub mod core;
pub mod plugins;

pub use crate::core::adapter::{ParsedDocument, RequestAdapter};
pub use crate::core::audit::{
    AuditEventType, AuditRecord, AuditStatistics, AuditStorage, AuditTrail,
};
pub use crate::core::audit_store::SqliteAuditStore;
pub use crate::core::config::{
    AuditConfig, DriftConfig, EngineConfig, GovernanceConfig, load_config,
};
pub use crate::core::context::{CancelToken, SpecRecord, SpecSnapshot, ValidationContext};
pub use crate::core::error::GovernanceError;
pub use crate::core::graph::{GraphQuery, QueryDescriptor, QueryKind, Row};
pub use crate::core::models::{
    DriftKind, DriftViolation, Severity, ValidationResult, ValidationStatus, Violation,
};
pub use crate::core::protocol::{
    AgentResponse, CompletionAck, CompletionReport, RequestProtocol, RequestState,
    approved_location, create_response_from_validation,
};
pub use crate::core::request::{
    Action, AgentRequest, AuthorType, Decision, ImpactLevel, RequestContent, TargetType,
};
pub use crate::core::validate::ValidationEngine;
pub use crate::plugins::compliance::{
    ComplianceChecker, ComplianceReport, UncoveredRequirement,
};
pub use crate::plugins::drift::{DriftDetector, DriftSummary};
pub use crate::plugins::rules::{
    ArchitectureAlignmentRule, ConstitutionComplianceRule, DocumentStandardsRule,
    RequirementCoverageRule, Rule, VersionCompatibilityRule, default_rules,
};
