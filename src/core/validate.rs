//! Rule-based validation engine.
//!
//! This module turns one change proposal into one verdict.
//!
//! # Execution Model
//!
//! - **Fan-out**: every enabled rule runs on its own named thread, against the
//!   same `Arc`-shared request and context
//! - **Deadline**: each rule's `rule_timeout_ms` budget starts when that rule
//!   starts; results already queued are taken before any rule is timed out
//! - **Completion order**: violations are flattened in the order rules report,
//!   not by severity; only the severity multiset decides the status
//! - **Fault isolation**: a rule that errors, panics or misses its deadline
//!   contributes zero violations and one low-severity warning
//! - **Cancellation**: `validate_cancellable` either returns a complete result
//!   or `GovernanceError::Cancelled`, never a partial verdict
//!
//! A rule that never returns keeps its thread alive. The thread is detached
//! and the deadline only stops the engine from waiting for it.

use crate::core::config::EngineConfig;
use crate::core::context::{CancelToken, ValidationContext};
use crate::core::error::GovernanceError;
use crate::core::models::{Severity, ValidationResult, ValidationStatus, Violation};
use crate::core::request::AgentRequest;
use crate::plugins::rules::{Rule, default_rules};
use serde_json::{Value as JsonValue, json};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct RuleEntry {
    rule: Arc<dyn Rule>,
    enabled: bool,
}

enum RuleEvent {
    Started(Instant),
    Finished(RuleRun),
}

enum RuleRun {
    Completed(Vec<Violation>),
    Failed(String),
    Panicked(String),
    Skipped,
}

struct RunSummary {
    violations: Vec<Violation>,
    warnings: Vec<Violation>,
    scheduled: usize,
    completed: usize,
    failed: Vec<String>,
    timed_out: Vec<String>,
    cancelled: bool,
}

struct Progress {
    started_at: Vec<Option<Instant>>,
    reported: Vec<bool>,
    pending: usize,
}

pub struct ValidationEngine {
    rules: RwLock<Vec<RuleEntry>>,
    disabled_by_config: Vec<String>,
    rule_timeout: Duration,
}

impl ValidationEngine {
    /// Engine with an empty registry.
    pub fn new(config: &EngineConfig) -> Result<Self, GovernanceError> {
        if config.rule_timeout_ms == 0 {
            return Err(GovernanceError::ConfigError(
                "engine.rule_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            rules: RwLock::new(Vec::new()),
            disabled_by_config: config.disabled_rules.clone(),
            rule_timeout: Duration::from_millis(config.rule_timeout_ms),
        })
    }

    /// Engine with the five standard rules; `disabled_rules` start disabled.
    pub fn with_default_rules(config: &EngineConfig) -> Result<Self, GovernanceError> {
        let engine = Self::new(config)?;
        for rule in default_rules() {
            engine.add_rule(rule);
        }
        Ok(engine)
    }

    /// Registers `rule`, replacing any rule with the same id in place.
    /// Returns the replaced rule.
    pub fn add_rule(&self, rule: Arc<dyn Rule>) -> Option<Arc<dyn Rule>> {
        let enabled = !self.disabled_by_config.iter().any(|id| id == rule.id());
        let mut rules = self.write_rules();
        if let Some(entry) = rules.iter_mut().find(|e| e.rule.id() == rule.id()) {
            debug!(rule = rule.id(), "replacing registered rule");
            let previous = std::mem::replace(&mut entry.rule, rule);
            return Some(previous);
        }
        debug!(rule = rule.id(), enabled, "registering rule");
        rules.push(RuleEntry { rule, enabled });
        None
    }

    pub fn remove_rule(&self, id: &str) -> Option<Arc<dyn Rule>> {
        let mut rules = self.write_rules();
        let idx = rules.iter().position(|e| e.rule.id() == id)?;
        Some(rules.remove(idx).rule)
    }

    pub fn get_rule(&self, id: &str) -> Option<Arc<dyn Rule>> {
        self.read_rules()
            .iter()
            .find(|e| e.rule.id() == id)
            .map(|e| Arc::clone(&e.rule))
    }

    /// Returns false when no rule has this id.
    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut rules = self.write_rules();
        match rules.iter_mut().find(|e| e.rule.id() == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Registered ids in registration order, enabled or not.
    pub fn rule_ids(&self) -> Vec<String> {
        self.read_rules()
            .iter()
            .map(|e| e.rule.id().to_string())
            .collect()
    }

    pub fn validate(&self, request: &AgentRequest, context: &ValidationContext) -> ValidationResult {
        let started = Instant::now();
        let summary = self.run_rules(request, context, &CancelToken::new());
        self.assemble(request, summary, started)
    }

    pub fn validate_cancellable(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
        cancel: &CancelToken,
    ) -> Result<ValidationResult, GovernanceError> {
        let started = Instant::now();
        let summary = self.run_rules(request, context, cancel);
        if summary.cancelled {
            info!(request_id = %request.id, "validation cancelled");
            return Err(GovernanceError::Cancelled);
        }
        Ok(self.assemble(request, summary, started))
    }

    fn enabled_rules(&self) -> Vec<Arc<dyn Rule>> {
        self.read_rules()
            .iter()
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.rule))
            .collect()
    }

    fn run_rules(
        &self,
        request: &AgentRequest,
        context: &ValidationContext,
        cancel: &CancelToken,
    ) -> RunSummary {
        let rules = self.enabled_rules();
        let mut summary = RunSummary {
            violations: Vec::new(),
            warnings: Vec::new(),
            scheduled: rules.len(),
            completed: 0,
            failed: Vec::new(),
            timed_out: Vec::new(),
            cancelled: false,
        };
        if rules.is_empty() {
            return summary;
        }

        let (tx, rx) = mpsc::channel::<(usize, RuleEvent)>();
        let shared_request = Arc::new(request.clone());
        let mut progress = Progress {
            started_at: vec![None; rules.len()],
            reported: vec![false; rules.len()],
            pending: rules.len(),
        };

        for (idx, rule) in rules.iter().enumerate() {
            let tx = tx.clone();
            let task_rule = Arc::clone(rule);
            let request = Arc::clone(&shared_request);
            let context = context.clone();
            let cancel = cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("specgate-rule-{}", rule.id()))
                .spawn(move || {
                    if cancel.is_cancelled() {
                        let _ = tx.send((idx, RuleEvent::Finished(RuleRun::Skipped)));
                        return;
                    }
                    let _ = tx.send((idx, RuleEvent::Started(Instant::now())));
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        task_rule.evaluate(&request, &context)
                    }));
                    let run = match outcome {
                        Ok(Ok(violations)) => RuleRun::Completed(violations),
                        Ok(Err(e)) => RuleRun::Failed(e.to_string()),
                        Err(payload) => RuleRun::Panicked(panic_message(payload)),
                    };
                    // Receiver is gone once the engine stopped waiting.
                    let _ = tx.send((idx, RuleEvent::Finished(run)));
                });
            if let Err(e) = spawned {
                self.absorb(
                    &mut summary,
                    &mut progress,
                    &rules,
                    idx,
                    RuleEvent::Finished(RuleRun::Failed(format!("worker did not start: {}", e))),
                );
            }
        }
        drop(tx);

        while progress.pending > 0 {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return summary;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok((idx, event)) => self.absorb(&mut summary, &mut progress, &rules, idx, event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            // Results already queued win over an expiring deadline.
            while let Ok((idx, event)) = rx.try_recv() {
                self.absorb(&mut summary, &mut progress, &rules, idx, event);
            }
            if summary.cancelled {
                return summary;
            }
            self.expire(&mut summary, &mut progress, &rules);
        }
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return summary;
        }

        for (idx, rule) in rules.iter().enumerate() {
            if !progress.reported[idx] {
                warn!(rule = rule.id(), "rule worker exited without a result");
                summary.failed.push(rule.id().to_string());
                summary.warnings.push(fault_warning(
                    rule.id(),
                    "error",
                    "worker exited without a result",
                ));
            }
        }
        summary
    }

    fn absorb(
        &self,
        summary: &mut RunSummary,
        progress: &mut Progress,
        rules: &[Arc<dyn Rule>],
        idx: usize,
        event: RuleEvent,
    ) {
        if progress.reported[idx] {
            // Late result from a rule that already timed out.
            return;
        }
        let rule_id = rules[idx].id();
        let run = match event {
            RuleEvent::Started(at) => {
                progress.started_at[idx] = Some(at);
                return;
            }
            RuleEvent::Finished(run) => run,
        };
        progress.reported[idx] = true;
        progress.pending -= 1;
        match run {
            RuleRun::Completed(violations) => {
                debug!(rule = rule_id, violations = violations.len(), "rule completed");
                summary.completed += 1;
                summary.violations.extend(violations);
            }
            RuleRun::Failed(message) => {
                warn!(rule = rule_id, error = %message, "rule execution failed");
                summary.failed.push(rule_id.to_string());
                summary.warnings.push(fault_warning(rule_id, "error", &message));
            }
            RuleRun::Panicked(message) => {
                error!(rule = rule_id, panic = %message, "rule panicked");
                summary.failed.push(rule_id.to_string());
                summary.warnings.push(fault_warning(rule_id, "panic", &message));
            }
            RuleRun::Skipped => summary.cancelled = true,
        }
    }

    /// Times out rules whose own budget ran out. A rule that has not started
    /// is never timed out.
    fn expire(&self, summary: &mut RunSummary, progress: &mut Progress, rules: &[Arc<dyn Rule>]) {
        let now = Instant::now();
        for (idx, rule) in rules.iter().enumerate() {
            let expired = progress.started_at[idx]
                .is_some_and(|at| now.duration_since(at) >= self.rule_timeout);
            if progress.reported[idx] || !expired {
                continue;
            }
            warn!(
                rule = rule.id(),
                timeout_ms = self.rule_timeout.as_millis() as u64,
                "rule timed out"
            );
            progress.reported[idx] = true;
            progress.pending -= 1;
            summary.timed_out.push(rule.id().to_string());
            summary.warnings.push(fault_warning(
                rule.id(),
                "timeout",
                &format!("no result within {} ms", self.rule_timeout.as_millis()),
            ));
        }
    }

    fn assemble(
        &self,
        request: &AgentRequest,
        summary: RunSummary,
        started: Instant,
    ) -> ValidationResult {
        let RunSummary {
            violations,
            warnings,
            scheduled,
            completed,
            failed,
            timed_out,
            ..
        } = summary;

        let mut result = ValidationResult::from_violations(violations, warnings);
        if scheduled == 0 {
            result.confidence = 0.0;
            result.reasoning =
                "No validation rules were executed. Request is approved by default.".to_string();
        } else {
            result.confidence = completed as f64 / scheduled as f64;
        }

        let meta = &mut result.metadata;
        meta.insert("rules_executed".into(), json!(scheduled));
        meta.insert("rules_completed".into(), json!(completed));
        meta.insert("rules_failed".into(), json!(failed));
        meta.insert("rules_timed_out".into(), json!(timed_out));
        meta.insert("request_id".into(), JsonValue::from(request.id.as_str()));
        meta.insert("agent_id".into(), JsonValue::from(request.agent_id.as_str()));

        result.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            request_id = %request.id,
            agent_id = %request.agent_id,
            status = %result.status,
            violations = result.violations.len(),
            warnings = result.warnings.len(),
            elapsed_ms = result.processing_time_ms,
            "validation finished"
        );
        if result.status == ValidationStatus::Escalated {
            info!(request_id = %request.id, "request escalated for human review");
        }
        result
    }

    fn read_rules(&self) -> std::sync::RwLockReadGuard<'_, Vec<RuleEntry>> {
        // A panic while holding the lock cannot leave the Vec half-edited.
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_rules(&self) -> std::sync::RwLockWriteGuard<'_, Vec<RuleEntry>> {
        self.rules.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn fault_warning(rule_id: &str, fault: &str, message: &str) -> Violation {
    Violation::new(
        rule_id,
        Severity::Low,
        format!("Rule {} did not complete: {}", rule_id, message),
    )
    .with_detail("fault", fault)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
