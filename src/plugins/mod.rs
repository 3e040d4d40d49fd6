//! Governance subsystems built on the core types.
//!
//! - `rules`: the default rule set evaluated by the engine
//! - `drift`: graph scans for specifications that fell out of sync
//! - `compliance`: per-subsystem compliance rate

pub mod compliance;
pub mod drift;
pub mod rules;
