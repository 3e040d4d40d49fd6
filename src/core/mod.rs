//! Core modules for specgate's governance decision path.
//!
//! Shared value types, the validation engine, the audit trail and the
//! request protocol live here. Independent scanners and the rule set live
//! in [`crate::plugins`].

pub mod adapter;
pub mod audit;
pub mod audit_store;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod graph;
pub mod models;
pub mod protocol;
pub mod request;
pub mod schemas;
pub mod time;
pub mod validate;
