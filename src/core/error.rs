use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Rule {rule} failed: {message}")]
    RuleExecution { rule: String, message: String },
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Validation cancelled before all rules reported")]
    Cancelled,
    #[error("Engine error: {0}")]
    EngineError(String),
}

impl GovernanceError {
    pub fn rule(rule: &str, message: impl Into<String>) -> Self {
        GovernanceError::RuleExecution {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}
