
use thiserror::Error;

use crate::validity::Violation;

#[derive(Error, Debug)]
pub enum LifespanError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Unknown {kind} {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("Validation failed: {}", format_violations(.0))]
    Validation(Vec<Violation>),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, LifespanError>;

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// Helper conversions
impl From<rusqlite::Error> for LifespanError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
