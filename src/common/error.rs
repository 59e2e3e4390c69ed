//! Typed errors for conditions that abort a run before verification starts.
//!
//! Violations are never errors; they are the output of a successful run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackcheckError {
    #[error("no target unit specified (use --target <crate>)")]
    MissingTarget,

    #[error("target unit `{0}` not found among analyzed packages")]
    TargetNotFound(String),

    #[error("label `{label}` declares {count} roots; exactly one is allowed")]
    DuplicateRoot { label: String, count: usize },

    #[error("unknown function `{0}` referenced by the call graph input")]
    UnknownFunction(String),

    #[error("invalid call graph: {0}")]
    InvalidGraph(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
