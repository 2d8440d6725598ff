//! Error types for Orderly Core

use thiserror::Error;

/// Result type alias using Orderly Error
pub type Result<T> = std::result::Result<T, Error>;

/// Orderly error types
#[derive(Error, Debug)]
pub enum Error {
    /// Planner output did not conform to the plan schema
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    /// The reasoning/tool loop cannot continue
    #[error("Orchestration error: {0}")]
    Orchestration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Short stable name of the error class, used in logs
    pub fn class(&self) -> &'static str {
        match self {
            Error::PlanParse(_) => "plan_parse",
            Error::Orchestration(_) => "orchestration",
            Error::Provider(_) => "provider",
            Error::Session(_) => "session",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }
}

/// Tool-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// The tool session is gone; nothing further can be invoked
    #[error("Tool registry unavailable: {0}")]
    Unavailable(String),

    /// Refused by the fallback policy before reaching the registry
    #[error("Blocked by policy: {0}")]
    Blocked(String),
}

impl ToolError {
    /// Whether this failure ends the whole run rather than one call
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Unavailable(_))
    }
}
