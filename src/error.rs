//! Error types for optikv
//!
//! Provides a unified error type for all operations, covering transport
//! failures, namespace misuse, and conditional-operation rejections.

use thiserror::Error;

/// Result type alias using OptiError
pub type Result<T> = std::result::Result<T, OptiError>;

/// Unified error type for optikv operations
#[derive(Debug, Error)]
pub enum OptiError {
    // -------------------------------------------------------------------------
    // Transport Errors (fatal to the connection)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by an earlier transport failure")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Table Namespace Errors (recoverable, caller may retry with other input)
    // -------------------------------------------------------------------------
    #[error("table already exists")]
    TableExists,

    #[error("table not found")]
    TableNotFound,

    // -------------------------------------------------------------------------
    // Object Errors
    // -------------------------------------------------------------------------
    #[error("object not found")]
    ObjectNotFound,

    /// A reject rule matched the current object state.
    ///
    /// This is an expected control-flow outcome, not a fault: compare-and-swap
    /// loops branch on it and retry with refreshed expectations.
    /// `current_version` is the stored version at evaluation time, or `None`
    /// if no object existed at the key.
    #[error("operation rejected (current version: {current_version:?})")]
    Rejected { current_version: Option<u64> },

    // -------------------------------------------------------------------------
    // Server Errors
    // -------------------------------------------------------------------------
    #[error("server error: {0}")]
    Server(String),
}

impl OptiError {
    /// Whether this error is a reject-rule match.
    ///
    /// Callers running conditional-write retry loops treat rejection as a
    /// normal outcome and everything else as exceptional.
    pub fn is_rejected(&self) -> bool {
        matches!(self, OptiError::Rejected { .. })
    }

    /// The stored version carried by a rejection, if this is one and the
    /// object existed when the rule was evaluated.
    pub fn rejected_version(&self) -> Option<u64> {
        match self {
            OptiError::Rejected { current_version } => *current_version,
            _ => None,
        }
    }
}
