//! Operation error types

use crate::classify::{ClassifiedError, ErrorClass};
use crate::identity::IdentityError;
use crate::task::TaskId;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by engine operations
#[derive(Error, Debug)]
pub enum OperationError {
    /// Permanent failure reported by the control plane, passed through verbatim
    #[error("{operation} failed: {source}")]
    Fatal {
        operation: String,
        #[source]
        source: TransportError,
    },

    /// The target does not exist
    #[error("{operation}: resource not found: {source}")]
    NotFound {
        operation: String,
        #[source]
        source: TransportError,
    },

    /// The task reached a definite failed state
    #[error("{operation} failed: task {task} reported failure: {detail}")]
    TaskFailed {
        operation: String,
        task: TaskId,
        detail: String,
    },

    /// The budget ran out before a terminal outcome was observed
    #[error(
        "{operation} did not finish within {budget:?} after {attempts} attempt(s); \
         outcome unknown, the operation may still complete (last: {last})"
    )]
    TimedOut {
        operation: String,
        budget: Duration,
        attempts: u32,
        last: String,
    },

    #[error("corrupt resource id: {0}")]
    CorruptId(#[from] IdentityError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("state projection error: {0}")]
    Projection(#[from] serde_json::Error),
}

impl OperationError {
    /// Build from a classified transport error
    pub fn from_classified(operation: impl Into<String>, err: ClassifiedError) -> Self {
        let operation = operation.into();
        match err.class {
            ErrorClass::NotFound => Self::NotFound {
                operation,
                source: err.source,
            },
            // a retryable error only reaches here when the caller chose to stop
            ErrorClass::Retryable | ErrorClass::Fatal => Self::Fatal {
                operation,
                source: err.source,
            },
        }
    }

    /// True only when the remote outcome is unknown
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The control-plane error code behind this error, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Fatal { source, .. } | Self::NotFound { source, .. } => source.code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OperationError>;
