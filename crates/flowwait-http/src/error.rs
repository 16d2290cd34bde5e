//! HTTP transport error types

use thiserror::Error;

/// Errors raised while setting up the transport
///
/// Per-call failures are reported as `flowwait_core::TransportError`.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;
