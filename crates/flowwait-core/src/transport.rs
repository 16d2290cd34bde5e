//! Transport call contract
//!
//! One request/response exchange against the control plane. Concrete wire
//! formats live in other crates (see `flowwait-http`); the engine only sees
//! typed requests, typed responses and [`TransportError`].

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure of a single transport call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never reached the control plane (connect, timeout, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status without a control-plane error envelope
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },

    /// The control plane accepted the request and answered with an error code
    #[error("[{code}] {message} (request id: {})", .request_id.as_deref().unwrap_or("-"))]
    Api {
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response did not match the expected shape
    #[error("response decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Shorthand for an API error without a request id
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// The control-plane error code, if the control plane produced one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// A request/response channel to the control plane
///
/// Implementations decode the response once, at this boundary, into the
/// caller's response type.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform `action` with `request` and decode the response
    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send;
}
