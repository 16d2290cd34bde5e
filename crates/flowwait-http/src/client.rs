//! reqwest-based JSON transport
//!
//! One POST per action; the response envelope is decoded once, here, into the
//! caller's response type.

use crate::error::{HttpError, Result};
use async_trait::async_trait;
use flowwait_core::{Transport, TransportError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ACTION_HEADER: &str = "X-Action";
const REGION_HEADER: &str = "X-Region";
/// Longest body excerpt kept in an HTTP error
const BODY_EXCERPT: usize = 512;

/// Connection settings for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub endpoint: String,
    pub region: Option<String>,
    pub token: Option<String>,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl HttpSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: None,
            token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("flowwait/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Read the bearer token from an environment variable
    pub fn with_token_from_env(self, var: &str) -> Result<Self> {
        let token = std::env::var(var).map_err(|_| HttpError::MissingEnvVar(var.to_string()))?;
        Ok(self.with_token(token))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// JSON-over-HTTP control-plane transport
pub struct HttpTransport {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        if !(settings.endpoint.starts_with("http://") || settings.endpoint.starts_with("https://")) {
            return Err(HttpError::InvalidEndpoint(settings.endpoint));
        }
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> std::result::Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let mut builder = self
            .client
            .post(&self.settings.endpoint)
            .header(ACTION_HEADER, action)
            .json(request);
        if let Some(region) = &self.settings.region {
            builder = builder.header(REGION_HEADER, region);
        }
        if let Some(token) = &self.settings.token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!(action, endpoint = %self.settings.endpoint, "sending request");
        let response = builder.send().await.map_err(send_error)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        tracing::trace!(action, status, "received response");

        decode_envelope(status, &body)
    }
}

fn send_error(err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

// ============ Envelope ============

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Decode a response body into `T`
///
/// An `Error` member in the envelope wins over the HTTP status. Use
/// [`serde::de::IgnoredAny`] for actions whose payload is not needed.
pub fn decode_envelope<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> std::result::Result<T, TransportError> {
    let success = (200..300).contains(&status);
    let http_error = || TransportError::Http {
        status,
        body: excerpt(body),
    };

    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !success => return Err(http_error()),
        Err(e) => return Err(TransportError::Decode(e.to_string())),
    };
    let Some(mut response) = envelope.response else {
        if success {
            return Err(TransportError::Decode("missing Response envelope".to_string()));
        }
        return Err(http_error());
    };

    let request_id = response
        .remove("RequestId")
        .and_then(|v| v.as_str().map(str::to_string));

    if let Some(error) = response.remove("Error") {
        let error: ApiErrorBody = serde_json::from_value(error)
            .map_err(|e| TransportError::Decode(format!("malformed Error member: {e}")))?;
        return Err(TransportError::Api {
            code: error.code,
            message: error.message,
            request_id,
        });
    }

    if !success {
        return Err(http_error());
    }

    serde_json::from_value(Value::Object(response)).map_err(|e| TransportError::Decode(e.to_string()))
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
