//! Flow / async request status tracking
//!
//! Queries a status action with the task id under a configurable field and maps
//! the raw status code through a [`StatusMap`]. Failed tasks can be explained by
//! an optional diagnostic action (e.g. a switch-error lookup keyed by an error
//! key).

use async_trait::async_trait;
use flowwait_core::{StatusMap, StatusReport, TaskHandle, TaskId, TaskTracker, Transport, TransportError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STATUS_ACTION: &str = "DescribeFlow";
pub const DEFAULT_ID_FIELD: &str = "FlowId";

/// Lookup that explains a failed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub action: String,
    /// Request field carrying the task id
    pub id_field: String,
    /// Sent as `ErrorKey` when set
    pub error_key: Option<String>,
}

impl Diagnostic {
    pub fn new(action: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            id_field: id_field.into(),
            error_key: None,
        }
    }

    pub fn with_error_key(mut self, key: impl Into<String>) -> Self {
        self.error_key = Some(key.into());
        self
    }
}

/// [`TaskTracker`] backed by status actions on a [`Transport`]
pub struct FlowTracker<T> {
    transport: Arc<T>,
    status_action: String,
    id_field: String,
    statuses: StatusMap,
    diagnostic: Option<Diagnostic>,
    interval: Option<Duration>,
}

impl<T: Transport> FlowTracker<T> {
    /// Numeric flow tracker: `DescribeFlow` with `FlowId`
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            status_action: DEFAULT_STATUS_ACTION.to_string(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            statuses: StatusMap::flow(),
            diagnostic: None,
            interval: None,
        }
    }

    pub fn with_status_action(mut self, action: impl Into<String>, id_field: impl Into<String>) -> Self {
        self.status_action = action.into();
        self.id_field = id_field.into();
        self
    }

    pub fn with_statuses(mut self, statuses: StatusMap) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn status_action(&self) -> &str {
        &self.status_action
    }

    /// Handle for a task id returned by a mutating call
    pub fn handle(&self, id: impl Into<TaskId>) -> TaskHandle {
        TaskHandle::new(id, self.status_action.clone())
    }

    fn to_report(&self, action: &str, response: StatusResponse) -> Result<Option<StatusReport>, TransportError> {
        let Some(raw) = response.status else {
            return Ok(None);
        };
        let code = raw.to_string();
        let status = self.statuses.resolve(&code).ok_or_else(|| {
            TransportError::Decode(format!("unexpected task status {code:?} from {action}"))
        })?;

        let mut report = StatusReport::new(status).with_code(code);
        if let Some(progress) = response.progress {
            report = report.with_progress(progress.clamp(0.0, 100.0) as u8);
        }
        if let Some(message) = response.message.filter(|m| !m.is_empty()) {
            report = report.with_detail(message);
        }
        Ok(Some(report))
    }
}

fn id_request(field: &str, id: &TaskId) -> Value {
    let mut request = Map::new();
    let id = match id {
        TaskId::Number(n) => Value::from(*n),
        TaskId::Text(s) => Value::from(s.as_str()),
    };
    request.insert(field.to_string(), id);
    Value::Object(request)
}

#[async_trait]
impl<T: Transport> TaskTracker for FlowTracker<T> {
    async fn query(&self, handle: &TaskHandle) -> Result<Option<StatusReport>, TransportError> {
        let request = id_request(&self.id_field, &handle.id);
        let response: StatusResponse = self.transport.call(&handle.status_action, &request).await?;
        self.to_report(&handle.status_action, response)
    }

    async fn diagnose(
        &self,
        handle: &TaskHandle,
        _report: &StatusReport,
    ) -> Result<Option<String>, TransportError> {
        let Some(diagnostic) = &self.diagnostic else {
            return Ok(None);
        };
        let mut request = id_request(&diagnostic.id_field, &handle.id);
        if let (Some(key), Value::Object(fields)) = (&diagnostic.error_key, &mut request) {
            fields.insert("ErrorKey".to_string(), Value::from(key.as_str()));
        }
        let response: DiagnosticResponse = self.transport.call(&diagnostic.action, &request).await?;
        Ok(response.message.filter(|m| !m.is_empty()))
    }

    fn diagnostic_action(&self) -> Option<&str> {
        self.diagnostic.as_ref().map(|d| d.action.as_str())
    }

    fn poll_interval(&self) -> Option<Duration> {
        self.interval
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RawStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawStatus::Number(n) => write!(f, "{n}"),
            RawStatus::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(rename = "Status", alias = "TaskStatus", alias = "FlowStatus", default)]
    status: Option<RawStatus>,
    #[serde(rename = "Progress", default)]
    progress: Option<f64>,
    #[serde(rename = "Info", alias = "Message", alias = "ErrMsg", default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiagnosticResponse {
    #[serde(rename = "ErrMsg", alias = "Message", alias = "Reason", default)]
    message: Option<String>,
}
