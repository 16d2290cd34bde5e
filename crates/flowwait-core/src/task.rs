//! Task handles and status reports

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a long-running task on the control plane
///
/// Flow ids are integers; async request ids and deal names are text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Number(i64),
    Text(String),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Number(n) => write!(f, "{n}"),
            TaskId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        TaskId::Number(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId::Text(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        TaskId::Text(id)
    }
}

/// Normalized task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Reference to a task that must be polled to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: TaskId,
    /// Action used to query the task's status
    pub status_action: String,
    /// Operation that created the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl TaskHandle {
    pub fn new(id: impl Into<TaskId>, status_action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_action: status_action.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// One observation of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: TaskStatus,
    /// Raw status code as returned by the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusReport {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            code: None,
            progress: None,
            detail: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Mapping from raw status codes to [`TaskStatus`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMap {
    codes: HashMap<String, TaskStatus>,
}

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running<I, S>(self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_all(codes, TaskStatus::Running)
    }

    pub fn succeeded<I, S>(self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_all(codes, TaskStatus::Succeeded)
    }

    pub fn failed<I, S>(self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_all(codes, TaskStatus::Failed)
    }

    fn insert_all<I, S>(mut self, codes: I, status: TaskStatus) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for code in codes {
            self.codes.insert(code.into(), status);
        }
        self
    }

    /// Numeric flow status: 0 succeeded, 1 failed, 2 running
    pub fn flow() -> Self {
        Self::new().succeeded(["0"]).failed(["1"]).running(["2"])
    }

    /// Textual async request status
    pub fn async_request() -> Self {
        Self::new()
            .succeeded(["SUCCESS"])
            .running(["INITIAL", "RUNNING"])
            .failed(["FAILED", "KILLED", "REMOVED", "PAUSED"])
    }

    /// `None` when the code is not mapped
    pub fn resolve(&self, code: &str) -> Option<TaskStatus> {
        self.codes.get(code).copied()
    }
}

/// Result of a mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    /// The call finished synchronously
    Complete(T),
    /// The call returned a handle that must be polled
    Pending(TaskHandle),
}

impl<T> Submission<T> {
    pub fn task(&self) -> Option<&TaskHandle> {
        match self {
            Submission::Pending(handle) => Some(handle),
            Submission::Complete(_) => None,
        }
    }
}
