//! Async task poller
//!
//! Drives a [`TaskHandle`] to a terminal state:
//!
//! ```text
//! Submitted → Polling → Succeeded
//!                     → Failed    (with diagnostic)
//!                     → TimedOut  (outcome unknown)
//! ```

use crate::classify::ErrorClassifier;
use crate::context::{OperationContext, deadline_after};
use crate::error::{OperationError, Result};
use crate::rate::RateGate;
use crate::retry::{Attempt, RetryController, RetryError};
use crate::task::{StatusReport, TaskHandle, TaskStatus};
use crate::transport::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Resource-specific status query
#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Current status of the task; `Ok(None)` when the control plane has no
    /// record of it yet
    async fn query(&self, handle: &TaskHandle) -> std::result::Result<Option<StatusReport>, TransportError>;

    /// Human-readable reason for a failed task
    async fn diagnose(
        &self,
        _handle: &TaskHandle,
        _report: &StatusReport,
    ) -> std::result::Result<Option<String>, TransportError> {
        Ok(None)
    }

    /// Rate-gate tag of the diagnostic call, when different from the status action
    fn diagnostic_action(&self) -> Option<&str> {
        None
    }

    /// Poll interval override
    fn poll_interval(&self) -> Option<Duration> {
        None
    }
}

/// Lifecycle phase of a polled task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollPhase::Submitted => write!(f, "submitted"),
            PollPhase::Polling => write!(f, "polling"),
            PollPhase::Succeeded => write!(f, "succeeded"),
            PollPhase::Failed => write!(f, "failed"),
            PollPhase::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Polls task handles through the rate gate until a terminal status
#[derive(Debug, Clone)]
pub struct AsyncTaskPoller {
    gate: Arc<RateGate>,
    classifier: Arc<ErrorClassifier>,
    interval: Duration,
}

impl AsyncTaskPoller {
    pub fn new(gate: Arc<RateGate>, classifier: Arc<ErrorClassifier>, interval: Duration) -> Self {
        Self {
            gate,
            classifier,
            interval,
        }
    }

    /// Poll `handle` until it succeeds, fails, or `ctx`'s deadline passes
    pub async fn wait(
        &self,
        ctx: &OperationContext,
        handle: &TaskHandle,
        tracker: &dyn TaskTracker,
    ) -> Result<StatusReport> {
        let interval = tracker.poll_interval().unwrap_or(self.interval);
        tracing::info!(
            task = %handle.id,
            action = %handle.status_action,
            origin = handle.origin.as_deref().unwrap_or("-"),
            budget = ?ctx.remaining(),
            phase = %PollPhase::Submitted,
            "waiting for task"
        );

        let gate = &*self.gate;
        let classifier = &*self.classifier;
        let outcome = RetryController::new(interval)
            .run(ctx.deadline(), move || async move {
                gate.acquire(&handle.status_action).await;
                tracing::debug!(task = %handle.id, phase = %PollPhase::Polling, "querying task status");
                match tracker.query(handle).await {
                    Ok(Some(report)) if report.status == TaskStatus::Running => {
                        Attempt::Retry(match report.progress {
                            Some(progress) => format!("task {} running ({progress}%)", handle.id),
                            None => format!("task {} running", handle.id),
                        })
                    }
                    Ok(Some(report)) => Attempt::Done(report),
                    Ok(None) => Attempt::Retry(format!("task {} has no status yet", handle.id)),
                    Err(err) => Attempt::from_classified(Err(classifier.classify(err))),
                }
            })
            .await;

        let report = match outcome {
            Ok(report) => report,
            Err(RetryError::Fatal(err)) => {
                tracing::warn!(task = %handle.id, error = %err, "status query failed");
                return Err(OperationError::from_classified(ctx.operation(), err));
            }
            Err(RetryError::TimedOut {
                attempts,
                last_reason,
                ..
            }) => {
                tracing::warn!(
                    task = %handle.id,
                    phase = %PollPhase::TimedOut,
                    attempts,
                    "task did not reach a terminal status in time"
                );
                return Err(OperationError::TimedOut {
                    operation: ctx.operation().to_string(),
                    budget: ctx.budget(),
                    attempts,
                    last: last_reason,
                });
            }
        };

        if report.status == TaskStatus::Succeeded {
            tracing::info!(task = %handle.id, phase = %PollPhase::Succeeded, "task finished");
            return Ok(report);
        }

        let detail = self
            .failure_detail(ctx, interval, handle, &report, tracker)
            .await;
        tracing::warn!(task = %handle.id, phase = %PollPhase::Failed, detail = %detail, "task failed");
        Err(OperationError::TaskFailed {
            operation: ctx.operation().to_string(),
            task: handle.id.clone(),
            detail,
        })
    }

    /// Diagnostic text for a failed task, bounded by the poll deadline
    async fn failure_detail(
        &self,
        ctx: &OperationContext,
        interval: Duration,
        handle: &TaskHandle,
        report: &StatusReport,
        tracker: &dyn TaskTracker,
    ) -> String {
        let action = tracker
            .diagnostic_action()
            .unwrap_or(handle.status_action.as_str());
        let lookup = async {
            self.gate.acquire(action).await;
            tracker.diagnose(handle, report).await
        };

        let limit = deadline_after(ctx.deadline(), interval);
        let diagnostic = match tokio::time::timeout_at(limit, lookup).await {
            Ok(Ok(diagnostic)) => diagnostic,
            Ok(Err(err)) => {
                tracing::warn!(task = %handle.id, error = %err, "failed to fetch task diagnostic");
                None
            }
            Err(_) => {
                tracing::warn!(task = %handle.id, "task diagnostic did not answer before the deadline");
                None
            }
        };

        diagnostic
            .or_else(|| report.detail.clone())
            .unwrap_or_else(|| match &report.code {
                Some(code) => format!("task reported status {code}"),
                None => "task reported failure without detail".to_string(),
            })
    }
}
