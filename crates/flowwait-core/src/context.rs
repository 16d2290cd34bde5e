//! Per-operation context

use std::time::Duration;
use tokio::time::Instant;
use tracing::Span;

/// Furthest a deadline is ever placed past its start; larger budgets saturate here
pub const MAX_DEADLINE_OFFSET: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `base + offset`, saturating instead of overflowing the clock
pub fn deadline_after(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset.min(MAX_DEADLINE_OFFSET))
        .unwrap_or(base)
}

/// Correlation id, name and deadline of one operation
///
/// Created per create/read/update/delete/action call; never persisted.
#[derive(Debug, Clone)]
pub struct OperationContext {
    correlation_id: String,
    operation: String,
    budget: Duration,
    deadline: Instant,
}

impl OperationContext {
    /// Start a new operation with a fresh correlation id
    pub fn new(operation: impl Into<String>, budget: Duration) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            budget,
            deadline: deadline_after(Instant::now(), budget),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Phase of the same operation with its own budget, starting now
    pub fn child(&self, operation: impl Into<String>, budget: Duration) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            operation: operation.into(),
            budget,
            deadline: deadline_after(Instant::now(), budget),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once expired
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Span carrying the correlation id for every log line of this operation
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "operation",
            correlation_id = %self.correlation_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_correlation_id() {
        let parent = OperationContext::new("CreateInstance", Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        let child = parent.child("CreateInstance/poll", Duration::from_secs(10));

        assert_eq!(child.correlation_id(), parent.correlation_id());
        assert_eq!(child.operation(), "CreateInstance/poll");
        assert_eq!(parent.remaining(), Duration::from_secs(6));
        assert_eq!(child.remaining(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let ctx = OperationContext::new("ReadInstance", Duration::from_secs(1))
            .with_correlation_id("req-1");
        assert_eq!(ctx.correlation_id(), "req-1");
        assert_eq!(ctx.remaining(), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_budget_saturates() {
        let ctx = OperationContext::new("wait", Duration::from_secs(u64::MAX));
        assert_eq!(ctx.budget(), Duration::from_secs(u64::MAX));
        assert_eq!(ctx.remaining(), MAX_DEADLINE_OFFSET);

        let child = ctx.child("wait/poll", Duration::MAX);
        assert_eq!(child.remaining(), MAX_DEADLINE_OFFSET);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = OperationContext::new("op", Duration::from_secs(1));
        let b = OperationContext::new("op", Duration::from_secs(1));
        assert_ne!(a.correlation_id(), b.correlation_id());
    }
}
