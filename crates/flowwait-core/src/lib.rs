//! flowwait core engine
//!
//! This crate tracks mutating calls against a cloud control plane to
//! completion. A mutating call either answers with a final result or with a
//! task/flow handle; the engine retries transient failures, polls handles to a
//! terminal state and projects the re-read remote state into local state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Operation Orchestrator              │
//! │     create / read / update / delete / action     │
//! └───────┬──────────────────────────────┬──────────┘
//!         │                              │
//! ┌───────▼────────┐            ┌────────▼─────────┐
//! │ Retry          │            │ Async Task       │
//! │ Controller     │◄───────────┤ Poller           │
//! └───────┬────────┘            └────────┬─────────┘
//!         │                              │
//! ┌───────▼──────────────────────────────▼──────────┐
//! │  Rate Gate → Transport Call → Error Classifier   │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use flowwait_core::{EngineConfig, Orchestrator, LocalState};
//!
//! let orchestrator = Orchestrator::new(EngineConfig::default())?;
//! let mut state = LocalState::new();
//!
//! // `switch` implements ManagedResource
//! let applied = orchestrator.create(&switch, &spec, &mut state).await?;
//! ```

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod poller;
pub mod rate;
pub mod retry;
pub mod state;
pub mod task;
pub mod transport;

// Re-exports
pub use classify::{ClassifiedError, ErrorClass, ErrorClassifier};
pub use config::{BudgetClass, EngineConfig, RateLimitConfig, TimeoutConfig};
pub use context::OperationContext;
pub use error::{OperationError, Result};
pub use identity::{CompositeId, IdentityError};
pub use orchestrator::{Applied, Completion, Created, ManagedResource, Orchestrator, ResourceActions};
pub use poller::{AsyncTaskPoller, PollPhase, TaskTracker};
pub use rate::RateGate;
pub use retry::{Attempt, RetryController, RetryError};
pub use state::{LocalState, ResourceState};
pub use task::{StatusMap, StatusReport, Submission, TaskHandle, TaskId, TaskStatus};
pub use transport::{Transport, TransportError};
