//! Operation orchestrator
//!
//! Composes rate gate, transport call, classification, retry and polling into
//! the create / read / update / delete lifecycle of a managed resource:
//!
//! ```text
//! create:  mutate ─▶ [poll task] ─▶ read until visible ─▶ project
//! read:    parse id ─▶ read ─▶ project | clear
//! update:  parse id ─▶ mutate ─▶ [poll task] ─▶ read until visible ─▶ project
//! delete:  parse id ─▶ mutate ─▶ [poll task] ─▶ clear
//! ```

use crate::classify::{ClassifiedError, ErrorClass, ErrorClassifier};
use crate::config::{BudgetClass, EngineConfig};
use crate::context::OperationContext;
use crate::error::{OperationError, Result};
use crate::identity::{CompositeId, DEFAULT_SEPARATOR, IdentityError};
use crate::poller::{AsyncTaskPoller, TaskTracker};
use crate::rate::RateGate;
use crate::retry::{Attempt, RetryController, RetryError};
use crate::state::{LocalState, ResourceState};
use crate::task::{StatusReport, Submission, TaskHandle};
use crate::transport::TransportError;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Action names of a resource's lifecycle calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceActions {
    pub create: &'static str,
    pub read: &'static str,
    pub update: &'static str,
    pub delete: &'static str,
}

/// Result of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Natural keys of the new resource, in id order
    pub id_fields: Vec<String>,
    /// Task to wait for before the resource is usable
    pub task: Option<TaskHandle>,
}

impl Created {
    pub fn complete<I, S>(id_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id_fields: id_fields.into_iter().map(Into::into).collect(),
            task: None,
        }
    }

    pub fn pending<I, S>(id_fields: I, task: TaskHandle) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task: Some(task),
            ..Self::complete(id_fields)
        }
    }
}

/// Outcome of a lifecycle operation
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The resource exists; its projected local state
    Present(ResourceState),
    /// The resource is gone and its local state was cleared
    Gone,
}

impl Applied {
    pub fn state(&self) -> Option<&ResourceState> {
        match self {
            Applied::Present(state) => Some(state),
            Applied::Gone => None,
        }
    }
}

/// Outcome of a custom action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    /// The call finished synchronously
    Immediate(T),
    /// The call returned a task that finished successfully
    Task(StatusReport),
}

/// A resource kind the orchestrator can drive
///
/// Implementations wrap typed transport calls; the orchestrator adds rate
/// limiting, retries, polling and state projection.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    /// Desired configuration
    type Spec: Send + Sync;
    /// Remote state as re-read after a change
    type Observed: Serialize + Send;

    fn resource_type(&self) -> &str;

    /// Number of natural keys in the composite id
    fn id_fields(&self) -> usize;

    fn separator(&self) -> char {
        DEFAULT_SEPARATOR
    }

    fn actions(&self) -> ResourceActions;

    /// Status query for tasks returned by this resource's calls
    fn tracker(&self) -> Option<&dyn TaskTracker> {
        None
    }

    /// Poll budget multiplier when the configuration names none
    fn poll_multiplier(&self) -> u32 {
        1
    }

    /// Codes treated as transient for this resource's calls only
    fn retryable_codes(&self) -> &[&str] {
        &[]
    }

    async fn create(&self, spec: &Self::Spec) -> std::result::Result<Created, TransportError>;

    /// `Ok(None)` when the resource does not exist
    async fn read(&self, id: &CompositeId) -> std::result::Result<Option<Self::Observed>, TransportError>;

    async fn update(
        &self,
        id: &CompositeId,
        spec: &Self::Spec,
    ) -> std::result::Result<Submission<()>, TransportError>;

    async fn delete(&self, id: &CompositeId) -> std::result::Result<Submission<()>, TransportError>;
}

/// Runs resource operations to completion
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    gate: Arc<RateGate>,
    classifier: Arc<ErrorClassifier>,
    poller: AsyncTaskPoller,
    retry: RetryController,
}

impl Orchestrator {
    /// Build from a validated configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let gate = Arc::new(RateGate::new(config.rate_limits.clone()));
        let classifier = Arc::new(
            ErrorClassifier::new()
                .with_retryable_codes(config.extra_retryable_codes.iter().cloned())
                .with_not_found_codes(config.extra_not_found_codes.iter().cloned()),
        );
        Ok(Self::with_shared(config, gate, classifier))
    }

    /// Build around a gate and classifier shared with other orchestrators
    pub fn with_shared(
        config: EngineConfig,
        gate: Arc<RateGate>,
        classifier: Arc<ErrorClassifier>,
    ) -> Self {
        let interval = config.timeouts.poll_interval;
        Self {
            poller: AsyncTaskPoller::new(Arc::clone(&gate), Arc::clone(&classifier), interval),
            retry: RetryController::new(interval),
            config: Arc::new(config),
            gate,
            classifier,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    /// Fresh context for `operation` with the budget of `class` × `multiplier`
    pub fn context(
        &self,
        operation: impl Into<String>,
        class: BudgetClass,
        multiplier: u32,
    ) -> OperationContext {
        OperationContext::new(operation, self.config.timeouts.budget(class, multiplier))
    }

    /// Perform a call through the rate gate, retrying transient failures
    /// until `ctx`'s deadline
    ///
    /// A not-found result surfaces as [`OperationError::NotFound`].
    pub async fn mutate<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        action: &str,
        extra_retryable: &[&str],
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let gate = &*self.gate;
        let classifier = &*self.classifier;
        let outcome = self
            .retry
            .run(ctx.deadline(), || {
                let pending = call();
                async move {
                    gate.acquire(action).await;
                    Attempt::from_classified(
                        pending
                            .await
                            .map_err(|err| classifier.classify_with(err, extra_retryable)),
                    )
                }
            })
            .await;
        outcome.map_err(|err| surface(ctx, err))
    }

    /// Read through the rate gate; a missing resource is `Ok(None)`
    pub async fn query<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        action: &str,
        extra_retryable: &[&str],
        mut call: F,
    ) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, TransportError>>,
    {
        let gate = &*self.gate;
        let classifier = &*self.classifier;
        let outcome = self
            .retry
            .run(ctx.deadline(), || {
                let pending = call();
                async move {
                    gate.acquire(action).await;
                    match pending.await {
                        Ok(observed) => Attempt::Done(observed),
                        Err(err) => {
                            let classified = classifier.classify_with(err, extra_retryable);
                            match classified.class {
                                ErrorClass::Retryable => Attempt::Retry(classified.to_string()),
                                ErrorClass::NotFound => Attempt::Done(None),
                                ErrorClass::Fatal => Attempt::Fail(classified),
                            }
                        }
                    }
                }
            })
            .await;
        outcome.map_err(|err| surface(ctx, err))
    }

    /// Read through the rate gate until the resource is visible
    ///
    /// Used after a change: an empty or not-found answer means the control
    /// plane has not caught up yet.
    pub async fn query_until_present<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        action: &str,
        extra_retryable: &[&str],
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, TransportError>>,
    {
        let gate = &*self.gate;
        let classifier = &*self.classifier;
        let outcome = self
            .retry
            .run(ctx.deadline(), || {
                let pending = call();
                async move {
                    gate.acquire(action).await;
                    match pending.await {
                        Ok(Some(observed)) => Attempt::Done(observed),
                        Ok(None) => Attempt::Retry(format!("{action} returned no result yet")),
                        Err(err) => {
                            let classified = classifier.classify_with(err, extra_retryable);
                            match classified.class {
                                ErrorClass::Retryable | ErrorClass::NotFound => {
                                    Attempt::Retry(classified.to_string())
                                }
                                ErrorClass::Fatal => Attempt::Fail(classified),
                            }
                        }
                    }
                }
            })
            .await;
        outcome.map_err(|err| surface(ctx, err))
    }

    /// Poll `handle` to a terminal state within `ctx`'s deadline
    pub async fn await_task(
        &self,
        ctx: &OperationContext,
        handle: &TaskHandle,
        tracker: &dyn TaskTracker,
    ) -> Result<StatusReport> {
        self.poller.wait(ctx, handle, tracker).await
    }

    /// Run a custom action (switch toggle, restart, renewal) to completion
    pub async fn run_action<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        action: &str,
        tracker: Option<&dyn TaskTracker>,
        call: F,
    ) -> Result<Completion<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Submission<T>, TransportError>>,
    {
        self.run_action_inner(ctx, action, tracker, call)
            .instrument(ctx.span())
            .await
    }

    async fn run_action_inner<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        action: &str,
        tracker: Option<&dyn TaskTracker>,
        call: F,
    ) -> Result<Completion<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Submission<T>, TransportError>>,
    {
        match self.mutate(ctx, action, &[], call).await? {
            Submission::Complete(value) => Ok(Completion::Immediate(value)),
            Submission::Pending(handle) => {
                let tracker = tracker.ok_or_else(|| missing_tracker(action, &handle))?;
                let poll_ctx = ctx.child(ctx.operation(), self.poll_budget(action, 1));
                let report = self.await_task(&poll_ctx, &handle, tracker).await?;
                Ok(Completion::Task(report))
            }
        }
    }

    /// Create the resource, wait for it and project its state
    pub async fn create<R: ManagedResource>(
        &self,
        resource: &R,
        spec: &R::Spec,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let ctx = self.context(resource.actions().create, BudgetClass::Write, 1);
        self.create_inner(&ctx, resource, spec, state)
            .instrument(ctx.span())
            .await
    }

    async fn create_inner<R: ManagedResource>(
        &self,
        ctx: &OperationContext,
        resource: &R,
        spec: &R::Spec,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let actions = resource.actions();
        let extra = resource.retryable_codes();

        let created = self
            .mutate(ctx, actions.create, extra, || resource.create(spec))
            .await?;
        if created.id_fields.len() != resource.id_fields() {
            let separator = resource.separator().to_string();
            return Err(IdentityError::FieldCount {
                raw: created.id_fields.join(separator.as_str()),
                expected: resource.id_fields(),
                found: created.id_fields.len(),
                separator: resource.separator(),
            }
            .into());
        }
        let id = CompositeId::with_separator(created.id_fields, resource.separator())?;
        tracing::info!(id = %id, resource_type = resource.resource_type(), "resource created");

        if let Some(handle) = &created.task {
            // record the id first; a failed or timed-out wait must not lose it
            state.apply(ResourceState::new(id.to_string(), resource.resource_type()));
            self.wait_for(ctx, resource, actions.create, handle).await?;
        }

        self.refresh(ctx, resource, &id, state).await
    }

    /// Re-read the resource and project it, or clear it when gone
    pub async fn read<R: ManagedResource>(
        &self,
        resource: &R,
        raw_id: &str,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let ctx = self.context(resource.actions().read, BudgetClass::Read, 1);
        self.read_inner(&ctx, resource, raw_id, state)
            .instrument(ctx.span())
            .await
    }

    async fn read_inner<R: ManagedResource>(
        &self,
        ctx: &OperationContext,
        resource: &R,
        raw_id: &str,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let id = CompositeId::parse_with(raw_id, resource.id_fields(), resource.separator())?;
        let observed = self
            .query(ctx, resource.actions().read, resource.retryable_codes(), || {
                resource.read(&id)
            })
            .await?;

        match observed {
            Some(observed) => project(resource, &id, &observed, state),
            None => Ok(clear(resource, raw_id, state)),
        }
    }

    /// Apply `spec` to an existing resource
    pub async fn update<R: ManagedResource>(
        &self,
        resource: &R,
        raw_id: &str,
        spec: &R::Spec,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let ctx = self.context(resource.actions().update, BudgetClass::Write, 1);
        self.update_inner(&ctx, resource, raw_id, spec, state)
            .instrument(ctx.span())
            .await
    }

    async fn update_inner<R: ManagedResource>(
        &self,
        ctx: &OperationContext,
        resource: &R,
        raw_id: &str,
        spec: &R::Spec,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let actions = resource.actions();
        let id = CompositeId::parse_with(raw_id, resource.id_fields(), resource.separator())?;

        let submission = match self
            .mutate(ctx, actions.update, resource.retryable_codes(), || {
                resource.update(&id, spec)
            })
            .await
        {
            Ok(submission) => submission,
            Err(err) if err.is_not_found() => return Ok(clear(resource, raw_id, state)),
            Err(err) => return Err(err),
        };

        if let Submission::Pending(handle) = &submission {
            self.wait_for(ctx, resource, actions.update, handle).await?;
        }

        self.refresh(ctx, resource, &id, state).await
    }

    /// Delete the resource; deleting a missing resource succeeds
    pub async fn delete<R: ManagedResource>(
        &self,
        resource: &R,
        raw_id: &str,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let ctx = self.context(resource.actions().delete, BudgetClass::Write, 1);
        self.delete_inner(&ctx, resource, raw_id, state)
            .instrument(ctx.span())
            .await
    }

    async fn delete_inner<R: ManagedResource>(
        &self,
        ctx: &OperationContext,
        resource: &R,
        raw_id: &str,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let actions = resource.actions();
        let id = CompositeId::parse_with(raw_id, resource.id_fields(), resource.separator())?;

        let submission = match self
            .mutate(ctx, actions.delete, resource.retryable_codes(), || {
                resource.delete(&id)
            })
            .await
        {
            Ok(submission) => submission,
            Err(err) if err.is_not_found() => {
                tracing::info!(id = raw_id, "resource already deleted");
                return Ok(clear(resource, raw_id, state));
            }
            Err(err) => return Err(err),
        };

        if let Submission::Pending(handle) = &submission {
            self.wait_for(ctx, resource, actions.delete, handle).await?;
        }

        tracing::info!(id = raw_id, resource_type = resource.resource_type(), "resource deleted");
        Ok(clear(resource, raw_id, state))
    }

    /// Read after a change until visible, then project
    async fn refresh<R: ManagedResource>(
        &self,
        ctx: &OperationContext,
        resource: &R,
        id: &CompositeId,
        state: &mut LocalState,
    ) -> Result<Applied> {
        let read_ctx = ctx.child(ctx.operation(), self.config.timeouts.budget(BudgetClass::Read, 1));
        let observed = self
            .query_until_present(
                &read_ctx,
                resource.actions().read,
                resource.retryable_codes(),
                || resource.read(id),
            )
            .await?;
        project(resource, id, &observed, state)
    }

    async fn wait_for<R: ManagedResource>(
        &self,
        ctx: &OperationContext,
        resource: &R,
        action: &str,
        handle: &TaskHandle,
    ) -> Result<StatusReport> {
        let tracker = resource
            .tracker()
            .ok_or_else(|| missing_tracker(action, handle))?;
        let budget = self.poll_budget(action, resource.poll_multiplier());
        let poll_ctx = ctx.child(ctx.operation(), budget);
        let handle = match &handle.origin {
            Some(_) => handle.clone(),
            None => handle.clone().with_origin(action),
        };
        self.await_task(&poll_ctx, &handle, tracker).await
    }

    /// Write budget scaled by the configured multiplier for `action`
    pub fn poll_budget(&self, action: &str, default_multiplier: u32) -> std::time::Duration {
        let multiplier = self
            .config
            .multiplier_for(action)
            .unwrap_or(default_multiplier);
        self.config.timeouts.budget(BudgetClass::Write, multiplier)
    }
}

fn surface(ctx: &OperationContext, err: RetryError<ClassifiedError>) -> OperationError {
    match err {
        RetryError::Fatal(classified) => OperationError::from_classified(ctx.operation(), classified),
        RetryError::TimedOut {
            attempts,
            last_reason,
            ..
        } => OperationError::TimedOut {
            operation: ctx.operation().to_string(),
            budget: ctx.budget(),
            attempts,
            last: last_reason,
        },
    }
}

fn missing_tracker(action: &str, handle: &TaskHandle) -> OperationError {
    OperationError::InvalidConfig(format!(
        "{action} returned task {} but no task tracker is configured",
        handle.id
    ))
}

fn project<R: ManagedResource>(
    resource: &R,
    id: &CompositeId,
    observed: &R::Observed,
    state: &mut LocalState,
) -> Result<Applied> {
    let projected = ResourceState::project(id.to_string(), resource.resource_type(), observed)?;
    Ok(Applied::Present(state.apply(projected).clone()))
}

fn clear<R: ManagedResource>(resource: &R, raw_id: &str, state: &mut LocalState) -> Applied {
    if state.remove_resource(resource.resource_type(), raw_id).is_some() {
        tracing::warn!(id = raw_id, resource_type = resource.resource_type(), "resource gone, local state cleared");
    }
    Applied::Gone
}
