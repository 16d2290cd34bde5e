use async_trait::async_trait;
use flowwait_core::{
    CompositeId, Created, ManagedResource, ResourceActions, StatusReport, Submission, TaskHandle,
    TaskStatus, TaskTracker, TransportError,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Canned responses; the last one repeats forever
pub struct Script<T> {
    steps: Mutex<VecDeque<T>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    pub fn new(steps: Vec<T>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().expect("unscripted call")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub type StatusStep = Result<Option<StatusReport>, TransportError>;

pub struct ScriptedTracker {
    pub statuses: Script<StatusStep>,
    pub diagnostic: Option<String>,
    pub diagnoses: AtomicUsize,
}

impl ScriptedTracker {
    pub fn new(steps: Vec<StatusStep>) -> Self {
        Self {
            statuses: Script::new(steps),
            diagnostic: None,
            diagnoses: AtomicUsize::new(0),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: &str) -> Self {
        self.diagnostic = Some(diagnostic.to_string());
        self
    }

    pub fn queries(&self) -> usize {
        self.statuses.calls()
    }
}

#[async_trait]
impl TaskTracker for ScriptedTracker {
    async fn query(&self, _handle: &TaskHandle) -> Result<Option<StatusReport>, TransportError> {
        self.statuses.next()
    }

    async fn diagnose(
        &self,
        _handle: &TaskHandle,
        _report: &StatusReport,
    ) -> Result<Option<String>, TransportError> {
        self.diagnoses.fetch_add(1, Ordering::SeqCst);
        Ok(self.diagnostic.clone())
    }

    fn diagnostic_action(&self) -> Option<&str> {
        Some("DescribeSwitchError")
    }
}

pub fn status(status: TaskStatus) -> StatusStep {
    Ok(Some(StatusReport::new(status)))
}

pub fn running(times: usize) -> Vec<StatusStep> {
    (0..times).map(|_| status(TaskStatus::Running)).collect()
}

pub fn api_error(code: &str) -> TransportError {
    TransportError::api(code, format!("{code} from fake control plane"))
}

pub fn flow(id: i64) -> TaskHandle {
    TaskHandle::new(id, "DescribeFlow")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Database {
    pub cluster_id: String,
    pub db_name: String,
    pub charset: String,
}

impl Database {
    pub fn new(charset: &str) -> Self {
        Self {
            cluster_id: "cls-1".to_string(),
            db_name: "orders".to_string(),
            charset: charset.to_string(),
        }
    }
}

pub struct DatabaseSpec {
    pub charset: String,
}

pub const ACTIONS: ResourceActions = ResourceActions {
    create: "CreateDatabase",
    read: "DescribeDatabase",
    update: "ModifyDatabase",
    delete: "DeleteDatabase",
};

/// Database addressed by `cluster_id#db_name`
pub struct FakeDatabase {
    pub creates: Script<Result<Created, TransportError>>,
    pub reads: Script<Result<Option<Database>, TransportError>>,
    pub updates: Script<Result<Submission<()>, TransportError>>,
    pub deletes: Script<Result<Submission<()>, TransportError>>,
    pub tracker: Option<ScriptedTracker>,
    pub multiplier: u32,
    pub extra_codes: Vec<&'static str>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self {
            creates: Script::new(vec![Ok(Created::complete(["cls-1", "orders"]))]),
            reads: Script::new(vec![Ok(Some(Database::new("utf8mb4")))]),
            updates: Script::new(vec![Ok(Submission::Complete(()))]),
            deletes: Script::new(vec![Ok(Submission::Complete(()))]),
            tracker: None,
            multiplier: 1,
            extra_codes: Vec::new(),
        }
    }

    pub fn with_tracker(mut self, tracker: ScriptedTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn tracker_queries(&self) -> usize {
        self.tracker.as_ref().map_or(0, ScriptedTracker::queries)
    }
}

#[async_trait]
impl ManagedResource for FakeDatabase {
    type Spec = DatabaseSpec;
    type Observed = Database;

    fn resource_type(&self) -> &str {
        "database"
    }

    fn id_fields(&self) -> usize {
        2
    }

    fn actions(&self) -> ResourceActions {
        ACTIONS
    }

    fn tracker(&self) -> Option<&dyn TaskTracker> {
        self.tracker.as_ref().map(|t| t as &dyn TaskTracker)
    }

    fn poll_multiplier(&self) -> u32 {
        self.multiplier
    }

    fn retryable_codes(&self) -> &[&str] {
        &self.extra_codes
    }

    async fn create(&self, _spec: &DatabaseSpec) -> Result<Created, TransportError> {
        self.creates.next()
    }

    async fn read(&self, id: &CompositeId) -> Result<Option<Database>, TransportError> {
        assert_eq!(id.len(), 2);
        self.reads.next()
    }

    async fn update(
        &self,
        _id: &CompositeId,
        _spec: &DatabaseSpec,
    ) -> Result<Submission<()>, TransportError> {
        self.updates.next()
    }

    async fn delete(&self, _id: &CompositeId) -> Result<Submission<()>, TransportError> {
        self.deletes.next()
    }
}
