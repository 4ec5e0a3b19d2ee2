use crate::task::{Task, TaskKind};
use crate::worker::context::ExecutionContext;
use crate::worker::instance::WorkerInstance;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Behaviour behind a template. Supplied by the embedding application.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn execute(&self, task: &Task, context: &ExecutionContext) -> anyhow::Result<Value>;

    /// Runs once when an instance is created
    async fn setup(&self, _instance: &WorkerInstance) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once when an instance is destroyed
    async fn teardown(&self, _instance: &WorkerInstance) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Adapts an async closure into a [`WorkerExecutor`]
pub struct FnExecutor<F> {
    f: F,
}

impl<F, Fut> FnExecutor<F>
where
    F: Fn(Task, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> WorkerExecutor for FnExecutor<F>
where
    F: Fn(Task, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn execute(&self, task: &Task, context: &ExecutionContext) -> anyhow::Result<Value> {
        (self.f)(task.clone(), context.clone()).await
    }
}

/// Reusable definition of worker behaviour
#[derive(Clone)]
pub struct WorkerTemplate {
    pub id: String,
    pub name: String,
    pub version: String,
    pub supported_kinds: BTreeSet<TaskKind>,
    /// Higher wins when several templates support a kind
    pub priority: i32,
    pub capabilities: BTreeSet<String>,
    /// None falls back to the orchestrator default
    pub max_concurrent_tasks: Option<u32>,
    pub executor: Arc<dyn WorkerExecutor>,
}

impl WorkerTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, executor: Arc<dyn WorkerExecutor>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0.0".to_string(),
            supported_kinds: BTreeSet::new(),
            priority: 0,
            capabilities: BTreeSet::new(),
            max_concurrent_tasks: None,
            executor,
        }
    }

    /// Template backed by an async closure
    pub fn from_fn<F, Fut>(id: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Task, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(id, name, Arc::new(FnExecutor::new(f)))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = TaskKind>) -> Self {
        self.supported_kinds.extend(kinds);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capabilities<S: Into<String>>(mut self, capabilities: impl IntoIterator<Item = S>) -> Self {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_max_concurrent_tasks(mut self, limit: u32) -> Self {
        self.max_concurrent_tasks = Some(limit.max(1));
        self
    }

    pub fn supports(&self, kind: TaskKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    /// Percentage of `required` this template declares; 100 when nothing is required
    pub fn capability_match(&self, required: &BTreeSet<String>) -> u8 {
        if required.is_empty() {
            return 100;
        }
        let covered = required.intersection(&self.capabilities).count();
        ((covered * 100) / required.len()) as u8
    }
}

impl fmt::Debug for WorkerTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTemplate")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("supported_kinds", &self.supported_kinds)
            .field("priority", &self.priority)
            .field("capabilities", &self.capabilities)
            .field("max_concurrent_tasks", &self.max_concurrent_tasks)
            .finish()
    }
}
