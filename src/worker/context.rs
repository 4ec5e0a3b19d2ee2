use crate::config::{CacheConfig, ForgeConfig};
use crate::error::{ErrorKind, ForgeError, ForgeResult};
use crate::executor::{CommandRunner, DynamicExecutor, ExecutionCommand, ExecutionResult, HostExecutor, InvocationContext};
use crate::hooks::HookManager;
use crate::retry::{RetryOutcome, RetryPolicy, retry_with_backoff};
use crate::synthesis::SynthesizedResource;
use crate::task::TaskId;
use moka::future::Cache;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// Caller-supplied sink for worker log lines
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Memoization cache shared by every context cloned from the same utils
pub type MemoCache = Cache<String, Value>;

fn memo_cache(capacity: usize, ttl: Option<Duration>) -> MemoCache {
    let mut builder = Cache::builder().max_capacity(capacity as u64);
    if let Some(ttl) = ttl {
        builder = builder.time_to_live(ttl);
    }
    builder.build()
}

/// Sleep, retry, memoization and subprocess helpers handed to worker executors
#[derive(Clone)]
pub struct ExecutionUtils {
    runner: Arc<dyn CommandRunner>,
    retry_policy: RetryPolicy,
    command_timeout: Duration,
    memo: Arc<MemoCache>,
}

impl ExecutionUtils {
    pub fn new(runner: Arc<dyn CommandRunner>, retry_policy: RetryPolicy, command_timeout: Duration) -> Self {
        let defaults = CacheConfig::default();
        Self {
            runner,
            retry_policy,
            command_timeout,
            memo: Arc::new(memo_cache(defaults.memo_capacity, defaults.memo_ttl())),
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(
            Arc::new(HostExecutor::new()),
            config.retry.to_policy(),
            config.executor.command_timeout(),
        )
        .with_memo_cache(Arc::new(memo_cache(config.cache.memo_capacity, config.cache.memo_ttl())))
    }

    pub fn with_memo_cache(mut self, memo: Arc<MemoCache>) -> Self {
        self.memo = memo;
        self
    }

    pub fn memo_cache(&self) -> &Arc<MemoCache> {
        &self.memo
    }

    /// Value for `key`, computing and caching it on a miss. Failures are not cached.
    pub async fn memoize<F, Fut>(&self, key: impl Into<String>, compute: F) -> ForgeResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ForgeResult<Value>>,
    {
        self.memo
            .try_get_with(key.into(), compute())
            .await
            .map_err(|error| error.as_ref().clone())
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Retry `op` under the configured policy
    pub async fn retry<T, F, Fut>(&self, operation: &str, op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ForgeResult<T>>,
    {
        retry_with_backoff(operation, &self.retry_policy, op).await
    }

    /// Run a subprocess with the configured timeout. A non-zero exit is not an error here.
    pub async fn run_command(&self, program: &str, args: &[&str]) -> ForgeResult<ExecutionResult> {
        self.execute(ExecutionCommand::new(program, args.iter().map(|arg| arg.to_string()).collect()))
            .await
    }

    /// Run a fully built command (working directory, environment, stdin).
    /// Commands without their own timeout get the configured one.
    pub async fn execute(&self, mut command: ExecutionCommand) -> ForgeResult<ExecutionResult> {
        if command.timeout.is_none() {
            command.timeout = Some(self.command_timeout);
        }
        debug!("Running command: {}", command.display());
        Ok(self.runner.execute(command).await?)
    }
}

impl fmt::Debug for ExecutionUtils {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionUtils")
            .field("runner", &self.runner.executor_type())
            .field("retry_policy", &self.retry_policy)
            .field("command_timeout", &self.command_timeout)
            .field("memo_entries", &self.memo.entry_count())
            .finish()
    }
}

/// Everything a worker executor may touch while running one task
#[derive(Clone)]
pub struct ExecutionContext {
    pub task_id: TaskId,
    pub instance_id: String,
    pub template_id: String,
    pub config: Arc<ForgeConfig>,
    pub hooks: Option<Arc<HookManager>>,
    pub utils: ExecutionUtils,
    pub dynamic: Option<Arc<DynamicExecutor>>,
    pub resources: Vec<Arc<SynthesizedResource>>,
    logger: Option<LogCallback>,
}

impl ExecutionContext {
    pub fn new(
        task_id: impl Into<TaskId>,
        instance_id: impl Into<String>,
        template_id: impl Into<String>,
        config: Arc<ForgeConfig>,
    ) -> Self {
        let utils = ExecutionUtils::from_config(&config);
        Self {
            task_id: task_id.into(),
            instance_id: instance_id.into(),
            template_id: template_id.into(),
            config,
            hooks: None,
            utils,
            dynamic: None,
            resources: Vec::new(),
            logger: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<HookManager>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_dynamic_executor(mut self, dynamic: Arc<DynamicExecutor>) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    pub fn with_resources(mut self, resources: Vec<Arc<SynthesizedResource>>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_utils(mut self, utils: ExecutionUtils) -> Self {
        self.utils = utils;
        self
    }

    pub fn with_logger(mut self, logger: LogCallback) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!("[{}/{}] {}", self.task_id, self.instance_id, message),
            LogLevel::Info => info!("[{}/{}] {}", self.task_id, self.instance_id, message),
            LogLevel::Warn => warn!("[{}/{}] {}", self.task_id, self.instance_id, message),
            LogLevel::Error => error!("[{}/{}] {}", self.task_id, self.instance_id, message),
        }
        if let Some(logger) = &self.logger {
            logger(level, message);
        }
    }

    /// Attached resource by name, latest attachment first
    pub fn resource(&self, name: &str) -> Option<&Arc<SynthesizedResource>> {
        self.resources.iter().rev().find(|resource| resource.name == name)
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|resource| resource.name.as_str()).collect()
    }

    /// Invoke an attached tool through the dynamic executor
    pub async fn invoke_resource(&self, name: &str, params: Value) -> ForgeResult<Value> {
        let resource = self.resource(name).ok_or_else(|| {
            ForgeError::new(
                ErrorKind::ResourceExecution,
                format!("resource '{}' is not attached to instance {}", name, self.instance_id),
            )
            .with_context("resource", name)
            .with_context("task_id", &self.task_id)
            .with_recoverable(false)
        })?;
        let dynamic = self.dynamic.as_ref().ok_or_else(|| {
            ForgeError::resource_execution(&resource.id, "no dynamic executor available in this context")
                .with_recoverable(false)
        })?;

        let invocation = InvocationContext::new(format!("worker:{}", self.template_id))
            .with_task(self.task_id.clone())
            .with_instance(self.instance_id.clone());
        dynamic.execute(resource, params, &invocation).await.into_result()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task_id)
            .field("instance_id", &self.instance_id)
            .field("template_id", &self.template_id)
            .field("hooks", &self.hooks.as_ref().map(|hooks| hooks.len()))
            .field("dynamic", &self.dynamic.is_some())
            .field("resources", &self.resource_names())
            .finish()
    }
}
