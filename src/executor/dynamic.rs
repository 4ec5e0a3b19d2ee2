use crate::config::ExecutorConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::executor::api;
use crate::executor::handlers::HandlerRegistry;
use crate::executor::host::HostExecutor;
use crate::executor::safety::SafetyScanner;
use crate::executor::{CommandRunner, ExecutionCommand, ExecutorError};
use crate::synthesis::{ImplementationShape, ResourcePayload, SynthesizedResource};
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PROGRAM_CACHE_CAPACITY: u64 = 128;

/// Who is invoking a resource, recorded in the execution history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    pub caller: String,
    pub task_id: Option<TaskId>,
    pub instance_id: Option<String>,
}

impl InvocationContext {
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }
}

/// Outcome of one resource invocation. A failed command may carry both a result and an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub resource_id: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<ForgeError>,
    pub duration_ms: u64,
    /// Present for text payloads that passed the safety scan
    pub security_score: Option<u8>,
}

impl ExecutionOutcome {
    pub fn into_result(self) -> ForgeResult<Value> {
        match (self.success, self.error) {
            (true, _) => Ok(self.result.unwrap_or(Value::Null)),
            (false, Some(error)) => Err(error),
            (false, None) => Err(ForgeError::resource_execution(
                &self.resource_id,
                "execution failed without an error",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    pub resource_id: String,
    pub resource_name: String,
    pub shape: ImplementationShape,
    pub caller: String,
    pub task_id: Option<TaskId>,
    pub success: bool,
    pub error_code: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub total_executions: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_duration_ms: f64,
    /// 0.0 - 1.0
    pub success_rate: f64,
}

/// Bounded history plus counters that cover every call ever made
#[derive(Default)]
struct HistoryState {
    entries: VecDeque<ExecutionHistoryEntry>,
    total: usize,
    successful: usize,
    total_duration_ms: u64,
}

impl HistoryState {
    fn record(&mut self, entry: ExecutionHistoryEntry, limit: usize) {
        self.total += 1;
        if entry.success {
            self.successful += 1;
        }
        self.total_duration_ms += entry.duration_ms;

        if limit == 0 {
            return;
        }
        self.entries.push_back(entry);
        while self.entries.len() > limit {
            self.entries.pop_front();
        }
    }
}

#[derive(Default)]
struct Dispatch {
    result: Option<Value>,
    error: Option<ForgeError>,
    security_score: Option<u8>,
}

impl Dispatch {
    fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    fn failed(error: ForgeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Executes synthesized resources by implementation shape
pub struct DynamicExecutor {
    config: ExecutorConfig,
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
    scanner: SafetyScanner,
    handlers: HandlerRegistry,
    program_paths: Cache<String, PathBuf>,
    history: Mutex<HistoryState>,
}

impl DynamicExecutor {
    pub fn new(config: ExecutorConfig) -> ForgeResult<Self> {
        let http = api::build_client(config.http_timeout())?;
        Ok(Self {
            scanner: SafetyScanner::new(config.block_severity),
            program_paths: Cache::builder()
                .max_capacity(PROGRAM_CACHE_CAPACITY)
                .time_to_live(config.program_cache_ttl())
                .build(),
            runner: Arc::new(HostExecutor::new()),
            handlers: HandlerRegistry::with_builtins(),
            history: Mutex::new(HistoryState::default()),
            http,
            config,
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn scanner(&self) -> &SafetyScanner {
        &self.scanner
    }

    /// Run `resource` with `params`. Always returns an outcome and always records history.
    pub async fn execute(
        &self,
        resource: &SynthesizedResource,
        params: Value,
        context: &InvocationContext,
    ) -> ExecutionOutcome {
        debug!(
            "Executing resource {} ({}) for {}",
            resource.id, resource.shape, context.caller
        );
        let started = Instant::now();

        let dispatch = match params_object(&resource.id, params) {
            Ok(params) => self.dispatch(resource, params).await,
            Err(error) => Dispatch::failed(error),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let success = dispatch.error.is_none();
        let error = dispatch.error.map(|error| {
            error
                .with_context("resource_name", &resource.name)
                .with_context("caller", &context.caller)
        });

        match &error {
            None => info!("Resource {} succeeded in {}ms", resource.id, duration_ms),
            Some(error) => warn!("Resource {} failed in {}ms: {}", resource.id, duration_ms, error),
        }

        let entry = ExecutionHistoryEntry {
            resource_id: resource.id.clone(),
            resource_name: resource.name.clone(),
            shape: resource.shape,
            caller: context.caller.clone(),
            task_id: context.task_id.clone(),
            success,
            error_code: error.as_ref().map(|error| error.code().to_string()),
            duration_ms,
            timestamp: Utc::now(),
        };
        self.history.lock().await.record(entry, self.config.history_limit);

        ExecutionOutcome {
            resource_id: resource.id.clone(),
            success,
            result: dispatch.result,
            error,
            duration_ms,
            security_score: dispatch.security_score,
        }
    }

    async fn dispatch(&self, resource: &SynthesizedResource, params: Map<String, Value>) -> Dispatch {
        match (&resource.shape, &resource.payload) {
            (ImplementationShape::Function | ImplementationShape::ClassLike, ResourcePayload::Source { entry, code, .. }) => {
                self.run_source(resource, entry, code, params).await
            }
            (
                ImplementationShape::CommandWrapper,
                ResourcePayload::Command {
                    program,
                    base_args,
                    timeout_secs,
                },
            ) => {
                let timeout = timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.config.command_timeout());
                self.run_command(resource, program, base_args, timeout, &params).await
            }
            (
                ImplementationShape::ApiWrapper,
                ResourcePayload::Api {
                    base_url,
                    method,
                    headers,
                },
            ) => self.run_api(resource, base_url, method, headers, &params).await,
            (_, ResourcePayload::Hook(_)) => Dispatch::failed(ForgeError::resource_execution(
                &resource.id,
                "hook resources run through the hook manager, not the dynamic executor",
            )),
            (shape, _) => Dispatch::failed(ForgeError::resource_execution(
                &resource.id,
                format!("payload does not match implementation shape {}", shape),
            )),
        }
    }

    async fn run_source(
        &self,
        resource: &SynthesizedResource,
        entry: &str,
        code: &str,
        params: Map<String, Value>,
    ) -> Dispatch {
        let report = match self.scanner.check(&resource.id, code) {
            Ok(report) => report,
            Err(error) => return Dispatch::failed(error),
        };

        let Some(handler) = self.handlers.get(entry) else {
            return Dispatch {
                error: Some(
                    ForgeError::resource_execution(
                        &resource.id,
                        format!(
                            "no capability handler named '{}' (registered: {})",
                            entry,
                            self.handlers.names().join(", ")
                        ),
                    )
                    .with_context("entry", entry),
                ),
                security_score: Some(report.score),
                ..Default::default()
            };
        };

        let mut dispatch = match handler.invoke(resource, Value::Object(params)).await {
            Ok(result) => Dispatch::ok(result),
            Err(e) => Dispatch::failed(
                ForgeError::resource_execution(&resource.id, format!("{:#}", e)).with_context("entry", entry),
            ),
        };
        dispatch.security_score = Some(report.score);
        dispatch
    }

    async fn run_command(
        &self,
        resource: &SynthesizedResource,
        program: &str,
        base_args: &[String],
        timeout: Duration,
        params: &Map<String, Value>,
    ) -> Dispatch {
        let program_path = match self.resolve_program(&resource.id, program).await {
            Ok(path) => path,
            Err(error) => return Dispatch::failed(error),
        };

        let mut args = base_args.to_vec();
        args.extend(params_to_flags(params));
        let command = ExecutionCommand::new(program_path.to_string_lossy(), args).with_timeout(timeout);
        debug!("Resource {} runs `{}`", resource.id, command.display());

        let started = Instant::now();
        match self.runner.execute(command).await {
            Ok(output) => {
                let result = json!({
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                    "exit_code": output.exit_code,
                });
                if output.success() {
                    Dispatch::ok(result)
                } else {
                    Dispatch {
                        result: Some(result),
                        error: Some(
                            ForgeError::resource_execution(
                                &resource.id,
                                format!("{} exited with code {}: {}", program, output.exit_code, output.stderr.trim()),
                            )
                            .with_context("exit_code", output.exit_code),
                        ),
                        security_score: None,
                    }
                }
            }
            Err(ExecutorError::Timeout(limit)) => Dispatch::failed(
                ForgeError::timeout(&format!("command {}", program), limit, started.elapsed())
                    .with_context("resource_id", &resource.id),
            ),
            Err(error) => {
                let error: ForgeError = error.into();
                Dispatch::failed(error.with_context("resource_id", &resource.id))
            }
        }
    }

    async fn run_api(
        &self,
        resource: &SynthesizedResource,
        base_url: &str,
        method: &str,
        headers: &std::collections::BTreeMap<String, String>,
        params: &Map<String, Value>,
    ) -> Dispatch {
        let request = match api::build_request(&resource.id, base_url, method, headers, params) {
            Ok(request) => request,
            Err(error) => return Dispatch::failed(error),
        };
        let response = match api::send(&self.http, &resource.id, request, self.config.http_timeout()).await {
            Ok(response) => response,
            Err(error) => return Dispatch::failed(error),
        };

        let success = response.success();
        let result = json!({ "status": response.status, "body": response.body });
        if success {
            Dispatch::ok(result)
        } else {
            Dispatch {
                result: Some(result),
                error: Some(
                    ForgeError::resource_execution(
                        &resource.id,
                        format!("request returned status {}", response.status),
                    )
                    .with_context("status", response.status),
                ),
                security_score: None,
            }
        }
    }

    /// Absolute path for `program`, memoized per program name
    async fn resolve_program(&self, resource_id: &str, program: &str) -> ForgeResult<PathBuf> {
        if program.contains(std::path::MAIN_SEPARATOR) {
            return Ok(PathBuf::from(program));
        }
        if let Some(path) = self.program_paths.get(program).await {
            return Ok(path);
        }
        let path = which::which(program).map_err(|e| {
            ForgeError::resource_execution(resource_id, format!("program '{}' not found on PATH: {}", program, e))
                .with_context("program", program)
        })?;
        self.program_paths.insert(program.to_string(), path.clone()).await;
        Ok(path)
    }

    /// Most recent executions, oldest first, capped at `history_limit`
    pub async fn history(&self) -> Vec<ExecutionHistoryEntry> {
        self.history.lock().await.entries.iter().cloned().collect()
    }

    pub async fn statistics(&self) -> ExecutionStatistics {
        let history = self.history.lock().await;
        if history.total == 0 {
            return ExecutionStatistics::default();
        }
        let total = history.total;

        ExecutionStatistics {
            total_executions: total,
            successful: history.successful,
            failed: total - history.successful,
            average_duration_ms: history.total_duration_ms as f64 / total as f64,
            success_rate: history.successful as f64 / total as f64,
        }
    }
}

impl std::fmt::Debug for DynamicExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicExecutor")
            .field("config", &self.config)
            .field("runner", &self.runner.executor_type())
            .field("handlers", &self.handlers)
            .finish()
    }
}

fn params_object(resource_id: &str, params: Value) -> ForgeResult<Map<String, Value>> {
    match params {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(ForgeError::resource_execution(
            resource_id,
            format!("parameters must be a JSON object, got {}", other),
        )),
    }
}

/// Serialize parameters to command-line flags.
///
/// `true` becomes `--key`, `false` and null are omitted, arrays repeat the flag and
/// everything else becomes `--key value`.
pub fn params_to_flags(params: &Map<String, Value>) -> Vec<String> {
    fn scalar(value: &Value) -> String {
        match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    let mut flags = Vec::new();
    for (key, value) in params {
        let flag = format!("--{}", key);
        match value {
            Value::Bool(true) => flags.push(flag),
            Value::Bool(false) | Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    flags.push(flag.clone());
                    flags.push(scalar(item));
                }
            }
            other => {
                flags.push(flag);
                flags.push(scalar(other));
            }
        }
    }
    flags
}
