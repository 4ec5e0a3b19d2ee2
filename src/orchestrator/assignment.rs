use crate::cache::{CacheStats, TtlCache};
use crate::config::ForgeConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::executor::DynamicExecutor;
use crate::hooks::{HookContext, HookManager};
use crate::orchestrator::report::{AssignmentRecord, AssignmentReport, OrchestratorStatistics, ResourceBinding};
use crate::retry::{RetryOutcome, RetryPolicy, retry_with_backoff, with_timeout};
use crate::synthesis::{HookPhase, ResourceStore, ResourceSynthesizer, SynthesizedResource};
use crate::task::{AssignmentStrategy, ComplexityAnalysis, StrategyKind, Task, TaskAnalyzer, TaskId, select_strategy};
use crate::worker::{
    ExecutionContext, ExecutionUtils, InstanceExecutionRecord, LogCallback, WorkerInstance, WorkerRegistry,
    WorkerTemplate,
};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct StatsState {
    stats: OrchestratorStatistics,
    total_duration_ms: u64,
}

#[derive(Default)]
struct Synthesized {
    resources: Vec<Arc<SynthesizedResource>>,
    bindings: Vec<ResourceBinding>,
    skipped: Vec<String>,
}

struct Acquired {
    instance: WorkerInstance,
    strategy: AssignmentStrategy,
    strategy_used: StrategyKind,
    reused: bool,
}

/// Point in time a task was bound to an instance
#[derive(Clone, Copy)]
struct Bound {
    at: DateTime<Utc>,
    clock: Instant,
}

impl Bound {
    fn now() -> Self {
        Self {
            at: Utc::now(),
            clock: Instant::now(),
        }
    }
}

/// Top-level entry point: analyze, synthesize, decide, bind and execute, record.
///
/// Owns the analysis cache and the assignment history. The registry, resource store
/// and dynamic executor are shared handles supplied by the caller.
pub struct AssignmentOrchestrator {
    config: Arc<ForgeConfig>,
    analyzer: TaskAnalyzer,
    synthesizer: ResourceSynthesizer,
    registry: Arc<WorkerRegistry>,
    store: Arc<ResourceStore>,
    dynamic: Arc<DynamicExecutor>,
    hooks: HookManager,
    analysis_cache: TtlCache<TaskId, ComplexityAnalysis>,
    retry_policy: RetryPolicy,
    task_timeout: Duration,
    utils: ExecutionUtils,
    logger: Option<LogCallback>,
    history: Mutex<VecDeque<AssignmentRecord>>,
    stats: Mutex<StatsState>,
}

impl AssignmentOrchestrator {
    pub fn new(
        config: ForgeConfig,
        registry: Arc<WorkerRegistry>,
        store: Arc<ResourceStore>,
        dynamic: Arc<DynamicExecutor>,
        hooks: HookManager,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            analyzer: TaskAnalyzer::new(),
            synthesizer: ResourceSynthesizer::new(),
            analysis_cache: TtlCache::new(config.cache.analysis_capacity, config.cache.analysis_ttl()),
            retry_policy: config.retry.to_policy(),
            task_timeout: config.orchestrator.task_timeout(),
            utils: ExecutionUtils::from_config(&config),
            logger: None,
            history: Mutex::new(VecDeque::new()),
            stats: Mutex::new(StatsState::default()),
            registry,
            store,
            dynamic,
            hooks,
            config,
        }
    }

    /// Orchestrator with a fresh registry, store and dynamic executor built from `config`
    pub fn from_config(config: ForgeConfig) -> ForgeResult<Self> {
        let registry = Arc::new(WorkerRegistry::new(config.orchestrator.max_concurrent_tasks));
        let dynamic = Arc::new(DynamicExecutor::new(config.executor.clone())?);
        Ok(Self::new(
            config,
            registry,
            Arc::new(ResourceStore::new()),
            dynamic,
            HookManager::new(),
        ))
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_utils(mut self, utils: ExecutionUtils) -> Self {
        self.utils = utils;
        self
    }

    /// Forwarded to every worker's execution context
    pub fn with_logger(mut self, logger: LogCallback) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    pub fn dynamic_executor(&self) -> &Arc<DynamicExecutor> {
        &self.dynamic
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookManager {
        &mut self.hooks
    }

    /// Assign `task` to a worker and run it
    pub async fn assign(&self, task: &Task) -> ForgeResult<AssignmentReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!("Assigning task {} ({}): {}", task.id, task.kind, task.title);

        let outcome = self.run_assignment(task, started_at, started).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(report) => info!(
                "Task {} completed on instance {} via {} in {}ms",
                task.id, report.instance_id, report.strategy_used, duration_ms
            ),
            Err(e) => error!("Task {} failed after {}ms: {}", task.id, duration_ms, e),
        }

        self.record(AssignmentRecord::from_outcome(&task.id, &outcome, started_at, duration_ms))
            .await;
        outcome
    }

    /// [`assign`](Self::assign) under the configured retry policy; only recoverable failures are retried
    pub async fn assign_with_retry(&self, task: &Task) -> RetryOutcome<AssignmentReport> {
        let operation = format!("assign task {}", task.id);
        retry_with_backoff(&operation, &self.retry_policy, |attempt| {
            if attempt > 1 {
                debug!("Retrying assignment of task {} (attempt {})", task.id, attempt);
            }
            self.assign(task)
        })
        .await
    }

    async fn run_assignment(
        &self,
        task: &Task,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> ForgeResult<AssignmentReport> {
        // Analyze
        let (analysis, analysis_cached) = self.cached_analysis(task).await?;
        if analysis_cached {
            self.bump(|stats| stats.analysis_cache_hits += 1).await;
        }
        debug!(
            "Task {} scored {} ({}), capabilities: {:?}",
            task.id, analysis.score, analysis.category, analysis.capabilities
        );

        // Synthesize
        let synthesized = self.synthesize_requirements(task, &analysis).await?;

        // Decide
        let acquired = self.acquire_instance(task, &analysis).await?;
        let bound = Bound::now();
        let instance_id = acquired.instance.id.clone();
        self.bump(|stats| {
            if acquired.reused {
                stats.instances_reused += 1;
            } else {
                stats.instances_created += 1;
            }
        })
        .await;

        // Bind & execute
        let Some(template) = self.registry.template(&acquired.instance.template_id).await else {
            let error = ForgeError::no_template(task.kind)
                .with_context("instance_id", &instance_id)
                .with_context("template_id", &acquired.instance.template_id);
            self.release(task, &instance_id, bound, Some(&error)).await;
            return Err(error);
        };

        let hooks = Arc::new(
            self.hooks
                .extended(synthesized.resources.iter().map(|resource| resource.as_ref())),
        );
        let attached = self
            .attach(&hooks, task, &instance_id, bound, acquired.strategy_used, &synthesized.resources)
            .await?;

        let pre_hooks = match hooks
            .run_pre(&HookContext::new(task.clone(), &instance_id, HookPhase::Pre))
            .await
        {
            Ok(summary) => summary,
            Err(error) => {
                let error = error.with_context("strategy", acquired.strategy_used);
                self.abort(&hooks, task, &instance_id, bound, &error).await;
                return Err(error);
            }
        };

        let mut context = ExecutionContext::new(task.id.clone(), &instance_id, &template.id, self.config.clone())
            .with_hooks(hooks.clone())
            .with_dynamic_executor(self.dynamic.clone())
            .with_resources(attached)
            .with_utils(self.utils.clone());
        if let Some(logger) = &self.logger {
            context = context.with_logger(logger.clone());
        }

        let output = match self.execute(&template, task, &context).await {
            Ok(output) => output,
            Err(error) => {
                let error = error
                    .with_context("instance_id", &instance_id)
                    .with_context("strategy", acquired.strategy_used);
                self.abort(&hooks, task, &instance_id, bound, &error).await;
                return Err(error);
            }
        };

        let post_hooks = hooks
            .run_post(&HookContext::new(task.clone(), &instance_id, HookPhase::Post).with_output(output.clone()))
            .await;
        self.release(task, &instance_id, bound, None).await;

        Ok(AssignmentReport {
            task_id: task.id.clone(),
            instance_id,
            template_id: template.id.clone(),
            analysis,
            analysis_cached,
            strategy: acquired.strategy,
            strategy_used: acquired.strategy_used,
            instance_reused: acquired.reused,
            resources: synthesized.bindings,
            skipped_resources: synthesized.skipped,
            pre_hooks,
            post_hooks,
            output,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn cached_analysis(&self, task: &Task) -> ForgeResult<(ComplexityAnalysis, bool)> {
        if let Some(analysis) = self.analysis_cache.get(&task.id).await {
            debug!("Analysis cache hit for task {}", task.id);
            return Ok((analysis, true));
        }
        let analysis = self.analyzer.analyze(task)?;
        self.analysis_cache.set(task.id.clone(), analysis.clone()).await;
        Ok((analysis, false))
    }

    /// Analysis for `task`, computed at most once per task id until invalidated
    pub async fn analysis_for(&self, task: &Task) -> ForgeResult<ComplexityAnalysis> {
        Ok(self.cached_analysis(task).await?.0)
    }

    pub async fn invalidate_analysis(&self, task_id: &str) -> bool {
        self.analysis_cache.delete(&task_id.to_string()).await
    }

    pub async fn clear_analysis_cache(&self) {
        self.analysis_cache.clear().await;
    }

    pub async fn analysis_cache_stats(&self) -> CacheStats {
        self.analysis_cache.stats().await
    }

    async fn synthesize_requirements(&self, task: &Task, analysis: &ComplexityAnalysis) -> ForgeResult<Synthesized> {
        let threshold = self.config.orchestrator.synthesis_priority_threshold;
        let mut synthesized = Synthesized::default();

        let requirements = self.analyzer.required_resources(analysis);
        for requirement in requirements.iter().filter(|req| req.is_required(threshold)) {
            if let Some(existing) = self.store.find_by_name(&requirement.name)
                && existing.category == requirement.category
            {
                debug!("Reusing resource {} ({}) for task {}", existing.id, existing.name, task.id);
                synthesized.bindings.push(ResourceBinding {
                    id: existing.id.clone(),
                    name: existing.name.clone(),
                    category: existing.category,
                    reused: true,
                });
                synthesized.resources.push(existing);
                self.bump(|stats| stats.resources_reused += 1).await;
                continue;
            }

            match self.synthesizer.synthesize(requirement) {
                Ok(resource) => {
                    let resource = self.store.insert(resource);
                    synthesized.bindings.push(ResourceBinding {
                        id: resource.id.clone(),
                        name: resource.name.clone(),
                        category: resource.category,
                        reused: false,
                    });
                    synthesized.resources.push(resource);
                    self.bump(|stats| stats.resources_created += 1).await;
                }
                Err(error) if requirement.critical => {
                    return Err(error.with_context("task_id", &task.id));
                }
                Err(error) => {
                    warn!(
                        "Skipping optional resource {} for task {}: {}",
                        requirement.name, task.id, error
                    );
                    synthesized.skipped.push(requirement.name.clone());
                }
            }
        }

        Ok(synthesized)
    }

    async fn acquire_instance(&self, task: &Task, analysis: &ComplexityAnalysis) -> ForgeResult<Acquired> {
        let template = self
            .registry
            .find_best(task.kind)
            .await
            .ok_or_else(|| ForgeError::no_template(task.kind).with_context("task_id", &task.id))?;
        let match_score = self.registry.match_score(task.kind, &analysis.capabilities).await;
        let strategy = select_strategy(analysis, match_score)?;
        info!(
            "Task {} strategy {} (confidence {}%, template match {}): {}",
            task.id, strategy.kind, strategy.confidence, match_score, strategy.reason
        );

        let steps: Vec<StrategyKind> = strategy.chain().map(|step| step.kind).collect();
        for step in steps {
            if let Some(min_match) = step.min_match() {
                let claimed = self
                    .registry
                    .claim_reusable(task.kind, &analysis.capabilities, min_match, &task.id)
                    .await;
                if let Some(instance) = claimed {
                    info!("Reusing instance {} for task {}", instance.id, task.id);
                    return Ok(Acquired {
                        instance,
                        strategy,
                        strategy_used: step,
                        reused: true,
                    });
                }
                if step == StrategyKind::ReuseExisting {
                    debug!("No reusable instance for task {}, falling back", task.id);
                    continue;
                }
            }

            let instance = self.create_instance(&template, task, step).await?;
            return Ok(Acquired {
                instance,
                strategy,
                strategy_used: step,
                reused: false,
            });
        }

        let instance = self.create_instance(&template, task, StrategyKind::CreateNew).await?;
        Ok(Acquired {
            instance,
            strategy,
            strategy_used: StrategyKind::CreateNew,
            reused: false,
        })
    }

    async fn create_instance(
        &self,
        template: &WorkerTemplate,
        task: &Task,
        step: StrategyKind,
    ) -> ForgeResult<WorkerInstance> {
        self.registry
            .create_claimed(&template.id, &task.id)
            .await
            .map_err(|error| error.with_context("task_id", &task.id).with_context("strategy", step))
    }

    async fn execute(
        &self,
        template: &WorkerTemplate,
        task: &Task,
        context: &ExecutionContext,
    ) -> ForgeResult<serde_json::Value> {
        let operation = format!("execute task {}", task.id);
        let executed = with_timeout(&operation, self.task_timeout, async {
            Ok::<_, ForgeError>(template.executor.execute(task, context).await)
        })
        .await;

        match executed {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ForgeError::template_execution(&template.id, &task.id, format!("{:#}", e))),
            Err(timeout) => Err(timeout
                .with_context("task_id", &task.id)
                .with_context("template_id", &template.id)),
        }
    }

    /// Run error hooks, then mark the instance failed
    /// Attach `resources` to the bound instance and return everything it now carries.
    /// A failure aborts the binding so the instance does not stay claimed.
    async fn attach(
        &self,
        hooks: &HookManager,
        task: &Task,
        instance_id: &str,
        bound: Bound,
        strategy: StrategyKind,
        resources: &[Arc<SynthesizedResource>],
    ) -> ForgeResult<Vec<Arc<SynthesizedResource>>> {
        if let Err(error) = self.registry.attach_resources(instance_id, resources).await {
            let error = error
                .with_context("task_id", &task.id)
                .with_context("strategy", strategy);
            self.abort(hooks, task, instance_id, bound, &error).await;
            return Err(error);
        }
        Ok(self
            .registry
            .instance(instance_id)
            .await
            .map(|instance| instance.resources)
            .unwrap_or_else(|| resources.to_vec()))
    }

    async fn abort(&self, hooks: &HookManager, task: &Task, instance_id: &str, bound: Bound, error: &ForgeError) {
        let summary = hooks
            .run_error(&HookContext::new(task.clone(), instance_id, HookPhase::Error).with_error(error.clone()))
            .await;
        if !summary.failed.is_empty() {
            warn!("{} error hook(s) failed for task {}", summary.failed.len(), task.id);
        }
        self.release(task, instance_id, bound, Some(error)).await;
    }

    async fn release(&self, task: &Task, instance_id: &str, bound: Bound, error: Option<&ForgeError>) {
        let record = InstanceExecutionRecord {
            task_id: task.id.clone(),
            started_at: bound.at,
            finished_at: Utc::now(),
            success: error.is_none(),
            duration_ms: bound.clock.elapsed().as_millis() as u64,
            error: error.map(|error| error.to_string()),
        };
        if let Err(e) = self.registry.finish_task(instance_id, record).await {
            warn!("Could not record task {} on instance {}: {}", task.id, instance_id, e);
        }
    }

    async fn bump(&self, update: impl FnOnce(&mut OrchestratorStatistics)) {
        update(&mut self.stats.lock().await.stats);
    }

    async fn record(&self, record: AssignmentRecord) {
        {
            let mut state = self.stats.lock().await;
            state.stats.total_assignments += 1;
            if record.success {
                state.stats.successful += 1;
            } else {
                state.stats.failed += 1;
            }
            state.total_duration_ms += record.duration_ms;
            state.stats.average_duration_ms = state.total_duration_ms as f64 / state.stats.total_assignments as f64;
        }

        let limit = self.config.orchestrator.history_limit;
        if limit == 0 {
            return;
        }
        let mut history = self.history.lock().await;
        history.push_back(record);
        while history.len() > limit {
            history.pop_front();
        }
    }

    /// Assignment records, oldest first
    pub async fn history(&self) -> Vec<AssignmentRecord> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn statistics(&self) -> OrchestratorStatistics {
        self.stats.lock().await.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hooks::{HookHandler, HookOptions};
    use crate::task::TaskKind;
    use crate::worker::InstanceStatus;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn realtime_task(id: &str) -> Task {
        Task::new(
            "Implement real-time WebSocket system",
            "TypeScript server pushing live updates, with tests",
            TaskKind::Feature,
        )
        .with_id(id)
    }

    fn simple_task(id: &str) -> Task {
        Task::new("Fix typo in documentation", "", TaskKind::Docs).with_id(id)
    }

    fn orchestrator() -> AssignmentOrchestrator {
        AssignmentOrchestrator::from_config(ForgeConfig::default()).unwrap()
    }

    fn echo_template(id: &str, kinds: &[TaskKind]) -> WorkerTemplate {
        WorkerTemplate::from_fn(id, id, |task, ctx| async move {
            Ok(json!({ "task": task.id, "resources": ctx.resource_names() }))
        })
        .with_kinds(kinds.iter().copied())
        .with_capabilities(["typescript", "testing", "realtime"])
    }

    #[tokio::test]
    async fn test_no_template_is_not_recoverable() {
        let orchestrator = orchestrator();
        let error = orchestrator.assign(&simple_task("task-1")).await.unwrap_err();

        assert_eq!(error.kind, ErrorKind::NoMatchingTemplate);
        assert!(!error.is_recoverable());
        assert_eq!(error.context_value("task_kind"), Some("docs"));

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.total_assignments, 1);
        assert_eq!(stats.failed, 1);
        assert!(!orchestrator.history().await[0].success);
    }

    #[tokio::test]
    async fn test_simple_task_creates_instance() {
        let orchestrator = orchestrator();
        orchestrator
            .registry()
            .register_template(echo_template("docs-writer", &[TaskKind::Docs]))
            .await;

        let report = orchestrator.assign(&simple_task("task-1")).await.unwrap();
        assert_eq!(report.strategy_used, StrategyKind::CreateNew);
        assert!(!report.instance_reused);
        assert!(report.resources.is_empty());
        assert_eq!(report.output["task"], "task-1");

        let instance = orchestrator.registry().instance(&report.instance_id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Completed);
        assert_eq!(instance.history.len(), 1);

        let second = orchestrator.assign(&simple_task("task-2")).await.unwrap();
        assert_ne!(second.instance_id, report.instance_id);
    }

    #[tokio::test]
    async fn test_expert_task_reuses_instance() {
        let orchestrator = orchestrator();
        orchestrator
            .registry()
            .register_template(echo_template("realtime", &[TaskKind::Feature]))
            .await;

        let first = orchestrator.assign(&realtime_task("task-1")).await.unwrap();
        assert_eq!(first.strategy.kind, StrategyKind::ReuseExisting);
        assert_eq!(first.strategy_used, StrategyKind::Hybrid);
        assert!(!first.instance_reused);

        let second = orchestrator.assign(&realtime_task("task-2")).await.unwrap();
        assert_eq!(second.strategy_used, StrategyKind::ReuseExisting);
        assert!(second.instance_reused);
        assert_eq!(second.instance_id, first.instance_id);

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.instances_created, 1);
        assert_eq!(stats.instances_reused, 1);
        assert_eq!(orchestrator.registry().statistics().await.instances, 1);
    }

    #[tokio::test]
    async fn test_resources_synthesized_once_and_attached() {
        let orchestrator = orchestrator();
        orchestrator
            .registry()
            .register_template(echo_template("realtime", &[TaskKind::Feature]))
            .await;

        let first = orchestrator.assign(&realtime_task("task-1")).await.unwrap();
        let names: Vec<_> = first.resources.iter().map(|binding| binding.name.as_str()).collect();
        assert!(names.contains(&"test-runner"));
        assert!(names.contains(&"websocket-client"));
        assert!(names.contains(&"completion-notice"));
        assert!(first.resources.iter().all(|binding| !binding.reused));
        assert!(first.output["resources"]
            .as_array()
            .unwrap()
            .contains(&json!("websocket-client")));
        assert_eq!(first.post_hooks.executed, vec!["completion-notice".to_string()]);

        let second = orchestrator.assign(&realtime_task("task-2")).await.unwrap();
        assert!(second.resources.iter().all(|binding| binding.reused));

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.resources_created, first.resources.len() as u64);
        assert_eq!(stats.resources_reused, second.resources.len() as u64);
        assert_eq!(orchestrator.store().len(), first.resources.len());
    }

    #[tokio::test]
    async fn test_analysis_is_cached_per_task() {
        let orchestrator = orchestrator();
        orchestrator
            .registry()
            .register_template(echo_template("docs-writer", &[TaskKind::Docs]))
            .await;
        let task = simple_task("task-1");

        let first = orchestrator.assign(&task).await.unwrap();
        let second = orchestrator.assign(&task).await.unwrap();
        assert!(!first.analysis_cached);
        assert!(second.analysis_cached);
        assert_eq!(orchestrator.statistics().await.analysis_cache_hits, 1);

        assert!(orchestrator.invalidate_analysis("task-1").await);
        let third = orchestrator.assign(&task).await.unwrap();
        assert!(!third.analysis_cached);
    }

    #[tokio::test]
    async fn test_executor_failure_marks_instance_failed() {
        let orchestrator = orchestrator();
        orchestrator
            .registry()
            .register_template(
                WorkerTemplate::from_fn("flaky", "Flaky", |_task, _ctx| async {
                    Err::<Value, _>(anyhow::anyhow!("compiler crashed"))
                })
                .with_kinds([TaskKind::Docs]),
            )
            .await;

        let error = orchestrator.assign(&simple_task("task-1")).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::TemplateExecution);
        assert!(error.is_recoverable());
        assert!(error.message.contains("compiler crashed"));

        let instance_id = error.context_value("instance_id").unwrap().to_string();
        let instance = orchestrator.registry().instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Failed);

        let record = &orchestrator.history().await[0];
        assert_eq!(record.instance_id.as_deref(), Some(instance_id.as_str()));
        assert_eq!(record.strategy, Some(StrategyKind::CreateNew));
    }

    #[tokio::test]
    async fn test_task_timeout() {
        let orchestrator = orchestrator().with_task_timeout(Duration::from_millis(30));
        orchestrator
            .registry()
            .register_template(
                WorkerTemplate::from_fn("slow", "Slow", |_task, _ctx| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Null)
                })
                .with_kinds([TaskKind::Docs]),
            )
            .await;

        let error = orchestrator.assign(&simple_task("task-1")).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert!(!error.is_recoverable());
        assert_eq!(error.context_value("template_id"), Some("slow"));
    }

    struct Veto;

    #[async_trait]
    impl HookHandler for Veto {
        async fn run(&self, _context: &HookContext) -> anyhow::Result<()> {
            anyhow::bail!("change freeze in effect")
        }
    }

    #[tokio::test]
    async fn test_pre_hook_veto_skips_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut orchestrator = orchestrator();
        orchestrator
            .hooks_mut()
            .register("freeze", HookPhase::Pre, Arc::new(Veto), HookOptions::default());
        orchestrator
            .registry()
            .register_template(
                WorkerTemplate::from_fn("docs-writer", "Docs", move |_task, _ctx| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }
                })
                .with_kinds([TaskKind::Docs]),
            )
            .await;

        let error = orchestrator.assign(&simple_task("task-1")).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::HookFailure);
        assert_eq!(error.context_value("hook"), Some("freeze"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct ErrorCounter(Arc<AtomicUsize>);

    #[async_trait]
    impl HookHandler for ErrorCounter {
        async fn run(&self, context: &HookContext) -> anyhow::Result<()> {
            if context.error.is_some() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_attach_failure_aborts_binding() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = orchestrator();
        orchestrator.hooks_mut().register(
            "count-errors",
            HookPhase::Error,
            Arc::new(ErrorCounter(seen.clone())),
            HookOptions::default(),
        );
        orchestrator
            .registry()
            .register_template(echo_template("docs-writer", &[TaskKind::Docs]))
            .await;

        let task = simple_task("task-1");
        let instance = orchestrator
            .registry()
            .create_claimed("docs-writer", &task.id)
            .await
            .unwrap();
        orchestrator.registry().destroy(&instance.id).await.unwrap();

        let hooks = orchestrator.hooks().clone();
        let error = orchestrator
            .attach(&hooks, &task, &instance.id, Bound::now(), StrategyKind::CreateNew, &[])
            .await
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::InstanceNotFound);
        assert_eq!(error.context_value("instance_id"), Some(instance.id.as_str()));
        assert_eq!(error.context_value("strategy"), Some("create-new"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(orchestrator.registry().running_instances().await.is_empty());
    }

    #[tokio::test]
    async fn test_assign_with_retry_recovers() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let orchestrator = orchestrator().with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));
        orchestrator
            .registry()
            .register_template(
                WorkerTemplate::from_fn("flaky", "Flaky", move |_task, _ctx| {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            anyhow::bail!("transient failure");
                        }
                        Ok(json!("done"))
                    }
                })
                .with_kinds([TaskKind::Docs]),
            )
            .await;

        let outcome = orchestrator.assign_with_retry(&simple_task("task-1")).await;
        assert!(outcome.success());
        assert_eq!(outcome.attempts, 2);

        let stats = orchestrator.statistics().await;
        assert_eq!(stats.total_assignments, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_history_limit() {
        let mut config = ForgeConfig::default();
        config.orchestrator.history_limit = 2;
        let orchestrator = AssignmentOrchestrator::from_config(config).unwrap();

        for i in 0..3 {
            let _ = orchestrator.assign(&simple_task(&format!("task-{}", i))).await;
        }
        let history = orchestrator.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].task_id, "task-1");
        assert_eq!(orchestrator.statistics().await.total_assignments, 3);
    }
}
