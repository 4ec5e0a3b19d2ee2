use crate::error::{ForgeError, ForgeResult};
use crate::synthesis::SynthesizedResource;
use crate::task::{TaskId, TaskKind};
use crate::worker::instance::{InstanceExecutionRecord, InstanceStatus, WorkerInstance};
use crate::worker::template::WorkerTemplate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct TemplateEntry {
    template: Arc<WorkerTemplate>,
    seq: u64,
}

#[derive(Default)]
struct RegistryState {
    templates: HashMap<String, TemplateEntry>,
    instances: HashMap<String, WorkerInstance>,
    next_seq: u64,
    instances_created: u64,
    instances_destroyed: u64,
}

impl RegistryState {
    /// Supporting templates, best first: priority, then registration order
    fn supporting(&self, kind: TaskKind) -> Vec<&TemplateEntry> {
        let mut entries: Vec<_> = self
            .templates
            .values()
            .filter(|entry| entry.template.supports(kind))
            .collect();
        entries.sort_by(|a, b| b.template.priority.cmp(&a.template.priority).then(a.seq.cmp(&b.seq)));
        entries
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub templates: usize,
    pub instances: usize,
    pub idle: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub instances_created: u64,
    pub instances_destroyed: u64,
}

/// Worker templates and the pool of live instances
pub struct WorkerRegistry {
    state: RwLock<RegistryState>,
    default_max_concurrent: u32,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkerRegistry {
    /// `default_max_concurrent` applies to templates that set no limit of their own
    pub fn new(default_max_concurrent: u32) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            default_max_concurrent: default_max_concurrent.max(1),
        }
    }

    /// Register or replace a template. Replacement keeps the original registration order.
    pub async fn register_template(&self, template: WorkerTemplate) {
        let mut state = self.state.write().await;
        let seq = match state.templates.get(&template.id) {
            Some(existing) => existing.seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        info!(
            "Registered worker template {} ({} v{}, priority {})",
            template.id, template.name, template.version, template.priority
        );
        state.templates.insert(
            template.id.clone(),
            TemplateEntry {
                template: Arc::new(template),
                seq,
            },
        );
    }

    /// Live instances of the template are left alone
    pub async fn unregister_template(&self, template_id: &str) -> Option<Arc<WorkerTemplate>> {
        let removed = self.state.write().await.templates.remove(template_id);
        if removed.is_some() {
            info!("Unregistered worker template {}", template_id);
        }
        removed.map(|entry| entry.template)
    }

    pub async fn template(&self, template_id: &str) -> Option<Arc<WorkerTemplate>> {
        self.state
            .read()
            .await
            .templates
            .get(template_id)
            .map(|entry| entry.template.clone())
    }

    /// All templates in registration order
    pub async fn templates(&self) -> Vec<Arc<WorkerTemplate>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state.templates.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.template.clone()).collect()
    }

    /// Highest-priority template supporting `kind`; earliest registration wins ties
    pub async fn find_best(&self, kind: TaskKind) -> Option<Arc<WorkerTemplate>> {
        let state = self.state.read().await;
        state.supporting(kind).first().map(|entry| entry.template.clone())
    }

    /// Best capability overlap (0-100) among templates supporting `kind`; 0 when none do
    pub async fn match_score(&self, kind: TaskKind, capabilities: &BTreeSet<String>) -> u8 {
        let state = self.state.read().await;
        state
            .supporting(kind)
            .iter()
            .map(|entry| entry.template.capability_match(capabilities))
            .max()
            .unwrap_or(0)
    }

    fn limit_for(&self, template: &WorkerTemplate) -> u32 {
        template.max_concurrent_tasks.unwrap_or(self.default_max_concurrent)
    }

    async fn spawn_instance(&self, template_id: &str) -> ForgeResult<(Arc<WorkerTemplate>, WorkerInstance)> {
        let template = self.template(template_id).await.ok_or_else(|| {
            ForgeError::instance_creation(template_id, format!("template {} is not registered", template_id))
                .with_recoverable(false)
        })?;
        let instance = WorkerInstance::new(&template.id, self.limit_for(&template));

        template.executor.setup(&instance).await.map_err(|e| {
            warn!("Setup failed for instance of template {}: {:#}", template.id, e);
            ForgeError::instance_creation(&template.id, format!("instance setup failed: {:#}", e))
                .with_context("instance_id", &instance.id)
        })?;

        Ok((template, instance))
    }

    /// Create an idle instance, running the template's setup first
    pub async fn create(&self, template_id: &str) -> ForgeResult<WorkerInstance> {
        let (_, instance) = self.spawn_instance(template_id).await?;
        let mut state = self.state.write().await;
        state.instances_created += 1;
        state.instances.insert(instance.id.clone(), instance.clone());
        info!("Created worker instance {} from template {}", instance.id, template_id);
        Ok(instance)
    }

    /// Create an instance that is already running `task_id`, so no other caller can claim it first
    pub async fn create_claimed(&self, template_id: &str, task_id: &TaskId) -> ForgeResult<WorkerInstance> {
        let (_, mut instance) = self.spawn_instance(template_id).await?;
        instance.start(task_id);
        let mut state = self.state.write().await;
        state.instances_created += 1;
        state.instances.insert(instance.id.clone(), instance.clone());
        info!(
            "Created worker instance {} from template {} for task {}",
            instance.id, template_id, task_id
        );
        Ok(instance)
    }

    /// Atomically pick a reusable instance for `kind` and mark it running `task_id`.
    ///
    /// Candidates are idle or completed instances, plus running ones below their
    /// concurrency limit, whose template supports `kind` and declares at least
    /// `min_match` percent of `capabilities`. Better template priority wins, then the
    /// oldest instance.
    pub async fn claim_reusable(
        &self,
        kind: TaskKind,
        capabilities: &BTreeSet<String>,
        min_match: u8,
        task_id: &TaskId,
    ) -> Option<WorkerInstance> {
        let mut state = self.state.write().await;

        let chosen = {
            let mut candidates: Vec<(&WorkerInstance, &TemplateEntry)> = state
                .instances
                .values()
                .filter(|instance| instance.status.accepts_tasks() && instance.has_capacity())
                .filter_map(|instance| {
                    let entry = state.templates.get(&instance.template_id)?;
                    let eligible = entry.template.supports(kind)
                        && entry.template.capability_match(capabilities) >= min_match;
                    eligible.then_some((instance, entry))
                })
                .collect();
            candidates.sort_by(|(a, a_entry), (b, b_entry)| {
                b_entry
                    .template
                    .priority
                    .cmp(&a_entry.template.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            });
            candidates.first().map(|(instance, _)| instance.id.clone())
        }?;

        let instance = state.instances.get_mut(&chosen)?;
        instance.start(task_id);
        debug!("Claimed instance {} for task {}", instance.id, task_id);
        Some(instance.clone())
    }

    /// Admit `task_id` on an instance, rejecting when its concurrency limit is reached
    pub async fn begin_task(&self, instance_id: &str, task_id: &TaskId) -> ForgeResult<()> {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ForgeError::instance_not_found(instance_id))?;
        if !instance.has_capacity() {
            return Err(ForgeError::concurrency_limit(instance_id, instance.max_concurrent_tasks)
                .with_context("task_id", task_id));
        }
        instance.start(task_id);
        Ok(())
    }

    /// Record the outcome of a task and return the instance's new status
    pub async fn finish_task(&self, instance_id: &str, record: InstanceExecutionRecord) -> ForgeResult<InstanceStatus> {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ForgeError::instance_not_found(instance_id))?;
        debug!(
            "Instance {} finished task {} (success: {})",
            instance_id, record.task_id, record.success
        );
        instance.finish(record);
        Ok(instance.status)
    }

    /// Attach resources to an instance, skipping ones already attached. Returns how many were added.
    pub async fn attach_resources(
        &self,
        instance_id: &str,
        resources: &[Arc<SynthesizedResource>],
    ) -> ForgeResult<usize> {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ForgeError::instance_not_found(instance_id))?;
        Ok(instance.attach(resources))
    }

    pub async fn instance(&self, instance_id: &str) -> Option<WorkerInstance> {
        self.state.read().await.instances.get(instance_id).cloned()
    }

    /// Instances available for reuse (idle or completed)
    pub async fn idle_instances(&self) -> Vec<WorkerInstance> {
        self.filter_instances(|instance| instance.status.is_reusable()).await
    }

    pub async fn running_instances(&self) -> Vec<WorkerInstance> {
        self.filter_instances(|instance| instance.status == InstanceStatus::Running)
            .await
    }

    async fn filter_instances(&self, predicate: impl Fn(&WorkerInstance) -> bool) -> Vec<WorkerInstance> {
        let state = self.state.read().await;
        let mut instances: Vec<_> = state.instances.values().filter(|i| predicate(i)).cloned().collect();
        instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        instances
    }

    /// Remove an instance and run its template's teardown. Teardown failures are logged.
    pub async fn destroy(&self, instance_id: &str) -> ForgeResult<WorkerInstance> {
        let instance = {
            let mut state = self.state.write().await;
            let instance = state
                .instances
                .remove(instance_id)
                .ok_or_else(|| ForgeError::instance_not_found(instance_id))?;
            state.instances_destroyed += 1;
            instance
        };
        if instance.status == InstanceStatus::Running {
            warn!(
                "Destroying instance {} while it runs {} task(s)",
                instance.id,
                instance.active_tasks.len()
            );
        }
        self.teardown(&instance).await;
        info!("Destroyed worker instance {}", instance.id);
        Ok(instance)
    }

    /// Destroy every idle or completed instance
    pub async fn destroy_idle(&self) -> usize {
        self.destroy_where(|instance| instance.status.is_reusable()).await
    }

    /// Destroy idle or completed instances inactive for longer than `age`
    pub async fn destroy_idle_older_than(&self, age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(age) else {
            return 0;
        };
        let cutoff = chrono::Utc::now() - age;
        self.destroy_where(|instance| instance.status.is_reusable() && instance.last_active_at < cutoff)
            .await
    }

    async fn destroy_where(&self, predicate: impl Fn(&WorkerInstance) -> bool) -> usize {
        let removed: Vec<WorkerInstance> = {
            let mut state = self.state.write().await;
            let ids: Vec<String> = state
                .instances
                .values()
                .filter(|instance| predicate(instance))
                .map(|instance| instance.id.clone())
                .collect();
            let removed: Vec<_> = ids.iter().filter_map(|id| state.instances.remove(id)).collect();
            state.instances_destroyed += removed.len() as u64;
            removed
        };
        for instance in &removed {
            self.teardown(instance).await;
        }
        if !removed.is_empty() {
            info!("Destroyed {} idle worker instance(s)", removed.len());
        }
        removed.len()
    }

    async fn teardown(&self, instance: &WorkerInstance) {
        let Some(template) = self.template(&instance.template_id).await else {
            debug!(
                "Template {} is gone, skipping teardown of {}",
                instance.template_id, instance.id
            );
            return;
        };
        if let Err(e) = template.executor.teardown(instance).await {
            warn!("Teardown failed for instance {}: {:#}", instance.id, e);
        }
    }

    pub async fn statistics(&self) -> RegistryStatistics {
        let state = self.state.read().await;
        let count = |status: InstanceStatus| state.instances.values().filter(|i| i.status == status).count();
        RegistryStatistics {
            templates: state.templates.len(),
            instances: state.instances.len(),
            idle: count(InstanceStatus::Idle),
            running: count(InstanceStatus::Running),
            completed: count(InstanceStatus::Completed),
            failed: count(InstanceStatus::Failed),
            instances_created: state.instances_created,
            instances_destroyed: state.instances_destroyed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::task::Task;
    use crate::worker::context::ExecutionContext;
    use crate::worker::template::WorkerExecutor;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn template(id: &str, priority: i32) -> WorkerTemplate {
        WorkerTemplate::from_fn(id, id, |_task, _ctx| async { Ok(Value::Null) })
            .with_kinds([TaskKind::Feature])
            .with_priority(priority)
            .with_capabilities(["typescript", "testing"])
    }

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn record(task_id: &str, success: bool) -> InstanceExecutionRecord {
        let now = Utc::now();
        InstanceExecutionRecord {
            task_id: task_id.to_string(),
            started_at: now,
            finished_at: now,
            success,
            duration_ms: 0,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_find_best_prefers_priority_then_registration() {
        let registry = WorkerRegistry::default();
        registry.register_template(template("first", 5)).await;
        registry.register_template(template("second", 5)).await;
        assert_eq!(registry.find_best(TaskKind::Feature).await.unwrap().id, "first");

        registry.register_template(template("urgent", 9)).await;
        assert_eq!(registry.find_best(TaskKind::Feature).await.unwrap().id, "urgent");
        assert!(registry.find_best(TaskKind::Docs).await.is_none());

        let ids: Vec<_> = registry.templates().await.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["first", "second", "urgent"]);
    }

    #[tokio::test]
    async fn test_match_score() {
        let registry = WorkerRegistry::default();
        assert_eq!(registry.match_score(TaskKind::Feature, &caps(&[])).await, 0);

        registry.register_template(template("frontend", 1)).await;
        assert_eq!(registry.match_score(TaskKind::Feature, &caps(&[])).await, 100);
        assert_eq!(
            registry
                .match_score(TaskKind::Feature, &caps(&["typescript", "realtime"]))
                .await,
            50
        );
    }

    #[tokio::test]
    async fn test_claim_reusable_is_exclusive() {
        let registry = WorkerRegistry::default();
        registry.register_template(template("frontend", 1)).await;
        let created = registry.create("frontend").await.unwrap();
        assert_eq!(created.status, InstanceStatus::Idle);

        let needed = caps(&["typescript"]);
        let claimed = registry
            .claim_reusable(TaskKind::Feature, &needed, 70, &"task-1".to_string())
            .await
            .unwrap();
        assert_eq!(claimed.id, created.id);
        assert_eq!(claimed.status, InstanceStatus::Running);

        assert!(registry
            .claim_reusable(TaskKind::Feature, &needed, 70, &"task-2".to_string())
            .await
            .is_none());

        let status = registry.finish_task(&claimed.id, record("task-1", true)).await.unwrap();
        assert_eq!(status, InstanceStatus::Completed);
        assert!(registry
            .claim_reusable(TaskKind::Feature, &needed, 70, &"task-2".to_string())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_claim_shares_running_instance_with_spare_capacity() {
        let registry = WorkerRegistry::default();
        registry
            .register_template(template("frontend", 1).with_max_concurrent_tasks(2))
            .await;
        let needed = caps(&["typescript"]);

        let running = registry.create_claimed("frontend", &"task-1".to_string()).await.unwrap();
        let shared = registry
            .claim_reusable(TaskKind::Feature, &needed, 70, &"task-2".to_string())
            .await
            .unwrap();
        assert_eq!(shared.id, running.id);
        assert_eq!(shared.active_tasks, vec!["task-1".to_string(), "task-2".to_string()]);

        assert!(registry
            .claim_reusable(TaskKind::Feature, &needed, 70, &"task-3".to_string())
            .await
            .is_none());

        registry.finish_task(&running.id, record("task-1", true)).await.unwrap();
        let third = registry
            .claim_reusable(TaskKind::Feature, &needed, 70, &"task-3".to_string())
            .await
            .unwrap();
        assert_eq!(third.id, running.id);
        assert_eq!(third.active_tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_claim_skips_failed_instances() {
        let registry = WorkerRegistry::default();
        registry
            .register_template(template("frontend", 1).with_max_concurrent_tasks(2))
            .await;
        let instance = registry.create_claimed("frontend", &"task-1".to_string()).await.unwrap();
        let status = registry.finish_task(&instance.id, record("task-1", false)).await.unwrap();
        assert_eq!(status, InstanceStatus::Failed);

        assert!(registry
            .claim_reusable(TaskKind::Feature, &caps(&[]), 0, &"task-2".to_string())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_match_threshold() {
        let registry = WorkerRegistry::default();
        registry.register_template(template("frontend", 1)).await;
        registry.create("frontend").await.unwrap();

        let needed = caps(&["typescript", "realtime", "database"]);
        let task = "task-1".to_string();
        assert!(registry.claim_reusable(TaskKind::Feature, &needed, 70, &task).await.is_none());
        assert!(registry.claim_reusable(TaskKind::Docs, &caps(&[]), 0, &task).await.is_none());
        assert!(registry.claim_reusable(TaskKind::Feature, &needed, 30, &task).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let registry = WorkerRegistry::default();
        registry.register_template(template("frontend", 1)).await;
        let instance = registry.create_claimed("frontend", &"task-1".to_string()).await.unwrap();

        let error = registry
            .begin_task(&instance.id, &"task-2".to_string())
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ConcurrencyLimit);
        assert!(!error.is_recoverable());

        let wide = WorkerRegistry::default();
        wide.register_template(template("frontend", 1).with_max_concurrent_tasks(2)).await;
        let instance = wide.create_claimed("frontend", &"a".to_string()).await.unwrap();
        wide.begin_task(&instance.id, &"b".to_string()).await.unwrap();
        assert_eq!(wide.instance(&instance.id).await.unwrap().active_tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let registry = WorkerRegistry::default();
        let error = registry.create("missing").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InstanceCreation);
        assert!(!error.is_recoverable());

        let error = registry.destroy("instance-missing").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InstanceNotFound);
        let error = registry
            .finish_task("instance-missing", record("task-1", true))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InstanceNotFound);
    }

    struct Lifecycle {
        setups: AtomicUsize,
        teardowns: AtomicUsize,
        fail_setup: bool,
    }

    #[async_trait]
    impl WorkerExecutor for Lifecycle {
        async fn execute(&self, _task: &Task, _context: &ExecutionContext) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }

        async fn setup(&self, _instance: &WorkerInstance) -> anyhow::Result<()> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            if self.fail_setup {
                anyhow::bail!("no sandbox available");
            }
            Ok(())
        }

        async fn teardown(&self, _instance: &WorkerInstance) -> anyhow::Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_setup_and_teardown() {
        let lifecycle = Arc::new(Lifecycle {
            setups: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            fail_setup: false,
        });
        let registry = WorkerRegistry::default();
        registry
            .register_template(WorkerTemplate::new("tracked", "Tracked", lifecycle.clone()).with_kinds([TaskKind::Feature]))
            .await;

        let idle = registry.create("tracked").await.unwrap();
        let busy = registry.create_claimed("tracked", &"task-1".to_string()).await.unwrap();
        assert_eq!(lifecycle.setups.load(Ordering::SeqCst), 2);

        assert_eq!(registry.destroy_idle().await, 1);
        assert!(registry.instance(&idle.id).await.is_none());
        assert!(registry.instance(&busy.id).await.is_some());
        assert_eq!(lifecycle.teardowns.load(Ordering::SeqCst), 1);

        let stats = registry.statistics().await;
        assert_eq!(stats.instances_created, 2);
        assert_eq!(stats.instances_destroyed, 1);
        assert_eq!(stats.running, 1);
    }

    #[tokio::test]
    async fn test_setup_failure_is_instance_creation_error() {
        let registry = WorkerRegistry::default();
        let lifecycle = Arc::new(Lifecycle {
            setups: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            fail_setup: true,
        });
        registry
            .register_template(WorkerTemplate::new("broken", "Broken", lifecycle).with_kinds([TaskKind::Feature]))
            .await;

        let error = registry.create("broken").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InstanceCreation);
        assert!(error.is_recoverable());
        assert!(registry.idle_instances().await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_idle_older_than() {
        let registry = WorkerRegistry::default();
        registry.register_template(template("frontend", 1)).await;
        registry.create("frontend").await.unwrap();

        assert_eq!(registry.destroy_idle_older_than(Duration::from_secs(3600)).await, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.destroy_idle_older_than(Duration::from_millis(5)).await, 1);
    }
}
