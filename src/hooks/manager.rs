use crate::error::{ForgeError, ForgeResult};
use crate::hooks::synthesized::SynthesizedHookHandler;
use crate::synthesis::{HookPhase, SynthesizedResource};
use crate::task::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What a hook sees when it runs
#[derive(Debug, Clone)]
pub struct HookContext {
    pub task: Task,
    pub instance_id: String,
    pub phase: HookPhase,
    /// Set for error hooks
    pub error: Option<ForgeError>,
    /// Set for post hooks
    pub output: Option<Value>,
}

impl HookContext {
    pub fn new(task: Task, instance_id: impl Into<String>, phase: HookPhase) -> Self {
        Self {
            task,
            instance_id: instance_id.into(),
            phase,
            error: None,
            output: None,
        }
    }

    pub fn with_error(mut self, error: ForgeError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn run(&self, context: &HookContext) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct HookOptions {
    /// Lower runs earlier
    pub priority: u8,
    pub continue_on_failure: bool,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            priority: 50,
            continue_on_failure: false,
        }
    }
}

#[derive(Clone)]
pub struct RegisteredHook {
    pub name: String,
    pub phase: HookPhase,
    pub options: HookOptions,
    handler: Arc<dyn HookHandler>,
    seq: u64,
}

impl std::fmt::Debug for RegisteredHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHook")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("options", &self.options)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRunSummary {
    pub executed: Vec<String>,
    /// (hook name, failure message)
    pub failed: Vec<(String, String)>,
    /// A failing hook without continue-on-failure cut the chain short
    pub stopped_early: bool,
}

/// Ordered hook chains, one per phase
#[derive(Debug, Clone, Default)]
pub struct HookManager {
    hooks: Vec<RegisteredHook>,
    next_seq: u64,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        phase: HookPhase,
        handler: Arc<dyn HookHandler>,
        options: HookOptions,
    ) {
        let name = name.into();
        debug!("Registering {} hook {} (priority {})", phase, name, options.priority);
        self.hooks.push(RegisteredHook {
            name,
            phase,
            options,
            handler,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Register a synthesized hook resource; other resources are ignored
    pub fn register_synthesized(&mut self, resource: &SynthesizedResource) -> bool {
        let Some(descriptor) = resource.hook_descriptor() else {
            return false;
        };
        let options = HookOptions {
            priority: descriptor.priority,
            continue_on_failure: descriptor.continue_on_failure,
        };
        self.register(
            resource.name.clone(),
            descriptor.phase,
            Arc::new(SynthesizedHookHandler::new(&resource.name, descriptor.clone())),
            options,
        );
        true
    }

    /// Copy of this manager with the hook resources among `resources` added
    pub fn extended<'a>(&self, resources: impl IntoIterator<Item = &'a SynthesizedResource>) -> HookManager {
        let mut manager = self.clone();
        for resource in resources {
            manager.register_synthesized(resource);
        }
        manager
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hooks of one phase in run order: priority, then registration order
    pub fn hooks_for(&self, phase: HookPhase) -> Vec<&RegisteredHook> {
        let mut hooks: Vec<_> = self.hooks.iter().filter(|hook| hook.phase == phase).collect();
        hooks.sort_by_key(|hook| (hook.options.priority, hook.seq));
        hooks
    }

    pub fn names(&self, phase: HookPhase) -> Vec<String> {
        self.hooks_for(phase).into_iter().map(|hook| hook.name.clone()).collect()
    }

    async fn run_chain(&self, context: &HookContext) -> (HookRunSummary, Option<(String, String)>) {
        let mut summary = HookRunSummary::default();
        for hook in self.hooks_for(context.phase) {
            summary.executed.push(hook.name.clone());
            if let Err(e) = hook.handler.run(context).await {
                let message = format!("{:#}", e);
                summary.failed.push((hook.name.clone(), message.clone()));
                if !hook.options.continue_on_failure {
                    summary.stopped_early = true;
                    return (summary, Some((hook.name.clone(), message)));
                }
                warn!(
                    "{} hook {} failed for task {}, continuing: {}",
                    context.phase, hook.name, context.task.id, message
                );
            }
        }
        (summary, None)
    }

    /// Run pre hooks; a failing hook without continue-on-failure vetoes execution
    pub async fn run_pre(&self, context: &HookContext) -> ForgeResult<HookRunSummary> {
        match self.run_chain(context).await {
            (summary, None) => Ok(summary),
            (_, Some((hook, message))) => {
                warn!("Pre hook {} vetoed task {}: {}", hook, context.task.id, message);
                Err(ForgeError::hook_failure(&hook, HookPhase::Pre, message)
                    .with_context("task_id", &context.task.id)
                    .with_context("instance_id", &context.instance_id))
            }
        }
    }

    /// Run post hooks. Failures are logged, never returned.
    pub async fn run_post(&self, context: &HookContext) -> HookRunSummary {
        self.run_advisory(context).await
    }

    /// Run error hooks. Failures are logged, never returned.
    pub async fn run_error(&self, context: &HookContext) -> HookRunSummary {
        self.run_advisory(context).await
    }

    async fn run_advisory(&self, context: &HookContext) -> HookRunSummary {
        let (summary, stopped) = self.run_chain(context).await;
        if let Some((hook, message)) = stopped {
            error!(
                "{} hook {} failed for task {}, skipping the rest of the chain: {}",
                context.phase, hook, context.task.id, message
            );
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl HookHandler for Recorder {
        async fn run(&self, _context: &HookContext) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                anyhow::bail!("{} refused", self.name);
            }
            Ok(())
        }
    }

    fn add(
        manager: &mut HookManager,
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        phase: HookPhase,
        priority: u8,
        fail: bool,
        continue_on_failure: bool,
    ) {
        manager.register(
            name,
            phase,
            Arc::new(Recorder {
                name,
                log: log.clone(),
                fail,
            }),
            HookOptions {
                priority,
                continue_on_failure,
            },
        );
    }

    fn context(phase: HookPhase) -> HookContext {
        HookContext::new(Task::new("Add form", "", TaskKind::Feature), "instance-1", phase)
    }

    #[tokio::test]
    async fn test_priority_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = HookManager::new();
        add(&mut manager, &log, "late", HookPhase::Pre, 90, false, false);
        add(&mut manager, &log, "first", HookPhase::Pre, 10, false, false);
        add(&mut manager, &log, "second", HookPhase::Pre, 10, false, false);
        add(&mut manager, &log, "other-phase", HookPhase::Post, 0, false, false);

        let summary = manager.run_pre(&context(HookPhase::Pre)).await.unwrap();
        assert_eq!(summary.executed, vec!["first", "second", "late"]);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "late"]);
    }

    #[tokio::test]
    async fn test_pre_hook_vetoes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = HookManager::new();
        add(&mut manager, &log, "tolerated", HookPhase::Pre, 1, true, true);
        add(&mut manager, &log, "gate", HookPhase::Pre, 2, true, false);
        add(&mut manager, &log, "never", HookPhase::Pre, 3, false, false);

        let error = manager.run_pre(&context(HookPhase::Pre)).await.unwrap_err();
        assert_eq!(error.kind, crate::error::ErrorKind::HookFailure);
        assert_eq!(error.context_value("hook"), Some("gate"));
        assert_eq!(error.context_value("phase"), Some("pre"));
        assert_eq!(*log.lock().unwrap(), vec!["tolerated", "gate"]);
    }

    #[tokio::test]
    async fn test_post_and_error_failures_are_swallowed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = HookManager::new();
        add(&mut manager, &log, "notify", HookPhase::Post, 1, true, true);
        add(&mut manager, &log, "cleanup", HookPhase::Post, 2, false, false);
        add(&mut manager, &log, "escalate", HookPhase::Error, 1, true, false);
        add(&mut manager, &log, "skipped", HookPhase::Error, 2, false, false);

        let post = manager.run_post(&context(HookPhase::Post)).await;
        assert_eq!(post.executed, vec!["notify", "cleanup"]);
        assert_eq!(post.failed.len(), 1);
        assert!(!post.stopped_early);

        let error = manager.run_error(&context(HookPhase::Error)).await;
        assert_eq!(error.executed, vec!["escalate"]);
        assert!(error.stopped_early);
    }

    #[test]
    fn test_extended_leaves_original_untouched() {
        use crate::synthesis::{ResourceCategory, ResourceRequirement, ResourceSynthesizer};

        let synthesizer = ResourceSynthesizer::new();
        let hook = synthesizer
            .synthesize(&ResourceRequirement::new("notice", ResourceCategory::Hook, "post"))
            .unwrap();
        let tool = synthesizer
            .synthesize(
                &ResourceRequirement::new("lint", ResourceCategory::Tool, "command")
                    .with_parameters(serde_json::json!({ "program": "true" })),
            )
            .unwrap();

        let base = HookManager::new();
        let extended = base.extended([&hook, &tool]);
        assert!(base.is_empty());
        assert_eq!(extended.len(), 1);
        assert_eq!(extended.names(HookPhase::Post), vec!["notice".to_string()]);
    }
}
