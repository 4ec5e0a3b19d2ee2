use crate::hooks::manager::{HookContext, HookHandler};
use crate::synthesis::{HookAction, HookDescriptor};
use anyhow::bail;
use async_trait::async_trait;
use tracing::{info, warn};

/// Runs a synthesized hook's declarative action
#[derive(Debug, Clone)]
pub struct SynthesizedHookHandler {
    name: String,
    descriptor: HookDescriptor,
}

impl SynthesizedHookHandler {
    pub fn new(name: impl Into<String>, descriptor: HookDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }
}

#[async_trait]
impl HookHandler for SynthesizedHookHandler {
    async fn run(&self, context: &HookContext) -> anyhow::Result<()> {
        let task = &context.task;
        match self.descriptor.action {
            HookAction::Validate => {
                let missing: Vec<&str> = self
                    .descriptor
                    .required_metadata
                    .iter()
                    .map(String::as_str)
                    .filter(|key| task.metadata.get(*key).is_none_or(|value| value.is_null()))
                    .collect();
                if !missing.is_empty() {
                    bail!("task {} is missing metadata: {}", task.id, missing.join(", "));
                }
            }
            HookAction::Notify => {
                info!("[{}] task {} completed on {}", self.name, task.id, context.instance_id);
            }
            HookAction::Cleanup => {
                info!("[{}] cleaning up after task {} on {}", self.name, task.id, context.instance_id);
            }
            HookAction::Escalate => {
                warn!(
                    "[{}] escalating failure of task {}: {}",
                    self.name,
                    task.id,
                    context.error.as_ref().map(ToString::to_string).unwrap_or_default()
                );
            }
            HookAction::Rollback => {
                warn!(
                    "[{}] task {} failed on {}, marking for rollback: {}",
                    self.name,
                    task.id,
                    context.instance_id,
                    context.error.as_ref().map(ToString::to_string).unwrap_or_default()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::HookPhase;
    use crate::task::{Task, TaskKind};
    use serde_json::json;

    fn validator(keys: &[&str]) -> SynthesizedHookHandler {
        SynthesizedHookHandler::new(
            "risk-gate",
            HookDescriptor {
                phase: HookPhase::Pre,
                action: HookAction::Validate,
                required_metadata: keys.iter().map(|key| key.to_string()).collect(),
                priority: 40,
                continue_on_failure: false,
            },
        )
    }

    #[tokio::test]
    async fn test_validation_requires_metadata() {
        let task = Task::new("Drop legacy table", "", TaskKind::Refactor);
        let handler = validator(&["ticket", "approver"]);

        let error = handler
            .run(&HookContext::new(task.clone(), "instance-1", HookPhase::Pre))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("ticket, approver"));

        let approved = task
            .with_metadata("ticket", json!("DB-12"))
            .with_metadata("approver", json!("ops"));
        assert!(handler.run(&HookContext::new(approved, "instance-1", HookPhase::Pre)).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_without_requirements_passes() {
        let task = Task::new("Anything", "", TaskKind::Docs);
        assert!(validator(&[]).run(&HookContext::new(task, "instance-1", HookPhase::Pre)).await.is_ok());
    }
}
