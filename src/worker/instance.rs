use crate::synthesis::SynthesizedResource;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// `idle -> running -> {completed, failed}`; idle and completed instances are reusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    pub fn is_reusable(&self) -> bool {
        matches!(self, InstanceStatus::Idle | InstanceStatus::Completed)
    }

    /// Reusable, or running with room for another task
    pub fn accepts_tasks(&self) -> bool {
        self.is_reusable() || *self == InstanceStatus::Running
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstanceStatus::Idle => "idle",
            InstanceStatus::Running => "running",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceExecutionRecord {
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Live worker bound to a template. Owned by the registry; callers get snapshots.
#[derive(Debug, Clone)]
pub struct WorkerInstance {
    pub id: String,
    pub template_id: String,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub active_tasks: Vec<TaskId>,
    pub max_concurrent_tasks: u32,
    /// Append-only
    pub history: Vec<InstanceExecutionRecord>,
    pub resources: Vec<Arc<SynthesizedResource>>,
}

impl WorkerInstance {
    pub(crate) fn new(template_id: &str, max_concurrent_tasks: u32) -> Self {
        let now = Utc::now();
        Self {
            id: format!("instance-{}", Uuid::new_v4()),
            template_id: template_id.to_string(),
            status: InstanceStatus::Idle,
            created_at: now,
            last_active_at: now,
            active_tasks: Vec::new(),
            max_concurrent_tasks: max_concurrent_tasks.max(1),
            history: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Task currently executing, if any
    pub fn current_task(&self) -> Option<&TaskId> {
        self.active_tasks.first()
    }

    pub fn has_capacity(&self) -> bool {
        (self.active_tasks.len() as u32) < self.max_concurrent_tasks
    }

    pub(crate) fn start(&mut self, task_id: &TaskId) {
        self.active_tasks.push(task_id.clone());
        self.status = InstanceStatus::Running;
        self.last_active_at = Utc::now();
    }

    pub(crate) fn finish(&mut self, record: InstanceExecutionRecord) {
        self.active_tasks.retain(|active| active != &record.task_id);
        self.status = if !self.active_tasks.is_empty() {
            InstanceStatus::Running
        } else if record.success {
            InstanceStatus::Completed
        } else {
            InstanceStatus::Failed
        };
        self.last_active_at = Utc::now();
        self.history.push(record);
    }

    /// Attach resources not already present (by id)
    pub(crate) fn attach(&mut self, resources: &[Arc<SynthesizedResource>]) -> usize {
        let mut added = 0;
        for resource in resources {
            if !self.resources.iter().any(|existing| existing.id == resource.id) {
                self.resources.push(resource.clone());
                added += 1;
            }
        }
        added
    }

    pub fn resource_named(&self, name: &str) -> Option<&Arc<SynthesizedResource>> {
        self.resources.iter().rev().find(|resource| resource.name == name)
    }
}
