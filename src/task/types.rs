use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier assigned by the intake system that produced the task
pub type TaskId = String;

/// Unit of work handed to the engine. Immutable once submitted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub dependencies: Vec<TaskId>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Closed set of task kinds the engine schedules
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Feature,
    Bugfix,
    Refactor,
    Docs,
    Test,
    Deployment,
}

/// Task priority levels, ordered low to critical
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Task {
    /// Create a task with a generated identifier
    pub fn new(title: impl Into<String>, description: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: format!("task-{}", Uuid::new_v4()),
            title: title.into(),
            description: description.into(),
            kind,
            priority: TaskPriority::default(),
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, task_id: impl Into<TaskId>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Title and description joined for phrase matching
    pub fn searchable_text(&self) -> String {
        format!("{}\n{}", self.title, self.description)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|value| value.as_str())
    }
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Feature,
        TaskKind::Bugfix,
        TaskKind::Refactor,
        TaskKind::Docs,
        TaskKind::Test,
        TaskKind::Deployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Feature => "feature",
            TaskKind::Bugfix => "bugfix",
            TaskKind::Refactor => "refactor",
            TaskKind::Docs => "docs",
            TaskKind::Test => "test",
            TaskKind::Deployment => "deployment",
        }
    }

    /// Baseline effort in person-hours before complexity adjustments
    pub fn base_effort_hours(&self) -> f64 {
        match self {
            TaskKind::Feature => 8.0,
            TaskKind::Bugfix => 3.0,
            TaskKind::Refactor => 6.0,
            TaskKind::Docs => 1.0,
            TaskKind::Test => 3.0,
            TaskKind::Deployment => 4.0,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feature" => Ok(TaskKind::Feature),
            "bugfix" | "bug" => Ok(TaskKind::Bugfix),
            "refactor" => Ok(TaskKind::Refactor),
            "docs" | "documentation" => Ok(TaskKind::Docs),
            "test" | "tests" => Ok(TaskKind::Test),
            "deployment" | "deploy" => Ok(TaskKind::Deployment),
            other => Err(format!(
                "unknown task kind '{}', expected one of: {}",
                other,
                TaskKind::ALL.map(|kind| kind.as_str()).join(", ")
            )),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        };
        f.write_str(label)
    }
}
