use crate::error::ForgeError;
use crate::hooks::HookRunSummary;
use crate::synthesis::ResourceCategory;
use crate::task::{AssignmentStrategy, ComplexityAnalysis, StrategyKind, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resource bound to an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    pub id: String,
    pub name: String,
    pub category: ResourceCategory,
    /// Taken from the store rather than synthesized for this assignment
    pub reused: bool,
}

/// Result of a successful assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentReport {
    pub task_id: TaskId,
    pub instance_id: String,
    pub template_id: String,
    pub analysis: ComplexityAnalysis,
    pub analysis_cached: bool,
    /// Strategy proposed for the task, including fallbacks
    pub strategy: AssignmentStrategy,
    /// Link of the chain that produced the instance
    pub strategy_used: StrategyKind,
    pub instance_reused: bool,
    pub resources: Vec<ResourceBinding>,
    /// Non-critical requirements whose synthesis failed
    pub skipped_resources: Vec<String>,
    pub pre_hooks: HookRunSummary,
    pub post_hooks: HookRunSummary,
    pub output: Value,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// One line of assignment history, kept for failures as well
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub task_id: TaskId,
    pub instance_id: Option<String>,
    pub strategy: Option<StrategyKind>,
    pub success: bool,
    pub error: Option<ForgeError>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AssignmentRecord {
    pub(crate) fn from_outcome(
        task_id: &TaskId,
        outcome: &Result<AssignmentReport, ForgeError>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        match outcome {
            Ok(report) => Self {
                task_id: task_id.clone(),
                instance_id: Some(report.instance_id.clone()),
                strategy: Some(report.strategy_used),
                success: true,
                error: None,
                started_at,
                duration_ms,
            },
            Err(error) => Self {
                task_id: task_id.clone(),
                instance_id: error.context_value("instance_id").map(str::to_string),
                strategy: error
                    .context_value("strategy")
                    .and_then(|label| serde_json::from_value(Value::String(label.to_string())).ok()),
                success: false,
                error: Some(error.clone()),
                started_at,
                duration_ms,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatistics {
    pub total_assignments: u64,
    pub successful: u64,
    pub failed: u64,
    pub analysis_cache_hits: u64,
    pub resources_created: u64,
    pub resources_reused: u64,
    pub instances_created: u64,
    pub instances_reused: u64,
    pub average_duration_ms: f64,
}

impl OrchestratorStatistics {
    pub fn success_rate(&self) -> f64 {
        if self.total_assignments == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_assignments as f64
        }
    }
}
