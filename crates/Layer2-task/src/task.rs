//! Execution task definition and result types

use crate::retry::RetryPolicy;
use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use plugrun_foundation::PluginType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = plugrun_foundation::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| plugrun_foundation::Error::InvalidInput(format!("task id {}: {}", s, e)))
    }
}

/// Task priority (carried on the task, reported in results)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// A unit of work targeted at one plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTask {
    /// Unique task identifier
    pub id: TaskId,

    /// Target plugin
    pub plugin_id: String,

    /// Adapter selector, must match the plugin's declared type
    pub task_type: PluginType,

    /// Method name handed to the adapter
    pub method: String,

    /// Input parameters
    #[serde(default)]
    pub params: Value,

    #[serde(default)]
    pub priority: TaskPriority,

    /// Per-attempt timeout (executor default when absent)
    #[serde(
        with = "plugrun_foundation::serde_ext::option_duration_ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Retries performed so far
    #[serde(default)]
    pub retry_count: u32,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionTask {
    /// Create a new task
    pub fn new(
        plugin_id: impl Into<String>,
        task_type: PluginType,
        method: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: TaskId::new(),
            plugin_id: plugin_id.into(),
            task_type,
            method: method.into(),
            params,
            priority: TaskPriority::default(),
            timeout: None,
            retry_policy: None,
            status: TaskStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Mark task as running
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Move to a terminal status
    pub fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Validate required fields before submission
    pub fn validate(&self) -> plugrun_foundation::Result<()> {
        if self.plugin_id.trim().is_empty() {
            return Err(plugrun_foundation::Error::InvalidInput(
                "task plugin id is required".into(),
            ));
        }
        Ok(())
    }

    /// Get execution duration if task has started
    pub fn duration(&self) -> Duration {
        match self.started_at {
            Some(start) => {
                let end = self.completed_at.unwrap_or_else(Utc::now);
                (end - start).to_std().unwrap_or_default()
            }
            None => Duration::ZERO,
        }
    }
}

/// Outcome of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub plugin_id: String,
    pub status: TaskStatus,

    /// Plugin output on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Last error text on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(with = "plugrun_foundation::serde_ext::duration_ms")]
    pub duration: Duration,

    pub retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Build a result from a finished task
    pub fn from_task(task: &ExecutionTask, data: Option<Value>, error: Option<String>) -> Self {
        Self {
            task_id: task.id,
            plugin_id: task.plugin_id.clone(),
            status: task.status,
            data,
            error,
            duration: task.duration(),
            retry_count: task.retry_count,
            started_at: task.started_at,
            completed_at: task.completed_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder_and_validation() {
        let task = ExecutionTask::new("demo.data", PluginType::Data, "transform", json!({"data": 1}))
            .with_timeout(Duration::from_secs(2))
            .with_priority(TaskPriority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.validate().is_ok());

        let bad = ExecutionTask::new("", PluginType::Data, "x", Value::Null);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_result_from_finished_task() {
        let mut task = ExecutionTask::new("p", PluginType::Custom, "m", Value::Null);
        task.start();
        task.retry_count = 2;
        task.finish(TaskStatus::Failed);

        let result = ExecutionResult::from_task(&task, None, Some("boom".into()));
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.retry_count, 2);
        assert!(!result.is_success());
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
    }
}
