//! Task adapters - package task parameters into the shape each plugin type expects
//!
//! | Type      | Plugin call     | Payload                                       |
//! |-----------|-----------------|-----------------------------------------------|
//! | http      | `process_data`  | `{method, path, headers, body, query}`        |
//! | event     | `handle_event`  | `Event{type = params.eventType or method}`    |
//! | scheduled | `process_data`  | `{method, schedule, params, scheduledAt}`     |
//! | data      | `process_data`  | `params.data`                                 |
//! | custom    | `process_data`  | `{method, params}`                            |

use crate::task::ExecutionTask;
use async_trait::async_trait;
use chrono::Utc;
use plugrun_foundation::{Error, Event, Plugin, PluginContext, PluginType, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Adapter trait - implement to add or override a per-type dispatch
#[async_trait]
pub trait TaskAdapter: Send + Sync {
    /// Plugin type this adapter serves
    fn plugin_type(&self) -> PluginType;

    /// Call into the plugin
    async fn execute(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value>;
}

fn param<'a>(task: &'a ExecutionTask, key: &str) -> Option<&'a Value> {
    task.params.get(key)
}

// ============================================================================
// Built-in adapters
// ============================================================================

/// HTTP request style
pub struct HttpAdapter;

#[async_trait]
impl TaskAdapter for HttpAdapter {
    fn plugin_type(&self) -> PluginType {
        PluginType::Http
    }

    async fn execute(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value> {
        let method = param(task, "method")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if task.method.is_empty() {
                    "GET".to_string()
                } else {
                    task.method.to_uppercase()
                }
            });

        let request = json!({
            "method": method,
            "path": param(task, "path").cloned().unwrap_or_else(|| json!("/")),
            "headers": param(task, "headers").cloned().unwrap_or_else(|| json!({})),
            "body": param(task, "body").cloned().unwrap_or(Value::Null),
            "query": param(task, "query").cloned().unwrap_or_else(|| json!({})),
        });

        plugin.process_data(ctx, request).await
    }
}

/// Event delivery
pub struct EventAdapter;

#[async_trait]
impl TaskAdapter for EventAdapter {
    fn plugin_type(&self) -> PluginType {
        PluginType::Event
    }

    async fn execute(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value> {
        let event_type = param(task, "eventType")
            .and_then(Value::as_str)
            .unwrap_or(task.method.as_str())
            .to_string();

        if event_type.is_empty() {
            return Err(Error::InvalidInput(
                "event task requires params.eventType or a method".into(),
            ));
        }

        let data = param(task, "data").cloned().unwrap_or_else(|| task.params.clone());
        let event = Event::new(event_type, "executor", data).with_target(task.plugin_id.clone());
        let event_id = event.id.clone();

        plugin.handle_event(ctx, &event).await?;
        Ok(json!({ "handled": true, "eventId": event_id }))
    }
}

/// Scheduled job trigger
pub struct ScheduledAdapter;

#[async_trait]
impl TaskAdapter for ScheduledAdapter {
    fn plugin_type(&self) -> PluginType {
        PluginType::Scheduled
    }

    async fn execute(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value> {
        let payload = json!({
            "method": task.method,
            "schedule": param(task, "schedule").cloned().unwrap_or(Value::Null),
            "params": task.params,
            "scheduledAt": Utc::now().to_rfc3339(),
        });

        plugin.process_data(ctx, payload).await
    }
}

/// Data transformation
pub struct DataAdapter;

#[async_trait]
impl TaskAdapter for DataAdapter {
    fn plugin_type(&self) -> PluginType {
        PluginType::Data
    }

    async fn execute(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value> {
        let data = param(task, "data")
            .cloned()
            .ok_or_else(|| Error::InvalidInput("data task requires params.data".into()))?;

        plugin.process_data(ctx, data).await
    }
}

/// Generic method call
pub struct CustomAdapter;

#[async_trait]
impl TaskAdapter for CustomAdapter {
    fn plugin_type(&self) -> PluginType {
        PluginType::Custom
    }

    async fn execute(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value> {
        plugin
            .process_data(ctx, json!({ "method": task.method, "params": task.params }))
            .await
    }
}

// ============================================================================
// AdapterSet
// ============================================================================

/// Type → adapter table
#[derive(Clone)]
pub struct AdapterSet {
    adapters: HashMap<PluginType, Arc<dyn TaskAdapter>>,
}

impl AdapterSet {
    /// Empty set
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Replace (or add) the adapter for its type
    pub fn register(&mut self, adapter: Arc<dyn TaskAdapter>) {
        self.adapters.insert(adapter.plugin_type(), adapter);
    }

    pub fn get(&self, plugin_type: PluginType) -> Option<Arc<dyn TaskAdapter>> {
        self.adapters.get(&plugin_type).cloned()
    }

    /// Validate the declared plugin type, then run the matching adapter
    pub async fn dispatch(
        &self,
        plugin: &dyn Plugin,
        ctx: &PluginContext,
        task: &ExecutionTask,
    ) -> Result<Value> {
        let adapter = self.route(plugin, task)?;
        adapter.execute(plugin, ctx, task).await
    }

    /// Adapter for the task, if the plugin declares the task's type
    pub fn route(&self, plugin: &dyn Plugin, task: &ExecutionTask) -> Result<Arc<dyn TaskAdapter>> {
        let declared = plugin.metadata().plugin_type;
        if declared != task.task_type {
            return Err(Error::TypeMismatch {
                plugin_id: task.plugin_id.clone(),
                expected: task.task_type.to_string(),
                declared: declared.to_string(),
            });
        }

        self.get(task.task_type).ok_or_else(|| {
            Error::NotFound(format!("adapter for plugin type {}", task.task_type))
        })
    }
}

impl Default for AdapterSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(HttpAdapter));
        set.register(Arc::new(EventAdapter));
        set.register(Arc::new(ScheduledAdapter));
        set.register(Arc::new(DataAdapter));
        set.register(Arc::new(CustomAdapter));
        set
    }
}
