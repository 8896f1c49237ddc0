//! Demo plugins, one per plugin type
//!
//! Registered on a `StaticPluginLoader` under `demo-<type>` so `plugrun run` can load them
//! with `static://demo-<type>` paths.

use async_trait::async_trait;
use plugrun_core::StaticPluginLoader;
use plugrun_foundation::{
    Error, Event, HealthStatus, Plugin, PluginConfig, PluginContext, PluginMetadata,
    PluginMetrics, PluginState, PluginStatus, PluginType, Result,
};
use plugrun_task::ExecutionTask;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Loader name for a plugin type
pub fn loader_name(plugin_type: PluginType) -> String {
    format!("demo-{}", plugin_type.as_str())
}

/// Register a factory for every plugin type
pub fn register_all(loader: &StaticPluginLoader) {
    for plugin_type in PluginType::all() {
        loader.register(loader_name(plugin_type), move || {
            Arc::new(DemoPlugin::new(plugin_type)) as Arc<dyn Plugin>
        });
    }
}

/// A representative task for a demo plugin
pub fn sample_task(plugin_id: &str, plugin_type: PluginType) -> ExecutionTask {
    let (method, params) = match plugin_type {
        PluginType::Http => ("get", json!({ "path": "/health", "query": { "verbose": true } })),
        PluginType::Event => ("demo.ping", json!({ "data": { "seq": 1 } })),
        PluginType::Scheduled => ("nightly", json!({ "schedule": "0 3 * * *" })),
        PluginType::Data => ("transform", json!({ "data": [3, 1, 2] })),
        PluginType::Custom => ("echo", json!({ "message": "hello" })),
    };
    ExecutionTask::new(plugin_id, plugin_type, method, params)
}

// ============================================================================
// DemoPlugin
// ============================================================================

pub struct DemoPlugin {
    metadata: PluginMetadata,
    running: AtomicBool,
    requests: AtomicU64,
    errors: AtomicU64,
    total_micros: AtomicU64,
}

impl DemoPlugin {
    pub fn new(plugin_type: PluginType) -> Self {
        let name = loader_name(plugin_type);
        let metadata = PluginMetadata::new(name.clone(), name, "0.1.0")
            .with_type(plugin_type)
            .with_author("plugrun")
            .with_category("demo")
            .with_description(format!("Demo {} plugin", plugin_type))
            .with_tag("demo");

        let metadata = match plugin_type {
            // 이벤트 플러그인은 데모 이벤트를 구독
            PluginType::Event => metadata.with_config("subscribe", json!(["demo.ping"])),
            // 데이터 플러그인은 커스텀 플러그인에 의존
            PluginType::Data => metadata.with_dependency("demo-custom@^0.1"),
            _ => metadata,
        };

        Self {
            metadata,
            running: AtomicBool::new(false),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
        }
    }

    fn handle(&self, data: Value) -> Result<Value> {
        match self.metadata.plugin_type {
            PluginType::Http => {
                let path = data["path"].as_str().unwrap_or("/");
                Ok(json!({ "status": 200, "path": path, "body": { "ok": true } }))
            }
            PluginType::Scheduled => Ok(json!({
                "job": data["method"],
                "schedule": data["schedule"],
                "ranAt": data["scheduledAt"],
            })),
            PluginType::Data => {
                let mut items = data
                    .as_array()
                    .cloned()
                    .ok_or_else(|| Error::InvalidInput("expected an array".into()))?;
                items.sort_by_key(|v| v.as_i64().unwrap_or_default());
                Ok(json!({ "sorted": items }))
            }
            PluginType::Event | PluginType::Custom => Ok(json!({ "echo": data })),
        }
    }
}

#[async_trait]
impl Plugin for DemoPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self, ctx: &PluginContext, config: &PluginConfig) -> Result<()> {
        debug!(plugin_id = %ctx.plugin_id, keys = config.len(), "Demo plugin initialized");
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _ctx: &PluginContext) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        let state = if self.running.load(Ordering::SeqCst) {
            PluginState::Running
        } else {
            PluginState::Stopped
        };
        let requests = self.requests.load(Ordering::Relaxed);
        let avg = if requests == 0 {
            0.0
        } else {
            self.total_micros.load(Ordering::Relaxed) as f64 / requests as f64 / 1000.0
        };

        PluginStatus::new(state, HealthStatus::Healthy).with_metrics(PluginMetrics {
            request_count: requests,
            error_count: self.errors.load(Ordering::Relaxed),
            avg_response_time_ms: avg,
            worker_count: 1,
            ..PluginMetrics::default()
        })
    }

    async fn handle_event(&self, ctx: &PluginContext, event: &Event) -> Result<()> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        info!(plugin_id = %ctx.plugin_id, event_type = %event.event_type, source = %event.source, "Demo event received");
        Ok(())
    }

    async fn process_data(&self, _ctx: &PluginContext, data: Value) -> Result<Value> {
        let started = Instant::now();
        let result = self.handle(data);

        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        if result.is_err() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}
