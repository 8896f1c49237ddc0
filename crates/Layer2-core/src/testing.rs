//! 테스트용 플러그인

use async_trait::async_trait;
use parking_lot::Mutex;
use plugrun_foundation::{
    Error, Event, HealthStatus, Plugin, PluginConfig, PluginContext, PluginMetadata,
    PluginMetrics, PluginState, PluginStatus, PluginType, Result,
};
use serde_json::{json, Value};
use std::collections::HashSet;

/// 호출 기록과 실패 주입을 지원하는 플러그인
pub struct MockPlugin {
    metadata: PluginMetadata,
    fail_on: Mutex<HashSet<&'static str>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub last_config: Mutex<Option<PluginConfig>>,
    pub events: Mutex<Vec<Event>>,
    health: Mutex<HealthStatus>,
    metrics: Mutex<PluginMetrics>,
}

impl MockPlugin {
    pub fn new(id: &str) -> Self {
        Self::with_metadata(PluginMetadata::new(id, id, "1.0.0").with_type(PluginType::Custom))
    }

    pub fn with_metadata(metadata: PluginMetadata) -> Self {
        Self {
            metadata,
            fail_on: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            last_config: Mutex::new(None),
            events: Mutex::new(Vec::new()),
            health: Mutex::new(HealthStatus::Healthy),
            metrics: Mutex::new(PluginMetrics::default()),
        }
    }

    /// 해당 메서드 호출을 실패시킴
    pub fn fail_on(&self, method: &'static str) {
        self.fail_on.lock().insert(method);
    }

    pub fn recover(&self, method: &'static str) {
        self.fail_on.lock().remove(method);
    }

    pub fn set_health(&self, health: HealthStatus) {
        *self.health.lock() = health;
    }

    pub fn set_metrics(&self, metrics: PluginMetrics) {
        *self.metrics.lock() = metrics;
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == method).count()
    }

    fn call(&self, method: &'static str) -> Result<()> {
        self.calls.lock().push(method);
        if self.fail_on.lock().contains(method) {
            return Err(Error::plugin(&self.metadata.id, format!("{} failed", method)));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self, _ctx: &PluginContext, config: &PluginConfig) -> Result<()> {
        *self.last_config.lock() = Some(config.clone());
        self.call("initialize")
    }

    async fn start(&self, _ctx: &PluginContext) -> Result<()> {
        self.call("start")
    }

    async fn stop(&self, _ctx: &PluginContext) -> Result<()> {
        self.call("stop")
    }

    async fn cleanup(&self, _ctx: &PluginContext) -> Result<()> {
        self.call("cleanup")
    }

    fn status(&self) -> PluginStatus {
        PluginStatus::new(PluginState::Running, *self.health.lock())
            .with_metrics(self.metrics.lock().clone())
    }

    async fn handle_event(&self, _ctx: &PluginContext, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        self.call("handle_event")
    }

    async fn process_data(&self, _ctx: &PluginContext, data: Value) -> Result<Value> {
        self.call("process_data")?;
        Ok(json!({ "echo": data }))
    }
}
