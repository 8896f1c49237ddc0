//! Engine end-to-end tests

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use plugrun_core::{
    Dependency, DependencyRequirement, Engine, EnginePhase, PluginFilter, PluginRegistry,
    StaticPluginLoader,
};
use plugrun_foundation::{
    event_kinds, Error, Event, HealthStatus, Plugin, PluginConfig, PluginContext, PluginMetadata,
    PluginMetrics, PluginState, PluginStatus, PluginType, Result, RuntimeConfig,
};
use plugrun_task::{BackoffKind, ExecutionTask, RetryPolicy, TaskStatus};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Test plugin
// ============================================================================

struct TestPlugin {
    metadata: PluginMetadata,
    always_fail: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    received: Mutex<Vec<String>>,
    metrics: Mutex<PluginMetrics>,
}

impl TestPlugin {
    fn new(id: &str) -> Self {
        Self::with_metadata(PluginMetadata::new(id, id, "1.0.0").with_type(PluginType::Custom))
    }

    fn with_metadata(metadata: PluginMetadata) -> Self {
        Self {
            metadata,
            always_fail: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            metrics: Mutex::new(PluginMetrics::default()),
        }
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self, _ctx: &PluginContext, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        PluginStatus::new(PluginState::Running, HealthStatus::Healthy)
            .with_metrics(self.metrics.lock().clone())
    }

    async fn handle_event(&self, _ctx: &PluginContext, event: &Event) -> Result<()> {
        self.received.lock().push(event.event_type.clone());
        Ok(())
    }

    async fn process_data(&self, _ctx: &PluginContext, data: Value) -> Result<Value> {
        self.attempts.lock().push(Instant::now());
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Error::plugin(&self.metadata.id, "backend unavailable"));
        }
        Ok(json!({ "processed": data }))
    }
}

async fn running_engine() -> Engine {
    let engine = Engine::new(RuntimeConfig::default(), Arc::new(StaticPluginLoader::new())).unwrap();
    engine.start().await.unwrap();
    engine
}

// ============================================================================
// Load / lifecycle
// ============================================================================

#[tokio::test]
async fn test_load_through_static_loader() {
    let loader = Arc::new(StaticPluginLoader::new());
    loader.register("greeter", || Arc::new(TestPlugin::new("greeter")) as Arc<dyn Plugin>);

    let engine = Engine::new(RuntimeConfig::default(), loader).unwrap();
    engine.start().await.unwrap();

    let id = engine.load_plugin("static://greeter").await.unwrap();
    assert_eq!(id, "greeter");
    assert!(engine.load_plugin("static://missing").await.unwrap_err().is_not_found());

    let info = engine.get_plugin_info("greeter").await.unwrap();
    assert_eq!(info.state, PluginState::Loaded);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_start_plugin_preconditions() {
    let engine = running_engine().await;

    // Unloaded
    let err = engine.lifecycle().start_plugin("ghost").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let id = engine
        .load_plugin_instance(Arc::new(TestPlugin::new("worker")))
        .await
        .unwrap();

    // Loaded → 자동 초기화 후 Running
    engine.start_plugin(&id).await.unwrap();
    assert_eq!(engine.lifecycle().current_state(&id).await, PluginState::Running);

    // Running
    let err = engine.lifecycle().start_plugin(&id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(engine.lifecycle().current_state(&id).await, PluginState::Running);

    // Stopped → Running
    engine.stop_plugin(&id).await.unwrap();
    engine.start_plugin(&id).await.unwrap();

    let history = engine.lifecycle().get_lifecycle_history(&id, 10).await;
    assert!(history.iter().all(|e| e.success));
    assert_eq!(history.len(), 4);

    assert_eq!(
        engine.registry().get_status(&id).await.unwrap(),
        PluginState::Running
    );
    assert!(engine.monitor().is_monitored(&id).await);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_unload_removes_everything() {
    let engine = running_engine().await;
    let id = engine
        .load_plugin_instance(Arc::new(TestPlugin::new("temp")))
        .await
        .unwrap();
    engine.start_plugin(&id).await.unwrap();
    assert!(engine.sandbox().is_sandboxed(&id).await);

    engine.unload_plugin(&id).await.unwrap();

    assert!(!engine.registry().contains(&id).await);
    assert!(!engine.plugin_manager().contains(&id).await);
    assert!(!engine.sandbox().is_sandboxed(&id).await);
    assert!(!engine.monitor().is_monitored(&id).await);
    assert!(engine.dependencies().get_dependency(&id, "1.0.0").is_err());

    let unloaded = engine
        .event_bus()
        .history(None, Some(event_kinds::PLUGIN_UNLOADED))
        .await;
    assert_eq!(unloaded.len(), 1);

    let err = assert_err!(engine.unload_plugin(&id).await);
    assert!(err.is_not_found());
    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_stop_unloads_running_plugins() {
    let engine = running_engine().await;
    for id in ["a", "b", "c"] {
        engine
            .load_plugin_instance(Arc::new(TestPlugin::new(id)))
            .await
            .unwrap();
        engine.start_plugin(id).await.unwrap();
    }

    engine.stop(Duration::from_secs(5)).await.unwrap();

    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert!(engine.registry().is_empty().await);
    assert!(engine.plugin_manager().is_empty().await);
    assert!(!engine.executor().is_running());
    assert!(!engine.event_bus().is_running());
}

// ============================================================================
// Dependencies
// ============================================================================

#[tokio::test]
async fn test_dependency_resolution_picks_highest_match() {
    let engine = running_engine().await;
    let deps = engine.dependencies();
    for v in ["1.1.0", "1.2.0", "1.3.0"] {
        deps.register_dependency(Dependency::new("codec", v)).unwrap();
    }

    let resolved = deps
        .resolve_dependencies(&[DependencyRequirement::new("codec", ">=1.2.0")])
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].version, "1.3.0");

    let err = deps
        .resolve_dependencies(&[
            DependencyRequirement::new("codec", "~1.1.0"),
            DependencyRequirement::new("codec", "^1.2.0"),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::DependencyConflict { .. }));

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_circular_dependency_blocks_initialize() {
    let engine = running_engine().await;

    let a = PluginMetadata::new("alpha", "Alpha", "1.0.0").with_dependency("beta");
    let b = PluginMetadata::new("beta", "Beta", "1.0.0").with_dependency("alpha");
    engine
        .load_plugin_instance(Arc::new(TestPlugin::with_metadata(a)))
        .await
        .unwrap();
    engine
        .load_plugin_instance(Arc::new(TestPlugin::with_metadata(b)))
        .await
        .unwrap();

    let err = engine.start_plugin("alpha").await.unwrap_err();
    assert!(matches!(err, Error::CircularDependency(_)));
    assert_eq!(
        engine.lifecycle().current_state("alpha").await,
        PluginState::Loaded
    );

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_plugin_dependency_satisfied_by_loaded_plugin() {
    let engine = running_engine().await;

    let store = PluginMetadata::new("store", "Store", "2.1.0");
    let app = PluginMetadata::new("app", "App", "1.0.0").with_dependency("store@^2.0");
    engine
        .load_plugin_instance(Arc::new(TestPlugin::with_metadata(store)))
        .await
        .unwrap();
    engine
        .load_plugin_instance(Arc::new(TestPlugin::with_metadata(app)))
        .await
        .unwrap();

    engine.start_plugin("app").await.unwrap();
    assert_eq!(engine.lifecycle().current_state("app").await, PluginState::Running);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_publish_edge_cases() {
    let engine = running_engine().await;

    assert_ok!(
        engine
            .publish(Event::new("nobody.listens", "test", json!({})))
            .await
    );

    let before = engine.event_bus().stats().await.expired;
    let stale = Event::new("stale", "test", json!({}))
        .with_timestamp(Utc::now() - chrono::Duration::seconds(10))
        .with_ttl(Duration::from_secs(1));
    assert_ok!(engine.publish(stale).await);
    assert_eq!(engine.event_bus().stats().await.expired, before + 1);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_publish_async_full_queue() {
    let mut config = RuntimeConfig::default();
    config.event_bus.queue_size = 1;
    let engine = Engine::new(config, Arc::new(StaticPluginLoader::new())).unwrap();

    // 워커가 없으므로 큐가 비워지지 않음
    engine
        .publish_async(Event::new("a", "test", json!({})))
        .unwrap();
    let err = engine
        .publish_async(Event::new("b", "test", json!({})))
        .unwrap_err();
    assert!(matches!(err, Error::QueueFull(_)));
}

#[tokio::test]
async fn test_plugin_receives_subscribed_events() {
    let engine = running_engine().await;
    let meta = PluginMetadata::new("listener", "Listener", "1.0.0")
        .with_config("subscribe", json!(["orders.created"]));
    let plugin = Arc::new(TestPlugin::with_metadata(meta));
    engine.load_plugin_instance(plugin.clone()).await.unwrap();

    engine
        .publish(Event::new("orders.created", "test", json!({"id": 7})))
        .await
        .unwrap();
    engine
        .publish(Event::new("orders.deleted", "test", json!({"id": 7})))
        .await
        .unwrap();
    engine
        .publish(Event::new("orders.created", "test", json!({})).with_target("someone-else"))
        .await
        .unwrap();

    assert_eq!(*plugin.received.lock(), vec!["orders.created".to_string()]);

    engine.unload_plugin("listener").await.unwrap();
    engine
        .publish(Event::new("orders.created", "test", json!({})))
        .await
        .unwrap();
    assert_eq!(plugin.received.lock().len(), 1);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_state_changes_reach_the_bus() {
    let engine = running_engine().await;
    let id = engine
        .load_plugin_instance(Arc::new(TestPlugin::new("observed")))
        .await
        .unwrap();
    engine.start_plugin(&id).await.unwrap();

    // 레지스트리 리스너는 별도 태스크에서 실행됨
    tokio::time::sleep(Duration::from_millis(100)).await;

    let changes = engine
        .event_bus()
        .history(None, Some(event_kinds::PLUGIN_STATE_CHANGED))
        .await;
    assert!(changes
        .iter()
        .any(|e| e.data["pluginId"] == json!("observed") && e.data["status"] == json!("running")));

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_execute_through_engine() {
    let engine = running_engine().await;
    let id = engine
        .load_plugin_instance(Arc::new(TestPlugin::new("calc")))
        .await
        .unwrap();
    engine.start_plugin(&id).await.unwrap();

    let result = engine
        .execute(ExecutionTask::new(&id, PluginType::Custom, "sum", json!([1, 2])))
        .await
        .unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.data.unwrap()["processed"]["method"], json!("sum"));

    let task_id = engine
        .execute_async(ExecutionTask::new(&id, PluginType::Custom, "sum", json!([3])))
        .await
        .unwrap();
    let mut finished = None;
    for _ in 0..50 {
        if let Ok(r) = engine.get_execution_result(task_id).await {
            finished = Some(r);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(finished.unwrap().status, TaskStatus::Completed);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_exponential_retry_gaps() {
    let engine = running_engine().await;
    let plugin = Arc::new(TestPlugin::new("flaky"));
    plugin.always_fail.store(true, Ordering::SeqCst);
    engine.load_plugin_instance(plugin.clone()).await.unwrap();
    engine.start_plugin("flaky").await.unwrap();

    let task = ExecutionTask::new("flaky", PluginType::Custom, "run", json!({})).with_retry(
        RetryPolicy::new(2, Duration::from_millis(100), BackoffKind::Exponential),
    );
    let result = engine.execute(task).await.unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.retry_count, 2);

    let attempts = plugin.attempts.lock().clone();
    assert_eq!(attempts.len(), 3);
    assert!(attempts[1] - attempts[0] >= Duration::from_millis(100));
    assert!(attempts[2] - attempts[1] >= Duration::from_millis(200));

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

// ============================================================================
// Monitor
// ============================================================================

#[tokio::test]
async fn test_alert_deduplication_and_clear() {
    let engine = running_engine().await;
    let plugin = Arc::new(TestPlugin::new("hot"));
    engine.load_plugin_instance(plugin.clone()).await.unwrap();
    engine.start_plugin("hot").await.unwrap();

    let threshold = engine.config().monitor.thresholds.cpu_percent;
    plugin.metrics.lock().cpu_percent = threshold * 1.2;

    let first = engine.monitor().collect_metrics().await;
    let second = engine.monitor().collect_metrics().await;
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(engine.monitor().get_active_alerts().await.len(), 1);
    assert_eq!(engine.get_engine_status().await.active_alerts, 1);

    assert_eq!(engine.monitor().clear_alerts("hot").await, 1);
    assert!(engine.monitor().get_active_alerts().await.is_empty());

    let third = engine.monitor().collect_metrics().await;
    assert_eq!(third.len(), 1);

    let published = engine
        .event_bus()
        .history(None, Some(event_kinds::MONITOR_ALERT))
        .await;
    assert_eq!(published.len(), 2);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_unregister_twice_is_not_found() {
    let engine = running_engine().await;
    engine
        .load_plugin_instance(Arc::new(TestPlugin::new("once")))
        .await
        .unwrap();

    engine.registry().unregister("once").await.unwrap();
    assert!(engine.registry().unregister("once").await.unwrap_err().is_not_found());

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_registry_export_import_round_trip() {
    let engine = running_engine().await;
    for (id, category) in [("exp.a", "io"), ("exp.b", "analytics")] {
        let meta = PluginMetadata::new(id, id, "0.3.0").with_category(category);
        engine
            .load_plugin_instance(Arc::new(TestPlugin::with_metadata(meta)))
            .await
            .unwrap();
    }
    engine.start_plugin("exp.b").await.unwrap();

    let snapshot = engine.registry().export().await;
    let fresh = PluginRegistry::new();
    assert_eq!(fresh.import(snapshot).await.unwrap(), 2);

    let original = engine.registry().list().await;
    let restored = fresh.list().await;
    assert_eq!(original.len(), restored.len());
    for (a, b) in original.iter().zip(restored.iter()) {
        assert_eq!(a.metadata, b.metadata);
        assert_eq!(a.status, b.status);
    }

    let running = fresh.find(&PluginFilter::new().state(PluginState::Running)).await;
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id(), "exp.b");

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_engine_status_counts() {
    let engine = running_engine().await;
    engine
        .load_plugin_instance(Arc::new(TestPlugin::new("s1")))
        .await
        .unwrap();
    engine
        .load_plugin_instance(Arc::new(TestPlugin::new("s2")))
        .await
        .unwrap();
    engine.start_plugin("s2").await.unwrap();

    let status = engine.get_engine_status().await;
    assert_eq!(status.phase, EnginePhase::Running);
    assert_eq!(status.plugin_count, 2);
    assert_eq!(status.plugins_by_state.get("loaded"), Some(&1));
    assert_eq!(status.plugins_by_state.get("running"), Some(&1));
    assert!(status.event_bus.running);

    let report = engine.report().await;
    assert_eq!(report.plugins.len(), 2);

    engine.stop(Duration::from_secs(5)).await.unwrap();
}

// ============================================================================
// Bounded shutdown
// ============================================================================

/// `stop` either waits for the context to be cancelled or never returns
struct SlowStopPlugin {
    metadata: PluginMetadata,
    honours_cancel: bool,
    cleaned: AtomicBool,
}

impl SlowStopPlugin {
    fn new(id: &str, honours_cancel: bool) -> Self {
        Self {
            metadata: PluginMetadata::new(id, id, "1.0.0").with_type(PluginType::Custom),
            honours_cancel,
            cleaned: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Plugin for SlowStopPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self, _ctx: &PluginContext, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    async fn start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, ctx: &PluginContext) -> Result<()> {
        if self.honours_cancel {
            ctx.cancelled().await;
        } else {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn cleanup(&self, _ctx: &PluginContext) -> Result<()> {
        self.cleaned.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        PluginStatus::new(PluginState::Running, HealthStatus::Healthy)
    }

    async fn process_data(&self, _ctx: &PluginContext, data: Value) -> Result<Value> {
        Ok(data)
    }
}

#[tokio::test]
async fn test_stop_is_bounded_by_timeout() {
    let engine = running_engine().await;

    // sorted ids: the cooperative plugin is unloaded first
    let cooperative = Arc::new(SlowStopPlugin::new("a-cooperative", true));
    let stuck = Arc::new(SlowStopPlugin::new("b-stuck", false));
    for plugin in [cooperative.clone(), stuck.clone()] {
        let id = engine.load_plugin_instance(plugin).await.unwrap();
        engine.start_plugin(&id).await.unwrap();
    }

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        engine.stop(Duration::from_millis(200)),
    )
    .await;
    let result = assert_ok!(outcome, "stop must not outlive its timeout");
    assert!(matches!(result, Err(Error::Timeout(_))));

    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert!(cooperative.cleaned.load(Ordering::SeqCst));
    assert!(!stuck.cleaned.load(Ordering::SeqCst));
    assert!(engine.list_plugins().await.is_empty());
    assert_err!(engine.registry().get("b-stuck").await);
    assert_eq!(
        engine.lifecycle().current_state("b-stuck").await,
        PluginState::Unloaded
    );
}
