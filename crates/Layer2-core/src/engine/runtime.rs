//! Engine Runtime - 컴포넌트 조립과 감독 파사드

use super::bridge::{PluginEventBridge, StateChangeBridge};
use super::status::{EnginePhase, EngineReport, EngineStatus, PluginInfo};
use crate::dependency::{
    Dependency, DependencyInjector, DependencyManager, DependencyRequirement, DependencyType,
};
use crate::lifecycle::LifecycleManager;
use crate::monitor::MonitorManager;
use crate::plugin::{PluginLoader, PluginManager};
use crate::registry::{ListenerId, PluginRegistry};
use crate::sandbox::SandboxManager;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plugrun_foundation::{
    event_kinds, Error, Event, EventBus, EventBusConfig, Plugin, PluginConfig, PluginProvider,
    PluginState, Result, RuntimeConfig, SubscriptionId,
};
use plugrun_task::{
    AdapterSet, ExecutionResult, ExecutionTask, ExecutorConfig, PluginExecutor, TaskId,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 플러그인 설정에서 구독할 이벤트 타입 목록을 읽는 키
pub const SUBSCRIBE_CONFIG_KEY: &str = "subscribe";

/// 인젝터에 등록되는 이벤트 버스 이름
pub const INJECT_EVENT_BUS: &str = "event_bus";

/// 인젝터에 등록되는 레지스트리 이름
pub const INJECT_REGISTRY: &str = "registry";

const ENGINE_SOURCE: &str = "engine";

// ============================================================================
// Engine
// ============================================================================

/// 플러그인 런타임 엔진
///
/// ## 사용법
///
/// ```ignore
/// let loader = Arc::new(StaticPluginLoader::new());
/// loader.register("echo", || Arc::new(EchoPlugin::default()));
///
/// let engine = Engine::new(RuntimeConfig::default(), loader)?;
/// engine.start().await?;
///
/// let id = engine.load_plugin("static://echo").await?;
/// engine.start_plugin(&id).await?;
///
/// engine.stop(Duration::from_secs(5)).await?;
/// ```
pub struct Engine {
    config: RuntimeConfig,

    registry: Arc<PluginRegistry>,
    plugins: Arc<PluginManager>,
    sandbox: Arc<SandboxManager>,
    dependencies: Arc<DependencyManager>,
    injector: Arc<DependencyInjector>,
    event_bus: Arc<EventBus>,
    executor: Arc<PluginExecutor>,
    monitor: Arc<MonitorManager>,
    lifecycle: Arc<LifecycleManager>,

    /// 모든 플러그인 컨텍스트의 최상위 토큰
    root: CancellationToken,

    phase: Mutex<(EnginePhase, Option<DateTime<Utc>>)>,

    /// 플러그인별 버스 구독
    subscriptions: RwLock<HashMap<String, Vec<SubscriptionId>>>,

    state_listener: Mutex<Option<ListenerId>>,
}

impl Engine {
    /// 설정 검증 후 컴포넌트 조립
    pub fn new(config: RuntimeConfig, loader: Arc<dyn PluginLoader>) -> Result<Self> {
        config.validate()?;

        let root = CancellationToken::new();

        let registry = Arc::new(PluginRegistry::new());
        let plugins = Arc::new(PluginManager::new(loader));
        let sandbox = Arc::new(SandboxManager::new(config.sandbox.clone()));
        let dependencies = Arc::new(DependencyManager::new());
        let injector = Arc::new(DependencyInjector::new());
        let event_bus = Arc::new(EventBus::with_config(EventBusConfig::from(&config.event_bus)));

        let executor = Arc::new(PluginExecutor::with_parts(
            ExecutorConfig::from(&config.executor),
            plugins.clone(),
            AdapterSet::default(),
            root.clone(),
        ));

        let monitor = Arc::new(
            MonitorManager::new(plugins.clone(), config.monitor.clone())
                .with_event_bus(event_bus.clone()),
        );

        let lifecycle = Arc::new(
            LifecycleManager::new(
                registry.clone(),
                plugins.clone(),
                sandbox.clone(),
                config.lifecycle.clone(),
            )
            .with_parent_token(&root),
        );

        injector.register(INJECT_EVENT_BUS, event_bus.clone());
        injector.register(INJECT_REGISTRY, registry.clone());

        Ok(Self {
            config,
            registry,
            plugins,
            sandbox,
            dependencies,
            injector,
            event_bus,
            executor,
            monitor,
            lifecycle,
            root,
            phase: Mutex::new((EnginePhase::Created, None)),
            subscriptions: RwLock::new(HashMap::new()),
            state_listener: Mutex::new(None),
        })
    }

    // ========================================================================
    // Start / Stop
    // ========================================================================

    /// 버스, 실행기, 모니터, 헬스 체크, 샘플러 순서로 기동
    pub async fn start(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            match phase.0 {
                EnginePhase::Created => phase.0 = EnginePhase::Running,
                EnginePhase::Running => {
                    return Err(Error::AlreadyExists("engine is already running".into()))
                }
                other => {
                    return Err(Error::Validation(format!(
                        "engine cannot be started from {}",
                        other
                    )))
                }
            }
        }

        if let Err(e) = self.start_components().await {
            self.phase.lock().0 = EnginePhase::Created;
            return Err(e);
        }

        let listener = self
            .registry
            .subscribe(StateChangeBridge::new(self.event_bus.clone()))
            .await;
        *self.state_listener.lock() = Some(listener);

        let started_at = Utc::now();
        self.phase.lock().1 = Some(started_at);

        self.emit(event_kinds::ENGINE_STARTED, json!({ "startedAt": started_at }))
            .await;
        info!(
            executor_workers = self.config.executor.worker_count,
            bus_workers = self.config.event_bus.worker_count,
            "Engine started"
        );
        Ok(())
    }

    async fn start_components(&self) -> Result<()> {
        self.event_bus.start().await?;
        if let Err(e) = self.executor.start().await {
            self.event_bus.stop(self.config.engine.shutdown_timeout).await.ok();
            return Err(e);
        }
        self.monitor.start();
        self.lifecycle.start_health_checks();
        if !self.sandbox.start_sampler() {
            debug!("Sandbox sampler disabled");
        }
        Ok(())
    }

    /// 의존 역순 종료
    ///
    /// 플러그인 중지/언로드 → 모니터 → 실행기 → 버스 → 플러그인 매니저 → 루트 토큰 취소.
    /// 각 단계는 남은 시간 안에서 진행되며 첫 에러를 모든 단계가 끝난 뒤 반환한다.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            if phase.0 != EnginePhase::Running {
                return Err(Error::NotRunning("engine is not running".into()));
            }
            phase.0 = EnginePhase::Stopping;
        }

        let deadline = Instant::now() + timeout;
        let mut first_error: Option<Error> = None;

        // 취소 신호를 먼저 보낸 뒤 남은 시간 안에서 언로드를 기다린다
        self.lifecycle.cancel_contexts();
        let ids = self.plugins.plugin_ids().await;
        for id in ids {
            match tokio::time::timeout(remaining(deadline), self.unload_plugin(&id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(plugin_id = %id, error = %e, "Unload failed during shutdown, forcing removal");
                    self.force_remove(&id).await;
                }
                Err(_) => {
                    warn!(plugin_id = %id, "Unload timed out during shutdown, forcing removal");
                    first_error.get_or_insert(Error::Timeout(format!("unloading plugin {}", id)));
                    self.force_remove(&id).await;
                }
            }
        }

        self.monitor.stop().await;
        self.lifecycle.stop_health_checks().await;
        self.sandbox.stop_sampler().await;

        if let Err(e) = self.executor.stop(remaining(deadline)).await {
            first_error.get_or_insert(e);
        }

        let listener = self.state_listener.lock().take();
        if let Some(listener) = listener {
            self.registry.unsubscribe(listener).await.ok();
        }

        self.emit(event_kinds::ENGINE_STOPPED, json!({ "stoppedAt": Utc::now() }))
            .await;
        if let Err(e) = self.event_bus.stop(remaining(deadline)).await {
            first_error.get_or_insert(e);
        }

        let dropped = self.plugins.shutdown().await;
        self.root.cancel();

        self.phase.lock().0 = EnginePhase::Stopped;
        info!(dropped, "Engine stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 설정의 `shutdown_timeout`으로 종료
    pub async fn shutdown(&self) -> Result<()> {
        self.stop(self.config.engine.shutdown_timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.phase.lock().0 == EnginePhase::Running
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase.lock().0
    }

    // ========================================================================
    // 로드 / 언로드
    // ========================================================================

    /// 로더로 경로를 해석한 뒤 로드
    pub async fn load_plugin(&self, path: &str) -> Result<String> {
        let plugin = self.plugins.resolve(path).await?;
        self.load_plugin_instance(plugin).await
    }

    /// 인스턴스 직접 로드
    ///
    /// 레지스트리 등록 → 플러그인 매니저 보관 두 단계로 진행하며, 두 번째 단계가
    /// 실패하면 레지스트리 등록을 되돌린다.
    pub async fn load_plugin_instance(&self, plugin: Arc<dyn Plugin>) -> Result<String> {
        let metadata = plugin.metadata();
        let id = metadata.id.clone();

        self.registry.register(metadata.clone()).await?;
        if let Err(e) = self.plugins.add(plugin.clone()).await {
            if let Err(rollback) = self.registry.unregister(&id).await {
                warn!(plugin_id = %id, error = %rollback, "Registry rollback failed");
            }
            return Err(e);
        }

        let provided = Dependency::new(&id, &metadata.version)
            .with_type(DependencyType::Plugin)
            .with_provider(&id)
            .with_description(metadata.description.clone());
        if let Err(e) = self.dependencies.register_dependency(provided) {
            warn!(plugin_id = %id, error = %e, "Plugin not registered as a dependency");
        }

        let requirements = requirements_of(&metadata.dependencies);
        if !requirements.is_empty() {
            self.dependencies.set_plugin_requirements(&id, requirements);
        }

        self.subscribe_plugin_events(&id, plugin, &metadata.config)
            .await?;

        self.emit(
            event_kinds::PLUGIN_LOADED,
            json!({ "pluginId": id, "version": metadata.version }),
        )
        .await;
        info!(plugin_id = %id, version = %metadata.version, "Plugin loaded");
        Ok(id)
    }

    /// 정리 후 모든 컴포넌트에서 제거
    ///
    /// 라이프사이클 정리가 실패하면 플러그인은 `Error` 상태로 로드된 채 남는다.
    pub async fn unload_plugin(&self, plugin_id: &str) -> Result<()> {
        if !self.plugins.contains(plugin_id).await {
            return Err(Error::NotFound(format!("plugin {}", plugin_id)));
        }

        if self.monitor.is_monitored(plugin_id).await {
            self.monitor.stop_monitoring(plugin_id).await.ok();
        }

        self.lifecycle.cleanup_plugin(plugin_id).await?;

        self.unsubscribe_plugin_events(plugin_id).await;
        self.plugins.remove(plugin_id).await?;
        self.forget_dependency(plugin_id).await;

        self.emit(event_kinds::PLUGIN_UNLOADED, json!({ "pluginId": plugin_id }))
            .await;
        info!(plugin_id = %plugin_id, "Plugin unloaded");
        Ok(())
    }

    /// 정리 호출 없이 모든 기록 제거 (종료 시 실패한 언로드 처리용)
    async fn force_remove(&self, plugin_id: &str) {
        self.monitor.stop_monitoring(plugin_id).await.ok();
        self.unsubscribe_plugin_events(plugin_id).await;
        self.sandbox.remove_plugin(plugin_id).await.ok();
        self.registry.unregister(plugin_id).await.ok();
        self.plugins.remove(plugin_id).await.ok();
        self.lifecycle.discard_state(plugin_id).await;
        self.forget_dependency(plugin_id).await;
    }

    async fn forget_dependency(&self, plugin_id: &str) {
        let versions: Vec<String> = self
            .dependencies
            .list_dependencies(Some(plugin_id))
            .into_iter()
            .filter(|d| d.provider == plugin_id)
            .map(|d| d.version)
            .collect();
        for version in versions {
            self.dependencies
                .unregister_dependency(plugin_id, &version)
                .ok();
        }
        self.dependencies.remove_plugin_requirements(plugin_id);
    }

    // ========================================================================
    // 라이프사이클
    // ========================================================================

    /// 의존성 검사 후 초기화 (설정이 없으면 메타데이터의 기본 설정)
    ///
    /// 순환 의존성이나 해석 실패는 플러그인 호출 전에 거부된다.
    pub async fn initialize_plugin(&self, plugin_id: &str, config: Option<PluginConfig>) -> Result<()> {
        let entry = self.registry.get(plugin_id).await?;

        let requirements = self.dependencies.get_plugin_requirements(plugin_id);
        self.dependencies
            .validate_circular_dependency(plugin_id, &requirements)?;
        let resolved = self.dependencies.resolve_dependencies(&requirements)?;
        debug!(plugin_id = %plugin_id, resolved = resolved.len(), "Dependencies resolved");

        let config = config.unwrap_or_else(|| entry.metadata.config.clone());
        self.lifecycle.initialize_plugin(plugin_id, config).await
    }

    /// 시작 - `Loaded` 상태면 먼저 초기화, 성공하면 모니터링 대상에 추가
    pub async fn start_plugin(&self, plugin_id: &str) -> Result<()> {
        if self.lifecycle.current_state(plugin_id).await == PluginState::Loaded {
            self.initialize_plugin(plugin_id, None).await?;
        }
        self.lifecycle.start_plugin(plugin_id).await?;

        if let Err(e) = self.monitor.start_monitoring(plugin_id).await {
            warn!(plugin_id = %plugin_id, error = %e, "Plugin started without monitoring");
        }
        Ok(())
    }

    pub async fn stop_plugin(&self, plugin_id: &str) -> Result<()> {
        self.lifecycle.stop_plugin(plugin_id).await
    }

    pub async fn restart_plugin(&self, plugin_id: &str) -> Result<()> {
        self.lifecycle.restart_plugin(plugin_id).await?;
        if let Err(e) = self.monitor.start_monitoring(plugin_id).await {
            warn!(plugin_id = %plugin_id, error = %e, "Plugin restarted without monitoring");
        }
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get_plugin_info(&self, plugin_id: &str) -> Result<PluginInfo> {
        let entry = self.registry.get(plugin_id).await?;
        let status = self.plugins.get(plugin_id).await.ok().map(|p| p.status());
        let lifecycle = self.lifecycle.get_lifecycle_state(plugin_id).await.ok();

        Ok(PluginInfo {
            state: lifecycle.as_ref().map_or(entry.status, |l| l.current),
            metadata: entry.metadata,
            status,
            lifecycle,
            registered_at: entry.registered_at,
            last_heartbeat: entry.last_heartbeat,
        })
    }

    /// ID 순
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        let mut infos = Vec::new();
        for entry in self.registry.list().await {
            if let Ok(info) = self.get_plugin_info(entry.id()).await {
                infos.push(info);
            }
        }
        infos
    }

    pub async fn get_engine_status(&self) -> EngineStatus {
        let (phase, started_at) = *self.phase.lock();
        let uptime = match (phase, started_at) {
            (EnginePhase::Running, Some(at)) => (Utc::now() - at).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        let registry = self.registry.stats().await;

        EngineStatus {
            phase,
            started_at,
            uptime,
            plugin_count: registry.total,
            plugins_by_state: registry.by_status,
            event_bus: self.event_bus.stats().await,
            executor: self.executor.stats().await,
            active_alerts: self.monitor.get_active_alerts().await.len(),
        }
    }

    /// 상태 + 플러그인 목록 + 메트릭 스냅샷
    pub async fn report(&self) -> EngineReport {
        EngineReport {
            status: self.get_engine_status().await,
            plugins: self.list_plugins().await,
            metrics: self.monitor.get_all_metrics().await,
        }
    }

    // ========================================================================
    // 실행 / 이벤트
    // ========================================================================

    pub async fn execute(&self, task: ExecutionTask) -> Result<ExecutionResult> {
        self.executor.execute(task).await
    }

    pub async fn execute_async(&self, task: ExecutionTask) -> Result<TaskId> {
        self.executor.execute_async(task).await
    }

    pub async fn get_execution_result(&self, task_id: TaskId) -> Result<ExecutionResult> {
        self.executor.get_execution_result(task_id).await
    }

    pub async fn cancel_execution(&self, task_id: TaskId) -> Result<()> {
        self.executor.cancel_execution(task_id).await
    }

    pub async fn publish(&self, event: Event) -> Result<()> {
        self.event_bus.publish(event).await
    }

    pub fn publish_async(&self, event: Event) -> Result<()> {
        self.event_bus.publish_async(event)
    }

    // ========================================================================
    // 컴포넌트 접근
    // ========================================================================

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn plugin_manager(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    pub fn sandbox(&self) -> &Arc<SandboxManager> {
        &self.sandbox
    }

    pub fn dependencies(&self) -> &Arc<DependencyManager> {
        &self.dependencies
    }

    pub fn injector(&self) -> &Arc<DependencyInjector> {
        &self.injector
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn executor(&self) -> &Arc<PluginExecutor> {
        &self.executor
    }

    pub fn monitor(&self) -> &Arc<MonitorManager> {
        &self.monitor
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    // ========================================================================
    // 내부
    // ========================================================================

    async fn subscribe_plugin_events(
        &self,
        plugin_id: &str,
        plugin: Arc<dyn Plugin>,
        config: &PluginConfig,
    ) -> Result<()> {
        let types = subscribed_types(config);
        if types.is_empty() {
            return Ok(());
        }

        let handler = PluginEventBridge::new(plugin_id.to_string(), plugin, &self.root);
        let mut ids = Vec::with_capacity(types.len());
        for event_type in types {
            match self
                .event_bus
                .subscribe_plugin(plugin_id, event_type.as_str(), handler.clone())
                .await
            {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(plugin_id = %plugin_id, event_type = %event_type, error = %e, "Subscription rejected");
                }
            }
        }

        debug!(plugin_id = %plugin_id, count = ids.len(), "Plugin subscribed to events");
        self.subscriptions
            .write()
            .await
            .insert(plugin_id.to_string(), ids);
        Ok(())
    }

    async fn unsubscribe_plugin_events(&self, plugin_id: &str) {
        let ids = self.subscriptions.write().await.remove(plugin_id);
        for id in ids.unwrap_or_default() {
            self.event_bus.unsubscribe(id).await.ok();
        }
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        if let Err(e) = self
            .event_bus
            .publish(Event::new(event_type, ENGINE_SOURCE, data))
            .await
        {
            debug!(event_type = %event_type, error = %e, "Engine event not published");
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn requirements_of(declarations: &[String]) -> Vec<DependencyRequirement> {
    declarations
        .iter()
        .filter(|d| !d.trim().is_empty())
        .map(|d| DependencyRequirement::parse(d))
        .collect()
}

fn subscribed_types(config: &PluginConfig) -> Vec<String> {
    match config.get(SUBSCRIBE_CONFIG_KEY) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::StaticPluginLoader;
    use crate::testing::MockPlugin;
    use plugrun_foundation::PluginMetadata;
    use plugrun_foundation::PluginType;

    fn engine() -> Engine {
        Engine::new(RuntimeConfig::default(), Arc::new(StaticPluginLoader::new())).unwrap()
    }

    #[tokio::test]
    async fn test_start_twice_and_restart_after_stop() {
        let engine = engine();
        engine.start().await.unwrap();
        assert!(matches!(engine.start().await, Err(Error::AlreadyExists(_))));

        engine.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(engine.phase(), EnginePhase::Stopped);
        assert!(engine.start().await.is_err());
        assert!(matches!(
            engine.stop(Duration::from_secs(1)).await,
            Err(Error::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_load_rolls_back_registry_on_duplicate_instance() {
        let engine = engine();
        let plugin = Arc::new(MockPlugin::new("dup"));
        engine.plugins.add(plugin.clone()).await.unwrap();

        let err = engine.load_plugin_instance(plugin).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(!engine.registry.contains("dup").await);
    }

    #[tokio::test]
    async fn test_load_registers_dependency_and_requirements() {
        let engine = engine();
        let meta = PluginMetadata::new("reporter", "Reporter", "1.0.0")
            .with_type(PluginType::Custom)
            .with_dependency("store@^1.0")
            .with_dependency("cache?");
        let plugin = Arc::new(MockPlugin::with_metadata(meta));

        engine.load_plugin_instance(plugin).await.unwrap();

        assert!(engine.dependencies.get_dependency("reporter", "1.0.0").is_ok());
        let reqs = engine.dependencies.get_plugin_requirements("reporter");
        assert_eq!(reqs.len(), 2);
        assert!(reqs[1].optional);

        // store가 없으므로 초기화 전에 거부
        let err = engine.start_plugin("reporter").await.unwrap_err();
        assert!(matches!(err, Error::DependencyNotFound { .. }));
        assert_eq!(
            engine.lifecycle.current_state("reporter").await,
            PluginState::Loaded
        );
    }

    #[tokio::test]
    async fn test_unload_unknown_plugin() {
        let engine = engine();
        assert!(engine.unload_plugin("ghost").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_subscribed_types() {
        let mut config = PluginConfig::new();
        assert!(subscribed_types(&config).is_empty());

        config.insert(SUBSCRIBE_CONFIG_KEY.into(), json!(["a", 1, "b"]));
        assert_eq!(subscribed_types(&config), vec!["a", "b"]);

        config.insert(SUBSCRIBE_CONFIG_KEY.into(), json!("*"));
        assert_eq!(subscribed_types(&config), vec!["*"]);
    }
}
