//! Lifecycle Manager - Initialize → Start → Stop → Cleanup 전이 구동

use super::hooks::{HookContext, HookPoint, HookRegistration};
use super::types::{LifecycleEvent, LifecycleEventType, LifecycleState};
use crate::plugin::isolated;
use crate::registry::PluginRegistry;
use crate::sandbox::SandboxManager;
use chrono::Utc;
use parking_lot::Mutex;
use plugrun_foundation::{
    Error, HealthStatus, LifecycleSettings, Plugin, PluginConfig, PluginContext, PluginProvider,
    PluginState, Result,
};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 라이프사이클 매니저
///
/// 각 전이는 전제조건 검사 → before 훅 → 플러그인 호출 → 상태/레지스트리 갱신 →
/// 이력 기록 → after 훅 순서로 진행된다. 플러그인 호출이 실패하면 `Error` 상태가 되며
/// 자동으로 재시도하지 않는다.
pub struct LifecycleManager {
    registry: Arc<PluginRegistry>,
    provider: Arc<dyn PluginProvider>,
    sandbox: Arc<SandboxManager>,
    settings: LifecycleSettings,

    states: RwLock<HashMap<String, LifecycleState>>,
    history: RwLock<HashMap<String, VecDeque<LifecycleEvent>>>,
    hooks: RwLock<HashMap<HookPoint, Vec<HookRegistration>>>,

    /// 플러그인 컨텍스트의 부모 토큰
    root: CancellationToken,

    health: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<PluginRegistry>,
        provider: Arc<dyn PluginProvider>,
        sandbox: Arc<SandboxManager>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            registry,
            provider,
            sandbox,
            settings,
            states: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            root: CancellationToken::new(),
            health: Mutex::new(None),
        }
    }

    /// 부모 토큰 연결 (엔진 종료 시 플러그인 컨텍스트도 취소됨)
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.root = parent.child_token();
        self
    }

    // ========================================================================
    // 전이
    // ========================================================================

    /// 샌드박스를 거쳐 `initialize` 호출
    pub async fn initialize_plugin(&self, plugin_id: &str, config: PluginConfig) -> Result<()> {
        let sandbox = Arc::clone(&self.sandbox);
        let applied = config.clone();

        self.transition(
            plugin_id,
            LifecycleEventType::Initialize,
            (HookPoint::BeforeInitialize, HookPoint::AfterInitialize),
            PluginState::can_initialize,
            (PluginState::Initializing, PluginState::Initialized),
            Some(applied),
            move |plugin, ctx| async move { sandbox.initialize_plugin(plugin, &ctx, &config).await },
        )
        .await
    }

    pub async fn start_plugin(&self, plugin_id: &str) -> Result<()> {
        let id = plugin_id.to_string();
        self.transition(
            plugin_id,
            LifecycleEventType::Start,
            (HookPoint::BeforeStart, HookPoint::AfterStart),
            PluginState::can_start,
            (PluginState::Starting, PluginState::Running),
            None,
            move |plugin, ctx| async move {
                isolated(&id, "start", async move { plugin.start(&ctx).await }).await
            },
        )
        .await
    }

    pub async fn stop_plugin(&self, plugin_id: &str) -> Result<()> {
        let id = plugin_id.to_string();
        self.transition(
            plugin_id,
            LifecycleEventType::Stop,
            (HookPoint::BeforeStop, HookPoint::AfterStop),
            PluginState::can_stop,
            (PluginState::Stopping, PluginState::Stopped),
            None,
            move |plugin, ctx| async move {
                isolated(&id, "stop", async move { plugin.stop(&ctx).await }).await
            },
        )
        .await
    }

    /// Stop → 대기 → Start, 재시작 횟수 증가
    ///
    /// `Error` 상태에서는 마지막 설정으로 다시 초기화한 뒤 시작한다.
    pub async fn restart_plugin(&self, plugin_id: &str) -> Result<()> {
        let started = Instant::now();
        let from = self.current_state(plugin_id).await;

        let result = async {
            match from {
                PluginState::Running => {
                    self.stop_plugin(plugin_id).await?;
                    tokio::time::sleep(self.settings.restart_delay).await;
                }
                PluginState::Error => {
                    let config = self
                        .states
                        .read()
                        .await
                        .get(plugin_id)
                        .map(|s| s.config.clone())
                        .unwrap_or_default();
                    self.initialize_plugin(plugin_id, config).await?;
                }
                state if state.can_start() => {}
                state => {
                    return Err(Error::transition(plugin_id, state, PluginState::Starting));
                }
            }
            self.start_plugin(plugin_id).await
        }
        .await;

        let to = self.current_state(plugin_id).await;
        match result {
            Ok(()) => {
                let count = {
                    let mut states = self.states.write().await;
                    states.get_mut(plugin_id).map_or(0, |s| {
                        s.restart_count += 1;
                        s.restart_count
                    })
                };
                self.record(plugin_id, LifecycleEventType::Restart, from, to, started, None)
                    .await;
                info!(plugin_id = %plugin_id, restart_count = count, "Plugin restarted");
                Ok(())
            }
            Err(e) => {
                self.record(
                    plugin_id,
                    LifecycleEventType::Restart,
                    from,
                    to,
                    started,
                    Some(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// 실행 중이면 먼저 중지, 이후 `cleanup` 호출, 샌드박스/레지스트리/상태 레코드 삭제
    pub async fn cleanup_plugin(&self, plugin_id: &str) -> Result<()> {
        let mut from = self.current_state(plugin_id).await;
        let plugin = self.plugin(plugin_id).await?;

        if from == PluginState::Running {
            if let Err(e) = self.stop_plugin(plugin_id).await {
                warn!(plugin_id = %plugin_id, error = %e, "Stop before cleanup failed");
            }
            from = self.current_state(plugin_id).await;
        }
        if from.is_transitional() {
            return Err(Error::transition(plugin_id, from, PluginState::Unloaded));
        }

        let started = Instant::now();
        if let Err(e) = self.run_hooks(HookPoint::BeforeCleanup, plugin_id, from).await {
            self.record(plugin_id, LifecycleEventType::Cleanup, from, from, started, Some(e.to_string()))
                .await;
            return Err(e);
        }

        let ctx = self.context(plugin_id);
        let result = isolated(plugin_id, "cleanup", async move { plugin.cleanup(&ctx).await }).await;
        if let Err(e) = result {
            let msg = e.to_string();
            self.set_state(plugin_id, PluginState::Error, Some(&msg)).await;
            self.record(
                plugin_id,
                LifecycleEventType::Cleanup,
                from,
                PluginState::Error,
                started,
                Some(msg),
            )
            .await;
            error!(plugin_id = %plugin_id, error = %e, "Plugin cleanup failed");
            return Err(e);
        }

        if let Err(e) = self.sandbox.remove_plugin(plugin_id).await {
            debug!(plugin_id = %plugin_id, error = %e, "No sandbox to remove");
        }
        if let Err(e) = self.registry.unregister(plugin_id).await {
            debug!(plugin_id = %plugin_id, error = %e, "Plugin was not registered");
        }
        self.states.write().await.remove(plugin_id);

        self.record(
            plugin_id,
            LifecycleEventType::Cleanup,
            from,
            PluginState::Unloaded,
            started,
            None,
        )
        .await;
        info!(plugin_id = %plugin_id, from = %from, "Plugin cleaned up");

        self.run_hooks(HookPoint::AfterCleanup, plugin_id, PluginState::Unloaded)
            .await
            .ok();
        Ok(())
    }

    /// 공통 전이 절차
    #[allow(clippy::too_many_arguments)]
    async fn transition<F, Fut>(
        &self,
        plugin_id: &str,
        kind: LifecycleEventType,
        (before, after): (HookPoint, HookPoint),
        allowed: fn(&PluginState) -> bool,
        (via, target): (PluginState, PluginState),
        config: Option<PluginConfig>,
        call: F,
    ) -> Result<()>
    where
        F: FnOnce(Arc<dyn Plugin>, PluginContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let from = self.current_state(plugin_id).await;
        if !allowed(&from) {
            return Err(Error::transition(plugin_id, from, via));
        }
        let plugin = self.plugin(plugin_id).await?;

        let started = Instant::now();
        if let Err(e) = self.run_hooks(before, plugin_id, from).await {
            self.record(plugin_id, kind, from, from, started, Some(e.to_string()))
                .await;
            return Err(e);
        }

        // 훅 실행 중 다른 호출이 상태를 바꿨을 수 있으므로 잠금 안에서 다시 확인
        {
            let mut states = self.states.write().await;
            let record = states
                .entry(plugin_id.to_string())
                .or_insert_with(|| LifecycleState::new(plugin_id, from));
            if !allowed(&record.current) {
                return Err(Error::transition(plugin_id, record.current, via));
            }
            record.transition(via);
            if let Some(config) = config {
                record.config = config;
            }
        }
        self.sync_registry(plugin_id, via).await;

        match call(plugin, self.context(plugin_id)).await {
            Ok(()) => {
                self.set_state(plugin_id, target, None).await;
                self.record(plugin_id, kind, from, target, started, None).await;
                info!(plugin_id = %plugin_id, from = %from, to = %target, "Plugin {}", kind);

                self.run_hooks(after, plugin_id, target).await.ok();
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                self.set_state(plugin_id, PluginState::Error, Some(&msg)).await;
                self.record(plugin_id, kind, from, PluginState::Error, started, Some(msg))
                    .await;
                error!(plugin_id = %plugin_id, op = %kind, error = %e, "Lifecycle call failed");
                Err(e)
            }
        }
    }

    // ========================================================================
    // 상태 / 이력
    // ========================================================================

    /// 상태 레코드가 없으면 레지스트리 상태, 그것도 없으면 `Unloaded`
    pub async fn current_state(&self, plugin_id: &str) -> PluginState {
        if let Some(state) = self.states.read().await.get(plugin_id) {
            return state.current;
        }
        self.registry
            .get_status(plugin_id)
            .await
            .unwrap_or(PluginState::Unloaded)
    }

    pub async fn get_lifecycle_state(&self, plugin_id: &str) -> Result<LifecycleState> {
        self.states
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("lifecycle state for plugin {}", plugin_id)))
    }

    /// ID 순
    pub async fn list_lifecycle_states(&self) -> Vec<LifecycleState> {
        let mut list: Vec<_> = self.states.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        list
    }

    /// 최신순, 최대 `limit`건
    pub async fn get_lifecycle_history(&self, plugin_id: &str, limit: usize) -> Vec<LifecycleEvent> {
        self.history
            .read()
            .await
            .get(plugin_id)
            .map(|events| events.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    async fn set_state(&self, plugin_id: &str, to: PluginState, error: Option<&str>) {
        {
            let mut states = self.states.write().await;
            let record = states
                .entry(plugin_id.to_string())
                .or_insert_with(|| LifecycleState::new(plugin_id, to));
            record.transition(to);
            if let Some(error) = error {
                record.last_error = Some(error.to_string());
            }
        }
        self.sync_registry(plugin_id, to).await;
    }

    /// 레지스트리 상태 동기화 (별도 임계 구역)
    async fn sync_registry(&self, plugin_id: &str, state: PluginState) {
        if let Err(e) = self.registry.update_status(plugin_id, state).await {
            debug!(plugin_id = %plugin_id, error = %e, "Registry status not updated");
        }
    }

    async fn record(
        &self,
        plugin_id: &str,
        event_type: LifecycleEventType,
        from: PluginState,
        to: PluginState,
        started: Instant,
        error: Option<String>,
    ) {
        let event = LifecycleEvent {
            event_type,
            plugin_id: plugin_id.to_string(),
            from,
            to,
            duration: started.elapsed(),
            success: error.is_none(),
            error,
            timestamp: Utc::now(),
        };

        let cap = self.settings.history_size.max(1);
        let mut history = self.history.write().await;
        let events = history.entry(plugin_id.to_string()).or_default();
        events.push_back(event);
        while events.len() > cap {
            events.pop_front();
        }
    }

    async fn plugin(&self, plugin_id: &str) -> Result<Arc<dyn Plugin>> {
        self.provider
            .get_plugin(plugin_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin {}", plugin_id)))
    }

    fn context(&self, plugin_id: &str) -> PluginContext {
        PluginContext::with_parent(plugin_id, &self.root)
    }

    // ========================================================================
    // 훅
    // ========================================================================

    /// 훅 등록 - 같은 지점의 같은 이름은 교체
    pub async fn set_lifecycle_hook(&self, point: HookPoint, registration: HookRegistration) -> Result<()> {
        if registration.name.trim().is_empty() {
            return Err(Error::InvalidInput("hook name is required".into()));
        }

        let mut hooks = self.hooks.write().await;
        let list = hooks.entry(point).or_default();
        list.retain(|r| r.name != registration.name);
        debug!(point = %point, hook = %registration.name, "Lifecycle hook set");
        list.push(registration);
        Ok(())
    }

    pub async fn remove_lifecycle_hook(&self, point: HookPoint, name: &str) -> Result<()> {
        let mut hooks = self.hooks.write().await;
        let list = hooks.entry(point).or_default();
        let before = list.len();
        list.retain(|r| r.name != name);

        if list.len() == before {
            return Err(Error::NotFound(format!("hook {} at {}", name, point)));
        }
        Ok(())
    }

    pub async fn set_hook_enabled(&self, point: HookPoint, name: &str, enabled: bool) -> Result<()> {
        let mut hooks = self.hooks.write().await;
        let hook = hooks
            .get_mut(&point)
            .and_then(|list| list.iter_mut().find(|r| r.name == name))
            .ok_or_else(|| Error::NotFound(format!("hook {} at {}", name, point)))?;
        hook.enabled = enabled;
        Ok(())
    }

    /// 실행 순서대로
    pub async fn list_hooks(&self, point: HookPoint) -> Vec<HookRegistration> {
        let mut list = self.hooks.read().await.get(&point).cloned().unwrap_or_default();
        list.sort_by_key(|r| r.priority);
        list
    }

    /// 우선순위 오름차순 실행. before 훅은 첫 실패에서 중단, after 훅은 로그만
    async fn run_hooks(&self, point: HookPoint, plugin_id: &str, state: PluginState) -> Result<()> {
        let mut hooks: Vec<HookRegistration> = self
            .hooks
            .read()
            .await
            .get(&point)
            .map(|list| list.iter().filter(|r| r.applies_to(plugin_id)).cloned().collect())
            .unwrap_or_default();
        if hooks.is_empty() {
            return Ok(());
        }
        hooks.sort_by_key(|r| r.priority);

        let ctx = HookContext {
            plugin_id: plugin_id.to_string(),
            point,
            state,
        };

        let mut first_error = None;
        for registration in hooks {
            if let Err(e) = registration.hook.run(&ctx).await {
                warn!(
                    plugin_id = %plugin_id,
                    point = %point,
                    hook = %registration.name,
                    error = %e,
                    "Lifecycle hook failed"
                );
                if point.is_before() {
                    return Err(e);
                }
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ========================================================================
    // 헬스 체크
    // ========================================================================

    /// 실행 중인 플러그인의 헬스 상태 점검
    ///
    /// 정상이면 레지스트리 하트비트 갱신, 비정상이면 이력 기록 후 (설정 시) 재시작.
    pub async fn check_health(&self) -> Vec<(String, HealthStatus)> {
        let running: Vec<String> = self
            .states
            .read()
            .await
            .values()
            .filter(|s| s.current == PluginState::Running)
            .map(|s| s.plugin_id.clone())
            .collect();

        let mut report = Vec::with_capacity(running.len());
        for plugin_id in running {
            let Some(plugin) = self.provider.get_plugin(&plugin_id).await else {
                continue;
            };

            let started = Instant::now();
            let status = plugin.status();
            match status.health {
                HealthStatus::Unhealthy => {
                    let reason = status
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "plugin reported unhealthy".to_string());
                    warn!(plugin_id = %plugin_id, reason = %reason, "Plugin unhealthy");
                    self.record(
                        &plugin_id,
                        LifecycleEventType::HealthCheck,
                        PluginState::Running,
                        PluginState::Running,
                        started,
                        Some(reason),
                    )
                    .await;

                    if self.settings.auto_restart {
                        if let Err(e) = self.restart_plugin(&plugin_id).await {
                            error!(plugin_id = %plugin_id, error = %e, "Auto-restart failed");
                        }
                    }
                }
                _ => {
                    if let Err(e) = self.registry.heartbeat(&plugin_id).await {
                        debug!(plugin_id = %plugin_id, error = %e, "Heartbeat skipped");
                    }
                }
            }
            report.push((plugin_id, status.health));
        }
        report
    }

    /// 주기 헬스 체크 시작 (이미 실행 중이면 무시)
    pub fn start_health_checks(self: &Arc<Self>) {
        let mut slot = self.health.lock();
        if slot.is_some() {
            return;
        }

        let token = self.root.child_token();
        let cancel = token.clone();
        let this = Arc::clone(self);
        let period = self.settings.health_check_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.check_health().await;
                    }
                }
            }
            debug!("Health checks stopped");
        });

        *slot = Some((token, handle));
        info!(interval_ms = period.as_millis() as u64, "Health checks started");
    }

    /// 모든 플러그인 컨텍스트에 취소 신호 전달 (엔진 종료 시작)
    pub fn cancel_contexts(&self) {
        self.root.cancel();
    }

    /// 플러그인 호출 없이 상태 레코드만 삭제 (이력은 유지)
    pub async fn discard_state(&self, plugin_id: &str) {
        self.states.write().await.remove(plugin_id);
    }

    pub async fn stop_health_checks(&self) {
        let running = self.health.lock().take();
        if let Some((token, handle)) = running {
            token.cancel();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::FnHook;
    use crate::plugin::{PluginManager, StaticPluginLoader};
    use crate::testing::MockPlugin;
    use plugrun_foundation::{PluginMetadata, SandboxSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixture {
        lifecycle: Arc<LifecycleManager>,
        registry: Arc<PluginRegistry>,
        plugins: Arc<PluginManager>,
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(PluginRegistry::new());
        let plugins = Arc::new(PluginManager::new(Arc::new(StaticPluginLoader::new())));
        let sandbox = Arc::new(SandboxManager::new(SandboxSettings::default()));
        let settings = LifecycleSettings {
            restart_delay: Duration::from_millis(5),
            history_size: 4,
            ..Default::default()
        };
        let lifecycle = Arc::new(LifecycleManager::new(
            registry.clone(),
            plugins.clone(),
            sandbox,
            settings,
        ));
        Fixture {
            lifecycle,
            registry,
            plugins,
        }
    }

    async fn load(f: &Fixture, id: &str) -> Arc<MockPlugin> {
        let plugin = Arc::new(MockPlugin::new(id));
        f.registry.register(plugin.metadata()).await.unwrap();
        f.plugins.add(plugin.clone()).await.unwrap();
        plugin
    }

    #[tokio::test]
    async fn test_start_preconditions() {
        let f = fixture().await;
        let _plugin = load(&f, "p").await;

        // Loaded -> Starting 불가
        let err = f.lifecycle.start_plugin("p").await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(f.lifecycle.current_state("p").await, PluginState::Loaded);

        f.lifecycle
            .initialize_plugin("p", PluginConfig::new())
            .await
            .unwrap();
        f.lifecycle.start_plugin("p").await.unwrap();
        assert_eq!(f.lifecycle.current_state("p").await, PluginState::Running);
        assert_eq!(f.registry.get_status("p").await.unwrap(), PluginState::Running);

        // Running -> Starting 불가, 상태 유지
        assert!(f.lifecycle.start_plugin("p").await.is_err());
        assert_eq!(f.lifecycle.current_state("p").await, PluginState::Running);

        f.lifecycle.stop_plugin("p").await.unwrap();
        f.lifecycle.start_plugin("p").await.unwrap();

        let state = f.lifecycle.get_lifecycle_state("p").await.unwrap();
        assert_eq!(state.previous, PluginState::Starting);
        assert!(state.started_at.is_some() && state.stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_plugin_failure_moves_to_error_and_restart_recovers() {
        let f = fixture().await;
        let plugin = load(&f, "p").await;
        let mut config = PluginConfig::new();
        config.insert("mode".into(), serde_json::json!("fast"));

        f.lifecycle.initialize_plugin("p", config).await.unwrap();
        plugin.fail_on("start");
        assert!(f.lifecycle.start_plugin("p").await.is_err());

        let state = f.lifecycle.get_lifecycle_state("p").await.unwrap();
        assert_eq!(state.current, PluginState::Error);
        assert!(state.last_error.unwrap().contains("start failed"));

        plugin.recover("start");
        f.lifecycle.restart_plugin("p").await.unwrap();

        let state = f.lifecycle.get_lifecycle_state("p").await.unwrap();
        assert_eq!(state.current, PluginState::Running);
        assert_eq!(state.restart_count, 1);
        assert_eq!(plugin.call_count("initialize"), 2);
        // 재초기화에 마지막 설정 재사용
        let seen = plugin.last_config.lock().clone().unwrap();
        assert_eq!(seen["mode"], "fast");
    }

    #[tokio::test]
    async fn test_restart_running_stops_then_starts() {
        let f = fixture().await;
        let plugin = load(&f, "p").await;
        f.lifecycle
            .initialize_plugin("p", PluginConfig::new())
            .await
            .unwrap();
        f.lifecycle.start_plugin("p").await.unwrap();
        f.lifecycle.restart_plugin("p").await.unwrap();

        assert_eq!(plugin.call_count("stop"), 1);
        assert_eq!(plugin.call_count("start"), 2);

        let history = f.lifecycle.get_lifecycle_history("p", 10).await;
        assert_eq!(history[0].event_type, LifecycleEventType::Restart);
        // 상한 4
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_hooks_order_and_before_abort() {
        let f = fixture().await;
        let plugin = load(&f, "p").await;
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for (name, priority) in [("second", 10), ("first", -1)] {
            let order = order.clone();
            f.lifecycle
                .set_lifecycle_hook(
                    HookPoint::BeforeInitialize,
                    HookRegistration::new(
                        name,
                        FnHook::new(move |_: &HookContext| {
                            order.lock().push(name);
                            Ok(())
                        }),
                    )
                    .with_priority(priority),
                )
                .await
                .unwrap();
        }

        f.lifecycle
            .set_lifecycle_hook(
                HookPoint::BeforeStart,
                HookRegistration::new(
                    "deny",
                    FnHook::new(|_: &HookContext| Err(Error::PermissionDenied("maintenance".into()))),
                )
                .for_plugin("p"),
            )
            .await
            .unwrap();

        f.lifecycle
            .initialize_plugin("p", PluginConfig::new())
            .await
            .unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);

        let err = f.lifecycle.start_plugin("p").await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(plugin.call_count("start"), 0);
        assert_eq!(f.lifecycle.current_state("p").await, PluginState::Initialized);

        f.lifecycle
            .set_hook_enabled(HookPoint::BeforeStart, "deny", false)
            .await
            .unwrap();
        f.lifecycle.start_plugin("p").await.unwrap();

        f.lifecycle
            .remove_lifecycle_hook(HookPoint::BeforeStart, "deny")
            .await
            .unwrap();
        assert!(f
            .lifecycle
            .remove_lifecycle_hook(HookPoint::BeforeStart, "deny")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_after_hook_failure_is_not_fatal() {
        let f = fixture().await;
        load(&f, "p").await;
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        f.lifecycle
            .set_lifecycle_hook(
                HookPoint::AfterInitialize,
                HookRegistration::new(
                    "flaky",
                    FnHook::new(move |_: &HookContext| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(Error::Internal("after hook".into()))
                    }),
                ),
            )
            .await
            .unwrap();

        f.lifecycle
            .initialize_plugin("p", PluginConfig::new())
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(f.lifecycle.current_state("p").await, PluginState::Initialized);
    }

    #[tokio::test]
    async fn test_cleanup_stops_unregisters_and_discards_state() {
        let f = fixture().await;
        let plugin = load(&f, "p").await;
        f.lifecycle
            .initialize_plugin("p", PluginConfig::new())
            .await
            .unwrap();
        f.lifecycle.start_plugin("p").await.unwrap();

        f.lifecycle.cleanup_plugin("p").await.unwrap();
        assert_eq!(plugin.call_count("stop"), 1);
        assert_eq!(plugin.call_count("cleanup"), 1);
        assert!(!f.registry.contains("p").await);
        assert!(f.lifecycle.get_lifecycle_state("p").await.is_err());
        assert_eq!(f.lifecycle.current_state("p").await, PluginState::Unloaded);

        // Unloaded -> Starting 불가
        assert!(matches!(
            f.lifecycle.start_plugin("p").await,
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_check_heartbeat_and_auto_restart() {
        let registry = Arc::new(PluginRegistry::new());
        let plugins = Arc::new(PluginManager::new(Arc::new(StaticPluginLoader::new())));
        let lifecycle = LifecycleManager::new(
            registry.clone(),
            plugins.clone(),
            Arc::new(SandboxManager::new(SandboxSettings::default())),
            LifecycleSettings {
                auto_restart: true,
                restart_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );

        let plugin = Arc::new(MockPlugin::with_metadata(PluginMetadata::new("h", "h", "1.0.0")));
        registry.register(plugin.metadata()).await.unwrap();
        plugins.add(plugin.clone()).await.unwrap();
        lifecycle.initialize_plugin("h", PluginConfig::new()).await.unwrap();
        lifecycle.start_plugin("h").await.unwrap();

        let report = lifecycle.check_health().await;
        assert_eq!(report, vec![("h".to_string(), HealthStatus::Healthy)]);
        assert!(registry.get("h").await.unwrap().last_heartbeat.is_some());

        plugin.set_health(HealthStatus::Unhealthy);
        lifecycle.check_health().await;
        let state = lifecycle.get_lifecycle_state("h").await.unwrap();
        assert_eq!(state.restart_count, 1);

        let history = lifecycle.get_lifecycle_history("h", 100).await;
        assert!(history
            .iter()
            .any(|e| e.event_type == LifecycleEventType::HealthCheck && !e.success));
    }
}
