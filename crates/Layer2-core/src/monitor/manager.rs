//! Monitor Manager - 주기 샘플링과 임계값 알림

use super::types::{
    Alert, AlertSeverity, AlertThresholds, MetricsSnapshot, PluginSample, SystemMetrics,
};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use plugrun_foundation::{
    event_kinds, Error, Event, EventBus, EventPriority, MonitorSettings, PluginMetrics,
    PluginProvider, ProcessSnapshot, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 보관하는 해결된 알림 상한
const MAX_RESOLVED_ALERTS: usize = 1000;

/// 모니터
///
/// 같은 (플러그인, 종류)의 미해결 알림은 하나만 유지한다.
pub struct MonitorManager {
    provider: Arc<dyn PluginProvider>,
    settings: MonitorSettings,

    /// 모니터링 대상 -> 마지막 샘플
    monitored: RwLock<HashMap<String, Option<PluginSample>>>,
    thresholds: RwLock<HashMap<String, AlertThresholds>>,
    alerts: RwLock<Vec<Alert>>,
    system: RwLock<SystemMetrics>,

    /// 알림을 `monitor.alert`로 발행
    bus: Option<Arc<EventBus>>,

    ticker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl MonitorManager {
    pub fn new(provider: Arc<dyn PluginProvider>, settings: MonitorSettings) -> Self {
        Self {
            provider,
            settings,
            monitored: RwLock::new(HashMap::new()),
            thresholds: RwLock::new(HashMap::new()),
            alerts: RwLock::new(Vec::new()),
            system: RwLock::new(SystemMetrics::default()),
            bus: None,
            ticker: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    // ========================================================================
    // 대상 등록
    // ========================================================================

    /// 모니터링 시작 - 임계값이 없으면 설정의 기본값 적용. 이미 대상이면 그대로 둠
    pub async fn start_monitoring(&self, plugin_id: &str) -> Result<()> {
        if plugin_id.trim().is_empty() {
            return Err(Error::InvalidInput("plugin id is required".into()));
        }
        if self.provider.get_plugin(plugin_id).await.is_none() {
            return Err(Error::NotFound(format!("plugin {}", plugin_id)));
        }

        let mut monitored = self.monitored.write().await;
        if monitored.contains_key(plugin_id) {
            debug!(plugin_id = %plugin_id, "Plugin already monitored");
            return Ok(());
        }
        monitored.insert(plugin_id.to_string(), None);
        drop(monitored);

        self.thresholds
            .write()
            .await
            .entry(plugin_id.to_string())
            .or_insert_with(|| AlertThresholds::from(&self.settings.thresholds));

        info!(plugin_id = %plugin_id, "Monitoring started");
        Ok(())
    }

    /// 모니터링 중지 - 미해결 알림도 해결 처리
    pub async fn stop_monitoring(&self, plugin_id: &str) -> Result<()> {
        if self.monitored.write().await.remove(plugin_id).is_none() {
            return Err(Error::NotFound(format!("monitored plugin {}", plugin_id)));
        }
        let cleared = self.clear_alerts(plugin_id).await;
        info!(plugin_id = %plugin_id, cleared, "Monitoring stopped");
        Ok(())
    }

    pub async fn is_monitored(&self, plugin_id: &str) -> bool {
        self.monitored.read().await.contains_key(plugin_id)
    }

    pub async fn monitored_plugins(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.monitored.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // 임계값
    // ========================================================================

    pub async fn set_alert_thresholds(&self, plugin_id: &str, thresholds: AlertThresholds) -> Result<()> {
        if plugin_id.trim().is_empty() {
            return Err(Error::InvalidInput("plugin id is required".into()));
        }
        self.thresholds
            .write()
            .await
            .insert(plugin_id.to_string(), thresholds);
        Ok(())
    }

    pub async fn get_alert_thresholds(&self, plugin_id: &str) -> Result<AlertThresholds> {
        self.thresholds
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("alert thresholds for plugin {}", plugin_id)))
    }

    // ========================================================================
    // 샘플링
    // ========================================================================

    /// 한 주기 실행 - 새로 발생한 알림 반환
    pub async fn collect_metrics(&self) -> Vec<Alert> {
        let ids: Vec<String> = self.monitored.read().await.keys().cloned().collect();
        let mut raised = Vec::new();

        for plugin_id in &ids {
            let Some(plugin) = self.provider.get_plugin(plugin_id).await else {
                debug!(plugin_id = %plugin_id, "Monitored plugin no longer loaded");
                continue;
            };

            let status = plugin.status();
            let sample = PluginSample {
                plugin_id: plugin_id.clone(),
                metrics: status.metrics.clone(),
                health: status.health,
                sampled_at: Utc::now(),
            };
            if let Some(slot) = self.monitored.write().await.get_mut(plugin_id) {
                *slot = Some(sample);
            }

            match self.evaluate_metrics(plugin_id, &status.metrics).await {
                Ok(mut alerts) => raised.append(&mut alerts),
                Err(e) => debug!(plugin_id = %plugin_id, error = %e, "No thresholds"),
            }
        }

        self.refresh_system_metrics().await;
        raised
    }

    /// 임계값과 비교해 알림 생성 (중복 미해결 알림은 건너뜀)
    pub async fn evaluate_metrics(&self, plugin_id: &str, metrics: &PluginMetrics) -> Result<Vec<Alert>> {
        let thresholds = self.get_alert_thresholds(plugin_id).await?;
        let mut raised = Vec::new();

        for (kind, value, threshold) in thresholds.breaches(metrics) {
            let alert = {
                let mut alerts = self.alerts.write().await;
                let duplicate = alerts
                    .iter()
                    .any(|a| !a.resolved && a.plugin_id == plugin_id && a.alert_type == kind);
                if duplicate {
                    continue;
                }
                let alert = Alert::new(plugin_id, kind, value, threshold);
                alerts.push(alert.clone());
                alert
            };

            warn!(
                plugin_id = %plugin_id,
                alert_type = %kind,
                severity = ?alert.severity,
                value,
                threshold,
                "Alert raised"
            );
            self.publish_alert(&alert).await;
            raised.push(alert);
        }

        Ok(raised)
    }

    async fn publish_alert(&self, alert: &Alert) {
        let Some(bus) = &self.bus else {
            return;
        };

        let data = match serde_json::to_value(alert) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to encode alert");
                return;
            }
        };
        let priority = match alert.severity {
            AlertSeverity::Critical => EventPriority::Critical,
            AlertSeverity::Warning => EventPriority::High,
            AlertSeverity::Info => EventPriority::Normal,
        };
        let event = Event::new(event_kinds::MONITOR_ALERT, "monitor", data).with_priority(priority);

        if let Err(e) = bus.publish(event).await {
            warn!(error = %e, "Failed to publish alert");
        }
    }

    async fn refresh_system_metrics(&self) {
        let snapshot = ProcessSnapshot::capture();
        let total = self.provider.plugin_ids().await.len();

        let window = ChronoDuration::from_std(self.settings.interval * 2)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        let cutoff = Utc::now() - window;
        let active = self
            .monitored
            .read()
            .await
            .values()
            .filter(|s| s.as_ref().is_some_and(|s| s.sampled_at >= cutoff))
            .count();

        *self.system.write().await = SystemMetrics {
            cpu_count: snapshot.cpu_count,
            memory_bytes: snapshot.memory_bytes,
            worker_count: snapshot.worker_count,
            total_plugins: total,
            active_plugins: active,
            timestamp: Some(Utc::now()),
        };
    }

    // ========================================================================
    // 알림
    // ========================================================================

    /// 플러그인의 미해결 알림 모두 해결 - 해결된 건수
    pub async fn clear_alerts(&self, plugin_id: &str) -> usize {
        let mut alerts = self.alerts.write().await;
        let mut cleared = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| !a.resolved && a.plugin_id == plugin_id)
        {
            alert.resolve();
            cleared += 1;
        }
        Self::prune(&mut alerts);
        cleared
    }

    /// 알림 1건 해결 - 없는 ID는 `NotFound`
    pub async fn resolve_alert(&self, alert_id: &str) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| Error::NotFound(format!("alert {}", alert_id)))?;
        alert.resolve();
        Self::prune(&mut alerts);
        Ok(())
    }

    /// 해결된 알림이 상한을 넘으면 오래된 것부터 제거
    fn prune(alerts: &mut Vec<Alert>) {
        let resolved = alerts.iter().filter(|a| a.resolved).count();
        let mut excess = resolved.saturating_sub(MAX_RESOLVED_ALERTS);
        if excess > 0 {
            alerts.retain(|a| {
                if a.resolved && excess > 0 {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }

    /// 플러그인의 전체 알림 (최신순)
    pub async fn get_alerts(&self, plugin_id: &str) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .rev()
            .filter(|a| a.plugin_id == plugin_id)
            .cloned()
            .collect()
    }

    /// 미해결 알림 (최신순)
    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .rev()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    // ========================================================================
    // 메트릭 조회
    // ========================================================================

    pub async fn get_plugin_metrics(&self, plugin_id: &str) -> Result<PluginSample> {
        self.monitored
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .flatten()
            .ok_or_else(|| Error::NotFound(format!("metrics for plugin {}", plugin_id)))
    }

    pub async fn get_system_metrics(&self) -> SystemMetrics {
        self.system.read().await.clone()
    }

    /// 시스템 + 플러그인별 + 미해결 알림
    pub async fn get_all_metrics(&self) -> MetricsSnapshot {
        let mut plugins: Vec<PluginSample> = self
            .monitored
            .read()
            .await
            .values()
            .filter_map(|s| s.clone())
            .collect();
        plugins.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));

        MetricsSnapshot {
            system: self.get_system_metrics().await,
            plugins,
            alerts: self.get_active_alerts().await,
            timestamp: Utc::now(),
        }
    }

    // ========================================================================
    // 주기 실행
    // ========================================================================

    /// 주기 샘플링 시작 (이미 실행 중이면 무시)
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.ticker.lock();
        if slot.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let cancel = token.clone();
        let this = Arc::clone(self);
        let period = self.settings.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.collect_metrics().await;
                    }
                }
            }
            debug!("Monitor loop stopped");
        });

        *slot = Some((token, handle));
        info!(interval_ms = period.as_millis() as u64, "Monitor started");
    }

    pub async fn stop(&self) {
        let running = self.ticker.lock().take();
        if let Some((token, handle)) = running {
            token.cancel();
            let _ = handle.await;
            info!("Monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginManager, StaticPluginLoader};
    use crate::testing::MockPlugin;
    use crate::monitor::AlertType;
    use plugrun_foundation::{EventHandler, FnEventHandler};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup() -> (Arc<MonitorManager>, Arc<MockPlugin>) {
        let plugins = Arc::new(PluginManager::new(Arc::new(StaticPluginLoader::new())));
        let plugin = Arc::new(MockPlugin::new("p"));
        plugins.add(plugin.clone()).await.unwrap();
        let monitor = Arc::new(MonitorManager::new(plugins, MonitorSettings::default()));
        (monitor, plugin)
    }

    #[tokio::test]
    async fn test_duplicate_breach_suppressed_until_cleared() {
        let (monitor, plugin) = setup().await;
        monitor.start_monitoring("p").await.unwrap();
        monitor
            .set_alert_thresholds("p", AlertThresholds::disabled().with_cpu_percent(50.0))
            .await
            .unwrap();
        plugin.set_metrics(PluginMetrics {
            cpu_percent: 90.0,
            ..Default::default()
        });

        assert_eq!(monitor.collect_metrics().await.len(), 1);
        assert!(monitor.collect_metrics().await.is_empty());
        let active = monitor.get_active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].alert_type, AlertType::Cpu);
        assert_eq!(active[0].severity, AlertSeverity::Warning);

        assert_eq!(monitor.clear_alerts("p").await, 1);
        assert!(monitor.get_active_alerts().await.is_empty());

        let again = monitor.collect_metrics().await;
        assert_eq!(again.len(), 1);
        assert_ne!(again[0].id, active[0].id);
        assert_eq!(monitor.get_alerts("p").await.len(), 2);
    }

    #[tokio::test]
    async fn test_monitoring_registration() {
        let (monitor, _plugin) = setup().await;
        assert!(monitor.start_monitoring("missing").await.unwrap_err().is_not_found());
        assert!(monitor.get_alert_thresholds("p").await.is_err());

        monitor.start_monitoring("p").await.unwrap();
        let thresholds = monitor.get_alert_thresholds("p").await.unwrap();
        assert_eq!(thresholds.cpu_percent, Some(80.0));

        assert!(monitor.get_plugin_metrics("p").await.is_err());
        monitor.collect_metrics().await;
        assert!(monitor.get_plugin_metrics("p").await.is_ok());

        let system = monitor.get_system_metrics().await;
        assert_eq!(system.total_plugins, 1);
        assert_eq!(system.active_plugins, 1);
        assert!(system.cpu_count >= 1);

        monitor.stop_monitoring("p").await.unwrap();
        assert!(monitor.stop_monitoring("p").await.is_err());
    }

    #[tokio::test]
    async fn test_stop_monitoring_resolves_alerts() {
        let (monitor, plugin) = setup().await;
        monitor.start_monitoring("p").await.unwrap();
        plugin.set_metrics(PluginMetrics {
            error_count: 1000,
            ..Default::default()
        });
        let raised = monitor.collect_metrics().await;
        assert_eq!(raised[0].severity, AlertSeverity::Critical);

        monitor.stop_monitoring("p").await.unwrap();
        assert!(monitor.get_active_alerts().await.is_empty());
        assert!(monitor.resolve_alert("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_alerts_published_on_bus() {
        let plugins = Arc::new(PluginManager::new(Arc::new(StaticPluginLoader::new())));
        let plugin = Arc::new(MockPlugin::new("p"));
        plugins.add(plugin.clone()).await.unwrap();

        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handler: Arc<dyn EventHandler> = FnEventHandler::new("alerts", move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        bus.subscribe(event_kinds::MONITOR_ALERT, handler).await.unwrap();

        let monitor = MonitorManager::new(plugins, MonitorSettings::default()).with_event_bus(bus);
        monitor.start_monitoring("p").await.unwrap();
        plugin.set_metrics(PluginMetrics {
            avg_response_time_ms: 5000.0,
            ..Default::default()
        });
        monitor.collect_metrics().await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let snapshot = monitor.get_all_metrics().await;
        assert_eq!(snapshot.plugins.len(), 1);
        assert_eq!(snapshot.alerts.len(), 1);
    }
}
