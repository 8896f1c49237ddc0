//! Sandbox Manager - 보안 컨텍스트/리소스 제한 보관 및 초기화 게이트

use super::limits::ResourceLimits;
use super::security::SecurityContext;
use crate::plugin::isolated;
use parking_lot::Mutex;
use plugrun_foundation::{
    Error, Plugin, PluginConfig, PluginContext, ProcessSnapshot, Result, SandboxSettings,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 초기화 설정에 주입되는 보안 컨텍스트 키
pub const SECURITY_CONTEXT_KEY: &str = "securityContext";

/// 초기화 설정에 주입되는 리소스 제한 키
pub const RESOURCE_LIMITS_KEY: &str = "resourceLimits";

/// 샘플러가 발견한 제한 초과 (경고 전용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitBreach {
    pub plugin_id: String,
    /// `memory` | `workers`
    pub resource: String,
    pub observed: u64,
    pub limit: u64,
}

/// 샌드박스 매니저
///
/// 제한은 관찰/경고 전용이다. 초과해도 플러그인을 중지하거나 제한하지 않는다.
pub struct SandboxManager {
    contexts: RwLock<HashMap<String, SecurityContext>>,
    limits: RwLock<HashMap<String, ResourceLimits>>,
    settings: SandboxSettings,
    sampler: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SandboxManager {
    pub fn new(settings: SandboxSettings) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            limits: RwLock::new(HashMap::new()),
            settings,
            sampler: Mutex::new(None),
        }
    }

    // ========================================================================
    // 초기화 게이트
    // ========================================================================

    /// 보안 컨텍스트/제한을 만들고 설정에 주입한 뒤 플러그인 `initialize` 호출
    ///
    /// 호출이 실패하면 두 레코드 모두 제거된다.
    pub async fn initialize_plugin(
        &self,
        plugin: Arc<dyn Plugin>,
        ctx: &PluginContext,
        config: &PluginConfig,
    ) -> Result<()> {
        let metadata = plugin.metadata();
        let id = metadata.id.clone();

        let security = SecurityContext::from_declaration(&metadata, config);
        let limits = ResourceLimits::for_metadata(&metadata);

        let mut injected = config.clone();
        injected.insert(
            SECURITY_CONTEXT_KEY.to_string(),
            serde_json::to_value(&security)?,
        );
        injected.insert(
            RESOURCE_LIMITS_KEY.to_string(),
            serde_json::to_value(&limits)?,
        );

        self.contexts.write().await.insert(id.clone(), security);
        self.limits.write().await.insert(id.clone(), limits);

        let call_ctx = ctx.clone();
        let result = isolated(&id, "initialize", async move {
            plugin.initialize(&call_ctx, &injected).await
        })
        .await;

        if let Err(e) = result {
            self.contexts.write().await.remove(&id);
            self.limits.write().await.remove(&id);
            warn!(plugin_id = %id, error = %e, "Sandbox rolled back after failed initialize");
            return Err(e);
        }

        debug!(plugin_id = %id, "Plugin sandboxed");
        Ok(())
    }

    /// 두 레코드 모두 삭제 - 어느 쪽도 없으면 `NotFound`
    pub async fn remove_plugin(&self, plugin_id: &str) -> Result<()> {
        let had_context = self.contexts.write().await.remove(plugin_id).is_some();
        let had_limits = self.limits.write().await.remove(plugin_id).is_some();

        if !had_context && !had_limits {
            return Err(Error::NotFound(format!("sandbox for plugin {}", plugin_id)));
        }
        debug!(plugin_id = %plugin_id, "Sandbox removed");
        Ok(())
    }

    pub async fn is_sandboxed(&self, plugin_id: &str) -> bool {
        self.contexts.read().await.contains_key(plugin_id)
    }

    /// 샌드박스된 플러그인 ID (정렬)
    pub async fn sandboxed_plugins(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.contexts.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // 조회 / 변경
    // ========================================================================

    pub async fn get_security_context(&self, plugin_id: &str) -> Result<SecurityContext> {
        self.contexts
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("security context for plugin {}", plugin_id)))
    }

    pub async fn get_resource_limits(&self, plugin_id: &str) -> Result<ResourceLimits> {
        self.limits
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("resource limits for plugin {}", plugin_id)))
    }

    /// 검증 후 교체 - 샌드박스되지 않은 플러그인은 `NotFound`
    pub async fn set_resource_limits(&self, plugin_id: &str, limits: ResourceLimits) -> Result<()> {
        limits.validate()?;

        let mut all = self.limits.write().await;
        let slot = all
            .get_mut(plugin_id)
            .ok_or_else(|| Error::NotFound(format!("resource limits for plugin {}", plugin_id)))?;
        *slot = limits;

        info!(plugin_id = %plugin_id, "Resource limits replaced");
        Ok(())
    }

    // ========================================================================
    // 접근 검사
    // ========================================================================

    /// 권한 검사 - 정확히 일치하거나 `*`
    pub async fn check_permission(&self, plugin_id: &str, permission: &str) -> Result<()> {
        let ctx = self.get_security_context(plugin_id).await?;
        if ctx.has_permission(permission) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "plugin {} lacks permission {}",
                plugin_id, permission
            )))
        }
    }

    /// 경로 검사 - 허용 경로의 하위이거나 `*`
    pub async fn check_path_access(&self, plugin_id: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let ctx = self.get_security_context(plugin_id).await?;
        if ctx.allows_path(path) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "plugin {} may not access {}",
                plugin_id,
                path.display()
            )))
        }
    }

    /// 호스트 검사 - 정확히 일치하거나 `*`
    pub async fn check_network_access(&self, plugin_id: &str, host: &str) -> Result<()> {
        let ctx = self.get_security_context(plugin_id).await?;
        if ctx.allows_host(host) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "plugin {} may not connect to {}",
                plugin_id, host
            )))
        }
    }

    // ========================================================================
    // 샘플러
    // ========================================================================

    /// 프로세스 전역 사용량을 각 플러그인 제한과 비교 (경고만 기록)
    pub async fn check_limits(&self, snapshot: &ProcessSnapshot) -> Vec<LimitBreach> {
        let limits = self.limits.read().await;
        let mut breaches = Vec::new();

        for (plugin_id, limit) in limits.iter() {
            if snapshot.memory_bytes > limit.max_memory_bytes {
                breaches.push(LimitBreach {
                    plugin_id: plugin_id.clone(),
                    resource: "memory".into(),
                    observed: snapshot.memory_bytes,
                    limit: limit.max_memory_bytes,
                });
            }
            if snapshot.worker_count as u64 > u64::from(limit.max_workers) {
                breaches.push(LimitBreach {
                    plugin_id: plugin_id.clone(),
                    resource: "workers".into(),
                    observed: snapshot.worker_count as u64,
                    limit: u64::from(limit.max_workers),
                });
            }
        }

        for breach in &breaches {
            warn!(
                plugin_id = %breach.plugin_id,
                resource = %breach.resource,
                observed = breach.observed,
                limit = breach.limit,
                "Resource limit exceeded"
            );
        }
        breaches
    }

    /// 주기 샘플러 시작 (`sampler_enabled`가 꺼져 있으면 아무것도 하지 않음)
    pub fn start_sampler(self: &Arc<Self>) -> bool {
        if !self.settings.sampler_enabled {
            return false;
        }

        let mut slot = self.sampler.lock();
        if slot.is_some() {
            return true;
        }

        let token = CancellationToken::new();
        let cancel = token.clone();
        let this = Arc::clone(self);
        let period = self.settings.sampler_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.check_limits(&ProcessSnapshot::capture()).await;
                    }
                }
            }
            debug!("Sandbox sampler stopped");
        });

        *slot = Some((token, handle));
        info!(interval_ms = period.as_millis() as u64, "Sandbox sampler started");
        true
    }

    pub async fn stop_sampler(&self) {
        let running = self.sampler.lock().take();
        if let Some((token, handle)) = running {
            token.cancel();
            let _ = handle.await;
        }
    }
}
