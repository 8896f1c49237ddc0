//! Plugin Manager - 로드된 플러그인 인스턴스 관리

use super::loader::PluginLoader;
use async_trait::async_trait;
use plugrun_foundation::{Error, Plugin, PluginProvider, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 플러그인 매니저
///
/// 인스턴스만 보관한다. 메타데이터/상태는 레지스트리, 전이는 라이프사이클 매니저 담당.
pub struct PluginManager {
    /// 인스턴스 저장소 (ID -> Plugin)
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,

    /// 경로 로더
    loader: Arc<dyn PluginLoader>,
}

impl PluginManager {
    pub fn new(loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            loader,
        }
    }

    pub fn loader(&self) -> &Arc<dyn PluginLoader> {
        &self.loader
    }

    // ========================================================================
    // 로드 / 해제
    // ========================================================================

    /// 경로를 인스턴스로 변환 (보관하지 않음)
    pub async fn resolve(&self, path: &str) -> Result<Arc<dyn Plugin>> {
        debug!(path = %path, loader = self.loader.name(), "Resolving plugin");
        self.loader.load(path).await
    }

    /// 인스턴스 추가 - 같은 ID가 있으면 `AlreadyExists`
    pub async fn add(&self, plugin: Arc<dyn Plugin>) -> Result<String> {
        let id = plugin.metadata().id;
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("plugin id is required".into()));
        }

        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&id) {
            return Err(Error::AlreadyExists(format!("plugin instance {}", id)));
        }
        plugins.insert(id.clone(), plugin);

        debug!(plugin_id = %id, "Plugin instance added");
        Ok(id)
    }

    /// 인스턴스 제거 - 없는 ID는 `NotFound`
    pub async fn remove(&self, plugin_id: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .write()
            .await
            .remove(plugin_id)
            .ok_or_else(|| Error::NotFound(format!("plugin instance {}", plugin_id)))
    }

    /// 조회 - 없는 ID는 `NotFound`
    pub async fn get(&self, plugin_id: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin instance {}", plugin_id)))
    }

    pub async fn contains(&self, plugin_id: &str) -> bool {
        self.plugins.read().await.contains_key(plugin_id)
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }

    /// 모든 인스턴스 해제 (엔진 종료 마지막 단계)
    pub async fn shutdown(&self) -> usize {
        let mut plugins = self.plugins.write().await;
        let count = plugins.len();
        plugins.clear();
        info!(count, "Plugin manager shut down");
        count
    }
}

#[async_trait]
impl PluginProvider for PluginManager {
    async fn get_plugin(&self, plugin_id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().await.get(plugin_id).cloned()
    }

    async fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.plugins.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
