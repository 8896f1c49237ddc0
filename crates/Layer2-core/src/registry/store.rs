//! Plugin Registry - 플러그인 메타데이터/상태 저장소

use super::entry::{PluginFilter, RegistryEntry, RegistryStats};
use super::snapshot::RegistryExport;
use super::traits::{ListenerId, RegistryEvent, RegistryListener};
use chrono::Utc;
use plugrun_foundation::{Error, PluginMetadata, PluginState, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// 리스너 하나의 전달 채널
struct ListenerSlot {
    id: ListenerId,
    sender: mpsc::UnboundedSender<RegistryEvent>,
}

/// 플러그인 레지스트리
///
/// 등록/해제/상태 변경 시 모든 리스너에게 알림을 보낸다. 알림은 엔트리 잠금 안에서
/// 리스너별 채널에 넣어지므로 리스너는 변경이 반영된 순서대로 받는다. 호출 경로는
/// 리스너 처리를 기다리지 않는다.
pub struct PluginRegistry {
    /// 엔트리 저장소 (ID -> RegistryEntry)
    entries: RwLock<HashMap<String, RegistryEntry>>,

    listeners: parking_lot::RwLock<Vec<ListenerSlot>>,

    listener_counter: AtomicU64,
}

impl PluginRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            listeners: parking_lot::RwLock::new(Vec::new()),
            listener_counter: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // 등록 / 해제
    // ========================================================================

    /// 플러그인 등록
    pub async fn register(&self, metadata: PluginMetadata) -> Result<()> {
        metadata.validate()?;
        let id = metadata.id.clone();
        let version = metadata.version.clone();

        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&id) {
                return Err(Error::AlreadyExists(format!("plugin {}", id)));
            }
            entries.insert(id.clone(), RegistryEntry::new(metadata));
            self.notify(RegistryEvent::Registered {
                plugin_id: id.clone(),
                version: version.clone(),
            });
        }

        info!(plugin_id = %id, version = %version, "Registered plugin");
        Ok(())
    }

    /// 플러그인 등록 해제 - 없는 ID는 `NotFound`
    pub async fn unregister(&self, plugin_id: &str) -> Result<RegistryEntry> {
        let removed = {
            let mut entries = self.entries.write().await;
            let removed = entries
                .remove(plugin_id)
                .ok_or_else(|| Error::NotFound(format!("plugin {}", plugin_id)))?;
            self.notify(RegistryEvent::Unregistered {
                plugin_id: plugin_id.to_string(),
            });
            removed
        };

        info!(plugin_id = %plugin_id, "Unregistered plugin");
        Ok(removed)
    }

    /// 메타데이터 교체 (명시적 업데이트)
    pub async fn update_metadata(&self, mut metadata: PluginMetadata) -> Result<()> {
        metadata.validate()?;
        let id = metadata.id.clone();

        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("plugin {}", id)))?;
        metadata.created_at = entry.metadata.created_at;
        metadata.updated_at = Utc::now();
        entry.metadata = metadata;
        entry.updated_at = Utc::now();

        self.notify(RegistryEvent::Updated {
            plugin_id: id,
            status: entry.status,
        });
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get(&self, plugin_id: &str) -> Result<RegistryEntry> {
        self.entries
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin {}", plugin_id)))
    }

    pub async fn contains(&self, plugin_id: &str) -> bool {
        self.entries.read().await.contains_key(plugin_id)
    }

    /// 전체 목록 (ID 순)
    pub async fn list(&self) -> Vec<RegistryEntry> {
        let mut list: Vec<_> = self.entries.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        list
    }

    /// 필터 검색 (ID 순)
    pub async fn find(&self, filter: &PluginFilter) -> Vec<RegistryEntry> {
        let mut list: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // ========================================================================
    // 상태
    // ========================================================================

    /// 상태 변경
    pub async fn update_status(&self, plugin_id: &str, status: PluginState) -> Result<()> {
        {
            let mut entries = self.entries.write().await;
            let entry = entries
                .get_mut(plugin_id)
                .ok_or_else(|| Error::NotFound(format!("plugin {}", plugin_id)))?;
            entry.set_status(status);
            self.notify(RegistryEvent::Updated {
                plugin_id: plugin_id.to_string(),
                status,
            });
        }

        debug!(plugin_id = %plugin_id, status = %status, "Updated plugin status");
        Ok(())
    }

    pub async fn get_status(&self, plugin_id: &str) -> Result<PluginState> {
        self.entries
            .read()
            .await
            .get(plugin_id)
            .map(|e| e.status)
            .ok_or_else(|| Error::NotFound(format!("plugin {}", plugin_id)))
    }

    /// 하트비트 기록
    pub async fn heartbeat(&self, plugin_id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(plugin_id)
            .ok_or_else(|| Error::NotFound(format!("plugin {}", plugin_id)))?;
        entry.last_heartbeat = Some(Utc::now());
        Ok(())
    }

    /// 상태별/카테고리별 집계
    pub async fn stats(&self) -> RegistryStats {
        let entries = self.entries.read().await;
        let mut stats = RegistryStats {
            total: entries.len(),
            ..Default::default()
        };

        for entry in entries.values() {
            *stats
                .by_status
                .entry(entry.status.to_string())
                .or_insert(0) += 1;

            let category = if entry.metadata.category.is_empty() {
                "uncategorized".to_string()
            } else {
                entry.metadata.category.clone()
            };
            *stats.by_category.entry(category).or_insert(0) += 1;
        }

        stats
    }

    // ========================================================================
    // 구독
    // ========================================================================

    /// 변경 알림 구독
    ///
    /// 리스너마다 전달 태스크 하나가 이벤트를 순서대로 넘긴다. 각 호출은 다시 별도
    /// 태스크에서 실행되어 패닉해도 이후 이벤트는 계속 전달된다.
    pub async fn subscribe(&self, listener: Arc<dyn RegistryListener>) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst) + 1);
        let (sender, mut receiver) = mpsc::unbounded_channel::<RegistryEvent>();
        let name = listener.name().to_string();
        debug!(listener_id = %id, name = %name, "Registry listener added");

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let listener = Arc::clone(&listener);
                let kind = event.kind();
                let call = tokio::spawn(async move { listener.on_registry_event(&event).await });
                if let Err(e) = call.await {
                    warn!(listener = %name, kind, error = %e, "Registry listener panicked");
                }
            }
            debug!(listener = %name, "Registry listener closed");
        });

        self.listeners.write().push(ListenerSlot { id, sender });
        id
    }

    /// 구독 해제 - 이미 큐에 들어간 이벤트는 마저 전달된다
    pub async fn unsubscribe(&self, id: ListenerId) -> Result<()> {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|slot| slot.id != id);

        if listeners.len() == before {
            return Err(Error::NotFound(format!("registry {}", id)));
        }
        Ok(())
    }

    /// 모든 리스너 채널에 적재 (엔트리 쓰기 잠금을 쥔 채 호출)
    fn notify(&self, event: RegistryEvent) {
        for slot in self.listeners.read().iter() {
            if slot.sender.send(event.clone()).is_err() {
                debug!(listener_id = %slot.id, "Registry listener already closed");
            }
        }
    }

    // ========================================================================
    // Export / Import
    // ========================================================================

    /// 전체 엔트리 스냅샷
    pub async fn export(&self) -> RegistryExport {
        RegistryExport::new(self.entries.read().await.values().cloned().collect())
    }

    /// 스냅샷 복원 - ID 기준으로 추가/덮어쓰기. 반영된 건수 반환
    pub async fn import(&self, snapshot: RegistryExport) -> Result<usize> {
        for entry in &snapshot.entries {
            entry.metadata.validate()?;
        }

        let count = snapshot.entries.len();
        let mut entries = self.entries.write().await;
        for entry in snapshot.entries {
            let id = entry.metadata.id.clone();
            let status = entry.status;
            let version = entry.metadata.version.clone();

            let event = if entries.insert(id.clone(), entry).is_some() {
                RegistryEvent::Updated {
                    plugin_id: id,
                    status,
                }
            } else {
                RegistryEvent::Registered {
                    plugin_id: id,
                    version,
                }
            };
            self.notify(event);
        }
        drop(entries);

        info!(count, "Imported registry entries");
        Ok(count)
    }

    pub async fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export().await)?)
    }

    pub async fn import_json(&self, json: &str) -> Result<usize> {
        let snapshot: RegistryExport = serde_json::from_str(json)?;
        self.import(snapshot).await
    }

    /// 파일로 저장
    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.export_json().await?;
        tokio::fs::write(path.as_ref(), json).await?;
        Ok(())
    }

    /// 파일에서 복원
    pub async fn import_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to read registry export");
            Error::Io(e)
        })?;
        self.import_json(&json).await
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Recorder {
        events: tokio::sync::Mutex<Vec<RegistryEvent>>,
    }

    #[async_trait]
    impl RegistryListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn on_registry_event(&self, event: &RegistryEvent) {
            self.events.lock().await.push(event.clone());
        }
    }

    struct Panicker;

    #[async_trait]
    impl RegistryListener for Panicker {
        fn name(&self) -> &str {
            "panicker"
        }

        async fn on_registry_event(&self, _event: &RegistryEvent) {
            panic!("listener bug");
        }
    }

    fn meta(id: &str) -> PluginMetadata {
        PluginMetadata::new(id, id, "1.0.0").with_category("tools")
    }

    #[tokio::test]
    async fn test_register_duplicate_rejected() {
        let registry = PluginRegistry::new();
        registry.register(meta("a")).await.unwrap();
        let err = registry.register(meta("a")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_twice_is_not_found() {
        let registry = PluginRegistry::new();
        registry.register(meta("a")).await.unwrap();
        registry.unregister("a").await.unwrap();
        assert!(registry.unregister("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_status_and_heartbeat() {
        let registry = PluginRegistry::new();
        registry.register(meta("a")).await.unwrap();
        registry
            .update_status("a", PluginState::Running)
            .await
            .unwrap();
        registry.heartbeat("a").await.unwrap();

        let entry = registry.get("a").await.unwrap();
        assert_eq!(entry.status, PluginState::Running);
        assert!(entry.last_heartbeat.is_some());
        assert!(registry
            .update_status("missing", PluginState::Running)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_listeners_notified_and_isolated() {
        let registry = PluginRegistry::new();
        let recorder = Arc::new(Recorder {
            events: tokio::sync::Mutex::new(Vec::new()),
        });
        registry.subscribe(Arc::new(Panicker)).await;
        let id = registry.subscribe(recorder.clone()).await;

        registry.register(meta("a")).await.unwrap();
        registry
            .update_status("a", PluginState::Stopped)
            .await
            .unwrap();
        registry.unregister("a").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let kinds: Vec<_> = recorder
            .events
            .lock()
            .await
            .iter()
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds.len(), 3);
        assert!(kinds.contains(&"registered"));
        assert!(kinds.contains(&"updated"));
        assert!(kinds.contains(&"unregistered"));

        registry.unsubscribe(id).await.unwrap();
        assert!(registry.unsubscribe(id).await.is_err());
    }

    #[tokio::test]
    async fn test_listener_sees_updates_in_order() {
        let registry = Arc::new(PluginRegistry::new());
        let recorder = Arc::new(Recorder {
            events: tokio::sync::Mutex::new(Vec::new()),
        });
        registry.subscribe(recorder.clone()).await;
        registry.register(meta("a")).await.unwrap();

        let sequence = [
            PluginState::Initializing,
            PluginState::Initialized,
            PluginState::Starting,
            PluginState::Running,
            PluginState::Stopping,
            PluginState::Stopped,
        ];
        for _ in 0..20 {
            for state in sequence {
                registry.update_status("a", state).await.unwrap();
            }
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen: Vec<_> = recorder
            .events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                RegistryEvent::Updated { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = (0..20).flat_map(|_| sequence).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_import_notifies_with_imported_status() {
        let source = PluginRegistry::new();
        source.register(meta("a")).await.unwrap();
        source.register(meta("b")).await.unwrap();
        source.update_status("a", PluginState::Stopped).await.unwrap();
        let snapshot = source.export().await;

        let target = PluginRegistry::new();
        target.register(meta("a")).await.unwrap();
        let recorder = Arc::new(Recorder {
            events: tokio::sync::Mutex::new(Vec::new()),
        });
        target.subscribe(recorder.clone()).await;

        assert_eq!(target.import(snapshot).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = recorder.events.lock().await.clone();
        assert_eq!(
            events,
            vec![
                RegistryEvent::Updated {
                    plugin_id: "a".into(),
                    status: PluginState::Stopped,
                },
                RegistryEvent::Registered {
                    plugin_id: "b".into(),
                    version: "1.0.0".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let registry = PluginRegistry::new();
        registry.register(meta("a")).await.unwrap();
        registry.register(meta("b")).await.unwrap();
        registry
            .register(PluginMetadata::new("c", "c", "1.0.0"))
            .await
            .unwrap();
        registry
            .update_status("a", PluginState::Running)
            .await
            .unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get("running"), Some(&1));
        assert_eq!(stats.by_status.get("loaded"), Some(&2));
        assert_eq!(stats.by_category.get("tools"), Some(&2));
        assert_eq!(stats.by_category.get("uncategorized"), Some(&1));
    }

    #[tokio::test]
    async fn test_export_import_file() {
        let registry = PluginRegistry::new();
        registry.register(meta("a")).await.unwrap();
        registry
            .update_status("a", PluginState::Stopped)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        registry.export_to_file(&path).await.unwrap();

        let restored = PluginRegistry::new();
        assert_eq!(restored.import_from_file(&path).await.unwrap(), 1);
        assert_eq!(
            restored.get_status("a").await.unwrap(),
            PluginState::Stopped
        );
    }
}
