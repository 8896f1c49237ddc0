//! Plugin Loader - 경로를 플러그인 인스턴스로 변환

use async_trait::async_trait;
use parking_lot::RwLock;
use plugrun_foundation::{Error, Plugin, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// 정적 로더 URI 스킴
pub const STATIC_SCHEME: &str = "static://";

/// 플러그인 인스턴스 팩토리
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

// ============================================================================
// PluginLoader Trait
// ============================================================================

/// 플러그인 로더
///
/// 바이너리/모듈의 실제 링크 방식은 구현체가 결정한다.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// 로더 이름
    fn name(&self) -> &str;

    /// 경로를 인스턴스로 로드
    async fn load(&self, path: &str) -> Result<Arc<dyn Plugin>>;
}

// ============================================================================
// StaticPluginLoader
// ============================================================================

/// 이름 -> 팩토리 매핑 로더
///
/// `static://echo`, `plugins/echo.so`, `echo` 모두 `echo` 팩토리로 해석된다.
#[derive(Default)]
pub struct StaticPluginLoader {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl StaticPluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 팩토리 등록 (같은 이름은 덮어씀)
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "Registered static plugin factory");
        self.factories.write().insert(name, Arc::new(factory));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.factories.write().remove(name).is_some()
    }

    /// 등록된 이름 목록 (정렬)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 경로에서 팩토리 이름 추출
    fn resolve_name(path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(name) = trimmed.strip_prefix(STATIC_SCHEME) {
            return (!name.is_empty()).then(|| name.to_string());
        }

        Path::new(trimmed)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_start_matches("lib").to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl PluginLoader for StaticPluginLoader {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self, path: &str) -> Result<Arc<dyn Plugin>> {
        let name = Self::resolve_name(path)
            .ok_or_else(|| Error::InvalidInput(format!("invalid plugin path: {:?}", path)))?;

        let factory = self
            .factories
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin factory {} (from {})", name, path)))?;

        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_name() {
        assert_eq!(
            StaticPluginLoader::resolve_name("static://echo"),
            Some("echo".to_string())
        );
        assert_eq!(
            StaticPluginLoader::resolve_name("plugins/libecho.so"),
            Some("echo".to_string())
        );
        assert_eq!(
            StaticPluginLoader::resolve_name("echo"),
            Some("echo".to_string())
        );
        assert_eq!(StaticPluginLoader::resolve_name(""), None);
        assert_eq!(StaticPluginLoader::resolve_name("static://"), None);
    }

    #[tokio::test]
    async fn test_unknown_factory_is_not_found() {
        let loader = StaticPluginLoader::new();
        let err = loader.load("static://missing").await.err().unwrap();
        assert!(err.is_not_found());

        let err = loader.load("   ").await.err().unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
