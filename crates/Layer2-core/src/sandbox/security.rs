//! Security Context - 권한, 허용 경로/호스트, 환경 변수

use chrono::{DateTime, Utc};
use plugrun_foundation::{PluginConfig, PluginMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 모든 권한/경로/호스트 허용
pub const WILDCARD: &str = "*";

/// 플러그인 보안 컨텍스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    pub plugin_id: String,
    pub permissions: Vec<String>,
    pub allowed_paths: Vec<PathBuf>,
    pub allowed_hosts: Vec<String>,
    pub environment: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityContext {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            permissions: Vec::new(),
            allowed_paths: Vec::new(),
            allowed_hosts: Vec::new(),
            environment: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// 선언된 권한 + 설정의 `allowedPaths`/`allowedHosts`/`env`로 구성
    pub fn from_declaration(metadata: &PluginMetadata, config: &PluginConfig) -> Self {
        let strings = |key: &str| -> Vec<String> {
            config
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let environment = config
            .get("env")
            .and_then(Value::as_object)
            .map(|env| {
                env.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            permissions: metadata.permissions.clone(),
            allowed_paths: strings("allowedPaths").into_iter().map(PathBuf::from).collect(),
            allowed_hosts: strings("allowedHosts"),
            environment,
            ..Self::new(&metadata.id)
        }
    }

    /// 정확히 일치하거나 `*`
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == WILDCARD || p == permission)
    }

    /// 허용 경로 접두사 일치 (컴포넌트 단위)
    pub fn allows_path(&self, path: &Path) -> bool {
        self.allowed_paths
            .iter()
            .any(|allowed| allowed.as_os_str() == WILDCARD || path.starts_with(allowed))
    }

    /// 정확히 일치하거나 `*`
    pub fn allows_host(&self, host: &str) -> bool {
        self.allowed_hosts
            .iter()
            .any(|h| h == WILDCARD || h.eq_ignore_ascii_case(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> SecurityContext {
        let meta = PluginMetadata::new("p", "p", "1.0.0")
            .with_permission("fs.read")
            .with_permission("net.http");
        let mut config = PluginConfig::new();
        config.insert("allowedPaths".into(), json!(["/var/data", "/tmp/p"]));
        config.insert("allowedHosts".into(), json!(["api.example.com"]));
        config.insert("env".into(), json!({"MODE": "test", "N": 1}));
        SecurityContext::from_declaration(&meta, &config)
    }

    #[test]
    fn test_from_declaration() {
        let ctx = context();
        assert_eq!(ctx.plugin_id, "p");
        assert_eq!(ctx.allowed_paths.len(), 2);
        assert_eq!(ctx.environment.get("MODE").map(String::as_str), Some("test"));
        // 문자열이 아닌 값은 무시
        assert!(!ctx.environment.contains_key("N"));
    }

    #[test]
    fn test_permission_exact_or_wildcard() {
        let mut ctx = context();
        assert!(ctx.has_permission("fs.read"));
        assert!(!ctx.has_permission("fs.write"));
        assert!(!ctx.has_permission("fs"));

        ctx.permissions.push(WILDCARD.into());
        assert!(ctx.has_permission("fs.write"));
    }

    #[test]
    fn test_path_prefix_is_component_wise() {
        let ctx = context();
        assert!(ctx.allows_path(Path::new("/var/data/report.csv")));
        assert!(ctx.allows_path(Path::new("/var/data")));
        assert!(!ctx.allows_path(Path::new("/var/database")));
        assert!(!ctx.allows_path(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_hosts() {
        let ctx = context();
        assert!(ctx.allows_host("API.example.com"));
        assert!(!ctx.allows_host("evil.example.com"));
    }
}
