//! Core Types - 플러그인 계약에 사용되는 공통 타입
//!
//! - `PluginMetadata`: 등록 시 선언되는 플러그인 정보
//! - `PluginState`: 라이프사이클 상태 머신
//! - `PluginStatus` / `PluginMetrics`: 런타임 상태 보고
//! - `PluginContext`: 플러그인 호출 시 전달되는 컨텍스트

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 플러그인 초기화 설정 (자유 형식)
pub type PluginConfig = HashMap<String, Value>;

// ============================================================================
// PluginType
// ============================================================================

/// 플러그인 타입 - 실행기가 타입별 어댑터를 선택하는 기준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Http,
    Event,
    Scheduled,
    Data,
    Custom,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Event => "event",
            Self::Scheduled => "scheduled",
            Self::Data => "data",
            Self::Custom => "custom",
        }
    }

    /// 모든 타입
    pub fn all() -> [PluginType; 5] {
        [
            Self::Http,
            Self::Event,
            Self::Scheduled,
            Self::Data,
            Self::Custom,
        ]
    }
}

impl Default for PluginType {
    fn default() -> Self {
        Self::Custom
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PluginType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "event" => Ok(Self::Event),
            "scheduled" => Ok(Self::Scheduled),
            "data" => Ok(Self::Data),
            "custom" => Ok(Self::Custom),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown plugin type: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// PluginState - 라이프사이클 상태 머신
// ============================================================================

/// 플러그인 라이프사이클 상태
///
/// 정상 진행: `Unloaded → Loaded → Initializing → Initialized → Starting → Running → Stopping → Stopped`.
/// `Error`는 모든 전이의 실패 경로에서 도달 가능하다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unloaded,
    Loaded,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// `Starting`으로 전이 가능한 상태인지
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Initialized | Self::Stopped)
    }

    /// `Stopping`으로 전이 가능한 상태인지
    pub fn can_stop(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// `Initializing`으로 전이 가능한 상태인지
    pub fn can_initialize(&self) -> bool {
        matches!(self, Self::Unloaded | Self::Loaded | Self::Error)
    }

    /// 전이 중간 상태인지 (Initializing/Starting/Stopping)
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Initializing | Self::Starting | Self::Stopping)
    }
}

impl Default for PluginState {
    fn default() -> Self {
        Self::Unloaded
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PluginMetadata
// ============================================================================

/// 플러그인 메타데이터 - 등록 이후 명시적 업데이트 외에는 불변
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    /// 고유 ID
    pub id: String,

    pub name: String,
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub category: String,

    #[serde(rename = "type", default)]
    pub plugin_type: PluginType,

    #[serde(default)]
    pub tags: Vec<String>,

    /// 선언된 권한
    #[serde(default)]
    pub permissions: Vec<String>,

    /// 선언된 의존성 (다른 플러그인 ID)
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub config: PluginConfig,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PluginMetadata {
    /// 새 메타데이터 생성
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            category: String::new(),
            plugin_type: PluginType::default(),
            tags: Vec::new(),
            permissions: Vec::new(),
            dependencies: Vec::new(),
            config: PluginConfig::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_type(mut self, plugin_type: PluginType) -> Self {
        self.plugin_type = plugin_type;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn with_dependency(mut self, plugin_id: impl Into<String>) -> Self {
        self.dependencies.push(plugin_id.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// 등록 전 필수 필드 검증
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.trim().is_empty() {
            return Err(crate::Error::Validation("plugin id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(crate::Error::Validation(format!(
                "plugin {} has no name",
                self.id
            )));
        }
        if self.version.trim().is_empty() {
            return Err(crate::Error::Validation(format!(
                "plugin {} has no version",
                self.id
            )));
        }
        Ok(())
    }

    /// 태그 또는 카테고리 포함 여부
    pub fn is_tagged(&self, tag: &str) -> bool {
        self.category.eq_ignore_ascii_case(tag) || self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// ============================================================================
// PluginStatus / PluginMetrics
// ============================================================================

/// 플러그인 헬스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// 플러그인이 보고하는 런타임 메트릭
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetrics {
    /// CPU 사용률 (%)
    pub cpu_percent: f64,
    /// 메모리 사용량 (bytes)
    pub memory_bytes: u64,
    /// 동시 작업자 수
    pub worker_count: u64,
    pub request_count: u64,
    pub error_count: u64,
    /// 평균 응답 시간 (ms)
    pub avg_response_time_ms: f64,
}

/// `GetStatus()` 결과
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub state: PluginState,
    pub health: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub metrics: PluginMetrics,
}

impl PluginStatus {
    pub fn new(state: PluginState, health: HealthStatus) -> Self {
        Self {
            state,
            health,
            last_error: None,
            metrics: PluginMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: PluginMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

// ============================================================================
// PluginContext
// ============================================================================

/// 플러그인 호출 컨텍스트
///
/// 호출마다 새로 만들어지며 취소 토큰과 (선택) 데드라인을 가진다.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// 대상 플러그인 ID
    pub plugin_id: String,

    /// 취소 토큰 (엔진/실행기 종료 시 취소됨)
    cancel: CancellationToken,

    /// 호출 데드라인
    deadline: Option<Duration>,

    /// 부가 값 (요청 ID 등)
    values: HashMap<String, Value>,
}

impl PluginContext {
    /// 새 컨텍스트 생성
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            cancel: CancellationToken::new(),
            deadline: None,
            values: HashMap::new(),
        }
    }

    /// 부모 토큰에서 파생된 컨텍스트 생성
    pub fn with_parent(plugin_id: impl Into<String>, parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            ..Self::new(plugin_id)
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 취소될 때까지 대기
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_preconditions() {
        assert!(PluginState::Initialized.can_start());
        assert!(PluginState::Stopped.can_start());
        assert!(!PluginState::Unloaded.can_start());
        assert!(!PluginState::Running.can_start());
        assert!(PluginState::Running.can_stop());
        assert!(!PluginState::Stopped.can_stop());
    }

    #[test]
    fn test_metadata_serde_uses_type_key() {
        let meta = PluginMetadata::new("demo.http", "Demo", "1.0.0").with_type(PluginType::Http);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "http");

        let back: PluginMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_metadata_validate() {
        assert!(PluginMetadata::new("", "x", "1.0.0").validate().is_err());
        assert!(PluginMetadata::new("a", "x", "").validate().is_err());
        assert!(PluginMetadata::new("a", "x", "1.0.0").validate().is_ok());
    }

    #[test]
    fn test_child_context_cancelled_by_parent() {
        let parent = CancellationToken::new();
        let ctx = PluginContext::with_parent("p", &parent);
        assert!(!ctx.is_cancelled());
        parent.cancel();
        assert!(ctx.is_cancelled());
    }
}
