//! Lifecycle Types - 상태 레코드와 전이 이력

use chrono::{DateTime, Utc};
use plugrun_foundation::serde_ext::duration_ms;
use plugrun_foundation::{PluginConfig, PluginState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// LifecycleState - 플러그인별 상태 레코드
// ============================================================================

/// 라이프사이클 상태 레코드
///
/// 첫 `initialize` 호출에서 생성되고 `cleanup`에서 삭제된다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleState {
    pub plugin_id: String,
    pub current: PluginState,
    pub previous: PluginState,
    pub changed_at: DateTime<Utc>,

    pub initialized_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
    pub restart_count: u32,

    /// 마지막으로 적용된 초기화 설정 (Error 상태에서 재시작 시 재사용)
    pub config: PluginConfig,
}

impl LifecycleState {
    pub fn new(plugin_id: impl Into<String>, current: PluginState) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            current,
            previous: current,
            changed_at: Utc::now(),
            initialized_at: None,
            started_at: None,
            stopped_at: None,
            last_error: None,
            restart_count: 0,
            config: PluginConfig::new(),
        }
    }

    /// 상태 변경 (previous/changed_at 갱신, 단계별 타임스탬프 기록)
    pub fn transition(&mut self, to: PluginState) {
        let now = Utc::now();
        self.previous = self.current;
        self.current = to;
        self.changed_at = now;

        match to {
            PluginState::Initialized => self.initialized_at = Some(now),
            PluginState::Running => self.started_at = Some(now),
            PluginState::Stopped => self.stopped_at = Some(now),
            _ => {}
        }
    }
}

// ============================================================================
// LifecycleEvent - 전이 이력
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    Initialize,
    Start,
    Stop,
    Restart,
    Cleanup,
    HealthCheck,
}

impl LifecycleEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Cleanup => "cleanup",
            Self::HealthCheck => "health_check",
        }
    }
}

impl std::fmt::Display for LifecycleEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 전이 시도 1회 기록 (불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: LifecycleEventType,
    pub plugin_id: String,
    pub from: PluginState,
    pub to: PluginState,

    #[serde(with = "duration_ms")]
    pub duration: Duration,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}
