//! Event Types - 플러그인/엔진 간 이벤트 정의

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// Event Priority
// ============================================================================

/// 이벤트 우선순위
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for EventPriority {
    fn default() -> Self {
        Self::Normal
    }
}

// ============================================================================
// Event
// ============================================================================

/// 이벤트
///
/// `target`이 없으면 브로드캐스트. `ttl`이 지나면 디스패치 없이 버려진다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,

    /// 이벤트 타입 (예: "plugin.loaded", "monitor.alert")
    #[serde(rename = "type")]
    pub event_type: String,

    /// 발행자
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub data: Value,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub priority: EventPriority,

    #[serde(
        with = "crate::serde_ext::option_duration_ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ttl: Option<Duration>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Event {
    /// 새 이벤트 생성
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            target: None,
            data,
            timestamp: Utc::now(),
            priority: EventPriority::default(),
            ttl: None,
            metadata: HashMap::new(),
        }
    }

    /// 대상 지정
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 브로드캐스트 이벤트인지
    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    /// `timestamp + ttl`이 이미 지났는지
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - self.timestamp > ttl,
                Err(_) => false,
            },
            None => false,
        }
    }
}

// ============================================================================
// 사전 정의 이벤트 타입
// ============================================================================

/// 엔진이 발행하는 이벤트 타입
pub mod kinds {
    pub const ENGINE_STARTED: &str = "engine.started";
    pub const ENGINE_STOPPED: &str = "engine.stopped";
    pub const PLUGIN_LOADED: &str = "plugin.loaded";
    pub const PLUGIN_UNLOADED: &str = "plugin.unloaded";
    pub const PLUGIN_STATE_CHANGED: &str = "plugin.state_changed";
    pub const MONITOR_ALERT: &str = "monitor.alert";

    /// 모든 타입 구독
    pub const ALL: &str = "*";
}
