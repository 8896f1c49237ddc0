//! Registry Traits - 변경 알림 인터페이스

use async_trait::async_trait;
use plugrun_foundation::PluginState;
use serde::{Deserialize, Serialize};

// ============================================================================
// RegistryEvent - 레지스트리 변경 이벤트
// ============================================================================

/// 레지스트리 변경 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegistryEvent {
    /// 플러그인 등록됨
    Registered { plugin_id: String, version: String },

    /// 플러그인 등록 해제됨
    Unregistered { plugin_id: String },

    /// 상태 또는 메타데이터 변경됨
    Updated {
        plugin_id: String,
        status: PluginState,
    },
}

impl RegistryEvent {
    /// `registered` | `unregistered` | `updated`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::Unregistered { .. } => "unregistered",
            Self::Updated { .. } => "updated",
        }
    }

    pub fn plugin_id(&self) -> &str {
        match self {
            Self::Registered { plugin_id, .. }
            | Self::Unregistered { plugin_id }
            | Self::Updated { plugin_id, .. } => plugin_id,
        }
    }
}

// ============================================================================
// RegistryListener
// ============================================================================

/// 구독 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub(crate) u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 레지스트리 이벤트 리스너
///
/// 호출은 별도 태스크에서 이뤄지므로 느리거나 패닉하는 리스너가 레지스트리를 막지 않는다.
#[async_trait]
pub trait RegistryListener: Send + Sync {
    /// 리스너 이름
    fn name(&self) -> &str;

    /// 이벤트 처리
    async fn on_registry_event(&self, event: &RegistryEvent);
}
