//! Engine Status - 외부 호출자용 조회 결과

use crate::lifecycle::LifecycleState;
use crate::monitor::MetricsSnapshot;
use chrono::{DateTime, Utc};
use plugrun_foundation::serde_ext::duration_ms;
use plugrun_foundation::{EventBusStats, PluginMetadata, PluginState, PluginStatus};
use plugrun_task::ExecutorStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 엔진 실행 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// `get_engine_status` 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub phase: EnginePhase,
    pub started_at: Option<DateTime<Utc>>,

    #[serde(with = "duration_ms")]
    pub uptime: Duration,

    pub plugin_count: usize,
    pub plugins_by_state: HashMap<String, usize>,
    pub event_bus: EventBusStats,
    pub executor: ExecutorStats,
    pub active_alerts: usize,
}

/// 플러그인 1건의 통합 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub metadata: PluginMetadata,
    pub state: PluginState,

    /// 플러그인이 직접 보고한 상태 (인스턴스가 없으면 없음)
    pub status: Option<PluginStatus>,

    pub lifecycle: Option<LifecycleState>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// CLI 등에서 한 번에 출력하는 보고서
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReport {
    pub status: EngineStatus,
    pub plugins: Vec<PluginInfo>,
    pub metrics: MetricsSnapshot,
}
