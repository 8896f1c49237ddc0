//! # Monitor
//!
//! 모니터링 대상 플러그인의 메트릭과 시스템 메트릭을 주기적으로 샘플링하고,
//! 플러그인별 임계값을 넘으면 알림을 만든다.
//!
//! 심각도는 관측값/임계값 비율로 정한다 (1.5배 Warning, 2배 Critical).

mod manager;
mod types;

pub use manager::MonitorManager;
pub use types::{
    Alert, AlertSeverity, AlertThresholds, AlertType, MetricsSnapshot, PluginSample,
    SystemMetrics,
};
