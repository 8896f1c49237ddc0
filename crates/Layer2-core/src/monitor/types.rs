//! Monitor Types - 임계값, 알림, 메트릭 스냅샷

use chrono::{DateTime, Utc};
use plugrun_foundation::{HealthStatus, PluginMetrics, ThresholdSettings};
use serde::{Deserialize, Serialize};

// ============================================================================
// AlertType / AlertSeverity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Cpu,
    Memory,
    ErrorCount,
    ResponseTime,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::ErrorCount => "error_count",
            Self::ResponseTime => "response_time",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// 관측값/임계값 비율: 2.0 이상 Critical, 1.5 이상 Warning
    pub fn from_ratio(value: f64, threshold: f64) -> Self {
        if threshold <= 0.0 {
            return Self::Critical;
        }
        let ratio = value / threshold;
        if ratio >= 2.0 {
            Self::Critical
        } else if ratio >= 1.5 {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

// ============================================================================
// AlertThresholds
// ============================================================================

/// 플러그인별 임계값 - `None`이면 해당 항목 비활성
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    pub cpu_percent: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub error_count: Option<u64>,
    pub response_time_ms: Option<f64>,
}

impl AlertThresholds {
    /// 모두 비활성
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_cpu_percent(mut self, value: f64) -> Self {
        self.cpu_percent = Some(value);
        self
    }

    pub fn with_memory_bytes(mut self, value: u64) -> Self {
        self.memory_bytes = Some(value);
        self
    }

    pub fn with_error_count(mut self, value: u64) -> Self {
        self.error_count = Some(value);
        self
    }

    pub fn with_response_time_ms(mut self, value: f64) -> Self {
        self.response_time_ms = Some(value);
        self
    }

    /// 초과 항목: (종류, 관측값, 임계값)
    pub fn breaches(&self, metrics: &PluginMetrics) -> Vec<(AlertType, f64, f64)> {
        let checks = [
            (AlertType::Cpu, metrics.cpu_percent, self.cpu_percent),
            (
                AlertType::Memory,
                metrics.memory_bytes as f64,
                self.memory_bytes.map(|v| v as f64),
            ),
            (
                AlertType::ErrorCount,
                metrics.error_count as f64,
                self.error_count.map(|v| v as f64),
            ),
            (
                AlertType::ResponseTime,
                metrics.avg_response_time_ms,
                self.response_time_ms,
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(kind, value, threshold)| {
                threshold
                    .filter(|t| value > *t)
                    .map(|t| (kind, value, t))
            })
            .collect()
    }
}

impl From<&ThresholdSettings> for AlertThresholds {
    fn from(settings: &ThresholdSettings) -> Self {
        Self {
            cpu_percent: Some(settings.cpu_percent),
            memory_bytes: Some(settings.memory_bytes),
            error_count: Some(settings.error_count),
            response_time_ms: Some(settings.response_time_ms),
        }
    }
}

// ============================================================================
// Alert
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub plugin_id: String,

    #[serde(rename = "type")]
    pub alert_type: AlertType,

    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(plugin_id: impl Into<String>, alert_type: AlertType, value: f64, threshold: f64) -> Self {
        let plugin_id = plugin_id.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message: format!(
                "plugin {} {} {} exceeds threshold {}",
                plugin_id, alert_type, value, threshold
            ),
            plugin_id,
            alert_type,
            severity: AlertSeverity::from_ratio(value, threshold),
            value,
            threshold,
            timestamp: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn resolve(&mut self) {
        if !self.resolved {
            self.resolved = true;
            self.resolved_at = Some(Utc::now());
        }
    }
}

// ============================================================================
// Metrics snapshots
// ============================================================================

/// 플러그인 샘플 1건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSample {
    pub plugin_id: String,
    pub metrics: PluginMetrics,
    pub health: HealthStatus,
    pub sampled_at: DateTime<Utc>,
}

/// 시스템 전역 메트릭
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_count: usize,
    pub memory_bytes: u64,
    pub worker_count: usize,
    /// 로드된 플러그인 수
    pub total_plugins: usize,
    /// 최근 2주기 안에 샘플링된 플러그인 수
    pub active_plugins: usize,
    pub timestamp: Option<DateTime<Utc>>,
}

/// `get_all_metrics` 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub plugins: Vec<PluginSample>,
    pub alerts: Vec<Alert>,
    pub timestamp: DateTime<Utc>,
}
