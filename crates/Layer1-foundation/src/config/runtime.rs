//! Runtime Config - 엔진 전체 설정
//!
//! 글로벌(`~/.plugrun/runtime.toml`) → 프로젝트(`./plugrun.toml`) 순으로 병합.
//! 뒤에 로드된 값이 우선한다. 파일이 없으면 기본값.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 글로벌 설정 디렉토리명 (홈 디렉토리 기준)
pub const GLOBAL_CONFIG_DIR: &str = ".plugrun";

/// 글로벌 설정 파일명
pub const GLOBAL_CONFIG_FILE: &str = "runtime.toml";

/// 프로젝트 설정 파일명
pub const PROJECT_CONFIG_FILE: &str = "plugrun.toml";

// ============================================================================
// RuntimeConfig
// ============================================================================

/// 런타임 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub engine: EngineSettings,
    pub event_bus: EventBusSettings,
    pub executor: ExecutorSettings,
    pub monitor: MonitorSettings,
    pub sandbox: SandboxSettings,
    pub lifecycle: LifecycleSettings,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut candidates = Vec::new();
        if let Some(global) = Self::global_path() {
            candidates.push(global);
        }
        candidates.push(PathBuf::from(PROJECT_CONFIG_FILE));

        Self::load_layered(&candidates)
    }

    /// 여러 파일을 순서대로 병합 (없는 파일은 건너뜀)
    pub fn load_layered(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        for path in paths {
            if !path.exists() {
                continue;
            }
            tracing::debug!(path = %path.display(), "Loading runtime config layer");
            let layer = Self::read_value(path)?;
            merge_values(&mut merged, layer);
        }

        let config = merged.try_into::<RuntimeConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// 단일 파일 로드 (`.toml` 또는 `.json`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: RuntimeConfig = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") | None => toml::from_str(&content)?,
            Some(other) => {
                return Err(Error::Config(format!(
                    "Unsupported config format: .{}",
                    other
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열로 직렬화
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 글로벌 설정 경로
    pub fn global_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
    }

    fn read_value(path: &Path) -> Result<toml::Value> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        match extension(path).as_deref() {
            Some("json") => {
                let json: serde_json::Value = serde_json::from_str(&content)?;
                toml::Value::try_from(json)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
            }
            _ => Ok(toml::from_str(&content)?),
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// 0 크기 큐/풀 거부
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("eventBus.queueSize", self.event_bus.queue_size),
            ("eventBus.workerCount", self.event_bus.worker_count),
            ("eventBus.historySize", self.event_bus.history_size),
            ("executor.queueSize", self.executor.queue_size),
            ("executor.workerCount", self.executor.worker_count),
            ("executor.concurrencyLimit", self.executor.concurrency_limit),
            ("executor.historySize", self.executor.history_size),
            ("lifecycle.historySize", self.lifecycle.history_size),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(Error::Validation(format!("{} must be greater than 0", name)));
            }
        }

        if self.monitor.interval.is_zero() {
            return Err(Error::Validation("monitor.interval must be greater than 0".into()));
        }

        if self.executor.default_timeout.is_zero() {
            return Err(Error::Validation(
                "executor.defaultTimeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// 테이블 재귀 병합 (overlay 우선)
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ============================================================================
// Sections
// ============================================================================

/// 엔진 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Stop 시 드레인 대기 시간
    #[serde(with = "crate::serde_ext::duration_ms")]
    pub shutdown_timeout: Duration,

    /// 플러그인 검색 디렉토리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,

    /// tracing EnvFilter 기본값
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            plugin_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// 이벤트 버스 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBusSettings {
    pub queue_size: usize,
    pub worker_count: usize,
    pub history_size: usize,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            worker_count: 4,
            history_size: 1000,
        }
    }
}

impl From<&EventBusSettings> for crate::event::EventBusConfig {
    fn from(s: &EventBusSettings) -> Self {
        Self {
            queue_size: s.queue_size,
            worker_count: s.worker_count,
            history_size: s.history_size,
        }
    }
}

/// 실행기 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorSettings {
    pub queue_size: usize,
    pub worker_count: usize,

    /// 동시 실행 태스크 상한
    pub concurrency_limit: usize,

    /// 태스크에 timeout이 없을 때 적용
    #[serde(with = "crate::serde_ext::duration_ms")]
    pub default_timeout: Duration,

    pub history_size: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            worker_count: 4,
            concurrency_limit: 10,
            default_timeout: Duration::from_secs(30),
            history_size: 1000,
        }
    }
}

/// 모니터 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// 샘플링 주기
    #[serde(with = "crate::serde_ext::duration_ms")]
    pub interval: Duration,

    /// 새로 모니터링되는 플러그인의 기본 임계값
    pub thresholds: ThresholdSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            thresholds: ThresholdSettings::default(),
        }
    }
}

/// 기본 알림 임계값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdSettings {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub error_count: u64,
    pub response_time_ms: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_bytes: 512 * 1024 * 1024,
            error_count: 100,
            response_time_ms: 1000.0,
        }
    }
}

/// 샌드박스 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxSettings {
    /// 주기적 리소스 샘플러 (경고만, 강제하지 않음)
    pub sampler_enabled: bool,

    #[serde(with = "crate::serde_ext::duration_ms")]
    pub sampler_interval: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            sampler_enabled: false,
            sampler_interval: Duration::from_secs(10),
        }
    }
}

/// 라이프사이클 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleSettings {
    /// 플러그인별 이벤트 히스토리 상한
    pub history_size: usize,

    /// Restart 시 Stop과 Start 사이 대기
    #[serde(with = "crate::serde_ext::duration_ms")]
    pub restart_delay: Duration,

    #[serde(with = "crate::serde_ext::duration_ms")]
    pub health_check_interval: Duration,

    /// 비정상 플러그인 자동 재시작
    pub auto_restart: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            history_size: 100,
            restart_delay: Duration::from_millis(100),
            health_check_interval: Duration::from_secs(30),
            auto_restart: false,
        }
    }
}
