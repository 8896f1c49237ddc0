//! Resource Limits - 플러그인별 리소스 제한

use plugrun_foundation::serde_ext::duration_ms;
use plugrun_foundation::{Error, PluginMetadata, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// 상향 제한을 받는 태그/카테고리
pub const ELEVATED_TIERS: [&str; 2] = ["system", "analytics"];

/// 리소스 제한
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub max_memory_bytes: u64,

    /// (0, 100]
    pub max_cpu_percent: f64,

    pub max_workers: u32,
    pub max_file_handles: u32,
    pub max_network_connections: u32,

    #[serde(with = "duration_ms")]
    pub execution_timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::baseline()
    }
}

impl ResourceLimits {
    /// 기본 제한
    pub fn baseline() -> Self {
        Self {
            max_memory_bytes: 256 * MB,
            max_cpu_percent: 50.0,
            max_workers: 10,
            max_file_handles: 100,
            max_network_connections: 50,
            execution_timeout: Duration::from_secs(30),
        }
    }

    /// `system`/`analytics` 플러그인용 상향 제한
    pub fn elevated() -> Self {
        Self {
            max_memory_bytes: 1024 * MB,
            max_cpu_percent: 80.0,
            ..Self::baseline()
        }
    }

    /// 메타데이터 태그/카테고리에 따른 기본값
    pub fn for_metadata(metadata: &PluginMetadata) -> Self {
        if ELEVATED_TIERS.iter().any(|tier| metadata.is_tagged(tier)) {
            Self::elevated()
        } else {
            Self::baseline()
        }
    }

    /// 모든 값이 양수이고 CPU는 (0, 100]인지 확인
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_bytes == 0 {
            return Err(Error::Validation("maxMemoryBytes must be positive".into()));
        }
        if !(self.max_cpu_percent > 0.0 && self.max_cpu_percent <= 100.0) {
            return Err(Error::Validation(format!(
                "maxCpuPercent must be in (0, 100], got {}",
                self.max_cpu_percent
            )));
        }
        if self.max_workers == 0 {
            return Err(Error::Validation("maxWorkers must be positive".into()));
        }
        if self.max_file_handles == 0 {
            return Err(Error::Validation("maxFileHandles must be positive".into()));
        }
        if self.max_network_connections == 0 {
            return Err(Error::Validation(
                "maxNetworkConnections must be positive".into(),
            ));
        }
        if self.execution_timeout.is_zero() {
            return Err(Error::Validation("executionTimeout must be positive".into()));
        }
        Ok(())
    }
}
