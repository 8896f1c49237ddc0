//! Process - 프로세스 전역 리소스 샘플링
//!
//! 샌드박스 샘플러와 모니터의 시스템 메트릭이 공유한다.

use serde::{Deserialize, Serialize};
use sysinfo::{ProcessExt, System, SystemExt};

/// 프로세스 리소스 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub cpu_count: usize,
    pub memory_bytes: u64,
    /// tokio 런타임 워커 수 (런타임 밖이면 0)
    pub worker_count: usize,
}

impl ProcessSnapshot {
    pub fn capture() -> Self {
        Self {
            cpu_count: cpu_count(),
            memory_bytes: memory_bytes(),
            worker_count: runtime_workers(),
        }
    }
}

/// 논리 CPU 수
pub fn cpu_count() -> usize {
    num_cpus::get()
}

/// 현재 프로세스의 상주 메모리 (bytes)
///
/// 프로세스 정보를 읽을 수 없으면 0.
pub fn memory_bytes() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };

    let mut system = System::new();
    if !system.refresh_process(pid) {
        return 0;
    }
    system.process(pid).map(|process| process.memory()).unwrap_or(0)
}

/// 현재 tokio 런타임의 워커 스레드 수
pub fn runtime_workers() -> usize {
    tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_workers())
        .unwrap_or(0)
}
