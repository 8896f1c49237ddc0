//! Config - 런타임 설정 관리
//!
//! - `runtime.rs` - RuntimeConfig 통합 설정 (엔진/버스/실행기/모니터/샌드박스/라이프사이클)

mod runtime;

pub use runtime::{
    EngineSettings, EventBusSettings, ExecutorSettings, LifecycleSettings, MonitorSettings,
    RuntimeConfig, SandboxSettings, ThresholdSettings, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE,
    PROJECT_CONFIG_FILE,
};
