//! # Engine
//!
//! 레지스트리, 플러그인 매니저, 샌드박스, 의존성, 이벤트 버스, 실행기, 모니터,
//! 라이프사이클 매니저를 하나의 감독 파사드로 묶는다.
//!
//! ## 종료 순서
//!
//! ```text
//! 플러그인 stop/unload → Monitor → Executor → EventBus → PluginManager → 루트 토큰 취소
//! ```

mod bridge;
mod runtime;
mod status;

pub use runtime::{Engine, INJECT_EVENT_BUS, INJECT_REGISTRY, SUBSCRIBE_CONFIG_KEY};
pub use status::{EnginePhase, EngineReport, EngineStatus, PluginInfo};
