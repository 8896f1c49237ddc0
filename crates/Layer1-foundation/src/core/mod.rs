//! Core - 플러그인 계약
//!
//! - `traits.rs`: `Plugin`, `PluginProvider`
//! - `types.rs`: 메타데이터, 상태 머신, 상태 보고, 호출 컨텍스트

pub mod traits;
pub mod types;

pub use traits::{Plugin, PluginProvider};
pub use types::{
    HealthStatus, PluginConfig, PluginContext, PluginMetadata, PluginMetrics, PluginState,
    PluginStatus, PluginType,
};
