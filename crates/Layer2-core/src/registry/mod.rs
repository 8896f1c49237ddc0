//! # Plugin Registry
//!
//! 등록된 플러그인의 메타데이터와 현재 상태를 보관하는 단일 디렉토리.
//!
//! ## 구성
//!
//! - `PluginRegistry`: 등록/해제, 검색, 상태 동기화, Export/Import
//! - `RegistryListener`: register/unregister/update 변경 알림 수신
//! - `PluginFilter`: `find` 검색 조건
//!
//! ```ignore
//! let registry = PluginRegistry::new();
//! registry.register(metadata).await?;
//! registry.update_status("acme.report", PluginState::Running).await?;
//!
//! let running = registry.find(&PluginFilter::new().state(PluginState::Running)).await;
//! ```

mod entry;
mod snapshot;
mod store;
mod traits;

pub use entry::{PluginFilter, RegistryEntry, RegistryStats};
pub use snapshot::{RegistryExport, EXPORT_VERSION};
pub use store::PluginRegistry;
pub use traits::{ListenerId, RegistryEvent, RegistryListener};
