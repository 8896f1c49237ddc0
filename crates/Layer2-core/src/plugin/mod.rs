//! # Plugin Manager
//!
//! 로드된 플러그인 인스턴스 보관소와 로더 연결점.
//!
//! ## 구성
//!
//! - `PluginManager`: ID -> 인스턴스 맵, `PluginProvider` 구현
//! - `PluginLoader`: 경로/URI를 인스턴스로 변환하는 교체 가능한 로더
//! - `StaticPluginLoader`: 이름 -> 팩토리 매핑 (컴파일 타임 플러그인)
//!
//! ```ignore
//! let loader = StaticPluginLoader::new();
//! loader.register("echo", || Arc::new(EchoPlugin::new()) as Arc<dyn Plugin>);
//!
//! let manager = PluginManager::new(Arc::new(loader));
//! let plugin = manager.resolve("plugins/echo.so").await?;
//! manager.add(plugin).await?;
//! ```

mod guard;
mod loader;
mod manager;

pub use loader::{PluginFactory, PluginLoader, StaticPluginLoader, STATIC_SCHEME};
pub use manager::PluginManager;

pub(crate) use guard::isolated;
