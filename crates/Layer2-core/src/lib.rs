//! plugrun-core: Plugin Runtime Core
//!
//! Layer2 - 플러그인 감독 레이어
//!
//! # 주요 모듈
//!
//! - `registry`: 플러그인 메타데이터/상태 레지스트리 (검색, 리스너, Export/Import)
//! - `plugin`: 플러그인 인스턴스 매니저와 로더
//! - `sandbox`: 보안 컨텍스트, 리소스 제한, 권한/경로/호스트 검사
//! - `dependency`: 버전 제약 해석, 충돌/순환 검사, 인젝터
//! - `lifecycle`: 상태 전이, 훅, 이력, 헬스 체크
//! - `monitor`: 메트릭 수집과 임계값 알림
//! - `engine`: 위 컴포넌트를 묶는 감독 파사드
//!
//! # 사용 예시
//!
//! ```ignore
//! use plugrun_core::{Engine, StaticPluginLoader};
//!
//! let loader = Arc::new(StaticPluginLoader::new());
//! loader.register("echo", || Arc::new(EchoPlugin::default()));
//!
//! let engine = Engine::new(RuntimeConfig::load()?, loader)?;
//! engine.start().await?;
//!
//! let id = engine.load_plugin("static://echo").await?;
//! engine.start_plugin(&id).await?;
//!
//! let result = engine
//!     .execute(ExecutionTask::new(&id, PluginType::Custom, "echo", json!({"x": 1})))
//!     .await?;
//!
//! engine.stop(Duration::from_secs(5)).await?;
//! ```

pub mod dependency;
pub mod engine;
pub mod lifecycle;
pub mod monitor;
pub mod plugin;
pub mod registry;
pub mod sandbox;

#[cfg(test)]
mod testing;

// Re-exports: Engine
pub use engine::{Engine, EnginePhase, EngineReport, EngineStatus, PluginInfo};

// Re-exports: Registry
pub use registry::{
    ListenerId, PluginFilter, PluginRegistry, RegistryEntry, RegistryEvent, RegistryExport,
    RegistryListener, RegistryStats,
};

// Re-exports: Plugin
pub use plugin::{PluginFactory, PluginLoader, PluginManager, StaticPluginLoader};

// Re-exports: Sandbox
pub use sandbox::{LimitBreach, ResourceLimits, SandboxManager, SecurityContext};

// Re-exports: Dependency
pub use dependency::{
    Dependency, DependencyInjector, DependencyManager, DependencyRequirement, DependencyType,
    VersionConstraint,
};

// Re-exports: Lifecycle
pub use lifecycle::{
    FnHook, HookContext, HookPoint, HookRegistration, LifecycleEvent, LifecycleEventType,
    LifecycleHook, LifecycleManager, LifecycleState,
};

// Re-exports: Monitor
pub use monitor::{
    Alert, AlertSeverity, AlertThresholds, AlertType, MetricsSnapshot, MonitorManager,
    PluginSample, SystemMetrics,
};
