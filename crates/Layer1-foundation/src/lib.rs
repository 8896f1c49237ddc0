//! # plugrun-foundation
//!
//! Foundation layer for plugrun:
//! - Core: 플러그인 계약 (`Plugin`, `PluginProvider`), 상태 머신, 메타데이터
//! - Event: 발행/구독 이벤트 버스
//! - Config: RuntimeConfig (TOML/JSON, 글로벌 + 프로젝트 병합)
//! - Error: 공통 에러 타입
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  plugrun-core (Engine)                                  │
//! │   Registry · Sandbox · Dependency · Lifecycle · Monitor │
//! │                     │                                   │
//! │          ┌──────────┴──────────┐                        │
//! │          ▼                     ▼                        │
//! │   plugrun-task (Executor)   EventBus                    │
//! │          │                     │                        │
//! │          └──────────┬──────────┘                        │
//! │                     ▼                                   │
//! │        plugrun-foundation (Plugin trait, Error)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod process;
pub mod serde_ext;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (플러그인 계약)
// ============================================================================
pub use core::{
    // Traits
    Plugin,
    PluginProvider,
    // Types
    HealthStatus,
    PluginConfig,
    PluginContext,
    PluginMetadata,
    PluginMetrics,
    PluginState,
    PluginStatus,
    PluginType,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    EngineSettings, EventBusSettings, ExecutorSettings, LifecycleSettings, MonitorSettings,
    RuntimeConfig, SandboxSettings, ThresholdSettings,
};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{
    kinds as event_kinds, Event, EventBus, EventBusConfig, EventBusStats, EventHandler,
    EventPriority, FnEventHandler, SubscriptionFilter, SubscriptionId,
};

// ============================================================================
// Process (리소스 샘플링)
// ============================================================================
pub use process::ProcessSnapshot;
