//! Event System - 플러그인/엔진 간 발행/구독
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventBus                             │
//! │   publish(event) ─────── 동기: 모든 핸들러 완료까지 대기        │
//! │   publish_async(event) ─ bounded queue ──▶ worker 1..N      │
//! │         │                                                   │
//! │         ▼                                                   │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Subscription │  │ Subscription │  │ Subscription │       │
//! │  │ (type, filter│  │  "*" (all)   │  │ plugin-bound │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusConfig, EventBusStats, EventHandler, FnEventHandler, SubscriptionFilter,
    SubscriptionId,
};
pub use types::{kinds, Event, EventPriority};
