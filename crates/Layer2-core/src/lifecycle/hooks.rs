//! Lifecycle Hooks - 전이 전후 확장 지점
//!
//! `before_*` 훅이 실패하면 전이를 중단한다. `after_*` 훅 실패는 로그만 남긴다.

use async_trait::async_trait;
use plugrun_foundation::{PluginState, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// HookPoint
// ============================================================================

/// 훅 지점
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    BeforeInitialize,
    AfterInitialize,
    BeforeStart,
    AfterStart,
    BeforeStop,
    AfterStop,
    BeforeCleanup,
    AfterCleanup,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeInitialize => "before_initialize",
            Self::AfterInitialize => "after_initialize",
            Self::BeforeStart => "before_start",
            Self::AfterStart => "after_start",
            Self::BeforeStop => "before_stop",
            Self::AfterStop => "after_stop",
            Self::BeforeCleanup => "before_cleanup",
            Self::AfterCleanup => "after_cleanup",
        }
    }

    pub fn is_before(&self) -> bool {
        matches!(
            self,
            Self::BeforeInitialize | Self::BeforeStart | Self::BeforeStop | Self::BeforeCleanup
        )
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookPoint {
    type Err = plugrun_foundation::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "before_initialize" => Ok(Self::BeforeInitialize),
            "after_initialize" => Ok(Self::AfterInitialize),
            "before_start" => Ok(Self::BeforeStart),
            "after_start" => Ok(Self::AfterStart),
            "before_stop" => Ok(Self::BeforeStop),
            "after_stop" => Ok(Self::AfterStop),
            "before_cleanup" => Ok(Self::BeforeCleanup),
            "after_cleanup" => Ok(Self::AfterCleanup),
            other => Err(plugrun_foundation::Error::InvalidInput(format!(
                "unknown hook point: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// LifecycleHook
// ============================================================================

/// 훅 실행 시 전달되는 정보
#[derive(Debug, Clone)]
pub struct HookContext {
    pub plugin_id: String,
    pub point: HookPoint,
    /// 훅 실행 시점의 상태
    pub state: PluginState,
}

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn run(&self, ctx: &HookContext) -> Result<()>;
}

/// 클로저 훅
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn(&HookContext) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F> LifecycleHook for FnHook<F>
where
    F: Fn(&HookContext) -> Result<()> + Send + Sync + 'static,
{
    async fn run(&self, ctx: &HookContext) -> Result<()> {
        (self.0)(ctx)
    }
}

/// 등록된 훅
#[derive(Clone)]
pub struct HookRegistration {
    /// 같은 지점 안에서 고유
    pub name: String,

    /// 낮을수록 먼저 실행
    pub priority: i32,

    /// `None`이면 모든 플러그인
    pub plugin_id: Option<String>,

    pub enabled: bool,

    pub hook: Arc<dyn LifecycleHook>,
}

impl HookRegistration {
    pub fn new(name: impl Into<String>, hook: Arc<dyn LifecycleHook>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            plugin_id: None,
            enabled: true,
            hook,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn for_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 이 플러그인에 대해 실행되는지
    pub fn applies_to(&self, plugin_id: &str) -> bool {
        self.enabled && self.plugin_id.as_deref().map_or(true, |p| p == plugin_id)
    }
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("plugin_id", &self.plugin_id)
            .field("enabled", &self.enabled)
            .finish()
    }
}
