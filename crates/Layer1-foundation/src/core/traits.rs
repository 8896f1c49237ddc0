//! Core Traits - 모든 플러그인이 구현해야 하는 인터페이스
//!
//! - `Plugin`: 플러그인 기능 집합 (메타데이터, 라이프사이클, 이벤트/데이터 처리)
//! - `PluginProvider`: 로드된 플러그인 인스턴스 조회 (실행기/모니터가 사용)

use super::types::{PluginConfig, PluginContext, PluginMetadata, PluginStatus};
use crate::event::Event;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// Plugin Trait
// ============================================================================

/// 플러그인 트레이트
///
/// 모든 메서드는 `&self`를 받으므로 상태는 내부 가변성으로 관리한다.
/// 라이프사이클 메서드의 실패는 호출자(라이프사이클 매니저)가 `Error` 상태로 기록한다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 플러그인 메타데이터
    fn metadata(&self) -> PluginMetadata;

    /// 초기화 (샌드박스가 보안 컨텍스트/리소스 제한을 config에 주입한 뒤 호출)
    async fn initialize(&self, ctx: &PluginContext, config: &PluginConfig) -> Result<()>;

    /// 시작
    async fn start(&self, ctx: &PluginContext) -> Result<()>;

    /// 중지
    async fn stop(&self, ctx: &PluginContext) -> Result<()>;

    /// 정리 (언로드 직전)
    async fn cleanup(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// 현재 상태 보고
    fn status(&self) -> PluginStatus;

    /// 이벤트 처리
    async fn handle_event(&self, _ctx: &PluginContext, _event: &Event) -> Result<()> {
        Ok(())
    }

    /// 데이터 처리
    async fn process_data(&self, ctx: &PluginContext, data: Value) -> Result<Value>;
}

// ============================================================================
// PluginProvider - 인스턴스 조회
// ============================================================================

/// 로드된 플러그인 인스턴스 조회 인터페이스
#[async_trait]
pub trait PluginProvider: Send + Sync {
    /// ID로 플러그인 조회
    async fn get_plugin(&self, plugin_id: &str) -> Option<Arc<dyn Plugin>>;

    /// 로드된 모든 플러그인 ID
    async fn plugin_ids(&self) -> Vec<String>;
}
