//! # Lifecycle Manager
//!
//! 플러그인을 `Initialize → Start → Stop → Cleanup`으로 구동한다.
//!
//! - 상태 레코드: 현재/이전 상태, 단계별 시각, 마지막 에러, 재시작 횟수, 마지막 설정
//! - 이력: 플러그인별 상한 링 버퍼
//! - 훅: `before/after_{initialize,start,stop,cleanup}`, 우선순위 순 실행
//! - 헬스 체크: 주기적으로 `status()`를 확인하고 하트비트 갱신 또는 재시작

mod hooks;
mod manager;
mod types;

pub use hooks::{FnHook, HookContext, HookPoint, HookRegistration, LifecycleHook};
pub use manager::LifecycleManager;
pub use types::{LifecycleEvent, LifecycleEventType, LifecycleState};
