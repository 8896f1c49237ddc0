//! # Sandbox
//!
//! 플러그인별 보안 컨텍스트와 리소스 제한. 초기화 시점에 만들어지고 제거 시 삭제된다.
//!
//! 리소스 제한은 권고 사항이다. 샘플러는 초과를 경고로 기록할 뿐 강제하지 않는다.

mod limits;
mod manager;
mod security;

pub use limits::{ResourceLimits, ELEVATED_TIERS};
pub use manager::{LimitBreach, SandboxManager, RESOURCE_LIMITS_KEY, SECURITY_CONTEXT_KEY};
pub use security::{SecurityContext, WILDCARD};
