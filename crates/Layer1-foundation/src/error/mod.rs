//! Error types for plugrun
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// plugrun 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 입력 검증
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 상태 전제조건
    // ========================================================================
    #[error("Invalid state transition for plugin {plugin_id}: {from} -> {to}")]
    InvalidTransition {
        plugin_id: String,
        from: String,
        to: String,
    },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // 플러그인 실행
    // ========================================================================
    #[error("Plugin {plugin_id} failed: {message}")]
    Plugin { plugin_id: String, message: String },

    #[error("Plugin type mismatch for {plugin_id}: expected {expected}, declared {declared}")]
    TypeMismatch {
        plugin_id: String,
        expected: String,
        declared: String,
    },

    // ========================================================================
    // 실행기 / 큐
    // ========================================================================
    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Not running: {0}")]
    NotRunning(String),

    // ========================================================================
    // 의존성
    // ========================================================================
    #[error("Dependency not satisfied: {name} ({constraint})")]
    DependencyNotFound { name: String, constraint: String },

    #[error("Dependency conflict: {name} resolved to versions {versions:?}")]
    DependencyConflict { name: String, versions: Vec<String> },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    // ========================================================================
    // 리소스 / 보안
    // ========================================================================
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // ========================================================================
    // 설정
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    ///
    /// 실행기는 이 값과 무관하게 재시도 정책을 적용하지만,
    /// 취소/검증 에러는 재시도해도 결과가 같다.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Cancelled
                | Error::InvalidInput(_)
                | Error::Validation(_)
                | Error::NotFound(_)
                | Error::TypeMismatch { .. }
        )
    }

    /// NotFound 계열인지 확인
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::DependencyNotFound { .. })
    }

    /// 플러그인 에러 생성 헬퍼
    pub fn plugin(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Plugin {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }

    /// 상태 전이 에러 생성 헬퍼
    pub fn transition(
        plugin_id: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Error::InvalidTransition {
            plugin_id: plugin_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
