//! 플러그인 호출 격리
//!
//! 플러그인 코드의 패닉이 호출자(라이프사이클 매니저, 샌드박스)로 전파되지 않도록
//! 별도 태스크에서 실행하고 `JoinError`를 플러그인 에러로 바꾼다.

use plugrun_foundation::{Error, Result};
use std::future::Future;
use tracing::error;

/// 별도 태스크에서 플러그인 호출 실행
pub(crate) async fn isolated<T, F>(plugin_id: &str, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(join_err) => {
            error!(plugin_id = %plugin_id, op = %op, error = %join_err, "Plugin call panicked");
            Err(Error::plugin(
                plugin_id,
                format!("{} panicked: {}", op, join_err),
            ))
        }
    }
}
