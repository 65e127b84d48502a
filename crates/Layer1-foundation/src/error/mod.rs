//! Error types for FeatureForge
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// FeatureForge 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 플러그인 상태 머신 (사용 오류)
    // ========================================================================
    #[error("Invalid plugin URL: {0}")]
    InvalidUrl(String),

    #[error("State machine already initialized: {0}")]
    AlreadyInitialized(String),

    #[error("State machine not initialized")]
    NotInitialized,

    // ========================================================================
    // 외부 작업 (다운로드, 마운트, 로드 ...)
    // ========================================================================
    /// 백엔드가 보고한 작업 실패 - 메시지를 그대로 전달
    #[error("{0}")]
    Operation(String),

    #[error("Download failed: {url} - {message}")]
    Download { url: String, message: String },

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Download { .. })
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::InvalidUrl(_)
                | Error::Operation(_)
                | Error::Cancelled
        )
    }

    /// 다운로드 에러 생성 헬퍼
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// 작업 실패 에러 생성 헬퍼
    pub fn operation(message: impl Into<String>) -> Self {
        Error::Operation(message.into())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_message_is_verbatim() {
        let err = Error::operation("disk full");
        assert_eq!(err.to_string(), "disk full");
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::download("web:foo", "timeout").is_retryable());
        assert!(!Error::NotInitialized.is_retryable());
    }
}
