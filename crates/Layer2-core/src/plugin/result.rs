//! Transition Result - 전이 결과 타입
//!
//! 가장 깊은 곳에서 실패한 단계의 메시지를 그대로 완료 콜백까지 전달합니다.

use feature_foundation::Error;
use thiserror::Error;

/// 전이 실패 - 사람이 읽을 수 있는 메시지를 담습니다
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransitionError {
    message: String,
}

impl TransitionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for TransitionError {
    fn from(error: Error) -> Self {
        Self::new(error.to_string())
    }
}

/// 전이 결과 (Success / Error)
pub type TransitionResult = std::result::Result<(), TransitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_kept_verbatim() {
        let err: TransitionError = Error::operation("disk full").into();
        assert_eq!(err.message(), "disk full");
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_wrapped_error_message() {
        let err: TransitionError = Error::NotFound("Foo.uplugin".into()).into();
        assert_eq!(err.message(), "Not found: Foo.uplugin");
    }
}
