//! 全局错误处理机制

use thiserror::Error;
use uuid::Uuid;

/// ThoughtLoom 统一错误类型
#[derive(Error, Debug)]
pub enum ThoughtLoomError {
    /// 提交或反馈参数非法，拒绝入队
    #[error("Validation error: {0}")]
    Validation(String),

    /// 处理器执行失败 (已被认知循环捕获)
    #[error("Processor error: {0}")]
    Processor(String),

    #[error("Thought not found: {0}")]
    NotFound(Uuid),

    /// 思维已出队但尚未完成
    #[error("Thought is in flight: {0}")]
    InFlight(Uuid),

    /// 非法的状态迁移
    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidState {
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 统一 Result 类型别名
pub type Result<T> = std::result::Result<T, ThoughtLoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();
        let err = ThoughtLoomError::InvalidState {
            id,
            from: "processed",
            to: "dispatched",
        };
        assert_eq!(
            err.to_string(),
            format!("Invalid state transition for {}: processed -> dispatched", id)
        );

        let err = ThoughtLoomError::Validation("kind must not be empty".into());
        assert_eq!(err.to_string(), "Validation error: kind must not be empty");
    }

    #[test]
    fn test_from_serde_error() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ThoughtLoomError = parse.unwrap_err().into();
        assert!(matches!(err, ThoughtLoomError::Serialization(_)));
    }
}
