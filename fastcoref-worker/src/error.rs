use thiserror::Error;

use crate::alignment::AlignmentError;
use crate::model::ModelError;

/// 处理器错误：任意一条文本失败都会使整个批次失败
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid input: `{field}` {reason}")]
    InvalidInput { field: String, reason: String },
    #[error("prediction failed: {0}")]
    Model(#[from] ModelError),
    #[error("prediction for text {index} is misaligned: {source}")]
    Alignment {
        index: usize,
        #[source]
        source: AlignmentError,
    },
}

impl HandlerError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        HandlerError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, HandlerError::InvalidInput { .. })
    }
}

/// 平台任务循环错误
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime is not configured: {0}")]
    Config(String),
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform returned {status}: {message}")]
    Platform { status: u16, message: String },
    #[error("failed to decode job: {0}")]
    Decode(#[from] serde_json::Error),
}
