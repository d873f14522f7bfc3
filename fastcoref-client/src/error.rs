//! 客户端错误类型

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// endpoint id 或 API key 缺失，发生在任何网络请求之前
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to reach endpoint: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("endpoint returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("job {job_id} failed: {message}")]
    JobExecution { job_id: String, message: String },

    #[error("job {} did not finish within {:.1}s", .job_id.as_deref().unwrap_or("<unsubmitted>"), .waited.as_secs_f64())]
    Timeout {
        job_id: Option<String>,
        waited: Duration,
    },

    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// 传输层错误分类：超时归为 Timeout，其余归为 Connection
    pub(crate) fn from_transport(e: reqwest::Error, job_id: Option<&str>, waited: Duration) -> Self {
        if e.is_timeout() {
            ClientError::Timeout {
                job_id: job_id.map(str::to_string),
                waited,
            }
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Connection(e)
        }
    }
}
