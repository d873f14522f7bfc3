//! 平台任务类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 平台下发的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub input: Value,
}

/// 任务状态：IN_QUEUE -> IN_PROGRESS -> COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 处理器对一个任务的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }

    /// 回传给平台的请求体：`{"output": ...}` 或 `{"error": ...}`
    pub fn to_platform_body(&self) -> Value {
        match self {
            JobOutcome::Completed(output) => json!({ "output": output }),
            JobOutcome::Failed(message) => json!({ "error": message }),
        }
    }
}

/// 本地调试服务中的任务记录，字段与平台 `/status` 响应一致
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "executionTime", skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn queued(id: String) -> Self {
        Self {
            id,
            status: JobStatus::InQueue,
            output: None,
            error: None,
            created_at: Utc::now(),
            execution_time_ms: None,
            finished_at: None,
        }
    }

    pub fn finish(&mut self, outcome: JobOutcome, execution_time_ms: u64) {
        self.status = outcome.status();
        self.execution_time_ms = Some(execution_time_ms);
        self.finished_at = Some(Utc::now());
        match outcome {
            JobOutcome::Completed(output) => self.output = Some(output),
            JobOutcome::Failed(message) => self.error = Some(message),
        }
    }
}
