//! 异步任务句柄

use std::time::{Duration, Instant};

use crate::client::{
    check_results, settle, with_job_id, within_deadline, FastCorefClient, Settled,
};
use crate::error::ClientResult;
use crate::types::{CorefResult, JobStatus};

/// `predict_async` / `predict_batch_async` 返回的任务句柄
#[derive(Debug, Clone)]
pub struct JobHandle {
    client: FastCorefClient,
    id: String,
    submitted_status: JobStatus,
    text_count: usize,
}

impl JobHandle {
    pub(crate) fn new(
        client: FastCorefClient,
        id: String,
        submitted_status: JobStatus,
        text_count: usize,
    ) -> Self {
        Self {
            client,
            id,
            submitted_status,
            text_count,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 提交时平台报告的状态
    pub fn submitted_status(&self) -> JobStatus {
        self.submitted_status
    }

    /// 查询当前状态
    pub async fn status(&self) -> ClientResult<JobStatus> {
        let response = self.client.fetch_status(&self.id).await?;
        Ok(response.status.unwrap_or(JobStatus::Unknown))
    }

    /// 等待任务完成并返回结果（每条输入文本一个）
    pub async fn output(&self, timeout: Duration) -> ClientResult<Vec<CorefResult>> {
        let started = Instant::now();
        let response = within_deadline(
            started,
            timeout,
            Some(&self.id),
            self.client.fetch_status(&self.id),
        )
        .await?;
        let results = match settle(with_job_id(response, &self.id))? {
            Settled::Done(results) => results,
            Settled::Pending { .. } => {
                self.client
                    .poll_until_done(&self.id, started, timeout)
                    .await?
            }
        };
        check_results(results, self.text_count)
    }
}
