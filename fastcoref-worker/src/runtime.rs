//! 平台任务循环
//!
//! 串行地从平台取任务、调用处理器、回传结果。
//! 只重试平台通信失败；处理器错误作为失败任务回传，不重试。

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::handler::CorefHandler;
use crate::job::Job;

pub struct WorkerRuntime {
    client: Client,
    handler: Arc<CorefHandler>,
    get_job_url: String,
    post_output_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl WorkerRuntime {
    pub fn new(config: RuntimeConfig, handler: Arc<CorefHandler>) -> Result<Self, RuntimeError> {
        let get_job_url = config
            .get_job_url
            .ok_or_else(|| RuntimeError::Config("RUNPOD_WEBHOOK_GET_JOB is not set".to_string()))?;
        let post_output_url = config
            .post_output_url
            .ok_or_else(|| RuntimeError::Config("RUNPOD_WEBHOOK_POST_OUTPUT is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            handler,
            get_job_url: get_job_url.replace("$ID", &config.pod_id),
            post_output_url,
            api_key: config.api_key,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// 运行任务循环直到 `shutdown` 完成；正在处理的任务会先完成再退出
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Worker runtime started, polling {}", self.get_job_url);

        loop {
            let fetched = tokio::select! {
                _ = &mut shutdown => break,
                fetched = self.fetch_job() => fetched,
            };

            match fetched {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        warn!("Failed to report job result: {}", e);
                    }
                    continue;
                }
                Ok(None) => debug!("No job available"),
                Err(e) => warn!("Job poll failed: {}", e),
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Worker runtime stopped");
        Ok(())
    }

    /// 取一个任务；平台没有任务时返回 None
    pub async fn fetch_job(&self) -> Result<Option<Job>, RuntimeError> {
        let mut request = self.client.get(&self.get_job_url);
        if let Some(ref key) = self.api_key {
            request = request.header(AUTHORIZATION, key.as_str());
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Platform {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let body = body.trim();
        if body.is_empty() || body == "{}" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(body)?))
    }

    /// 处理任务并回传结果
    pub async fn process_job(&self, job: Job) -> Result<(), RuntimeError> {
        let outcome = self.handler.handle_job(&job).await;
        let url = self.post_output_url.replace("$ID", &job.id);

        let mut request = self.client.post(&url).json(&outcome.to_platform_body());
        if let Some(ref key) = self.api_key {
            request = request.header(AUTHORIZATION, key.as_str());
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Platform {
                status: status.as_u16(),
                message,
            });
        }

        info!(job_id = %job.id, status = ?outcome.status(), "Job result reported");
        Ok(())
    }
}
