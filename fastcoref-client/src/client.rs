//! FastCoref 端点客户端
//!
//! 同步调用走 `runsync`：平台在等待窗口内完成则直接返回结果，
//! 否则返回排队中的任务 id，由客户端轮询 `status` 直到超时。

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::job::JobHandle;
use crate::types::{
    CorefResult, EndpointHealth, HandlerOutput, JobResponse, JobStatus, RunInput, RunRequest,
};

/// 平台允许的 runsync 最长等待
const MAX_RUNSYNC_WAIT: Duration = Duration::from_secs(300);

/// runsync 等待窗口与调用方截止时间之间的余量上限
const RUNSYNC_MARGIN: Duration = Duration::from_secs(2);

/// 一次响应的解析结果
#[derive(Debug)]
pub(crate) enum Settled {
    Done(Vec<CorefResult>),
    Pending { job_id: String, status: JobStatus },
}

#[derive(Debug, Clone)]
pub struct FastCorefClient {
    http: Client,
    config: ClientConfig,
}

impl FastCorefClient {
    /// 显式参数优先，缺失时读取 `RUNPOD_FASTCOREF_ENDPOINT_ID` / `RUNPOD_API_KEY`
    pub fn new(endpoint_id: Option<String>, api_key: Option<String>) -> ClientResult<Self> {
        Self::from_config(ClientConfig::resolve(endpoint_id, api_key)?)
    }

    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        if config.endpoint_id.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(ClientError::Configuration(
                "endpoint id and API key must not be empty".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Connection)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 对单条文本做指代消解
    pub async fn predict(&self, text: &str, return_logits: bool) -> ClientResult<CorefResult> {
        let mut results = self.predict_batch(&[text], return_logits).await?;
        results
            .pop()
            .ok_or_else(|| ClientError::Decode("endpoint returned no result".to_string()))
    }

    /// 整批文本作为一个任务提交，结果与输入顺序一致
    pub async fn predict_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        return_logits: bool,
    ) -> ClientResult<Vec<CorefResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = texts.iter().map(|t| t.as_ref().to_string()).collect();
        let started = Instant::now();
        let timeout = self.config.timeout;

        let body = within_deadline(
            started,
            timeout,
            None,
            self.run_sync(&texts, return_logits, started, timeout),
        )
        .await?;

        let results = match settle(body)? {
            Settled::Done(results) => results,
            Settled::Pending { job_id, status } => {
                info!(job_id = %job_id, ?status, "Job still running after runsync, polling status");
                self.poll_until_done(&job_id, started, self.config.timeout)
                    .await?
            }
        };

        check_results(results, texts.len())
    }

    /// `POST /runsync`
    ///
    /// 平台等待窗口短于调用方截止时间，未完成的任务会带着 id 返回，再由轮询接手。
    /// 该请求不受 `request_timeout` 限制，只受截止时间约束。
    async fn run_sync(
        &self,
        texts: &[String],
        return_logits: bool,
        started: Instant,
        timeout: Duration,
    ) -> ClientResult<JobResponse> {
        let wait = runsync_wait(timeout);
        let url = format!("{}/runsync?wait={}", self.config.endpoint_url(), wait.as_millis());
        debug!("Submitting {} text(s) to {}", texts.len(), url);

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .bearer_auth(&self.config.api_key)
            .json(&RunRequest {
                input: RunInput {
                    texts,
                    return_logits,
                },
            })
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, None, started.elapsed()))?;
        read_json(response, None, started).await
    }

    /// 异步提交单条文本，立即返回任务句柄
    pub async fn predict_async(&self, text: &str, return_logits: bool) -> ClientResult<JobHandle> {
        self.predict_batch_async(&[text], return_logits).await
    }

    /// 异步提交一批文本（`POST /run`）
    pub async fn predict_batch_async<S: AsRef<str>>(
        &self,
        texts: &[S],
        return_logits: bool,
    ) -> ClientResult<JobHandle> {
        let texts: Vec<String> = texts.iter().map(|t| t.as_ref().to_string()).collect();
        let started = Instant::now();
        let url = format!("{}/run", self.config.endpoint_url());

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&RunRequest {
                input: RunInput {
                    texts: &texts,
                    return_logits,
                },
            })
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, None, started.elapsed()))?;
        let body: JobResponse = read_json(response, None, started).await?;

        let job_id = body
            .id
            .ok_or_else(|| ClientError::Decode("run response has no job id".to_string()))?;
        let status = body.status.unwrap_or(JobStatus::InQueue);
        info!(job_id = %job_id, ?status, "Job submitted");

        Ok(JobHandle::new(self.clone(), job_id, status, texts.len()))
    }

    /// 端点健康信息
    pub async fn health(&self) -> ClientResult<EndpointHealth> {
        let started = Instant::now();
        let url = format!("{}/health", self.config.endpoint_url());
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, None, started.elapsed()))?;
        read_json(response, None, started).await
    }

    /// 端点可用时返回 true；任何错误都视为不可用
    pub async fn health_check(&self) -> bool {
        match self.health().await {
            Ok(health) => health.is_healthy(),
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        }
    }

    pub(crate) async fn fetch_status(&self, job_id: &str) -> ClientResult<JobResponse> {
        let started = Instant::now();
        let url = format!("{}/status/{}", self.config.endpoint_url(), job_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, Some(job_id), started.elapsed()))?;
        read_json(response, Some(job_id), started).await
    }

    /// 每隔 `poll_interval` 查询一次任务状态，直到完成或超过 `timeout`
    pub(crate) async fn poll_until_done(
        &self,
        job_id: &str,
        started: Instant,
        timeout: Duration,
    ) -> ClientResult<Vec<CorefResult>> {
        loop {
            let waited = started.elapsed();
            if waited >= timeout {
                warn!(job_id = %job_id, "Gave up waiting for job after {:?}", waited);
                return Err(ClientError::Timeout {
                    job_id: Some(job_id.to_string()),
                    waited,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(timeout - waited)).await;

            let polled =
                within_deadline(started, timeout, Some(job_id), self.fetch_status(job_id)).await;
            let response = match polled {
                Ok(response) => response,
                // 单次查询超过 request_timeout 时，截止时间未到就继续轮询
                Err(ClientError::Timeout { .. }) if started.elapsed() < timeout => {
                    debug!(job_id = %job_id, "Status request timed out, polling again");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match settle(with_job_id(response, job_id))? {
                Settled::Done(results) => return Ok(results),
                Settled::Pending { status, .. } => debug!(job_id = %job_id, ?status, "Job pending"),
            }
        }
    }
}

/// runsync 的平台等待窗口：比截止时间早一个余量返回，且不超过平台上限
fn runsync_wait(timeout: Duration) -> Duration {
    let margin = (timeout / 10).min(RUNSYNC_MARGIN);
    timeout.saturating_sub(margin).min(MAX_RUNSYNC_WAIT)
}

/// 在调用方截止时间内完成 `fut`，否则返回 Timeout
pub(crate) async fn within_deadline<T, F>(
    started: Instant,
    timeout: Duration,
    job_id: Option<&str>,
    fut: F,
) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    let remaining = timeout.saturating_sub(started.elapsed());
    match tokio::time::timeout(remaining, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            job_id: job_id.map(str::to_string),
            waited: started.elapsed(),
        }),
    }
}

/// `status` 响应可能省略 id，用已知 id 补齐
pub(crate) fn with_job_id(mut response: JobResponse, job_id: &str) -> JobResponse {
    if response.id.is_none() {
        response.id = Some(job_id.to_string());
    }
    response
}

/// 把一次平台响应归类为已完成或仍在进行
pub(crate) fn settle(response: JobResponse) -> ClientResult<Settled> {
    if let Some(results) = response.results {
        return Ok(Settled::Done(results));
    }

    let id = response.id;
    let job_id = id.clone().unwrap_or_else(|| "<unknown>".to_string());
    if let Some(error) = response.error.filter(|e| !e.is_null()) {
        return Err(ClientError::JobExecution {
            job_id,
            message: error_text(&error),
        });
    }

    match response.status {
        Some(JobStatus::Completed) | None => {
            let output = response.output.ok_or_else(|| {
                ClientError::Decode("response has neither results nor output".to_string())
            })?;
            if let Some(error) = output.get("error").filter(|e| !e.is_null()) {
                return Err(ClientError::JobExecution {
                    job_id,
                    message: error_text(error),
                });
            }
            let output: HandlerOutput = serde_json::from_value(output)
                .map_err(|e| ClientError::Decode(format!("invalid job output: {}", e)))?;
            Ok(Settled::Done(output.results))
        }
        Some(status) if status.is_failure() => Err(ClientError::JobExecution {
            job_id,
            message: format!("job ended with status {:?}", status),
        }),
        Some(status) => match id {
            Some(job_id) => Ok(Settled::Pending { job_id, status }),
            None => Err(ClientError::Decode(format!(
                "job is {:?} but the response has no job id",
                status
            ))),
        },
    }
}

/// 结果数量必须等于输入数量，且每条结果都满足对齐约束
pub(crate) fn check_results(
    results: Vec<CorefResult>,
    expected: usize,
) -> ClientResult<Vec<CorefResult>> {
    if results.len() != expected {
        return Err(ClientError::Decode(format!(
            "expected {} results, got {}",
            expected,
            results.len()
        )));
    }
    for (index, result) in results.iter().enumerate() {
        result
            .check_alignment()
            .map_err(|reason| ClientError::Decode(format!("result {}: {}", index, reason)))?;
    }
    Ok(results)
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    job_id: Option<&str>,
    started: Instant,
) -> ClientResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::from_transport(e, job_id, started.elapsed()))?;

    if !status.is_success() {
        return Err(ClientError::Remote {
            status: status.as_u16(),
            message: remote_message(status, &body),
        });
    }
    serde_json::from_str(&body)
        .map_err(|e| ClientError::Decode(format!("invalid response body: {}", e)))
}

/// 优先取响应体中的 `error` / `message` 字段，否则使用原始响应体
fn remote_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(field) = value.get(key).filter(|v| !v.is_null()) {
                return error_text(field);
            }
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body.to_string()
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
