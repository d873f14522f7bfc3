//! fastcoref sidecar HTTP 客户端
//!
//! 模型在本地 Python 服务中运行：
//! - `GET  {service_url}/health`  权重加载完成后返回 2xx
//! - `POST {service_url}/predict` 批量预测

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{CorefModel, CorefPrediction, ModelError, ModelLoader, ModelResult};
use crate::config::ModelConfig;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Option<Vec<CorefPrediction>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    model: Option<String>,
}

pub struct HttpCorefModel {
    client: Client,
    service_url: String,
    model_name: String,
}

impl HttpCorefModel {
    pub fn new(config: &ModelConfig) -> ModelResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
        })
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// 轮询 `/health` 直到 sidecar 就绪或超时（冷启动）
    pub async fn wait_until_ready(&self, timeout: Duration, poll_interval: Duration) -> ModelResult<()> {
        let url = format!("{}/health", self.service_url);
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let last_error = match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let health: Option<HealthResponse> = response.json().await.ok();
                    let reported = health.and_then(|h| h.model).unwrap_or_default();
                    info!(
                        attempts,
                        reported_model = %reported,
                        "Model service at {} is ready",
                        self.service_url
                    );
                    return Ok(());
                }
                Ok(response) => format!("health check returned {}", response.status()),
                Err(e) => e.to_string(),
            };

            if Instant::now() >= deadline {
                error!(attempts, "Model service did not become ready: {}", last_error);
                return Err(ModelError::Unavailable(format!(
                    "model service at {} not ready after {}s: {}",
                    self.service_url,
                    timeout.as_secs(),
                    last_error
                )));
            }
            debug!(attempts, "Model service not ready yet: {}", last_error);
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl CorefModel for HttpCorefModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn predict(&self, texts: &[String]) -> ModelResult<Vec<CorefPrediction>> {
        let url = format!("{}/predict", self.service_url);
        debug!("Sending prediction request to {}: {} text(s)", url, texts.len());

        let response = self
            .client
            .post(&url)
            .json(&PredictRequest { texts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Model service HTTP error: {} - {}", status, error_text);
            return Err(ModelError::Service {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let raw = response.text().await?;
        let body: PredictResponse = serde_json::from_str(&raw).map_err(|e| {
            error!("Model service returned an unreadable body: {}", e);
            ModelError::Malformed(format!("invalid prediction response: {}", e))
        })?;
        match (body.predictions, body.error) {
            (Some(predictions), _) => Ok(predictions),
            (None, Some(message)) => {
                warn!("Model service returned error: {}", message);
                Err(ModelError::Service {
                    status: status.as_u16(),
                    message,
                })
            }
            (None, None) => Err(ModelError::Malformed(
                "response has neither predictions nor error".to_string(),
            )),
        }
    }
}

/// 通过 sidecar 加载模型：创建客户端并等待 `/health` 就绪
pub struct HttpModelLoader {
    config: ModelConfig,
}

impl HttpModelLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self) -> ModelResult<Arc<dyn CorefModel>> {
        let model = HttpCorefModel::new(&self.config)?;
        info!("Waiting for {} at {}", model.name(), model.service_url());
        model
            .wait_until_ready(
                Duration::from_secs(self.config.load_timeout_secs),
                Duration::from_millis(self.config.health_poll_interval_ms),
            )
            .await?;
        Ok(Arc::new(model))
    }
}
