//! 处理器结构体与入口方法

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::process::process_prediction;
use super::types::{CorefRequest, HandlerOutput};
use crate::error::HandlerError;
use crate::job::{Job, JobOutcome};
use crate::model::{ModelError, ModelLoader, ModelSlot};

/// 指代消解处理器
///
/// 进程内只持有一个模型实例（首次请求时加载），其余无状态。
pub struct CorefHandler {
    model: ModelSlot,
}

impl CorefHandler {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model: ModelSlot::new(loader),
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    /// 处理一个批次：结果与输入等长、同序；任意失败使整个批次失败
    pub async fn handle(&self, input: &Value) -> Result<HandlerOutput, HandlerError> {
        let request = CorefRequest::from_input(input)?;
        info!("Processing {} text(s)...", request.texts.len());

        let model = self.model.get().await?;

        let started = Instant::now();
        let predictions = model.predict(&request.texts).await.map_err(|e| {
            error!("Prediction error: {}", e);
            e
        })?;

        if predictions.len() != request.texts.len() {
            return Err(ModelError::BatchSizeMismatch {
                expected: request.texts.len(),
                actual: predictions.len(),
            }
            .into());
        }

        let results = request
            .texts
            .iter()
            .zip(&predictions)
            .enumerate()
            .map(|(index, (text, prediction))| {
                process_prediction(text, prediction, request.return_logits)
                    .map_err(|source| HandlerError::Alignment { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            return_logits = request.return_logits,
            "Returning {} result(s)",
            results.len()
        );
        Ok(HandlerOutput { results })
    }

    /// 平台边界：处理错误转换为失败的任务结果
    pub async fn handle_job(&self, job: &Job) -> JobOutcome {
        info!(job_id = %job.id, "Received job");

        match self.handle(&job.input).await {
            Ok(output) => match serde_json::to_value(&output) {
                Ok(value) => JobOutcome::Completed(value),
                Err(e) => JobOutcome::Failed(format!("failed to encode output: {}", e)),
            },
            Err(e) => {
                if e.is_invalid_input() {
                    warn!(job_id = %job.id, "Rejected input: {}", e);
                } else {
                    error!(job_id = %job.id, "Handler error: {}", e);
                }
                JobOutcome::Failed(e.to_string())
            }
        }
    }
}
