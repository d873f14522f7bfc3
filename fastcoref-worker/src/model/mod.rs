//! 指代消解模型抽象
//!
//! 模型本体（fastcoref LingMessCoref）运行在 Python sidecar 中，
//! 这里定义调用契约，以及每个 worker 进程只加载一次的模型单例。

mod http_model;
pub mod mock;

pub use http_model::{HttpCorefModel, HttpModelLoader};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::alignment::{CharSpan, TokenSpan};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("malformed model output: {0}")]
    Malformed(String),
    #[error("model returned {actual} predictions for {expected} texts")]
    BatchSizeMismatch { expected: usize, actual: usize },
}

pub type ModelResult<T> = Result<T, ModelError>;

/// 两个 mention 之间的指代 logit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairLogit {
    pub span_i: TokenSpan,
    pub span_j: TokenSpan,
    pub logit: f32,
}

/// 单条文本的模型输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorefPrediction {
    /// 每个 token 在原文中的字符区间
    pub tokens: Vec<CharSpan>,
    /// 指代簇，mention 以 token 区间表示
    pub clusters: Vec<Vec<TokenSpan>>,
    #[serde(default)]
    pub pair_logits: Vec<PairLogit>,
}

impl CorefPrediction {
    /// 查找两个 mention 之间的 logit（与顺序无关）
    pub fn logit(&self, span_i: TokenSpan, span_j: TokenSpan) -> Option<f32> {
        self.pair_logits
            .iter()
            .find(|p| {
                (p.span_i == span_i && p.span_j == span_j)
                    || (p.span_i == span_j && p.span_j == span_i)
            })
            .map(|p| p.logit)
    }
}

#[async_trait]
pub trait CorefModel: Send + Sync {
    fn name(&self) -> &str;

    /// 对整个批次做一次预测，返回值与输入一一对应
    async fn predict(&self, texts: &[String]) -> ModelResult<Vec<CorefPrediction>>;
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> ModelResult<Arc<dyn CorefModel>>;
}

/// 进程级模型单例
///
/// 首次使用时加载，之后复用；并发的首次调用只会触发一次加载。
/// 加载失败不会被缓存，下一次请求会重新尝试。
pub struct ModelSlot {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn CorefModel>>,
}

impl ModelSlot {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> ModelResult<Arc<dyn CorefModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Loading coreference model...");
                let started = Instant::now();
                match self.loader.load().await {
                    Ok(model) => {
                        info!(
                            model = model.name(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Coreference model loaded"
                        );
                        Ok(model)
                    }
                    Err(e) => {
                        error!("Error loading model: {}", e);
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(model))
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }
}
