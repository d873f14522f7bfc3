//! 进程内模拟模型
//!
//! 用词级切分代替模型 tokenizer，指代簇由调用方按 token 区间预先设定。
//! 供测试和 `--mock-model` 本地调试使用。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CorefModel, CorefPrediction, ModelError, ModelLoader, ModelResult, PairLogit};
use crate::alignment::{word_tokens, TokenSpan};

/// 模拟模型给出的成对 logit
pub const MOCK_PAIR_LOGIT: f32 = 3.5;

pub const FIXTURE_TEXT: &str = "We are happy to see you using our package. This package is fast!";

pub struct MockCorefModel {
    clusters: HashMap<String, Vec<Vec<TokenSpan>>>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl Default for MockCorefModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCorefModel {
    pub fn new() -> Self {
        Self {
            clusters: HashMap::new(),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// 预置 README 示例句子的结果：[["We", "our"], ["our package", "This package"]]
    pub fn fixture() -> Self {
        Self::new().with_clusters(FIXTURE_TEXT, vec![vec![(0, 0), (7, 7)], vec![(7, 8), (10, 11)]])
    }

    /// 为指定文本设定指代簇（token 区间，两端包含）
    pub fn with_clusters(mut self, text: impl Into<String>, clusters: Vec<Vec<(usize, usize)>>) -> Self {
        let clusters = clusters
            .into_iter()
            .map(|cluster| cluster.into_iter().map(TokenSpan::from).collect())
            .collect();
        self.clusters.insert(text.into(), clusters);
        self
    }

    /// 每次预测都返回错误
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn predict_one(&self, text: &str) -> CorefPrediction {
        let clusters = self.clusters.get(text).cloned().unwrap_or_default();
        let pair_logits = clusters
            .iter()
            .filter(|cluster| cluster.len() >= 2)
            .flat_map(|cluster| {
                cluster.windows(2).map(|pair| PairLogit {
                    span_i: pair[0],
                    span_j: pair[1],
                    logit: MOCK_PAIR_LOGIT,
                })
            })
            .collect();

        CorefPrediction {
            tokens: word_tokens(text),
            clusters,
            pair_logits,
        }
    }
}

#[async_trait]
impl CorefModel for MockCorefModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn predict(&self, texts: &[String]) -> ModelResult<Vec<CorefPrediction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.failure {
            return Err(ModelError::Service {
                status: 500,
                message: message.clone(),
            });
        }
        Ok(texts.iter().map(|text| self.predict_one(text)).collect())
    }
}

/// 返回固定模型实例的加载器，记录加载次数
pub struct StaticModelLoader {
    model: Arc<dyn CorefModel>,
    loads: AtomicUsize,
}

impl StaticModelLoader {
    pub fn new(model: Arc<dyn CorefModel>) -> Self {
        Self {
            model,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for StaticModelLoader {
    async fn load(&self) -> ModelResult<Arc<dyn CorefModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.model))
    }
}
