//! 处理器请求与结果类型

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::alignment::CharSpan;
use crate::error::HandlerError;

/// 一个批次的请求
#[derive(Debug, Clone, PartialEq)]
pub struct CorefRequest {
    pub texts: Vec<String>,
    pub return_logits: bool,
}

impl CorefRequest {
    /// 从任务 `input` 解析请求
    ///
    /// `texts` 可以是字符串数组，也可以是包含 JSON 数组的字符串。
    pub fn from_input(input: &Value) -> Result<Self, HandlerError> {
        let fields = input
            .as_object()
            .ok_or_else(|| HandlerError::invalid("input", "must be a JSON object"))?;

        let texts_value = fields
            .get("texts")
            .ok_or_else(|| HandlerError::invalid("texts", "is required"))?;

        let decoded;
        let texts_value = match texts_value {
            Value::String(raw) => {
                decoded = serde_json::from_str::<Value>(raw).map_err(|e| {
                    HandlerError::invalid("texts", format!("contains invalid JSON: {}", e))
                })?;
                &decoded
            }
            other => other,
        };

        let items = texts_value
            .as_array()
            .ok_or_else(|| HandlerError::invalid("texts", "must be a list of strings"))?;
        if items.is_empty() {
            return Err(HandlerError::invalid("texts", "list is empty"));
        }

        let texts = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| HandlerError::invalid(format!("texts[{}]", i), "must be a string"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let return_logits = match fields.get("return_logits") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(HandlerError::invalid("return_logits", "must be a boolean")),
        };

        Ok(Self {
            texts,
            return_logits,
        })
    }
}

/// 一个簇首两个 mention 之间的 logit（字符偏移）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLogit {
    pub span_i: CharSpan,
    pub span_j: CharSpan,
    pub logit: f32,
}

/// 单条文本的结果
///
/// `clusters` 与 `clusters_char_offsets` 按下标一一对应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorefOutput {
    pub clusters: Vec<Vec<String>>,
    pub clusters_char_offsets: Vec<Vec<CharSpan>>,
    /// 未请求 logit 时为空
    pub cluster_logits: BTreeMap<String, ClusterLogit>,
}

/// 任务输出：`{"results": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub results: Vec<CorefOutput>,
}
