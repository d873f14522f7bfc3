//! 请求与响应类型

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 一个 mention：字符区间 `[start, end)` 及其在原文中的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorefMention {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// 簇内前两个 mention 之间的指代 logit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLogit {
    pub span_i: (usize, usize),
    pub span_j: (usize, usize),
    pub logit: f32,
}

/// 单条文本的指代消解结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorefResult {
    pub clusters: Vec<Vec<String>>,
    pub clusters_char_offsets: Vec<Vec<(usize, usize)>>,
    /// 键为 `cluster_{index}`；未请求 logits 时为空
    #[serde(default)]
    pub cluster_logits: BTreeMap<String, ClusterLogit>,
}

impl CorefResult {
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn mention_count(&self) -> usize {
        self.clusters.iter().map(Vec::len).sum()
    }

    /// 按字符偏移从原文切出每个 mention；越界的区间得到空文本
    pub fn get_mentions(&self, original_text: &str) -> Vec<Vec<CorefMention>> {
        let chars: Vec<char> = original_text.chars().collect();
        self.clusters_char_offsets
            .iter()
            .map(|offsets| {
                offsets
                    .iter()
                    .map(|&(start, end)| {
                        let text = if start < end && end <= chars.len() {
                            chars[start..end].iter().collect()
                        } else {
                            String::new()
                        };
                        CorefMention { text, start, end }
                    })
                    .collect()
            })
            .collect()
    }

    /// `clusters` 与 `clusters_char_offsets` 必须逐簇、逐 mention 对齐
    pub fn check_alignment(&self) -> Result<(), String> {
        if self.clusters.len() != self.clusters_char_offsets.len() {
            return Err(format!(
                "{} clusters but {} offset groups",
                self.clusters.len(),
                self.clusters_char_offsets.len()
            ));
        }
        for (index, (mentions, offsets)) in self
            .clusters
            .iter()
            .zip(&self.clusters_char_offsets)
            .enumerate()
        {
            if mentions.len() != offsets.len() {
                return Err(format!(
                    "cluster {} has {} mentions but {} offsets",
                    index,
                    mentions.len(),
                    offsets.len()
                ));
            }
        }
        Ok(())
    }
}

/// 平台任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RunRequest<'a> {
    pub input: RunInput<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunInput<'a> {
    pub texts: &'a [String],
    pub return_logits: bool,
}

/// `runsync` / `run` / `status` 的响应
///
/// 平台返回 `{"id", "status", "output", "error"}`；本地服务也可能直接返回 `{"results"}`。
#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub results: Option<Vec<CorefResult>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HandlerOutput {
    pub results: Vec<CorefResult>,
}

/// 端点上的 worker 计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkerCounts {
    #[serde(default)]
    pub idle: u64,
    #[serde(default)]
    pub ready: u64,
    #[serde(default)]
    pub running: u64,
}

/// `GET /v2/{endpoint_id}/health` 的响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointHealth {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub jobs: Option<Value>,
    #[serde(default)]
    pub workers: Option<WorkerCounts>,
}

impl EndpointHealth {
    pub fn is_healthy(&self) -> bool {
        if self.status.as_deref() == Some("healthy") {
            return true;
        }
        self.workers
            .as_ref()
            .map(|w| w.ready + w.idle > 0)
            .unwrap_or(false)
    }
}
