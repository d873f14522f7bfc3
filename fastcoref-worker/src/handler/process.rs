//! 将模型输出转换为接口结果

use std::collections::BTreeMap;
use tracing::warn;

use super::types::{ClusterLogit, CorefOutput};
use crate::alignment::{AlignmentError, CharIndex, CharSpan};
use crate::model::CorefPrediction;

/// 处理单条文本的预测：token 区间 -> 字符区间 + mention 文本
pub(crate) fn process_prediction(
    text: &str,
    prediction: &CorefPrediction,
    return_logits: bool,
) -> Result<CorefOutput, AlignmentError> {
    let index = CharIndex::new(text);
    let mut clusters = Vec::with_capacity(prediction.clusters.len());
    let mut clusters_char_offsets = Vec::with_capacity(prediction.clusters.len());

    for cluster in &prediction.clusters {
        let mut mentions = Vec::with_capacity(cluster.len());
        let mut offsets = Vec::with_capacity(cluster.len());
        for &span in cluster {
            let (char_span, surface) = index.align(&prediction.tokens, span)?;
            mentions.push(surface.to_string());
            offsets.push(char_span);
        }
        clusters.push(mentions);
        clusters_char_offsets.push(offsets);
    }

    let cluster_logits = if return_logits {
        collect_cluster_logits(prediction, &clusters_char_offsets)
    } else {
        BTreeMap::new()
    };

    Ok(CorefOutput {
        clusters,
        clusters_char_offsets,
        cluster_logits,
    })
}

/// 每个簇取前两个 mention 的 logit 作为代表
fn collect_cluster_logits(
    prediction: &CorefPrediction,
    offsets: &[Vec<CharSpan>],
) -> BTreeMap<String, ClusterLogit> {
    let mut logits = BTreeMap::new();

    for (cluster_idx, (cluster, spans)) in prediction.clusters.iter().zip(offsets).enumerate() {
        if cluster.len() < 2 {
            continue;
        }
        match prediction.logit(cluster[0], cluster[1]) {
            Some(logit) => {
                logits.insert(
                    format!("cluster_{}", cluster_idx),
                    ClusterLogit {
                        span_i: spans[0],
                        span_j: spans[1],
                        logit,
                    },
                );
            }
            None => warn!("Could not get logit for cluster {}", cluster_idx),
        }
    }

    logits
}
