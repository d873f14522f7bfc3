//! 处理器集成测试

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fastcoref_worker::alignment::{CharIndex, CharSpan};
use fastcoref_worker::model::mock::{MockCorefModel, StaticModelLoader, FIXTURE_TEXT, MOCK_PAIR_LOGIT};
use fastcoref_worker::model::{CorefModel, CorefPrediction, ModelError, ModelLoader, ModelResult};
use fastcoref_worker::{CorefHandler, HandlerError, Job, JobOutcome};

fn handler_with(model: MockCorefModel) -> (CorefHandler, Arc<StaticModelLoader>) {
    let loader = Arc::new(StaticModelLoader::new(Arc::new(model)));
    (CorefHandler::new(loader.clone()), loader)
}

fn sample_model() -> MockCorefModel {
    MockCorefModel::fixture()
        // Barack0 Obama1 was2 president3 .4 He5 served6 two7 terms8 .9
        .with_clusters(
            "Barack Obama was president. He served two terms.",
            vec![vec![(0, 1), (5, 5)]],
        )
        // Zoë0 said1 she2 was3 tired4 .5
        .with_clusters("Zoë said she was tired.", vec![vec![(0, 0), (2, 2)]])
}

#[tokio::test]
async fn test_fixture_sentence() {
    let (handler, _) = handler_with(sample_model());

    let output = handler.handle(&json!({ "texts": [FIXTURE_TEXT] })).await.unwrap();
    assert_eq!(output.results.len(), 1);

    let result = &output.results[0];
    assert_eq!(
        result.clusters,
        vec![vec!["We", "our"], vec!["our package", "This package"]]
    );
    assert_eq!(
        result.clusters_char_offsets,
        vec![
            vec![CharSpan::new(0, 2), CharSpan::new(30, 33)],
            vec![CharSpan::new(30, 41), CharSpan::new(43, 55)],
        ]
    );
    assert!(result.cluster_logits.is_empty());
}

#[tokio::test]
async fn test_batch_order_and_parallel_invariant() {
    let (handler, _) = handler_with(sample_model());
    let texts = vec![
        "Zoë said she was tired.",
        "No entities repeat in this one.",
        FIXTURE_TEXT,
        "Barack Obama was president. He served two terms.",
    ];

    let output = handler.handle(&json!({ "texts": texts })).await.unwrap();
    assert_eq!(output.results.len(), texts.len());
    assert_eq!(output.results[0].clusters, vec![vec!["Zoë", "she"]]);
    assert!(output.results[1].clusters.is_empty());
    assert_eq!(output.results[2].clusters[1], vec!["our package", "This package"]);
    assert_eq!(output.results[3].clusters, vec![vec!["Barack Obama", "He"]]);

    for (text, result) in texts.iter().zip(&output.results) {
        let index = CharIndex::new(text);
        assert_eq!(result.clusters.len(), result.clusters_char_offsets.len());
        for (mentions, offsets) in result.clusters.iter().zip(&result.clusters_char_offsets) {
            assert_eq!(mentions.len(), offsets.len());
            for (mention, span) in mentions.iter().zip(offsets) {
                assert!(span.start < span.end && span.end <= index.char_len());
                assert_eq!(index.slice(*span), Some(mention.as_str()));
            }
        }
    }
}

#[tokio::test]
async fn test_return_logits() {
    let (handler, _) = handler_with(sample_model());

    let output = handler
        .handle(&json!({ "texts": [FIXTURE_TEXT, "Nothing here."], "return_logits": true }))
        .await
        .unwrap();

    let logits = &output.results[0].cluster_logits;
    assert_eq!(logits.len(), 2);
    assert_eq!(logits["cluster_0"].span_i, CharSpan::new(0, 2));
    assert_eq!(logits["cluster_0"].span_j, CharSpan::new(30, 33));
    assert_eq!(logits["cluster_1"].span_i, CharSpan::new(30, 41));
    assert_eq!(logits["cluster_1"].logit, MOCK_PAIR_LOGIT);

    // 没有簇时映射为空
    assert!(output.results[1].cluster_logits.is_empty());
}

#[tokio::test]
async fn test_output_wire_format() {
    let (handler, _) = handler_with(sample_model());
    let output = handler
        .handle(&json!({ "texts": [FIXTURE_TEXT], "return_logits": true }))
        .await
        .unwrap();

    let value = serde_json::to_value(&output).unwrap();
    let result = &value["results"][0];
    assert_eq!(result["clusters"][0], json!(["We", "our"]));
    assert_eq!(result["clusters_char_offsets"][1], json!([[30, 41], [43, 55]]));
    assert_eq!(result["cluster_logits"]["cluster_0"]["span_j"], json!([30, 33]));
}

#[tokio::test]
async fn test_texts_as_json_string() {
    let (handler, _) = handler_with(sample_model());
    let encoded = serde_json::to_string(&vec![FIXTURE_TEXT]).unwrap();

    let output = handler.handle(&json!({ "texts": encoded })).await.unwrap();
    assert_eq!(output.results[0].clusters.len(), 2);
}

#[tokio::test]
async fn test_invalid_inputs() {
    let (handler, loader) = handler_with(sample_model());

    let cases = vec![
        (json!({}), "texts"),
        (json!({ "texts": [] }), "texts"),
        (json!({ "texts": "not json" }), "texts"),
        (json!({ "texts": "{\"a\": 1}" }), "texts"),
        (json!({ "texts": 42 }), "texts"),
        (json!({ "texts": ["ok", 7] }), "texts[1]"),
        (json!({ "texts": ["ok"], "return_logits": "yes" }), "return_logits"),
        (json!(["ok"]), "input"),
    ];

    for (input, expected_field) in cases {
        match handler.handle(&input).await {
            Err(HandlerError::InvalidInput { field, .. }) => {
                assert_eq!(field, expected_field, "input: {}", input)
            }
            other => panic!("expected InvalidInput for {}, got {:?}", input, other.map(|_| ())),
        }
    }

    // 输入校验在加载模型之前
    assert_eq!(loader.load_count(), 0);
}

#[tokio::test]
async fn test_model_failure_fails_whole_batch() {
    let (handler, _) = handler_with(MockCorefModel::failing("CUDA out of memory"));

    let err = handler
        .handle(&json!({ "texts": ["one", "two"] }))
        .await
        .unwrap_err();
    assert!(matches!(err, HandlerError::Model(ModelError::Service { .. })));
    assert!(err.to_string().contains("CUDA out of memory"));
}

struct ShortBatchModel;

#[async_trait]
impl CorefModel for ShortBatchModel {
    fn name(&self) -> &str {
        "short"
    }

    async fn predict(&self, _texts: &[String]) -> ModelResult<Vec<CorefPrediction>> {
        Ok(vec![CorefPrediction::default()])
    }
}

#[tokio::test]
async fn test_batch_size_mismatch() {
    let loader = Arc::new(StaticModelLoader::new(Arc::new(ShortBatchModel)));
    let handler = CorefHandler::new(loader);

    let err = handler.handle(&json!({ "texts": ["a", "b"] })).await.unwrap_err();
    assert!(matches!(
        err,
        HandlerError::Model(ModelError::BatchSizeMismatch { expected: 2, actual: 1 })
    ));
}

#[tokio::test]
async fn test_model_loaded_once() {
    let (handler, loader) = handler_with(sample_model());
    assert!(!handler.is_model_loaded());

    for _ in 0..3 {
        handler.handle(&json!({ "texts": [FIXTURE_TEXT] })).await.unwrap();
    }
    assert!(handler.is_model_loaded());
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn test_whole_batch_is_one_model_call() {
    let model = Arc::new(MockCorefModel::fixture());
    let loader = Arc::new(StaticModelLoader::new(model.clone()));
    let handler = CorefHandler::new(loader);

    handler
        .handle(&json!({ "texts": [FIXTURE_TEXT, "one", "two"] }))
        .await
        .unwrap();
    assert_eq!(model.call_count(), 1);
}

/// 加载较慢、记录加载次数的加载器
struct SlowLoader {
    loads: AtomicUsize,
}

#[async_trait]
impl ModelLoader for SlowLoader {
    async fn load(&self) -> ModelResult<Arc<dyn CorefModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Arc::new(MockCorefModel::fixture()))
    }
}

#[tokio::test]
async fn test_concurrent_first_use_loads_once() {
    let loader = Arc::new(SlowLoader {
        loads: AtomicUsize::new(0),
    });
    let handler = Arc::new(CorefHandler::new(loader.clone()));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle(&json!({ "texts": [FIXTURE_TEXT] })).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

/// 第一次加载失败、之后成功的加载器
struct FlakyLoader {
    attempts: AtomicUsize,
}

#[async_trait]
impl ModelLoader for FlakyLoader {
    async fn load(&self) -> ModelResult<Arc<dyn CorefModel>> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ModelError::Unavailable("sidecar still starting".to_string()));
        }
        Ok(Arc::new(MockCorefModel::fixture()))
    }
}

#[tokio::test]
async fn test_failed_load_is_retried() {
    let loader = Arc::new(FlakyLoader {
        attempts: AtomicUsize::new(0),
    });
    let handler = CorefHandler::new(loader.clone());

    let err = handler.handle(&json!({ "texts": [FIXTURE_TEXT] })).await.unwrap_err();
    assert!(matches!(err, HandlerError::Model(ModelError::Unavailable(_))));
    assert!(!handler.is_model_loaded());

    handler.handle(&json!({ "texts": [FIXTURE_TEXT] })).await.unwrap();
    assert_eq!(loader.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_handle_job_outcomes() {
    let (handler, _) = handler_with(sample_model());

    let ok = handler
        .handle_job(&Job {
            id: "job-ok".to_string(),
            input: json!({ "texts": [FIXTURE_TEXT] }),
        })
        .await;
    match ok {
        JobOutcome::Completed(value) => {
            assert_eq!(value["results"][0]["clusters"][0], json!(["We", "our"]))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let failed = handler
        .handle_job(&Job {
            id: "job-bad".to_string(),
            input: json!({ "texts": [] }),
        })
        .await;
    match failed {
        JobOutcome::Failed(message) => assert!(message.contains("texts")),
        other => panic!("unexpected outcome: {:?}", other),
    }
}
