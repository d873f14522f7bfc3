//! 端到端：客户端对接 worker 的本地调试服务（模拟模型）

use std::sync::Arc;
use std::time::Duration;

use fastcoref_client::{ClientConfig, ClientError, FastCorefClient};
use fastcoref_worker::http_server::{create_router, LocalServeState};
use fastcoref_worker::model::mock::{MockCorefModel, StaticModelLoader, FIXTURE_TEXT};
use fastcoref_worker::CorefHandler;

async fn spawn_worker(api_key: &str) -> String {
    let loader = Arc::new(StaticModelLoader::new(Arc::new(MockCorefModel::fixture())));
    let handler = Arc::new(CorefHandler::new(loader));
    let state = LocalServeState::new(handler, Some(api_key.to_string()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base: &str, api_key: &str) -> FastCorefClient {
    let config = ClientConfig::new("local", api_key)
        .with_base_url(base)
        .with_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(20));
    FastCorefClient::from_config(config).unwrap()
}

#[tokio::test]
async fn test_fixture_sentence_end_to_end() {
    let base = spawn_worker("local-key").await;
    let client = client(&base, "local-key");

    let result = client.predict(FIXTURE_TEXT, true).await.unwrap();
    assert_eq!(
        result.clusters,
        vec![vec!["We", "our"], vec!["our package", "This package"]]
    );
    assert_eq!(
        result.clusters_char_offsets,
        vec![vec![(0, 2), (30, 33)], vec![(30, 41), (43, 55)]]
    );
    assert_eq!(result.cluster_logits["cluster_1"].span_j, (43, 55));

    let mentions = result.get_mentions(FIXTURE_TEXT);
    assert_eq!(mentions[1][1].text, "This package");
}

#[tokio::test]
async fn test_async_job_end_to_end() {
    let base = spawn_worker("local-key").await;
    let client = client(&base, "local-key");

    let handle = client
        .predict_batch_async(&[FIXTURE_TEXT, "Nothing refers back here."], false)
        .await
        .unwrap();
    let results = handle.output(Duration::from_secs(5)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].cluster_count(), 2);
    assert_eq!(results[1].cluster_count(), 0);
}

#[tokio::test]
async fn test_blank_text_and_wrong_key() {
    let base = spawn_worker("local-key").await;

    // 空白文本是合法输入，只是没有指代簇
    let result = client(&base, "local-key").predict("   ", false).await.unwrap();
    assert_eq!(result.cluster_count(), 0);

    match client(&base, "not-the-key").predict(FIXTURE_TEXT, false).await.unwrap_err() {
        ClientError::Remote { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_invalid_input_surfaces_as_job_failure() {
    let base = spawn_worker("local-key").await;
    let client = client(&base, "local-key");

    // 直接提交空批次会被客户端短路，这里经由 run 接口提交
    let handle = client.predict_batch_async(&Vec::<String>::new(), false).await.unwrap();
    match handle.output(Duration::from_secs(5)).await.unwrap_err() {
        ClientError::JobExecution { job_id, message } => {
            assert_eq!(job_id, handle.id());
            assert!(message.contains("texts"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_health_end_to_end() {
    let base = spawn_worker("local-key").await;
    assert!(client(&base, "local-key").health_check().await);
}
