//! 平台任务循环测试：用 axum 模拟平台的取任务 / 回传接口

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use fastcoref_worker::config::RuntimeConfig;
use fastcoref_worker::model::mock::{MockCorefModel, StaticModelLoader, FIXTURE_TEXT};
use fastcoref_worker::{CorefHandler, RuntimeError, WorkerRuntime};

/// 回传记录：(job id, Authorization 头, 请求体)
type Reported = (String, Option<String>, Value);

#[derive(Clone)]
struct FakePlatform {
    queue: Arc<Mutex<VecDeque<Value>>>,
    polled_pods: Arc<Mutex<Vec<String>>>,
    reported: mpsc::UnboundedSender<Reported>,
}

async fn take_job(State(platform): State<FakePlatform>, Path(pod_id): Path<String>) -> Response {
    platform.polled_pods.lock().unwrap().push(pod_id);
    let next = platform.queue.lock().unwrap().pop_front();
    match next {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn job_done(
    State(platform): State<FakePlatform>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let _ = platform.reported.send((job_id, auth, body));
    StatusCode::OK
}

async fn spawn_platform(
    jobs: Vec<Value>,
) -> (String, Arc<Mutex<Vec<String>>>, mpsc::UnboundedReceiver<Reported>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let polled_pods = Arc::new(Mutex::new(Vec::new()));
    let platform = FakePlatform {
        queue: Arc::new(Mutex::new(jobs.into_iter().collect())),
        polled_pods: polled_pods.clone(),
        reported: tx,
    };

    let app = Router::new()
        .route("/v2/job-take/:pod_id", get(take_job))
        .route("/v2/job-done/:job_id", post(job_done))
        .with_state(platform);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), polled_pods, rx)
}

fn runtime_config(base: &str) -> RuntimeConfig {
    RuntimeConfig {
        get_job_url: Some(format!("{}/v2/job-take/$ID", base)),
        post_output_url: Some(format!("{}/v2/job-done/$ID", base)),
        api_key: Some("platform-key".to_string()),
        pod_id: "pod-7".to_string(),
        poll_interval_ms: 10,
        request_timeout_secs: 5,
    }
}

fn fixture_handler() -> Arc<CorefHandler> {
    let loader = Arc::new(StaticModelLoader::new(Arc::new(MockCorefModel::fixture())));
    Arc::new(CorefHandler::new(loader))
}

#[tokio::test]
async fn test_jobs_are_processed_and_reported() {
    let jobs = vec![
        json!({ "id": "job-1", "input": { "texts": [FIXTURE_TEXT] } }),
        json!({ "id": "job-2", "input": { "texts": [] } }),
    ];
    let (base, polled_pods, mut reported) = spawn_platform(jobs).await;

    let runtime = WorkerRuntime::new(runtime_config(&base), fixture_handler()).unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn(async move {
        runtime
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let first = tokio::time::timeout(Duration::from_secs(5), reported.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), reported.recv())
        .await
        .unwrap()
        .unwrap();

    let _ = stop_tx.send(());
    worker.await.unwrap().unwrap();

    let (job_id, auth, body) = first;
    assert_eq!(job_id, "job-1");
    assert_eq!(auth.as_deref(), Some("platform-key"));
    assert_eq!(
        body["output"]["results"][0]["clusters"],
        json!([["We", "our"], ["our package", "This package"]])
    );

    let (job_id, _, body) = second;
    assert_eq!(job_id, "job-2");
    assert!(body.get("output").is_none());
    assert!(body["error"].as_str().unwrap().contains("texts"));

    let pods = polled_pods.lock().unwrap();
    assert!(pods.len() >= 2);
    assert!(pods.iter().all(|pod| pod == "pod-7"));
}

#[tokio::test]
async fn test_fetch_job_without_work() {
    let (base, _, _reported) = spawn_platform(Vec::new()).await;
    let runtime = WorkerRuntime::new(runtime_config(&base), fixture_handler()).unwrap();

    assert!(runtime.fetch_job().await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_while_idle() {
    let (base, _, _reported) = spawn_platform(Vec::new()).await;
    let runtime = WorkerRuntime::new(runtime_config(&base), fixture_handler()).unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        runtime.run_until(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_missing_webhook_urls() {
    let mut config = runtime_config("http://127.0.0.1:1");
    config.get_job_url = None;

    match WorkerRuntime::new(config, fixture_handler()) {
        Err(RuntimeError::Config(message)) => assert!(message.contains("RUNPOD_WEBHOOK_GET_JOB")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("runtime should require a job URL"),
    }
}
