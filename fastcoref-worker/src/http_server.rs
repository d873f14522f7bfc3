//! 本地调试服务（--serve-local）
//!
//! 模拟平台的任务接口，便于在没有平台的情况下用客户端 SDK 联调处理器：
//! - `POST /v2/:endpoint_id/runsync`         同步执行
//! - `POST /v2/:endpoint_id/run`             异步提交
//! - `GET  /v2/:endpoint_id/status/:job_id`  查询任务
//! - `GET  /v2/:endpoint_id/health`、`GET /health`

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::handler::CorefHandler;
use crate::job::{Job, JobRecord, JobStatus};

/// 已结束的异步任务记录保留时长
pub const DEFAULT_FINISHED_TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct LocalServeState {
    pub handler: Arc<CorefHandler>,
    /// 异步任务表；runsync 的记录在响应后即移除
    pub jobs: Arc<DashMap<String, JobRecord>>,
    pub api_key: Option<String>,
    finished_ttl: Duration,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl LocalServeState {
    pub fn new(handler: Arc<CorefHandler>, api_key: Option<String>) -> Self {
        Self {
            handler,
            jobs: Arc::new(DashMap::new()),
            api_key,
            finished_ttl: DEFAULT_FINISHED_TTL,
            completed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_finished_ttl(mut self, ttl: Duration) -> Self {
        self.finished_ttl = ttl;
        self
    }

    /// 清理超过保留时长的已结束记录
    fn prune_finished(&self) {
        let now = chrono::Utc::now();
        let before = self.jobs.len();
        self.jobs.retain(|_, record| match record.finished_at {
            Some(finished_at) => (now - finished_at)
                .to_std()
                .map_or(true, |age| age < self.finished_ttl),
            None => true,
        });
        let pruned = before.saturating_sub(self.jobs.len());
        if pruned > 0 {
            debug!(pruned, "Pruned finished job records");
        }
    }

    fn count_finished(&self, status: JobStatus) {
        let counter = match status {
            JobStatus::Completed => &self.completed,
            JobStatus::Failed => &self.failed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn create_router(state: LocalServeState) -> Router {
    let job_routes = Router::new()
        .route("/v2/:endpoint_id/runsync", post(handle_run_sync))
        .route("/v2/:endpoint_id/run", post(handle_run))
        .route("/v2/:endpoint_id/status/:job_id", get(handle_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(job_routes)
        .route("/v2/:endpoint_id/health", get(handle_health))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// 启动本地调试服务，直到 `shutdown` 完成
pub async fn start_server<F>(
    state: LocalServeState,
    host: &str,
    port: u16,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Local test server listening on: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn auth_middleware(
    State(state): State<LocalServeState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected) = state.api_key {
        let provided = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));
        if provided != Some(expected.as_str()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(req).await)
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn new_job(body: &Value) -> Option<Job> {
    let input = body.get("input")?.clone();
    Some(Job {
        id: format!("local-{}", uuid::Uuid::new_v4()),
        input,
    })
}

async fn execute(state: &LocalServeState, job: &Job, record: &mut JobRecord) {
    let started = Instant::now();
    let outcome = state.handler.handle_job(job).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    state.count_finished(outcome.status());
    record.finish(outcome, elapsed_ms);
}

async fn run_job(state: &LocalServeState, job: Job) {
    let mut record = JobRecord::queued(job.id.clone());
    if let Some(mut stored) = state.jobs.get_mut(&job.id) {
        stored.status = JobStatus::InProgress;
        record = stored.clone();
    }

    execute(state, &job, &mut record).await;
    state.jobs.insert(job.id.clone(), record);
}

async fn handle_run_sync(
    State(state): State<LocalServeState>,
    Path(_endpoint_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(job) = new_job(&body) else {
        return bad_request("request body must contain `input`");
    };
    state.prune_finished();

    // 同步任务不进入任务表
    let mut record = JobRecord::queued(job.id.clone());
    record.status = JobStatus::InProgress;
    execute(&state, &job, &mut record).await;

    Json(record).into_response()
}

async fn handle_run(
    State(state): State<LocalServeState>,
    Path(_endpoint_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(job) = new_job(&body) else {
        return bad_request("request body must contain `input`");
    };
    state.prune_finished();
    let job_id = job.id.clone();
    state.jobs.insert(job_id.clone(), JobRecord::queued(job_id.clone()));

    let task_state = state.clone();
    tokio::spawn(async move {
        run_job(&task_state, job).await;
    });

    Json(json!({ "id": job_id, "status": JobStatus::InQueue })).into_response()
}

async fn handle_status(
    State(state): State<LocalServeState>,
    Path((_endpoint_id, job_id)): Path<(String, String)>,
) -> Response {
    match state.jobs.get(&job_id) {
        Some(record) => Json(record.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("job {} not found", job_id) })),
        )
            .into_response(),
    }
}

async fn handle_health(State(state): State<LocalServeState>) -> impl IntoResponse {
    let count = |status: JobStatus| state.jobs.iter().filter(|r| r.status == status).count();

    Json(json!({
        "status": "healthy",
        "model_loaded": state.handler.is_model_loaded(),
        "jobs": {
            "inQueue": count(JobStatus::InQueue),
            "inProgress": count(JobStatus::InProgress),
            "completed": state.completed.load(Ordering::Relaxed),
            "failed": state.failed.load(Ordering::Relaxed),
        },
        "workers": { "ready": 1, "running": count(JobStatus::InProgress) },
    }))
}
