//! Worker 主程序入口

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use fastcoref_worker::http_server::{self, LocalServeState};
use fastcoref_worker::logging_config::LoggingConfig;
use fastcoref_worker::model::mock::{MockCorefModel, StaticModelLoader, FIXTURE_TEXT};
use fastcoref_worker::model::{HttpModelLoader, ModelLoader};
use fastcoref_worker::{Config, CorefHandler, WorkerRuntime};

#[derive(Parser, Debug)]
#[clap(name = "fastcoref-worker", about = "FastCoref LingMessCoref serverless worker")]
struct WorkerArgs {
    /// 启动本地调试服务，模拟平台任务接口
    #[clap(long)]
    serve_local: bool,

    /// 本地调试服务监听地址（覆盖配置文件）
    #[clap(long)]
    host: Option<String>,

    /// 本地调试服务端口（覆盖配置文件）
    #[clap(long)]
    port: Option<u16>,

    /// 使用进程内模拟模型代替 sidecar
    #[clap(long)]
    mock_model: bool,

    /// 加载模型并执行一次预测后退出
    #[clap(long)]
    warmup: bool,

    #[clap(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = WorkerArgs::parse();

    let logging_config = LoggingConfig::load();
    let _guard = logging_config.init()?;

    info!("Handler module loading...");
    let mut config = Config::load(&args.config)?;
    config.apply_env_overrides();

    let loader: Arc<dyn ModelLoader> = if args.mock_model {
        warn!("Using in-process mock model, results are scripted");
        Arc::new(StaticModelLoader::new(Arc::new(MockCorefModel::fixture())))
    } else {
        Arc::new(HttpModelLoader::new(config.model.clone()))
    };
    let handler = Arc::new(CorefHandler::new(loader));

    if args.warmup {
        return warmup(&handler).await;
    }

    if args.serve_local {
        let host = args.host.unwrap_or(config.local_serve.host);
        let port = args.port.unwrap_or(config.local_serve.port);
        let state = LocalServeState::new(handler, config.local_serve.api_key);
        http_server::start_server(state, &host, port, shutdown_signal()).await?;
        return Ok(());
    }

    info!("Starting serverless worker...");
    let runtime = WorkerRuntime::new(config.runtime, handler)?;
    runtime.run_until(shutdown_signal()).await?;

    Ok(())
}

/// 加载模型并跑一条固定文本，确认首个请求不再承担冷启动
async fn warmup(handler: &CorefHandler) -> Result<()> {
    let output = handler.handle(&json!({ "texts": [FIXTURE_TEXT] })).await?;
    let clusters = output.results.first().map(|r| r.clusters.len()).unwrap_or(0);
    info!(clusters, "Warm-up prediction finished");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
