//! FastCoref 客户端演示程序

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use fastcoref_client::{ClientConfig, FastCorefClient};

const DEMO_TEXTS: [&str; 2] = [
    "We are happy to see you using our package. This package is fast!",
    "Barack Obama was born in Hawaii. He was elected president in 2008.",
];

#[derive(Parser, Debug)]
#[clap(name = "fastcoref-client", about = "Send texts to a FastCoref endpoint")]
struct ClientArgs {
    /// 待分析文本；不提供时使用内置示例
    texts: Vec<String>,

    /// 端点 id（默认读取 RUNPOD_FASTCOREF_ENDPOINT_ID）
    #[clap(long)]
    endpoint_id: Option<String>,

    /// API key（默认读取 RUNPOD_API_KEY）
    #[clap(long)]
    api_key: Option<String>,

    /// 平台地址，如本地调试服务 http://127.0.0.1:8000
    #[clap(long)]
    base_url: Option<String>,

    #[clap(long)]
    return_logits: bool,

    /// 等待结果的秒数
    #[clap(long, default_value_t = 90)]
    timeout_secs: u64,

    /// 只检查端点健康状态
    #[clap(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = ClientArgs::parse();

    let mut config = ClientConfig::resolve(args.endpoint_id, args.api_key)?
        .with_timeout(Duration::from_secs(args.timeout_secs));
    if let Some(base_url) = args.base_url {
        config = config.with_base_url(base_url);
    }
    let client = FastCorefClient::from_config(config)?;

    if args.health {
        let healthy = client.health_check().await;
        println!("{}: {}", client.config().endpoint_url(), if healthy { "healthy" } else { "unavailable" });
        return Ok(());
    }

    let texts: Vec<String> = if args.texts.is_empty() {
        DEMO_TEXTS.iter().map(|t| t.to_string()).collect()
    } else {
        args.texts
    };

    let results = client.predict_batch(&texts, args.return_logits).await?;
    for (text, result) in texts.iter().zip(&results) {
        println!("Text: {}", text);
        println!(
            "  {} cluster(s), {} mention(s)",
            result.cluster_count(),
            result.mention_count()
        );
        for (index, mentions) in result.get_mentions(text).iter().enumerate() {
            let rendered: Vec<String> = mentions
                .iter()
                .map(|m| format!("\"{}\" [{}, {})", m.text, m.start, m.end))
                .collect();
            println!("  cluster {}: {}", index, rendered.join(", "));
            if let Some(logit) = result.cluster_logits.get(&format!("cluster_{}", index)) {
                println!("    logit: {:.3}", logit.logit);
            }
        }
    }

    Ok(())
}
