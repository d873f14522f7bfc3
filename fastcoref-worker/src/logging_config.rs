//! 日志配置
//!
//! 从 `config/logging.json` 加载模块级日志级别，与 `RUST_LOG` 合并后初始化日志系统：
//! 文件日志为 JSON 格式（按 5MB 轮转，保留 5 个），终端只输出 INFO 及以上。

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

const LOGGING_CONFIG_PATH: &str = "config/logging.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 默认日志级别
    #[serde(default = "default_log_level")]
    pub default_level: String,

    /// 模块级别设置，如 `"fastcoref_worker::runtime": "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file() -> String {
    "fastcoref-worker.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: default_log_level(),
            modules: BTreeMap::new(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
        }
    }
}

impl LoggingConfig {
    /// 加载 `config/logging.json`；文件不存在或无法解析时使用默认配置
    pub fn load() -> Self {
        Self::load_from(Path::new(LOGGING_CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return LoggingConfig::default();
        }
        // 此时日志系统尚未初始化，只能写 stderr
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<LoggingConfig>(&content) {
                Ok(config) => return config,
                Err(e) => eprintln!("Failed to parse logging config {:?}: {}", path, e),
            },
            Err(e) => eprintln!("Failed to read logging config {:?}: {}", path, e),
        }
        LoggingConfig::default()
    }

    /// 由配置生成过滤指令，如 `info,fastcoref_worker::runtime=debug`
    pub fn filter_directives(&self) -> String {
        let mut parts = vec![self.default_level.clone()];
        parts.extend(
            self.modules
                .iter()
                .map(|(module, level)| format!("{}={}", module, level)),
        );
        parts.join(",")
    }

    /// 优先级：RUST_LOG > 配置文件 > 默认值
    pub fn build_env_filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            return EnvFilter::from_default_env();
        }
        EnvFilter::try_new(self.filter_directives())
            .unwrap_or_else(|_| EnvFilter::new(self.default_level.clone()))
    }

    /// 初始化日志系统；返回的 guard 必须存活到进程退出，否则缓冲区中的日志会丢失
    pub fn init(&self) -> anyhow::Result<WorkerGuard> {
        std::fs::create_dir_all(&self.log_dir)?;
        let log_path = self.log_dir.join(&self.log_file);

        // file-rotate 在 unix 上多一个文件权限参数
        #[cfg(unix)]
        let rotating_appender = FileRotate::new(
            log_path,
            AppendTimestamp::default(FileLimit::MaxFiles(5)),
            ContentLimit::Bytes(5 * 1024 * 1024),
            Compression::None,
            None,
        );
        #[cfg(not(unix))]
        let rotating_appender = FileRotate::new(
            log_path,
            AppendTimestamp::default(FileLimit::MaxFiles(5)),
            ContentLimit::Bytes(5 * 1024 * 1024),
            Compression::None,
        );
        let (non_blocking_appender, guard) = non_blocking(rotating_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(non_blocking_appender)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .json()
            .with_filter(self.build_env_filter());

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .compact()
            .with_filter(EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .try_init()?;

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_from_modules() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("fastcoref_worker::runtime".to_string(), "debug".to_string());
        config
            .modules
            .insert("fastcoref_worker::model".to_string(), "warn".to_string());

        assert_eq!(
            config.filter_directives(),
            "info,fastcoref_worker::model=warn,fastcoref_worker::runtime=debug"
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{ "default_level": "debug" }"#).unwrap();
        assert_eq!(config.default_level, "debug");
        assert!(config.modules.is_empty());
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.log_file, "fastcoref-worker.log");
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = LoggingConfig::load_from(Path::new("does/not/exist/logging.json"));
        assert_eq!(config.default_level, "info");
    }
}
