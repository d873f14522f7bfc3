//! Worker 配置
//!
//! 从 `config.toml` 加载（文件不存在时使用默认值），再由环境变量覆盖。
//! 平台注入的 `RUNPOD_*` 变量优先于配置文件。

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub local_serve: LocalServeConfig,
}

/// 模型 sidecar 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// sidecar 地址（如 "http://127.0.0.1:5010"）
    #[serde(default = "default_model_service_url")]
    pub service_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// 单次预测请求超时（秒）
    #[serde(default = "default_model_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 冷启动时等待 sidecar 就绪的最长时间（秒）
    #[serde(default = "default_model_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_health_poll_interval_ms")]
    pub health_poll_interval_ms: u64,
}

/// 平台任务循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 取任务 URL 模板，`$ID` 替换为 pod id
    #[serde(default)]
    pub get_job_url: Option<String>,
    /// 回传结果 URL 模板，`$ID` 替换为 job id
    #[serde(default)]
    pub post_output_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_pod_id")]
    pub pod_id: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_platform_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// 本地调试服务配置（--serve-local）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalServeConfig {
    #[serde(default = "default_local_host")]
    pub host: String,
    #[serde(default = "default_local_port")]
    pub port: u16,
    /// 设置后要求 `Authorization: Bearer {api_key}`
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_model_service_url() -> String {
    "http://127.0.0.1:5010".to_string()
}

fn default_model_name() -> String {
    "LingMessCoref".to_string()
}

fn default_model_request_timeout_secs() -> u64 {
    120
}

fn default_model_load_timeout_secs() -> u64 {
    600
}

fn default_health_poll_interval_ms() -> u64 {
    1000
}

fn default_pod_id() -> String {
    "local".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_platform_request_timeout_secs() -> u64 {
    30
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_local_port() -> u16 {
    8000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            service_url: default_model_service_url(),
            model_name: default_model_name(),
            request_timeout_secs: default_model_request_timeout_secs(),
            load_timeout_secs: default_model_load_timeout_secs(),
            health_poll_interval_ms: default_health_poll_interval_ms(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            get_job_url: None,
            post_output_url: None,
            api_key: None,
            pod_id: default_pod_id(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_platform_request_timeout_secs(),
        }
    }
}

impl Default for LocalServeConfig {
    fn default() -> Self {
        Self {
            host: default_local_host(),
            port: default_local_port(),
            api_key: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 用进程环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// 用给定的查找函数覆盖配置，空值忽略
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("MODEL_SERVICE_URL") {
            self.model.service_url = url;
        }
        if let Some(url) = get("RUNPOD_WEBHOOK_GET_JOB") {
            self.runtime.get_job_url = Some(url);
        }
        if let Some(url) = get("RUNPOD_WEBHOOK_POST_OUTPUT") {
            self.runtime.post_output_url = Some(url);
        }
        if let Some(key) = get("RUNPOD_AI_API_KEY") {
            self.runtime.api_key = Some(key);
        }
        if let Some(pod_id) = get("RUNPOD_POD_ID") {
            self.runtime.pod_id = pod_id;
        }
    }
}
