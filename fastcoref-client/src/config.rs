//! 客户端配置
//!
//! 显式参数优先，其次读取环境变量；空白值视为未设置。

use std::fmt;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

pub const ENV_API_KEY: &str = "RUNPOD_API_KEY";
pub const ENV_ENDPOINT_ID: &str = "RUNPOD_FASTCOREF_ENDPOINT_ID";
pub const ENV_BASE_URL: &str = "RUNPOD_API_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api.runpod.ai";

#[derive(Clone)]
pub struct ClientConfig {
    pub endpoint_id: String,
    pub api_key: String,
    /// 平台 API 根地址，如 `https://api.runpod.ai`
    pub base_url: String,
    /// 同步调用的总等待时间（runsync 加上状态轮询）
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// 单个 HTTP 请求的超时
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(90),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// 从参数和进程环境解析配置
    pub fn resolve(endpoint_id: Option<String>, api_key: Option<String>) -> ClientResult<Self> {
        Self::resolve_with(endpoint_id, api_key, |key| std::env::var(key).ok())
    }

    /// 同 [`ClientConfig::resolve`]，环境变量通过 `lookup` 读取
    pub fn resolve_with<F>(
        endpoint_id: Option<String>,
        api_key: Option<String>,
        lookup: F,
    ) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: Option<String>, env_key: &str| {
            non_blank(explicit).or_else(|| non_blank(lookup(env_key)))
        };

        let api_key = pick(api_key, ENV_API_KEY).ok_or_else(|| {
            ClientError::Configuration(format!(
                "API key not provided and {} is not set",
                ENV_API_KEY
            ))
        })?;
        let endpoint_id = pick(endpoint_id, ENV_ENDPOINT_ID).ok_or_else(|| {
            ClientError::Configuration(format!(
                "endpoint id not provided and {} is not set",
                ENV_ENDPOINT_ID
            ))
        })?;

        let mut config = Self::new(endpoint_id, api_key);
        if let Some(base_url) = non_blank(lookup(ENV_BASE_URL)) {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// `{base_url}/v2/{endpoint_id}`
    pub fn endpoint_url(&self) -> String {
        format!("{}/v2/{}", self.base_url.trim_end_matches('/'), self.endpoint_id)
    }
}

// api_key 不进入日志
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint_id", &self.endpoint_id)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
