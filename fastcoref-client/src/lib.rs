//! FastCoref 无服务器端点的客户端 SDK
//!
//! ```no_run
//! # async fn demo() -> Result<(), fastcoref_client::ClientError> {
//! let client = fastcoref_client::FastCorefClient::new(None, None)?;
//! let result = client
//!     .predict("We are happy to see you using our package. This package is fast!", false)
//!     .await?;
//! for cluster in &result.clusters {
//!     println!("{:?}", cluster);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod types;

pub use client::FastCorefClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use job::JobHandle;
pub use types::{ClusterLogit, CorefMention, CorefResult, EndpointHealth, JobStatus, WorkerCounts};

/// 一次性调用：创建客户端并对整批文本做指代消解
pub async fn resolve_coreferences<S: AsRef<str>>(
    texts: &[S],
    endpoint_id: Option<String>,
    api_key: Option<String>,
) -> ClientResult<Vec<CorefResult>> {
    let client = FastCorefClient::new(endpoint_id, api_key)?;
    client.predict_batch(texts, false).await
}
