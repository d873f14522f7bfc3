//! FastCoref 无服务器推理 worker
//!
//! 接收文本批次，调用 LingMessCoref 指代消解模型，返回带字符偏移的指代簇。

pub mod alignment;
pub mod config;
pub mod error;
pub mod handler;
pub mod http_server;
pub mod job;
pub mod logging_config;
pub mod model;
pub mod runtime;

// 重新导出主要类型
pub use alignment::{CharSpan, TokenSpan};
pub use config::Config;
pub use error::{HandlerError, RuntimeError};
pub use handler::{CorefHandler, CorefOutput, CorefRequest, HandlerOutput};
pub use job::{Job, JobOutcome, JobStatus};
pub use model::{CorefModel, CorefPrediction, ModelError, ModelLoader};
pub use runtime::WorkerRuntime;
