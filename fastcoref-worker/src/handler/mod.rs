//! 指代消解处理器

mod process;
mod service;
mod types;

pub use service::CorefHandler;
pub use types::{ClusterLogit, CorefOutput, CorefRequest, HandlerOutput};
