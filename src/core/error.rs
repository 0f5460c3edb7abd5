//! Episode 错误类型
//!
//! 流水线中任何一步返回的 EpisodeError 都由 EpisodeRunner 接住：清理工作目录后整体重跑，不再向外传播。

use thiserror::Error;

use crate::env::EnvError;

#[derive(Error, Debug)]
pub enum EpisodeError {
    #[error("Scene initialization failed: {0}")]
    SceneInit(String),

    #[error("Scene initializer task aborted: {0}")]
    InitJoin(String),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record write failed: {0}")]
    Record(String),
}
