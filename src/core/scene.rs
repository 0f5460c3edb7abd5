//! 场景初始化监管：限时启动仿真场景
//!
//! 初始化在独立任务中运行并受 `tokio::time::timeout` 约束；超时后通过 CancellationToken 通知并 abort 该任务，
//! 再不限时地重新初始化一次。忽略取消的初始化器会继续跑到其阻塞段结束，这里只记 warn。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::error::EpisodeError;
use crate::env::{Environment, SceneInitializer, SceneSpec};

pub struct SceneSupervisor {
    initializer: Arc<dyn SceneInitializer>,
    timeout: Duration,
}

impl SceneSupervisor {
    pub fn new(initializer: Arc<dyn SceneInitializer>, timeout: Duration) -> Self {
        Self {
            initializer,
            timeout,
        }
    }

    /// 限时初始化；超时则取消后阻塞式重试一次
    pub async fn start(&self, spec: &SceneSpec) -> Result<Box<dyn Environment>, EpisodeError> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let initializer = self.initializer.clone();
        let first_spec = spec.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                res = initializer.initialize(&first_spec) => Some(res),
                _ = token.cancelled() => None,
            }
        });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Some(res))) => return res.map_err(|e| EpisodeError::SceneInit(e.to_string())),
            Ok(Ok(None)) => {
                return Err(EpisodeError::SceneInit("initialization cancelled".into()));
            }
            Ok(Err(join)) => return Err(EpisodeError::InitJoin(join.to_string())),
            Err(_) => {
                cancel.cancel();
                abort.abort();
                tracing::warn!(
                    scene = %spec.scene,
                    timeout_secs = self.timeout.as_secs(),
                    "Scene initialization timed out, retrying without timeout"
                );
            }
        }

        self.initializer
            .initialize(spec)
            .await
            .map_err(|e| EpisodeError::SceneInit(e.to_string()))
    }
}
