//! Episode 重试包络
//!
//! 流水线返回 Err 时清空工作目录并从头重跑，至多 max_attempts 次；全部失败后把工作目录路径追加到失败列表。
//! 每次尝试在独立任务中运行，流水线 panic 按失败处理；错误不会越过这里，批处理继续下一个任务。

use std::sync::Arc;

use crate::core::pipeline::EpisodePipeline;
use crate::core::state::{EpisodeAttempt, EpisodeContext, TrajectoryRecord};
use crate::memory::{clear_folder, FailureLog};

/// 一个任务的最终结果
#[derive(Debug)]
pub enum EpisodeOutcome {
    Recorded {
        record: Box<TrajectoryRecord>,
        attempts: Vec<EpisodeAttempt>,
    },
    Failed {
        attempts: Vec<EpisodeAttempt>,
        last_error: String,
    },
}

impl EpisodeOutcome {
    pub fn attempts(&self) -> &[EpisodeAttempt] {
        match self {
            EpisodeOutcome::Recorded { attempts, .. } | EpisodeOutcome::Failed { attempts, .. } => {
                attempts
            }
        }
    }

    /// 流水线跑通且任务完成
    pub fn succeeded(&self) -> bool {
        matches!(self, EpisodeOutcome::Recorded { record, .. } if record.success)
    }
}

pub struct EpisodeRunner {
    pipeline: Arc<dyn EpisodePipeline>,
    max_attempts: u32,
    failure_log: FailureLog,
}

impl EpisodeRunner {
    pub fn new(pipeline: Arc<dyn EpisodePipeline>, max_attempts: u32, failure_log: FailureLog) -> Self {
        Self {
            pipeline,
            max_attempts: max_attempts.max(1),
            failure_log,
        }
    }

    pub async fn run(&self, mut ctx: EpisodeContext) -> EpisodeOutcome {
        let mut attempts = Vec::new();
        let mut last_error = String::new();
        let workdir = ctx.workdir.display().to_string();

        for attempt in 1..=self.max_attempts {
            ctx.attempt = attempt;
            tracing::info!(task = %ctx.task.name, attempt, max = self.max_attempts, "Episode attempt");

            let pipeline = self.pipeline.clone();
            let attempt_ctx = ctx.clone();
            let result = match tokio::spawn(async move { pipeline.run(&attempt_ctx).await }).await
            {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_err) if join_err.is_panic() => Err("episode pipeline panicked".to_string()),
                Err(join_err) => Err(format!("episode pipeline cancelled: {}", join_err)),
            };

            match result {
                Ok(record) => {
                    attempts.push(EpisodeAttempt {
                        attempt_index: attempt,
                        error_path: None,
                    });
                    return EpisodeOutcome::Recorded {
                        record: Box::new(record),
                        attempts,
                    };
                }
                Err(e) => {
                    tracing::error!(task = %ctx.task.name, attempt, error = %e, "Episode failed");
                    last_error = e;
                    attempts.push(EpisodeAttempt {
                        attempt_index: attempt,
                        error_path: Some(workdir.clone()),
                    });
                    if let Err(io) = clear_folder(&ctx.workdir) {
                        tracing::warn!(path = %workdir, error = %io, "Failed to clear episode folder");
                    }
                }
            }
        }

        if let Err(e) = self.failure_log.append(&workdir) {
            tracing::error!(path = %self.failure_log.path().display(), error = %e, "Failed to update failure list");
        }
        EpisodeOutcome::Failed {
            attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::core::error::EpisodeError;
    use crate::planning::Task;

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EpisodePipeline for AlwaysFails {
        async fn run(&self, ctx: &EpisodeContext) -> Result<TrajectoryRecord, EpisodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(&ctx.workdir)?;
            std::fs::write(ctx.workdir.join("partial.json"), b"{}")?;
            Err(EpisodeError::SceneInit("simulator crashed".into()))
        }
    }

    struct Panics {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EpisodePipeline for Panics {
        async fn run(&self, _ctx: &EpisodeContext) -> Result<TrajectoryRecord, EpisodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("simulator bridge returned malformed frame");
        }
    }

    fn context(dir: &TempDir) -> EpisodeContext {
        EpisodeContext {
            task: Task::new("open the fridge", "open"),
            scene: "FloorPlan1".into(),
            index: 0,
            workdir: dir.path().join("data_open/FloorPlan1_open_0"),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn test_exhausted_attempts_append_failure_once() {
        let dir = TempDir::new().unwrap();
        let pipeline = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let log = FailureLog::new(dir.path().join("failures.json"));
        let runner = EpisodeRunner::new(pipeline.clone(), 2, log.clone());
        let ctx = context(&dir);

        let outcome = runner.run(ctx.clone()).await;

        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.attempts().len(), 2);
        assert!(!outcome.succeeded());
        assert_eq!(
            log.load(),
            vec![serde_json::json!(ctx.workdir.display().to_string())]
        );
        // 每次失败后工作目录被清空
        assert_eq!(std::fs::read_dir(&ctx.workdir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let dir = TempDir::new().unwrap();
        let pipeline = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let runner = EpisodeRunner::new(
            pipeline.clone(),
            0,
            FailureLog::new(dir.path().join("failures.json")),
        );

        runner.run(context(&dir)).await;

        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_pipeline_counts_as_failed_attempt() {
        let dir = TempDir::new().unwrap();
        let pipeline = Arc::new(Panics {
            calls: AtomicU32::new(0),
        });
        let log = FailureLog::new(dir.path().join("failures.json"));
        let runner = EpisodeRunner::new(pipeline.clone(), 2, log.clone());

        let outcome = runner.run(context(&dir)).await;

        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 2);
        match &outcome {
            EpisodeOutcome::Failed { attempts, last_error } => {
                assert_eq!(attempts.len(), 2);
                assert!(last_error.contains("panicked"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(log.load().len(), 1);
    }
}
