//! 批处理：读取任务文件，逐个任务跑 episode
//!
//! 每个任务的工作目录为 `{data_root}/data_{kind}/{scene}_{kind}_{index}`；单个任务失败不会中断批处理。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use crate::config::AppConfig;
use crate::core::{EpisodeContext, EpisodeOutcome, EpisodePipeline, EpisodeRunner, TrajectoryPipeline};
use crate::env::{load_scene_metadata, ReplayInitializer};
use crate::llm::create_client_from_config;
use crate::memory::FailureLog;
use crate::planning::{load_tasks, Operator, SilentOperator, StdinOperator, Task};

/// 批处理汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// 流水线跑通并写出轨迹记录
    pub recorded: usize,
    /// 其中任务完成
    pub succeeded: usize,
    /// 重试耗尽，写入失败列表
    pub failed: usize,
}

pub struct BatchDriver {
    config: AppConfig,
    runner: EpisodeRunner,
}

impl BatchDriver {
    pub fn new(config: AppConfig, pipeline: Arc<dyn EpisodePipeline>) -> Self {
        let runner = EpisodeRunner::new(
            pipeline,
            config.episode.max_attempts,
            FailureLog::new(&config.batch.failure_log),
        );
        Self { config, runner }
    }

    /// 任务工作目录
    pub fn workdir(&self, task: &Task, index: usize) -> PathBuf {
        let kind = self.kind_of(task);
        self.config
            .batch
            .data_root
            .join(format!("data_{}", kind))
            .join(format!("{}_{}_{}", self.config.batch.scene, kind, index))
    }

    fn kind_of<'a>(&'a self, task: &'a Task) -> &'a str {
        if task.kind.is_empty() {
            &self.config.batch.task_type
        } else {
            &task.kind
        }
    }

    pub async fn run(&self, tasks: Vec<Task>) -> BatchSummary {
        let mut summary = BatchSummary {
            total: tasks.len(),
            ..Default::default()
        };

        for (index, mut task) in tasks.into_iter().enumerate() {
            tracing::info!(index, total = summary.total, task = %task.name, "Processing task");
            let workdir = self.workdir(&task, index);
            if task.kind.is_empty() {
                task.kind = self.config.batch.task_type.clone();
            }
            let ctx = EpisodeContext {
                task,
                scene: self.config.batch.scene.clone(),
                index,
                workdir,
                attempt: 0,
            };
            match self.runner.run(ctx).await {
                outcome @ EpisodeOutcome::Recorded { .. } => {
                    summary.recorded += 1;
                    if outcome.succeeded() {
                        summary.succeeded += 1;
                    }
                }
                EpisodeOutcome::Failed { last_error, .. } => {
                    tracing::warn!(index, error = %last_error, "Task skipped after retries");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            total = summary.total,
            recorded = summary.recorded,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch finished"
        );
        summary
    }
}

/// 按配置组装完整流水线（回放环境 + 推理客户端 + 操作员）并跑完整个任务文件
pub async fn run_batch(config: AppConfig) -> anyhow::Result<BatchSummary> {
    let tasks_path = config.batch.resolved_tasks_path();
    let metadata_path = config.batch.resolved_metadata_path();

    let tasks = load_tasks(&tasks_path)
        .with_context(|| format!("Failed to load tasks from {}", tasks_path.display()))?;
    let metadata = load_scene_metadata(&metadata_path)
        .with_context(|| format!("Failed to load scene metadata from {}", metadata_path.display()))?;
    let visibility_distance = metadata.scene_diagonal();
    tracing::info!(
        scene = %config.batch.scene,
        tasks = tasks.len(),
        visibility_distance,
        "Batch loaded"
    );

    let client = create_client_from_config(&config);
    let operator: Arc<dyn Operator> = if config.clarification.interactive {
        Arc::new(StdinOperator)
    } else {
        Arc::new(SilentOperator)
    };
    let pipeline = TrajectoryPipeline::new(
        config.clone(),
        client,
        Arc::new(ReplayInitializer::new(metadata_path)),
        operator,
        visibility_distance,
    );

    let driver = BatchDriver::new(config, Arc::new(pipeline));
    Ok(driver.run(tasks).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_layout() {
        let mut config = AppConfig::default();
        config.batch.data_root = PathBuf::from("out");
        config.batch.scene = "FloorPlan2".into();
        let pipeline = Arc::new(TrajectoryPipeline::new(
            config.clone(),
            create_client_from_config(&AppConfig {
                llm: crate::config::LlmSection {
                    provider: "mock".into(),
                    ..Default::default()
                },
                ..Default::default()
            }),
            Arc::new(ReplayInitializer::new("missing.json")),
            Arc::new(SilentOperator),
            0.0,
        ));
        let driver = BatchDriver::new(config, pipeline);

        let task = Task::new("open the fridge", "open");
        assert_eq!(
            driver.workdir(&task, 3),
            PathBuf::from("out/data_open/FloorPlan2_open_3")
        );
        let untyped = Task::new("open the fridge", "");
        assert_eq!(
            driver.workdir(&untyped, 0),
            PathBuf::from("out/data_pickup_and_put/FloorPlan2_pickup_and_put_0")
        );
    }
}
