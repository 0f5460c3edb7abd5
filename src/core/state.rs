//! Episode 状态：阶段、尝试记录、轨迹记录

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::MemoryEntry;
use crate::planning::{PlanDiagnostics, StepRecord, Task, TrajectoryEvent};

/// 流水线阶段（日志用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EpisodePhase {
    Initializing,
    Observing,
    Planning,
    Clarifying,
    Expanding,
    Executing,
    Replanning,
    Recording,
}

/// 一个任务的运行上下文，由批处理构建并交给 EpisodeRunner
#[derive(Clone, Debug)]
pub struct EpisodeContext {
    pub task: Task,
    pub scene: String,
    pub index: usize,
    /// 工作目录：{data_root}/data_{kind}/{scene}_{kind}_{index}
    pub workdir: PathBuf,
    /// 从 1 开始
    pub attempt: u32,
}

impl EpisodeContext {
    /// 轨迹记录文件名：{scene}_{kind}_{index}.json
    pub fn record_name(&self) -> String {
        format!("{}_{}_{}.json", self.scene, self.task.kind, self.index)
    }
}

/// 一次尝试
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpisodeAttempt {
    pub attempt_index: u32,
    /// 失败时为工作目录路径
    pub error_path: Option<String>,
}

/// episode 完成后写入工作目录的 JSON
#[derive(Clone, Debug, Serialize)]
pub struct TrajectoryRecord {
    pub run_id: String,
    pub task: Task,
    pub scene: String,
    pub attempt: u32,
    pub observation: String,
    pub subgoals: Vec<String>,
    pub steps: Vec<StepRecord>,
    pub events: Vec<TrajectoryEvent>,
    pub dialogue: Vec<MemoryEntry>,
    pub diagnostics: PlanDiagnostics,
    pub reward: u32,
    pub replans: u32,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}
