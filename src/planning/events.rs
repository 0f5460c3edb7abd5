//! 轨迹事件：episode 内按时间顺序记录的过程事件，随轨迹记录一起落盘

use serde::Serialize;

use crate::planning::clarification::AskReason;

/// 单个过程事件（序列化为带 type 字段的 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrajectoryEvent {
    /// 场景观察描述
    Observation { text: String },
    /// 新的子目标列表（初始规划或重规划）
    Plan { subgoals: Vec<String> },
    /// 向操作员提问
    Question { reason: AskReason, text: String },
    /// 操作员回答
    Answer { text: String },
    /// 重规划决策
    ReplanDecision { need_replan: bool, reason: String },
    /// 子目标展开结果
    Expansion { subtasks: Vec<String> },
    /// 一次环境动作
    Step {
        decision: String,
        action: String,
        object_id: String,
        success: bool,
        error: String,
    },
    /// 无法解析目标而跳过的子任务
    Skipped { decision: String, reason: String },
    /// 执行失败后的反馈重规划
    Replan { round: u32, feedback: String },
    /// 完成判定通过
    Completed { reward: u32 },
}
