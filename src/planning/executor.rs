//! 执行控制器：把子任务逐个落到环境动作上
//!
//! 导航类子任务（同义词集合可配置）解析到注册表中该类别的第一个条目，找不到就跳过；
//! 交互类子任务先查注册表，再查最新元数据中第一个可见的同类物体，找不到记为一次失败。
//! 每次 step 之后用返回的元数据更新注册表，成功一步奖励加 1；每个子任务后做一次完成判定。

use std::collections::HashSet;

use serde::Serialize;

use crate::env::{EnvAction, EnvError, Environment};
use crate::perception::NavigableRegistry;
use crate::planning::events::TrajectoryEvent;
use crate::planning::types::Subtask;

/// 一次已执行（或尝试执行）的子任务
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub decision: String,
    pub action: String,
    pub object_id: String,
    pub success: bool,
    pub error_message: String,
}

/// 一轮执行的汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub completed: bool,
    pub steps: Vec<StepRecord>,
    /// episode 内累计奖励
    pub reward: u32,
    pub failures: u32,
    pub last_error: Option<String>,
}

pub struct ExecutionController {
    navigation_actions: HashSet<String>,
    reward_target: Option<u32>,
    reward: u32,
}

impl ExecutionController {
    pub fn new<I, S>(navigation_actions: I, reward_target: Option<u32>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            navigation_actions: navigation_actions.into_iter().map(Into::into).collect(),
            reward_target,
            reward: 0,
        }
    }

    pub fn reward(&self) -> u32 {
        self.reward
    }

    /// 完成判定：环境显式成功标志，或累计奖励达到目标
    pub fn verify_completed(&self, env: &dyn Environment) -> bool {
        env.task_success() == Some(true) || self.reward_target.is_some_and(|t| self.reward >= t)
    }

    fn is_navigation(&self, subtask: &Subtask) -> bool {
        self.navigation_actions.contains(subtask.action.as_str())
    }

    /// 顺序执行子任务；环境 step 本身出错时中止并向上返回
    pub async fn execute(
        &mut self,
        subtasks: &[Subtask],
        env: &mut dyn Environment,
        registry: &mut NavigableRegistry,
        events: &mut Vec<TrajectoryEvent>,
    ) -> Result<ExecutionReport, EnvError> {
        let mut report = ExecutionReport::default();

        for subtask in subtasks {
            let navigation = self.is_navigation(subtask);
            // 导航同义词一律落到 NavigateTo，不论动词本身映射到什么
            let env_action = if navigation {
                "NavigateTo"
            } else {
                subtask.action.env_action()
            };
            let target = if navigation {
                registry.first_of_type(&subtask.target_type).map(|o| o.id.clone())
            } else {
                registry
                    .first_of_type(&subtask.target_type)
                    .map(|o| o.id.clone())
                    .or_else(|| {
                        env.metadata()
                            .first_visible_of_type(&subtask.target_type)
                            .map(|o| o.object_id.clone())
                    })
            };

            let Some(object_id) = target else {
                let reason = format!("Cannot find {}", subtask.target_type);
                if navigation {
                    tracing::warn!(decision = %subtask.decision, "Navigation target not found, skipping");
                    events.push(TrajectoryEvent::Skipped {
                        decision: subtask.decision.clone(),
                        reason,
                    });
                } else {
                    tracing::warn!(decision = %subtask.decision, "Interaction target not found");
                    report.failures += 1;
                    report.last_error = Some(reason.clone());
                    report.steps.push(StepRecord {
                        decision: subtask.decision.clone(),
                        action: env_action.to_string(),
                        object_id: String::new(),
                        success: false,
                        error_message: reason,
                    });
                }
                continue;
            };

            if navigation {
                registry.mark_selected(&object_id);
            }
            let action = EnvAction::new(env_action).with_object(&object_id);
            let result = env.step(action).await?;
            registry.update(&result.metadata.objects, result.metadata.agent.position);

            if result.success {
                self.reward += 1;
            } else {
                report.failures += 1;
                report.last_error = Some(result.error_message.clone());
            }
            tracing::info!(
                decision = %subtask.decision,
                object_id = %object_id,
                success = result.success,
                reward = self.reward,
                "Step executed"
            );
            events.push(TrajectoryEvent::Step {
                decision: subtask.decision.clone(),
                action: env_action.to_string(),
                object_id: object_id.clone(),
                success: result.success,
                error: result.error_message.clone(),
            });
            report.steps.push(StepRecord {
                decision: subtask.decision.clone(),
                action: env_action.to_string(),
                object_id,
                success: result.success,
                error_message: result.error_message,
            });

            if self.verify_completed(&*env) {
                report.completed = true;
                events.push(TrajectoryEvent::Completed {
                    reward: self.reward,
                });
                break;
            }
        }

        // 没有奖励目标时，全部子任务无失败执行完即视为完成
        if !report.completed
            && self.reward_target.is_none()
            && !report.steps.is_empty()
            && report.failures == 0
        {
            report.completed = true;
            events.push(TrajectoryEvent::Completed {
                reward: self.reward,
            });
        }

        report.reward = self.reward;
        Ok(report)
    }
}
