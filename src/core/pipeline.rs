//! 单个 episode 的流水线
//!
//! 场景初始化 -> 初始帧 -> 注册表 -> 观察 -> 规划 -> 澄清 -> 展开 -> 执行 -> 失败反馈重规划（有上限）-> 落盘。
//! 所有外部调用按顺序 await；任何 Err 交给 EpisodeRunner 处理。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use crate::config::AppConfig;
use crate::core::error::EpisodeError;
use crate::core::scene::SceneSupervisor;
use crate::core::state::{EpisodeContext, EpisodePhase, TrajectoryRecord};
use crate::env::{Environment, SceneInitializer, SceneSpec};
use crate::llm::RetryingClient;
use crate::memory::{save_json, MemoryKind, MemoryLog};
use crate::perception::{NavigableRegistry, ObservationService};
use crate::planning::{
    AskContext, ClarificationManager, ExecutionController, ExecutionReport, HierarchicalPlanner,
    Operator, StepRecord, Subgoal, TrajectoryEvent,
};

/// 初始帧文件名
pub const INIT_FRAME: &str = "0_init_observe.png";

/// 流水线抽象：EpisodeRunner 只依赖该 trait，便于用桩实现测试重试包络
#[async_trait]
pub trait EpisodePipeline: Send + Sync {
    async fn run(&self, ctx: &EpisodeContext) -> Result<TrajectoryRecord, EpisodeError>;
}

/// 完整的轨迹生成流水线
pub struct TrajectoryPipeline {
    config: AppConfig,
    client: RetryingClient,
    scene: SceneSupervisor,
    operator: Arc<dyn Operator>,
    visibility_distance: f64,
}

impl TrajectoryPipeline {
    pub fn new(
        config: AppConfig,
        client: RetryingClient,
        initializer: Arc<dyn SceneInitializer>,
        operator: Arc<dyn Operator>,
        visibility_distance: f64,
    ) -> Self {
        let scene = SceneSupervisor::new(
            initializer,
            Duration::from_secs(config.scene.init_timeout_secs),
        );
        Self {
            config,
            client,
            scene,
            operator,
            visibility_distance,
        }
    }

    async fn drive(
        &self,
        ctx: &EpisodeContext,
        env: &mut dyn Environment,
    ) -> Result<TrajectoryRecord, EpisodeError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let task = &ctx.task;
        let mut events = Vec::new();
        let mut memory = MemoryLog::new();

        log_phase(ctx, EpisodePhase::Observing);
        let frame = ctx.workdir.join(INIT_FRAME);
        let saved = env.save_frame(&frame).await?;
        let mut registry = NavigableRegistry::new(self.config.scene.floor_type.clone());
        registry.initialize(&env.metadata().objects, env.metadata().agent.position);
        tracing::info!(navigable = registry.len(), "Navigable objects registered");

        let observer =
            ObservationService::new(self.client.clone(), self.config.prompts.observation.clone());
        let observation = observer
            .describe(saved.then_some(frame.as_path()), registry.types_present())
            .await;
        events.push(TrajectoryEvent::Observation {
            text: observation.clone(),
        });

        log_phase(ctx, EpisodePhase::Planning);
        let mut planner = HierarchicalPlanner::new(self.client.clone(), &self.config.prompts);
        let subgoals = planner.plan_subgoals(task, &observation, None).await;
        record_plan(&subgoals, &mut memory, &mut events);

        log_phase(ctx, EpisodePhase::Clarifying);
        let mut clarifier = ClarificationManager::new(
            self.client.clone(),
            &self.config.clarification,
            &self.config.prompts,
            self.operator.clone(),
        );
        let initial = AskContext {
            registry_empty: registry.is_empty(),
            initial: true,
            ..Default::default()
        };
        if let Some(c) = clarifier
            .clarify(&initial, task, planner.subgoals(), &mut memory)
            .await
        {
            events.push(TrajectoryEvent::Question {
                reason: c.reason,
                text: c.question.clone(),
            });
            if let Some(response) = c.response {
                events.push(TrajectoryEvent::Answer {
                    text: response.clone(),
                });
                let prior = planner.subgoals().to_vec();
                let decision = clarifier
                    .decide_replan(task, &prior, &memory, &response)
                    .await;
                events.push(TrajectoryEvent::ReplanDecision {
                    need_replan: decision.need_replan,
                    reason: decision.reason.clone(),
                });
                if decision.need_replan {
                    let revised = planner
                        .replan_from_user_response(task, &observation, &c.question, &response, &prior)
                        .await;
                    record_plan(&revised, &mut memory, &mut events);
                }
            }
        }

        log_phase(ctx, EpisodePhase::Expanding);
        let current = planner.subgoals().to_vec();
        let subtasks = planner.expand_all(&current, Some(&observation)).await;
        events.push(TrajectoryEvent::Expansion {
            subtasks: subtasks.iter().map(|s| s.decision.clone()).collect(),
        });

        log_phase(ctx, EpisodePhase::Executing);
        let reward_target = task.reward_target().or(self.config.execution.reward_target);
        let mut executor =
            ExecutionController::new(self.config.execution.navigation_actions.clone(), reward_target);
        let mut report = executor
            .execute(&subtasks, env, &mut registry, &mut events)
            .await?;
        let mut steps: Vec<StepRecord> = report.steps.clone();
        let mut failure_count = report.failures;
        let mut replans = 0;

        while !report.completed && replans < self.config.episode.max_replans {
            replans += 1;
            log_phase(ctx, EpisodePhase::Replanning);
            let current_state = describe_state(&report);
            let mut feedback = report
                .last_error
                .clone()
                .unwrap_or_else(|| "Task not completed".to_string());

            let failure_ctx = AskContext {
                failure_count,
                last_error: report.last_error.as_deref(),
                registry_empty: registry.is_empty(),
                current_state: &current_state,
                initial: false,
            };
            if let Some(c) = clarifier
                .clarify(&failure_ctx, task, planner.subgoals(), &mut memory)
                .await
            {
                events.push(TrajectoryEvent::Question {
                    reason: c.reason,
                    text: c.question,
                });
                if let Some(response) = c.response {
                    events.push(TrajectoryEvent::Answer {
                        text: response.clone(),
                    });
                    feedback = format!("{}\nOperator: {}", feedback, response);
                }
            }

            events.push(TrajectoryEvent::Replan {
                round: replans,
                feedback: feedback.clone(),
            });
            let revised = planner
                .replan_from_feedback(task, &current_state, &feedback, &observation)
                .await;
            if revised.is_empty() {
                tracing::warn!(round = replans, "Replan produced no subgoals, stopping");
                break;
            }
            record_plan(&revised, &mut memory, &mut events);

            let subtasks = planner.expand_all(&revised, Some(&observation)).await;
            events.push(TrajectoryEvent::Expansion {
                subtasks: subtasks.iter().map(|s| s.decision.clone()).collect(),
            });
            report = executor
                .execute(&subtasks, env, &mut registry, &mut events)
                .await?;
            steps.extend(report.steps.iter().cloned());
            failure_count += report.failures;
        }

        log_phase(ctx, EpisodePhase::Recording);
        let record = TrajectoryRecord {
            run_id: uuid::Uuid::new_v4().to_string(),
            task: task.clone(),
            scene: ctx.scene.clone(),
            attempt: ctx.attempt,
            observation,
            subgoals: planner.subgoals().to_vec(),
            steps,
            events,
            dialogue: memory.entries().to_vec(),
            diagnostics: planner.diagnostics(),
            reward: executor.reward(),
            replans,
            success: report.completed,
            started_at,
            elapsed_secs: clock.elapsed().as_secs_f64(),
        };
        let path = ctx.workdir.join(ctx.record_name());
        save_json(&path, &record).map_err(|e| EpisodeError::Record(e.to_string()))?;
        tracing::info!(
            path = %path.display(),
            success = record.success,
            reward = record.reward,
            "Trajectory recorded"
        );
        Ok(record)
    }
}

#[async_trait]
impl EpisodePipeline for TrajectoryPipeline {
    async fn run(&self, ctx: &EpisodeContext) -> Result<TrajectoryRecord, EpisodeError> {
        log_phase(ctx, EpisodePhase::Initializing);
        std::fs::create_dir_all(&ctx.workdir)?;
        let spec = SceneSpec {
            scene: ctx.scene.clone(),
            visibility_distance: self.visibility_distance,
        };
        let mut env = self.scene.start(&spec).await?;
        let result = self.drive(ctx, env.as_mut()).await;
        env.stop().await;
        result
    }
}

fn log_phase(ctx: &EpisodeContext, phase: EpisodePhase) {
    tracing::debug!(task = %ctx.task.name, attempt = ctx.attempt, ?phase, "Episode phase");
}

fn record_plan(subgoals: &[Subgoal], memory: &mut MemoryLog, events: &mut Vec<TrajectoryEvent>) {
    if subgoals.is_empty() {
        return;
    }
    memory.append(MemoryKind::Planning, subgoals.join("; "));
    events.push(TrajectoryEvent::Plan {
        subgoals: subgoals.to_vec(),
    });
}

/// 失败后的状态描述，写入重规划 prompt
fn describe_state(report: &ExecutionReport) -> String {
    let failed: Vec<&str> = report
        .steps
        .iter()
        .filter(|s| !s.success)
        .map(|s| s.decision.as_str())
        .collect();
    if failed.is_empty() {
        format!(
            "Executed {} steps, task not yet complete",
            report.steps.len()
        )
    } else {
        format!("Failed to execute: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::Action;
    use crate::planning::Subtask;

    #[test]
    fn test_describe_state_lists_failed_decisions() {
        let mut report = ExecutionReport::default();
        report.steps.push(StepRecord {
            decision: Subtask::new(Action::Open, "Fridge").decision,
            action: "OpenObject".into(),
            object_id: "Fridge|1".into(),
            success: false,
            error_message: "Fridge|1 is not openable".into(),
        });
        assert_eq!(describe_state(&report), "Failed to execute: open Fridge");
        assert_eq!(
            describe_state(&ExecutionReport::default()),
            "Executed 0 steps, task not yet complete"
        );
    }
}
