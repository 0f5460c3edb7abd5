//! 分层规划器：任务 -> 子目标 -> 子任务
//!
//! 每次规划 / 重规划都是一次推理调用，回复中的 `<SubgoalN>` / `<SubtaskN>` 段按文档顺序提取。
//! 解析为空时保留上一版子目标（推理失败的哨兵文本也走这条路）；不在词表内的动作被丢弃并计数。

use serde::Serialize;

use crate::config::{PromptTemplate, PromptsSection};
use crate::llm::{InferenceRequest, RetryingClient};
use crate::memory::MemoryLog;
use crate::planning::tags::extract_tagged;
use crate::planning::types::{Action, Subgoal, Subtask, Task};

/// 解析诊断计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanDiagnostics {
    /// 因动作不在词表内或缺少目标类别被丢弃的子任务数
    pub dropped_subtasks: usize,
    /// 子目标解析结果为空的次数
    pub empty_parses: usize,
}

/// 分层规划器：持有推理客户端、提示模板与当前子目标列表
pub struct HierarchicalPlanner {
    client: RetryingClient,
    task_planning: PromptTemplate,
    subtask_expansion: PromptTemplate,
    replan_task: PromptTemplate,
    replan_from_response: PromptTemplate,
    subgoals: Vec<Subgoal>,
    diagnostics: PlanDiagnostics,
}

impl HierarchicalPlanner {
    pub fn new(client: RetryingClient, prompts: &PromptsSection) -> Self {
        Self {
            client,
            task_planning: prompts.task_planning.clone(),
            subtask_expansion: prompts.subtask_expansion.clone(),
            replan_task: prompts.replan_task.clone(),
            replan_from_response: prompts.replan_from_response.clone(),
            subgoals: Vec::new(),
            diagnostics: PlanDiagnostics::default(),
        }
    }

    /// 当前子目标（最近一次非空解析的结果）
    pub fn subgoals(&self) -> &[Subgoal] {
        &self.subgoals
    }

    pub fn diagnostics(&self) -> PlanDiagnostics {
        self.diagnostics
    }

    /// 初始规划：任务 + 场景描述（+ 已有对话）-> 子目标
    pub async fn plan_subgoals(
        &mut self,
        task: &Task,
        scene_description: &str,
        prior_memory: Option<&MemoryLog>,
    ) -> Vec<Subgoal> {
        let memory = prior_memory
            .filter(|m| !m.is_empty())
            .map(|m| format!("Dialogue so far:\n{}", m.to_prompt_section()))
            .unwrap_or_default();
        let (system, user) = self.task_planning.render(&[
            ("taskname", &task.name),
            ("environment_description", scene_description),
            ("memory", &memory),
        ]);
        let response = self.client.request(&InferenceRequest::new(system, user)).await;
        tracing::info!(task = %task.name, response = %response, "Task planning response");
        self.accept_subgoals(&response)
    }

    /// 将一个子目标展开为子任务
    pub async fn expand_subgoal(&mut self, subgoal: &str, context: Option<&str>) -> Vec<Subtask> {
        let vocabulary = Action::vocabulary();
        let (system, user) = self.subtask_expansion.render(&[
            ("subgoal", subgoal),
            ("context", context.unwrap_or("")),
            ("actions", &vocabulary),
        ]);
        let response = self.client.request(&InferenceRequest::new(system, user)).await;

        let mut subtasks = Vec::new();
        for segment in extract_tagged(&response, "Subtask") {
            match Subtask::parse(&segment) {
                Ok(subtask) => subtasks.push(subtask),
                Err(e) => {
                    self.diagnostics.dropped_subtasks += 1;
                    tracing::warn!(subgoal, segment = %segment, error = %e, "Subtask dropped");
                }
            }
        }
        tracing::info!(subgoal, count = subtasks.len(), "Subgoal expanded");
        subtasks
    }

    /// 依次展开所有子目标并按顺序拼接
    pub async fn expand_all(&mut self, subgoals: &[Subgoal], context: Option<&str>) -> Vec<Subtask> {
        let mut all = Vec::new();
        for subgoal in subgoals {
            all.extend(self.expand_subgoal(subgoal, context).await);
        }
        all
    }

    /// 基于执行状态与反馈重规划
    pub async fn replan_from_feedback(
        &mut self,
        task: &Task,
        current_state: &str,
        feedback: &str,
        scene_description: &str,
    ) -> Vec<Subgoal> {
        let (system, user) = self.replan_task.render(&[
            ("taskname", &task.name),
            ("current_state", current_state),
            ("feedback", feedback),
            ("environment_description", scene_description),
        ]);
        let response = self.client.request(&InferenceRequest::new(system, user)).await;
        tracing::info!(task = %task.name, response = %response, "Replan from feedback");
        self.accept_subgoals(&response)
    }

    /// 基于操作员回答重规划
    pub async fn replan_from_user_response(
        &mut self,
        task: &Task,
        observation: &str,
        last_question: &str,
        response: &str,
        prior_subgoals: &[Subgoal],
    ) -> Vec<Subgoal> {
        let prior = numbered(prior_subgoals);
        let (system, user) = self.replan_from_response.render(&[
            ("taskname", &task.name),
            ("observation", observation),
            ("prior_subgoals", &prior),
            ("question", last_question),
            ("response", response),
        ]);
        let reply = self.client.request(&InferenceRequest::new(system, user)).await;
        tracing::info!(task = %task.name, response = %reply, "Replan from operator response");
        self.accept_subgoals(&reply)
    }

    fn accept_subgoals(&mut self, response: &str) -> Vec<Subgoal> {
        let parsed = extract_tagged(response, "Subgoal");
        if parsed.is_empty() {
            self.diagnostics.empty_parses += 1;
            tracing::warn!(
                kept = self.subgoals.len(),
                "No subgoals parsed, keeping previous plan"
            );
        } else {
            self.subgoals = parsed.clone();
        }
        parsed
    }
}

/// "1. a\n2. b"
pub fn numbered(items: &[Subgoal]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::llm::{MockInferenceClient, RetryConfig, FAILED_COMPLETION};
    use crate::memory::MemoryKind;

    fn planner(mock: &Arc<MockInferenceClient>) -> HierarchicalPlanner {
        let client = RetryingClient::new(
            mock.clone(),
            RetryConfig {
                limit: 1,
                delay: Duration::ZERO,
            },
        );
        HierarchicalPlanner::new(client, &PromptsSection::default())
    }

    fn task() -> Task {
        Task::new("put the apple in the fridge", "pickup_and_put")
    }

    #[tokio::test]
    async fn test_plan_subgoals_parses_and_stores() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response("<Subgoal1>find apple</Subgoal1><Subgoal2>put in fridge</Subgoal2>");
        let mut p = planner(&mock);

        let subgoals = p.plan_subgoals(&task(), "a kitchen", None).await;

        assert_eq!(subgoals, vec!["find apple", "put in fridge"]);
        assert_eq!(p.subgoals(), subgoals.as_slice());
        let req = &mock.requests()[0];
        assert!(req.user_prompt.contains("put the apple in the fridge"));
        assert!(req.user_prompt.contains("a kitchen"));
    }

    #[tokio::test]
    async fn test_plan_prompt_includes_dialogue_when_present() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response("<Subgoal1>x</Subgoal1>");
        let mut p = planner(&mock);
        let mut memory = MemoryLog::new();
        memory.append(MemoryKind::Answer, "the apple is on the table");

        p.plan_subgoals(&task(), "kitchen", Some(&memory)).await;

        assert!(mock.requests()[0]
            .user_prompt
            .contains("User Response: the apple is on the table"));
    }

    #[tokio::test]
    async fn test_empty_parse_keeps_previous_subgoals() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response("<Subgoal1>find apple</Subgoal1>");
        mock.push_response("I am not sure what to do.");
        mock.push_response(FAILED_COMPLETION);
        let mut p = planner(&mock);

        p.plan_subgoals(&task(), "kitchen", None).await;
        let replanned = p
            .replan_from_feedback(&task(), "stuck", "apple missing", "kitchen")
            .await;
        assert!(replanned.is_empty());
        let again = p
            .replan_from_user_response(&task(), "kitchen", "where?", "table", &["find apple".to_string()])
            .await;
        assert!(again.is_empty());

        assert_eq!(p.subgoals(), ["find apple".to_string()]);
        assert_eq!(p.diagnostics().empty_parses, 2);
    }

    #[tokio::test]
    async fn test_replan_replaces_wholesale() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response("<Subgoal1>a</Subgoal1><Subgoal2>b</Subgoal2>");
        mock.push_response("<Subgoal1>c</Subgoal1>");
        let mut p = planner(&mock);

        p.plan_subgoals(&task(), "kitchen", None).await;
        p.replan_from_user_response(&task(), "kitchen", "q", "r", &["a".into(), "b".into()])
            .await;

        assert_eq!(p.subgoals(), ["c".to_string()]);
        assert!(mock.requests()[1].user_prompt.contains("1. a\n2. b"));
    }

    #[tokio::test]
    async fn test_expand_drops_unsupported_actions() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response(
            "<Subtask1>search Apple</Subtask1><Subtask2>fly Drone</Subtask2><Subtask3>pick_up Apple</Subtask3>",
        );
        let mut p = planner(&mock);

        let subtasks = p.expand_subgoal("find apple", None).await;

        let decisions: Vec<&str> = subtasks.iter().map(|s| s.decision.as_str()).collect();
        assert_eq!(decisions, vec!["search Apple", "pick_up Apple"]);
        assert_eq!(p.diagnostics().dropped_subtasks, 1);
    }

    #[tokio::test]
    async fn test_expand_drops_subtasks_without_target() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response("<Subtask1>open</Subtask1><Subtask2>open Fridge</Subtask2>");
        let mut p = planner(&mock);

        let subtasks = p.expand_subgoal("open the fridge", None).await;

        assert_eq!(subtasks, vec![Subtask::new(Action::Open, "Fridge")]);
        assert_eq!(p.diagnostics().dropped_subtasks, 1);
    }

    #[tokio::test]
    async fn test_expand_all_keeps_subgoal_order() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_response("<Subtask1>search Apple</Subtask1>");
        mock.push_response("<Subtask1>open Fridge</Subtask1><Subtask2>put Fridge</Subtask2>");
        let mut p = planner(&mock);

        let subtasks = p
            .expand_all(&["find apple".into(), "store apple".into()], Some("kitchen"))
            .await;

        let actions: Vec<Action> = subtasks.iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![Action::Search, Action::Open, Action::Put]);
    }
}
