//! 澄清管理：何时向操作员提问、问什么、回答后是否需要重规划
//!
//! 提问策略按顺序匹配，命中第一条即返回：
//! 1. 失败次数达到阈值
//! 2. 最近错误信息包含错误指示词（不区分大小写）
//! 3. 可导航注册表为空
//! 4. 当前状态包含歧义关键词
//! 5. 首次规划后的无条件检查：就计划本身提一个问题
//!
//! 操作员通过 [`Operator`] 接入；非交互运行时永远没有回答，也就不会触发重规划。

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{render_template, ClarificationSection, PromptTemplate, PromptsSection};
use crate::llm::{InferenceRequest, RetryingClient};
use crate::memory::{DialogueExchange, MemoryKind, MemoryLog};
use crate::planning::planner::numbered;
use crate::planning::tags::extract_single;
use crate::planning::types::{Subgoal, Task};

/// 提问原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskReason {
    TooManyFailures,
    ErrorOccurred,
    NoNavigableObjects,
    AmbiguousSituation,
    PlanReview,
}

/// 提问策略的输入
#[derive(Debug, Clone, Default)]
pub struct AskContext<'a> {
    pub failure_count: u32,
    pub last_error: Option<&'a str>,
    pub registry_empty: bool,
    pub current_state: &'a str,
    /// 首次规划后的无条件检查
    pub initial: bool,
}

/// 重规划决策
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplanDecision {
    pub need_replan: bool,
    pub reason: String,
}

/// 操作员：提出问题，拿到回答（或没有回答）
#[async_trait]
pub trait Operator: Send + Sync {
    async fn ask(&self, question: &str) -> Option<String>;
}

/// 从标准输入读取一行作为回答；空行视为未回答
pub struct StdinOperator;

#[async_trait]
impl Operator for StdinOperator {
    async fn ask(&self, question: &str) -> Option<String> {
        let question = question.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = writeln!(stdout, "Robot asks: {}", question);
            let _ = write!(stdout, "> ");
            let _ = stdout.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).ok()?;
            Some(line.trim().to_string())
        })
        .await
        .ok()
        .flatten()?;
        (!answer.is_empty()).then_some(answer)
    }
}

/// 非交互：从不回答
pub struct SilentOperator;

#[async_trait]
impl Operator for SilentOperator {
    async fn ask(&self, question: &str) -> Option<String> {
        tracing::info!(question, "Question logged, no operator attached");
        None
    }
}

/// 脚本化操作员：按顺序返回预置回答，并记录收到的问题
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| Some(a.into())).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn ask(&self, question: &str) -> Option<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        self.answers.lock().ok().and_then(|mut a| a.pop_front()).flatten()
    }
}

/// 一轮澄清的结果：问题与回答（操作员可能没有回答）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clarification {
    pub reason: AskReason,
    pub question: String,
    pub response: Option<String>,
}

/// 澄清管理器
pub struct ClarificationManager {
    client: RetryingClient,
    config: ClarificationSection,
    plan_review: PromptTemplate,
    replan_decision: PromptTemplate,
    operator: Arc<dyn Operator>,
    pending: Option<DialogueExchange>,
}

impl ClarificationManager {
    pub fn new(
        client: RetryingClient,
        config: &ClarificationSection,
        prompts: &PromptsSection,
        operator: Arc<dyn Operator>,
    ) -> Self {
        Self {
            client,
            config: config.clone(),
            plan_review: prompts.plan_review.clone(),
            replan_decision: prompts.replan_decision.clone(),
            operator,
            pending: None,
        }
    }

    /// 最近一次交互（可能仍待回答）
    pub fn last_exchange(&self) -> Option<&DialogueExchange> {
        self.pending.as_ref()
    }

    /// 提问策略，第一条命中即返回
    pub fn should_ask(&self, ctx: &AskContext<'_>) -> Option<AskReason> {
        if ctx.failure_count >= self.config.failure_threshold {
            return Some(AskReason::TooManyFailures);
        }
        let indicator = self.config.error_indicator.to_lowercase();
        if ctx
            .last_error
            .is_some_and(|e| !indicator.is_empty() && e.to_lowercase().contains(&indicator))
        {
            return Some(AskReason::ErrorOccurred);
        }
        if ctx.registry_empty {
            return Some(AskReason::NoNavigableObjects);
        }
        let state = ctx.current_state.to_lowercase();
        if self
            .config
            .ambiguity_keywords
            .iter()
            .any(|k| state.contains(&k.to_lowercase()))
        {
            return Some(AskReason::AmbiguousSituation);
        }
        ctx.initial.then_some(AskReason::PlanReview)
    }

    /// 按原因渲染模板问题
    pub fn template_question(&self, reason: AskReason, task: &Task, failure_count: u32) -> String {
        let template = match reason {
            AskReason::TooManyFailures => &self.config.too_many_failures,
            AskReason::ErrorOccurred => &self.config.error_occurred,
            AskReason::NoNavigableObjects => &self.config.no_navigable_objects,
            AskReason::AmbiguousSituation => &self.config.ambiguous_situation,
            AskReason::PlanReview => &self.config.plan_review,
        };
        let count = failure_count.to_string();
        render_template(template, &[("taskname", &task.name), ("failure_count", &count)])
    }

    /// 生成问题：计划复核问题由推理生成，没有 `<Question>` 标签时退回模板
    pub async fn compose_question(
        &self,
        reason: AskReason,
        task: &Task,
        plan: &[Subgoal],
        failure_count: u32,
    ) -> String {
        if reason != AskReason::PlanReview {
            return self.template_question(reason, task, failure_count);
        }
        let plan_text = numbered(plan);
        let (system, user) = self
            .plan_review
            .render(&[("taskname", &task.name), ("plan", &plan_text)]);
        let response = self.client.request(&InferenceRequest::new(system, user)).await;
        extract_single(&response, "Question")
            .unwrap_or_else(|| self.template_question(reason, task, failure_count))
    }

    /// 发出问题：成为唯一待回答问题并写入记忆
    pub fn issue(&mut self, question: &str, memory: &mut MemoryLog) {
        if let Some(prev) = self.pending.as_ref().filter(|p| p.is_pending()) {
            tracing::debug!(question = %prev.question, "Pending question superseded");
        }
        self.pending = Some(DialogueExchange::new(question));
        memory.append(MemoryKind::Question, question);
    }

    /// 记录回答
    pub fn receive(&mut self, response: &str, memory: &mut MemoryLog) {
        if let Some(exchange) = self.pending.as_mut() {
            exchange.response = Some(response.to_string());
        }
        memory.append(MemoryKind::Answer, response);
    }

    /// 完整一轮：判断、生成、提问、收答。未启用或无需提问时返回 None
    pub async fn clarify(
        &mut self,
        ctx: &AskContext<'_>,
        task: &Task,
        plan: &[Subgoal],
        memory: &mut MemoryLog,
    ) -> Option<Clarification> {
        if !self.config.enabled {
            return None;
        }
        let reason = self.should_ask(ctx)?;
        let question = self
            .compose_question(reason, task, plan, ctx.failure_count)
            .await;
        tracing::info!(?reason, question = %question, "Asking operator");
        self.issue(&question, memory);

        let response = self.operator.ask(&question).await;
        match &response {
            Some(answer) => {
                tracing::info!(response = %answer, "Operator answered");
                self.receive(answer, memory);
            }
            None => tracing::info!("No answer from operator"),
        }
        Some(Clarification {
            reason,
            question,
            response,
        })
    }

    /// 根据回答决定是否重规划
    pub async fn decide_replan(
        &self,
        task: &Task,
        prior_plan: &[Subgoal],
        memory: &MemoryLog,
        user_response: &str,
    ) -> ReplanDecision {
        let plan_text = numbered(prior_plan);
        let dialogue = memory.to_prompt_section();
        let (system, user) = self.replan_decision.render(&[
            ("taskname", &task.name),
            ("plan", &plan_text),
            ("memory", &dialogue),
            ("response", user_response),
        ]);
        let response = self.client.request(&InferenceRequest::new(system, user)).await;
        let decision = parse_replan_decision(&response);
        tracing::info!(need_replan = decision.need_replan, reason = %decision.reason, "Replan decision");
        decision
    }
}

/// 解析 `REPLAN: yes|no` 与 `REASON: ...`；缺少 REPLAN 时不重规划，reason 为原始回复
pub fn parse_replan_decision(response: &str) -> ReplanDecision {
    static REPLAN_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)REPLAN:\s*(yes|no)\b").unwrap());
    static REASON_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"(?i)REASON:\s*(.+)").unwrap());

    let replan = REPLAN_RE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().eq_ignore_ascii_case("yes"));
    let Some(need_replan) = replan else {
        return ReplanDecision {
            need_replan: false,
            reason: response.trim().to_string(),
        };
    };
    let reason = REASON_RE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    ReplanDecision {
        need_replan,
        reason,
    }
}
