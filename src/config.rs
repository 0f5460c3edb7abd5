//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRAJGEN__*` 覆盖（双下划线表示嵌套，如 `TRAJGEN__LLM__MODEL=llava:7b`）。
//! 配置在启动时构建一次，再以引用传入各组件构造函数，不存在进程级全局默认值。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub batch: BatchSection,
    pub llm: LlmSection,
    pub scene: SceneSection,
    pub episode: EpisodeSection,
    pub execution: ExecutionSection,
    pub clarification: ClarificationSection,
    pub prompts: PromptsSection,
}

/// [batch] 段：场景、任务类型、输入文件与输出根目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub scene: String,
    pub task_type: String,
    /// 任务描述 JSON；未设置时为 data_engine/{task_type}_task_metadata/{scene}.json
    pub tasks_path: Option<PathBuf>,
    /// 场景元数据 JSON；未设置时为 data_engine/taskgenerate/kitchens/{scene}/metadata.json
    pub metadata_path: Option<PathBuf>,
    /// 每个 episode 的工作目录根
    pub data_root: PathBuf,
    /// 跨 episode 的失败路径列表（JSON 数组，只追加）
    pub failure_log: PathBuf,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            scene: "FloorPlan1".to_string(),
            task_type: "pickup_and_put".to_string(),
            tasks_path: None,
            metadata_path: None,
            data_root: PathBuf::from("data"),
            failure_log: PathBuf::from("wrong_generate_path_list.json"),
        }
    }
}

impl BatchSection {
    pub fn resolved_tasks_path(&self) -> PathBuf {
        self.tasks_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "data_engine/{}_task_metadata/{}.json",
                self.task_type, self.scene
            ))
        })
    }

    pub fn resolved_metadata_path(&self) -> PathBuf {
        self.metadata_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "data_engine/taskgenerate/kitchens/{}/metadata.json",
                self.scene
            ))
        })
    }
}

/// [llm] 段：推理服务后端、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / mock
    pub provider: String,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "qwen2.5vl:32b".to_string(),
            api_url: "http://localhost:11434/api/generate".to_string(),
            max_tokens: 1500,
            temperature: 0.9,
            request_timeout_secs: 60,
            retry: RetrySection::default(),
        }
    }
}

/// [llm.retry] 段：固定次数、固定间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub limit: u32,
    pub delay_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            limit: 3,
            delay_secs: 300,
        }
    }
}

/// [scene] 段：场景初始化超时、地面类别
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    pub init_timeout_secs: u64,
    /// 不进入可导航集合的类别
    pub floor_type: String,
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            init_timeout_secs: 40,
            floor_type: "Floor".to_string(),
        }
    }
}

/// [episode] 段：单任务最大尝试次数、执行失败后的重规划轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EpisodeSection {
    pub max_attempts: u32,
    pub max_replans: u32,
}

impl Default for EpisodeSection {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            max_replans: 1,
        }
    }
}

/// [execution] 段：导航类动作同义词、奖励目标
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub navigation_actions: Vec<String>,
    /// 累计奖励达到该值即视为完成；任务元数据中的 `reward_target` 优先
    pub reward_target: Option<u32>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            navigation_actions: vec!["search".to_string()],
            reward_target: None,
        }
    }
}

/// [clarification] 段：提问策略阈值与问题模板
///
/// 模板占位符：`{taskname}`、`{failure_count}`。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClarificationSection {
    pub enabled: bool,
    /// true 时从 stdin 读取操作员回答
    pub interactive: bool,
    pub failure_threshold: u32,
    pub error_indicator: String,
    pub ambiguity_keywords: Vec<String>,
    pub too_many_failures: String,
    pub error_occurred: String,
    pub no_navigable_objects: String,
    pub ambiguous_situation: String,
    pub plan_review: String,
}

impl Default for ClarificationSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interactive: false,
            failure_threshold: 3,
            error_indicator: "error".to_string(),
            ambiguity_keywords: vec![
                "ambiguous".to_string(),
                "unclear".to_string(),
                "confused".to_string(),
            ],
            too_many_failures: "I have tried {failure_count} times but still cannot complete the task '{taskname}'. Please help me.".to_string(),
            error_occurred: "I ran into a problem while executing the task '{taskname}'. Please tell me how to resolve it.".to_string(),
            no_navigable_objects: "I cannot find any object to operate on for the task '{taskname}'. Please tell me where I should search.".to_string(),
            ambiguous_situation: "The instruction for the task '{taskname}' is not clear enough. Please clarify what exactly is required.".to_string(),
            plan_review: "Before I start the task '{taskname}', is there anything about the plan I should change?".to_string(),
        }
    }
}

/// 一组 system / user 提示模板
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub user: String,
}

impl PromptTemplate {
    fn new(system: &str, user: &str) -> Self {
        Self {
            system: system.to_string(),
            user: user.to_string(),
        }
    }

    /// 将 `{key}` 替换为对应值，返回 (system, user)
    pub fn render(&self, vars: &[(&str, &str)]) -> (String, String) {
        (render_template(&self.system, vars), render_template(&self.user, vars))
    }
}

/// 简单占位符替换：`{key}` -> value
///
/// 只扫描模板一遍，替换进来的值不会再被当作占位符展开；未知的 `{...}` 原样保留。
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// [prompts] 段：各推理调用的提示模板
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsSection {
    pub observation: PromptTemplate,
    pub task_planning: PromptTemplate,
    pub subtask_expansion: PromptTemplate,
    pub replan_task: PromptTemplate,
    pub replan_from_response: PromptTemplate,
    pub plan_review: PromptTemplate,
    pub replan_decision: PromptTemplate,
}

impl Default for PromptsSection {
    fn default() -> Self {
        Self {
            observation: PromptTemplate::new(
                "You are a mobile robot observing a household scene.",
                "Describe the scene in a few sentences. Objects detected nearby: {objects}",
            ),
            task_planning: PromptTemplate::new(
                "You are a mobile robot task planner. Break the task into high-level subgoals.",
                "Task: {taskname}\nEnvironment Description: {environment_description}\n{memory}\nOutput format:\n<Subgoal1>first subgoal</Subgoal1>\n<Subgoal2>second subgoal</Subgoal2>\n...",
            ),
            subtask_expansion: PromptTemplate::new(
                "You are a mobile robot task planner. Expand a subgoal into executable subtasks.",
                "Subgoal: {subgoal}\nContext: {context}\nAllowed actions: {actions}\nOutput format:\n<Subtask1>[action] [target_object]</Subtask1>\n...",
            ),
            replan_task: PromptTemplate::new(
                "You are a mobile robot task planner. Your job is to replan the task based on the current state and feedback.",
                "Task: {taskname}\nCurrent State: {current_state}\nFeedback: {feedback}\nEnvironment Description: {environment_description}\n\nPlease replan the remaining subgoals. Output format:\n<Subgoal1>...</Subgoal1>\n...",
            ),
            replan_from_response: PromptTemplate::new(
                "You are a mobile robot task planner. Revise the plan using the operator's answer.",
                "Task: {taskname}\nObservation: {observation}\nPrevious plan:\n{prior_subgoals}\nRobot question: {question}\nOperator answer: {response}\n\nOutput the revised subgoals. Output format:\n<Subgoal1>...</Subgoal1>\n...",
            ),
            plan_review: PromptTemplate::new(
                "You are a mobile robot that checks its plan with a human operator before acting.",
                "Task: {taskname}\nPlan:\n{plan}\n\nAsk the operator one short question about this plan. Output format:\n<Question>...</Question>",
            ),
            replan_decision: PromptTemplate::new(
                "You decide whether a robot must replan after hearing from its operator.",
                "Task: {taskname}\nCurrent plan:\n{plan}\nDialogue so far:\n{memory}\nOperator answer: {response}\n\nAnswer exactly in this format:\nREPLAN: yes|no\nREASON: <one sentence>",
            ),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TRAJGEN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRAJGEN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRAJGEN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.episode.max_attempts, 2);
        assert_eq!(cfg.llm.retry.limit, 3);
        assert_eq!(cfg.scene.init_timeout_secs, 40);
        assert_eq!(cfg.clarification.failure_threshold, 3);
        assert_eq!(cfg.execution.navigation_actions, vec!["search".to_string()]);
    }

    #[test]
    fn test_render_template_replaces_all_keys() {
        let out = render_template(
            "{taskname} x{failure_count} {taskname}",
            &[("taskname", "put apple"), ("failure_count", "3")],
        );
        assert_eq!(out, "put apple x3 put apple");
    }

    #[test]
    fn test_render_template_does_not_expand_substituted_values() {
        let out = render_template(
            "Task: {taskname}\n{memory}",
            &[
                ("taskname", "explain {memory} and {x"),
                ("memory", "Planning: find apple"),
            ],
        );
        assert_eq!(out, "Task: explain {memory} and {x\nPlanning: find apple");

        // 未知占位符与孤立花括号原样保留
        assert_eq!(
            render_template("{unknown} { {a}", &[("a", "1")]),
            "{unknown} { 1"
        );
    }

    #[test]
    fn test_resolved_paths_follow_scene_and_task_type() {
        let batch = BatchSection::default();
        assert_eq!(
            batch.resolved_tasks_path(),
            PathBuf::from("data_engine/pickup_and_put_task_metadata/FloorPlan1.json")
        );
        assert!(batch
            .resolved_metadata_path()
            .ends_with("FloorPlan1/metadata.json"));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let c = config::Config::builder()
            .add_source(config::File::from_str(
                "[episode]\nmax_attempts = 5\n[llm.retry]\ndelay_secs = 0\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: AppConfig = c.try_deserialize().unwrap();
        assert_eq!(cfg.episode.max_attempts, 5);
        assert_eq!(cfg.episode.max_replans, 1);
        assert_eq!(cfg.llm.retry.delay_secs, 0);
        assert_eq!(cfg.llm.retry.limit, 3);
        assert_eq!(cfg.llm.model, "qwen2.5vl:32b");
    }
}
