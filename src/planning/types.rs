//! 规划数据模型：动作词表、子任务、子目标、任务描述

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 子目标：自由文本，由规划器整体替换
pub type Subgoal = String;

/// 固定动作词表（大小写敏感）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Search,
    Open,
    Close,
    PickUp,
    Put,
    ToggleOn,
    ToggleOff,
    Clean,
    Dirty,
    Fill,
    Empty,
    Slice,
    Cook,
    Break,
    UseUp,
}

impl Action {
    pub const ALL: [Action; 15] = [
        Action::Search,
        Action::Open,
        Action::Close,
        Action::PickUp,
        Action::Put,
        Action::ToggleOn,
        Action::ToggleOff,
        Action::Clean,
        Action::Dirty,
        Action::Fill,
        Action::Empty,
        Action::Slice,
        Action::Cook,
        Action::Break,
        Action::UseUp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Search => "search",
            Action::Open => "open",
            Action::Close => "close",
            Action::PickUp => "pick_up",
            Action::Put => "put",
            Action::ToggleOn => "toggle_on",
            Action::ToggleOff => "toggle_off",
            Action::Clean => "clean",
            Action::Dirty => "dirty",
            Action::Fill => "fill",
            Action::Empty => "empty",
            Action::Slice => "slice",
            Action::Cook => "cook",
            Action::Break => "break",
            Action::UseUp => "use_up",
        }
    }

    /// 交互类动作对应的环境动作名；search 为导航，由执行器单独处理
    pub fn env_action(self) -> &'static str {
        match self {
            Action::Search => "NavigateTo",
            Action::Open => "OpenObject",
            Action::Close => "CloseObject",
            Action::PickUp => "PickupObject",
            Action::Put => "PutObject",
            Action::ToggleOn => "ToggleObjectOn",
            Action::ToggleOff => "ToggleObjectOff",
            Action::Clean => "CleanObject",
            Action::Dirty => "DirtyObject",
            Action::Fill => "FillObjectWithLiquid",
            Action::Empty => "EmptyLiquidFromObject",
            Action::Slice => "SliceObject",
            Action::Cook => "CookObject",
            Action::Break => "BreakObject",
            Action::UseUp => "UseUpObject",
        }
    }

    /// 写进 prompt 的词表，逗号分隔
    pub fn vocabulary() -> String {
        Action::ALL
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported action '{0}'")]
pub struct UnsupportedAction(pub String);

/// 子任务文本解析失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtaskParseError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedAction),

    #[error("subtask '{0}' has no target object type")]
    MissingTarget(String),
}

impl FromStr for Action {
    type Err = UnsupportedAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnsupportedAction(s.to_string()))
    }
}

/// 原子子任务：动作 + 目标类别
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtask {
    pub action: Action,
    pub target_type: String,
    /// "<action> <target_type>"
    pub decision: String,
}

impl Subtask {
    pub fn new(action: Action, target_type: impl Into<String>) -> Self {
        let target_type = target_type.into();
        let decision = format!("{} {}", action, target_type);
        Self {
            action,
            target_type,
            decision,
        }
    }

    /// 解析 "open Fridge"：首个词为动作，其余为目标类别（不可为空）
    pub fn parse(text: &str) -> Result<Self, SubtaskParseError> {
        let text = text.trim();
        let (verb, rest) = match text.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (text, ""),
        };
        let action = verb.parse::<Action>()?;
        if rest.is_empty() {
            return Err(SubtaskParseError::MissingTarget(text.to_string()));
        }
        Ok(Self::new(action, rest))
    }
}

/// 任务描述：名称、类型与其余元数据；episode 开始后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "taskname")]
    pub name: String,
    #[serde(alias = "tasktype", default)]
    pub kind: String,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// 元数据中的 reward_target（若有）
    pub fn reward_target(&self) -> Option<u32> {
        self.metadata
            .get("reward_target")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Flat(Vec<Task>),
    Nested(Vec<Vec<Task>>),
}

/// 读取任务文件：任务数组，或首元素为任务数组的数组
pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<Task>> {
    let data = std::fs::read_to_string(path)?;
    let tasks = match serde_json::from_str::<TaskFile>(&data)? {
        TaskFile::Flat(tasks) => tasks,
        TaskFile::Nested(groups) => groups.into_iter().next().unwrap_or_default(),
    };
    Ok(tasks)
}
