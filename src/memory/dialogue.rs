//! 对话记忆：规划结果、提问与回答的只追加日志
//!
//! 在一个 episode 内有效，原样拼入后续规划 / 澄清调用的 prompt（Dialogue so far），条目只增不改、按时间排序。

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Planning,
    Question,
    Answer,
}

impl MemoryKind {
    fn label(self) -> &'static str {
        match self {
            MemoryKind::Planning => "Planning",
            MemoryKind::Question => "Question",
            MemoryKind::Answer => "User Response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryEntry {
    pub kind: MemoryKind,
    pub content: String,
}

/// 只追加日志：没有任何修改或删除已有条目的方法
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryLog {
    entries: Vec<MemoryEntry>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, kind: MemoryKind, content: impl Into<String>) {
        self.entries.push(MemoryEntry {
            kind,
            content: content.into(),
        });
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 构建供 prompt 使用的片段，每行 "<Kind>: <content>"
    pub fn to_prompt_section(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.kind.label(), e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 最近一次与操作员的交互；同一时刻至多一个待回答问题
#[derive(Debug, Clone, Serialize)]
pub struct DialogueExchange {
    pub question: String,
    pub response: Option<String>,
    pub asked_at: DateTime<Utc>,
}

impl DialogueExchange {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            response: None,
            asked_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}
