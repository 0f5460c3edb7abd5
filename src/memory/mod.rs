//! 记忆层：episode 内的对话日志、跨 episode 的失败列表与轨迹落盘

pub mod dialogue;
pub mod persistence;

pub use dialogue::{DialogueExchange, MemoryEntry, MemoryKind, MemoryLog};
pub use persistence::{clear_folder, save_json, FailureLog};
