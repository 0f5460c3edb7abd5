//! trajgen - 具身智能轨迹生成
//!
//! 模块划分：
//! - **batch**: 批处理驱动（任务文件 -> 逐个 episode）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: episode 流水线、限时场景初始化、重试包络
//! - **env**: 仿真环境边界与离线回放环境
//! - **llm**: 推理服务客户端抽象、重试与实现（Ollama / Mock）
//! - **memory**: 对话记忆、失败列表与轨迹落盘
//! - **observability**: 日志初始化
//! - **perception**: 显著性评分、可导航注册表、场景观察
//! - **planning**: 分层规划器、澄清管理、执行控制器

pub mod batch;
pub mod config;
pub mod core;
pub mod env;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod perception;
pub mod planning;
