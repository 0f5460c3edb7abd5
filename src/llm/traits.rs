//! 推理服务抽象
//!
//! 所有后端（Ollama / Mock）实现 InferenceClient：一次请求 = system + user 文本 + 最多 3 张图片，返回纯文本。
//! RetryingClient 在外层施加固定次数、固定间隔的重试；耗尽后返回哨兵字符串而不是错误，
//! 上层规划因此退化为空计划，永远不会向上抛出。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::RetrySection;

/// 重试耗尽后返回的哨兵文本
pub const FAILED_COMPLETION: &str = "Failed to generate completion after multiple attempts.";

/// 单次请求最多附带的图片数
pub const MAX_IMAGES: usize = 3;

/// 推理服务错误（传输、状态码、解码、图片读取）
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Image error: {0}")]
    Image(String),
}

/// 一次推理请求
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub images: Vec<PathBuf>,
}

impl InferenceRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            images: Vec::new(),
        }
    }

    /// 附加一张图片；超过 MAX_IMAGES 的部分丢弃并告警
    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if self.images.len() >= MAX_IMAGES {
            tracing::warn!(image = %path.display(), "Too many image attachments, dropping");
        } else {
            self.images.push(path);
        }
        self
    }
}

/// 推理客户端 trait：调用方看到的是阻塞式契约（await 到返回或失败为止）
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, LlmError>;

    /// 模型名（用于日志）
    fn model(&self) -> &str {
        "unknown"
    }
}

/// 固定次数 + 固定间隔
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub limit: u32,
    pub delay: Duration,
}

impl RetryConfig {
    pub fn from_config(section: &RetrySection) -> Self {
        Self {
            limit: section.limit.max(1),
            delay: Duration::from_secs(section.delay_secs),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_config(&RetrySection::default())
    }
}

/// 带重试的推理客户端：request 永不返回错误，耗尽后返回 FAILED_COMPLETION
#[derive(Clone)]
pub struct RetryingClient {
    inner: Arc<dyn InferenceClient>,
    retry: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn InferenceClient>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    pub async fn request(&self, request: &InferenceRequest) -> String {
        tracing::debug!(system = %request.system_prompt, user = %request.user_prompt, "VLM request");
        let model = self.inner.model().to_string();

        for attempt in 1..=self.retry.limit {
            match self.inner.complete(request).await {
                Ok(content) => return content,
                Err(e) => {
                    tracing::warn!(
                        model = %model,
                        attempt,
                        limit = self.retry.limit,
                        error = %e,
                        "Inference call failed"
                    );
                    if attempt < self.retry.limit && !self.retry.delay.is_zero() {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        tracing::error!(model = %model, "Inference retries exhausted");
        FAILED_COMPLETION.to_string()
    }
}

/// 响应是否为重试耗尽的哨兵
pub fn is_failed_completion(text: &str) -> bool {
    text == FAILED_COMPLETION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockInferenceClient;

    fn no_delay(limit: u32) -> RetryConfig {
        RetryConfig {
            limit,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_third_call() {
        let mock = Arc::new(MockInferenceClient::new());
        mock.push_error(LlmError::Transport("refused".into()));
        mock.push_error(LlmError::Status {
            status: 502,
            body: "bad gateway".into(),
        });
        mock.push_response("<Subgoal1>find apple</Subgoal1>");

        let client = RetryingClient::new(mock.clone(), no_delay(3));
        let out = client.request(&InferenceRequest::new("sys", "user")).await;

        assert_eq!(out, "<Subgoal1>find apple</Subgoal1>");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_sentinel() {
        let mock = Arc::new(MockInferenceClient::new());
        for _ in 0..10 {
            mock.push_error(LlmError::Transport("down".into()));
        }

        let client = RetryingClient::new(mock.clone(), no_delay(3));
        let out = client.request(&InferenceRequest::new("sys", "user")).await;

        assert!(is_failed_completion(&out));
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_with_image_caps_attachments() {
        let req = InferenceRequest::new("s", "u")
            .with_image("a.png")
            .with_image("b.png")
            .with_image("c.png")
            .with_image("d.png");
        assert_eq!(req.images.len(), MAX_IMAGES);
        assert_eq!(req.images[2], PathBuf::from("c.png"));
    }

    #[test]
    fn test_retry_config_never_zero() {
        let cfg = RetryConfig::from_config(&RetrySection {
            limit: 0,
            delay_secs: 1,
        });
        assert_eq!(cfg.limit, 1);
    }
}
