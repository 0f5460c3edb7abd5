//! Mock 推理客户端（用于测试与离线运行，无需推理服务）
//!
//! 按顺序弹出预置的响应或错误；队列为空时返回 fallback 文本。记录调用次数与收到的请求，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{InferenceClient, InferenceRequest, LlmError};

/// 脚本化 Mock：push_response / push_error 预置结果
#[derive(Debug, Default)]
pub struct MockInferenceClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<InferenceRequest>>,
    fallback: String,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 脚本耗尽后返回的文本
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(text.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockInferenceClient::new().with_fallback("<Subgoal1>look around</Subgoal1>");
        mock.push_response("first");
        mock.push_error(LlmError::Transport("connection refused".into()));
        let req = InferenceRequest::new("sys", "user");

        assert_eq!(mock.complete(&req).await.unwrap(), "first");
        assert!(mock.complete(&req).await.is_err());
        assert_eq!(
            mock.complete(&req).await.unwrap(),
            "<Subgoal1>look around</Subgoal1>"
        );
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests()[0].user_prompt, "user");
    }
}
