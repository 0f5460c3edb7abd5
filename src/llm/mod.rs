//! 推理服务层：客户端抽象、固定间隔重试与实现（Ollama / Mock）

pub mod mock;
pub mod ollama;
pub mod traits;

use std::sync::Arc;

pub use mock::MockInferenceClient;
pub use ollama::OllamaClient;
pub use traits::{
    is_failed_completion, InferenceClient, InferenceRequest, LlmError, RetryConfig,
    RetryingClient, FAILED_COMPLETION, MAX_IMAGES,
};

use crate::config::AppConfig;

/// 根据配置选择推理后端（Ollama / Mock），并包上重试层
pub fn create_client_from_config(cfg: &AppConfig) -> RetryingClient {
    let provider = cfg.llm.provider.to_lowercase();
    let inner: Arc<dyn InferenceClient> = match provider.as_str() {
        "ollama" => match OllamaClient::from_config(&cfg.llm) {
            Ok(client) => {
                tracing::info!("Using Ollama inference ({} at {})", cfg.llm.model, cfg.llm.api_url);
                Arc::new(client)
            }
            Err(e) => {
                tracing::warn!("Ollama client init failed ({}), using Mock inference", e);
                Arc::new(MockInferenceClient::new())
            }
        },
        _ => {
            tracing::warn!("Provider '{}' unknown or mock, using Mock inference", provider);
            Arc::new(MockInferenceClient::new())
        }
    };
    RetryingClient::new(inner, RetryConfig::from_config(&cfg.llm.retry))
}
