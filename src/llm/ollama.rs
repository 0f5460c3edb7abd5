//! Ollama 推理客户端
//!
//! 调用 `/api/generate`（非流式）：prompt = system + 空行 + user，图片以 base64 放入 images 字段。
//! 图片按磁盘上的原始分辨率发送，不做缩放；请求体大小随帧尺寸增长。

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmSection;
use crate::llm::{InferenceClient, InferenceRequest, LlmError};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama 客户端：持有 reqwest Client（带请求超时）与采样参数
pub struct OllamaClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaClient {
    pub fn from_config(cfg: &LlmSection) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_url: cfg.api_url.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }

    fn build_payload(&self, request: &InferenceRequest, images: Vec<String>) -> serde_json::Value {
        let mut payload = json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", request.system_prompt, request.user_prompt),
            "stream": false,
            "options": {
                "num_predict": self.max_tokens,
                "temperature": self.temperature,
            }
        });
        if !images.is_empty() {
            payload["images"] = json!(images);
        }
        payload
    }
}

async fn encode_image(path: &Path) -> Result<String, LlmError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LlmError::Image(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Encoding image at original size");
    Ok(STANDARD.encode(bytes))
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        let mut images = Vec::with_capacity(request.images.len());
        for path in &request.images {
            images.push(encode_image(path).await?);
        }
        let payload = self.build_payload(request, images);

        let start = Instant::now();
        tracing::info!(model = %self.model, "start call");
        let response = self
            .http
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        tracing::info!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "end call"
        );
        Ok(data.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
