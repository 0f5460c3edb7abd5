//! 场景观察：渲染帧 + 候选物体列表 -> 简短文字描述（经推理服务）

use std::path::Path;

use crate::config::PromptTemplate;
use crate::llm::{InferenceRequest, RetryingClient};

pub struct ObservationService {
    client: RetryingClient,
    template: PromptTemplate,
}

impl ObservationService {
    pub fn new(client: RetryingClient, template: PromptTemplate) -> Self {
        Self { client, template }
    }

    /// 有帧时附图；候选类别写入 user prompt。推理失败时返回的哨兵文本原样交给规划器
    pub async fn describe<I, S>(&self, frame: Option<&Path>, candidates: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let objects = candidates
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let (system, user) = self.template.render(&[("objects", &objects)]);
        let mut request = InferenceRequest::new(system, user);
        if let Some(path) = frame {
            request = request.with_image(path);
        }
        let description = self.client.request(&request).await;
        tracing::info!(observation = %description, "Observation generated");
        description
    }
}
