//! Chat-model-backed extractor

use crate::error::TrackerError;
use crate::openai::OpenAiClient;
use crate::parser::{build_prompt, TransactionExtractor, SYSTEM_PROMPT};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

pub struct OpenAiExtractor {
    client: OpenAiClient,
}

impl OpenAiExtractor {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransactionExtractor for OpenAiExtractor {
    async fn extract(&self, text: &str) -> Result<Value> {
        let content = self
            .client
            .complete_json(SYSTEM_PROMPT, &build_prompt(text))
            .await?;

        let raw: Value = serde_json::from_str(&content).map_err(|e| {
            error!(model = %self.client.model(), "Model returned invalid JSON: {}", e);
            TrackerError::UpstreamParse(e.to_string())
        })?;

        if !raw.is_object() {
            return Err(TrackerError::UpstreamParse(
                "model output is not a JSON object".to_string(),
            ));
        }

        Ok(raw)
    }
}
