// Hosted inference endpoints that take `{inputs, parameters}` and answer
// with `[{"generated_text": ...}]` (Hugging Face style)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use super::{http_client, settle, GenerationProvider, GenerationRequest};
use crate::core::errors::{GenerationError, GenerationResult};
use crate::utils::truncate_text;

#[derive(Debug, Serialize)]
struct InferenceParameters {
    temperature: f32,
    max_new_tokens: u32,
    return_full_text: bool,
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: InferenceParameters,
}

#[derive(Debug, Deserialize)]
struct InferenceOutput {
    generated_text: String,
}

pub struct HttpInferenceProvider {
    model_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpInferenceProvider {
    pub fn new(model_url: &str, token: &str, timeout: Duration) -> GenerationResult<Self> {
        Ok(Self {
            model_url: model_url.to_string(),
            token: token.to_string(),
            client: http_client(timeout)?,
        })
    }

    fn body(request: &GenerationRequest) -> InferenceRequest {
        // No separate system channel on these endpoints
        let inputs = match &request.system_prompt {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };
        InferenceRequest {
            inputs,
            parameters: InferenceParameters {
                temperature: request.temperature,
                max_new_tokens: request.max_tokens,
                return_full_text: false,
            },
        }
    }

    async fn complete(&self, request: &GenerationRequest) -> GenerationResult<String> {
        let response = self
            .client
            .post(&self.model_url)
            .bearer_auth(&self.token)
            .json(&Self::body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate_text(&body, 200, "..."),
            });
        }

        let outputs: Vec<InferenceOutput> = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        outputs
            .into_iter()
            .next()
            .map(|o| o.generated_text)
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[async_trait]
impl GenerationProvider for HttpInferenceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    #[instrument(skip_all, fields(provider = "huggingface"))]
    async fn generate(&self, request: &GenerationRequest) -> Option<String> {
        settle(self.name(), self.complete(request).await)
    }
}
