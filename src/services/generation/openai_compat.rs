// Chat-completions providers (OpenAI and the services that copy its API)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use super::{http_client, settle, GenerationProvider, GenerationRequest};
use crate::core::config::ProviderCredentials;
use crate::core::errors::{GenerationError, GenerationResult};
use crate::utils::truncate_text;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_URL: &str = "https://api.deepseek.com";
const XAI_URL: &str = "https://api.x.ai/v1";
const CEREBRAS_URL: &str = "https://api.cerebras.ai/v1";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatible {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatible {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> GenerationResult<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: http_client(timeout)?,
        })
    }

    pub fn openai(creds: &ProviderCredentials, timeout: Duration) -> GenerationResult<Self> {
        Self::new("openai", OPENAI_URL, &creds.api_key, &creds.model, timeout)
    }

    pub fn deepseek(creds: &ProviderCredentials, timeout: Duration) -> GenerationResult<Self> {
        Self::new("deepseek", DEEPSEEK_URL, &creds.api_key, &creds.model, timeout)
    }

    pub fn xai(creds: &ProviderCredentials, timeout: Duration) -> GenerationResult<Self> {
        Self::new("xai", XAI_URL, &creds.api_key, &creds.model, timeout)
    }

    pub fn cerebras(creds: &ProviderCredentials, timeout: Duration) -> GenerationResult<Self> {
        Self::new("cerebras", CEREBRAS_URL, &creds.api_key, &creds.model, timeout)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    async fn complete(&self, request: &GenerationRequest) -> GenerationResult<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
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

        extract_content(response.json().await?)
    }
}

fn extract_content(response: ChatResponse) -> GenerationResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl GenerationProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(provider = %self.name, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Option<String> {
        settle(&self.name, self.complete(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> OpenAiCompatible {
        OpenAiCompatible::new("test", base_url, "sk-test", "model-x", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_presets() {
        let creds = ProviderCredentials {
            api_key: "k".to_string(),
            model: "deepseek-chat".to_string(),
        };
        let deepseek = OpenAiCompatible::deepseek(&creds, Duration::from_secs(1)).unwrap();
        assert_eq!(deepseek.name(), "deepseek");
        assert_eq!(deepseek.endpoint(), "https://api.deepseek.com/chat/completions");

        let xai = OpenAiCompatible::xai(&creds, Duration::from_secs(1)).unwrap();
        assert_eq!(xai.endpoint(), "https://api.x.ai/v1/chat/completions");
    }

    #[test]
    fn test_body_layout() {
        let p = provider("http://localhost/v1/");
        let request = GenerationRequest::new("rewrite this")
            .with_system("you are an editor")
            .with_params(0.5, 300);
        let json = serde_json::to_value(p.body(&request)).unwrap();

        assert_eq!(json["model"], "model-x");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "rewrite this");
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(p.endpoint(), "http://localhost/v1/chat/completions");
    }

    #[test]
    fn test_extract_content() {
        let ok: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"fresh text"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(ok).unwrap(), "fresh text");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_content(empty), Err(GenerationError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_none() {
        let p = provider("http://127.0.0.1:9");
        assert!(p.generate(&GenerationRequest::new("hi")).await.is_none());
        assert!(!p.probe().await);
    }
}
