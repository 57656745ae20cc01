// Gemini `generateContent` provider with multi-key rotation

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{http_client, settle, GenerationProvider, GenerationRequest};
use crate::core::errors::{GenerationError, GenerationResult};
use crate::middleware::ApiKeyPool;
use crate::utils::truncate_text;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiProvider {
    keys: ApiKeyPool,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(keys: Vec<String>, model: &str, timeout: Duration) -> GenerationResult<Self> {
        Ok(Self {
            keys: ApiKeyPool::new(keys),
            model: model.to_string(),
            base_url: GEMINI_URL.to_string(),
            client: http_client(timeout)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn body(request: &GenerationRequest) -> serde_json::Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens
            }
        });
        if let Some(system) = &request.system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    /// One key, one attempt; the outcome feeds the key's health
    async fn complete(&self, request: &GenerationRequest) -> GenerationResult<String> {
        let (key_index, key) = self
            .keys
            .next_key()
            .await
            .ok_or(GenerationError::NoProviderAvailable)?;

        let result = self.call(&key, request).await;
        match &result {
            Ok(_) => self.keys.record_success(key_index).await,
            Err(e) => {
                debug!("Gemini key {} failed: {}", key_index, e);
                self.keys.record_failure(key_index).await;
            }
        }
        result
    }

    async fn call(&self, key: &str, request: &GenerationRequest) -> GenerationResult<String> {
        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, key)
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

        extract_text(response.json().await?)
    }
}

fn extract_text(response: GeminiResponse) -> GenerationResult<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(provider = "gemini", model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Option<String> {
        settle(self.name(), self.complete(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::KeyHealth;

    #[test]
    fn test_body_layout() {
        let with_system = GeminiProvider::body(
            &GenerationRequest::new("post").with_system("persona").with_params(0.9, 400),
        );
        assert_eq!(with_system["contents"][0]["parts"][0]["text"], "post");
        assert_eq!(with_system["systemInstruction"]["parts"][0]["text"], "persona");
        assert_eq!(with_system["generationConfig"]["maxOutputTokens"], 400);

        let plain = GeminiProvider::body(&GenerationRequest::new("post"));
        assert!(plain.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello, world");

        let blocked: GeminiResponse = serde_json::from_str(r#"{"candidates":[{}]}"#).unwrap();
        assert!(matches!(extract_text(blocked), Err(GenerationError::EmptyResponse)));
    }

    #[test]
    fn test_url_carries_model_not_key() {
        let p = GeminiProvider::new(vec!["abc".to_string()], "gemini-2.5-flash", Duration::from_secs(1)).unwrap();
        assert_eq!(
            p.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_transport_error_hides_key() {
        let p = GeminiProvider::new(vec!["AIza-SECRET-KEY".to_string()], "m", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let err = p.complete(&GenerationRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Request(_)));
        assert!(!err.to_string().contains("AIza-SECRET-KEY"));
    }

    #[tokio::test]
    async fn test_failure_marks_key() {
        let p = GeminiProvider::new(vec!["a".to_string(), "b".to_string()], "m", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        assert!(p.generate(&GenerationRequest::new("hi")).await.is_none());
        assert_eq!(p.keys.health(0).await, Some(KeyHealth::Degraded));
        assert_eq!(p.keys.health(1).await, Some(KeyHealth::Healthy));
    }
}
