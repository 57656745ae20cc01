// Text generation providers
//
// Every backend hides behind `GenerationProvider`: give it a prompt, get text
// back or nothing. Transport problems are logged where they happen and never
// escape as errors, so the caller only has to decide what to do with `None`.

pub mod fallback;
pub mod gemini;
pub mod http_inference;
pub mod openai_compat;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::GenerationConfig;
use crate::core::errors::GenerationResult;

pub use fallback::FallbackTextGenerator;
pub use gemini::GeminiProvider;
pub use http_inference::HttpInferenceProvider;
pub use openai_compat::OpenAiCompatible;

/// Prompt plus sampling parameters for one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_params(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Generated text, or `None` on any failure (already logged)
    async fn generate(&self, request: &GenerationRequest) -> Option<String>;

    /// Cheap liveness check with a minimal prompt
    async fn probe(&self) -> bool {
        let request = GenerationRequest::new("Reply with the single word OK.").with_params(0.0, 5);
        self.generate(&request).await.is_some()
    }
}

/// HTTP client shared by the HTTP-backed providers
pub(crate) fn http_client(timeout: Duration) -> GenerationResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?)
}

/// Collapse a provider result into the trait's `Option`, logging failures
pub(crate) fn settle(provider: &str, result: GenerationResult<String>) -> Option<String> {
    match result {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                warn!("{}: empty completion", provider);
                None
            } else {
                debug!("{}: {} chars generated", provider, text.chars().count());
                Some(text.to_string())
            }
        }
        Err(e) => {
            warn!("{}: generation failed: {}", provider, e);
            None
        }
    }
}

fn shared<P: GenerationProvider + 'static>(provider: P) -> Arc<dyn GenerationProvider> {
    Arc::new(provider)
}

/// Build every provider that has credentials, primary first
///
/// The remaining providers keep a fixed order: deepseek, openai, xai,
/// cerebras, gemini, huggingface. Construction failures are logged and the
/// provider is left out.
pub fn build_providers(config: &GenerationConfig) -> Vec<Arc<dyn GenerationProvider>> {
    let timeout = config.timeout;
    let mut providers: Vec<Arc<dyn GenerationProvider>> = Vec::new();

    let mut push = |built: GenerationResult<Arc<dyn GenerationProvider>>| match built {
        Ok(provider) => providers.push(provider),
        Err(e) => warn!("Provider skipped: {}", e),
    };

    if let Some(creds) = &config.deepseek {
        push(OpenAiCompatible::deepseek(creds, timeout).map(shared));
    }
    if let Some(creds) = &config.openai {
        push(OpenAiCompatible::openai(creds, timeout).map(shared));
    }
    if let Some(creds) = &config.xai {
        push(OpenAiCompatible::xai(creds, timeout).map(shared));
    }
    if let Some(creds) = &config.cerebras {
        push(OpenAiCompatible::cerebras(creds, timeout).map(shared));
    }
    if !config.gemini_keys.is_empty() {
        push(
            GeminiProvider::new(config.gemini_keys.clone(), &config.gemini_model, timeout)
                .map(shared),
        );
    }
    if let Some(creds) = &config.huggingface {
        push(HttpInferenceProvider::new(&creds.model, &creds.api_key, timeout).map(shared));
    }

    if let Some(pos) = providers.iter().position(|p| p.name() == config.primary) {
        let primary = providers.remove(pos);
        providers.insert(0, primary);
    } else if !providers.is_empty() {
        warn!(
            "Primary provider '{}' is not configured, using '{}' first",
            config.primary,
            providers[0].name()
        );
    }

    info!(
        "Generation providers: [{}]",
        providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
    );
    providers
}
