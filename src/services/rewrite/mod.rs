// Post rewriting through the provider chain, with a local fallback

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core::config::BrandingConfig;
use crate::core::types::RewriteResult;
use crate::services::generation::{FallbackTextGenerator, GenerationRequest};
use crate::utils::{replace_links, word_set, Metrics};

/// Shorter texts (after trimming) are published as they are
pub const MIN_REWRITE_CHARS: usize = 10;
/// Below this score the enhance pass runs
pub const UNIQUENESS_THRESHOLD: f64 = 30.0;
/// Length ceiling the prompts ask for
pub const MAX_POST_CHARS: usize = 800;

const SYSTEM_PROMPT: &str = "You are a professional SMM specialist. You rewrite posts so they keep \
their meaning but read as original, authored content.";

const ENHANCE_TEMPERATURE: f32 = 0.5;
const ENHANCE_MAX_TOKENS: u32 = 500;

/// Word-level difference between two texts, 0-100
///
/// Compares lowercase whitespace-separated word sets. An original without
/// words scores 0 and texts sharing no words score 100.
pub fn uniqueness(original: &str, rewritten: &str) -> f64 {
    let original_words = word_set(original);
    if original_words.is_empty() {
        return 0.0;
    }
    let rewritten_words = word_set(rewritten);
    if rewritten_words.is_disjoint(&original_words) {
        return 100.0;
    }
    let new_words = rewritten_words.difference(&original_words).count();
    (new_words as f64 / original_words.len() as f64 * 100.0).min(100.0)
}

pub struct RewriteEngine {
    generator: Arc<FallbackTextGenerator>,
    branding: BrandingConfig,
    old_links: Regex,
    temperature: f32,
    max_tokens: u32,
    metrics: Option<Metrics>,
}

impl RewriteEngine {
    pub fn new(generator: Arc<FallbackTextGenerator>, branding: BrandingConfig, old_links: Regex) -> Self {
        Self {
            generator,
            branding,
            old_links,
            temperature: 0.7,
            max_tokens: 1000,
            metrics: None,
        }
    }

    pub fn with_params(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[instrument(skip_all, fields(chars = original.chars().count(), has_links = has_links))]
    pub async fn rewrite(&self, original: &str, has_links: bool) -> RewriteResult {
        if original.trim().chars().count() < MIN_REWRITE_CHARS {
            debug!("Text too short to rewrite");
            return RewriteResult {
                text: original.to_string(),
                uniqueness: 0.0,
                passes: 0,
            };
        }

        let request = GenerationRequest::new(self.rewrite_prompt(original, has_links))
            .with_system(SYSTEM_PROMPT)
            .with_params(self.temperature, self.max_tokens);

        let mut text = match self.generator.generate(&request).await {
            Some(text) => text,
            None => {
                info!("No provider answered, using local rewrite");
                if let Some(metrics) = &self.metrics {
                    metrics.record_local_fallback();
                }
                self.local_rewrite(original)
            }
        };
        let mut passes = 1;

        let mut score = uniqueness(original, &text);
        info!("Uniqueness {:.1}%", score);

        if score < UNIQUENESS_THRESHOLD {
            passes += 1;
            let request = GenerationRequest::new(self.enhance_prompt(&text))
                .with_params(ENHANCE_TEMPERATURE, ENHANCE_MAX_TOKENS);
            match self.generator.generate(&request).await {
                Some(enhanced) => {
                    text = enhanced;
                    score = uniqueness(original, &text);
                    info!("Enhanced, uniqueness now {:.1}%", score);
                }
                None => warn!("Enhance pass failed, keeping first pass"),
            }
        }

        RewriteResult {
            text,
            uniqueness: score,
            passes,
        }
    }

    /// Rewrite without any provider: swap old links and append the brand line
    pub fn local_rewrite(&self, original: &str) -> String {
        let replaced = replace_links(original, &self.old_links, &self.branding.target_link);
        format!(
            "{}\n\n🔒 Stay connected with {}: {}",
            replaced, self.branding.brand_name, self.branding.target_link
        )
    }

    fn rewrite_prompt(&self, text: &str, has_links: bool) -> String {
        let brand_name = &self.branding.brand_name;
        let style = &self.branding.style;

        if has_links {
            let target_link = &self.branding.target_link;
            format!(
                "Rewrite this post about internet blocking so that it is unique but keeps all of its meaning.\n\n\
                 ORIGINAL TEXT:\n{text}\n\n\
                 REQUIREMENTS:\n\
                 1. Replace ALL links (t.me/..., https://...) with \"{target_link}\"\n\
                 2. Rephrase the text, keeping every fact and detail\n\
                 3. End with a short call to action about using a VPN (1-2 sentences)\n\
                 4. Style: {style}\n\
                 5. Mention \"{brand_name}\" as the solution\n\
                 6. Keep all key data: regions, providers, times\n\
                 7. Write in your own voice, no \"according to monitoring data\"\n\
                 8. At most {MAX_POST_CHARS} characters\n\n\
                 REWRITTEN TEXT:"
            )
        } else {
            format!(
                "Lightly rephrase this post about internet blocking, keeping all facts.\n\n\
                 ORIGINAL TEXT:\n{text}\n\n\
                 REQUIREMENTS:\n\
                 1. Keep all data: regions, providers, times\n\
                 2. Change the wording slightly\n\
                 3. Mention \"{brand_name}\" naturally as the solution\n\
                 4. Style: {style}\n\
                 5. At most {MAX_POST_CHARS} characters\n\n\
                 REWRITTEN TEXT:"
            )
        }
    }

    fn enhance_prompt(&self, text: &str) -> String {
        format!(
            "Rework this post so it reads more original. Weave \"{}\" into the text naturally. \
             Do not add a call to action and do not add new links. Keep it under {} characters.\n\n\
             TEXT:\n{}\n\n\
             REWORKED TEXT:",
            self.branding.brand_name, MAX_POST_CHARS, text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::generation::GenerationProvider;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Answers from a queue and remembers the prompts it saw
    struct Queue {
        replies: Mutex<Vec<Option<String>>>,
        prompts: Mutex<Vec<GenerationRequest>>,
    }

    impl Queue {
        fn new(replies: Vec<Option<&str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().map(|r| r.map(str::to_string)).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for Queue {
        fn name(&self) -> &str {
            "queue"
        }

        async fn generate(&self, request: &GenerationRequest) -> Option<String> {
            self.prompts.lock().push(request.clone());
            self.replies.lock().pop().flatten()
        }
    }

    fn branding() -> BrandingConfig {
        BrandingConfig {
            target_link: "t.me/newchan".to_string(),
            brand_name: "FastVPN".to_string(),
            style: "short and urgent".to_string(),
        }
    }

    fn pattern() -> Regex {
        regex::RegexBuilder::new(r"t\.me/oldchan")
            .case_insensitive(true)
            .build()
            .unwrap()
    }

    fn engine(provider: Option<Arc<Queue>>) -> RewriteEngine {
        let generator = match provider {
            Some(p) => FallbackTextGenerator::new(vec![p as Arc<dyn GenerationProvider>]),
            None => FallbackTextGenerator::disabled(),
        };
        RewriteEngine::new(Arc::new(generator), branding(), pattern())
    }

    #[test]
    fn test_uniqueness_bounds() {
        assert_eq!(uniqueness("same words here", "same words here"), 0.0);
        assert_eq!(uniqueness("alpha beta", "gamma delta"), 100.0);
        assert_eq!(uniqueness("", "anything"), 0.0);
        assert_eq!(uniqueness("   ", "anything"), 0.0);
        // Case-folded
        assert_eq!(uniqueness("Hello World", "hello world"), 0.0);
    }

    #[test]
    fn test_uniqueness_ratio_and_cap() {
        // 1 new word over 4 original words
        assert_eq!(uniqueness("a b c d", "a b c d e"), 25.0);
        // Shares one word, adds many: capped
        assert_eq!(uniqueness("a b", "a x y z w"), 100.0);
    }

    #[tokio::test]
    async fn test_short_text_untouched() {
        let provider = Queue::new(vec![Some("should not be used")]);
        let result = engine(Some(provider.clone())).rewrite("  hi there ", false).await;
        assert_eq!(result.text, "  hi there ");
        assert_eq!(result.passes, 0);
        assert!(provider.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_local_fallback() {
        let result = engine(None).rewrite("Join t.me/oldchan now", true).await;
        assert_eq!(
            result.text,
            "Join t.me/newchan now\n\n🔒 Stay connected with FastVPN: t.me/newchan"
        );
        assert!(!result.text.contains("t.me/oldchan"));
        assert_eq!(result.passes, 1);
    }

    #[tokio::test]
    async fn test_unique_first_pass_is_final() {
        let provider = Queue::new(vec![Some("Completely different fresh wording via t.me/newchan")]);
        let result = engine(Some(provider.clone()))
            .rewrite("Outage in the north region tonight", false)
            .await;
        assert_eq!(result.passes, 1);
        assert_eq!(result.uniqueness, 100.0);

        let prompts = provider.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].system_prompt.as_deref(), Some(SYSTEM_PROMPT));
        assert!(prompts[0].prompt.contains("FastVPN"));
        assert!(prompts[0].prompt.contains("short and urgent"));
        assert!(!prompts[0].prompt.contains("Replace ALL links"));
    }

    #[tokio::test]
    async fn test_low_uniqueness_triggers_enhance() {
        let original = "Outage in the north region tonight";
        let provider = Queue::new(vec![Some(original), Some("FastVPN users in the north stay online")]);
        let result = engine(Some(provider.clone())).rewrite(original, true).await;

        assert_eq!(result.passes, 2);
        assert_eq!(result.text, "FastVPN users in the north stay online");
        let prompts = provider.prompts.lock();
        assert!(prompts[0].prompt.contains("Replace ALL links"));
        assert!(prompts[1].prompt.contains("Do not add a call to action"));
    }

    #[tokio::test]
    async fn test_failed_enhance_keeps_first_pass() {
        let original = "Outage in the north region tonight";
        let provider = Queue::new(vec![Some(original), None]);
        let result = engine(Some(provider)).rewrite(original, false).await;
        assert_eq!(result.passes, 2);
        assert_eq!(result.text, original);
        assert_eq!(result.uniqueness, 0.0);
    }
}
