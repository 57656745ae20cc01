use crate::core::errors::ConfigError;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Longest caption the target platform accepts on a media post
pub const CAPTION_LIMIT: usize = 1024;

/// Feed endpoints
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub bot_token: String,
    pub source_channel: String,
    pub target_channel: String,
    pub poll_timeout: Duration,
}

/// Branding injected into rewritten posts and images
#[derive(Debug, Clone)]
pub struct BrandingConfig {
    pub target_link: String,
    pub brand_name: String,
    pub style: String,
}

/// Credentials and parameters for one generation backend
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub model: String,
}

/// Text generation configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Provider tried first on startup (openai, deepseek, xai, cerebras, gemini, huggingface)
    pub primary: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub probe_on_startup: bool,
    pub openai: Option<ProviderCredentials>,
    pub deepseek: Option<ProviderCredentials>,
    pub xai: Option<ProviderCredentials>,
    pub cerebras: Option<ProviderCredentials>,
    pub gemini_keys: Vec<String>,
    pub gemini_model: String,
    pub huggingface: Option<ProviderCredentials>,
}

/// OCR and image editing configuration
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub ocr_language: String,
    pub old_link_pattern: String,
    pub tesseract_cmd: String,
    pub font_paths: Vec<PathBuf>,
}

/// Timing of the coalescer and the publisher
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub group_debounce: Duration,
    pub publish_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub feed: FeedConfig,
    pub branding: BrandingConfig,
    pub generation: GenerationConfig,
    pub image: ImageConfig,
    pub schedule: ScheduleConfig,
    pub log: LogConfig,
}

const DEFAULT_FONT_PATHS: &[&str] = &[
    "fonts/relay.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "C:\\Windows\\Fonts\\consola.ttf",
];

impl Config {
    /// Load from the process environment (and `.env` if present), then validate
    pub fn new() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Self::load_from(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an explicit variable map, then validate
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let config = Self::load_from(|name| vars.get(name).cloned())?;
        config.validate()?;
        Ok(config)
    }

    /// Load for offline tools: feed credentials are not required
    pub fn without_feed() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Self::load_from(|name| env::var(name).ok())?;
        config.link_regex()?;
        Ok(config)
    }

    fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = |key_var: &str, model_var: &str, default_model: &str| {
            get(key_var).map(|api_key| ProviderCredentials {
                api_key,
                model: get(model_var).unwrap_or_else(|| default_model.to_string()),
            })
        };

        let log_level = get("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let font_paths = get("FONT_PATHS")
            .map(|paths| {
                paths
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect());

        Ok(Self {
            feed: FeedConfig {
                bot_token: get("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
                source_channel: get("SOURCE_CHANNEL").unwrap_or_default(),
                target_channel: get("TARGET_CHANNEL").unwrap_or_default(),
                poll_timeout: Duration::from_secs(parse(&get, "POLL_TIMEOUT_SECONDS", 30)?),
            },
            branding: BrandingConfig {
                target_link: get("YOUR_LINK").unwrap_or_else(|| "t.me/your_channel".to_string()),
                brand_name: get("YOUR_BRAND_NAME").unwrap_or_else(|| "Your VPN".to_string()),
                style: get("CHANNEL_STYLE").unwrap_or_else(|| {
                    "Informative posts about internet blocking, focused on getting around it with a VPN"
                        .to_string()
                }),
            },
            generation: GenerationConfig {
                primary: get("LLM_PROVIDER")
                    .map(|p| p.to_lowercase())
                    .unwrap_or_else(|| "deepseek".to_string()),
                temperature: parse(&get, "LLM_TEMPERATURE", 0.7)?,
                max_tokens: parse(&get, "LLM_MAX_TOKENS", 1000)?,
                timeout: Duration::from_secs(parse(&get, "LLM_TIMEOUT_SECONDS", 60)?),
                probe_on_startup: parse(&get, "LLM_PROBE", true)?,
                openai: credentials("OPENAI_API_KEY", "OPENAI_MODEL", "gpt-4o-mini"),
                deepseek: credentials("DEEPSEEK_API_KEY", "DEEPSEEK_MODEL", "deepseek-chat"),
                xai: credentials("XAI_API_KEY", "XAI_MODEL", "grok-2-latest"),
                cerebras: credentials("CEREBRAS_API_KEY", "CEREBRAS_MODEL", "llama3.1-8b"),
                gemini_keys: get("GEMINI_API_KEYS")
                    .map(|keys| {
                        keys.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
                huggingface: credentials(
                    "HF_API_TOKEN",
                    "HF_MODEL_URL",
                    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.3",
                ),
            },
            image: ImageConfig {
                ocr_language: get("OCR_LANGUAGE").unwrap_or_else(|| "rus+eng".to_string()),
                old_link_pattern: get("OLD_LINK_PATTERN")
                    .unwrap_or_else(|| r"t\.me/na_svyazi_helpdesk|t\.me/nasvyazi".to_string()),
                tesseract_cmd: get("TESSERACT_CMD").unwrap_or_else(|| "tesseract".to_string()),
                font_paths,
            },
            schedule: ScheduleConfig {
                group_debounce: Duration::from_millis(parse(&get, "GROUP_DEBOUNCE_MS", 2000)?),
                publish_delay: Duration::from_millis(parse(&get, "PUBLISH_DELAY_MS", 2000)?),
            },
            log: LogConfig { level: log_level },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.bot_token.is_empty() {
            return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN"));
        }
        if self.feed.source_channel.is_empty() {
            return Err(ConfigError::Missing("SOURCE_CHANNEL"));
        }
        if self.feed.target_channel.is_empty() {
            return Err(ConfigError::Missing("TARGET_CHANNEL"));
        }

        self.link_regex()?;

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::InvalidTemperature(self.generation.temperature));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                name: "LLM_MAX_TOKENS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.generation.timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("LLM_TIMEOUT_SECONDS"));
        }
        if self.schedule.group_debounce.is_zero() {
            return Err(ConfigError::ZeroDuration("GROUP_DEBOUNCE_MS"));
        }

        Ok(())
    }

    /// Case-insensitive matcher for the links that get replaced
    pub fn link_regex(&self) -> Result<Regex, ConfigError> {
        Ok(regex::RegexBuilder::new(&self.image.old_link_pattern)
            .case_insensitive(true)
            .build()?)
    }

    pub fn log_level(&self) -> Level {
        self.log.level
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("SOURCE_CHANNEL", "@source"),
            ("TARGET_CHANNEL", "@target"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_map(&base_vars()).unwrap();
        assert_eq!(config.generation.primary, "deepseek");
        assert_eq!(config.schedule.group_debounce, Duration::from_secs(2));
        assert_eq!(config.schedule.publish_delay, Duration::from_secs(2));
        assert_eq!(config.image.ocr_language, "rus+eng");
        assert!(config.generation.openai.is_none());
        assert_eq!(config.log_level(), Level::INFO);
    }

    #[test]
    fn test_missing_target_channel() {
        let mut vars = base_vars();
        vars.remove("TARGET_CHANNEL");
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::Missing("TARGET_CHANNEL"))
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut vars = base_vars();
        vars.insert("OLD_LINK_PATTERN".to_string(), "t.me/(unclosed".to_string());
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_unparsable_number_rejected() {
        let mut vars = base_vars();
        vars.insert("LLM_TEMPERATURE".to_string(), "warm".to_string());
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::Invalid { name: "LLM_TEMPERATURE", .. })
        ));
    }

    #[test]
    fn test_temperature_range() {
        let mut vars = base_vars();
        vars.insert("LLM_TEMPERATURE".to_string(), "3.5".to_string());
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_provider_credentials_and_keys() {
        let mut vars = base_vars();
        vars.insert("OPENAI_API_KEY".to_string(), "sk-1".to_string());
        vars.insert("GEMINI_API_KEYS".to_string(), "k1, k2,,k3".to_string());
        let config = Config::from_map(&vars).unwrap();
        assert_eq!(
            config.generation.openai,
            Some(ProviderCredentials {
                api_key: "sk-1".to_string(),
                model: "gpt-4o-mini".to_string(),
            })
        );
        assert_eq!(config.generation.gemini_keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_link_regex_is_case_insensitive() {
        let mut vars = base_vars();
        vars.insert("OLD_LINK_PATTERN".to_string(), r"t\.me/oldchan".to_string());
        let config = Config::from_map(&vars).unwrap();
        assert!(config.link_regex().unwrap().is_match("T.ME/OldChan"));
    }

    #[test]
    fn test_zero_debounce_rejected() {
        let mut vars = base_vars();
        vars.insert("GROUP_DEBOUNCE_MS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::ZeroDuration("GROUP_DEBOUNCE_MS"))
        ));
    }
}
