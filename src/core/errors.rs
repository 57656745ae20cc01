// Error types for every stage of the relay
//
// Using thiserror so each stage keeps its own taxonomy:
// - Feed failures carry the rate-limit signal as structured data
// - Image failures separate decode problems from drawing problems
// - Generation failures never leave a provider (they collapse to None there)

use std::time::Duration;
use thiserror::Error;

/// Region detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("OCR backend could not be started ({command}): {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("OCR backend exited with {status}: {stderr}")]
    BackendFailed { status: String, stderr: String },

    #[error("OCR output could not be parsed: {0}")]
    InvalidOutput(String),

    #[error("Image preprocessing failed: {0}")]
    PreprocessingFailed(#[from] image::ImageError),
}

/// Image editing errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("Image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Image could not be encoded: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Mask is {mask_width}x{mask_height} but image is {image_width}x{image_height}")]
    MaskMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Region {x},{y} {width}x{height} lies outside the {image_width}x{image_height} image")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Image task failed: {0}")]
    TaskFailed(String),
}

/// Generation provider errors
///
/// Providers map these to `None` at the trait boundary, they are only
/// surfaced in logs and in provider-level unit tests.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// URL stripped, see the `From` impl
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Provider answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider returned an empty completion")]
    EmptyResponse,

    #[error("Unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("No generation provider is available")]
    NoProviderAvailable,
}

/// Feed client errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Rate limited by the feed, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    /// URL stripped, see the `From` impl
    #[error("Feed transport failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Feed API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Item {item_id} has no media attached")]
    NoMedia { item_id: i64 },
}

/// Post pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Publishing failed: {0}")]
    PublishFailed(#[from] FeedError),

    #[error("Image {item_id} could not be processed: {source}")]
    ImageFailed {
        item_id: i64,
        #[source]
        source: RenderingError,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required variable {0} is not set")]
    Missing(&'static str),

    #[error("Variable {name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("OLD_LINK_PATTERN is not a valid regular expression: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Temperature must be in [0.0, 2.0], got {0}")]
    InvalidTemperature(f32),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

// Request URLs carry credentials (bot token in the path, API keys in queries),
// so they never make it into an error message.
impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Request(e.without_url())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::Transport(e.without_url())
    }
}

pub type DetectionResult<T> = Result<T, DetectionError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
pub type FeedResult<T> = Result<T, FeedError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

impl FeedError {
    /// Wait duration carried by a rate-limit signal
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimited { wait } => Some(*wait),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = FeedError::RateLimited {
            wait: Duration::from_secs(7),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));

        let api = FeedError::Api {
            code: 400,
            description: "Bad Request".to_string(),
        };
        assert_eq!(api.retry_after(), None);
    }

    #[test]
    fn test_rate_limit_message_shows_seconds() {
        let limited = FeedError::RateLimited {
            wait: Duration::from_secs(12),
        };
        assert_eq!(
            limited.to_string(),
            "Rate limited by the feed, retry after 12s"
        );
    }
}
