// Library exports for the post relay
//
// Items flow: feed -> orchestration (coalescer, worker) -> pipeline (rewrite,
// images, publish) -> feed

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod pipeline;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{ConfigError, DetectionError, FeedError, GenerationError, PipelineError, RenderingError},
    types::{
        Entity, IncomingItem, MediaRef, OutgoingPost, PostKind, PostOutcome, ProcessedImage,
        RewriteResult, TextRegion,
    },
};

pub use middleware::ApiKeyPool;

pub use orchestration::{GroupCoalescer, RelayService};

pub use pipeline::{ImagePipeline, PostPipeline, RegionEditor};

pub use services::{FallbackTextGenerator, FeedClient, GenerationProvider, RewriteEngine};

pub use utils::{Metrics, MetricsSnapshot};
