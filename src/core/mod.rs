pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, CAPTION_LIMIT};
pub use errors::{
    ConfigError, DetectionError, FeedError, GenerationError, PipelineError, RenderingError,
};
pub use types::{
    Entity, IncomingItem, MediaRef, OutgoingPost, PostKind, PostOutcome, ProcessedImage,
    RewriteResult, TextRegion,
};
