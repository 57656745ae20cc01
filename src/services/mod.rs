pub mod detection;
pub mod feed;
pub mod generation;
pub mod inpainting;
pub mod ocr;
pub mod rendering;
pub mod rewrite;

// Re-export commonly used services
pub use detection::RegionDetector;
pub use feed::{FeedClient, TelegramBotFeed};
pub use generation::{FallbackTextGenerator, GenerationProvider, GenerationRequest};
pub use inpainting::{Inpainter, MarchingInpainter};
pub use ocr::{OcrEngine, TesseractEngine};
pub use rendering::TextRenderer;
pub use rewrite::RewriteEngine;
