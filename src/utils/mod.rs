pub mod image_ops;
pub mod metrics;
pub mod text;

// Re-export commonly used items
pub use image_ops::{boosted_grayscale, decode_image, encode_png, rect_mask, run_blocking};
pub use metrics::{Metrics, MetricsSnapshot};
pub use text::{count_words, extract_links, has_links, replace_links, truncate_text, word_set};
