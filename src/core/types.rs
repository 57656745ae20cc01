// Data model shared by the coalescer, the pipelines and the feed client

use serde::{Deserialize, Serialize};

/// Reference to media stored on the feed side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Feed-specific handle used to download the raw bytes
    pub file_id: String,
}

/// One delivery event from the monitored feed
///
/// Immutable once received. Items that belong to the same multi-image post
/// share a `group_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingItem {
    pub id: i64,
    pub group_key: Option<String>,
    pub text: String,
    pub attachment: Option<MediaRef>,
}

impl IncomingItem {
    pub fn text(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            group_key: None,
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_group(mut self, key: impl Into<String>) -> Self {
        self.group_key = Some(key.into());
        self
    }

    pub fn with_attachment(mut self, file_id: impl Into<String>) -> Self {
        self.attachment = Some(MediaRef {
            file_id: file_id.into(),
        });
        self
    }

    pub fn has_image(&self) -> bool {
        self.attachment.is_some()
    }
}

/// Resolved feed destination (channel, chat)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub title: String,
}

/// Text region found by OCR, in pixel space of the source image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub text: String,
    pub confidence: f32,
}

impl TextRegion {
    /// Grow the box by `padding` on every side, clamped to the image
    ///
    /// Returns `(x, y, width, height)`, or `None` when the box does not
    /// intersect the image at all.
    pub fn padded(&self, padding: u32, image_width: u32, image_height: u32) -> Option<[u32; 4]> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let x1 = self.x.saturating_sub(padding);
        let y1 = self.y.saturating_sub(padding);
        let x2 = self
            .x
            .saturating_add(self.width)
            .saturating_add(padding)
            .min(image_width);
        let y2 = self
            .y
            .saturating_add(self.height)
            .saturating_add(padding)
            .min(image_height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some([x1, y1, x2 - x1, y2 - y1])
    }
}

/// Outcome of the image pipeline
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub modified: bool,
}

/// Outcome of the rewrite stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteResult {
    pub text: String,
    /// Word-level difference to the original, 0-100
    pub uniqueness: f64,
    /// Generation passes attempted (0 when the text was left alone)
    pub passes: u8,
}

/// Payload handed to the feed client
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingPost {
    Text(String),
    SingleImage { image: Vec<u8>, caption: String },
    ImageGroup { images: Vec<Vec<u8>>, caption: String },
}

impl OutgoingPost {
    pub fn kind(&self) -> PostKind {
        match self {
            OutgoingPost::Text(_) => PostKind::Text,
            OutgoingPost::SingleImage { .. } => PostKind::SingleImage,
            OutgoingPost::ImageGroup { .. } => PostKind::ImageGroup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PostKind {
    Text,
    SingleImage,
    ImageGroup,
}

/// What the post pipeline did with one flushed group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Published(PostKind),
    Skipped,
    Failed,
}
