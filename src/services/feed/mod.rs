// Feed client: where items come from and where posts go

pub mod telegram;

use async_trait::async_trait;

use crate::core::errors::FeedResult;
use crate::core::types::{Entity, IncomingItem};

pub use telegram::TelegramBotFeed;

/// Send and download primitives of the publishing platform
///
/// Implementations report throttling as `FeedError::RateLimited` with the
/// wait the platform asked for. They never retry on their own.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn get_entity(&self, id: &str) -> FeedResult<Entity>;

    async fn download_media(&self, item: &IncomingItem) -> FeedResult<Vec<u8>>;

    async fn send_text(&self, target: &Entity, text: &str) -> FeedResult<()>;

    async fn send_single_image(&self, target: &Entity, image: &[u8], caption: &str) -> FeedResult<()>;

    /// One grouped post; the caption is attached to the first image
    async fn send_image_group(&self, target: &Entity, images: &[Vec<u8>], caption: &str) -> FeedResult<()>;
}
