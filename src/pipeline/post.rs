// Post pipeline: one flushed group in, at most one published post out

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::CAPTION_LIMIT;
use crate::core::errors::{FeedError, FeedResult, PipelineError};
use crate::core::types::{Entity, IncomingItem, OutgoingPost, PostOutcome};
use crate::pipeline::images::ImagePipeline;
use crate::services::feed::FeedClient;
use crate::services::rewrite::RewriteEngine;
use crate::utils::{count_words, extract_links, has_links, truncate_text, Metrics};

/// Pause after every publish so the target is not flooded
pub const DEFAULT_PUBLISH_DELAY: Duration = Duration::from_secs(2);
/// Text-only posts shorter than this are not worth publishing
const MIN_TEXT_POST_CHARS: usize = 3;

pub struct PostPipeline {
    feed: Arc<dyn FeedClient>,
    target: Entity,
    rewriter: RewriteEngine,
    images: Arc<ImagePipeline>,
    publish_delay: Duration,
    metrics: Metrics,
}

impl PostPipeline {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        target: Entity,
        rewriter: RewriteEngine,
        images: Arc<ImagePipeline>,
        metrics: Metrics,
    ) -> Self {
        Self {
            feed,
            target,
            rewriter,
            images,
            publish_delay: DEFAULT_PUBLISH_DELAY,
            metrics,
        }
    }

    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    #[instrument(skip_all, fields(items = items.len(), first_id = items.first().map(|i| i.id)))]
    pub async fn handle(&self, items: Vec<IncomingItem>) -> PostOutcome {
        let Some(first) = items.first() else {
            self.metrics.record_skipped();
            return PostOutcome::Skipped;
        };

        let caption = self.prepare_text(&first.text).await;
        let images = self.collect_images(&items).await;

        let Some(post) = compose(caption, images) else {
            info!("Nothing worth publishing, skipped");
            self.metrics.record_skipped();
            return PostOutcome::Skipped;
        };

        let kind = post.kind();
        match self.publish(&post).await {
            Ok(()) => {
                info!("Published {:?} to {}", kind, self.target.title);
                self.metrics.record_published();
                tokio::time::sleep(self.publish_delay).await;
                PostOutcome::Published(kind)
            }
            Err(e) => {
                error!("{}", PipelineError::from(e));
                self.metrics.record_failed();
                PostOutcome::Failed
            }
        }
    }

    /// Rewrite the representative text and fit it into a caption
    async fn prepare_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let links = extract_links(text);
        debug!("Source text: {} words, links {:?}", count_words(text), links);

        let result = self.rewriter.rewrite(text, has_links(text)).await;
        info!(
            "Rewrite done: {:.1}% unique, {} pass(es)",
            result.uniqueness, result.passes
        );

        let length = result.text.chars().count();
        if length > CAPTION_LIMIT {
            info!("Text has {} chars, truncating to {}", length, CAPTION_LIMIT);
            truncate_text(&result.text, CAPTION_LIMIT, "...")
        } else {
            result.text
        }
    }

    /// Download and clean every attached image, in item order
    async fn collect_images(&self, items: &[IncomingItem]) -> Vec<Vec<u8>> {
        let mut images = Vec::new();

        for item in items.iter().filter(|i| i.has_image()) {
            let raw = match self.feed.download_media(item).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Image of item {} skipped, download failed: {}", item.id, e);
                    continue;
                }
            };

            // The worker owns its copy; the original is published if it dies
            match self.images.process_async(raw.clone()).await {
                Ok(processed) => {
                    self.metrics.record_image(processed.modified);
                    if processed.modified {
                        info!("Image of item {} modified", item.id);
                    }
                    images.push(processed.bytes);
                }
                Err(source) => {
                    warn!(
                        "{}, publishing it unmodified",
                        PipelineError::ImageFailed {
                            item_id: item.id,
                            source
                        }
                    );
                    self.metrics.record_image(false);
                    images.push(raw);
                }
            }
        }

        images
    }

    /// Send, sleeping through rate limits and re-sending the same payload
    async fn publish(&self, post: &OutgoingPost) -> FeedResult<()> {
        loop {
            let result = match post {
                OutgoingPost::Text(text) => self.feed.send_text(&self.target, text).await,
                OutgoingPost::SingleImage { image, caption } => {
                    self.feed.send_single_image(&self.target, image, caption).await
                }
                OutgoingPost::ImageGroup { images, caption } => {
                    self.feed.send_image_group(&self.target, images, caption).await
                }
            };

            match result {
                Err(FeedError::RateLimited { wait }) => {
                    warn!("Rate limited, retrying in {}s", wait.as_secs());
                    self.metrics.record_rate_limit_wait();
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}

/// Decide what to publish from the prepared caption and images
pub fn compose(caption: String, mut images: Vec<Vec<u8>>) -> Option<OutgoingPost> {
    match images.len() {
        0 if caption.trim().chars().count() >= MIN_TEXT_POST_CHARS => Some(OutgoingPost::Text(caption)),
        0 => None,
        1 => images.pop().map(|image| OutgoingPost::SingleImage { image, caption }),
        _ => Some(OutgoingPost::ImageGroup { images, caption }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PostKind;

    #[test]
    fn test_compose_variants() {
        assert_eq!(
            compose("hello there".to_string(), Vec::new()),
            Some(OutgoingPost::Text("hello there".to_string()))
        );
        assert_eq!(compose("  a ".to_string(), Vec::new()), None);
        assert_eq!(compose(String::new(), Vec::new()), None);

        let single = compose(String::new(), vec![vec![1]]).unwrap();
        assert_eq!(single.kind(), PostKind::SingleImage);

        let group = compose("c".to_string(), vec![vec![1], vec![2]]).unwrap();
        assert_eq!(
            group,
            OutgoingPost::ImageGroup {
                images: vec![vec![1], vec![2]],
                caption: "c".to_string()
            }
        );
    }
}
