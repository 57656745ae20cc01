// Entry point: poll the source channel and relay its posts to the target

use post_relay::{
    services::{feed::TelegramBotFeed, generation::build_providers},
    Config, FallbackTextGenerator, FeedClient, FeedError, ImagePipeline, Metrics, PostPipeline,
    RelayService, RewriteEngine,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pause after a polling failure that carries no explicit wait
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new().context("Failed to load configuration")?;

    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "post_relay={},reqwest=warn",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== POST RELAY ===");
    info!(
        "Source: {} -> Target: {} (debounce {}ms, publish delay {}ms)",
        config.feed.source_channel,
        config.feed.target_channel,
        config.schedule.group_debounce.as_millis(),
        config.schedule.publish_delay.as_millis()
    );

    let metrics = Metrics::new();

    // Text generation chain
    let candidates = build_providers(&config.generation);
    let generator = if config.generation.probe_on_startup {
        FallbackTextGenerator::probed(candidates).await
    } else {
        FallbackTextGenerator::new(candidates)
    }
    .with_metrics(metrics.clone());

    if generator.is_enabled() {
        info!("Generation providers: {}", generator.order().join(" -> "));
    } else {
        warn!("No generation provider available, captions use the local rewrite");
    }

    let rewriter = RewriteEngine::new(
        Arc::new(generator),
        config.branding.clone(),
        config.link_regex()?,
    )
    .with_params(config.generation.temperature, config.generation.max_tokens)
    .with_metrics(metrics.clone());

    let images = Arc::new(ImagePipeline::from_config(&config)?);

    // Feed endpoints
    let feed = Arc::new(TelegramBotFeed::new(
        config.feed.bot_token.clone(),
        config.feed.poll_timeout,
    )?);
    let source = feed
        .get_entity(&config.feed.source_channel)
        .await
        .context("Failed to resolve the source channel")?;
    let target = feed
        .get_entity(&config.feed.target_channel)
        .await
        .context("Failed to resolve the target channel")?;
    info!("Relaying '{}' -> '{}'", source.title, target.title);

    let pipeline = PostPipeline::new(feed.clone(), target, rewriter, images, metrics.clone())
        .with_publish_delay(config.schedule.publish_delay);
    let service = RelayService::start(
        Arc::new(pipeline),
        config.schedule.group_debounce,
        metrics.clone(),
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            polled = feed.poll_updates(&source) => match polled {
                Ok(items) => {
                    for item in items {
                        service.on_new_item(item);
                    }
                }
                Err(FeedError::RateLimited { wait }) => {
                    warn!("Polling rate limited, waiting {}s", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!("Polling failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    service.shutdown().await;

    match serde_json::to_string_pretty(&metrics.snapshot()) {
        Ok(json) => info!("Final metrics:\n{}", json),
        Err(e) => warn!("Could not serialize metrics: {}", e),
    }

    Ok(())
}
