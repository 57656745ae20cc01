// Telegram Bot API feed client
//
// Reads channel posts with long polling and publishes through sendMessage,
// sendPhoto and sendMediaGroup. HTTP 429 answers become rate-limit signals.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::FeedClient;
use crate::core::errors::{FeedError, FeedResult};
use crate::core::types::{Entity, IncomingItem, MediaRef};
use crate::utils::truncate_text;

const API_BASE: &str = "https://api.telegram.org";
/// sendMediaGroup accepts 2-10 items
const MAX_GROUP_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    channel_post: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    media_group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

pub struct TelegramBotFeed {
    client: reqwest::Client,
    base_url: String,
    token: String,
    poll_timeout: Duration,
    offset: AtomicI64,
}

impl TelegramBotFeed {
    pub fn new(token: impl Into<String>, poll_timeout: Duration) -> FeedResult<Self> {
        // Long polls must not be cut off by the client timeout
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            token: token.into(),
            poll_timeout,
            offset: AtomicI64::new(0),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url.trim_end_matches('/'), self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url.trim_end_matches('/'), self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> FeedResult<T> {
        let response = self.client.post(self.method_url(method)).json(&params).send().await?;
        decode(response).await
    }

    async fn call_multipart<T: DeserializeOwned>(&self, method: &str, form: Form) -> FeedResult<T> {
        let response = self.client.post(self.method_url(method)).multipart(form).send().await?;
        decode(response).await
    }

    /// Wait for new channel posts from `source`
    ///
    /// Returns an empty list when the long poll times out. Acknowledges every
    /// update it saw, including ones from other chats.
    #[instrument(skip_all, fields(source = %source.id))]
    pub async fn poll_updates(&self, source: &Entity) -> FeedResult<Vec<IncomingItem>> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                json!({
                    "offset": self.offset.load(Ordering::SeqCst),
                    "timeout": self.poll_timeout.as_secs(),
                    "allowed_updates": ["channel_post"],
                }),
            )
            .await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.fetch_max(last + 1, Ordering::SeqCst);
        }

        let items: Vec<IncomingItem> = updates
            .into_iter()
            .filter_map(|u| u.channel_post)
            .filter(|m| m.chat.id.to_string() == source.id)
            .map(to_item)
            .collect();

        if !items.is_empty() {
            debug!("Received {} channel posts", items.len());
        }
        Ok(items)
    }

    async fn send_group_chunk(&self, target: &Entity, images: &[Vec<u8>], caption: Option<&str>) -> FeedResult<()> {
        let mut form = Form::new()
            .text("chat_id", target.id.clone())
            .text("media", media_manifest(images.len(), caption).to_string());
        for (i, image) in images.iter().enumerate() {
            form = form.part(format!("photo{}", i), photo_part(image, i)?);
        }
        self.call_multipart::<serde_json::Value>("sendMediaGroup", form).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> FeedResult<T> {
    let status = response.status();
    let body = response.bytes().await?;
    match serde_json::from_slice::<ApiResponse<T>>(&body) {
        Ok(parsed) => into_result(parsed),
        Err(_) if status.as_u16() == 429 => Err(FeedError::RateLimited {
            wait: Duration::from_secs(1),
        }),
        Err(_) => Err(FeedError::Api {
            code: status.as_u16() as i64,
            description: truncate_text(&String::from_utf8_lossy(&body), 200, "..."),
        }),
    }
}

fn into_result<T>(response: ApiResponse<T>) -> FeedResult<T> {
    if response.ok {
        if let Some(result) = response.result {
            return Ok(result);
        }
    }

    let code = response.error_code.unwrap_or(0);
    if code == 429 {
        let seconds = response
            .parameters
            .and_then(|p| p.retry_after)
            .unwrap_or(1);
        return Err(FeedError::RateLimited {
            wait: Duration::from_secs(seconds),
        });
    }

    Err(FeedError::Api {
        code,
        description: response
            .description
            .unwrap_or_else(|| "response without result".to_string()),
    })
}

fn to_item(message: Message) -> IncomingItem {
    // Telegram lists every resolution; keep the biggest
    let attachment = message
        .photo
        .unwrap_or_default()
        .into_iter()
        .max_by_key(|p| p.width as u64 * p.height as u64)
        .map(|p| MediaRef { file_id: p.file_id });

    IncomingItem {
        id: message.message_id,
        group_key: message.media_group_id,
        text: message.text.or(message.caption).unwrap_or_default(),
        attachment,
    }
}

fn media_manifest(count: usize, caption: Option<&str>) -> serde_json::Value {
    let media: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let mut entry = json!({ "type": "photo", "media": format!("attach://photo{}", i) });
            if i == 0 {
                if let Some(caption) = caption.filter(|c| !c.is_empty()) {
                    entry["caption"] = json!(caption);
                }
            }
            entry
        })
        .collect();
    serde_json::Value::Array(media)
}

/// MIME type and file extension sniffed from the bytes
///
/// Edited images are PNG, untouched ones keep whatever the source uploaded.
fn photo_label(bytes: &[u8]) -> (&'static str, &'static str) {
    match image::guess_format(bytes) {
        Ok(format) => (
            format.to_mime_type(),
            format.extensions_str().first().copied().unwrap_or("bin"),
        ),
        Err(_) => ("application/octet-stream", "bin"),
    }
}

fn photo_part(image: &[u8], index: usize) -> FeedResult<Part> {
    let (mime, extension) = photo_label(image);
    Ok(Part::bytes(image.to_vec())
        .file_name(format!("photo{}.{}", index, extension))
        .mime_str(mime)?)
}

#[async_trait]
impl FeedClient for TelegramBotFeed {
    async fn get_entity(&self, id: &str) -> FeedResult<Entity> {
        let chat: Chat = self.call("getChat", json!({ "chat_id": id })).await?;
        let title = chat
            .title
            .or(chat.username)
            .unwrap_or_else(|| id.to_string());
        info!("Resolved {} as '{}' ({})", id, title, chat.id);
        Ok(Entity {
            id: chat.id.to_string(),
            title,
        })
    }

    async fn download_media(&self, item: &IncomingItem) -> FeedResult<Vec<u8>> {
        let media = item
            .attachment
            .as_ref()
            .ok_or(FeedError::NoMedia { item_id: item.id })?;

        let file: TelegramFile = self.call("getFile", json!({ "file_id": media.file_id })).await?;
        let path = file.file_path.ok_or(FeedError::Api {
            code: 0,
            description: format!("file {} has no download path", media.file_id),
        })?;

        let bytes = self
            .client
            .get(self.file_url(&path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!("Downloaded {} bytes for item {}", bytes.len(), item.id);
        Ok(bytes.to_vec())
    }

    async fn send_text(&self, target: &Entity, text: &str) -> FeedResult<()> {
        self.call::<serde_json::Value>("sendMessage", json!({ "chat_id": target.id, "text": text }))
            .await?;
        Ok(())
    }

    async fn send_single_image(&self, target: &Entity, image: &[u8], caption: &str) -> FeedResult<()> {
        let mut form = Form::new()
            .text("chat_id", target.id.clone())
            .part("photo", photo_part(image, 0)?);
        if !caption.is_empty() {
            form = form.text("caption", caption.to_string());
        }
        self.call_multipart::<serde_json::Value>("sendPhoto", form).await?;
        Ok(())
    }

    async fn send_image_group(&self, target: &Entity, images: &[Vec<u8>], caption: &str) -> FeedResult<()> {
        for (n, chunk) in images.chunks(MAX_GROUP_SIZE).enumerate() {
            let chunk_caption = (n == 0).then_some(caption);
            if chunk.len() == 1 {
                // A lone leftover photo cannot form a media group
                self.send_single_image(target, &chunk[0], chunk_caption.unwrap_or("")).await?;
            } else {
                self.send_group_chunk(target, chunk, chunk_caption).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_retry_after() {
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#,
        )
        .unwrap();
        match into_result(response) {
            Err(FeedError::RateLimited { wait }) => assert_eq!(wait, Duration::from_secs(7)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_api_error() {
        let response: ApiResponse<serde_json::Value> =
            serde_json::from_str(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
                .unwrap();
        assert!(matches!(into_result(response), Err(FeedError::Api { code: 400, .. })));
    }

    #[test]
    fn test_channel_post_to_item() {
        let update: Update = serde_json::from_str(
            r#"{"update_id":10,"channel_post":{"message_id":55,"chat":{"id":-100123,"title":"Src"},
                "caption":"Join t.me/oldchan","media_group_id":"g1",
                "photo":[{"file_id":"small","width":90,"height":60},
                         {"file_id":"big","width":1280,"height":853},
                         {"file_id":"mid","width":320,"height":213}]}}"#,
        )
        .unwrap();
        let item = to_item(update.channel_post.unwrap());
        assert_eq!(item.id, 55);
        assert_eq!(item.group_key.as_deref(), Some("g1"));
        assert_eq!(item.text, "Join t.me/oldchan");
        assert_eq!(item.attachment.unwrap().file_id, "big");
    }

    #[test]
    fn test_text_post_has_no_attachment() {
        let message: Message =
            serde_json::from_str(r#"{"message_id":1,"chat":{"id":5},"text":"plain"}"#).unwrap();
        let item = to_item(message);
        assert_eq!(item.text, "plain");
        assert!(item.attachment.is_none());
        assert!(item.group_key.is_none());
    }

    #[test]
    fn test_media_manifest_caption_on_first() {
        let manifest = media_manifest(3, Some("hello"));
        assert_eq!(manifest[0]["caption"], "hello");
        assert_eq!(manifest[2]["media"], "attach://photo2");
        assert!(manifest[1].get("caption").is_none());

        let bare = media_manifest(2, None);
        assert!(bare[0].get("caption").is_none());
    }

    #[test]
    fn test_urls() {
        let feed = TelegramBotFeed::new("123:abc", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://localhost:8081/");
        assert_eq!(feed.method_url("getMe"), "http://localhost:8081/bot123:abc/getMe");
        assert_eq!(feed.file_url("photos/a.jpg"), "http://localhost:8081/file/bot123:abc/photos/a.jpg");
    }

    #[test]
    fn test_photo_label_follows_content() {
        let png = crate::utils::encode_png(&image::RgbaImage::new(2, 2)).unwrap();
        assert_eq!(photo_label(&png), ("image/png", "png"));

        let jpeg_header = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(photo_label(&jpeg_header), ("image/jpeg", "jpg"));

        assert_eq!(photo_label(b"not an image"), ("application/octet-stream", "bin"));
        assert!(photo_part(&jpeg_header, 3).is_ok());
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        let feed = TelegramBotFeed::new("123456:SECRET_TOKEN", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");

        let err = feed.get_entity("@x").await.unwrap_err();
        assert!(matches!(err, FeedError::Transport(_)));
        assert!(!err.to_string().contains("SECRET_TOKEN"));
    }

    #[tokio::test]
    async fn test_download_without_media() {
        let feed = TelegramBotFeed::new("t", Duration::from_secs(1)).unwrap();
        let result = feed.download_media(&IncomingItem::text(9, "no photo")).await;
        assert!(matches!(result, Err(FeedError::NoMedia { item_id: 9 })));
    }
}
