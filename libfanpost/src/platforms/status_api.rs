//! Mastodon-compatible status API
//!
//! Mastodon and Pixelfed share one adapter: both take multipart media
//! uploads followed by `POST /api/v1/statuses`. They differ in the media
//! endpoint, the image limit, the visibility sent, and whether a post without
//! images is allowed at all.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::accounts::ConnectedAccount;
use crate::compress::CompressionBudget;
use crate::config::{Config, HttpConfig, StatusApiConfig};
use crate::error::PlatformError;
use crate::platforms::{
    build_http_client, check_response, compress_for_upload, normalize_instance_url,
    single_result, PlatformAdapter, PlatformKind,
};
use crate::retry::RetryPolicy;
use crate::types::{MediaImage, PlatformPostResult, Post, Visibility};

/// Flavour of status API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusApiVariant {
    /// Mastodon: text-only posts allowed, up to 4 images
    General,
    /// Pixelfed: at least one image, up to 10, always public
    PhotoRequired,
}

impl StatusApiVariant {
    fn kind(self) -> PlatformKind {
        match self {
            StatusApiVariant::General => PlatformKind::Mastodon,
            StatusApiVariant::PhotoRequired => PlatformKind::Pixelfed,
        }
    }

    fn media_path(self) -> &'static str {
        match self {
            StatusApiVariant::General => "/api/v2/media",
            StatusApiVariant::PhotoRequired => "/api/v1/media",
        }
    }

    fn default_max_images(self) -> usize {
        match self {
            StatusApiVariant::General => 4,
            StatusApiVariant::PhotoRequired => 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaAttachment {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    url: Option<String>,
    uri: Option<String>,
}

/// Adapter for Mastodon-compatible servers
pub struct StatusApiAdapter {
    variant: StatusApiVariant,
    http: HttpConfig,
    budget: CompressionBudget,
    max_images: usize,
    upload_retry: RetryPolicy,
}

impl StatusApiAdapter {
    pub fn new(variant: StatusApiVariant, config: &Config, section: &StatusApiConfig) -> Self {
        Self {
            variant,
            http: config.http.clone(),
            budget: config.compression,
            max_images: section
                .max_images
                .unwrap_or_else(|| variant.default_max_images()),
            upload_retry: section.upload_retry(),
        }
    }

    pub fn mastodon(config: &Config) -> Self {
        Self::new(StatusApiVariant::General, config, &config.mastodon)
    }

    pub fn pixelfed(config: &Config) -> Self {
        Self::new(StatusApiVariant::PhotoRequired, config, &config.pixelfed)
    }

    fn visibility(&self, post: &Post) -> Visibility {
        match self.variant {
            StatusApiVariant::General => post.visibility,
            StatusApiVariant::PhotoRequired => Visibility::Public,
        }
    }

    async fn upload_media(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        token: &str,
        image: &MediaImage,
    ) -> Result<String, PlatformError> {
        let compressed = compress_for_upload(image, &self.budget).await?;
        let mime = image.mime_str();
        let label = format!("{} upload of {}", self.variant.kind(), image.file_name);
        let url = format!("{}{}", base_url, self.variant.media_path());
        let (compressed, url) = (&compressed, url.as_str());

        let attachment = self
            .upload_retry
            .run(&label, move || async move {
                // A multipart form is consumed by send, so each attempt builds its own
                let part = Part::bytes(compressed.bytes.clone())
                    .file_name(image.file_name.clone())
                    .mime_str(mime)?;
                let form = Form::new()
                    .part("file", part)
                    .text("description", image.file_name.clone());

                let response = client
                    .post(url)
                    .bearer_auth(token)
                    .multipart(form)
                    .send()
                    .await?;
                let attachment: MediaAttachment = check_response(response).await?.json().await?;
                Ok::<_, PlatformError>(attachment)
            })
            .await
            .map_err(|exhausted| PlatformError::Upload {
                platform: self.variant.kind().to_string(),
                image: image.file_name.clone(),
                attempts: exhausted.attempts,
                reason: exhausted.error.to_string(),
            })?;

        debug!("Uploaded {} as media {}", image.file_name, attachment.id);
        Ok(attachment.id)
    }

    async fn publish(
        &self,
        post: &Post,
        account: &ConnectedAccount,
    ) -> Result<PlatformPostResult, PlatformError> {
        let kind = self.variant.kind();
        let instance = account
            .instance
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| PlatformError::ClientInit(format!("{} account has no instance", kind)))?;
        let token = account
            .token()
            .ok_or_else(|| PlatformError::ClientInit(format!("{} account has no access token", kind)))?;

        if self.variant == StatusApiVariant::PhotoRequired && post.images.is_empty() {
            return Err(PlatformError::Validation(format!(
                "{} requires at least one image",
                kind
            )));
        }

        let base_url = normalize_instance_url(instance);
        let client = build_http_client(&self.http)?;

        let mut media_ids = Vec::new();
        for image in post.images.iter().take(self.max_images) {
            media_ids.push(self.upload_media(&client, &base_url, token, image).await?);
        }

        let response = client
            .post(format!("{}/api/v1/statuses", base_url))
            .bearer_auth(token)
            .json(&json!({
                "status": post.message,
                "media_ids": media_ids,
                "sensitive": post.nsfw,
                "visibility": self.visibility(post),
            }))
            .send()
            .await?;
        let status: Status = check_response(response).await?.json().await?;

        let url = status.url.or(status.uri);
        info!("Posted to {} on {}: {}", kind, base_url, status.id);

        Ok(PlatformPostResult::success(
            account,
            "Successfully posted",
            url,
            Some(status.id),
        ))
    }
}

#[async_trait]
impl PlatformAdapter for StatusApiAdapter {
    fn kind(&self) -> PlatformKind {
        self.variant.kind()
    }

    async fn create_post(
        &self,
        post: &Post,
        account: &ConnectedAccount,
    ) -> Vec<PlatformPostResult> {
        single_result(account, self.publish(post, account).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::test_support::png_image;
    use serde_json::Value;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account(platform: &str, server: &MockServer) -> ConnectedAccount {
        ConnectedAccount::new(platform)
            .with_handle("alice")
            .with_instance(server.uri())
            .with_access_token("token-123")
    }

    fn status_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "109",
            "url": "https://example.social/@alice/109"
        }))
    }

    async fn status_body(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        let request = requests
            .iter()
            .find(|r| r.url.path() == "/api/v1/statuses")
            .unwrap();
        serde_json::from_slice(&request.body).unwrap()
    }

    #[tokio::test]
    async fn test_mastodon_text_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(status_response())
            .expect(1)
            .mount(&server)
            .await;

        let adapter = StatusApiAdapter::mastodon(&Config::default());
        let post = Post::new("toot".to_string()).nsfw(true);
        let results = adapter.create_post(&post, &account("mastodon", &server)).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].is_success(), "{}", results[0].message());
        assert_eq!(results[0].post_url(), Some("https://example.social/@alice/109"));
        assert_eq!(results[0].external_post_id(), Some("109"));

        let body = status_body(&server).await;
        assert_eq!(body["status"], "toot");
        assert_eq!(body["sensitive"], true);
        assert_eq!(body["media_ids"], json!([]));
    }

    #[tokio::test]
    async fn test_mastodon_uploads_at_most_four_images() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(status_response())
            .mount(&server)
            .await;

        let images = (0..5).map(|i| png_image(&format!("{}.png", i))).collect();
        let adapter = StatusApiAdapter::mastodon(&Config::default());
        let post = Post::new("album".to_string()).with_images(images);
        let results = adapter.create_post(&post, &account("mastodon", &server)).await;

        assert!(results[0].is_success(), "{}", results[0].message());
        let body = status_body(&server).await;
        assert_eq!(body["media_ids"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_mastodon_failed_upload_aborts_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/media"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unprocessable"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(status_response())
            .expect(0)
            .mount(&server)
            .await;

        let adapter = StatusApiAdapter::mastodon(&Config::default());
        let post = Post::new("x".to_string()).with_images(vec![png_image("cat.png")]);
        let results = adapter.create_post(&post, &account("mastodon", &server)).await;

        assert!(!results[0].is_success());
        assert!(results[0].message().contains("cat.png"));
        assert!(results[0].message().contains("HTTP 422"));
    }

    #[tokio::test]
    async fn test_pixelfed_requires_an_image() {
        let server = MockServer::start().await;

        let adapter = StatusApiAdapter::pixelfed(&Config::default());
        let post = Post::new("no pictures".to_string());
        let results = adapter.create_post(&post, &account("pixelfed", &server)).await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].is_success());
        assert!(results[0].message().starts_with("Validation failed"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pixelfed_posts_publicly_with_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "p1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(status_response())
            .mount(&server)
            .await;

        let adapter = StatusApiAdapter::pixelfed(&Config::default());
        let mut post = Post::new("photo".to_string()).with_images(vec![png_image("sunset.png")]);
        post.visibility = Visibility::Private;
        let results = adapter.create_post(&post, &account("pixelfed", &server)).await;

        assert!(results[0].is_success(), "{}", results[0].message());
        let body = status_body(&server).await;
        assert_eq!(body["visibility"], "public");
        assert_eq!(body["media_ids"], json!(["p1"]));
    }

    #[tokio::test]
    async fn test_missing_token_is_client_init_error() {
        let server = MockServer::start().await;
        let account = ConnectedAccount::new("mastodon").with_instance(server.uri());

        let adapter = StatusApiAdapter::mastodon(&Config::default());
        let results = adapter
            .create_post(&Post::new("hi".to_string()), &account)
            .await;

        assert!(results[0].message().starts_with("Failed to initialize client"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_instance_is_client_init_error() {
        let account = ConnectedAccount::new("pixelfed").with_access_token("t");

        let adapter = StatusApiAdapter::pixelfed(&Config::default());
        let results = adapter
            .create_post(&Post::new("hi".to_string()), &account)
            .await;

        assert!(results[0].message().contains("no instance"));
    }

    #[tokio::test]
    async fn test_status_rejection_carries_remote_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let adapter = StatusApiAdapter::mastodon(&Config::default());
        let results = adapter
            .create_post(&Post::new("hi".to_string()), &account("mastodon", &server))
            .await;

        assert_eq!(results[0].message(), "HTTP 503: maintenance");
    }

    #[test]
    fn test_configured_image_limit_overrides_default() {
        let mut config = Config::default();
        config.pixelfed.max_images = Some(3);

        assert_eq!(StatusApiAdapter::pixelfed(&config).max_images, 3);
        assert_eq!(StatusApiAdapter::mastodon(&config).max_images, 4);
        assert_eq!(StatusApiAdapter::mastodon(&config).kind(), PlatformKind::Mastodon);
    }
}
