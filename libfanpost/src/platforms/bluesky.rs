//! Bluesky platform implementation
//!
//! Talks to the AT Protocol XRPC endpoints of a PDS directly:
//! `com.atproto.server.createSession` for an access token,
//! `com.atproto.repo.uploadBlob` per image, and
//! `com.atproto.repo.createRecord` for the post itself.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::accounts::ConnectedAccount;
use crate::compress::{CompressedImage, CompressionBudget};
use crate::config::{Config, HttpConfig};
use crate::error::PlatformError;
use crate::platforms::{
    build_http_client, check_response, compress_for_upload, normalize_instance_url,
    single_result, PlatformAdapter, PlatformKind,
};
use crate::retry::RetryPolicy;
use crate::types::{MediaImage, PlatformPostResult, Post};

const POST_COLLECTION: &str = "app.bsky.feed.post";
const WEB_BASE: &str = "https://bsky.app";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    blob: Value,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
    cid: String,
}

/// An authenticated session against one PDS, scoped to one call
struct XrpcSession {
    client: reqwest::Client,
    service: String,
    session: Session,
}

impl XrpcSession {
    fn endpoint(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    async fn upload_blob(&self, image: &CompressedImage, mime: &str) -> Result<Value, PlatformError> {
        let response = self
            .client
            .post(self.endpoint("com.atproto.repo.uploadBlob"))
            .bearer_auth(&self.session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(image.bytes.clone())
            .send()
            .await?;

        let uploaded: BlobResponse = check_response(response).await?.json().await?;
        Ok(uploaded.blob)
    }

    async fn create_record(&self, record: Value) -> Result<CreatedRecord, PlatformError> {
        let response = self
            .client
            .post(self.endpoint("com.atproto.repo.createRecord"))
            .bearer_auth(&self.session.access_jwt)
            .json(&json!({
                "repo": self.session.did,
                "collection": POST_COLLECTION,
                "record": record,
            }))
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }
}

/// Bluesky adapter
///
/// Uploads at most `max_images` images, each compressed to the shared
/// budget and retried under the configured upload policy.
pub struct BlueskyAdapter {
    http: HttpConfig,
    budget: CompressionBudget,
    default_service: String,
    max_images: usize,
    upload_retry: RetryPolicy,
}

impl BlueskyAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            http: config.http.clone(),
            budget: config.compression,
            default_service: config.bluesky.service.clone(),
            max_images: config.bluesky.max_images,
            upload_retry: config.bluesky.upload_retry(),
        }
    }

    async fn login(&self, account: &ConnectedAccount) -> Result<XrpcSession, PlatformError> {
        let handle = account
            .handle
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| PlatformError::ClientInit("Bluesky account has no handle".to_string()))?;
        let password = account.password().ok_or_else(|| {
            PlatformError::ClientInit("Bluesky account has no app password".to_string())
        })?;

        let service = normalize_instance_url(
            account.instance.as_deref().unwrap_or(&self.default_service),
        );
        let client = build_http_client(&self.http)?;

        debug!("Creating Bluesky session for {} on {}", handle, service);
        let response = client
            .post(format!("{}/xrpc/com.atproto.server.createSession", service))
            .json(&json!({ "identifier": handle, "password": password }))
            .send()
            .await?;
        let session: Session = check_response(response).await?.json().await?;

        Ok(XrpcSession {
            client,
            service,
            session,
        })
    }

    async fn upload_images(
        &self,
        xrpc: &XrpcSession,
        images: &[MediaImage],
    ) -> Result<Vec<Value>, PlatformError> {
        let mut embedded = Vec::with_capacity(images.len());

        for image in images {
            let compressed = &compress_for_upload(image, &self.budget).await?;
            let mime = image.mime_str();
            let label = format!("Bluesky upload of {}", image.file_name);

            let blob = self
                .upload_retry
                .run(&label, || xrpc.upload_blob(compressed, mime))
                .await
                .map_err(|exhausted| PlatformError::Upload {
                    platform: PlatformKind::Bluesky.to_string(),
                    image: image.file_name.clone(),
                    attempts: exhausted.attempts,
                    reason: exhausted.error.to_string(),
                })?;

            embedded.push(json!({ "alt": image.file_name, "image": blob }));
        }

        Ok(embedded)
    }

    async fn publish(
        &self,
        post: &Post,
        account: &ConnectedAccount,
    ) -> Result<PlatformPostResult, PlatformError> {
        let xrpc = self.login(account).await?;

        let images = &post.images[..post.images.len().min(self.max_images)];
        let embedded = self.upload_images(&xrpc, images).await?;

        let mut record = json!({
            "$type": POST_COLLECTION,
            "text": post.message,
            "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        if !embedded.is_empty() {
            record["embed"] = json!({
                "$type": "app.bsky.embed.images",
                "images": embedded,
            });
        }

        let created = xrpc.create_record(record).await?;
        let url = web_url(&xrpc.session.handle, &created.uri);
        info!("Posted to Bluesky as {}: {}", xrpc.session.handle, created.uri);
        debug!("Bluesky record cid {}", created.cid);

        Ok(PlatformPostResult::success(
            account,
            "Successfully posted",
            Some(url),
            Some(created.uri),
        ))
    }
}

/// Web URL for a record, from its `at://did/collection/rkey` URI
fn web_url(handle: &str, uri: &str) -> String {
    let rkey = uri.rsplit('/').next().unwrap_or(uri);
    format!("{}/profile/{}/post/{}", WEB_BASE, handle, rkey)
}

#[async_trait]
impl PlatformAdapter for BlueskyAdapter {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Bluesky
    }

    async fn create_post(
        &self,
        post: &Post,
        account: &ConnectedAccount,
    ) -> Vec<PlatformPostResult> {
        single_result(account, self.publish(post, account).await)
    }
}
