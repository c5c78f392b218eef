//! Platform adapters
//!
//! Every destination platform implements [`PlatformAdapter`]. An adapter owns
//! the whole exchange for one account: it builds and authenticates its own
//! HTTP client, compresses and uploads media, creates the post, and turns
//! every failure into an error [`PlatformPostResult`]. Nothing escapes
//! `create_post` except results, which is what lets the orchestrator join
//! adapters without an error path of its own.
//!
//! # Examples
//!
//! ```no_run
//! use libfanpost::accounts::ConnectedAccount;
//! use libfanpost::config::Config;
//! use libfanpost::platforms::{status_api::StatusApiAdapter, PlatformAdapter};
//! use libfanpost::types::Post;
//!
//! # async fn example() {
//! let config = Config::default();
//! let adapter = StatusApiAdapter::mastodon(&config);
//!
//! let account = ConnectedAccount::new("mastodon")
//!     .with_instance("mastodon.social")
//!     .with_access_token("token");
//!
//! let post = Post::new("Hello, fediverse!".to_string());
//! for result in adapter.create_post(&post, &account).await {
//!     println!("{}: {}", result.platform(), result.message());
//! }
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::accounts::ConnectedAccount;
use crate::compress::{compress, CompressedImage, CompressionBudget};
use crate::config::HttpConfig;
use crate::error::{CompressionError, PlatformError};
use crate::types::{MediaImage, PlatformPostResult, Post};

pub mod bluesky;
pub mod lemmy;
pub mod status_api;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Closed set of supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Bluesky,
    Mastodon,
    Lemmy,
    Pixelfed,
}

impl PlatformKind {
    pub fn all() -> [PlatformKind; 4] {
        [
            PlatformKind::Bluesky,
            PlatformKind::Mastodon,
            PlatformKind::Lemmy,
            PlatformKind::Pixelfed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Bluesky => "bluesky",
            PlatformKind::Mastodon => "mastodon",
            PlatformKind::Lemmy => "lemmy",
            PlatformKind::Pixelfed => "pixelfed",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = PlatformError;

    /// Parse a platform tag; surrounding whitespace and case are ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bluesky" => Ok(PlatformKind::Bluesky),
            "mastodon" => Ok(PlatformKind::Mastodon),
            "lemmy" => Ok(PlatformKind::Lemmy),
            "pixelfed" => Ok(PlatformKind::Pixelfed),
            _ => Err(PlatformError::UnknownPlatform(s.to_string())),
        }
    }
}

/// A destination platform
///
/// Implementations must be cheap to share across concurrent calls: no
/// client, session or token is cached between invocations.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter serves
    fn kind(&self) -> PlatformKind;

    /// Publish `post` through `account`
    ///
    /// Returns one result for single-destination platforms and one result
    /// per community for forum platforms. Never returns an empty vector
    /// and never propagates an error.
    async fn create_post(&self, post: &Post, account: &ConnectedAccount)
        -> Vec<PlatformPostResult>;
}

/// Ensure an instance URL has a scheme and no trailing slash
///
/// An explicit `http://` prefix is kept so local test servers work.
pub fn normalize_instance_url(instance: &str) -> String {
    let trimmed = instance.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Build a fresh HTTP client for one adapter invocation
pub(crate) fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, PlatformError> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| PlatformError::ClientInit(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-2xx response to [`PlatformError::RemoteApi`] carrying its body
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    Err(PlatformError::RemoteApi {
        status: status.as_u16(),
        body,
    })
}

/// Compress an image on the blocking pool
///
/// The encoder loop is CPU-bound, so it runs off the async workers; the
/// bytes are cloned into the task.
pub(crate) async fn compress_for_upload(
    image: &MediaImage,
    budget: &CompressionBudget,
) -> Result<CompressedImage, CompressionError> {
    let data = image.data.clone();
    let mime = image.mime_str();
    let budget = *budget;

    tokio::task::spawn_blocking(move || compress(&data, mime, &budget))
        .await
        .map_err(|e| CompressionError::Aborted(e.to_string()))?
}

/// Collapse an adapter's inner `Result` into a single-destination result
pub(crate) fn single_result(
    account: &ConnectedAccount,
    outcome: Result<PlatformPostResult, PlatformError>,
) -> Vec<PlatformPostResult> {
    match outcome {
        Ok(result) => vec![result],
        Err(error) => {
            tracing::warn!(
                "Post failed on {} ({}): {}",
                account.platform,
                account.handle.as_deref().unwrap_or("-"),
                error
            );
            vec![PlatformPostResult::from_error(account, &error)]
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kind_parse() {
        assert_eq!("bluesky".parse::<PlatformKind>().unwrap(), PlatformKind::Bluesky);
        assert_eq!(" Mastodon ".parse::<PlatformKind>().unwrap(), PlatformKind::Mastodon);
        assert_eq!("LEMMY".parse::<PlatformKind>().unwrap(), PlatformKind::Lemmy);
        assert_eq!("pixelfed".parse::<PlatformKind>().unwrap(), PlatformKind::Pixelfed);
    }

    #[test]
    fn test_platform_kind_unknown() {
        let error = "myspace".parse::<PlatformKind>().unwrap_err();
        assert!(matches!(error, PlatformError::UnknownPlatform(ref tag) if tag == "myspace"));
    }

    #[test]
    fn test_platform_kind_display_roundtrips() {
        for kind in PlatformKind::all() {
            assert_eq!(kind.to_string().parse::<PlatformKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_normalize_instance_url() {
        assert_eq!(
            normalize_instance_url("mastodon.social"),
            "https://mastodon.social"
        );
        assert_eq!(
            normalize_instance_url("https://mastodon.social/"),
            "https://mastodon.social"
        );
        assert_eq!(
            normalize_instance_url("http://127.0.0.1:8080"),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&HttpConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_compress_for_upload_rejects_unknown_mime() {
        let image = MediaImage::new("notes.txt", b"plain text".to_vec());
        let error = compress_for_upload(&image, &CompressionBudget::default())
            .await
            .unwrap_err();
        assert!(matches!(error, CompressionError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_single_result_converts_error() {
        let account = ConnectedAccount::new("mastodon").with_handle("alice");
        let results = single_result(
            &account,
            Err(PlatformError::Validation("nothing to post".to_string())),
        );

        assert_eq!(results.len(), 1);
        assert!(!results[0].is_success());
        assert_eq!(results[0].message(), "Validation failed: nothing to post");
        assert_eq!(results[0].handle(), Some("alice"));
    }
}
