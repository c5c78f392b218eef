//! Core types for Fanpost

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::ConnectedAccount;
use crate::error::PlatformError;

/// Maximum number of images a single post may carry
pub const MAX_POST_IMAGES: usize = 10;

/// One authored message, published unchanged to every target account
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub message: String,
    pub images: Vec<MediaImage>,
    pub nsfw: bool,
    /// Link passed through to link-post platforms (e.g. a hosted image URL)
    pub link_url: Option<String>,
    /// Accepted for completeness; no adapter publishes polls
    pub poll: Option<PollData>,
    pub visibility: Visibility,
    pub created_at: i64,
}

impl Post {
    pub fn new(message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: None,
            message,
            images: Vec::new(),
            nsfw: false,
            link_url: None,
            poll: None,
            visibility: Visibility::Public,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_images(mut self, images: Vec<MediaImage>) -> Self {
        self.images = images;
        self
    }

    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.link_url = Some(url.into());
        self
    }

    pub fn nsfw(mut self, nsfw: bool) -> Self {
        self.nsfw = nsfw;
        self
    }
}

/// Visibility requested for the post on platforms that support it
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Followers,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollOption {
    pub option_text: String,
    #[serde(default)]
    pub vote_count: u32,
}

/// Accepted on a post and carried along; no adapter publishes polls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollData {
    pub question: Option<String>,
    #[serde(default)]
    pub options: Vec<PollOption>,
    pub expires_at: Option<i64>,
}

// ============================================================================
// Media
// ============================================================================

/// Image MIME types recognised by the media layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from a file name such as `photo.JPG`
    pub fn from_file_name(name: &str) -> Option<Self> {
        std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An image attached to a post, already resident in memory
///
/// Adapters only ever borrow these bytes; the image source collaborator
/// produced them and the cleanup collaborator removes the backing file.
#[derive(Clone)]
pub struct MediaImage {
    /// File name, used as alt text/description and in error messages
    pub file_name: String,
    /// Declared MIME type, `None` when the name carried no known extension
    pub mime_type: Option<ImageMimeType>,
    pub data: Vec<u8>,
}

impl MediaImage {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = ImageMimeType::from_file_name(&file_name);
        Self {
            file_name,
            mime_type,
            data,
        }
    }

    /// Declared MIME string, or `application/octet-stream` when unknown
    pub fn mime_str(&self) -> &'static str {
        self.mime_type
            .map(|m| m.as_str())
            .unwrap_or("application/octet-stream")
    }
}

impl std::fmt::Debug for MediaImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one post attempt on one destination
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostOutcome {
    Success,
    Error,
}

impl std::fmt::Display for PostOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of posting to one account (or one forum community)
///
/// Built once by an adapter and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformPostResult {
    platform: String,
    instance: Option<String>,
    handle: Option<String>,
    status: PostOutcome,
    message: String,
    post_url: Option<String>,
    external_post_id: Option<String>,
}

impl PlatformPostResult {
    pub fn success(
        account: &ConnectedAccount,
        message: impl Into<String>,
        post_url: Option<String>,
        external_post_id: Option<String>,
    ) -> Self {
        Self {
            platform: account.platform.clone(),
            instance: account.instance.clone(),
            handle: account.handle.clone(),
            status: PostOutcome::Success,
            message: message.into(),
            post_url,
            external_post_id,
        }
    }

    pub fn error(account: &ConnectedAccount, message: impl Into<String>) -> Self {
        Self {
            platform: account.platform.clone(),
            instance: account.instance.clone(),
            handle: account.handle.clone(),
            status: PostOutcome::Error,
            message: message.into(),
            post_url: None,
            external_post_id: None,
        }
    }

    pub fn from_error(account: &ConnectedAccount, error: &PlatformError) -> Self {
        Self::error(account, error.to_string())
    }

    /// Override the instance reported, for destinations below the account level
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn status(&self) -> PostOutcome {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == PostOutcome::Success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn post_url(&self) -> Option<&str> {
        self.post_url.as_deref()
    }

    pub fn external_post_id(&self) -> Option<&str> {
        self.external_post_id.as_deref()
    }
}

/// Overall status of a publish, derived from its per-platform results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AggregateOutcome {
    Success,
    Partial,
    Failed,
}

impl AggregateOutcome {
    /// Reduce per-platform results to one status
    ///
    /// An empty result set is `Failed`: nothing was published.
    pub fn from_results(results: &[PlatformPostResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();

        if succeeded == 0 {
            AggregateOutcome::Failed
        } else if succeeded == results.len() {
            AggregateOutcome::Success
        } else {
            AggregateOutcome::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Partial => "Partial",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for AggregateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
