//! Configuration management for Fanpost
//!
//! Every section has defaults, so an empty file (or no file at all, via
//! [`Config::default`]) gives the stock behaviour.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compress::CompressionBudget;
use crate::error::{ConfigError, Result};
use crate::retry::RetryPolicy;
use crate::types::MAX_POST_IMAGES;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compression: CompressionBudget,
    pub http: HttpConfig,
    pub bluesky: BlueskyConfig,
    pub mastodon: StatusApiConfig,
    pub pixelfed: StatusApiConfig,
    pub lemmy: LemmyConfig,
    pub publish: PublishConfig,
    pub history: HistoryConfig,
    pub media: MediaConfig,
}

/// Settings for the per-call HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("fanpost/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    /// PDS used when an account has no instance of its own
    pub service: String,
    pub max_images: usize,
    pub upload_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service: "https://bsky.social".to_string(),
            max_images: 4,
            upload_attempts: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl BlueskyConfig {
    pub fn upload_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.upload_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Shared settings for Mastodon-compatible status APIs
///
/// `max_images` falls back to the variant's own limit when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusApiConfig {
    pub max_images: Option<usize>,
    pub upload_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for StatusApiConfig {
    fn default() -> Self {
        Self {
            max_images: None,
            upload_attempts: 1,
            retry_delay_ms: 0,
        }
    }
}

impl StatusApiConfig {
    pub fn upload_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.upload_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LemmyConfig {
    /// Title used when the post has none
    pub default_title: String,
    pub language_id: i64,
}

impl Default for LemmyConfig {
    fn default() -> Self {
        Self {
            default_title: "Untitled Post".to_string(),
            language_id: 0,
        }
    }
}

/// What to do with accounts whose platform tag resolves to no adapter
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPlatformPolicy {
    /// Emit no result for the account
    #[default]
    Skip,
    /// Emit an error result in the account's position
    Report,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub unknown_platform: UnknownPlatformPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.local/share/fanpost/history.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory image names are resolved against
    pub image_dir: String,
    /// Delete source images once every platform has read them
    pub cleanup: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_dir: "~/.cache/fanpost/images".to_string(),
            cleanup: true,
        }
    }
}

impl MediaConfig {
    pub fn expand_image_dir(&self) -> Result<PathBuf> {
        expand_path(&self.image_dir, "media.image_dir")
    }
}

impl HistoryConfig {
    pub fn expand_path(&self) -> Result<PathBuf> {
        expand_path(&self.path, "history.path")
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break an adapter or the compressor
    pub fn validate(&self) -> Result<()> {
        self.compression
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                field: "compression".to_string(),
                reason: e.to_string(),
            })?;

        // Each platform rejects posts above its own attachment cap
        let limits = [
            ("bluesky.max_images", Some(self.bluesky.max_images), 4),
            ("mastodon.max_images", self.mastodon.max_images, 4),
            ("pixelfed.max_images", self.pixelfed.max_images, MAX_POST_IMAGES),
        ];
        for (field, limit, platform_max) in limits {
            if let Some(limit) = limit {
                if limit == 0 || limit > platform_max {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        reason: format!("must be between 1 and {}", platform_max),
                    }
                    .into());
                }
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http.timeout_secs".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn expand_path(path: &str, field: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FANPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("fanpost").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.compression, CompressionBudget::default());
        assert_eq!(config.bluesky.max_images, 4);
        assert_eq!(config.bluesky.upload_attempts, 2);
        assert_eq!(config.mastodon.upload_attempts, 1);
        assert_eq!(config.pixelfed.max_images, None);
        assert_eq!(config.lemmy.default_title, "Untitled Post");
        assert_eq!(config.publish.unknown_platform, UnknownPlatformPolicy::Skip);
        assert!(config.history.enabled);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
[compression]
target_bytes = 500000

[bluesky]
retry_delay_ms = 250

[publish]
unknown_platform = "report"
"#,
        )
        .unwrap();

        assert_eq!(config.compression.target_bytes, 500_000);
        assert_eq!(config.compression.min_quality, 20);
        assert_eq!(config.bluesky.retry_delay_ms, 250);
        assert_eq!(config.bluesky.service, "https://bsky.social");
        assert_eq!(config.publish.unknown_platform, UnknownPlatformPolicy::Report);
    }

    #[test]
    fn test_upload_retry_policies() {
        let config = Config::default();

        let bluesky = config.bluesky.upload_retry();
        assert_eq!(bluesky.max_attempts(), 2);
        assert_eq!(bluesky.delay(), Duration::from_secs(1));

        let mastodon = config.mastodon.upload_retry();
        assert_eq!(mastodon.max_attempts(), 1);
    }

    #[test]
    fn test_invalid_compression_rejected() {
        let result = Config::parse("[compression]\nshrink_factor = 1.5\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("compression"));
    }

    #[test]
    fn test_invalid_image_limit_rejected() {
        let result = Config::parse("[pixelfed]\nmax_images = 11\n");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("pixelfed.max_images"));
    }

    #[test]
    fn test_image_limit_follows_platform_cap() {
        for content in ["[bluesky]\nmax_images = 5\n", "[mastodon]\nmax_images = 10\n"] {
            let message = Config::parse(content).unwrap_err().to_string();
            assert!(message.contains("must be between 1 and 4"), "{message}");
        }

        let config = Config::parse("[pixelfed]\nmax_images = 10\n").unwrap();
        assert_eq!(config.pixelfed.max_images, Some(10));
        assert!(Config::parse("[mastodon]\nmax_images = 4\n").is_ok());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = Config::parse("[compression\n");
        assert!(result.unwrap_err().to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_load_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[lemmy]\ndefault_title = \"News\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.lemmy.default_title, "News");
    }

    #[test]
    #[serial]
    fn test_load_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");
        std::env::set_var("FANPOST_CONFIG", path.to_str().unwrap());

        let config = Config::load();
        std::env::remove_var("FANPOST_CONFIG");

        assert_eq!(config.unwrap().bluesky.max_images, 4);
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var("FANPOST_CONFIG", "/tmp/fanpost.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("FANPOST_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/fanpost.toml"));
    }

    #[test]
    fn test_history_path_expansion() {
        let config = HistoryConfig {
            enabled: true,
            path: "/var/lib/fanpost/history.db".to_string(),
        };
        assert_eq!(
            config.expand_path().unwrap(),
            PathBuf::from("/var/lib/fanpost/history.db")
        );
    }
}
