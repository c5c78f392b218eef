//! Connected accounts and the accounts file
//!
//! A [`ConnectedAccount`] is one linked account on one platform. The core
//! never looks inside its secrets; they are handed to the matching adapter
//! as opaque strings. Accounts are usually loaded from a TOML file:
//!
//! ```toml
//! [[accounts]]
//! platform = "mastodon"
//! instance = "mastodon.social"
//! handle = "alice"
//! access_token_file = "~/.config/fanpost/mastodon.token"
//!
//! [[accounts]]
//! platform = "lemmy"
//! access_token = "jwt..."
//!
//! [[accounts.communities]]
//! instance = "lemmy.world"
//! community_name = "rust"
//! community_id = 42
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// One forum community an account posts into
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForumCommunity {
    /// Host of the forum instance (e.g. "lemmy.world")
    pub instance: String,
    pub community_name: String,
    pub community_id: i64,
}

/// A linked account on one platform
///
/// Secrets are wrapped in [`SecretString`] so they are zeroed on drop and
/// redacted from `Debug` output.
#[derive(Debug)]
pub struct ConnectedAccount {
    /// Raw platform tag as supplied by the caller (e.g. "bluesky")
    pub platform: String,
    pub handle: Option<String>,
    /// Instance or service URL; scheme optional
    pub instance: Option<String>,
    pub access_token: Option<SecretString>,
    pub app_password: Option<SecretString>,
    pub communities: Vec<ForumCommunity>,
}

impl ConnectedAccount {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            handle: None,
            instance: None,
            access_token: None,
            app_password: None,
            communities: Vec::new(),
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_app_password(mut self, password: impl Into<String>) -> Self {
        self.app_password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_communities(mut self, communities: Vec<ForumCommunity>) -> Self {
        self.communities = communities;
        self
    }

    /// Access token, if present and non-blank
    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .map(|t| t.expose_secret())
            .filter(|t| !t.trim().is_empty())
    }

    /// App password, if present and non-blank
    pub fn password(&self) -> Option<&str> {
        self.app_password
            .as_ref()
            .map(|p| p.expose_secret())
            .filter(|p| !p.trim().is_empty())
    }
}

/// On-disk shape of one account entry
#[derive(Debug, Deserialize)]
struct AccountEntry {
    platform: String,
    handle: Option<String>,
    instance: Option<String>,
    access_token: Option<String>,
    access_token_file: Option<String>,
    app_password: Option<String>,
    #[serde(default)]
    communities: Vec<ForumCommunity>,
}

#[derive(Debug, Deserialize)]
struct AccountsDocument {
    #[serde(default)]
    accounts: Vec<AccountEntry>,
}

/// Loader for the accounts file
pub struct AccountsFile;

impl AccountsFile {
    /// Load accounts from the default location
    pub fn load() -> Result<Vec<ConnectedAccount>> {
        let path = resolve_accounts_path()?;
        Self::load_from_path(&path)
    }

    /// Load accounts from a specific path
    pub fn load_from_path(path: &Path) -> Result<Vec<ConnectedAccount>> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    /// Parse an accounts document
    ///
    /// `access_token_file` is read (and trimmed) when `access_token` is absent.
    pub fn parse(content: &str) -> Result<Vec<ConnectedAccount>> {
        let document: AccountsDocument = toml::from_str(content).map_err(ConfigError::ParseError)?;

        document
            .accounts
            .into_iter()
            .map(|entry| {
                let token = match (entry.access_token, entry.access_token_file) {
                    (Some(token), _) => Some(token),
                    (None, Some(file)) => Some(read_secret_file(&file)?),
                    (None, None) => None,
                };

                Ok(ConnectedAccount {
                    platform: entry.platform,
                    handle: entry.handle,
                    instance: entry.instance,
                    access_token: token.map(SecretString::from),
                    app_password: entry.app_password.map(SecretString::from),
                    communities: entry.communities,
                })
            })
            .collect()
    }
}

fn read_secret_file(path: &str) -> Result<String> {
    let expanded = shellexpand::full(path).map_err(|e| ConfigError::InvalidValue {
        field: "access_token_file".to_string(),
        reason: e.to_string(),
    })?;

    let secret = std::fs::read_to_string(expanded.as_ref())
        .map_err(ConfigError::ReadError)?
        .trim()
        .to_string();

    Ok(secret)
}

/// Resolve the accounts file path under the XDG config directory
pub fn resolve_accounts_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FANPOST_ACCOUNTS") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("fanpost").join("accounts.toml"))
}
