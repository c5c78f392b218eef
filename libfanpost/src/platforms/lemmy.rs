//! Lemmy platform implementation
//!
//! Lemmy accounts post into one or more communities, possibly on different
//! instances. Each community gets its own `POST /api/v3/post` and its own
//! result; a failing community never stops the ones after it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::accounts::{ConnectedAccount, ForumCommunity};
use crate::config::{Config, HttpConfig};
use crate::error::PlatformError;
use crate::platforms::{
    build_http_client, check_response, normalize_instance_url, PlatformAdapter, PlatformKind,
};
use crate::types::{PlatformPostResult, Post};

#[derive(Debug, Deserialize)]
struct PostResponse {
    post_view: PostView,
}

#[derive(Debug, Deserialize)]
struct PostView {
    post: CreatedPost,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: i64,
}

/// Lemmy adapter
pub struct LemmyAdapter {
    http: HttpConfig,
    default_title: String,
    language_id: i64,
}

impl LemmyAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            http: config.http.clone(),
            default_title: config.lemmy.default_title.clone(),
            language_id: config.lemmy.language_id,
        }
    }

    async fn post_to_community(
        &self,
        client: &reqwest::Client,
        token: &str,
        post: &Post,
        community: &ForumCommunity,
    ) -> Result<(String, i64), PlatformError> {
        let base_url = normalize_instance_url(&community.instance);
        let title = post
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.default_title);

        let response = client
            .post(format!("{}/api/v3/post", base_url))
            .bearer_auth(token)
            .json(&json!({
                "name": title,
                "community_id": community.community_id,
                "nsfw": post.nsfw,
                "language_id": self.language_id,
                "body": post.message,
                "url": post.link_url,
            }))
            .send()
            .await?;
        let created: PostResponse = check_response(response).await?.json().await?;

        let id = created.post_view.post.id;
        Ok((format!("{}/post/{}", base_url, id), id))
    }
}

#[async_trait]
impl PlatformAdapter for LemmyAdapter {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Lemmy
    }

    async fn create_post(
        &self,
        post: &Post,
        account: &ConnectedAccount,
    ) -> Vec<PlatformPostResult> {
        let Some(token) = account.token() else {
            let error = PlatformError::ClientInit("Lemmy account has no access token".to_string());
            warn!("{}", error);
            return vec![PlatformPostResult::from_error(account, &error)];
        };

        if account.communities.is_empty() {
            let error = PlatformError::Validation("Lemmy account has no communities".to_string());
            warn!("{}", error);
            return vec![PlatformPostResult::from_error(account, &error)];
        }

        let client = match build_http_client(&self.http) {
            Ok(client) => client,
            Err(error) => return vec![PlatformPostResult::from_error(account, &error)],
        };

        let mut results = Vec::with_capacity(account.communities.len());
        for community in &account.communities {
            let result = match self.post_to_community(&client, token, post, community).await {
                Ok((url, id)) => {
                    info!("Posted to {} on {}: {}", community.community_name, community.instance, url);
                    PlatformPostResult::success(
                        account,
                        format!("Successfully posted to {}", community.community_name),
                        Some(url),
                        Some(id.to_string()),
                    )
                }
                Err(error) => {
                    warn!(
                        "Failed to post to {} on {}: {}",
                        community.community_name, community.instance, error
                    );
                    PlatformPostResult::from_error(account, &error)
                }
            };
            results.push(result.with_instance(community.instance.clone()));
        }

        results
    }
}
