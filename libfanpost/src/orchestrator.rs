//! Multi-platform fan-out
//!
//! [`FanOutOrchestrator::publish`] resolves every account to an adapter,
//! runs all adapters concurrently, and returns their results in account
//! order. Adapters report their own failures as results; a panicking adapter
//! is caught here and reported the same way, so one platform can never take
//! its siblings down.

use futures::future::{self, join_all, BoxFuture};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accounts::ConnectedAccount;
use crate::config::{Config, UnknownPlatformPolicy};
use crate::error::PlatformError;
use crate::platforms::bluesky::BlueskyAdapter;
use crate::platforms::lemmy::LemmyAdapter;
use crate::platforms::status_api::StatusApiAdapter;
use crate::platforms::{PlatformAdapter, PlatformKind};
use crate::types::{PlatformPostResult, Post};

/// Adapters keyed by the platform they serve
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<PlatformKind, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    /// A registry with no adapters
    pub fn empty() -> Self {
        Self::default()
    }

    /// The four production adapters, built from configuration
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BlueskyAdapter::new(config)));
        registry.register(Arc::new(StatusApiAdapter::mastodon(config)));
        registry.register(Arc::new(LemmyAdapter::new(config)));
        registry.register(Arc::new(StatusApiAdapter::pixelfed(config)));
        registry
    }

    /// Register an adapter under its own kind, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) -> &mut Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: PlatformKind) -> Option<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&kind)
    }

    /// Resolve a raw platform tag
    pub fn resolve(&self, tag: &str) -> Result<&Arc<dyn PlatformAdapter>, PlatformError> {
        let kind: PlatformKind = tag.parse()?;
        self.get(kind)
            .ok_or_else(|| PlatformError::UnknownPlatform(tag.to_string()))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Concurrent dispatcher over an [`AdapterRegistry`]
pub struct FanOutOrchestrator {
    registry: AdapterRegistry,
    unknown_platform: UnknownPlatformPolicy,
}

impl FanOutOrchestrator {
    pub fn new(registry: AdapterRegistry, unknown_platform: UnknownPlatformPolicy) -> Self {
        Self {
            registry,
            unknown_platform,
        }
    }

    /// Orchestrator over the production adapters
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            AdapterRegistry::from_config(config),
            config.publish.unknown_platform,
        )
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Publish `post` through every account concurrently
    ///
    /// Results come back in account order, with multi-destination results
    /// flattened in place. Accounts whose tag resolves to no adapter are
    /// skipped or reported according to the configured policy.
    pub async fn publish(
        &self,
        post: &Post,
        accounts: &[ConnectedAccount],
    ) -> Vec<PlatformPostResult> {
        info!(
            "Publishing post {} to {} account(s)",
            post.id,
            accounts.len()
        );

        let tasks: Vec<BoxFuture<'_, Vec<PlatformPostResult>>> = accounts
            .iter()
            .map(|account| match self.registry.resolve(&account.platform) {
                Ok(adapter) => dispatch(adapter.as_ref(), post, account).boxed(),
                Err(error) => future::ready(self.unresolved(account, error)).boxed(),
            })
            .collect();

        let results: Vec<PlatformPostResult> = join_all(tasks).await.into_iter().flatten().collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            "Post {} finished: {}/{} destination(s) succeeded",
            post.id,
            succeeded,
            results.len()
        );
        results
    }

    fn unresolved(&self, account: &ConnectedAccount, error: PlatformError) -> Vec<PlatformPostResult> {
        match self.unknown_platform {
            UnknownPlatformPolicy::Skip => {
                warn!("Skipping account: {}", error);
                Vec::new()
            }
            UnknownPlatformPolicy::Report => {
                warn!("Reporting unresolved account: {}", error);
                vec![PlatformPostResult::from_error(account, &error)]
            }
        }
    }
}

/// Run one adapter, turning a panic into an error result for its account
async fn dispatch(
    adapter: &dyn PlatformAdapter,
    post: &Post,
    account: &ConnectedAccount,
) -> Vec<PlatformPostResult> {
    debug!(
        "Dispatching to {} ({})",
        adapter.kind(),
        account.handle.as_deref().unwrap_or("-")
    );

    match AssertUnwindSafe(adapter.create_post(post, account))
        .catch_unwind()
        .await
    {
        Ok(results) => results,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!("Adapter for {} panicked: {}", adapter.kind(), reason);
            let error = PlatformError::AdapterPanic(adapter.kind().to_string());
            vec![PlatformPostResult::from_error(account, &error)]
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
