//! Mock adapter for testing
//!
//! A configurable [`PlatformAdapter`] that can succeed, fail, stall, or
//! panic. It lets orchestrator and publisher tests run without network
//! access or credentials.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::accounts::ConnectedAccount;
use crate::platforms::{PlatformAdapter, PlatformKind};
use crate::types::{PlatformPostResult, Post};

/// What the mock does when called
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// One success result per destination
    Succeed,
    /// One error result per destination, carrying this message
    Fail(String),
    /// Panic inside `create_post`
    Panic(String),
}

/// Mock platform adapter
#[derive(Debug, Clone)]
pub struct MockAdapter {
    kind: PlatformKind,
    behavior: MockBehavior,
    delay: Duration,
    /// Results produced per call; forum-style adapters return several
    destinations: usize,
    calls: Arc<AtomicUsize>,
    seen_handles: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockAdapter {
    pub fn new(kind: PlatformKind, behavior: MockBehavior) -> Self {
        Self {
            kind,
            behavior,
            delay: Duration::ZERO,
            destinations: 1,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock adapter that always succeeds
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(kind, MockBehavior::Succeed)
    }

    /// Create a mock adapter whose results are all errors
    pub fn failure(kind: PlatformKind, message: &str) -> Self {
        Self::new(kind, MockBehavior::Fail(message.to_string()))
    }

    /// Create a mock adapter that panics when called
    pub fn panicking(kind: PlatformKind, message: &str) -> Self {
        Self::new(kind, MockBehavior::Panic(message.to_string()))
    }

    /// Wait this long before answering (simulates network latency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Produce `count` results per call
    pub fn with_destinations(mut self, count: usize) -> Self {
        self.destinations = count.max(1);
        self
    }

    /// Number of times `create_post` has been called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Handles of the accounts this mock was called with, in call order
    pub fn seen_handles(&self) -> Vec<Option<String>> {
        self.seen_handles
            .lock()
            .map(|handles| handles.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    async fn create_post(
        &self,
        _post: &Post,
        account: &ConnectedAccount,
    ) -> Vec<PlatformPostResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut handles) = self.seen_handles.lock() {
            handles.push(account.handle.clone());
        }

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        (0..self.destinations)
            .map(|i| match &self.behavior {
                MockBehavior::Succeed => PlatformPostResult::success(
                    account,
                    format!("Successfully posted to destination {}", i),
                    Some(format!("https://{}.test/post/{}", self.kind, i)),
                    Some(format!("{}-{}", self.kind, i)),
                ),
                MockBehavior::Fail(message) => PlatformPostResult::error(account, message.clone()),
                MockBehavior::Panic(message) => panic!("{}", message),
            })
            .collect()
    }
}
