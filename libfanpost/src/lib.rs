//! Fanpost - publish one post to many social platforms at once
//!
//! This library compresses attached images to fit platform limits, fans a
//! post out to every linked account concurrently, and reduces the
//! per-platform results to one outcome.

pub mod accounts;
pub mod compress;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod platforms;
pub mod publisher;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use accounts::{AccountsFile, ConnectedAccount, ForumCommunity};
pub use compress::{compress, CompressedImage, CompressionBudget};
pub use config::Config;
pub use error::{FanpostError, Result};
pub use orchestrator::{AdapterRegistry, FanOutOrchestrator};
pub use platforms::{PlatformAdapter, PlatformKind};
pub use publisher::{PublishReport, Publisher};
pub use types::{AggregateOutcome, MediaImage, PlatformPostResult, Post};
