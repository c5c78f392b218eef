//! End-to-end publish flow
//!
//! A [`Publisher`] wires the collaborators around the orchestrator in a
//! fixed order: load images, fan out, clean up images, aggregate, record
//! history. Cleanup and history are best effort; neither can change the
//! outcome that was already decided by the platforms.

use tracing::{info, warn};

use crate::accounts::ConnectedAccount;
use crate::error::Result;
use crate::history::PostHistory;
use crate::media::{ImageCleanup, ImageSource, NoCleanup};
use crate::orchestrator::FanOutOrchestrator;
use crate::types::{AggregateOutcome, PlatformPostResult, Post};

/// Outcome of one publish
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishReport {
    pub post_id: String,
    pub outcome: AggregateOutcome,
    pub results: Vec<PlatformPostResult>,
}

impl PublishReport {
    /// CLI exit code: 0 success, 1 failed, 2 partial
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            AggregateOutcome::Success => 0,
            AggregateOutcome::Failed => 1,
            AggregateOutcome::Partial => 2,
        }
    }
}

pub struct Publisher {
    orchestrator: FanOutOrchestrator,
    images: Box<dyn ImageSource>,
    cleanup: Box<dyn ImageCleanup>,
    history: Option<Box<dyn PostHistory>>,
}

impl Publisher {
    pub fn new(orchestrator: FanOutOrchestrator, images: Box<dyn ImageSource>) -> Self {
        Self {
            orchestrator,
            images,
            cleanup: Box::new(NoCleanup),
            history: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: Box<dyn ImageCleanup>) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_history(mut self, history: Box<dyn PostHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Publish `post` with the named images through every account
    ///
    /// Images already attached to `post` are kept; `image_names` are loaded
    /// and appended. Only a failure to load images is returned as an error;
    /// platform failures are part of the report.
    pub async fn publish(
        &self,
        mut post: Post,
        image_names: &[String],
        accounts: &[ConnectedAccount],
    ) -> Result<PublishReport> {
        if !image_names.is_empty() {
            let loaded = self.images.load(image_names).await?;
            info!("Loaded {}/{} image(s)", loaded.len(), image_names.len());
            post.images.extend(loaded);
        }

        let results = self.orchestrator.publish(&post, accounts).await;

        if !image_names.is_empty() {
            self.cleanup.cleanup(image_names).await;
        }

        let outcome = AggregateOutcome::from_results(&results);
        info!("Post {} outcome: {}", post.id, outcome);

        if let Some(history) = &self.history {
            if let Err(e) = history.record(&post, &results, outcome).await {
                warn!("Failed to record post history: {}", e);
            }
        }

        Ok(PublishReport {
            post_id: post.id,
            outcome,
            results,
        })
    }
}
