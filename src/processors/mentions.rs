//! Mentions pipeline: archive the conversation a mention points into and
//! reply with the link.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::CycleReport;
use crate::archiver::Archiver;
use crate::commentary::{CommentaryGenerator, PostContent};
use crate::db::{self, Database};
use crate::reply::ReplyComposer;
use crate::scheduler::run_periodic;
use crate::thread::ConversationResolver;
use crate::twitter::{Post, SocialClient};

/// What happened to a single mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionOutcome {
    Replied { cid: String, reply_id: String },
    Skipped,
}

/// Polls mentions and answers each one once.
pub struct MentionsProcessor {
    db: Database,
    client: Arc<dyn SocialClient>,
    resolver: ConversationResolver,
    archiver: Archiver,
    commentary: Option<CommentaryGenerator>,
    composer: ReplyComposer,
    batch_size: usize,
}

impl MentionsProcessor {
    #[must_use]
    pub fn new(
        db: Database,
        client: Arc<dyn SocialClient>,
        resolver: ConversationResolver,
        archiver: Archiver,
        commentary: Option<CommentaryGenerator>,
        composer: ReplyComposer,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            client,
            resolver,
            archiver,
            commentary,
            composer,
            batch_size,
        }
    }

    /// Poll every `interval` until `shutdown` is cancelled.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        run_periodic("mentions", interval, shutdown, move || async move {
            match self.run_cycle().await {
                Ok(report) => info!(
                    seen = report.seen,
                    replied = report.replied,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Mentions cycle complete"
                ),
                Err(e) => error!("Mentions cycle failed: {e:#}"),
            }
        })
        .await;
    }

    /// Process one batch of mentions in the order they were fetched.
    ///
    /// # Errors
    ///
    /// Returns an error only if the mentions cannot be fetched; failures of
    /// individual mentions are counted and logged.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mentions = self
            .client
            .fetch_unanswered_mentions(self.batch_size)
            .await
            .context("Failed to fetch mentions")?;

        let mut report = CycleReport {
            seen: mentions.len(),
            ..CycleReport::default()
        };

        for mention in &mentions {
            match db::has_replied_to_mention(self.db.pool(), &mention.id).await {
                Ok(true) => {
                    debug!(mention_id = %mention.id, "Mention already answered");
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(mention_id = %mention.id, "Could not check mention log, skipping: {e:#}");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.process_mention(mention).await {
                Ok(MentionOutcome::Replied { .. }) => report.replied += 1,
                Ok(MentionOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(mention_id = %mention.id, "Failed to process mention: {e:#}");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Archive, like, reply and record a single mention.
    ///
    /// The mention is only logged after the reply was sent.
    ///
    /// # Errors
    ///
    /// Returns an error if archiving, replying or logging fails.
    #[instrument(skip(self, mention), fields(mention_id = %mention.id))]
    pub async fn process_mention(&self, mention: &Post) -> Result<MentionOutcome> {
        let root = self.resolver.find_root(mention).await;
        if root.id.is_empty() {
            warn!("Resolved root has no id, skipping mention");
            return Ok(MentionOutcome::Skipped);
        }

        let cid = self.archiver.archive(&root).await?;

        if let Err(e) = self.client.like_post(&mention.id).await {
            warn!("Failed to like mention: {e:#}");
        }

        let commentary = match &self.commentary {
            Some(generator) => Some(
                generator
                    .generate(&PostContent::from_post(&root))
                    .await
                    .into_commentary(),
            ),
            None => None,
        };

        let author = mention.username_or_unknown();
        let text = self.composer.mention_reply(author, &cid, commentary.as_ref());
        let reply_id = self
            .client
            .send_reply(&text, &mention.id)
            .await
            .context("Failed to send reply")?;

        let timestamp = mention
            .timestamp
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));
        db::log_mention(self.db.pool(), &mention.id, author, timestamp.as_deref())
            .await
            .context("Reply sent but mention could not be logged")?;

        info!(root_id = %root.id, cid = %cid, reply_id = %reply_id, "Replied to mention");
        Ok(MentionOutcome::Replied { cid, reply_id })
    }
}

impl std::fmt::Debug for MentionsProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentionsProcessor")
            .field("batch_size", &self.batch_size)
            .field("commentary", &self.commentary.is_some())
            .finish_non_exhaustive()
    }
}
