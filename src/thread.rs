//! Conversation-root resolution.
//!
//! Given a post that may be a reply, find the first post of its thread.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::twitter::{Post, SocialClient};

/// Default bound on reply hops followed when walking up a thread.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Resolves a post to the root of its conversation.
#[derive(Clone)]
pub struct ConversationResolver {
    client: Arc<dyn SocialClient>,
    max_depth: usize,
}

impl ConversationResolver {
    #[must_use]
    pub fn new(client: Arc<dyn SocialClient>, max_depth: usize) -> Self {
        Self {
            client,
            max_depth: max_depth.max(1),
        }
    }

    /// Find the root post of `post`'s thread.
    ///
    /// Never fails: lookup errors and deleted parents end the search at the
    /// last post that could be resolved.
    pub async fn find_root(&self, post: &Post) -> Post {
        if post.is_conversation_head() {
            return post.clone();
        }

        if let Some(conversation_id) = post.conversation_id.as_deref().filter(|c| !c.is_empty()) {
            match self.client.fetch_head_of_conversation(conversation_id).await {
                Ok(Some(head)) => {
                    debug!(post_id = %post.id, root_id = %head.id, "Resolved root via conversation head");
                    return head;
                }
                Ok(None) => {
                    debug!(post_id = %post.id, conversation_id, "Conversation head not found, walking replies");
                }
                Err(e) => {
                    warn!(post_id = %post.id, conversation_id, "Failed to fetch conversation head, walking replies: {e:#}");
                }
            }
        }

        self.walk_to_root(post).await
    }

    /// Follow reply links upward until a parentless post or the depth bound.
    async fn walk_to_root(&self, post: &Post) -> Post {
        let mut current = post.clone();

        for hop in 0..self.max_depth {
            let Some(parent_id) = current.parent_id().map(ToString::to_string) else {
                debug!(post_id = %post.id, root_id = %current.id, hops = hop, "Resolved root by walking replies");
                return current;
            };

            let parent = match current.in_reply_to_status.take() {
                Some(embedded) => *embedded,
                None => match self.client.fetch_post(&parent_id).await {
                    Ok(Some(parent)) => parent,
                    Ok(None) => {
                        debug!(post_id = %current.id, parent_id = %parent_id, "Parent post missing, stopping walk");
                        return current;
                    }
                    Err(e) => {
                        warn!(post_id = %current.id, parent_id = %parent_id, "Failed to fetch parent post, stopping walk: {e:#}");
                        return current;
                    }
                },
            };

            current = parent;
        }

        if current.parent_id().is_some() {
            warn!(
                post_id = %post.id,
                deepest_id = %current.id,
                max_depth = self.max_depth,
                "Reply chain exceeds maximum depth, using deepest post found"
            );
        }
        current
    }
}

impl std::fmt::Debug for ConversationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationResolver")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
