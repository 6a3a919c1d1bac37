//! Conversation thread reconstruction.
//!
//! Walks reply-parent references upward from a leaf post and returns the
//! ancestor chain oldest first. Traversal never fails: a missing or
//! unfetchable parent ends the walk and the partial thread is returned.

use social_agent_types::{ConversationThread, Post};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::collaborators::{MemoryStore, PlatformClient};
use crate::memory::{deterministic_id, post_record};

/// Maximum characters of thread context rendered for generation
pub const MAX_THREAD_CONTEXT_CHARS: usize = 15_000;

pub struct ThreadReconstructor {
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn MemoryStore>,
    agent_id: String,
}

impl ThreadReconstructor {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn MemoryStore>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            store,
            agent_id: agent_id.into(),
        }
    }

    /// Build the thread ending at `leaf`, at most `max_depth` posts long.
    ///
    /// The leaf is always included, so a `max_depth` of 0 behaves as 1.
    pub async fn build_thread(&self, leaf: &Post, max_depth: usize) -> ConversationThread {
        let max_depth = max_depth.max(1);
        let mut posts: VecDeque<Post> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = leaf.clone();
        let mut depth = 0usize;

        loop {
            visited.insert(current.id.clone());
            self.remember(&current).await;

            let parent_id = current.parent_id.clone();
            let inline_parent = current.reply_parent.clone();
            posts.push_front(current);
            depth += 1;

            let Some(parent_id) = parent_id else {
                break;
            };
            if depth >= max_depth {
                log::debug!(
                    "[THREAD] Depth cap {} reached below {} for leaf {}",
                    max_depth,
                    parent_id,
                    leaf.id
                );
                break;
            }
            if visited.contains(&parent_id) {
                log::warn!(
                    "[THREAD] Cycle detected at {} while walking leaf {}",
                    parent_id,
                    leaf.id
                );
                break;
            }

            current = match inline_parent {
                Some(parent) if parent.id == parent_id => *parent,
                _ => match self.platform.get_post(&parent_id).await {
                    Ok(Some(parent)) => parent,
                    Ok(None) => {
                        log::info!("[THREAD] Parent {} not found, stopping traversal", parent_id);
                        break;
                    }
                    Err(e) => {
                        log::warn!("[THREAD] Failed to fetch parent {}: {}", parent_id, e);
                        break;
                    }
                },
            };
        }

        log::debug!(
            "[THREAD] Built thread of {} post(s) for leaf {}",
            posts.len(),
            leaf.id
        );

        ConversationThread {
            posts: posts.into(),
        }
    }

    /// Persist a visited post if it has no memory yet; failures only log
    async fn remember(&self, post: &Post) {
        let id = deterministic_id(&post.id, &self.agent_id);
        match self.store.exists(&id).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.store.save(&post_record(post, &self.agent_id)).await {
                    log::warn!("[THREAD] Failed to persist post {}: {}", post.id, e);
                }
            }
            Err(e) => {
                log::warn!("[THREAD] Failed to check memory for post {}: {}", post.id, e);
            }
        }
    }
}

/// Render a thread as `@author: text` lines, oldest first, within `max_chars`.
///
/// Older posts are dropped first when the budget runs out.
pub fn format_thread(thread: &ConversationThread, max_chars: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut total_chars = 0usize;
    let mut truncated = false;

    for post in thread.posts.iter().rev() {
        let author = if post.author_username.is_empty() {
            post.author_id.as_str()
        } else {
            post.author_username.as_str()
        };
        let line = format!("@{}: {}", author, post.text);
        let len = line.chars().count() + 1;
        if total_chars + len > max_chars {
            truncated = true;
            break;
        }
        total_chars += len;
        lines.push(line);
    }

    lines.reverse();
    let mut result = lines.join("\n");
    if truncated {
        result = format!("[thread truncated]\n{}", result);
    }
    result
}
