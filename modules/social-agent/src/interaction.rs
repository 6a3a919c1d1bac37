//! Per-post decision pipeline.
//!
//! CANDIDATE -> IGNORED | STOPPED | RESPONDING, and RESPONDING -> DIRECT_REPLY |
//! INVESTIGATING. A post is marked processed as soon as it passes the entry
//! guard, so a failure further down never causes it to be retried.

use social_agent_types::{Action, Decision, Post, ReplyChunk};
use std::sync::Arc;

use crate::collaborators::{Clock, GenerationContext, MemoryStore, PlatformClient, TextGenerator};
use crate::config::AgentConfig;
use crate::investigation::Investigator;
use crate::media::{collect_media, extract_command_text};
use crate::memory::{deterministic_id, post_record, room_id};
use crate::reply::ReplyDispatcher;
use crate::thread::{format_thread, ThreadReconstructor, MAX_THREAD_CONTEXT_CHARS};

/// Recent room memories shown to the classifier and generator
pub const RECENT_MEMORY_COUNT: usize = 20;

/// Terminal state of one post
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// A memory already existed for the post
    AlreadyProcessed,
    Ignored,
    Stopped,
    /// Skipped by the hourly reply cap
    RateLimited,
    Replied { chunks: Vec<ReplyChunk> },
    Investigated { job_id: String, chunks: Vec<ReplyChunk> },
    Failed(String),
}

impl PostOutcome {
    /// True when a reply went out (or would have, in dry-run mode)
    pub fn is_reply(&self) -> bool {
        matches!(self, PostOutcome::Replied { .. } | PostOutcome::Investigated { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostOutcome::AlreadyProcessed => "already_processed",
            PostOutcome::Ignored => "ignored",
            PostOutcome::Stopped => "stopped",
            PostOutcome::RateLimited => "rate_limited",
            PostOutcome::Replied { .. } => "replied",
            PostOutcome::Investigated { .. } => "investigated",
            PostOutcome::Failed(_) => "failed",
        }
    }
}

pub struct InteractionHandler {
    agent_id: String,
    handle: String,
    max_thread_depth: usize,
    store: Arc<dyn MemoryStore>,
    generator: Arc<dyn TextGenerator>,
    threads: ThreadReconstructor,
    reply: Arc<ReplyDispatcher>,
    investigator: Option<Investigator>,
}

impl InteractionHandler {
    pub fn new(
        config: &AgentConfig,
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn MemoryStore>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let threads = ThreadReconstructor::new(platform.clone(), store.clone(), config.agent_id.clone());
        let reply = Arc::new(ReplyDispatcher::new(
            platform,
            store.clone(),
            clock,
            config.agent_id.clone(),
            config.max_post_length,
            config.dry_run,
        ));
        Self {
            agent_id: config.agent_id.clone(),
            handle: config.handle.clone(),
            max_thread_depth: config.max_thread_depth,
            store,
            generator,
            threads,
            reply,
            investigator: None,
        }
    }

    /// Enable the investigation capability
    pub fn with_investigator(mut self, investigator: Investigator) -> Self {
        self.investigator = Some(investigator);
        self
    }

    /// Dispatcher shared with an `Investigator` built for this handler
    pub fn reply_dispatcher(&self) -> Arc<ReplyDispatcher> {
        self.reply.clone()
    }

    pub fn can_investigate(&self) -> bool {
        self.investigator.is_some()
    }

    /// Drive one post to a terminal state. Never returns an error.
    pub async fn handle_post(&self, post: &Post) -> PostOutcome {
        let marker = deterministic_id(&post.id, &self.agent_id);
        match self.store.exists(&marker).await {
            Ok(true) => {
                log::debug!("[INTERACTION] Post {} already processed", post.id);
                return PostOutcome::AlreadyProcessed;
            }
            Ok(false) => {}
            Err(e) => {
                log::warn!("[INTERACTION] Cannot verify post {}, skipping: {}", post.id, e);
                return PostOutcome::Failed(e);
            }
        }

        if extract_command_text(&post.text).is_empty() {
            log::info!("[INTERACTION] Post {} has no body, ignoring", post.id);
            self.mark_processed(post).await;
            return PostOutcome::Ignored;
        }

        let thread = self.threads.build_thread(post, self.max_thread_depth).await;
        self.mark_processed(post).await;

        let room = room_id(post.conversation_key(), &self.agent_id);
        let recent = match self.store.recent(&room, RECENT_MEMORY_COUNT).await {
            Ok(recent) => recent,
            Err(e) => {
                log::warn!("[INTERACTION] No recent history for post {}: {}", post.id, e);
                Vec::new()
            }
        };

        let context = GenerationContext {
            agent_handle: self.handle.clone(),
            post: post.clone(),
            formatted_thread: format_thread(&thread, MAX_THREAD_CONTEXT_CHARS),
            thread,
            recent,
            media_urls: collect_media(post).into_iter().collect(),
            article: None,
            primary_context: None,
        };

        let decision = match self.generator.classify(&context).await {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("[INTERACTION] Classification failed for post {}, ignoring: {}", post.id, e);
                Decision::Ignore
            }
        };

        let classified_action = match decision {
            Decision::Respond { action } => action,
            Decision::Ignore => {
                log::info!("[INTERACTION] Ignoring post {}", post.id);
                return PostOutcome::Ignored;
            }
            Decision::Stop => {
                log::info!("[INTERACTION] Stopping on post {}", post.id);
                return PostOutcome::Stopped;
            }
        };

        let generated = match self.generator.generate(&context).await {
            Ok(generated) => generated,
            Err(e) => {
                log::error!("[INTERACTION] Generation failed for post {}: {}", post.id, e);
                return PostOutcome::Failed(e);
            }
        };

        let mut action = generated.action.clone().or(classified_action);

        if action == Some(Action::Investigate) {
            if let Some(investigator) = &self.investigator {
                log::info!("[INTERACTION] Post {} -> INVESTIGATING", post.id);
                return match investigator.investigate(&context, &room).await {
                    Some(result) => PostOutcome::Investigated {
                        job_id: result.job_id,
                        chunks: result.chunks,
                    },
                    None => PostOutcome::Failed(format!("Investigation for post {} did not complete", post.id)),
                };
            }
            log::info!(
                "[INTERACTION] Investigation not configured, replying directly to {}",
                post.id
            );
            action = None;
        }

        if generated.text.trim().is_empty() {
            log::info!("[INTERACTION] Empty reply generated for post {}, ignoring", post.id);
            return PostOutcome::Ignored;
        }

        log::info!("[INTERACTION] Post {} -> DIRECT_REPLY", post.id);
        match self.reply.post(&generated.text, &post.id, action, &room).await {
            Ok(chunks) => PostOutcome::Replied { chunks },
            Err(e) => {
                log::error!("[INTERACTION] Reply to post {} failed: {}", post.id, e);
                PostOutcome::Failed(e.to_string())
            }
        }
    }

    /// Record the post's memory, which is its processed marker
    pub async fn mark_processed(&self, post: &Post) {
        if let Err(e) = self.store.save(&post_record(post, &self.agent_id)).await {
            log::warn!("[INTERACTION] Failed to mark post {} processed: {}", post.id, e);
        }
    }
}
