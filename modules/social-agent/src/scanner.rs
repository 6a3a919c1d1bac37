//! Polling mention scanner.
//!
//! Each tick fetches mentions and tracked-author posts, filters out what was
//! already handled, and feeds the rest through the decision pipeline one at a
//! time in ascending id order. The cursor advances past everything handed to
//! the pipeline, whatever the per-post outcome.

use chrono::{DateTime, Utc};
use social_agent_types::{compare_post_ids, max_post_id, Post};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::interval;

use crate::collaborators::{Clock, CursorStore, MemoryStore, PlatformClient};
use crate::config::AgentConfig;
use crate::interaction::{InteractionHandler, PostOutcome};
use crate::memory::deterministic_id;

/// Scan state owned by one scanner instance per agent
#[derive(Debug, Clone)]
pub struct ScannerState {
    /// Highest post id handed to the pipeline so far
    pub cursor: Option<String>,
    /// Post ids handled by this process and still above the cursor
    pub processed: HashSet<String>,
    hour_start: DateTime<Utc>,
    replies_this_hour: u32,
}

impl ScannerState {
    pub fn new(cursor: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            cursor,
            processed: HashSet::new(),
            hour_start: now,
            replies_this_hour: 0,
        }
    }

    pub fn replies_this_hour(&self) -> u32 {
        self.replies_this_hour
    }
}

/// What one tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Posts returned by the platform, after merging
    pub fetched: usize,
    /// Outcomes in processing order
    pub outcomes: Vec<(String, PostOutcome)>,
    pub error: Option<String>,
}

impl TickReport {
    pub fn replies(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_reply()).count()
    }
}

pub struct MentionScanner {
    config: AgentConfig,
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn MemoryStore>,
    cursors: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    handler: InteractionHandler,
    state: ScannerState,
}

impl MentionScanner {
    pub fn new(
        config: AgentConfig,
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn MemoryStore>,
        cursors: Arc<dyn CursorStore>,
        clock: Arc<dyn Clock>,
        handler: InteractionHandler,
    ) -> Self {
        let state = ScannerState::new(None, clock.now());
        Self {
            config,
            platform,
            store,
            cursors,
            clock,
            handler,
            state,
        }
    }

    pub fn state(&self) -> &ScannerState {
        &self.state
    }

    pub fn handler(&self) -> &InteractionHandler {
        &self.handler
    }

    /// Restore the persisted cursor
    pub async fn load_state(&mut self) {
        match self.cursors.load_cursor(&self.config.agent_id).await {
            Ok(cursor) => {
                if let Some(cursor) = &cursor {
                    log::info!("[SCANNER] Resuming @{} after post {}", self.config.handle, cursor);
                }
                self.state.cursor = cursor;
            }
            Err(e) => {
                log::warn!("[SCANNER] Could not load cursor, starting fresh: {}", e);
            }
        }
    }

    /// Poll until `shutdown_rx` fires
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        self.load_state().await;

        log::info!(
            "[SCANNER] Starting for @{} (agent={}), interval={}s, tracked_authors={}, dry_run={}, max_replies/hr={}",
            self.config.handle,
            self.config.agent_id,
            self.config.scan_interval_secs,
            self.config.tracked_authors.len(),
            self.config.dry_run,
            self.config.max_replies_per_hour
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.scan_interval_secs));

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("[SCANNER] @{} received shutdown signal", self.config.handle);
                    break;
                }
                _ = poll_interval.tick() => {
                    let report = self.tick().await;
                    if !report.outcomes.is_empty() {
                        log::info!(
                            "[SCANNER] Tick handled {} post(s), {} repl(ies)",
                            report.outcomes.len(),
                            report.replies()
                        );
                    }
                }
            }
        }

        log::info!("[SCANNER] @{} stopped", self.config.handle);
    }

    /// One polling cycle. Never fails; a fetch error stops merging and is reported,
    /// and the posts merged before it are still handled.
    pub async fn tick(&mut self) -> TickReport {
        let (merged, error) = self.fetch_candidates().await;
        if let Some(e) = &error {
            log::error!("[SCANNER] {}", e);
        }

        let fetched = merged.len();
        let mut candidates = self.filter_candidates(merged).await;
        candidates.sort_by(|a, b| compare_post_ids(&a.id, &b.id));

        if !candidates.is_empty() {
            log::info!("[SCANNER] Found {} new candidate(s)", candidates.len());
        }

        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut highest: Option<String> = None;

        for post in candidates {
            let outcome = if self.reply_cap_reached() {
                log::info!(
                    "[SCANNER] Hourly reply limit reached ({}/{}), skipping post {}",
                    self.state.replies_this_hour,
                    self.config.max_replies_per_hour,
                    post.id
                );
                self.handler.mark_processed(&post).await;
                PostOutcome::RateLimited
            } else {
                self.handler.handle_post(&post).await
            };

            if outcome.is_reply() {
                self.state.replies_this_hour += 1;
            }
            log::debug!("[SCANNER] Post {} -> {}", post.id, outcome.label());

            highest = max_post_id(highest.as_deref(), Some(post.id.as_str())).map(|id| id.to_string());
            self.state.processed.insert(post.id.clone());
            outcomes.push((post.id, outcome));
        }

        if let Some(highest) = highest {
            self.advance_cursor(&highest).await;
        }

        TickReport {
            fetched,
            outcomes,
            error,
        }
    }

    /// Mentions plus recent top-level posts of each tracked author, deduplicated by id.
    ///
    /// Merging stops at the first failed fetch; whatever merged before it is
    /// returned alongside the error.
    async fn fetch_candidates(&self) -> (Vec<Post>, Option<String>) {
        let limit = self.config.mention_fetch_limit;
        let mut merged: Vec<Post> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mentions = match self
            .platform
            .search_recent(&format!("@{}", self.config.handle), limit)
            .await
        {
            Ok(posts) => posts,
            Err(e) => return (merged, Some(format!("Failed to fetch mentions: {}", e))),
        };
        for post in mentions {
            if seen.insert(post.id.clone()) {
                merged.push(post);
            }
        }

        let cutoff = self.clock.now() - chrono::Duration::minutes(self.config.recency_window_minutes);
        for author in &self.config.tracked_authors {
            let posts = match self
                .platform
                .search_recent(&format!("from:{}", author), limit)
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    return (merged, Some(format!("Failed to fetch posts from {}: {}", author, e)));
                }
            };

            let recent = posts
                .into_iter()
                .filter(|p| !p.is_reply() && !p.is_repost() && p.timestamp >= cutoff)
                .take(self.config.tracked_posts_per_author);
            for post in recent {
                if seen.insert(post.id.clone()) {
                    merged.push(post);
                }
            }
        }

        (merged, None)
    }

    async fn filter_candidates(&self, posts: Vec<Post>) -> Vec<Post> {
        let mut candidates = Vec::with_capacity(posts.len());

        for post in posts {
            if self.is_own_post(&post) {
                continue;
            }
            if let Some(cursor) = &self.state.cursor {
                if compare_post_ids(&post.id, cursor) != Ordering::Greater {
                    continue;
                }
            }
            if self.state.processed.contains(&post.id) {
                continue;
            }
            let marker = deterministic_id(&post.id, &self.config.agent_id);
            match self.store.exists(&marker).await {
                Ok(true) => {
                    log::debug!("[SCANNER] Skipping already processed post {}", post.id);
                    continue;
                }
                Ok(false) => {}
                // The handler checks again and decides
                Err(e) => log::warn!("[SCANNER] Marker lookup failed for {}: {}", post.id, e),
            }
            candidates.push(post);
        }

        candidates
    }

    fn is_own_post(&self, post: &Post) -> bool {
        post.author_id == self.config.agent_id
            || post.author_username.eq_ignore_ascii_case(&self.config.handle)
    }

    fn reply_cap_reached(&mut self) -> bool {
        let now = self.clock.now();
        if now - self.state.hour_start >= chrono::Duration::hours(1) {
            self.state.hour_start = now;
            self.state.replies_this_hour = 0;
        }
        self.config.max_replies_per_hour > 0
            && self.state.replies_this_hour >= self.config.max_replies_per_hour
    }

    async fn advance_cursor(&mut self, highest: &str) {
        let next = max_post_id(self.state.cursor.as_deref(), Some(highest)).map(|id| id.to_string());
        if next == self.state.cursor {
            return;
        }
        self.state.cursor = next;
        if let Some(cursor) = &self.state.cursor {
            // Everything at or below the cursor is already filtered by it
            self.state
                .processed
                .retain(|id| compare_post_ids(id, cursor) == Ordering::Greater);
            if let Err(e) = self.cursors.save_cursor(&self.config.agent_id, cursor).await {
                log::warn!("[SCANNER] {}", e);
            }
        }
    }
}
