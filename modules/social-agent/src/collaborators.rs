//! Seams to the systems the engine consumes but does not implement.
//!
//! The platform client and text generation are supplied by the embedding
//! process. The store, task dispatcher, scraper and search backend have
//! concrete implementations in this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use social_agent_types::{
    ConversationThread, Decision, GeneratedReply, JobPoll, JobSpec, MemoryRecord, Post,
    PostedMessage, ScrapedArticle, SearchResult,
};
use std::time::Duration;

/// Social platform client (authentication and transport rate limits live behind it)
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Most recent posts matching `query`, newest first
    async fn search_recent(&self, query: &str, limit: usize) -> Result<Vec<Post>, String>;

    async fn get_post(&self, id: &str) -> Result<Option<Post>, String>;

    async fn post_reply(&self, text: &str, reply_to_id: &str) -> Result<PostedMessage, String>;
}

/// Conversation/memory store
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool, String>;

    /// Insert a record; saving an id that already exists is a no-op
    async fn save(&self, record: &MemoryRecord) -> Result<(), String>;

    /// Latest `count` records of a room, oldest first
    async fn recent(&self, room_id: &str, count: usize) -> Result<Vec<MemoryRecord>, String>;
}

/// Persisted scan watermark, one per agent
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, agent_id: &str) -> Result<Option<String>, String>;

    async fn save_cursor(&self, agent_id: &str, cursor: &str) -> Result<(), String>;
}

/// Audit trail linking investigation jobs to the replies they produced
#[async_trait]
pub trait InvestigationLog: Send + Sync {
    async fn link_reply(
        &self,
        job_id: &str,
        post_id: &str,
        reply: &PostedMessage,
    ) -> Result<(), String>;

    async fn reply_for_job(&self, job_id: &str) -> Result<Option<String>, String>;
}

/// Everything the model sees when deciding or writing a reply
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub agent_handle: String,
    pub post: Post,
    pub thread: ConversationThread,
    /// `@author: text` rendering of the thread
    pub formatted_thread: String,
    pub recent: Vec<MemoryRecord>,
    pub media_urls: Vec<String>,
    pub article: Option<ScrapedArticle>,
    /// Investigation findings; outweigh the raw thread when present
    pub primary_context: Option<String>,
}

/// Text-generation service (prompting and model calls live behind it)
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn classify(&self, context: &GenerationContext) -> Result<Decision, String>;

    async fn generate(&self, context: &GenerationContext) -> Result<GeneratedReply, String>;
}

/// External long-running task dispatcher
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn submit(&self, spec: &JobSpec) -> Result<String, String>;

    async fn poll(&self, job_id: &str) -> Result<JobPoll, String>;
}

/// Best-effort article scraper
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedArticle, String>;
}

/// One raw call to the research search API
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn query(&self, query: &str) -> Result<SearchResult, String>;
}

/// Time source for windows, timeouts and poll intervals
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
