//! Social-feed interaction engine.
//!
//! Polls a platform for mentions and tracked-author posts, rebuilds each
//! conversation thread, decides whether to reply directly or investigate, and
//! posts chunked, chained replies. Every inbound post is handled at most once
//! per agent, keyed by its deterministic memory id.
//!
//! The platform client and text generation are supplied by the embedding
//! process through the traits in [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod db;
pub mod interaction;
pub mod investigation;
pub mod media;
pub mod memory;
pub mod reply;
pub mod runtime;
pub mod scanner;
pub mod scraper;
pub mod search;
pub mod task_client;
pub mod thread;

#[cfg(test)]
mod test_support;

pub use collaborators::{
    Clock, CursorStore, GenerationContext, InvestigationLog, MemoryStore, PlatformClient, Scraper,
    SearchBackend, SystemClock, TaskDispatcher, TextGenerator,
};
pub use config::{AgentConfig, InvestigationConfig, SearchConfig};
pub use db::Db;
pub use interaction::{InteractionHandler, PostOutcome};
pub use investigation::{InvestigationResult, Investigator};
pub use reply::{ReplyDispatcher, ReplyError};
pub use runtime::{build_scanner, run_from_env, AgentServices};
pub use scanner::{MentionScanner, ScannerState, TickReport};
pub use search::ResearchSearch;
pub use social_agent_types as types;

/// Initialize `env_logger` (default level `info`); safe to call more than once
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
