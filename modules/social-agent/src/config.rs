use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const AGENT_ID: &str = "SOCIAL_AGENT_ID";
    pub const AGENT_HANDLE: &str = "SOCIAL_AGENT_HANDLE";
    pub const TRACKED_AUTHORS: &str = "SOCIAL_AGENT_TRACKED_AUTHORS";
    pub const SCAN_INTERVAL_SECS: &str = "SOCIAL_AGENT_SCAN_INTERVAL_SECS";
    pub const MENTION_FETCH_LIMIT: &str = "SOCIAL_AGENT_MENTION_FETCH_LIMIT";
    pub const TRACKED_POSTS_PER_AUTHOR: &str = "SOCIAL_AGENT_TRACKED_POSTS_PER_AUTHOR";
    pub const RECENCY_WINDOW_MINUTES: &str = "SOCIAL_AGENT_RECENCY_WINDOW_MINUTES";
    pub const MAX_THREAD_DEPTH: &str = "SOCIAL_AGENT_MAX_THREAD_DEPTH";
    pub const MAX_POST_LENGTH: &str = "SOCIAL_AGENT_MAX_POST_LENGTH";
    pub const DRY_RUN: &str = "SOCIAL_AGENT_DRY_RUN";
    pub const MAX_REPLIES_PER_HOUR: &str = "SOCIAL_AGENT_MAX_REPLIES_PER_HOUR";
    pub const DATABASE_URL: &str = "SOCIAL_AGENT_DATABASE_URL";
    // Investigation (external task dispatcher)
    pub const INVESTIGATION_API_URL: &str = "INVESTIGATION_API_URL";
    pub const INVESTIGATION_API_KEY: &str = "INVESTIGATION_API_KEY";
    pub const INVESTIGATION_POLL_INTERVAL_MS: &str = "INVESTIGATION_POLL_INTERVAL_MS";
    pub const INVESTIGATION_MAX_ATTEMPTS: &str = "INVESTIGATION_MAX_ATTEMPTS";
    pub const INVESTIGATION_MAX_DURATION_MS: &str = "INVESTIGATION_MAX_DURATION_MS";
    // Research search
    pub const SEARCH_API_URL: &str = "SEARCH_API_URL";
    pub const SEARCH_API_KEY: &str = "SEARCH_API_KEY";
    pub const SEARCH_MODEL: &str = "SEARCH_MODEL";
}

/// Default values
pub mod defaults {
    pub const SCAN_INTERVAL_SECS: u64 = 120;
    pub const MIN_SCAN_INTERVAL_SECS: u64 = 60;
    pub const MENTION_FETCH_LIMIT: usize = 20;
    pub const TRACKED_POSTS_PER_AUTHOR: usize = 3;
    pub const RECENCY_WINDOW_MINUTES: i64 = 120;
    pub const MAX_THREAD_DEPTH: usize = 10;
    pub const MAX_POST_LENGTH: usize = 280;
    pub const DATABASE_URL: &str = "./.db/social_agent.db";
    pub const INVESTIGATION_POLL_INTERVAL_MS: u64 = 10_000;
    pub const INVESTIGATION_MAX_ATTEMPTS: u32 = 1;
    pub const INVESTIGATION_MAX_DURATION_MS: u64 = 15 * 60 * 1000;
    pub const SEARCH_API_URL: &str = "https://api.perplexity.ai/chat/completions";
    pub const SEARCH_MODEL: &str = "sonar";
    pub const SEARCH_MAX_ATTEMPTS: u32 = 3;
}

/// Per-agent scanner and reply configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    /// Handle without the leading `@`
    pub handle: String,
    pub tracked_authors: Vec<String>,
    pub scan_interval_secs: u64,
    pub mention_fetch_limit: usize,
    pub tracked_posts_per_author: usize,
    pub recency_window_minutes: i64,
    pub max_thread_depth: usize,
    pub max_post_length: usize,
    pub dry_run: bool,
    /// 0 = unlimited
    pub max_replies_per_hour: u32,
    pub database_url: String,
}

impl AgentConfig {
    /// Load `.env` (if present) and build the config from the process environment
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let handle = get(env_vars::AGENT_HANDLE)
            .map(|h| h.trim_start_matches('@').to_string())
            .ok_or_else(|| format!("{} not configured", env_vars::AGENT_HANDLE))?;

        let agent_id = get(env_vars::AGENT_ID).unwrap_or_else(|| handle.to_lowercase());

        let tracked_authors = get(env_vars::TRACKED_AUTHORS)
            .map(|list| {
                list.split(',')
                    .map(|a| a.trim().trim_start_matches('@').to_string())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            agent_id,
            handle,
            tracked_authors,
            scan_interval_secs: parse_or(get(env_vars::SCAN_INTERVAL_SECS), defaults::SCAN_INTERVAL_SECS)
                .max(defaults::MIN_SCAN_INTERVAL_SECS),
            mention_fetch_limit: parse_or(get(env_vars::MENTION_FETCH_LIMIT), defaults::MENTION_FETCH_LIMIT),
            tracked_posts_per_author: parse_or(
                get(env_vars::TRACKED_POSTS_PER_AUTHOR),
                defaults::TRACKED_POSTS_PER_AUTHOR,
            ),
            recency_window_minutes: parse_or(
                get(env_vars::RECENCY_WINDOW_MINUTES),
                defaults::RECENCY_WINDOW_MINUTES,
            ),
            max_thread_depth: parse_or(get(env_vars::MAX_THREAD_DEPTH), defaults::MAX_THREAD_DEPTH).max(1),
            max_post_length: parse_or(get(env_vars::MAX_POST_LENGTH), defaults::MAX_POST_LENGTH).max(1),
            dry_run: get(env_vars::DRY_RUN)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            max_replies_per_hour: parse_or(get(env_vars::MAX_REPLIES_PER_HOUR), 0),
            database_url: get(env_vars::DATABASE_URL).unwrap_or_else(|| defaults::DATABASE_URL.to_string()),
        })
    }
}

/// Settings for submitting and polling investigation jobs
#[derive(Debug, Clone)]
pub struct InvestigationConfig {
    pub api_url: String,
    pub api_key: String,
    pub poll_interval_ms: u64,
    /// Submissions per investigation; 1 = submit once, then poll until done or timed out
    pub max_attempts: u32,
    pub max_duration_ms: u64,
}

impl InvestigationConfig {
    /// Investigation settings from the environment; fails when the dispatcher isn't configured
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = get(env_vars::INVESTIGATION_API_URL)
            .ok_or_else(|| format!("{} not configured", env_vars::INVESTIGATION_API_URL))?;
        let api_key = get(env_vars::INVESTIGATION_API_KEY)
            .ok_or_else(|| format!("{} not configured", env_vars::INVESTIGATION_API_KEY))?;

        Ok(Self {
            api_url,
            api_key,
            poll_interval_ms: parse_or(
                get(env_vars::INVESTIGATION_POLL_INTERVAL_MS),
                defaults::INVESTIGATION_POLL_INTERVAL_MS,
            )
            .max(1),
            max_attempts: parse_or(
                get(env_vars::INVESTIGATION_MAX_ATTEMPTS),
                defaults::INVESTIGATION_MAX_ATTEMPTS,
            )
            .max(1),
            max_duration_ms: parse_or(
                get(env_vars::INVESTIGATION_MAX_DURATION_MS),
                defaults::INVESTIGATION_MAX_DURATION_MS,
            ),
        })
    }
}

/// Settings for the research search API
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_attempts: u32,
}

impl SearchConfig {
    /// Research search settings from the environment; fails when no API key is configured
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(env_vars::SEARCH_API_KEY)
            .ok_or_else(|| format!("{} not configured", env_vars::SEARCH_API_KEY))?;

        Ok(Self {
            api_url: get(env_vars::SEARCH_API_URL).unwrap_or_else(|| defaults::SEARCH_API_URL.to_string()),
            api_key,
            model: get(env_vars::SEARCH_MODEL).unwrap_or_else(|| defaults::SEARCH_MODEL.to_string()),
            max_attempts: defaults::SEARCH_MAX_ATTEMPTS,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
