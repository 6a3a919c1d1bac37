//! Shared types for the social agent engine and its task/search service clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// =====================================================
// Posts & Threads
// =====================================================

/// A single platform message, immutable once fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_username: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Conversation (root) identifier, when the platform reports one
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Identifier of the post this one replies to
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Hydrated reply parent, when the platform ships it inline
    #[serde(default)]
    pub reply_parent: Option<Box<Post>>,
    #[serde(default)]
    pub quoted: Option<Box<Post>>,
    #[serde(default)]
    pub retweeted: Option<Box<Post>>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub permanent_url: Option<String>,
}

impl Post {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_repost(&self) -> bool {
        self.retweeted.is_some()
    }

    /// Conversation key used for room ids; standalone posts are their own room
    pub fn conversation_key(&self) -> &str {
        self.conversation_id.as_deref().unwrap_or(&self.id)
    }

    /// Related posts in a fixed order: self, quoted, retweeted, reply parent
    pub fn related(&self) -> Vec<&Post> {
        let mut related = vec![self];
        related.extend(self.quoted.as_deref());
        related.extend(self.retweeted.as_deref());
        related.extend(self.reply_parent.as_deref());
        related
    }
}

/// Order two platform post ids.
///
/// Numeric ids (snowflakes) compare by magnitude without parsing, so ids longer
/// than `u64` still order correctly. Anything else falls back to lexicographic.
pub fn compare_post_ids(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if numeric(a) && numeric(b) {
        let a = a.trim_start_matches('0');
        let b = b.trim_start_matches('0');
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

/// The greater of two optional post ids
pub fn max_post_id<'a>(a: Option<&'a str>, b: Option<&'a str>) -> Option<&'a str> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if compare_post_ids(a, b) == Ordering::Less { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Ordered ancestor chain ending at a leaf post, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub posts: Vec<Post>,
}

impl ConversationThread {
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Conversation root, or the deepest ancestor that could be fetched
    pub fn root(&self) -> Option<&Post> {
        self.posts.first()
    }

    pub fn leaf(&self) -> Option<&Post> {
        self.posts.last()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.posts.iter().map(|p| p.id.as_str()).collect()
    }

    /// True when every post after the first replies to its predecessor
    pub fn is_reply_chain(&self) -> bool {
        self.posts
            .windows(2)
            .all(|pair| pair[1].parent_id.as_deref() == Some(pair[0].id.as_str()))
    }
}

// =====================================================
// Decisions & Actions
// =====================================================

/// Action tag attached to a generated reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Investigate,
    Like,
    Retweet,
    Quote,
    Other(String),
}

impl Action {
    /// Strictly decode a model-produced action token.
    ///
    /// Accepts an optional `[...]` wrapper and any case. Empty, `NONE`, `NULL`,
    /// the reserved `CONTINUE` tag, and anything that isn't a single
    /// `[A-Z0-9_]` word all decode to no action.
    pub fn parse(raw: Option<&str>) -> Option<Action> {
        let token = raw?.trim();
        let token = token
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(token)
            .trim()
            .to_ascii_uppercase();

        if token.is_empty()
            || !token.bytes().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == b'_')
        {
            return None;
        }

        match token.as_str() {
            "NONE" | "NULL" | "CONTINUE" => None,
            _ => Some(Action::from(token)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Investigate => "INVESTIGATE",
            Action::Like => "LIKE",
            Action::Retweet => "RETWEET",
            Action::Quote => "QUOTE",
            Action::Other(name) => name,
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "INVESTIGATE" => Action::Investigate,
            "LIKE" => Action::Like,
            "RETWEET" => Action::Retweet,
            "QUOTE" => Action::Quote,
            other => Action::Other(other.to_string()),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the should-respond gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Respond {
        #[serde(default)]
        action: Option<Action>,
    },
    Ignore,
    Stop,
}

impl Decision {
    pub fn respond() -> Self {
        Decision::Respond { action: None }
    }

    /// Decode a classifier's free-form answer.
    ///
    /// The first word equal to `RESPOND`, `IGNORE` or `STOP` (any case, brackets
    /// allowed) wins. Output with none of them is treated as `Ignore`.
    pub fn parse(raw: &str) -> Self {
        raw.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .find_map(|word| match word.to_ascii_uppercase().as_str() {
                "RESPOND" => Some(Decision::respond()),
                "IGNORE" => Some(Decision::Ignore),
                "STOP" => Some(Decision::Stop),
                _ => None,
            })
            .unwrap_or(Decision::Ignore)
    }

    pub fn is_respond(&self) -> bool {
        matches!(self, Decision::Respond { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Respond { .. } => "RESPOND",
            Decision::Ignore => "IGNORE",
            Decision::Stop => "STOP",
        }
    }
}

/// Reply text plus optional action tag from the generation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
    #[serde(default)]
    pub action: Option<Action>,
}

// =====================================================
// Investigation Jobs
// =====================================================

/// Status of an external investigation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl JobStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" | "queued" => Some(JobStatus::Pending),
            "running" | "in_progress" => Some(JobStatus::Running),
            "completed" | "complete" | "succeeded" => Some(JobStatus::Completed),
            "failed" | "error" => Some(JobStatus::Failed),
            "timed_out" | "timedout" | "timeout" => Some(JobStatus::TimedOut),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut)
    }
}

/// Readable content pulled from a linked article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
}

/// Context handed to the research job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationInput {
    pub thread: ConversationThread,
    pub article: Option<ScrapedArticle>,
    pub post: Post,
}

/// Job submission payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: String,
    pub input: InvestigationInput,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub max_duration_ms: u64,
}

/// Payload of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationFindings {
    /// Research summary; outweighs the raw thread when composing the reply
    pub conversation_entry: String,
    #[serde(default)]
    pub reply_text: String,
}

/// One observation of a job's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPoll {
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<InvestigationFindings>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Local view of a job owned by the external task dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationJob {
    pub id: String,
    pub input: InvestigationInput,
    pub status: JobStatus,
    pub result: Option<InvestigationFindings>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl InvestigationJob {
    pub fn new(id: String, input: InvestigationInput, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            input,
            status: JobStatus::Pending,
            result: None,
            error: None,
            submitted_at,
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
    }

    pub fn mark_completed(&mut self, findings: InvestigationFindings, at: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = Some(findings);
        self.completed_at = Some(at);
    }

    pub fn mark_failed(&mut self, error: String, at: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(at);
    }

    pub fn mark_timed_out(&mut self, waited_ms: u64, at: DateTime<Utc>) {
        self.status = JobStatus::TimedOut;
        self.error = Some(format!("Job did not complete within {}ms", waited_ms));
        self.completed_at = Some(at);
    }
}

// =====================================================
// Replies & Memory
// =====================================================

/// Tag carried by one chunk of a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "action", rename_all = "snake_case")]
pub enum ChunkTag {
    /// More chunks follow
    Continue,
    /// Last chunk, carrying the reply's action
    Final(Option<Action>),
}

impl ChunkTag {
    /// Action string stored on the memory record
    pub fn as_action(&self) -> Option<&str> {
        match self {
            ChunkTag::Continue => Some("CONTINUE"),
            ChunkTag::Final(action) => action.as_ref().map(|a| a.as_str()),
        }
    }
}

/// One length-bounded piece of an outgoing reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyChunk {
    pub index: usize,
    pub text: String,
    pub tag: ChunkTag,
    pub in_reply_to: String,
    /// Platform id once posted; `None` in dry-run mode
    pub message_id: Option<String>,
    pub url: Option<String>,
}

/// Platform response to a posted reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub id: String,
    pub url: String,
}

/// Persisted record for an inbound post or an outbound chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Deterministic id, also the processed marker
    pub id: String,
    pub agent_id: String,
    pub room_id: String,
    pub author_id: String,
    pub post_id: String,
    pub text: String,
    pub url: Option<String>,
    pub in_reply_to: Option<String>,
    pub action: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

// =====================================================
// Research Search
// =====================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

// =====================================================
// Task API Wire Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollJobResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<InvestigationFindings>,
    #[serde(default)]
    pub error: Option<String>,
}
