//! In-memory fakes for every collaborator, shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use social_agent_types::{
    compare_post_ids, ConversationThread, Decision, GeneratedReply, InvestigationFindings,
    JobPoll, JobSpec, JobStatus, MemoryRecord, Post, PostedMessage, ScrapedArticle,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;

use crate::collaborators::{
    Clock, CursorStore, GenerationContext, InvestigationLog, MemoryStore, PlatformClient, Scraper,
    TaskDispatcher, TextGenerator,
};
use crate::config::{defaults, AgentConfig};
use crate::thread::{format_thread, MAX_THREAD_CONTEXT_CHARS};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Top-level post by `author` at `base_time()`
pub fn post(id: &str, author: &str, text: &str) -> Post {
    Post {
        id: id.to_string(),
        author_id: author.to_string(),
        author_username: author.to_string(),
        text: text.to_string(),
        timestamp: base_time(),
        conversation_id: None,
        parent_id: None,
        reply_parent: None,
        quoted: None,
        retweeted: None,
        media_urls: Vec::new(),
        urls: Vec::new(),
        permanent_url: Some(format!("https://x.com/{}/status/{}", author, id)),
    }
}

pub fn agent_config() -> AgentConfig {
    AgentConfig {
        agent_id: "agent".to_string(),
        handle: "agent".to_string(),
        tracked_authors: Vec::new(),
        scan_interval_secs: defaults::SCAN_INTERVAL_SECS,
        mention_fetch_limit: defaults::MENTION_FETCH_LIMIT,
        tracked_posts_per_author: defaults::TRACKED_POSTS_PER_AUTHOR,
        recency_window_minutes: defaults::RECENCY_WINDOW_MINUTES,
        max_thread_depth: defaults::MAX_THREAD_DEPTH,
        max_post_length: defaults::MAX_POST_LENGTH,
        dry_run: false,
        max_replies_per_hour: 0,
        database_url: ":memory:".to_string(),
    }
}

/// Context for a standalone post, as the pipeline would build it
pub fn generation_context(handle: &str, post: Post) -> GenerationContext {
    let thread = ConversationThread {
        posts: vec![post.clone()],
    };
    GenerationContext {
        agent_handle: handle.to_string(),
        formatted_thread: format_thread(&thread, MAX_THREAD_CONTEXT_CHARS),
        post,
        thread,
        recent: Vec::new(),
        media_urls: Vec::new(),
        article: None,
        primary_context: None,
    }
}

pub fn status_poll(status: JobStatus) -> JobPoll {
    JobPoll {
        status,
        result: None,
        error: None,
    }
}

pub fn completed_poll(conversation_entry: &str, reply_text: &str) -> JobPoll {
    JobPoll {
        status: JobStatus::Completed,
        result: Some(InvestigationFindings {
            conversation_entry: conversation_entry.to_string(),
            reply_text: reply_text.to_string(),
        }),
        error: None,
    }
}

// =====================================================
// Platform
// =====================================================

#[derive(Default)]
pub struct FakePlatform {
    posts: Mutex<HashMap<String, Post>>,
    searches: Mutex<HashMap<String, Vec<Post>>>,
    failing_searches: Mutex<HashSet<String>>,
    search_queries: Mutex<Vec<String>>,
    failing_gets: Mutex<HashSet<String>>,
    get_post_calls: Mutex<usize>,
    replies: Mutex<Vec<(String, String)>>,
    fail_reply_after: Mutex<Option<usize>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&self, post: Post) {
        self.posts.lock().unwrap().insert(post.id.clone(), post);
    }

    /// Results for `search_recent(query, _)`, newest first as the platform returns them
    pub fn set_search(&self, query: &str, posts: Vec<Post>) {
        self.searches.lock().unwrap().insert(query.to_string(), posts);
    }

    pub fn fail_search(&self, query: &str) {
        self.failing_searches.lock().unwrap().insert(query.to_string());
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.search_queries.lock().unwrap().clone()
    }

    pub fn fail_get_post(&self, id: &str) {
        self.failing_gets.lock().unwrap().insert(id.to_string());
    }

    pub fn get_post_calls(&self) -> usize {
        *self.get_post_calls.lock().unwrap()
    }

    /// Every posted reply as `(text, reply_to_id)`, in posting order
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    /// Let `count` replies succeed, fail every one after
    pub fn fail_reply_after(&self, count: usize) {
        *self.fail_reply_after.lock().unwrap() = Some(count);
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn search_recent(&self, query: &str, limit: usize) -> Result<Vec<Post>, String> {
        self.search_queries.lock().unwrap().push(query.to_string());
        if self.failing_searches.lock().unwrap().contains(query) {
            return Err(format!("search '{}' failed: 503 Service Unavailable", query));
        }
        Ok(self
            .searches
            .lock()
            .unwrap()
            .get(query)
            .map(|posts| posts.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, String> {
        *self.get_post_calls.lock().unwrap() += 1;
        if self.failing_gets.lock().unwrap().contains(id) {
            return Err(format!("fetch {} failed: timeout", id));
        }
        Ok(self.posts.lock().unwrap().get(id).cloned())
    }

    async fn post_reply(&self, text: &str, reply_to_id: &str) -> Result<PostedMessage, String> {
        let mut replies = self.replies.lock().unwrap();
        if let Some(limit) = *self.fail_reply_after.lock().unwrap() {
            if replies.len() >= limit {
                return Err("403 Forbidden".to_string());
            }
        }
        replies.push((text.to_string(), reply_to_id.to_string()));
        let id = (9_000_000 + replies.len()).to_string();
        Ok(PostedMessage {
            url: format!("https://x.com/agent/status/{}", id),
            id,
        })
    }
}

// =====================================================
// Store
// =====================================================

#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<MemoryRecord>>,
    fail_saves: AtomicBool,
    cursors: Mutex<HashMap<String, String>>,
    links: Mutex<HashMap<String, (String, PostedMessage)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.lock().unwrap().iter().any(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<MemoryRecord> {
        self.records.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn cursor(&self, agent_id: &str) -> Option<String> {
        self.cursors.lock().unwrap().get(agent_id).cloned()
    }

    pub fn link_for(&self, job_id: &str) -> Option<(String, PostedMessage)> {
        self.links.lock().unwrap().get(job_id).cloned()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn exists(&self, id: &str) -> Result<bool, String> {
        Ok(self.contains(id))
    }

    async fn save(&self, record: &MemoryRecord) -> Result<(), String> {
        if self.fail_saves.load(AtomicOrdering::SeqCst) {
            return Err(format!("Failed to save memory {}: disk I/O error", record.id));
        }
        let mut records = self.records.lock().unwrap();
        if !records.iter().any(|r| r.id == record.id) {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn recent(&self, room_id: &str, count: usize) -> Result<Vec<MemoryRecord>, String> {
        let records = self.records.lock().unwrap();
        let room: Vec<MemoryRecord> = records.iter().filter(|r| r.room_id == room_id).cloned().collect();
        let skip = room.len().saturating_sub(count);
        Ok(room.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn load_cursor(&self, agent_id: &str) -> Result<Option<String>, String> {
        Ok(self.cursor(agent_id))
    }

    async fn save_cursor(&self, agent_id: &str, cursor: &str) -> Result<(), String> {
        let mut cursors = self.cursors.lock().unwrap();
        let advance = cursors
            .get(agent_id)
            .map_or(true, |current| compare_post_ids(cursor, current) == Ordering::Greater);
        if advance {
            cursors.insert(agent_id.to_string(), cursor.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl InvestigationLog for InMemoryStore {
    async fn link_reply(&self, job_id: &str, post_id: &str, reply: &PostedMessage) -> Result<(), String> {
        self.links
            .lock()
            .unwrap()
            .insert(job_id.to_string(), (post_id.to_string(), reply.clone()));
        Ok(())
    }

    async fn reply_for_job(&self, job_id: &str) -> Result<Option<String>, String> {
        Ok(self.link_for(job_id).map(|(_, reply)| reply.id))
    }
}

// =====================================================
// Generation
// =====================================================

pub struct ScriptedGenerator {
    decision: Decision,
    classify_error: Mutex<Option<String>>,
    replies: Mutex<VecDeque<Result<GeneratedReply, String>>>,
    classify_calls: Mutex<usize>,
    generate_contexts: Mutex<Vec<GenerationContext>>,
}

impl ScriptedGenerator {
    /// Always classifies as `decision`; replies come from `push_reply`, then a default
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            classify_error: Mutex::new(None),
            replies: Mutex::new(VecDeque::new()),
            classify_calls: Mutex::new(0),
            generate_contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: Result<GeneratedReply, String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn fail_classify(&self, error: &str) {
        *self.classify_error.lock().unwrap() = Some(error.to_string());
    }

    pub fn classify_calls(&self) -> usize {
        *self.classify_calls.lock().unwrap()
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_contexts.lock().unwrap().len()
    }

    pub fn generate_contexts(&self) -> Vec<GenerationContext> {
        self.generate_contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn classify(&self, _context: &GenerationContext) -> Result<Decision, String> {
        *self.classify_calls.lock().unwrap() += 1;
        match self.classify_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(self.decision.clone()),
        }
    }

    async fn generate(&self, context: &GenerationContext) -> Result<GeneratedReply, String> {
        self.generate_contexts.lock().unwrap().push(context.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(GeneratedReply {
                text: format!("Thanks for the mention, @{}!", context.post.author_username),
                action: None,
            })
        })
    }
}

// =====================================================
// Task dispatcher & scraper
// =====================================================

#[derive(Default)]
pub struct ScriptedDispatcher {
    submits: Mutex<VecDeque<Result<String, String>>>,
    polls: Mutex<VecDeque<Result<JobPoll, String>>>,
    submit_calls: Mutex<usize>,
    poll_calls: Mutex<usize>,
    specs: Mutex<Vec<JobSpec>>,
}

impl ScriptedDispatcher {
    /// Submits yield `job-1`, `job-2`, ... and polls report pending unless scripted
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, result: Result<String, String>) {
        self.submits.lock().unwrap().push_back(result);
    }

    pub fn push_poll(&self, result: Result<JobPoll, String>) {
        self.polls.lock().unwrap().push_back(result);
    }

    pub fn submit_calls(&self) -> usize {
        *self.submit_calls.lock().unwrap()
    }

    pub fn poll_calls(&self) -> usize {
        *self.poll_calls.lock().unwrap()
    }

    pub fn specs(&self) -> Vec<JobSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskDispatcher for ScriptedDispatcher {
    async fn submit(&self, spec: &JobSpec) -> Result<String, String> {
        let mut calls = self.submit_calls.lock().unwrap();
        *calls += 1;
        self.specs.lock().unwrap().push(spec.clone());
        let n = *calls;
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("job-{}", n)))
    }

    async fn poll(&self, _job_id: &str) -> Result<JobPoll, String> {
        *self.poll_calls.lock().unwrap() += 1;
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status_poll(JobStatus::Pending)))
    }
}

pub struct FakeScraper {
    result: Result<ScrapedArticle, String>,
    calls: Mutex<Vec<String>>,
}

impl FakeScraper {
    pub fn returning(title: &str, content: &str) -> Self {
        Self {
            result: Ok(ScrapedArticle {
                url: String::new(),
                title: title.to_string(),
                description: String::new(),
                content: content.to_string(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            result: Err(error.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedArticle, String> {
        self.calls.lock().unwrap().push(url.to_string());
        self.result.clone().map(|mut article| {
            article.url = url.to_string();
            article
        })
    }
}

// =====================================================
// Clock
// =====================================================

/// Clock that only moves when slept on or advanced
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(base_time()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(by) = chrono::Duration::from_std(duration) {
            self.advance(by);
        }
    }
}

// =====================================================
// HTTP
// =====================================================

/// One-request-per-connection HTTP server answering from a script.
///
/// Responses are served in order; the last one repeats once the script runs out.
pub struct HttpStub {
    pub base_url: String,
    requests: std::sync::Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub async fn serve(responses: Vec<(u16, &str)>) -> Self {
        use tokio::io::AsyncWriteExt;

        let responses: Vec<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                let (status, body) = &responses[served.min(responses.len() - 1)];
                served += 1;
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    /// Raw requests received so far (request line, headers and body)
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    use tokio::io::AsyncReadExt;

    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}
