//! Bounded-retry research search with deterministic output sanitization.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use social_agent_types::SearchResult;
use std::sync::Arc;

use crate::collaborators::SearchBackend;
use crate::config::SearchConfig;

/// Characters of a non-2xx body kept in the error message
const ERROR_PREVIEW_CHARS: usize = 200;

/// Inline numeric citation markers such as `[1]` or `[2, 3]`
static CITATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*\[\d+(?:\s*,\s*\d+)*\]").unwrap());

/// Meta-commentary opener: "I am currently searching...", "I'm now looking..."
static DISCLAIMER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*I(?:'m|’m|\s+am)\s+(?:currently|now|presently|actively)\b").unwrap()
});

static SOURCES_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*Sources:").unwrap());

/// Reference-list line: `[1] https://...` or a line holding only markers
static CITATION_LIST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[\d+\]\s*)+(?:https?://\S+)?\s*$").unwrap());

/// Clean search output.
///
/// Steps, in order: (a) drop citation markers when no citations came back,
/// (b) drop a leading "I am currently..." line, (c) drop `Sources:` and
/// reference-list lines, (d) drop any remaining markers. The steps repeat until
/// nothing changes, so sanitizing sanitized text is a no-op.
pub fn sanitize(text: &str, has_citations: bool) -> String {
    let mut current = text.to_string();
    loop {
        let next = sanitize_pass(&current, has_citations);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str, has_citations: bool) -> String {
    let mut result = text.to_string();

    if !has_citations {
        result = CITATION_MARKER.replace_all(&result, "").to_string();
    }

    result = strip_leading_disclaimer(&result);

    result = result
        .lines()
        .filter(|line| !SOURCES_LINE.is_match(line) && !CITATION_LIST_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n");

    result = CITATION_MARKER.replace_all(&result, "").to_string();

    result.trim().to_string()
}

fn strip_leading_disclaimer(text: &str) -> String {
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty()).peekable();
    match lines.peek() {
        Some(first) if DISCLAIMER_LINE.is_match(first) => {
            lines.next();
            lines.collect::<Vec<_>>().join("\n")
        }
        _ => text.to_string(),
    }
}

/// Search wrapper retrying the backend up to `max_attempts` times
pub struct ResearchSearch {
    backend: Arc<dyn SearchBackend>,
    max_attempts: u32,
}

impl ResearchSearch {
    pub fn new(backend: Arc<dyn SearchBackend>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Immediate retries, no backoff; the last attempt's error is returned
    pub async fn search(&self, query: &str) -> Result<SearchResult, String> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.backend.query(query).await {
                Ok(raw) => {
                    let has_citations = !raw.citations.is_empty();
                    return Ok(SearchResult {
                        content: sanitize(&raw.content, has_citations),
                        citations: raw.citations,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "[SEARCH] Attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    last_error = e;
                }
            }
        }

        log::error!("[SEARCH] All {} attempts failed for query", self.max_attempts);
        Err(last_error)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Chat-completions style research API (one request per call)
pub struct HttpSearchBackend {
    config: SearchConfig,
    client: reqwest::Client,
}

impl HttpSearchBackend {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn query(&self, query: &str) -> Result<SearchResult, String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Answer with concise, factual findings. Do not describe what you are doing."
                },
                { "role": "user", "content": query }
            ]
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let preview: String = text.chars().take(ERROR_PREVIEW_CHARS).collect();
            return Err(format!("API error ({}): {}", status, preview));
        }

        let data: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| format!("Failed to parse response: {}", e))?;

        let content = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| "No choices returned".to_string())?;

        Ok(SearchResult {
            content,
            citations: data.citations,
        })
    }
}
