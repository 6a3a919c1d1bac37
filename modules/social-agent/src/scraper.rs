//! Best-effort article scraper: title, meta description and readable text.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use social_agent_types::ScrapedArticle;
use std::time::Duration;

use crate::collaborators::Scraper;

/// Cap on extracted article text handed to the investigation
pub const MAX_ARTICLE_CHARS: usize = 20_000;

static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static META_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta\s+[^>]*(?:name|property)\s*=\s*["'](?:og:)?description["'][^>]*content\s*=\s*["']([^"']*)["']"#,
    )
    .unwrap()
});

static META_DESCRIPTION_REVERSED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta\s+[^>]*content\s*=\s*["']([^"']*)["'][^>]*(?:name|property)\s*=\s*["'](?:og:)?description["']"#,
    )
    .unwrap()
});

static HIDDEN_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head)\b.*?</(script|style|noscript|head)\s*>").unwrap()
});

static BLOCK_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|h[1-6]|li|tr|div|section|article)\s*>").unwrap());

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(\d{1,7});").unwrap());

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\x{A0}]+").unwrap());

pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("SocialAgent/1.0 (Article Scraper)")
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedArticle, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch {}: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {} fetching {}", status, url));
        }

        let html = response
            .text()
            .await
            .map_err(|e| format!("Failed to read body of {}: {}", url, e))?;

        Ok(parse_article(url, &html))
    }
}

pub fn parse_article(url: &str, html: &str) -> ScrapedArticle {
    let title = TITLE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .unwrap_or_default();

    let description = META_DESCRIPTION
        .captures(html)
        .or_else(|| META_DESCRIPTION_REVERSED.captures(html))
        .map(|c| decode_entities(c[1].trim()))
        .unwrap_or_default();

    let mut content = extract_text(html);
    if content.chars().count() > MAX_ARTICLE_CHARS {
        content = content.chars().take(MAX_ARTICLE_CHARS).collect();
    }

    ScrapedArticle {
        url: url.to_string(),
        title,
        description,
        content,
    }
}

/// Visible text of an HTML document, one block per line
pub fn extract_text(html: &str) -> String {
    let text = HIDDEN_BLOCKS.replace_all(html, " ");
    let text = BLOCK_BREAKS.replace_all(&text, "\n");
    let text = TAGS.replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(|line| SPACES.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
