//! Media and link extraction over a post and its related posts.

use once_cell::sync::Lazy;
use regex::Regex;
use social_agent_types::{ConversationThread, Post};
use std::collections::BTreeSet;

/// Bare URLs inside post text
static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'\)\]]+"#).unwrap());

/// Pre-compiled regex for stripping leading @mentions (case-insensitive)
static LEADING_MENTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*@\w+\s*").unwrap());

const MEDIA_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".mp4", ".mov"];
const MEDIA_HOSTS: &[&str] = &["pbs.twimg.com", "video.twimg.com"];
const PLATFORM_HOSTS: &[&str] = &["twitter.com", "x.com", "www.twitter.com", "www.x.com", "mobile.twitter.com"];

/// Every media URL attached to `post` or any post it relates to
pub fn collect_media(post: &Post) -> BTreeSet<String> {
    let mut media = BTreeSet::new();
    collect_media_into(post, &mut media);
    media
}

fn collect_media_into(post: &Post, media: &mut BTreeSet<String>) {
    for related in post.related() {
        media.extend(related.media_urls.iter().cloned());
        if !std::ptr::eq(related, post) {
            collect_media_into(related, media);
        }
    }
}

pub fn is_media_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default();
    let path = parsed.path().to_ascii_lowercase();
    MEDIA_HOSTS.contains(&host) || MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn is_platform_url(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| PLATFORM_HOSTS.contains(&h)))
        .unwrap_or(false)
}

/// Link URLs of one post: structured urls first, then any found in the text
fn post_links(post: &Post) -> Vec<String> {
    let mut links: Vec<String> = post.urls.clone();
    for found in URL_PATTERN.find_iter(&post.text) {
        let url = found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !links.iter().any(|l| l == url) {
            links.push(url.to_string());
        }
    }
    links
}

/// First non-media article link across the current post, its related posts,
/// and then the thread from newest to oldest
pub fn first_article_url(post: &Post, thread: &ConversationThread) -> Option<String> {
    let media = collect_media(post);
    let candidates = post
        .related()
        .into_iter()
        .chain(thread.posts.iter().rev().filter(|p| p.id != post.id));

    for candidate in candidates {
        for link in post_links(candidate) {
            if media.contains(&link) || is_media_url(&link) || is_platform_url(&link) {
                continue;
            }
            if url::Url::parse(&link).is_ok() {
                return Some(link);
            }
        }
    }
    None
}

/// Remove leading @mentions (common in replies) and surrounding whitespace
pub fn extract_command_text(text: &str) -> String {
    let mut result = text.to_string();
    while LEADING_MENTION_PATTERN.is_match(&result) {
        result = LEADING_MENTION_PATTERN.replace(&result, "").to_string();
    }
    result.trim().to_string()
}
