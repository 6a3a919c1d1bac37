//! Deterministic memory ids and record builders.
//!
//! `deterministic_id(post, agent)` is the single idempotency key of the engine:
//! it is both the processed marker and the memory primary key.

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use social_agent_types::{MemoryRecord, Post, ReplyChunk};
use uuid::Uuid;

pub const SOURCE_TWITTER: &str = "twitter";

/// Hash an arbitrary string into a stable UUID-formatted id
pub fn string_to_id(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    // Stamp version 5 / RFC 4122 variant bits so the id is a well-formed UUID
    bytes[6] = (bytes[6] & 0x0f) | 0x50;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes).to_string()
}

/// `hash(post_id + "-" + agent_id)`
pub fn deterministic_id(post_id: &str, agent_id: &str) -> String {
    string_to_id(&format!("{}-{}", post_id, agent_id))
}

/// Room id shared by every post of one conversation
pub fn room_id(conversation_key: &str, agent_id: &str) -> String {
    string_to_id(&format!("{}-{}", conversation_key, agent_id))
}

/// Memory record for an inbound post
pub fn post_record(post: &Post, agent_id: &str) -> MemoryRecord {
    MemoryRecord {
        id: deterministic_id(&post.id, agent_id),
        agent_id: agent_id.to_string(),
        room_id: room_id(post.conversation_key(), agent_id),
        author_id: post.author_id.clone(),
        post_id: post.id.clone(),
        text: post.text.clone(),
        url: post.permanent_url.clone(),
        in_reply_to: post.parent_id.as_deref().map(|id| deterministic_id(id, agent_id)),
        action: None,
        source: SOURCE_TWITTER.to_string(),
        created_at: post.timestamp,
    }
}

/// Memory record for one posted reply chunk, keyed by its own message id
pub fn chunk_record(
    chunk: &ReplyChunk,
    message_id: &str,
    room: &str,
    agent_id: &str,
    created_at: DateTime<Utc>,
) -> MemoryRecord {
    MemoryRecord {
        id: deterministic_id(message_id, agent_id),
        agent_id: agent_id.to_string(),
        room_id: room.to_string(),
        author_id: agent_id.to_string(),
        post_id: message_id.to_string(),
        text: chunk.text.clone(),
        url: chunk.url.clone(),
        in_reply_to: Some(deterministic_id(&chunk.in_reply_to, agent_id)),
        action: chunk.tag.as_action().map(|a| a.to_string()),
        source: SOURCE_TWITTER.to_string(),
        created_at,
    }
}
