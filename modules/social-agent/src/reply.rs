//! Chunked, ordered reply delivery.

use social_agent_types::{Action, ChunkTag, ReplyChunk};
use std::sync::Arc;

use crate::collaborators::{Clock, MemoryStore, PlatformClient};
use crate::memory::chunk_record;

/// Split `text` into chunks of at most `max_chars` characters on line boundaries.
///
/// Lines accumulate while `current + line + 1 <= max_chars`; the overflowing line
/// starts the next chunk. Joining the chunks with `\n` gives back `text`. A single
/// line longer than `max_chars` is hard-split at character boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_chars {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        current = match current.take() {
            Some((mut chunk, len)) if len + line_len + 1 <= max_chars => {
                chunk.push('\n');
                chunk.push_str(line);
                Some((chunk, len + line_len + 1))
            }
            Some((chunk, _)) => {
                chunks.push(chunk);
                Some((line.to_string(), line_len))
            }
            None => Some((line.to_string(), line_len)),
        };
    }

    if let Some((chunk, _)) = current {
        chunks.push(chunk);
    }
    chunks
}

/// CONTINUE for every chunk but the last, which carries the reply's action
pub fn tag_for(index: usize, total: usize, action: &Option<Action>) -> ChunkTag {
    if index + 1 < total {
        ChunkTag::Continue
    } else {
        ChunkTag::Final(action.clone())
    }
}

/// Failure partway through a reply; `posted` is the consistent prefix
#[derive(Debug)]
pub struct ReplyError {
    pub posted: Vec<ReplyChunk>,
    pub message: String,
}

impl std::fmt::Display for ReplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} posted chunk(s))", self.message, self.posted.len())
    }
}

pub struct ReplyDispatcher {
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn MemoryStore>,
    clock: Arc<dyn Clock>,
    agent_id: String,
    max_chars: usize,
    dry_run: bool,
}

impl ReplyDispatcher {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn MemoryStore>,
        clock: Arc<dyn Clock>,
        agent_id: impl Into<String>,
        max_chars: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            platform,
            store,
            clock,
            agent_id: agent_id.into(),
            max_chars,
            dry_run,
        }
    }

    /// Post `text` as a chained reply to `reply_to_id`.
    ///
    /// The first chunk replies to the original post and each later chunk to the
    /// chunk before it. Each chunk's memory is saved before the next is posted.
    pub async fn post(
        &self,
        text: &str,
        reply_to_id: &str,
        action: Option<Action>,
        room_id: &str,
    ) -> Result<Vec<ReplyChunk>, ReplyError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let pieces = split_into_chunks(text, self.max_chars);
        let total = pieces.len();
        let mut posted: Vec<ReplyChunk> = Vec::with_capacity(total);
        let mut in_reply_to = reply_to_id.to_string();

        for (index, piece) in pieces.into_iter().enumerate() {
            let mut chunk = ReplyChunk {
                index,
                text: piece,
                tag: tag_for(index, total, &action),
                in_reply_to: in_reply_to.clone(),
                message_id: None,
                url: None,
            };

            if self.dry_run {
                log::info!(
                    "[REPLY] Dry run: chunk {}/{} to {} ({} chars): {}",
                    index + 1,
                    total,
                    in_reply_to,
                    chunk.text.chars().count(),
                    chunk.text
                );
                posted.push(chunk);
                continue;
            }

            log::info!(
                "[REPLY] Posting chunk {}/{} to {} ({} chars)",
                index + 1,
                total,
                in_reply_to,
                chunk.text.chars().count()
            );

            let message = match self.platform.post_reply(&chunk.text, &in_reply_to).await {
                Ok(message) => message,
                Err(e) => {
                    return Err(ReplyError {
                        posted,
                        message: format!("Failed to post chunk {}/{}: {}", index + 1, total, e),
                    });
                }
            };

            chunk.message_id = Some(message.id.clone());
            chunk.url = Some(message.url.clone());

            let record = chunk_record(&chunk, &message.id, room_id, &self.agent_id, self.clock.now());
            if let Err(e) = self.store.save(&record).await {
                // The chunk is live; stop here so nothing is chained onto an unrecorded post
                posted.push(chunk);
                return Err(ReplyError {
                    posted,
                    message: format!("Failed to record chunk {}: {}", message.id, e),
                });
            }

            in_reply_to = message.id;
            posted.push(chunk);
        }

        Ok(posted)
    }
}
