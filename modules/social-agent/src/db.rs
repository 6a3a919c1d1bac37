//! SQLite persistence for memories, scan cursors and investigation links.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use social_agent_types::{compare_post_ids, MemoryRecord, PostedMessage};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::collaborators::{CursorStore, InvestigationLog, MemoryStore};
use crate::config::AgentConfig;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    /// Open the store at the agent's configured database path
    pub fn from_config(config: &AgentConfig) -> SqliteResult<Self> {
        Self::open(&config.database_url)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                post_id TEXT NOT NULL,
                text TEXT NOT NULL,
                url TEXT,
                in_reply_to TEXT,
                action TEXT,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memories_room ON memories(room_id, created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS scanner_cursors (
                agent_id TEXT PRIMARY KEY,
                last_post_id TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS investigation_links (
                job_id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                reply_id TEXT NOT NULL,
                reply_url TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        Ok(())
    }

    pub fn memory_exists(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Returns true if the record was inserted, false if the id already existed
    pub fn insert_memory(&self, record: &MemoryRecord) -> SqliteResult<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO memories (
                id, agent_id, room_id, author_id, post_id, text,
                url, in_reply_to, action, source, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                record.id,
                record.agent_id,
                record.room_id,
                record.author_id,
                record.post_id,
                record.text,
                record.url,
                record.in_reply_to,
                record.action,
                record.source,
                record.created_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_memory(&self, id: &str) -> SqliteResult<Option<MemoryRecord>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, agent_id, room_id, author_id, post_id, text,
                    url, in_reply_to, action, source, created_at
             FROM memories WHERE id = ?1",
            [id],
            row_to_memory,
        )
        .optional()
    }

    /// Latest `count` memories of a room, returned oldest first
    pub fn recent_memories(&self, room_id: &str, count: usize) -> SqliteResult<Vec<MemoryRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, agent_id, room_id, author_id, post_id, text,
                    url, in_reply_to, action, source, created_at
             FROM memories WHERE room_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![room_id, count as i64], row_to_memory)?;
        let mut records = rows.collect::<SqliteResult<Vec<_>>>()?;
        records.reverse();
        Ok(records)
    }

    pub fn count_memories(&self) -> SqliteResult<i64> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
    }

    pub fn get_cursor(&self, agent_id: &str) -> SqliteResult<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT last_post_id FROM scanner_cursors WHERE agent_id = ?1",
            [agent_id],
            |row| row.get(0),
        )
        .optional()
    }

    /// Move the cursor forward; an id at or below the stored one is ignored
    pub fn advance_cursor(&self, agent_id: &str, post_id: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let current: Option<String> = conn
            .query_row(
                "SELECT last_post_id FROM scanner_cursors WHERE agent_id = ?1",
                [agent_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(current) = current {
            if compare_post_ids(post_id, &current) != Ordering::Greater {
                return Ok(false);
            }
        }

        conn.execute(
            "INSERT INTO scanner_cursors (agent_id, last_post_id, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(agent_id) DO UPDATE SET
                last_post_id = excluded.last_post_id,
                updated_at = excluded.updated_at",
            [agent_id, post_id],
        )?;
        Ok(true)
    }

    pub fn insert_investigation_link(
        &self,
        job_id: &str,
        post_id: &str,
        reply_id: &str,
        reply_url: &str,
    ) -> SqliteResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO investigation_links (job_id, post_id, reply_id, reply_url, created_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            [job_id, post_id, reply_id, reply_url],
        )?;
        Ok(())
    }

    pub fn get_investigation_reply(&self, job_id: &str) -> SqliteResult<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT reply_id FROM investigation_links WHERE job_id = ?1",
            [job_id],
            |row| row.get(0),
        )
        .optional()
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> SqliteResult<MemoryRecord> {
    let created_at: DateTime<Utc> = row.get(10)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        room_id: row.get(2)?,
        author_id: row.get(3)?,
        post_id: row.get(4)?,
        text: row.get(5)?,
        url: row.get(6)?,
        in_reply_to: row.get(7)?,
        action: row.get(8)?,
        source: row.get(9)?,
        created_at,
    })
}

#[async_trait]
impl MemoryStore for Db {
    async fn exists(&self, id: &str) -> Result<bool, String> {
        self.memory_exists(id)
            .map_err(|e| format!("Failed to check memory {}: {}", id, e))
    }

    async fn save(&self, record: &MemoryRecord) -> Result<(), String> {
        self.insert_memory(record)
            .map(|_| ())
            .map_err(|e| format!("Failed to save memory {}: {}", record.id, e))
    }

    async fn recent(&self, room_id: &str, count: usize) -> Result<Vec<MemoryRecord>, String> {
        self.recent_memories(room_id, count)
            .map_err(|e| format!("Failed to load recent memories: {}", e))
    }
}

#[async_trait]
impl CursorStore for Db {
    async fn load_cursor(&self, agent_id: &str) -> Result<Option<String>, String> {
        self.get_cursor(agent_id)
            .map_err(|e| format!("Failed to load cursor: {}", e))
    }

    async fn save_cursor(&self, agent_id: &str, cursor: &str) -> Result<(), String> {
        self.advance_cursor(agent_id, cursor)
            .map(|_| ())
            .map_err(|e| format!("Failed to save cursor: {}", e))
    }
}

#[async_trait]
impl InvestigationLog for Db {
    async fn link_reply(
        &self,
        job_id: &str,
        post_id: &str,
        reply: &PostedMessage,
    ) -> Result<(), String> {
        self.insert_investigation_link(job_id, post_id, &reply.id, &reply.url)
            .map_err(|e| format!("Failed to link job {} to reply {}: {}", job_id, reply.id, e))
    }

    async fn reply_for_job(&self, job_id: &str) -> Result<Option<String>, String> {
        self.get_investigation_reply(job_id)
            .map_err(|e| format!("Failed to look up job {}: {}", job_id, e))
    }
}
