use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::api::models::{ChatSummary, Message, MessageStatus, UserRef};
use crate::server::config::UserEntry;
use crate::server::error::{ServerError, ServerResult};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        token TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        user_low TEXT NOT NULL,
        user_high TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (user_low, user_high)
    );
    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        conversation_id TEXT NOT NULL REFERENCES conversations(id),
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        read_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages (conversation_id, created_at, seq);
"#;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, created_at, read_at";

/// The unordered pair {a, b} in canonical order.
pub fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let read_at: Option<DateTime<Utc>> = row.get(5)?;
    let status = if read_at.is_some() { MessageStatus::Read } else { MessageStatus::Sent };
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
        status: Some(status),
    })
}

/// Server-side persistence: user directory, conversations and messages.
pub struct ChatDb {
    conn: Mutex<Connection>,
}

impl ChatDb {
    pub fn open(path: &Path) -> ServerResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> ServerResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ServerResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> ServerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ServerError::Internal)
    }

    pub fn upsert_user(&self, user: &UserEntry) -> ServerResult<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO users (id, first_name, last_name, token)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                first_name=excluded.first_name,
                last_name=excluded.last_name,
                token=excluded.token
            "#,
            params![user.id, user.first_name, user.last_name, user.token],
        )?;
        Ok(())
    }

    pub fn user_by_token(&self, token: &str) -> ServerResult<Option<UserRef>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, first_name, last_name FROM users WHERE token = ?1",
                params![token],
                |row| Ok(UserRef { id: row.get(0)?, first_name: row.get(1)?, last_name: row.get(2)? }),
            )
            .optional()?;
        Ok(user)
    }

    pub fn user(&self, id: &str) -> ServerResult<Option<UserRef>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, first_name, last_name FROM users WHERE id = ?1",
                params![id],
                |row| Ok(UserRef { id: row.get(0)?, first_name: row.get(1)?, last_name: row.get(2)? }),
            )
            .optional()?;
        Ok(user)
    }

    /// Stores a message, creating the pair's conversation on first use.
    /// The id and timestamp are assigned here and nowhere else.
    pub fn insert_message(&self, sender_id: &str, receiver_id: &str, content: &str) -> ServerResult<Message> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (low, high) = pair_key(sender_id, receiver_id);
        let now = Utc::now();
        tx.execute(
            "INSERT OR IGNORE INTO conversations (id, user_low, user_high, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![Uuid::new_v4().to_string(), low, high, now],
        )?;
        let conversation_id: String = tx.query_row(
            "SELECT id FROM conversations WHERE user_low = ?1 AND user_high = ?2",
            params![low, high],
            |row| row.get(0),
        )?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            timestamp: now,
            status: Some(MessageStatus::Sent),
        };
        tx.execute(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![message.id, conversation_id, message.sender_id, message.receiver_id, message.content, message.timestamp],
        )?;
        tx.commit()?;
        Ok(message)
    }

    pub fn message(&self, id: &str) -> ServerResult<Option<Message>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
        let msg = conn.query_row(&sql, params![id], message_from_row).optional()?;
        Ok(msg)
    }

    /// Full history of the pair, oldest first.
    pub fn messages_between(&self, me: &str, other: &str) -> ServerResult<Vec<Message>> {
        let conn = self.conn()?;
        let (low, high) = pair_key(me, other);
        let sql = format!(
            r#"
            SELECT {} FROM messages
            WHERE conversation_id = (SELECT id FROM conversations WHERE user_low = ?1 AND user_high = ?2)
            ORDER BY created_at ASC, seq ASC
            "#,
            MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![low, high], message_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Conversations `me` takes part in, most recent activity first.
    pub fn chats_for(&self, me: &str) -> ServerResult<Vec<ChatSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id,
                   CASE WHEN c.user_low = ?1 THEN c.user_high ELSE c.user_low END,
                   COALESCE(u.first_name, ''),
                   COALESCE(u.last_name, ''),
                   m.content,
                   m.created_at
            FROM conversations c
            JOIN messages m ON m.seq = (
                SELECT seq FROM messages
                WHERE conversation_id = c.id
                ORDER BY created_at DESC, seq DESC
                LIMIT 1
            )
            LEFT JOIN users u ON u.id = (CASE WHEN c.user_low = ?1 THEN c.user_high ELSE c.user_low END)
            WHERE c.user_low = ?1 OR c.user_high = ?1
            ORDER BY m.created_at DESC, m.seq DESC
            "#,
        )?;
        let rows = stmt.query_map(params![me], |row| {
            Ok(ChatSummary {
                id: row.get(0)?,
                user: UserRef { id: row.get(1)?, first_name: row.get(2)?, last_name: row.get(3)? },
                last_message: row.get(4)?,
                timestamp: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Records that `reader_id` read the message. Only the receiver may do
    /// that; repeating it keeps the first read time.
    pub fn mark_read(&self, message_id: &str, reader_id: &str) -> ServerResult<Message> {
        let stored = self
            .message(message_id)?
            .ok_or_else(|| ServerError::NotFound(format!("message {}", message_id)))?;
        if stored.receiver_id != reader_id {
            return Err(ServerError::Forbidden("only the receiver can mark a message as read".into()));
        }
        self.conn()?.execute(
            "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
            params![Utc::now(), message_id],
        )?;
        Ok(stored.with_status(MessageStatus::Read))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(ids: &[&str]) -> ChatDb {
        let db = ChatDb::in_memory().unwrap();
        for id in ids {
            db.upsert_user(&UserEntry {
                id: id.to_string(),
                first_name: id.to_uppercase(),
                last_name: "Test".into(),
                token: format!("tok-{id}"),
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn one_conversation_per_unordered_pair() {
        let db = db_with_users(&["a", "b", "c"]);
        db.insert_message("a", "b", "one").unwrap();
        db.insert_message("b", "a", "two").unwrap();
        db.insert_message("a", "c", "three").unwrap();

        let chats_a = db.chats_for("a").unwrap();
        assert_eq!(chats_a.len(), 2);
        let chats_b = db.chats_for("b").unwrap();
        assert_eq!(chats_b.len(), 1);
        let ab = chats_a.iter().find(|c| c.user.id == "b").unwrap();
        assert_eq!(ab.id, chats_b[0].id);
        assert_eq!(chats_b[0].last_message, "two");
        assert_eq!(chats_b[0].user.first_name, "A");

        // fetching again yields the same ids
        assert_eq!(db.chats_for("b").unwrap()[0].id, chats_b[0].id);
    }

    #[test]
    fn history_is_ordered_and_shared() {
        let db = db_with_users(&["a", "b"]);
        let m1 = db.insert_message("a", "b", "first").unwrap();
        let m2 = db.insert_message("b", "a", "second").unwrap();
        let from_a: Vec<_> = db.messages_between("a", "b").unwrap().into_iter().map(|m| m.id).collect();
        let from_b: Vec<_> = db.messages_between("b", "a").unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(from_a, vec![m1.id.clone(), m2.id.clone()]);
        assert_eq!(from_a, from_b);
        assert!(db.messages_between("a", "zz").unwrap().is_empty());
    }

    #[test]
    fn server_assigns_unique_ids() {
        let db = db_with_users(&["a", "b"]);
        let m1 = db.insert_message("a", "b", "same").unwrap();
        let m2 = db.insert_message("a", "b", "same").unwrap();
        assert_ne!(m1.id, m2.id);
        assert_eq!(m1.status, Some(MessageStatus::Sent));
    }

    #[test]
    fn only_receiver_marks_read() {
        let db = db_with_users(&["a", "b"]);
        let m = db.insert_message("a", "b", "hi").unwrap();
        assert!(matches!(db.mark_read(&m.id, "a"), Err(ServerError::Forbidden(_))));
        assert!(matches!(db.mark_read("missing", "b"), Err(ServerError::NotFound(_))));

        let read = db.mark_read(&m.id, "b").unwrap();
        assert_eq!(read.status, Some(MessageStatus::Read));
        assert_eq!(db.message(&m.id).unwrap().unwrap().status, Some(MessageStatus::Read));
        assert!(db.mark_read(&m.id, "b").is_ok());
    }

    #[test]
    fn tokens_resolve_users() {
        let db = db_with_users(&["a"]);
        assert_eq!(db.user_by_token("tok-a").unwrap().unwrap().id, "a");
        assert!(db.user_by_token("tok-x").unwrap().is_none());
        assert!(db.user("a").unwrap().is_some());
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(pair_key("b", "a"), pair_key("a", "b"));
    }
}
