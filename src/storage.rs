use crate::api::models::{ChatSummary, UserRef};
use crate::error::{ChatError, ChatResult};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};

pub fn default_db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "example", "MatchChat")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

// Caching the chat list so a failed fetch can still show the last known state
pub struct ChatCache {
    conn: Connection,
}

impl ChatCache {
    pub fn open_default() -> ChatResult<Self> {
        let path = default_db_path().ok_or_else(|| ChatError::Config("no data dir".into()))?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> ChatResult<Self> {
        ensure_dir(path)?;
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> ChatResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ChatResult<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                peer_id TEXT NOT NULL,
                name TEXT NOT NULL,
                last_message TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                raw_json TEXT
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Makes the cached list match `chats`. Rows the server no longer
    /// returns are dropped.
    pub fn replace_chats(&mut self, chats: &[ChatSummary]) -> ChatResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chats", [])?;
        for c in chats {
            let raw = serde_json::to_string(c)?;
            tx.execute(
                r#"
                INSERT INTO chats (id, peer_id, name, last_message, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    peer_id=excluded.peer_id,
                    name=excluded.name,
                    last_message=excluded.last_message,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![c.id, c.user.id, c.user.display_name(), c.last_message, c.timestamp, raw],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn cached_chats(&self, limit: Option<usize>) -> ChatResult<Vec<ChatSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, peer_id, name, last_message, updated_at, raw_json FROM chats ORDER BY updated_at DESC, name ASC LIMIT ?1",
        )?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| {
            let raw: Option<String> = row.get(5)?;
            let id: String = row.get(0)?;
            let peer_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let last_message: String = row.get(3)?;
            let timestamp: DateTime<Utc> = row.get(4)?;
            Ok((raw, ChatSummary {
                id,
                user: UserRef { id: peer_id, first_name: name, last_name: String::new() },
                last_message,
                timestamp,
            }))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (raw, flat) = r?;
            // the raw row keeps first/last name apart; the flat columns are the fallback
            let chat = raw
                .and_then(|s| serde_json::from_str::<ChatSummary>(&s).ok())
                .unwrap_or(flat);
            out.push(chat);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chat(id: &str, peer: &str, minute: u32) -> ChatSummary {
        ChatSummary {
            id: id.into(),
            user: UserRef { id: peer.into(), first_name: "Sara".into(), last_name: "Malik".into() },
            last_message: format!("msg {}", minute),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn stored_list_reads_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChatCache::open(&dir.path().join("cache.sqlite")).unwrap();
        cache.replace_chats(&[chat("c1", "b", 9), chat("c2", "c", 5)]).unwrap();

        let chats = cache.cached_chats(None).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].id, "c1");
        assert_eq!(chats[0].last_message, "msg 9");
        assert_eq!(chats[0].user.last_name, "Malik");
        assert_eq!(chats[1].timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap());
    }

    #[test]
    fn dropped_conversations_leave_the_cache() {
        let mut cache = ChatCache::in_memory().unwrap();
        cache.replace_chats(&[chat("c1", "b", 1), chat("c2", "c", 5)]).unwrap();
        cache.replace_chats(&[chat("c1", "b", 9)]).unwrap();

        let chats = cache.cached_chats(None).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, "c1");
        assert_eq!(chats[0].last_message, "msg 9");
    }

    #[test]
    fn limit_is_applied() {
        let mut cache = ChatCache::in_memory().unwrap();
        cache.replace_chats(&[chat("c1", "b", 1), chat("c2", "c", 2), chat("c3", "d", 3)]).unwrap();
        assert_eq!(cache.cached_chats(Some(2)).unwrap().len(), 2);
    }
}
