use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params};

use parlor_types::models::{ChatMessage, DmMessage, PinnedMessage};

use crate::models::{DmRow, MessageRow, pin_row};
use crate::{Database, Snapshot};

impl Database {
    /// One-shot startup load of everything the engine keeps in memory.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        self.with_conn(|conn| {
            Ok(Snapshot {
                messages: query_all_messages(conn)?,
                reactions: query_all_reactions(conn)?,
                pins: query_pins(conn)?,
                dms: query_dm_threads(conn)?,
            })
        })
    }

    /// Insert a message and trim its channel past `channel_cap`, mirroring
    /// the in-memory eviction.
    pub fn insert_message(&self, message: &ChatMessage, channel_cap: usize) -> Result<()> {
        let reply_json = message
            .reply_to
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO messages
                 (id, channel, author, content, attachment, reply_json, timestamp, edited, edited_at, token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id as i64,
                    message.channel,
                    message.author,
                    message.content,
                    message.attachment,
                    reply_json,
                    message.timestamp.to_rfc3339(),
                    message.edited,
                    message.edited_at.map(|t| t.to_rfc3339()),
                    message.token,
                ],
            )?;
            conn.execute(
                "DELETE FROM messages WHERE channel = ?1 AND id NOT IN
                 (SELECT id FROM messages WHERE channel = ?1 ORDER BY id DESC LIMIT ?2)",
                params![message.channel, channel_cap as i64],
            )?;
            // Reactions of trimmed messages go with them.
            conn.execute(
                "DELETE FROM reactions WHERE message_id NOT IN (SELECT id FROM messages)",
                [],
            )?;
            Ok(())
        })
    }

    pub fn update_message(&self, message: &ChatMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET content = ?2, edited = ?3, edited_at = ?4 WHERE id = ?1",
                params![
                    message.id as i64,
                    message.content,
                    message.edited,
                    message.edited_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_message(&self, message_id: u64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [message_id as i64])?;
            conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1",
                [message_id as i64],
            )?;
            Ok(())
        })
    }

    pub fn clear_messages(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages", [])?;
            conn.execute("DELETE FROM reactions", [])?;
            Ok(())
        })
    }

    /// Replace the stored reactor rows for one message with its current map.
    pub fn replace_reactions(
        &self,
        message_id: u64,
        reactions: &HashMap<String, Vec<String>>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1",
                [message_id as i64],
            )?;
            let mut stmt = conn.prepare(
                "INSERT OR IGNORE INTO reactions (message_id, emoji, reactor) VALUES (?1, ?2, ?3)",
            )?;
            for (emoji, reactors) in reactions {
                for reactor in reactors {
                    stmt.execute(params![message_id as i64, emoji, reactor])?;
                }
            }
            Ok(())
        })
    }

    pub fn upsert_pin(&self, pin: &PinnedMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pins (message_id, author, content, pinned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    pin.id as i64,
                    pin.author,
                    pin.content,
                    pin.pinned_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove_pin(&self, message_id: u64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM pins WHERE message_id = ?1", [message_id as i64])?;
            Ok(())
        })
    }

    /// Append a DM and trim its thread past `cap`.
    pub fn insert_dm(&self, thread_key: &str, message: &DmMessage, cap: usize) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO dms (thread_key, sender, recipient, content, attachment, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    thread_key,
                    message.from,
                    message.to,
                    message.content,
                    message.attachment,
                    message.timestamp.to_rfc3339(),
                ],
            )?;
            conn.execute(
                "DELETE FROM dms WHERE thread_key = ?1 AND seq NOT IN
                 (SELECT seq FROM dms WHERE thread_key = ?1 ORDER BY seq DESC LIMIT ?2)",
                params![thread_key, cap as i64],
            )?;
            Ok(())
        })
    }

    /// Full rewrite, used by the shutdown flush.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.with_conn(|conn| {
            let tx_guard = conn.unchecked_transaction()?;
            conn.execute("DELETE FROM messages", [])?;
            conn.execute("DELETE FROM reactions", [])?;
            conn.execute("DELETE FROM pins", [])?;
            conn.execute("DELETE FROM dms", [])?;
            tx_guard.commit()?;
            Ok(())
        })?;
        for message in &snapshot.messages {
            self.insert_message(message, usize::MAX >> 1)?;
        }
        for (message_id, reactions) in &snapshot.reactions {
            self.replace_reactions(*message_id, reactions)?;
        }
        for pin in &snapshot.pins {
            self.upsert_pin(pin)?;
        }
        for (key, thread) in &snapshot.dms {
            for message in thread {
                self.insert_dm(key, message, usize::MAX >> 1)?;
            }
        }
        Ok(())
    }
}

fn query_all_messages(conn: &Connection) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, channel, author, content, attachment, reply_json, timestamp, edited, edited_at, token
         FROM messages ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                channel: row.get(1)?,
                author: row.get(2)?,
                content: row.get(3)?,
                attachment: row.get(4)?,
                reply_json: row.get(5)?,
                timestamp: row.get(6)?,
                edited: row.get(7)?,
                edited_at: row.get(8)?,
                token: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(MessageRow::into_message).collect()
}

fn query_all_reactions(
    conn: &Connection,
) -> Result<HashMap<u64, HashMap<String, Vec<String>>>> {
    let mut stmt = conn.prepare("SELECT message_id, emoji, reactor FROM reactions")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut index: HashMap<u64, HashMap<String, Vec<String>>> = HashMap::new();
    for (message_id, emoji, reactor) in rows {
        index
            .entry(message_id as u64)
            .or_default()
            .entry(emoji)
            .or_default()
            .push(reactor);
    }
    Ok(index)
}

fn query_pins(conn: &Connection) -> Result<Vec<PinnedMessage>> {
    let mut stmt =
        conn.prepare("SELECT message_id, author, content, pinned_at FROM pins ORDER BY pinned_at")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(pin_row(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_dm_threads(conn: &Connection) -> Result<HashMap<String, Vec<DmMessage>>> {
    let mut stmt = conn.prepare(
        "SELECT thread_key, sender, recipient, content, attachment, timestamp
         FROM dms ORDER BY thread_key, seq ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                DmRow {
                    sender: row.get(1)?,
                    recipient: row.get(2)?,
                    content: row.get(3)?,
                    attachment: row.get(4)?,
                    timestamp: row.get(5)?,
                },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut threads: HashMap<String, Vec<DmMessage>> = HashMap::new();
    for (key, row) in rows {
        threads.entry(key).or_default().push(row.into_message());
    }
    Ok(threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(id: u64, channel: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            channel: channel.into(),
            author: "ada".into(),
            content: content.into(),
            attachment: None,
            reply_to: None,
            timestamp: Utc::now(),
            edited: false,
            edited_at: None,
            token: Some("tok".into()),
        }
    }

    #[test]
    fn empty_database_loads_an_empty_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = db.load_snapshot().unwrap();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.reactions.is_empty());
        assert!(snapshot.pins.is_empty());
        assert!(snapshot.dms.is_empty());
    }

    #[test]
    fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parlor.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_message(&msg(1, "general", "persisted"), 200)
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let snapshot = db.load_snapshot().unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].content, "persisted");
    }

    #[test]
    fn messages_round_trip_with_reactions_and_pins() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&msg(1, "general", "hello"), 200).unwrap();
        db.insert_message(&msg(2, "general", "world"), 200).unwrap();

        let mut reactions = HashMap::new();
        reactions.insert("👍".to_string(), vec!["grace".to_string()]);
        db.replace_reactions(1, &reactions).unwrap();
        db.upsert_pin(&PinnedMessage {
            id: 2,
            author: "ada".into(),
            content: "world".into(),
            pinned_at: Utc::now(),
        })
        .unwrap();

        let snapshot = db.load_snapshot().unwrap();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].id, 1);
        assert_eq!(snapshot.messages[0].token.as_deref(), Some("tok"));
        assert_eq!(snapshot.reactions[&1]["👍"], vec!["grace".to_string()]);
        assert_eq!(snapshot.pins.len(), 1);
    }

    #[test]
    fn insert_trims_channel_and_orphan_reactions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&msg(1, "general", "first"), 2).unwrap();
        let mut reactions = HashMap::new();
        reactions.insert("🎉".to_string(), vec!["grace".to_string()]);
        db.replace_reactions(1, &reactions).unwrap();

        db.insert_message(&msg(2, "general", "second"), 2).unwrap();
        db.insert_message(&msg(3, "general", "third"), 2).unwrap();

        let snapshot = db.load_snapshot().unwrap();
        let ids: Vec<u64> = snapshot.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(snapshot.reactions.is_empty());
    }

    #[test]
    fn delete_message_removes_its_reactions() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&msg(1, "general", "hi"), 200).unwrap();
        let mut reactions = HashMap::new();
        reactions.insert("👍".to_string(), vec!["grace".to_string()]);
        db.replace_reactions(1, &reactions).unwrap();

        db.delete_message(1).unwrap();
        let snapshot = db.load_snapshot().unwrap();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.reactions.is_empty());
    }

    #[test]
    fn dm_threads_trim_and_group_by_key() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            let dm = DmMessage {
                from: "ada".into(),
                to: "grace".into(),
                content: format!("m{i}"),
                attachment: None,
                timestamp: Utc::now(),
            };
            db.insert_dm("ada:grace", &dm, 3).unwrap();
        }
        let snapshot = db.load_snapshot().unwrap();
        let thread = &snapshot.dms["ada:grace"];
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[0].content, "m2");
        assert_eq!(thread[2].content, "m4");
    }
}
