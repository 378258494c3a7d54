use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY,
            channel     TEXT NOT NULL,
            author      TEXT NOT NULL,
            content     TEXT NOT NULL,
            attachment  TEXT,
            reply_json  TEXT,
            timestamp   TEXT NOT NULL,
            edited      INTEGER NOT NULL DEFAULT 0,
            edited_at   TEXT,
            token       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel, id);

        CREATE TABLE IF NOT EXISTS reactions (
            message_id  INTEGER NOT NULL,
            emoji       TEXT NOT NULL,
            reactor     TEXT NOT NULL,
            UNIQUE(message_id, emoji, reactor)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS pins (
            message_id  INTEGER PRIMARY KEY,
            author      TEXT NOT NULL,
            content     TEXT NOT NULL,
            pinned_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dms (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_key  TEXT NOT NULL,
            sender      TEXT NOT NULL,
            recipient   TEXT NOT NULL,
            content     TEXT NOT NULL,
            attachment  TEXT,
            timestamp   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_dms_thread
            ON dms(thread_key, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
