//! Database row types — these map directly to SQLite rows. Distinct from
//! the parlor-types wire models to keep the store layer independent.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use parlor_types::models::{ChatMessage, DmMessage, PinnedMessage, ReplyRef};

pub struct MessageRow {
    pub id: i64,
    pub channel: String,
    pub author: String,
    pub content: String,
    pub attachment: Option<String>,
    pub reply_json: Option<String>,
    pub timestamp: String,
    pub edited: bool,
    pub edited_at: Option<String>,
    pub token: Option<String>,
}

pub struct DmRow {
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub attachment: Option<String>,
    pub timestamp: String,
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}': {}", raw, e);
        DateTime::default()
    })
}

impl MessageRow {
    pub fn into_message(self) -> Result<ChatMessage> {
        let reply_to = match self.reply_json {
            Some(raw) => Some(serde_json::from_str::<ReplyRef>(&raw)?),
            None => None,
        };
        Ok(ChatMessage {
            id: self.id as u64,
            channel: self.channel,
            author: self.author,
            content: self.content,
            attachment: self.attachment,
            reply_to,
            timestamp: parse_timestamp(&self.timestamp),
            edited: self.edited,
            edited_at: self.edited_at.as_deref().map(parse_timestamp),
            token: self.token,
        })
    }
}

impl DmRow {
    pub fn into_message(self) -> DmMessage {
        DmMessage {
            from: self.sender,
            to: self.recipient,
            content: self.content,
            attachment: self.attachment,
            timestamp: parse_timestamp(&self.timestamp),
        }
    }
}

pub fn pin_row(id: i64, author: String, content: String, pinned_at: String) -> PinnedMessage {
    PinnedMessage {
        id: id as u64,
        author,
        content,
        pinned_at: parse_timestamp(&pinned_at),
    }
}
