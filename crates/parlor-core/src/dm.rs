use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use parlor_types::models::{DmConversation, DmMessage};

use crate::error::{CoreError, CoreResult};
use crate::history::sanitize_content;

/// Per-thread message bound.
pub const DM_CAP: usize = 100;
const PREVIEW_LEN: usize = 50;

/// Pairwise conversation logs keyed by the two lowercased participant names,
/// sorted lexicographically and joined.
#[derive(Debug, Default)]
pub struct DmStore {
    threads: HashMap<String, VecDeque<DmMessage>>,
}

pub fn thread_key(a: &str, b: &str) -> String {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

impl DmStore {
    pub fn from_snapshot(threads: HashMap<String, Vec<DmMessage>>) -> Self {
        Self {
            threads: threads
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
        }
    }

    /// Store a message in the pair's thread, evicting FIFO past `DM_CAP`.
    /// Persistence of the thread happens regardless of delivery success.
    pub fn send(
        &mut self,
        from: &str,
        to: &str,
        content: Option<&str>,
        attachment: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<DmMessage> {
        if from.to_lowercase() == to.to_lowercase() {
            return Err(CoreError::Rejected("cannot message yourself".into()));
        }
        let content = sanitize_content(content.unwrap_or_default(), attachment.is_some())?;
        let message = DmMessage {
            from: from.to_string(),
            to: to.to_string(),
            content,
            attachment,
            timestamp: now,
        };
        let thread = self.threads.entry(thread_key(from, to)).or_default();
        thread.push_back(message.clone());
        if thread.len() > DM_CAP {
            thread.pop_front();
        }
        Ok(message)
    }

    pub fn history(&self, a: &str, b: &str) -> Vec<DmMessage> {
        self.threads
            .get(&thread_key(a, b))
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Conversation summaries for `name`, most recent first. Threads with no
    /// timestamp sort last.
    pub fn conversations_for(&self, name: &str) -> Vec<DmConversation> {
        let lower = name.to_lowercase();
        let mut conversations: Vec<DmConversation> = self
            .threads
            .values()
            .filter_map(|thread| {
                let last = thread.back()?;
                let other = if last.from.to_lowercase() == lower {
                    &last.to
                } else if last.to.to_lowercase() == lower {
                    &last.from
                } else {
                    return None;
                };
                Some(DmConversation {
                    with: other.clone(),
                    preview: last.content.chars().take(PREVIEW_LEN).collect(),
                    last_timestamp: Some(last.timestamp),
                })
            })
            .collect();
        conversations.sort_by(|a, b| match (b.last_timestamp, a.last_timestamp) {
            (Some(x), Some(y)) => x.cmp(&y),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        conversations
    }

    pub fn all_threads(&self) -> HashMap<String, Vec<DmMessage>> {
        self.threads
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::now;
    use chrono::Duration;

    #[test]
    fn key_is_order_and_case_independent() {
        assert_eq!(thread_key("Ada", "grace"), thread_key("GRACE", "ada"));
    }

    #[test]
    fn thread_caps_at_100_fifo() {
        let mut store = DmStore::default();
        let t = now();
        for i in 0..120 {
            store
                .send("ada", "grace", Some(&format!("m{i}")), None, t)
                .unwrap();
        }
        let history = store.history("grace", "ada");
        assert_eq!(history.len(), DM_CAP);
        assert_eq!(history.first().unwrap().content, "m20");
        assert_eq!(history.last().unwrap().content, "m119");
    }

    #[test]
    fn self_messages_are_rejected() {
        let mut store = DmStore::default();
        assert!(store.send("ada", "Ada", Some("hi"), None, now()).is_err());
    }

    #[test]
    fn conversations_sort_most_recent_first() {
        let mut store = DmStore::default();
        let t = now();
        store.send("ada", "grace", Some("old"), None, t).unwrap();
        store
            .send("ada", "linus", Some("new"), None, t + Duration::seconds(5))
            .unwrap();

        let convs = store.conversations_for("ada");
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].with, "linus");
        assert_eq!(convs[0].preview, "new");
        assert_eq!(convs[1].with, "grace");

        // The other party sees the conversation from their side too.
        let convs = store.conversations_for("grace");
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].with, "ada");
    }
}
