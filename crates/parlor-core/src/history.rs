use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use parlor_types::models::{ChatMessage, PinnedMessage};

use crate::error::{CoreError, CoreResult};

/// Per-channel log bound.
pub const CHANNEL_CAP: usize = 200;
/// Unified legacy log bound.
pub const GLOBAL_CAP: usize = 500;
/// Message content cap, applied before escaping.
pub const MAX_CONTENT_LEN: usize = 2000;
/// Pins and reply snapshots keep a truncated copy of the content.
const PREVIEW_LEN: usize = 100;

/// message id -> emoji -> reactor names. Emptied entries are pruned
/// immediately; entries for evicted messages are collected on eviction.
pub type ReactionIndex = HashMap<u64, HashMap<String, Vec<String>>>;

/// Bounded per-channel logs, a unified legacy mirror, the reaction index
/// and the pinned-message list.
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: HashMap<String, VecDeque<ChatMessage>>,
    global: VecDeque<ChatMessage>,
    reactions: ReactionIndex,
    pins: Vec<PinnedMessage>,
}

/// Trim, cap at `MAX_CONTENT_LEN` chars and HTML-escape message content.
/// Empty content is rejected unless the message carries an attachment.
pub fn sanitize_content(raw: &str, has_attachment: bool) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() && !has_attachment {
        return Err(CoreError::Rejected("message must not be empty".into()));
    }
    let capped: String = trimmed.chars().take(MAX_CONTENT_LEN).collect();
    Ok(escape_html(&capped))
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn truncate_preview(content: &str) -> String {
    content.chars().take(PREVIEW_LEN).collect()
}

impl ChannelStore {
    /// Seed from a loaded snapshot. The global mirror is rebuilt as the most
    /// recent `GLOBAL_CAP` messages across all channels, by id order.
    pub fn from_snapshot(
        messages: Vec<ChatMessage>,
        reactions: ReactionIndex,
        pins: Vec<PinnedMessage>,
    ) -> Self {
        let mut store = Self {
            reactions,
            pins,
            ..Self::default()
        };
        let mut all = messages;
        all.sort_by_key(|m| m.id);
        for msg in all {
            store.append(msg);
        }
        store
    }

    /// Append an accepted message, evicting FIFO past the caps. Reactions of
    /// messages evicted from their owning channel log are collected here.
    pub fn append(&mut self, message: ChatMessage) {
        let log = self.channels.entry(message.channel.clone()).or_default();
        log.push_back(message.clone());
        if log.len() > CHANNEL_CAP {
            if let Some(evicted) = log.pop_front() {
                self.reactions.remove(&evicted.id);
            }
        }
        self.global.push_back(message);
        if self.global.len() > GLOBAL_CAP {
            self.global.pop_front();
        }
    }

    pub fn history(&self, channel: &str) -> Vec<ChatMessage> {
        self.channels
            .get(channel)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn global_len(&self) -> usize {
        self.global.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// All retained messages in id order, for snapshot flushes. Includes
    /// messages evicted from their channel log but still held by the
    /// global mirror, so the legacy log survives a restart too.
    pub fn all_messages(&self) -> Vec<ChatMessage> {
        let mut all: Vec<ChatMessage> = self
            .channels
            .values()
            .flat_map(|log| log.iter().cloned())
            .collect();
        let seen: HashSet<u64> = all.iter().map(|m| m.id).collect();
        all.extend(
            self.global
                .iter()
                .filter(|m| !seen.contains(&m.id))
                .cloned(),
        );
        all.sort_by_key(|m| m.id);
        all
    }

    pub fn find(&self, message_id: u64) -> Option<&ChatMessage> {
        self.channels
            .values()
            .flat_map(|log| log.iter())
            .find(|m| m.id == message_id)
            .or_else(|| self.global.iter().find(|m| m.id == message_id))
    }

    /// Snapshot of the reply target, taken at send time.
    pub fn reply_ref(&self, message_id: u64) -> Option<parlor_types::models::ReplyRef> {
        self.find(message_id).map(|m| parlor_types::models::ReplyRef {
            id: m.id,
            author: m.author.clone(),
            content: truncate_preview(&m.content),
        })
    }

    /// Edit a message in place. Only the original author may edit; content is
    /// re-validated and the edited flag/timestamp set. Returns the new copy.
    pub fn edit_own(
        &mut self,
        message_id: u64,
        requester: &str,
        new_content: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<ChatMessage> {
        let content = sanitize_content(new_content, false)?;
        let author = self
            .find(message_id)
            .map(|m| m.author.clone())
            .ok_or_else(|| CoreError::NotFound("unknown message".into()))?;
        if author != requester {
            return Err(CoreError::Permission("only the author may edit".into()));
        }

        let mut updated = None;
        for copy in self.copies_mut(message_id) {
            copy.content = content.clone();
            copy.edited = true;
            copy.edited_at = Some(now);
            updated = Some(copy.clone());
        }
        updated.ok_or_else(|| CoreError::NotFound("unknown message".into()))
    }

    /// Delete a message. Original author or an authenticated admin only.
    /// Also removes the message's reaction entry.
    pub fn delete(&mut self, message_id: u64, requester: &str, is_admin: bool) -> CoreResult<()> {
        let author = self
            .find(message_id)
            .map(|m| m.author.clone())
            .ok_or_else(|| CoreError::NotFound("unknown message".into()))?;
        if !is_admin && author != requester {
            return Err(CoreError::Permission("only the author may delete".into()));
        }

        for log in self.channels.values_mut() {
            log.retain(|m| m.id != message_id);
        }
        self.global.retain(|m| m.id != message_id);
        self.reactions.remove(&message_id);
        Ok(())
    }

    /// Toggle `name` in the reactor set for (message_id, emoji). Add-when-
    /// present and remove-when-absent are no-ops. Returns the message's
    /// current emoji -> reactors map (empty once fully pruned).
    pub fn react(
        &mut self,
        message_id: u64,
        emoji: &str,
        name: &str,
        add: bool,
    ) -> CoreResult<HashMap<String, Vec<String>>> {
        // Only messages still resident in a channel log may hold reactions.
        // The global mirror can outlive a channel eviction, and eviction is
        // the point where a message's reaction entry is collected.
        if !self.in_channel_log(message_id) {
            return Err(CoreError::NotFound("unknown message".into()));
        }
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().count() > 8 {
            return Err(CoreError::Rejected("invalid emoji".into()));
        }

        let by_emoji = self.reactions.entry(message_id).or_default();
        let reactors = by_emoji.entry(emoji.to_string()).or_default();
        if add {
            if !reactors.iter().any(|r| r == name) {
                reactors.push(name.to_string());
            }
        } else {
            reactors.retain(|r| r != name);
        }
        if reactors.is_empty() {
            by_emoji.remove(emoji);
        }
        let snapshot = by_emoji.clone();
        if by_emoji.is_empty() {
            self.reactions.remove(&message_id);
        }
        Ok(snapshot)
    }

    pub fn reactions_for(&self, channel: &str) -> ReactionIndex {
        let Some(log) = self.channels.get(channel) else {
            return ReactionIndex::default();
        };
        log.iter()
            .filter_map(|m| {
                self.reactions
                    .get(&m.id)
                    .map(|by_emoji| (m.id, by_emoji.clone()))
            })
            .collect()
    }

    pub fn all_reactions(&self) -> &ReactionIndex {
        &self.reactions
    }

    /// Pin a message by snapshot. Pinning twice replaces the old snapshot.
    pub fn pin(&mut self, message_id: u64, now: DateTime<Utc>) -> CoreResult<PinnedMessage> {
        let msg = self
            .find(message_id)
            .ok_or_else(|| CoreError::NotFound("unknown message".into()))?;
        let pinned = PinnedMessage {
            id: msg.id,
            author: msg.author.clone(),
            content: truncate_preview(&msg.content),
            pinned_at: now,
        };
        self.pins.retain(|p| p.id != message_id);
        self.pins.push(pinned.clone());
        Ok(pinned)
    }

    pub fn unpin(&mut self, message_id: u64) -> CoreResult<()> {
        let before = self.pins.len();
        self.pins.retain(|p| p.id != message_id);
        if self.pins.len() == before {
            return Err(CoreError::NotFound("message is not pinned".into()));
        }
        Ok(())
    }

    pub fn pins(&self) -> Vec<PinnedMessage> {
        self.pins.clone()
    }

    /// Truncate both logs and the reaction index. Pins survive.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.global.clear();
        self.reactions.clear();
    }

    fn in_channel_log(&self, message_id: u64) -> bool {
        self.channels
            .values()
            .flat_map(|log| log.iter())
            .any(|m| m.id == message_id)
    }

    fn copies_mut(&mut self, message_id: u64) -> impl Iterator<Item = &mut ChatMessage> {
        self.channels
            .values_mut()
            .flat_map(|log| log.iter_mut())
            .chain(self.global.iter_mut())
            .filter(move |m| m.id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::now;

    fn msg(id: u64, channel: &str, author: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            channel: channel.into(),
            author: author.into(),
            content: content.into(),
            attachment: None,
            reply_to: None,
            timestamp: now(),
            edited: false,
            edited_at: None,
            token: None,
        }
    }

    #[test]
    fn sanitize_escapes_html_and_rejects_empty() {
        assert_eq!(
            sanitize_content("<b>&\"hi\"</b>", false).unwrap(),
            "&lt;b&gt;&amp;&quot;hi&quot;&lt;/b&gt;"
        );
        assert!(sanitize_content("   ", false).is_err());
        // Attachment-only messages may have empty content.
        assert_eq!(sanitize_content("", true).unwrap(), "");
    }

    #[test]
    fn channel_log_keeps_most_recent_200_in_order() {
        let mut store = ChannelStore::default();
        for id in 1..=250u64 {
            store.append(msg(id, "general", "ada", "x"));
        }
        let history = store.history("general");
        assert_eq!(history.len(), CHANNEL_CAP);
        assert_eq!(history.first().unwrap().id, 51);
        assert_eq!(history.last().unwrap().id, 250);
    }

    #[test]
    fn global_log_caps_at_500_across_channels() {
        let mut store = ChannelStore::default();
        for id in 1..=300u64 {
            store.append(msg(id, "a", "ada", "x"));
        }
        for id in 301..=600u64 {
            store.append(msg(id, "b", "ada", "x"));
        }
        assert_eq!(store.global_len(), GLOBAL_CAP);
        // Channel logs are bounded independently.
        assert_eq!(store.history("a").len(), CHANNEL_CAP);
        assert_eq!(store.history("b").len(), CHANNEL_CAP);
    }

    #[test]
    fn snapshot_includes_globally_retained_evictees() {
        let mut store = ChannelStore::default();
        for id in 1..=(CHANNEL_CAP as u64 + 1) {
            store.append(msg(id, "general", "ada", "x"));
        }
        // Message 1 left the channel log but still lives in the global
        // mirror; a flush must not drop it.
        assert_eq!(store.history("general").len(), CHANNEL_CAP);
        let all = store.all_messages();
        assert_eq!(all.len(), CHANNEL_CAP + 1);
        assert_eq!(all.first().unwrap().id, 1);
    }

    #[test]
    fn eviction_collects_reactions() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "first"));
        store.react(1, "👍", "grace", true).unwrap();
        for id in 2..=(CHANNEL_CAP as u64 + 1) {
            store.append(msg(id, "general", "ada", "x"));
        }
        // Message 1 was evicted; its reaction entry went with it.
        assert!(store.all_reactions().get(&1).is_none());
    }

    #[test]
    fn channel_evicted_message_cannot_regain_reactions() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "soon gone"));
        store.react(1, "👍", "grace", true).unwrap();
        for id in 2..=(CHANNEL_CAP as u64 + 1) {
            store.append(msg(id, "general", "ada", "x"));
        }
        // Message 1 is still in the global mirror, but reacting to it must
        // not recreate an entry that no eviction would ever collect.
        assert!(matches!(
            store.react(1, "👍", "grace", true),
            Err(CoreError::NotFound(_))
        ));
        assert!(store.all_reactions().is_empty());
    }

    #[test]
    fn react_toggles_and_prunes_empty_entries() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "hi"));

        let r = store.react(1, "👍", "grace", true).unwrap();
        assert_eq!(r["👍"], vec!["grace".to_string()]);
        // Adding again is a no-op.
        let r = store.react(1, "👍", "grace", true).unwrap();
        assert_eq!(r["👍"].len(), 1);
        // Removing prunes the inner and outer entries.
        let r = store.react(1, "👍", "grace", false).unwrap();
        assert!(r.is_empty());
        assert!(store.all_reactions().is_empty());
        // Removing when absent is a no-op, not an error.
        assert!(store.react(1, "👍", "grace", false).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_message_and_reactions() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "hi"));
        store.react(1, "🎉", "grace", true).unwrap();

        assert!(matches!(
            store.delete(1, "grace", false),
            Err(CoreError::Permission(_))
        ));
        store.delete(1, "ada", false).unwrap();
        assert!(store.history("general").is_empty());
        assert!(store.all_reactions().is_empty());
        // Re-reacting to the deleted id creates no entry.
        assert!(store.react(1, "🎉", "grace", true).is_err());
        assert!(store.all_reactions().is_empty());
    }

    #[test]
    fn admin_may_delete_others_messages() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "hi"));
        store.delete(1, "mod", true).unwrap();
        assert!(store.history("general").is_empty());
    }

    #[test]
    fn edit_is_author_only_and_marks_edited() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "hi"));

        assert!(matches!(
            store.edit_own(1, "grace", "nope", now()),
            Err(CoreError::Permission(_))
        ));
        let updated = store.edit_own(1, "ada", "<i>new</i>", now()).unwrap();
        assert!(updated.edited);
        assert!(updated.edited_at.is_some());
        assert_eq!(updated.content, "&lt;i&gt;new&lt;/i&gt;");
        // Both the channel copy and the global mirror were rewritten.
        assert_eq!(store.history("general")[0].content, updated.content);
    }

    #[test]
    fn pin_survives_eviction_of_the_original() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "keep me"));
        store.pin(1, now()).unwrap();
        for id in 2..=(CHANNEL_CAP as u64 + 10) {
            store.append(msg(id, "general", "ada", "x"));
        }
        assert_eq!(store.pins().len(), 1);
        assert_eq!(store.pins()[0].content, "keep me");
        store.unpin(1).unwrap();
        assert!(matches!(store.unpin(1), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn clear_truncates_logs_and_reactions_but_not_pins() {
        let mut store = ChannelStore::default();
        store.append(msg(1, "general", "ada", "hi"));
        store.pin(1, now()).unwrap();
        store.react(1, "👍", "grace", true).unwrap();
        store.clear();
        assert!(store.history("general").is_empty());
        assert_eq!(store.global_len(), 0);
        assert!(store.all_reactions().is_empty());
        assert_eq!(store.pins().len(), 1);
    }
}
