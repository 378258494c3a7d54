use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Entries older than this are stale.
pub const TYPING_EXPIRY_SECS: i64 = 5;

/// Ephemeral per-connection "typing since" timestamps tagged with a channel.
/// Expiry is incidental to the read path; the periodic sweep only exists so
/// watchers see stale names disappear without another keystroke.
#[derive(Debug, Default)]
pub struct TypingTracker {
    entries: HashMap<Uuid, (String, DateTime<Utc>)>,
}

impl TypingTracker {
    /// Set or refresh the timestamp for a connection.
    pub fn start(&mut self, conn_id: Uuid, channel: String, now: DateTime<Utc>) {
        self.entries.insert(conn_id, (channel, now));
    }

    /// Returns the channel the connection was typing in, if any.
    pub fn stop(&mut self, conn_id: Uuid) -> Option<String> {
        self.entries.remove(&conn_id).map(|(channel, _)| channel)
    }

    /// Currently-typing connections for one channel: timestamp present, still
    /// connected, age under the expiry. Stale entries are removed on the way.
    pub fn typing_in(
        &mut self,
        channel: &str,
        now: DateTime<Utc>,
        live: &HashSet<Uuid>,
    ) -> Vec<Uuid> {
        self.prune(now, live);
        self.entries
            .iter()
            .filter(|(_, (c, _))| c == channel)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop stale and disconnected entries; returns the channels that lost
    /// at least one entry, so their typing lists can be re-broadcast.
    pub fn sweep(&mut self, now: DateTime<Utc>, live: &HashSet<Uuid>) -> Vec<String> {
        let mut affected: Vec<String> = Vec::new();
        let cutoff = now - Duration::seconds(TYPING_EXPIRY_SECS);
        self.entries.retain(|conn_id, (channel, started)| {
            let keep = *started > cutoff && live.contains(conn_id);
            if !keep && !affected.contains(channel) {
                affected.push(channel.clone());
            }
            keep
        });
        affected
    }

    fn prune(&mut self, now: DateTime<Utc>, live: &HashSet<Uuid>) {
        let cutoff = now - Duration::seconds(TYPING_EXPIRY_SECS);
        self.entries
            .retain(|conn_id, (_, started)| *started > cutoff && live.contains(conn_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::now;

    #[test]
    fn start_refreshes_and_stop_removes() {
        let mut tracker = TypingTracker::default();
        let conn = Uuid::new_v4();
        let live: HashSet<Uuid> = [conn].into();
        let t = now();

        tracker.start(conn, "general".into(), t);
        assert_eq!(tracker.typing_in("general", t, &live), vec![conn]);
        assert_eq!(tracker.stop(conn).as_deref(), Some("general"));
        assert!(tracker.typing_in("general", t, &live).is_empty());
    }

    #[test]
    fn stale_entries_expire_on_read() {
        let mut tracker = TypingTracker::default();
        let conn = Uuid::new_v4();
        let live: HashSet<Uuid> = [conn].into();
        let t = now();

        tracker.start(conn, "general".into(), t);
        let later = t + Duration::seconds(TYPING_EXPIRY_SECS + 1);
        assert!(tracker.typing_in("general", later, &live).is_empty());
        // Removal was a side effect, so stop() finds nothing.
        assert!(tracker.stop(conn).is_none());
    }

    #[test]
    fn disconnected_sessions_are_dropped() {
        let mut tracker = TypingTracker::default();
        let conn = Uuid::new_v4();
        let t = now();

        tracker.start(conn, "general".into(), t);
        assert!(tracker.typing_in("general", t, &HashSet::new()).is_empty());
    }

    #[test]
    fn sweep_reports_affected_channels_once() {
        let mut tracker = TypingTracker::default();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let live: HashSet<Uuid> = [a, b, c].into();
        let t = now();

        tracker.start(a, "general".into(), t);
        tracker.start(b, "general".into(), t);
        tracker.start(c, "random".into(), t + Duration::seconds(4));

        let affected = tracker.sweep(t + Duration::seconds(6), &live);
        assert_eq!(affected, vec!["general".to_string()]);
        assert_eq!(tracker.typing_in("random", t + Duration::seconds(6), &live), vec![c]);
    }
}
