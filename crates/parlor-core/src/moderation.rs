use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use parlor_types::models::BanEntry;

use crate::error::{CoreError, CoreResult};

/// Singleton server policy, mutated only by authenticated admin actions.
#[derive(Debug, Clone, Default)]
pub struct ServerPolicy {
    pub private_mode: bool,
    pub access_code: String,
    /// Seconds between accepted messages per sender; 0 disables slow mode.
    pub slow_mode_secs: u64,
    pub mute_all: bool,
}

/// Ban list, policy and the volatile authenticated-admin name set.
/// All name keys are lowercased.
#[derive(Debug, Default)]
pub struct Moderation {
    bans: HashMap<String, BanEntry>,
    policy: ServerPolicy,
    /// Populated on admin login, cleared on disconnect. Lost on reconnect.
    admins: HashSet<String>,
    /// Per-sender time of the last message accepted through the gate.
    last_accepted: HashMap<String, DateTime<Utc>>,
}

impl Moderation {
    pub fn policy(&self) -> &ServerPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut ServerPolicy {
        &mut self.policy
    }

    /// Lazy-expiry read: an entry with a past, non-permanent expiry is
    /// removed and treated as absent.
    pub fn is_banned(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        let key = name.to_lowercase();
        match self.bans.get(&key) {
            None => false,
            Some(entry) if entry.permanent => true,
            Some(entry) => match entry.expires_at {
                Some(expiry) if expiry <= now => {
                    self.bans.remove(&key);
                    false
                }
                _ => true,
            },
        }
    }

    /// Insert or overwrite a ban. Duration 0 means permanent, and so does
    /// any duration too large to yield a representable expiry time.
    pub fn ban(&mut self, name: &str, duration_minutes: u64, now: DateTime<Utc>) -> BanEntry {
        let expires_at = (duration_minutes > 0)
            .then(|| {
                i64::try_from(duration_minutes)
                    .ok()
                    .and_then(Duration::try_minutes)
                    .and_then(|d| now.checked_add_signed(d))
            })
            .flatten();
        let permanent = expires_at.is_none();
        let entry = BanEntry {
            name: name.to_string(),
            banned_at: now,
            expires_at,
            permanent,
        };
        self.bans.insert(name.to_lowercase(), entry.clone());
        entry
    }

    pub fn unban(&mut self, name: &str) -> bool {
        self.bans.remove(&name.to_lowercase()).is_some()
    }

    /// Live (unexpired) ban entries, pruning expired ones on the way.
    pub fn banned_users(&mut self, now: DateTime<Utc>) -> Vec<BanEntry> {
        self.sweep_expired(now);
        let mut entries: Vec<BanEntry> = self.bans.values().cloned().collect();
        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        entries
    }

    /// Opportunistic sweep; lazy expiry on the read paths stays authoritative.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) {
        self.bans.retain(|_, entry| {
            entry.permanent || entry.expires_at.is_none_or(|expiry| expiry > now)
        });
    }

    /// Admission check for a join attempt in private mode.
    pub fn check_access(&self, supplied_code: Option<&str>) -> CoreResult<()> {
        if self.policy.private_mode && supplied_code != Some(self.policy.access_code.as_str()) {
            return Err(CoreError::AccessDenied("invalid access code".into()));
        }
        Ok(())
    }

    /// Message admission gate, evaluated before any message is appended.
    /// Records the accepted time on success.
    pub fn check_admission(&mut self, name: &str, now: DateTime<Utc>) -> CoreResult<()> {
        let key = name.to_lowercase();
        let exempt = self.admins.contains(&key);

        if self.policy.mute_all && !exempt {
            return Err(CoreError::Muted);
        }

        if self.policy.slow_mode_secs > 0 && !exempt {
            if let Some(last) = self.last_accepted.get(&key) {
                let elapsed_ms = (now - *last).num_milliseconds().max(0) as u64;
                let interval_ms = self.policy.slow_mode_secs * 1000;
                if elapsed_ms < interval_ms {
                    // Remaining wait, rounded up to whole seconds.
                    let remaining = (interval_ms - elapsed_ms).div_ceil(1000);
                    return Err(CoreError::SlowMode { remaining });
                }
            }
        }

        self.last_accepted.insert(key, now);
        Ok(())
    }

    pub fn is_admin(&self, name: &str) -> bool {
        self.admins.contains(&name.to_lowercase())
    }

    pub fn login_admin(&mut self, name: &str) {
        debug!(name, "admin authenticated");
        self.admins.insert(name.to_lowercase());
    }

    pub fn logout_admin(&mut self, name: &str) {
        self.admins.remove(&name.to_lowercase());
    }

    /// Carry name-keyed side state across a rename.
    pub fn carry_rename(&mut self, old_name: &str, new_name: &str) {
        let old_key = old_name.to_lowercase();
        let new_key = new_name.to_lowercase();
        if self.admins.remove(&old_key) {
            self.admins.insert(new_key.clone());
        }
        if let Some(ts) = self.last_accepted.remove(&old_key) {
            self.last_accepted.insert(new_key, ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::now;

    #[test]
    fn permanent_ban_never_expires() {
        let mut m = Moderation::default();
        let t = now();
        m.ban("Mallory", 0, t);
        assert!(m.is_banned("mallory", t + Duration::days(365)));
    }

    #[test]
    fn timed_ban_expires_lazily() {
        let mut m = Moderation::default();
        let t = now();
        m.ban("mallory", 10, t);
        assert!(m.is_banned("Mallory", t + Duration::minutes(9)));
        // Past the expiry the identical check passes and the entry is gone.
        assert!(!m.is_banned("mallory", t + Duration::minutes(11)));
        assert!(m.banned_users(t + Duration::minutes(11)).is_empty());
    }

    #[test]
    fn oversized_ban_duration_becomes_permanent() {
        let mut m = Moderation::default();
        let t = now();
        // A duration no expiry time can represent must not wrap into the
        // past and let the target rejoin immediately.
        let entry = m.ban("mallory", u64::MAX, t);
        assert!(entry.permanent);
        assert!(m.is_banned("mallory", t));
        assert!(m.is_banned("mallory", t + Duration::days(365 * 100)));
        assert_eq!(m.banned_users(t).len(), 1);
    }

    #[test]
    fn ban_overwrite_replaces_duration() {
        let mut m = Moderation::default();
        let t = now();
        m.ban("mallory", 5, t);
        m.ban("mallory", 0, t);
        assert!(m.is_banned("mallory", t + Duration::days(10)));
    }

    #[test]
    fn private_mode_requires_matching_code() {
        let mut m = Moderation::default();
        assert!(m.check_access(None).is_ok());
        m.policy_mut().private_mode = true;
        m.policy_mut().access_code = "sesame".into();
        assert!(matches!(
            m.check_access(Some("wrong")),
            Err(CoreError::AccessDenied(_))
        ));
        assert!(matches!(m.check_access(None), Err(CoreError::AccessDenied(_))));
        assert!(m.check_access(Some("sesame")).is_ok());
    }

    #[test]
    fn mute_blocks_non_admins_only() {
        let mut m = Moderation::default();
        m.policy_mut().mute_all = true;
        let t = now();
        assert!(matches!(m.check_admission("ada", t), Err(CoreError::Muted)));
        m.login_admin("ada");
        assert!(m.check_admission("ada", t).is_ok());
    }

    #[test]
    fn slow_mode_reports_remaining_seconds_rounded_up() {
        let mut m = Moderation::default();
        m.policy_mut().slow_mode_secs = 10;
        let t = now();
        assert!(m.check_admission("ada", t).is_ok());
        // 3.5s elapsed of a 10s interval: 6.5s left, reported as 7.
        let err = m
            .check_admission("ada", t + Duration::milliseconds(3500))
            .unwrap_err();
        match err {
            CoreError::SlowMode { remaining } => assert_eq!(remaining, 7),
            other => panic!("unexpected error: {other:?}"),
        }
        // A rejected message must not reset the window.
        assert!(m.check_admission("ada", t + Duration::seconds(10)).is_ok());
    }

    #[test]
    fn rename_carries_admin_flag_and_slow_mode_clock() {
        let mut m = Moderation::default();
        m.policy_mut().slow_mode_secs = 10;
        let t = now();
        m.login_admin("ada");
        assert!(m.check_admission("grace", t).is_ok());

        m.carry_rename("Ada", "Ada2");
        assert!(m.is_admin("ada2"));
        assert!(!m.is_admin("ada"));

        m.carry_rename("grace", "hopper");
        assert!(matches!(
            m.check_admission("hopper", t + Duration::seconds(2)),
            Err(CoreError::SlowMode { .. })
        ));
    }
}
