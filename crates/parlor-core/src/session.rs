use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use parlor_types::models::PresenceEntry;

use crate::error::{CoreError, CoreResult};

pub const MAX_NAME_LEN: usize = 20;

/// One live client connection and its mutable presence data.
/// Destroyed on disconnect — identity is not persisted by the registry.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub conn_id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    /// Opaque client correlation token, carried through to messages verbatim.
    pub token: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages_sent: u64,
    pub replies_sent: u64,
    pub channel: String,
}

/// Maps ephemeral connection ids to sessions and enforces that at most one
/// live session holds any given case-insensitive name.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, UserSession>,
}

/// Trim, cap at `MAX_NAME_LEN` chars and reject empty/whitespace-only names.
pub fn normalize_name(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    let capped: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    if capped.trim().is_empty() {
        return Err(CoreError::Rejected("name must not be empty".into()));
    }
    Ok(capped.trim().to_string())
}

impl SessionRegistry {
    pub fn name_in_use(&self, name: &str, exclude: Option<Uuid>) -> bool {
        let lower = name.to_lowercase();
        self.sessions
            .values()
            .any(|s| Some(s.conn_id) != exclude && s.name.to_lowercase() == lower)
    }

    /// Insert a new session. The name must already be normalized and checked.
    pub fn insert(&mut self, session: UserSession) {
        self.sessions.insert(session.conn_id, session);
    }

    pub fn get(&self, conn_id: Uuid) -> Option<&UserSession> {
        self.sessions.get(&conn_id)
    }

    pub fn get_mut(&mut self, conn_id: Uuid) -> Option<&mut UserSession> {
        self.sessions.get_mut(&conn_id)
    }

    /// Apply the same emptiness/uniqueness checks as `join` and swap the name.
    /// Returns (old name, new name).
    pub fn rename(&mut self, conn_id: Uuid, new_name: &str) -> CoreResult<(String, String)> {
        let name = normalize_name(new_name)?;
        if self.name_in_use(&name, Some(conn_id)) {
            return Err(CoreError::UsernameTaken);
        }
        let session = self
            .sessions
            .get_mut(&conn_id)
            .ok_or_else(|| CoreError::NotFound("no session for connection".into()))?;
        let old = std::mem::replace(&mut session.name, name.clone());
        Ok((old, name))
    }

    pub fn touch(&mut self, conn_id: Uuid, now: DateTime<Utc>) {
        if let Some(s) = self.sessions.get_mut(&conn_id) {
            s.last_activity = now;
        }
    }

    pub fn remove(&mut self, conn_id: Uuid) -> Option<UserSession> {
        self.sessions.remove(&conn_id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&UserSession> {
        let lower = name.to_lowercase();
        self.sessions
            .values()
            .find(|s| s.name.to_lowercase() == lower)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserSession> {
        self.sessions.values()
    }

    /// Presence list, sorted by name for stable output.
    pub fn presence(&self) -> (usize, Vec<PresenceEntry>) {
        let mut users: Vec<PresenceEntry> = self
            .sessions
            .values()
            .map(|s| PresenceEntry {
                name: s.name.clone(),
                avatar: s.avatar.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        (users.len(), users)
    }

    /// Connections whose last activity is older than `cutoff`.
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        self.sessions
            .values()
            .filter(|s| s.last_activity < cutoff)
            .map(|s| s.conn_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::now;

    fn session(name: &str) -> UserSession {
        UserSession {
            conn_id: Uuid::new_v4(),
            name: name.into(),
            avatar: None,
            token: None,
            joined_at: now(),
            last_activity: now(),
            messages_sent: 0,
            replies_sent: 0,
            channel: "general".into(),
        }
    }

    #[test]
    fn normalize_trims_and_caps() {
        assert_eq!(normalize_name("  ada  ").unwrap(), "ada");
        let long = "a".repeat(40);
        assert_eq!(normalize_name(&long).unwrap().chars().count(), MAX_NAME_LEN);
        assert!(normalize_name("   ").is_err());
        assert!(normalize_name("").is_err());
    }

    #[test]
    fn uniqueness_is_case_insensitive() {
        let mut reg = SessionRegistry::default();
        reg.insert(session("Ada"));
        assert!(reg.name_in_use("ada", None));
        assert!(reg.name_in_use("ADA", None));
        assert!(!reg.name_in_use("grace", None));
    }

    #[test]
    fn rename_rejects_taken_name_but_allows_own_case_change() {
        let mut reg = SessionRegistry::default();
        let ada = session("Ada");
        let ada_id = ada.conn_id;
        reg.insert(ada);
        reg.insert(session("Grace"));

        assert!(matches!(
            reg.rename(ada_id, "grace"),
            Err(CoreError::UsernameTaken)
        ));
        // Changing only the case of your own name is not a collision.
        let (old, new) = reg.rename(ada_id, "ADA").unwrap();
        assert_eq!(old, "Ada");
        assert_eq!(new, "ADA");
    }

    #[test]
    fn remove_frees_the_name() {
        let mut reg = SessionRegistry::default();
        let ada = session("ada");
        let id = ada.conn_id;
        reg.insert(ada);
        assert!(reg.name_in_use("ada", None));
        let removed = reg.remove(id).unwrap();
        assert_eq!(removed.name, "ada");
        assert!(!reg.name_in_use("ada", None));
    }
}
