use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use parlor_store::{Database, Snapshot};
use parlor_types::events::{AdminAction, ReactionAction, ServerEvent};
use parlor_types::models::{ChatMessage, GameVariant};

use crate::dm::{DM_CAP, DmStore, thread_key};
use crate::error::{CoreError, CoreResult};
use crate::games::GameHub;
use crate::history::{CHANNEL_CAP, ChannelStore, sanitize_content};
use crate::ids::{MessageIdGen, now};
use crate::moderation::Moderation;
use crate::poll::PollStore;
use crate::session::{SessionRegistry, UserSession, normalize_name};
use crate::typing::TypingTracker;

const MAX_CHANNEL_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub admin_secret: String,
    pub default_channel: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            admin_secret: "change-me".into(),
            default_channel: "general".into(),
        }
    }
}

/// The coordinating component that owns all mutable shared state and fans
/// result events out to connected clients. Every map sits behind its own
/// lock; handlers take them one at a time, so each read-modify-write on a
/// single map is atomic relative to every other handler.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    started_at: DateTime<Utc>,
    ids: MessageIdGen,
    store: Option<Arc<Database>>,

    /// Per-connection outbound channels, present from WebSocket accept.
    conns: RwLock<std::collections::HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,
    sessions: RwLock<SessionRegistry>,
    history: RwLock<ChannelStore>,
    moderation: RwLock<Moderation>,
    dms: RwLock<DmStore>,
    typing: RwLock<TypingTracker>,
    polls: RwLock<PollStore>,
    games: RwLock<GameHub>,
}

fn normalize_channel(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_CHANNEL_LEN {
        return Err(CoreError::Rejected("invalid channel name".into()));
    }
    Ok(trimmed.to_string())
}

impl Hub {
    /// Build the engine from a loaded snapshot. Pass `None` as the store to
    /// run purely in memory (tests do).
    pub fn new(config: HubConfig, store: Option<Arc<Database>>, snapshot: Snapshot) -> Self {
        let max_id = snapshot.messages.iter().map(|m| m.id).max().unwrap_or(0);
        Self {
            inner: Arc::new(HubInner {
                config,
                started_at: now(),
                ids: MessageIdGen::starting_at(max_id + 1),
                store,
                conns: RwLock::new(std::collections::HashMap::new()),
                sessions: RwLock::new(SessionRegistry::default()),
                history: RwLock::new(ChannelStore::from_snapshot(
                    snapshot.messages,
                    snapshot.reactions,
                    snapshot.pins,
                )),
                moderation: RwLock::new(Moderation::default()),
                dms: RwLock::new(DmStore::from_snapshot(snapshot.dms)),
                typing: RwLock::new(TypingTracker::default()),
                polls: RwLock::new(PollStore::default()),
                games: RwLock::new(GameHub::default()),
            }),
        }
    }

    // -- Connections & fan-out --

    /// Register an outbound channel for a freshly accepted connection.
    pub async fn register_conn(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.conns.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn send_to(&self, conn_id: Uuid, event: ServerEvent) {
        let conns = self.inner.conns.read().await;
        if let Some(tx) = conns.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Fan an event out: channel-scoped events go to sessions currently in
    /// that channel, everything else to every connection.
    pub async fn broadcast(&self, event: ServerEvent) {
        let conns = self.inner.conns.read().await;
        match event.channel_scope().map(str::to_owned) {
            None => {
                for tx in conns.values() {
                    let _ = tx.send(event.clone());
                }
            }
            Some(channel) => {
                let sessions = self.inner.sessions.read().await;
                for session in sessions.iter().filter(|s| s.channel == channel) {
                    if let Some(tx) = conns.get(&session.conn_id) {
                        let _ = tx.send(event.clone());
                    }
                }
            }
        }
    }

    async fn system_message(&self, text: impl Into<String>) {
        self.broadcast(ServerEvent::SystemMessage {
            text: text.into(),
            timestamp: now(),
        })
        .await;
    }

    async fn broadcast_presence(&self) {
        let (count, users) = self.inner.sessions.read().await.presence();
        self.broadcast(ServerEvent::PresenceUpdate { count, users })
            .await;
    }

    async fn send_history(&self, conn_id: Uuid, channel: &str) {
        let (messages, reactions, pinned) = {
            let history = self.inner.history.read().await;
            (
                history.history(channel),
                history.reactions_for(channel),
                history.pins(),
            )
        };
        self.send_to(
            conn_id,
            ServerEvent::History {
                channel: channel.to_string(),
                messages,
                reactions,
                pinned,
            },
        )
        .await;
    }

    /// Record activity for a connection; called for every inbound command.
    pub async fn touch(&self, conn_id: Uuid) {
        self.inner.sessions.write().await.touch(conn_id, now());
    }

    async fn session_name(&self, conn_id: Uuid) -> CoreResult<String> {
        self.inner
            .sessions
            .read()
            .await
            .get(conn_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| CoreError::Rejected("join first".into()))
    }

    // -- Session registry (join / rename / disconnect) --

    pub async fn join(
        &self,
        conn_id: Uuid,
        name: &str,
        avatar: Option<String>,
        access_code: Option<String>,
        token: Option<String>,
    ) -> CoreResult<()> {
        let name = normalize_name(name)?;
        let t = now();

        {
            let mut moderation = self.inner.moderation.write().await;
            if moderation.is_banned(&name, t) {
                return Err(CoreError::AccessDenied("you are banned".into()));
            }
            moderation.check_access(access_code.as_deref())?;
        }
        {
            let mut sessions = self.inner.sessions.write().await;
            if sessions.get(conn_id).is_some() {
                return Err(CoreError::Rejected("already joined".into()));
            }
            if sessions.name_in_use(&name, None) {
                return Err(CoreError::UsernameTaken);
            }
            sessions.insert(UserSession {
                conn_id,
                name: name.clone(),
                avatar,
                token,
                joined_at: t,
                last_activity: t,
                messages_sent: 0,
                replies_sent: 0,
                channel: self.inner.config.default_channel.clone(),
            });
        }

        info!(%conn_id, name, "user joined");
        self.system_message(format!("{name} joined the chat")).await;
        self.broadcast_presence().await;
        self.send_history(conn_id, &self.inner.config.default_channel)
            .await;

        let conversations = self.inner.dms.read().await.conversations_for(&name);
        self.send_to(conn_id, ServerEvent::DmConversations { conversations })
            .await;
        Ok(())
    }

    pub async fn rename(&self, conn_id: Uuid, new_name: &str) -> CoreResult<()> {
        let (old, new) = self.inner.sessions.write().await.rename(conn_id, new_name)?;
        self.inner.moderation.write().await.carry_rename(&old, &new);

        info!(%conn_id, old, new, "user renamed");
        self.system_message(format!("{old} is now known as {new}"))
            .await;
        self.broadcast_presence().await;
        Ok(())
    }

    /// The synchronous disconnect sequence: end games, clear typing, drop
    /// the session and admin membership, announce the departure. Safe to
    /// call twice; the second call finds nothing to do.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let typing_channel = self.inner.typing.write().await.stop(conn_id);

        let ended = self.inner.games.write().await.remove_conn(conn_id);
        for game in &ended {
            if let Some(opponent) = game.opponent_of(conn_id) {
                self.send_to(
                    opponent.conn_id,
                    ServerEvent::GameOpponentQuit { game_id: game.id },
                )
                .await;
            }
        }

        let removed = self.inner.sessions.write().await.remove(conn_id);
        if let Some(session) = &removed {
            self.inner
                .moderation
                .write()
                .await
                .logout_admin(&session.name);
        }

        self.inner.conns.write().await.remove(&conn_id);

        if let Some(session) = removed {
            info!(%conn_id, name = session.name, "user disconnected");
            self.system_message(format!("{} left the chat", session.name))
                .await;
            self.broadcast_presence().await;
            if let Some(channel) = typing_channel {
                self.broadcast_typing(&channel).await;
            }
        }
    }

    /// Kick path: deliver the reason, then run the disconnect sequence.
    /// Dropping the outbound sender ends the connection's send task, which
    /// closes the socket.
    async fn force_disconnect(&self, conn_id: Uuid, reason: &str) {
        self.send_to(
            conn_id,
            ServerEvent::Kicked {
                reason: reason.to_string(),
            },
        )
        .await;
        self.disconnect(conn_id).await;
    }

    // -- Messages --

    pub async fn send_message(
        &self,
        conn_id: Uuid,
        channel: &str,
        content: &str,
        attachment: Option<String>,
        reply_to: Option<u64>,
    ) -> CoreResult<()> {
        let channel = normalize_channel(channel)?;
        let content = sanitize_content(content, attachment.is_some())?;
        let t = now();

        let (author, token) = {
            let sessions = self.inner.sessions.read().await;
            let session = sessions
                .get(conn_id)
                .ok_or_else(|| CoreError::Rejected("join first".into()))?;
            (session.name.clone(), session.token.clone())
        };

        // Admission gate runs before anything is appended.
        self.inner
            .moderation
            .write()
            .await
            .check_admission(&author, t)?;

        // Missing reply targets degrade to a plain message rather than
        // failing; the target may have been evicted moments ago.
        let reply_ref = match reply_to {
            Some(id) => self.inner.history.read().await.reply_ref(id),
            None => None,
        };
        let is_reply = reply_ref.is_some();

        let message = ChatMessage {
            id: self.inner.ids.next(),
            channel: channel.clone(),
            author,
            content,
            attachment,
            reply_to: reply_ref,
            timestamp: t,
            edited: false,
            edited_at: None,
            token,
        };

        self.inner.history.write().await.append(message.clone());
        {
            let mut sessions = self.inner.sessions.write().await;
            if let Some(session) = sessions.get_mut(conn_id) {
                session.messages_sent += 1;
                if is_reply {
                    session.replies_sent += 1;
                }
            }
        }

        let persisted = message.clone();
        self.persist("insert_message", move |db| {
            db.insert_message(&persisted, CHANNEL_CAP)
        });

        // Sending implies no longer typing.
        if self.inner.typing.write().await.stop(conn_id).is_some() {
            self.broadcast_typing(&channel).await;
        }

        self.broadcast(ServerEvent::NewMessage { message }).await;
        Ok(())
    }

    pub async fn switch_channel(&self, conn_id: Uuid, channel: &str) -> CoreResult<()> {
        let channel = normalize_channel(channel)?;
        {
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions
                .get_mut(conn_id)
                .ok_or_else(|| CoreError::Rejected("join first".into()))?;
            session.channel = channel.clone();
        }
        self.send_history(conn_id, &channel).await;
        Ok(())
    }

    pub async fn edit_message(
        &self,
        conn_id: Uuid,
        message_id: u64,
        new_content: &str,
    ) -> CoreResult<()> {
        let name = self.session_name(conn_id).await?;
        let updated = self
            .inner
            .history
            .write()
            .await
            .edit_own(message_id, &name, new_content, now())?;

        let persisted = updated.clone();
        self.persist("update_message", move |db| db.update_message(&persisted));
        self.broadcast(ServerEvent::MessageEdited { message: updated })
            .await;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        conn_id: Uuid,
        message_id: u64,
        secret: Option<&str>,
    ) -> CoreResult<()> {
        let name = self.session_name(conn_id).await?;
        let is_admin = secret == Some(self.inner.config.admin_secret.as_str())
            || self.inner.moderation.read().await.is_admin(&name);

        self.inner
            .history
            .write()
            .await
            .delete(message_id, &name, is_admin)?;

        self.persist("delete_message", move |db| db.delete_message(message_id));
        // A deletion notice, not a content removal: clients splice by id.
        self.broadcast(ServerEvent::MessageDeleted { message_id })
            .await;
        Ok(())
    }

    pub async fn react(
        &self,
        conn_id: Uuid,
        message_id: u64,
        emoji: &str,
        action: ReactionAction,
    ) -> CoreResult<()> {
        let name = self.session_name(conn_id).await?;
        let add = action == ReactionAction::Add;
        let reactions = self
            .inner
            .history
            .write()
            .await
            .react(message_id, emoji, &name, add)?;

        let persisted = reactions.clone();
        self.persist("replace_reactions", move |db| {
            db.replace_reactions(message_id, &persisted)
        });
        // Reactions are tracked independent of the channel partition, so the
        // updated reactor set goes to everyone.
        self.broadcast(ServerEvent::ReactionUpdate {
            message_id,
            reactions,
        })
        .await;
        Ok(())
    }

    // -- Typing --

    pub async fn typing_start(&self, conn_id: Uuid, channel: &str) -> CoreResult<()> {
        let channel = normalize_channel(channel)?;
        self.session_name(conn_id).await?;
        self.inner
            .typing
            .write()
            .await
            .start(conn_id, channel.clone(), now());
        self.broadcast_typing(&channel).await;
        Ok(())
    }

    pub async fn typing_stop(&self, conn_id: Uuid) -> CoreResult<()> {
        if let Some(channel) = self.inner.typing.write().await.stop(conn_id) {
            self.broadcast_typing(&channel).await;
        }
        Ok(())
    }

    async fn broadcast_typing(&self, channel: &str) {
        let (live, names): (HashSet<Uuid>, std::collections::HashMap<Uuid, String>) = {
            let sessions = self.inner.sessions.read().await;
            (
                sessions.iter().map(|s| s.conn_id).collect(),
                sessions
                    .iter()
                    .map(|s| (s.conn_id, s.name.clone()))
                    .collect(),
            )
        };
        let typing = self
            .inner
            .typing
            .write()
            .await
            .typing_in(channel, now(), &live);
        let names: Vec<String> = typing.iter().filter_map(|id| names.get(id).cloned()).collect();
        self.broadcast(ServerEvent::TypingUpdate {
            channel: channel.to_string(),
            names,
        })
        .await;
    }

    // -- Polls --

    pub async fn create_poll(
        &self,
        conn_id: Uuid,
        question: &str,
        options: Vec<String>,
        channel: &str,
    ) -> CoreResult<()> {
        self.session_name(conn_id).await?;
        let channel = normalize_channel(channel)?;
        let poll = self
            .inner
            .polls
            .write()
            .await
            .create(question, options, &channel)?;
        self.broadcast(ServerEvent::PollCreated { poll }).await;
        Ok(())
    }

    pub async fn vote_poll(
        &self,
        conn_id: Uuid,
        poll_id: Uuid,
        option_index: usize,
    ) -> CoreResult<()> {
        let name = self.session_name(conn_id).await?;
        let poll = self
            .inner
            .polls
            .write()
            .await
            .vote(poll_id, &name, option_index)?;
        self.broadcast(ServerEvent::PollUpdate { poll }).await;
        Ok(())
    }

    // -- Direct messages --

    pub async fn send_dm(
        &self,
        conn_id: Uuid,
        to: &str,
        content: Option<&str>,
        attachment: Option<String>,
    ) -> CoreResult<()> {
        let from = self.session_name(conn_id).await?;
        let message = self
            .inner
            .dms
            .write()
            .await
            .send(&from, to, content, attachment, now())?;

        let key = thread_key(&from, to);
        let persisted = message.clone();
        self.persist("insert_dm", move |db| db.insert_dm(&key, &persisted, DM_CAP));

        // Store-and-maybe-forward: delivery failure does not undo the store.
        let recipient_conn = self
            .inner
            .sessions
            .read()
            .await
            .find_by_name(to)
            .map(|s| s.conn_id);
        if let Some(recipient) = recipient_conn {
            self.send_to(
                recipient,
                ServerEvent::DmReceived {
                    message: message.clone(),
                },
            )
            .await;
        }
        self.send_to(conn_id, ServerEvent::DmReceived { message })
            .await;
        Ok(())
    }

    pub async fn dm_history(&self, conn_id: Uuid, with_name: &str) -> CoreResult<()> {
        let name = self.session_name(conn_id).await?;
        let (messages, conversations) = {
            let dms = self.inner.dms.read().await;
            (dms.history(&name, with_name), dms.conversations_for(&name))
        };
        self.send_to(
            conn_id,
            ServerEvent::DmHistory {
                with: with_name.to_string(),
                messages,
            },
        )
        .await;
        self.send_to(conn_id, ServerEvent::DmConversations { conversations })
            .await;
        Ok(())
    }

    // -- Games --

    pub async fn game_invite(
        &self,
        conn_id: Uuid,
        to: &str,
        variant: GameVariant,
    ) -> CoreResult<()> {
        let from = self.session_name(conn_id).await?;
        let target = self
            .inner
            .sessions
            .read()
            .await
            .find_by_name(to)
            .map(|s| (s.conn_id, s.name.clone()))
            .ok_or_else(|| CoreError::NotFound("player is not online".into()))?;
        if target.0 == conn_id {
            return Err(CoreError::Rejected("cannot invite yourself".into()));
        }

        let invite = self.inner.games.write().await.invite(
            conn_id,
            &from,
            target.0,
            &target.1,
            variant,
            now(),
        );
        self.send_to(
            target.0,
            ServerEvent::GameInviteReceived {
                invite_id: invite.id,
                from,
                variant,
            },
        )
        .await;
        Ok(())
    }

    pub async fn game_accept(&self, conn_id: Uuid, invite_id: Uuid) -> CoreResult<()> {
        self.session_name(conn_id).await?;
        let session = {
            let mut games = self.inner.games.write().await;
            let invite = games.take_invite(invite_id, conn_id, now())?;
            games.start(invite, now())
        };

        for (index, player) in session.players.iter().enumerate() {
            let opponent = &session.players[1 - index];
            self.send_to(
                player.conn_id,
                ServerEvent::GameStart {
                    game_id: session.id,
                    variant: session.board.variant(),
                    opponent: opponent.name.clone(),
                    your_turn: index == 0,
                    player_index: index as u8,
                },
            )
            .await;
        }
        Ok(())
    }

    pub async fn game_decline(&self, conn_id: Uuid, invite_id: Uuid) -> CoreResult<()> {
        let by = self.session_name(conn_id).await?;
        let invite = self
            .inner
            .games
            .write()
            .await
            .take_invite(invite_id, conn_id, now())?;
        self.send_to(
            invite.from_conn,
            ServerEvent::GameInviteDeclined { invite_id, by },
        )
        .await;
        Ok(())
    }

    pub async fn game_move(
        &self,
        conn_id: Uuid,
        game_id: Uuid,
        position: usize,
    ) -> CoreResult<()> {
        self.session_name(conn_id).await?;
        let report = self
            .inner
            .games
            .write()
            .await
            .apply_move(game_id, conn_id, position)?;

        for (index, player) in report.players.iter().enumerate() {
            self.send_to(
                player.conn_id,
                ServerEvent::GameUpdate {
                    game_id,
                    board: report.board.clone(),
                    your_turn: report.next_turn == index as i8,
                    next_turn: report.next_turn,
                    winner: report.winner.clone(),
                    draw: report.draw,
                },
            )
            .await;
        }
        Ok(())
    }

    pub async fn game_quit(&self, conn_id: Uuid, game_id: Uuid) -> CoreResult<()> {
        self.session_name(conn_id).await?;
        let game = self.inner.games.write().await.quit(game_id, conn_id)?;
        if let Some(opponent) = game.opponent_of(conn_id) {
            self.send_to(opponent.conn_id, ServerEvent::GameOpponentQuit { game_id })
                .await;
        }
        Ok(())
    }

    // -- Admin --

    pub async fn admin_login(&self, conn_id: Uuid, secret: &str) -> CoreResult<()> {
        let name = self.session_name(conn_id).await?;
        if secret != self.inner.config.admin_secret {
            warn!(%conn_id, name, "failed admin login");
            self.send_to(
                conn_id,
                ServerEvent::AdminResponse {
                    success: false,
                    message: "unauthorized".into(),
                    data: None,
                },
            )
            .await;
            return Ok(());
        }
        self.inner.moderation.write().await.login_admin(&name);
        self.send_to(
            conn_id,
            ServerEvent::AdminResponse {
                success: true,
                message: "admin authenticated".into(),
                data: None,
            },
        )
        .await;
        Ok(())
    }

    /// Shared-secret-gated dispatcher. A wrong secret gets one generic
    /// rejection, performing nothing and leaking nothing.
    pub async fn admin_action(
        &self,
        conn_id: Uuid,
        secret: &str,
        action: AdminAction,
    ) -> CoreResult<()> {
        self.session_name(conn_id).await?;
        if secret != self.inner.config.admin_secret {
            warn!(%conn_id, "rejected admin action");
            self.send_to(
                conn_id,
                ServerEvent::AdminResponse {
                    success: false,
                    message: "unauthorized".into(),
                    data: None,
                },
            )
            .await;
            return Ok(());
        }

        let (success, message, data) = self.dispatch_admin(conn_id, action).await;
        self.send_to(
            conn_id,
            ServerEvent::AdminResponse {
                success,
                message,
                data,
            },
        )
        .await;
        Ok(())
    }

    async fn dispatch_admin(
        &self,
        caller: Uuid,
        action: AdminAction,
    ) -> (bool, String, Option<serde_json::Value>) {
        let t = now();
        match action {
            AdminAction::Kick { target } => {
                let Some(conn) = self.conn_by_name(&target).await else {
                    return (false, format!("{target} is not online"), None);
                };
                self.force_disconnect(conn, "kicked by an admin").await;
                self.system_message(format!("{target} was kicked")).await;
                (true, format!("kicked {target}"), None)
            }
            AdminAction::Ban {
                target,
                duration_minutes,
            } => {
                self.inner
                    .moderation
                    .write()
                    .await
                    .ban(&target, duration_minutes, t);
                if let Some(conn) = self.conn_by_name(&target).await {
                    self.force_disconnect(conn, "banned").await;
                }
                self.system_message(format!("{target} was banned")).await;
                let detail = if duration_minutes == 0 {
                    "permanently".to_string()
                } else {
                    format!("for {duration_minutes} minutes")
                };
                (true, format!("banned {target} {detail}"), None)
            }
            AdminAction::Unban { target } => {
                if self.inner.moderation.write().await.unban(&target) {
                    (true, format!("unbanned {target}"), None)
                } else {
                    (false, format!("{target} is not banned"), None)
                }
            }
            AdminAction::Rename { target, new_name } => {
                let Some(conn) = self.conn_by_name(&target).await else {
                    return (false, format!("{target} is not online"), None);
                };
                // Bypasses the owner check, not uniqueness.
                match self.rename(conn, &new_name).await {
                    Ok(()) => (true, format!("renamed {target}"), None),
                    Err(e) => (false, e.to_string(), None),
                }
            }
            AdminAction::ClearHistory => {
                self.inner.history.write().await.clear();
                self.persist("clear_messages", |db| db.clear_messages());
                self.system_message("chat history was cleared").await;
                (true, "history cleared".into(), None)
            }
            AdminAction::Broadcast { text } => match sanitize_content(&text, false) {
                Ok(text) => {
                    self.system_message(text).await;
                    (true, "broadcast sent".into(), None)
                }
                Err(e) => (false, e.to_string(), None),
            },
            AdminAction::Pin { message_id } => {
                match self.inner.history.write().await.pin(message_id, t) {
                    Ok(pin) => {
                        let persisted = pin.clone();
                        self.persist("upsert_pin", move |db| db.upsert_pin(&persisted));
                        self.system_message(format!("a message from {} was pinned", pin.author))
                            .await;
                        (true, "pinned".into(), None)
                    }
                    Err(e) => (false, e.to_string(), None),
                }
            }
            AdminAction::Unpin { message_id } => {
                match self.inner.history.write().await.unpin(message_id) {
                    Ok(()) => {
                        self.persist("remove_pin", move |db| db.remove_pin(message_id));
                        (true, "unpinned".into(), None)
                    }
                    Err(e) => (false, e.to_string(), None),
                }
            }
            AdminAction::SetPrivate { enabled } => {
                self.inner.moderation.write().await.policy_mut().private_mode = enabled;
                (true, format!("private mode {}", on_off(enabled)), None)
            }
            AdminAction::SetAccessCode { code } => {
                self.inner.moderation.write().await.policy_mut().access_code = code;
                (true, "access code updated".into(), None)
            }
            AdminAction::SlowMode { seconds } => {
                self.inner
                    .moderation
                    .write()
                    .await
                    .policy_mut()
                    .slow_mode_secs = seconds;
                if seconds == 0 {
                    self.system_message("slow mode is off").await;
                } else {
                    self.system_message(format!("slow mode is on: one message per {seconds}s"))
                        .await;
                }
                (true, "slow mode updated".into(), None)
            }
            AdminAction::MuteAll { enabled } => {
                self.inner.moderation.write().await.policy_mut().mute_all = enabled;
                self.system_message(format!("server mute {}", on_off(enabled)))
                    .await;
                (true, format!("mute {}", on_off(enabled)), None)
            }
            AdminAction::KickAll => {
                let targets: Vec<Uuid> = self
                    .inner
                    .sessions
                    .read()
                    .await
                    .iter()
                    .map(|s| s.conn_id)
                    .filter(|id| *id != caller)
                    .collect();
                let count = targets.len();
                for conn in targets {
                    self.force_disconnect(conn, "kicked by an admin").await;
                }
                (true, format!("kicked {count} users"), None)
            }
            AdminAction::GetStats => {
                let users = self.inner.sessions.read().await.len();
                let (channels, global_messages) = {
                    let history = self.inner.history.read().await;
                    (history.channel_count(), history.global_len())
                };
                let (active_games, pending_invites) = {
                    let games = self.inner.games.read().await;
                    (games.active_games(), games.pending_invites())
                };
                let uptime = (t - self.inner.started_at).num_seconds();
                let data = serde_json::json!({
                    "users": users,
                    "channels": channels,
                    "globalMessages": global_messages,
                    "activeGames": active_games,
                    "pendingInvites": pending_invites,
                    "uptimeSeconds": uptime,
                });
                (true, "stats".into(), Some(data))
            }
            AdminAction::GetBannedUsers => {
                let banned = self.inner.moderation.write().await.banned_users(t);
                match serde_json::to_value(&banned) {
                    Ok(data) => (true, "banned users".into(), Some(data)),
                    Err(e) => (false, e.to_string(), None),
                }
            }
        }
    }

    async fn conn_by_name(&self, name: &str) -> Option<Uuid> {
        self.inner
            .sessions
            .read()
            .await
            .find_by_name(name)
            .map(|s| s.conn_id)
    }

    // -- Periodic sweeps --

    /// Recompute typing lists, dropping stale entries, and re-broadcast the
    /// channels that changed.
    pub async fn sweep_typing(&self) {
        let live: HashSet<Uuid> = {
            let sessions = self.inner.sessions.read().await;
            sessions.iter().map(|s| s.conn_id).collect()
        };
        let affected = self.inner.typing.write().await.sweep(now(), &live);
        for channel in affected {
            self.broadcast_typing(&channel).await;
        }
    }

    /// Disconnect sessions idle past `timeout`; also prunes expired bans
    /// and invites while it is here.
    pub async fn sweep_idle(&self, timeout: Duration) {
        let t = now();
        let idle = self.inner.sessions.read().await.idle_since(t - timeout);
        for conn in idle {
            info!(conn_id = %conn, "disconnecting idle session");
            self.force_disconnect(conn, "disconnected due to inactivity")
                .await;
        }
        self.inner.moderation.write().await.sweep_expired(t);
        self.inner.games.write().await.sweep_expired_invites(t);
    }

    // -- Persistence --

    /// Fire-and-forget write-behind; the engine never waits on the store
    /// and a failed write only logs.
    fn persist<F>(&self, op: &'static str, f: F)
    where
        F: FnOnce(&Database) -> anyhow::Result<()> + Send + 'static,
    {
        if let Some(db) = self.inner.store.clone() {
            tokio::task::spawn_blocking(move || {
                if let Err(e) = f(&db) {
                    warn!("persist {op} failed: {e:#}");
                }
            });
        }
    }

    /// Synchronous full flush, used at shutdown.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let Some(db) = self.inner.store.clone() else {
            return Ok(());
        };
        let snapshot = {
            let history = self.inner.history.read().await;
            let dms = self.inner.dms.read().await;
            Snapshot {
                messages: history.all_messages(),
                reactions: history.all_reactions().clone(),
                pins: history.pins(),
                dms: dms.all_threads(),
            }
        };
        tokio::task::spawn_blocking(move || db.save_snapshot(&snapshot)).await??;
        info!("snapshot flushed");
        Ok(())
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
