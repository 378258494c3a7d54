use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    BoardView, ChatMessage, DmConversation, DmMessage, GameVariant, PinnedMessage, Poll,
    PresenceEntry,
};

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Join handshake — must be the first command on a connection.
    Join {
        name: String,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        access_code: Option<String>,
        /// Opaque correlation token, carried through to messages verbatim.
        #[serde(default)]
        token: Option<String>,
    },
    Rename {
        new_name: String,
    },
    SendMessage {
        channel: String,
        content: String,
        #[serde(default)]
        attachment: Option<String>,
        #[serde(default)]
        reply_to: Option<u64>,
    },
    SwitchChannel {
        channel: String,
    },
    TypingStart {
        channel: String,
    },
    TypingStop,
    React {
        message_id: u64,
        emoji: String,
        action: ReactionAction,
    },
    EditMessage {
        message_id: u64,
        new_content: String,
    },
    DeleteMessage {
        message_id: u64,
        #[serde(default)]
        secret: Option<String>,
    },
    AdminLogin {
        secret: String,
        #[serde(default)]
        name: Option<String>,
    },
    AdminAction {
        secret: String,
        #[serde(flatten)]
        action: AdminAction,
    },
    CreatePoll {
        question: String,
        options: Vec<String>,
        channel: String,
    },
    VotePoll {
        poll_id: Uuid,
        option_index: usize,
    },
    SendDm {
        to: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        attachment: Option<String>,
    },
    GetDmHistory {
        with_name: String,
    },
    GameInvite {
        to: String,
        variant: GameVariant,
    },
    GameAccept {
        invite_id: Uuid,
    },
    GameDecline {
        invite_id: Uuid,
    },
    GameMove {
        game_id: Uuid,
        #[serde(rename = "move")]
        position: usize,
    },
    GameQuit {
        game_id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReactionAction {
    Add,
    Remove,
}

/// Admin actions dispatched through `ClientCommand::AdminAction`, decoded as a
/// closed set rather than a free-form action string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AdminAction {
    Kick {
        target: String,
    },
    /// `duration_minutes` of 0 means permanent.
    Ban {
        target: String,
        #[serde(default)]
        duration_minutes: u64,
    },
    Unban {
        target: String,
    },
    Rename {
        target: String,
        new_name: String,
    },
    ClearHistory,
    Broadcast {
        text: String,
    },
    Pin {
        message_id: u64,
    },
    Unpin {
        message_id: u64,
    },
    SetPrivate {
        enabled: bool,
    },
    SetAccessCode {
        code: String,
    },
    SlowMode {
        seconds: u64,
    },
    MuteAll {
        enabled: bool,
    },
    KickAll,
    GetStats,
    GetBannedUsers,
}

/// Events sent FROM server TO one or many clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Replay of a channel's log, sent to one client on join/switch.
    History {
        channel: String,
        messages: Vec<ChatMessage>,
        reactions: HashMap<u64, HashMap<String, Vec<String>>>,
        pinned: Vec<PinnedMessage>,
    },
    SystemMessage {
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    NewMessage {
        message: ChatMessage,
    },
    MessageEdited {
        message: ChatMessage,
    },
    MessageDeleted {
        message_id: u64,
    },
    ReactionUpdate {
        message_id: u64,
        reactions: HashMap<String, Vec<String>>,
    },
    PresenceUpdate {
        count: usize,
        users: Vec<PresenceEntry>,
    },
    TypingUpdate {
        channel: String,
        names: Vec<String>,
    },
    UsernameTaken,
    Kicked {
        reason: String,
    },
    AccessDenied {
        reason: String,
    },
    Muted,
    SlowModeActive {
        remaining_seconds: u64,
    },
    AdminResponse {
        success: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    PollCreated {
        poll: Poll,
    },
    PollUpdate {
        poll: Poll,
    },
    DmReceived {
        message: DmMessage,
    },
    DmHistory {
        with: String,
        messages: Vec<DmMessage>,
    },
    DmConversations {
        conversations: Vec<DmConversation>,
    },
    GameInviteReceived {
        invite_id: Uuid,
        from: String,
        variant: GameVariant,
    },
    GameInviteDeclined {
        invite_id: Uuid,
        by: String,
    },
    GameStart {
        game_id: Uuid,
        variant: GameVariant,
        opponent: String,
        your_turn: bool,
        player_index: u8,
    },
    GameUpdate {
        game_id: Uuid,
        board: BoardView,
        your_turn: bool,
        /// -1 once the game has reached a terminal state.
        next_turn: i8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        draw: bool,
    },
    GameOpponentQuit {
        game_id: Uuid,
    },
    /// Generic rejection for inputs with no dedicated event.
    Error {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    RejectedInput,
    PermissionDenied,
    NotFound,
    PolicyBlocked,
    Internal,
}

impl ServerEvent {
    /// Returns the channel name if this event is scoped to one channel.
    /// Events that return `None` are global and go to every connected client.
    pub fn channel_scope(&self) -> Option<&str> {
        match self {
            Self::NewMessage { message } => Some(&message.channel),
            Self::TypingUpdate { channel, .. } => Some(channel),
            // Edits, deletions and reactions are tracked independent of the
            // channel partition and fan out to everyone.
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_decode_from_tagged_json() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"join","data":{"name":"ada","accessCode":"letmein"}}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::Join { name, access_code, .. } => {
                assert_eq!(name, "ada");
                assert_eq!(access_code.as_deref(), Some("letmein"));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn game_move_uses_reserved_word_key() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"gameMove","data":{{"gameId":"{id}","move":4}}}}"#);
        let cmd: ClientCommand = serde_json::from_str(&raw).unwrap();
        match cmd {
            ClientCommand::GameMove { game_id, position } => {
                assert_eq!(game_id, id);
                assert_eq!(position, 4);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn admin_action_flattens_next_to_secret() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"adminAction","data":{"secret":"s","action":"ban","target":"mallory","durationMinutes":10}}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::AdminAction { secret, action } => {
                assert_eq!(secret, "s");
                match action {
                    AdminAction::Ban { target, duration_minutes } => {
                        assert_eq!(target, "mallory");
                        assert_eq!(duration_minutes, 10);
                    }
                    other => panic!("unexpected action: {other:?}"),
                }
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn channel_scope_only_for_channel_events() {
        let typing = ServerEvent::TypingUpdate {
            channel: "general".into(),
            names: vec!["ada".into()],
        };
        assert_eq!(typing.channel_scope(), Some("general"));

        let deleted = ServerEvent::MessageDeleted { message_id: 1 };
        assert_eq!(deleted.channel_scope(), None);
    }
}
