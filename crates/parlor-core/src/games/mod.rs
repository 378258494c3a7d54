pub mod board;
pub mod connect_four;
pub mod tictactoe;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use parlor_types::models::{BoardView, GameVariant};

use crate::error::{CoreError, CoreResult};
use crate::games::board::{GameBoard, MoveOutcome};

/// Pending invites expire after this long, enforced lazily when the invite
/// is accepted or declined and swept opportunistically. The original system
/// kept invites forever; a TTL keeps the map bounded.
pub const INVITE_TTL_SECS: i64 = 120;

/// Turn sentinel once a game has reached a terminal state.
pub const NO_MORE_TURNS: i8 = -1;

#[derive(Debug, Clone)]
pub struct GameInvite {
    pub id: Uuid,
    pub from_conn: Uuid,
    pub from_name: String,
    pub to_conn: Uuid,
    pub to_name: String,
    pub variant: GameVariant,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub conn_id: Uuid,
    pub name: String,
}

/// The single authoritative copy of one running game. All mutation goes
/// through `GameHub::apply_move`.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: Uuid,
    /// Player order is [inviter, invitee]; index 0 moves first.
    pub players: [Player; 2],
    pub board: GameBoard,
    pub current_turn: i8,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    pub fn player_index(&self, conn_id: Uuid) -> Option<u8> {
        self.players
            .iter()
            .position(|p| p.conn_id == conn_id)
            .map(|i| i as u8)
    }

    pub fn opponent_of(&self, conn_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.conn_id != conn_id)
    }
}

/// Outcome of a valid move, with everything the caller needs to notify both
/// players. `finished` means the session has already been deleted.
#[derive(Debug, Clone)]
pub struct MoveReport {
    pub game_id: Uuid,
    pub board: BoardView,
    pub next_turn: i8,
    pub winner: Option<String>,
    pub draw: bool,
    pub finished: bool,
    pub players: [Player; 2],
}

/// Invitation handshake plus the per-game state machines:
/// INVITED -> ACTIVE -> { WIN, DRAW, ABANDONED }.
#[derive(Debug, Default)]
pub struct GameHub {
    invites: HashMap<Uuid, GameInvite>,
    games: HashMap<Uuid, GameSession>,
}

impl GameHub {
    pub fn invite(
        &mut self,
        from_conn: Uuid,
        from_name: &str,
        to_conn: Uuid,
        to_name: &str,
        variant: GameVariant,
        now: DateTime<Utc>,
    ) -> GameInvite {
        let invite = GameInvite {
            id: Uuid::new_v4(),
            from_conn,
            from_name: from_name.to_string(),
            to_conn,
            to_name: to_name.to_string(),
            variant,
            created_at: now,
        };
        self.invites.insert(invite.id, invite.clone());
        invite
    }

    /// Remove and return an invite; only the invitee may take it, and an
    /// expired invite behaves as if it never existed.
    pub fn take_invite(
        &mut self,
        invite_id: Uuid,
        taker_conn: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<GameInvite> {
        let invite = self
            .invites
            .remove(&invite_id)
            .ok_or_else(|| CoreError::NotFound("unknown or expired invite".into()))?;
        if now - invite.created_at > Duration::seconds(INVITE_TTL_SECS) {
            return Err(CoreError::NotFound("unknown or expired invite".into()));
        }
        if invite.to_conn != taker_conn {
            self.invites.insert(invite.id, invite);
            return Err(CoreError::Permission("not your invite".into()));
        }
        Ok(invite)
    }

    /// Create the authoritative session from an accepted invite.
    pub fn start(&mut self, invite: GameInvite, now: DateTime<Utc>) -> GameSession {
        let session = GameSession {
            id: Uuid::new_v4(),
            players: [
                Player {
                    conn_id: invite.from_conn,
                    name: invite.from_name,
                },
                Player {
                    conn_id: invite.to_conn,
                    name: invite.to_name,
                },
            ],
            board: GameBoard::new(invite.variant),
            current_turn: 0,
            created_at: now,
        };
        self.games.insert(session.id, session.clone());
        session
    }

    /// Validate and apply a move. Validation order: the game must exist, the
    /// mover must be a bound player, it must be their turn, and the target
    /// cell/column must be playable. Failures mutate nothing.
    pub fn apply_move(
        &mut self,
        game_id: Uuid,
        mover_conn: Uuid,
        position: usize,
    ) -> CoreResult<MoveReport> {
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or_else(|| CoreError::NotFound("unknown game".into()))?;
        let player = game
            .player_index(mover_conn)
            .ok_or_else(|| CoreError::Permission("not a player in this game".into()))?;
        if player as i8 != game.current_turn {
            return Err(CoreError::Permission("not your turn".into()));
        }

        let outcome = game.board.apply_move(position, player)?;
        let report = match outcome {
            MoveOutcome::Win => MoveReport {
                game_id,
                board: game.board.view(),
                next_turn: NO_MORE_TURNS,
                winner: Some(game.players[player as usize].name.clone()),
                draw: false,
                finished: true,
                players: game.players.clone(),
            },
            MoveOutcome::Draw => MoveReport {
                game_id,
                board: game.board.view(),
                next_turn: NO_MORE_TURNS,
                winner: None,
                draw: true,
                finished: true,
                players: game.players.clone(),
            },
            MoveOutcome::Continue => {
                game.current_turn = (game.current_turn + 1) % 2;
                MoveReport {
                    game_id,
                    board: game.board.view(),
                    next_turn: game.current_turn,
                    winner: None,
                    draw: false,
                    finished: false,
                    players: game.players.clone(),
                }
            }
        };
        if report.finished {
            self.games.remove(&game_id);
        }
        Ok(report)
    }

    /// Voluntary quit: the session is deleted unconditionally, no win or
    /// draw attributed. Returns the removed session.
    pub fn quit(&mut self, game_id: Uuid, conn_id: Uuid) -> CoreResult<GameSession> {
        let game = self
            .games
            .remove(&game_id)
            .ok_or_else(|| CoreError::NotFound("unknown game".into()))?;
        if game.player_index(conn_id).is_none() {
            self.games.insert(game.id, game);
            return Err(CoreError::Permission("not a player in this game".into()));
        }
        Ok(game)
    }

    /// Disconnect cleanup: every game the connection is in ends as abandoned
    /// and every invite it appears in is dropped.
    pub fn remove_conn(&mut self, conn_id: Uuid) -> Vec<GameSession> {
        self.invites
            .retain(|_, inv| inv.from_conn != conn_id && inv.to_conn != conn_id);
        let ended: Vec<Uuid> = self
            .games
            .values()
            .filter(|g| g.player_index(conn_id).is_some())
            .map(|g| g.id)
            .collect();
        ended
            .into_iter()
            .filter_map(|id| self.games.remove(&id))
            .collect()
    }

    pub fn sweep_expired_invites(&mut self, now: DateTime<Utc>) {
        self.invites
            .retain(|_, inv| now - inv.created_at <= Duration::seconds(INVITE_TTL_SECS));
    }

    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    pub fn pending_invites(&self) -> usize {
        self.invites.len()
    }
}
