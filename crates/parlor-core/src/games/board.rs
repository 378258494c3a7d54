use parlor_types::models::{BoardView, GameVariant};

use crate::error::CoreResult;
use crate::games::connect_four::ConnectFour;
use crate::games::tictactoe::TicTacToe;

/// Result of a valid move, before turn bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Win,
    Draw,
    Continue,
}

/// Tagged union over the supported game variants, each carrying its own
/// board representation and win rule behind one move contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameBoard {
    TicTacToe(TicTacToe),
    ConnectFour(ConnectFour),
}

impl GameBoard {
    pub fn new(variant: GameVariant) -> Self {
        match variant {
            GameVariant::TicTacToe => Self::TicTacToe(TicTacToe::default()),
            GameVariant::ConnectFour => Self::ConnectFour(ConnectFour::default()),
        }
    }

    pub fn variant(&self) -> GameVariant {
        match self {
            Self::TicTacToe(_) => GameVariant::TicTacToe,
            Self::ConnectFour(_) => GameVariant::ConnectFour,
        }
    }

    /// Apply a move for `player`. `position` is a cell index 0-8 for
    /// tic-tac-toe and a column 0-6 for four-in-a-row. Invalid moves return
    /// an error with no state mutation.
    pub fn apply_move(&mut self, position: usize, player: u8) -> CoreResult<MoveOutcome> {
        match self {
            Self::TicTacToe(board) => board.place(position, player),
            Self::ConnectFour(board) => board.drop(position, player),
        }
    }

    pub fn view(&self) -> BoardView {
        match self {
            Self::TicTacToe(board) => board.view(),
            Self::ConnectFour(board) => board.view(),
        }
    }
}
