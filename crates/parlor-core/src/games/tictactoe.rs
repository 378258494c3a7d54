use parlor_types::models::BoardView;

use crate::error::{CoreError, CoreResult};
use crate::games::board::MoveOutcome;

/// The 8 winning lines: 3 rows, 3 columns, 2 diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// 3x3 board, row-major. Cells hold the player index of the mark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicTacToe {
    cells: [Option<u8>; 9],
}

impl TicTacToe {
    /// Place a mark on an empty cell 0-8. Invalid moves leave the board
    /// untouched.
    pub fn place(&mut self, cell: usize, player: u8) -> CoreResult<MoveOutcome> {
        if cell >= 9 {
            return Err(CoreError::Rejected("cell out of range".into()));
        }
        if self.cells[cell].is_some() {
            return Err(CoreError::Rejected("cell already occupied".into()));
        }
        self.cells[cell] = Some(player);

        if LINES.iter().any(|line| {
            line.iter()
                .all(|&i| self.cells[i] == Some(player))
        }) {
            return Ok(MoveOutcome::Win);
        }
        if self.cells.iter().all(|c| c.is_some()) {
            return Ok(MoveOutcome::Draw);
        }
        Ok(MoveOutcome::Continue)
    }

    pub fn view(&self) -> BoardView {
        BoardView::TicTacToe {
            cells: self.cells.iter().map(|c| c.map_or(0, |p| p + 1)).collect(),
        }
    }

    #[cfg(test)]
    pub fn cells(&self) -> &[Option<u8>; 9] {
        &self.cells
    }
}
