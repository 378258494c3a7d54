use parlor_types::models::BoardView;

use crate::error::{CoreError, CoreResult};
use crate::games::board::MoveOutcome;

pub const COLS: usize = 7;
pub const ROWS: usize = 6;

/// 7x6 gravity board. Row 0 is the top; a dropped piece lands in the lowest
/// empty row of its column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectFour {
    grid: [[Option<u8>; COLS]; ROWS],
}

impl ConnectFour {
    /// Drop a piece into column 0-6. Invalid moves leave the grid untouched.
    pub fn drop(&mut self, col: usize, player: u8) -> CoreResult<MoveOutcome> {
        if col >= COLS {
            return Err(CoreError::Rejected("column out of range".into()));
        }
        let Some(row) = (0..ROWS).rev().find(|&r| self.grid[r][col].is_none()) else {
            return Err(CoreError::Rejected("column is full".into()));
        };
        self.grid[row][col] = Some(player);

        if self.wins_from(row, col, player) {
            return Ok(MoveOutcome::Win);
        }
        if (0..COLS).all(|c| self.grid[0][c].is_some()) {
            return Ok(MoveOutcome::Draw);
        }
        Ok(MoveOutcome::Continue)
    }

    /// From the just-placed cell, scan each of 4 axes in both directions,
    /// counting contiguous same-color cells including the placed one.
    fn wins_from(&self, row: usize, col: usize, player: u8) -> bool {
        const AXES: [(i32, i32); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];
        AXES.iter().any(|&(dr, dc)| {
            let count = 1
                + self.run_length(row, col, dr, dc, player)
                + self.run_length(row, col, -dr, -dc, player);
            count >= 4
        })
    }

    fn run_length(&self, row: usize, col: usize, dr: i32, dc: i32, player: u8) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as i32 + dr, col as i32 + dc);
        while (0..ROWS as i32).contains(&r)
            && (0..COLS as i32).contains(&c)
            && self.grid[r as usize][c as usize] == Some(player)
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    pub fn view(&self) -> BoardView {
        BoardView::ConnectFour {
            grid: self
                .grid
                .iter()
                .map(|row| row.iter().map(|c| c.map_or(0, |p| p + 1)).collect())
                .collect(),
        }
    }

    #[cfg(test)]
    fn cell(&self, row: usize, col: usize) -> Option<u8> {
        self.grid[row][col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pieces_stack_from_the_bottom() {
        let mut board = ConnectFour::default();
        board.drop(3, 0).unwrap();
        board.drop(3, 1).unwrap();
        assert_eq!(board.cell(ROWS - 1, 3), Some(0));
        assert_eq!(board.cell(ROWS - 2, 3), Some(1));
    }

    #[test]
    fn vertical_four_wins() {
        let mut board = ConnectFour::default();
        board.drop(0, 0).unwrap();
        board.drop(1, 1).unwrap();
        board.drop(0, 0).unwrap();
        board.drop(1, 1).unwrap();
        board.drop(0, 0).unwrap();
        board.drop(1, 1).unwrap();
        assert_eq!(board.drop(0, 0).unwrap(), MoveOutcome::Win);
    }

    #[test]
    fn horizontal_four_wins_even_when_completed_in_the_middle() {
        let mut board = ConnectFour::default();
        for col in [0, 1, 3] {
            board.drop(col, 0).unwrap();
            board.drop(col, 1).unwrap();
        }
        // Dropping into column 2 joins 0-1 and 3 into a run of 4.
        assert_eq!(board.drop(2, 0).unwrap(), MoveOutcome::Win);
    }

    #[test]
    fn three_in_a_row_does_not_win() {
        let mut board = ConnectFour::default();
        board.drop(0, 0).unwrap();
        board.drop(1, 0).unwrap();
        assert_eq!(board.drop(2, 0).unwrap(), MoveOutcome::Continue);
    }

    #[test]
    fn opponent_piece_blocks_the_run() {
        let mut board = ConnectFour::default();
        // Bottom row: 0 0 1 0 0 — the opponent piece in column 2 splits it.
        board.drop(0, 0).unwrap();
        board.drop(2, 1).unwrap();
        board.drop(1, 0).unwrap();
        board.drop(6, 1).unwrap();
        board.drop(3, 0).unwrap();
        board.drop(6, 1).unwrap();
        assert_eq!(board.drop(4, 0).unwrap(), MoveOutcome::Continue);
    }

    #[test]
    fn rising_diagonal_four_wins() {
        let mut board = ConnectFour::default();
        // Build heights so player 0 lands at rows 5,4,3,2 across cols 0-3.
        board.drop(0, 0).unwrap(); // (5,0) P0
        board.drop(1, 1).unwrap();
        board.drop(1, 0).unwrap(); // (4,1) P0
        board.drop(2, 1).unwrap();
        board.drop(3, 0).unwrap();
        board.drop(2, 1).unwrap();
        board.drop(2, 0).unwrap(); // (3,2) P0
        board.drop(3, 1).unwrap();
        board.drop(4, 0).unwrap();
        board.drop(3, 1).unwrap();
        assert_eq!(board.drop(3, 0).unwrap(), MoveOutcome::Win); // (2,3) P0
    }

    #[test]
    fn full_column_is_rejected_without_mutation() {
        let mut board = ConnectFour::default();
        for i in 0..ROWS {
            board.drop(5, (i % 2) as u8).unwrap();
        }
        let before = board.clone();
        assert!(board.drop(5, 0).is_err());
        assert!(board.drop(COLS, 0).is_err());
        assert_eq!(board, before);
    }
}
