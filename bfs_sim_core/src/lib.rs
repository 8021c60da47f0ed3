use serde::{Deserialize, Serialize};

pub mod config;
pub mod driver;
pub mod engine;
pub mod map;

pub use config::{AgentSpec, ConfigError, SimulationConfig, TieBreak};
pub use driver::{Driver, DriverStatus, Speed};
pub use engine::{CellKind, FrontierItem, Outcome, SimulationResult, Snapshot, Stepper};
pub use map::Grid;

/// Represents a cell coordinate as (row, col).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Returns the neighbouring position one move away in `direction`.
    ///
    /// Returns `None` when the move would leave the non-negative quadrant;
    /// the upper bound is checked against a grid by the caller.
    pub fn step(self, direction: Direction) -> Option<Position> {
        let (dr, dc) = direction.delta();
        Some(Position {
            row: self.row.checked_add_signed(dr)?,
            col: self.col.checked_add_signed(dc)?,
        })
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The four orthogonal moves, in expansion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Row/column offsets for this move.
    pub const fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_moves_orthogonally() {
        let p = Position::new(2, 3);
        assert_eq!(p.step(Direction::Up), Some(Position::new(1, 3)));
        assert_eq!(p.step(Direction::Down), Some(Position::new(3, 3)));
        assert_eq!(p.step(Direction::Left), Some(Position::new(2, 2)));
        assert_eq!(p.step(Direction::Right), Some(Position::new(2, 4)));
    }

    #[test]
    fn step_off_the_top_left_edge_is_none() {
        let origin = Position::new(0, 0);
        assert_eq!(origin.step(Direction::Up), None);
        assert_eq!(origin.step(Direction::Left), None);
    }
}
