use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// A fixed-size 2D grid.
///
/// Stores elements of type `T` in a flat vector using row-major order and
/// is addressed by [`Position`] (row, col).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn new(rows: usize, cols: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        Grid {
            rows,
            cols,
            cells: vec![T::default(); size],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    pub fn index_of(&self, pos: Position) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.row * self.cols + pos.col)
        } else {
            None
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    /// Returns an iterator over the cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.cells.iter_mut()
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.index_of(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for a {}x{} grid",
                pos, self.rows, self.cols
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        let (rows, cols) = (self.rows, self.cols);
        match self.index_of(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!("Grid index {} out of bounds for a {}x{} grid", pos, rows, cols),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_indexing() {
        let mut grid: Grid<u8> = Grid::new(2, 3);
        assert_eq!(grid.len(), 6);
        assert!(!grid.is_empty());
        assert_eq!(grid.index_of(Position::new(1, 2)), Some(5));
        assert_eq!(grid.index_of(Position::new(0, 1)), Some(1));

        grid[Position::new(1, 0)] = 10;
        assert_eq!(grid[Position::new(1, 0)], 10);
        assert_eq!(grid.iter().position(|cell| *cell == 10), Some(3));
    }

    #[test]
    fn out_of_bounds_positions_are_rejected() {
        let grid: Grid<u8> = Grid::new(2, 2);
        assert!(grid.contains(Position::new(1, 1)));
        assert!(!grid.contains(Position::new(2, 0)));
        assert!(!grid.contains(Position::new(0, 2)));
        assert_eq!(grid.index_of(Position::new(0, 2)), None);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn indexing_outside_the_grid_panics() {
        let grid: Grid<u8> = Grid::new(2, 2);
        let _ = grid[Position::new(2, 2)];
    }

    #[test]
    fn iter_mut_rewrites_every_cell() {
        let mut grid: Grid<u8> = Grid::new(3, 2);
        for cell in grid.iter_mut() {
            *cell += 1;
        }
        assert!(grid.iter().all(|cell| *cell == 1));
    }
}
