//! Occupancy grid for a single site and the deterministic spot allocator.
//!
//! A grid does no locking of its own. Callers hold the owning site's lock
//! across a find + claim so the pair is atomic.

use crate::error::GridError;
use crate::models::{Dimensions, Spot};

/// Floor-major occupancy cells; `true` means occupied.
///
/// Cells are stored flat with index `(floor * rows + row) * cols + column`,
/// so ascending index order is exactly `(floor, row, column)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    dimensions: Dimensions,
    cells: Vec<bool>,
}

impl Grid {
    /// An empty grid. Dimensions are expected to be validated already.
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            cells: vec![false; dimensions.capacity()],
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn max_capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn occupied_spots(&self) -> usize {
        self.cells.iter().filter(|occupied| **occupied).count()
    }

    pub fn available_spots(&self) -> usize {
        self.max_capacity() - self.occupied_spots()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|occupied| *occupied)
    }

    pub fn contains(&self, spot: Spot) -> bool {
        spot.floor < self.dimensions.floors
            && spot.row < self.dimensions.rows
            && spot.column < self.dimensions.cols
    }

    pub fn is_occupied(&self, spot: Spot) -> Result<bool, GridError> {
        Ok(self.cells[self.index(spot)?])
    }

    /// Lowest free spot by floor, then row, then column.
    pub fn find_first_available(&self) -> Option<Spot> {
        self.cells
            .iter()
            .position(|occupied| !occupied)
            .map(|index| self.spot_at(index))
    }

    /// Marks a free spot occupied.
    pub fn claim(&mut self, spot: Spot) -> Result<(), GridError> {
        let index = self.index(spot)?;
        if self.cells[index] {
            return Err(GridError::AlreadyOccupied(spot));
        }
        self.cells[index] = true;
        Ok(())
    }

    /// Marks an occupied spot free. Releasing a free spot is an error.
    pub fn release(&mut self, spot: Spot) -> Result<(), GridError> {
        let index = self.index(spot)?;
        if !self.cells[index] {
            return Err(GridError::AlreadyFree(spot));
        }
        self.cells[index] = false;
        Ok(())
    }

    /// Occupied spots in scan order.
    pub fn occupied(&self) -> impl Iterator<Item = Spot> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, occupied)| **occupied)
            .map(|(index, _)| self.spot_at(index))
    }

    fn index(&self, spot: Spot) -> Result<usize, GridError> {
        if !self.contains(spot) {
            return Err(GridError::OutOfBounds(spot));
        }
        let Dimensions { rows, cols, .. } = self.dimensions;
        Ok((spot.floor as usize * rows as usize + spot.row as usize) * cols as usize
            + spot.column as usize)
    }

    fn spot_at(&self, index: usize) -> Spot {
        let rows = self.dimensions.rows as usize;
        let cols = self.dimensions.cols as usize;
        Spot {
            floor: (index / (rows * cols)) as u32,
            row: ((index / cols) % rows) as u32,
            column: (index % cols) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_capacity_invariant(grid: &Grid) {
        assert_eq!(
            grid.available_spots() + grid.occupied_spots(),
            grid.dimensions().capacity()
        );
    }

    #[test]
    fn test_new_grid_is_empty() {
        let grid = Grid::new(Dimensions::new(3, 5, 5));
        assert_eq!(grid.max_capacity(), 75);
        assert_eq!(grid.available_spots(), 75);
        assert_eq!(grid.occupied_spots(), 0);
        assert!(grid.is_empty());
        assert_eq!(grid.find_first_available(), Some(Spot::new(0, 0, 0)));
    }

    #[test]
    fn test_find_first_available_prefers_floor_then_row_then_column() {
        let mut grid = Grid::new(Dimensions::new(2, 3, 5));
        let free = [Spot::new(0, 2, 1), Spot::new(0, 0, 4), Spot::new(1, 0, 0)];
        for floor in 0..2 {
            for row in 0..3 {
                for column in 0..5 {
                    let spot = Spot::new(floor, row, column);
                    if !free.contains(&spot) {
                        grid.claim(spot).unwrap();
                    }
                }
            }
        }

        assert_eq!(grid.available_spots(), 3);
        assert_eq!(grid.find_first_available(), Some(Spot::new(0, 0, 4)));

        grid.claim(Spot::new(0, 0, 4)).unwrap();
        assert_eq!(grid.find_first_available(), Some(Spot::new(0, 2, 1)));

        grid.claim(Spot::new(0, 2, 1)).unwrap();
        assert_eq!(grid.find_first_available(), Some(Spot::new(1, 0, 0)));

        grid.claim(Spot::new(1, 0, 0)).unwrap();
        assert_eq!(grid.find_first_available(), None);
        assert_capacity_invariant(&grid);
    }

    #[test]
    fn test_scan_matches_nested_loops() {
        let dims = Dimensions::new(2, 3, 4);
        let mut grid = Grid::new(dims);
        let mut expected = Vec::new();
        for floor in 0..dims.floors {
            for row in 0..dims.rows {
                for column in 0..dims.cols {
                    expected.push(Spot::new(floor, row, column));
                }
            }
        }

        let mut allocated = Vec::new();
        while let Some(spot) = grid.find_first_available() {
            grid.claim(spot).unwrap();
            allocated.push(spot);
            assert_capacity_invariant(&grid);
        }
        assert_eq!(allocated, expected);
        assert_eq!(grid.occupied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_claim_occupied_spot_fails() {
        let mut grid = Grid::new(Dimensions::new(1, 2, 2));
        let spot = Spot::new(0, 1, 1);
        grid.claim(spot).unwrap();
        assert_eq!(grid.claim(spot), Err(GridError::AlreadyOccupied(spot)));
        assert_eq!(grid.occupied_spots(), 1);
    }

    #[test]
    fn test_release_free_spot_fails() {
        let mut grid = Grid::new(Dimensions::new(1, 2, 2));
        let spot = Spot::new(0, 0, 1);
        assert_eq!(grid.release(spot), Err(GridError::AlreadyFree(spot)));

        grid.claim(spot).unwrap();
        grid.release(spot).unwrap();
        assert_eq!(grid.is_occupied(spot), Ok(false));
        assert_eq!(grid.available_spots(), 4);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut grid = Grid::new(Dimensions::new(1, 2, 3));
        for spot in [Spot::new(1, 0, 0), Spot::new(0, 2, 0), Spot::new(0, 0, 3)] {
            assert!(!grid.contains(spot));
            assert_eq!(grid.claim(spot), Err(GridError::OutOfBounds(spot)));
            assert_eq!(grid.release(spot), Err(GridError::OutOfBounds(spot)));
            assert_eq!(grid.is_occupied(spot), Err(GridError::OutOfBounds(spot)));
        }
        assert!(grid.is_empty());
    }

    #[test]
    fn test_single_spot_grid_fills() {
        let mut grid = Grid::new(Dimensions::new(1, 1, 1));
        let spot = grid.find_first_available().unwrap();
        grid.claim(spot).unwrap();
        assert_eq!(grid.find_first_available(), None);
        assert_eq!(grid.available_spots(), 0);
        assert_capacity_invariant(&grid);
    }
}
