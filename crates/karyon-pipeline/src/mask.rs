//! Boolean mask algebra.
//!
//! A [`BooleanMask`] is a fixed-size grid of booleans used to compare
//! shapes by overlap. Masks never resize: AND keeps the receiver's
//! dimensions and translation drops whatever leaves the grid.

use crate::error::MaskError;

/// A `width` x `height` grid of booleans stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl BooleanMask {
    /// Create a mask with every cell false.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let len = usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(0);
        Self {
            width,
            height,
            cells: vec![false; len],
        }
    }

    /// Create a mask whose cell `(x, y)` is `f(x, y)`.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut mask = Self::new(width, height);
        let mut i = 0;
        for y in 0..height {
            for x in 0..width {
                if let Some(cell) = mask.cells.get_mut(i) {
                    *cell = f(x, y);
                }
                i += 1;
            }
        }
        mask
    }

    /// Width of the grid.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the grid.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        usize::try_from(y * i64::from(self.width) + x).ok()
    }

    fn out_of_bounds(&self, x: i64, y: i64) -> MaskError {
        MaskError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        }
    }

    /// Cell `(x, y)`, or `false` outside the grid.
    #[must_use]
    pub fn is_set(&self, x: i64, y: i64) -> bool {
        self.index(x, y)
            .and_then(|i| self.cells.get(i).copied())
            .unwrap_or(false)
    }

    /// Read cell `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::OutOfBounds`] if the cell is outside the grid.
    pub fn get(&self, x: i64, y: i64) -> Result<bool, MaskError> {
        self.index(x, y)
            .and_then(|i| self.cells.get(i).copied())
            .ok_or_else(|| self.out_of_bounds(x, y))
    }

    /// Write cell `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::OutOfBounds`] if the cell is outside the grid.
    pub fn set(&mut self, x: i64, y: i64, value: bool) -> Result<(), MaskError> {
        let err = self.out_of_bounds(x, y);
        let cell = self
            .index(x, y)
            .and_then(|i| self.cells.get_mut(i))
            .ok_or(err)?;
        *cell = value;
        Ok(())
    }

    /// Set every cell to true.
    pub fn set_true(&mut self) {
        self.cells.fill(true);
    }

    /// Set every cell to false.
    pub fn set_false(&mut self) {
        self.cells.fill(false);
    }

    /// Number of true cells.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.cells.iter().map(|&c| u64::from(c)).sum()
    }

    /// Whether no cell is true.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.cells.contains(&true)
    }

    /// Cell-wise AND.
    ///
    /// The result has this mask's dimensions. Cells that fall outside
    /// `other` count as false.
    #[must_use = "returns a new mask"]
    pub fn and(&self, other: &Self) -> Self {
        Self::from_fn(self.width, self.height, |x, y| {
            let (x, y) = (i64::from(x), i64::from(y));
            self.is_set(x, y) && other.is_set(x, y)
        })
    }

    /// Translate the content by `(dx, dy)`.
    ///
    /// The grid keeps its dimensions: cells vacated by the shift become
    /// false and content shifted past the edge is discarded, so
    /// `m.offset(dx, dy).offset(-dx, -dy)` only restores `m` when no
    /// true cell left the grid.
    #[must_use = "returns a new mask"]
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::from_fn(self.width, self.height, |x, y| {
            self.is_set(i64::from(x) - i64::from(dx), i64::from(y) - i64::from(dy))
        })
    }

    /// Number of true cells in `self.and(&other.offset(dx, dy))`,
    /// computed without allocating.
    #[must_use]
    pub fn overlap(&self, other: &Self, dx: i32, dy: i32) -> u64 {
        let width = self.width.min(other.width);
        let height = self.height.min(other.height);
        let mut total = 0;
        for y in 0..i64::from(height) {
            for x in 0..i64::from(width) {
                if self.is_set(x, y) && other.is_set(x - i64::from(dx), y - i64::from(dy)) {
                    total += 1;
                }
            }
        }
        total
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> BooleanMask {
        BooleanMask::from_fn(width, height, |x, y| {
            x >= x0 && x < x0 + side && y >= y0 && y < y0 + side
        })
    }

    // --- Access tests ---

    #[test]
    fn new_mask_is_all_false() {
        let mask = BooleanMask::new(4, 3);
        assert_eq!(mask.count(), 0);
        assert!(mask.is_empty());
        assert_eq!(mask.get(3, 2), Ok(false));
    }

    #[test]
    fn set_then_get() {
        let mut mask = BooleanMask::new(4, 3);
        mask.set(2, 1, true).unwrap();
        assert_eq!(mask.get(2, 1), Ok(true));
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn out_of_bounds_access_is_an_error() {
        let mut mask = BooleanMask::new(4, 3);
        assert_eq!(
            mask.get(4, 0),
            Err(MaskError::OutOfBounds {
                x: 4,
                y: 0,
                width: 4,
                height: 3
            })
        );
        assert!(mask.get(0, -1).is_err());
        assert!(mask.set(0, 3, true).is_err());
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn fill_true_and_false() {
        let mut mask = BooleanMask::new(5, 5);
        mask.set_true();
        assert_eq!(mask.count(), 25);
        mask.set_false();
        assert_eq!(mask.count(), 0);
    }

    // --- AND tests ---

    #[test]
    fn and_keeps_common_cells() {
        let a = square(10, 10, 0, 0, 6);
        let b = square(10, 10, 4, 4, 6);
        let both = a.and(&b);
        assert_eq!(both.count(), 4);
        assert!(both.is_set(4, 4));
        assert!(both.is_set(5, 5));
        assert!(!both.is_set(3, 3));
    }

    #[test]
    fn and_is_commutative_for_equal_sizes() {
        let a = BooleanMask::from_fn(7, 5, |x, y| (x + y) % 3 == 0);
        let b = BooleanMask::from_fn(7, 5, |x, y| x * y % 2 == 1);
        assert_eq!(a.and(&b), b.and(&a));
    }

    #[test]
    fn and_with_smaller_mask_keeps_receiver_dimensions() {
        let mut a = BooleanMask::new(6, 6);
        a.set_true();
        let mut b = BooleanMask::new(3, 3);
        b.set_true();
        let both = a.and(&b);
        assert_eq!((both.width(), both.height()), (6, 6));
        assert_eq!(both.count(), 9);
    }

    // --- Offset tests ---

    #[test]
    fn offset_zero_is_identity() {
        let mask = BooleanMask::from_fn(9, 4, |x, y| (x ^ y) & 1 == 0);
        assert_eq!(mask.offset(0, 0), mask);
    }

    #[test]
    fn offset_moves_content_and_clears_vacated_cells() {
        let mask = square(10, 10, 2, 2, 3);
        let moved = mask.offset(3, -1);
        assert_eq!(moved.count(), 9);
        assert!(moved.is_set(5, 1));
        assert!(!moved.is_set(2, 2));
    }

    #[test]
    fn offset_round_trip_inside_grid_restores_mask() {
        let mask = square(10, 10, 3, 3, 3);
        assert_eq!(mask.offset(2, 2).offset(-2, -2), mask);
    }

    #[test]
    fn offset_round_trip_across_edge_loses_cells() {
        let mask = square(10, 10, 6, 6, 3);
        let round_trip = mask.offset(2, 0).offset(-2, 0);
        assert_ne!(round_trip, mask);
        assert_eq!(round_trip.count(), 6);
    }

    // --- Overlap tests ---

    #[test]
    fn overlap_matches_and_of_offset() {
        let a = square(12, 12, 2, 2, 6);
        let b = square(12, 12, 4, 3, 5);
        for (dx, dy) in [(0, 0), (-2, -1), (3, 3), (-7, 0)] {
            let expected = a.and(&b.offset(dx, dy)).count();
            assert_eq!(
                a.overlap(&b, dx, dy),
                expected,
                "expected overlap {expected} at ({dx}, {dy})"
            );
        }
    }
}
