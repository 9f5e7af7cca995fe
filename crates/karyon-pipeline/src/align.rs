//! Parallel alignment of objects onto a reference mask.
//!
//! Each item renders itself as a mask on the reference grid. The aligner
//! searches every integer shift within `max_shift` for the one with the
//! greatest overlap and moves the item by it. Items are independent, so
//! the slice is bisected with [`rayon::join`] until pieces are no longer
//! than the sequential cutoff.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::AlignError;
use crate::mask::BooleanMask;

/// Slices of at most this many items are aligned on the current thread.
pub const DEFAULT_SEQUENTIAL_CUTOFF: usize = 30;

/// Anything that can be rendered on the reference grid and moved.
pub trait Alignable: Send {
    /// The object as a `width × height` mask in the normalized frame,
    /// principal axis vertical and centre of mass on the centre cell.
    fn alignment_mask(&self, width: u32, height: u32) -> BooleanMask;

    /// Translate the object by `(dx, dy)`.
    fn move_centre_of_mass(&mut self, dx: f64, dy: f64);
}

/// The best shift found for one mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    /// Columns moved; positive is right.
    pub dx: i32,
    /// Rows moved; positive is down.
    pub dy: i32,
    /// Cells shared with the reference after shifting.
    pub overlap: u64,
}

impl Shift {
    fn manhattan(&self) -> u64 {
        u64::from(self.dx.unsigned_abs()) + u64::from(self.dy.unsigned_abs())
    }
}

/// Aligns items onto a shared reference mask.
#[derive(Debug, Clone)]
pub struct MaskAligner {
    reference: BooleanMask,
    max_shift: u32,
    sequential_cutoff: usize,
}

impl MaskAligner {
    /// An aligner searching shifts in `[-max_shift, max_shift]` on both
    /// axes.
    ///
    /// # Errors
    ///
    /// Returns [`AlignError::ReferenceSize`] when the reference has no
    /// set cells.
    pub fn new(reference: BooleanMask, max_shift: u32) -> Result<Self, AlignError> {
        if reference.is_empty() {
            return Err(AlignError::ReferenceSize {
                width: reference.width(),
                height: reference.height(),
            });
        }
        Ok(Self {
            reference,
            max_shift: max_shift.min(i32::MAX.unsigned_abs()),
            sequential_cutoff: DEFAULT_SEQUENTIAL_CUTOFF,
        })
    }

    /// Use `cutoff` items as the sequential threshold (at least 1).
    #[must_use]
    pub fn with_cutoff(mut self, cutoff: usize) -> Self {
        self.sequential_cutoff = cutoff.max(1);
        self
    }

    /// The mask every item is aligned onto.
    #[must_use]
    pub const fn reference(&self) -> &BooleanMask {
        &self.reference
    }

    /// Largest shift tried on either axis.
    #[must_use]
    pub const fn max_shift(&self) -> u32 {
        self.max_shift
    }

    /// The shift of `mask` with the greatest reference overlap.
    ///
    /// Ties go to the smaller `|dx| + |dy|`, then to the first shift in
    /// row-major order from `(-max_shift, -max_shift)`.
    #[must_use]
    pub fn best_shift(&self, mask: &BooleanMask) -> Shift {
        let reach = i32::try_from(self.max_shift).unwrap_or(i32::MAX);
        let mut best = Shift {
            dx: 0,
            dy: 0,
            overlap: self.reference.overlap(mask, 0, 0),
        };
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let candidate = Shift {
                    dx,
                    dy,
                    overlap: self.reference.overlap(mask, dx, dy),
                };
                if candidate.overlap > best.overlap
                    || (candidate.overlap == best.overlap
                        && candidate.manhattan() < best.manhattan())
                {
                    best = candidate;
                }
            }
        }
        best
    }

    /// Align one item and return the shift applied.
    pub fn align_one<T: Alignable + ?Sized>(&self, item: &mut T) -> Shift {
        let mask = item.alignment_mask(self.reference.width(), self.reference.height());
        let shift = self.best_shift(&mask);
        if shift.dx != 0 || shift.dy != 0 {
            item.move_centre_of_mass(f64::from(shift.dx), f64::from(shift.dy));
        }
        shift
    }

    /// Align every item, splitting the work across the rayon pool.
    ///
    /// `progress` is called after each item with the number aligned so
    /// far. Returns the number of items aligned.
    ///
    /// # Errors
    ///
    /// Returns [`AlignError::Cancelled`] when `cancel` fires; items
    /// aligned before that keep their new position.
    pub fn align_all<T: Alignable>(
        &self,
        items: &mut [T],
        cancel: &CancellationToken,
        progress: &(dyn Fn(usize) + Sync),
    ) -> Result<usize, AlignError> {
        let done = AtomicUsize::new(0);
        let aligned = self.align_slice(items, cancel, progress, &done)?;
        tracing::debug!(aligned, cutoff = self.sequential_cutoff, "alignment finished");
        Ok(aligned)
    }

    fn align_slice<T: Alignable>(
        &self,
        items: &mut [T],
        cancel: &CancellationToken,
        progress: &(dyn Fn(usize) + Sync),
        done: &AtomicUsize,
    ) -> Result<usize, AlignError> {
        cancel.check(AlignError::Cancelled)?;
        if items.len() <= self.sequential_cutoff {
            let count = items.len();
            for item in items {
                cancel.check(AlignError::Cancelled)?;
                self.align_one(item);
                progress(done.fetch_add(1, Ordering::Relaxed) + 1);
            }
            return Ok(count);
        }
        let (left, right) = items.split_at_mut(items.len() / 2);
        let (a, b) = rayon::join(
            || self.align_slice(left, cancel, progress, done),
            || self.align_slice(right, cancel, progress, done),
        );
        Ok(a? + b?)
    }
}
