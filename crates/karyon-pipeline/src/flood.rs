//! Seed flood filling into a [`BooleanMask`].

use crate::mask::BooleanMask;
use crate::trace::Connectivity;
use crate::types::{PixelPoint, Rect};

/// Fill every pixel reachable from `seed` through pixels where
/// `inside(x, y)` holds, without leaving `bounds`.
///
/// The returned mask covers `bounds`: cell `(i, j)` is pixel
/// `(bounds.x + i, bounds.y + j)`.
#[must_use]
pub fn flood_fill(
    seed: PixelPoint,
    bounds: Rect,
    inside: impl Fn(i32, i32) -> bool,
    connectivity: Connectivity,
) -> BooleanMask {
    flood_fill_from([seed], bounds, inside, connectivity)
}

/// [`flood_fill`] from several seeds at once.
///
/// Seeds outside `bounds` or not `inside` are ignored.
#[must_use]
pub fn flood_fill_from(
    seeds: impl IntoIterator<Item = PixelPoint>,
    bounds: Rect,
    inside: impl Fn(i32, i32) -> bool,
    connectivity: Connectivity,
) -> BooleanMask {
    let mut filled = BooleanMask::new(bounds.width, bounds.height);
    let local = |p: PixelPoint| {
        (
            i64::from(p.x) - i64::from(bounds.x),
            i64::from(p.y) - i64::from(bounds.y),
        )
    };
    let mut stack: Vec<PixelPoint> = Vec::new();
    let visit = |p: PixelPoint, filled: &mut BooleanMask, stack: &mut Vec<PixelPoint>| {
        let (lx, ly) = local(p);
        if bounds.contains(i64::from(p.x), i64::from(p.y))
            && !filled.is_set(lx, ly)
            && inside(p.x, p.y)
            && filled.set(lx, ly, true).is_ok()
        {
            stack.push(p);
        }
    };

    for seed in seeds {
        visit(seed, &mut filled, &mut stack);
    }
    while let Some(p) = stack.pop() {
        for &(dx, dy) in connectivity.neighbours() {
            visit(PixelPoint::new(p.x + dx, p.y + dy), &mut filled, &mut stack);
        }
    }
    filled
}
