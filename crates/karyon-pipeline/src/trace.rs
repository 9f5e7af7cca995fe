//! Boundary tracing along pixel edges.
//!
//! The tracer walks the cracks between pixels, keeping the region on
//! its right, and records a vertex wherever the walk turns. The result
//! is the closed outer outline of the connected region containing the
//! seed pixel.
//!
//! The seed must be the first region pixel in row-major order, so the
//! pixels above it and to its left are outside the region. The walk
//! starts at the seed's lower-left corner heading up its left edge.

use serde::{Deserialize, Serialize};

use crate::types::PixelPoint;

/// Which neighbours count as connected when tracing or filling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// Edge and corner neighbours are connected.
    #[default]
    Eight,
    /// Only edge neighbours are connected.
    Four,
}

impl Connectivity {
    /// Neighbour offsets for flood filling.
    #[must_use]
    pub const fn neighbours(self) -> &'static [(i32, i32)] {
        match self {
            Self::Eight => &[
                (-1, -1),
                (0, -1),
                (1, -1),
                (-1, 0),
                (1, 0),
                (-1, 1),
                (0, 1),
                (1, 1),
            ],
            Self::Four => &[(0, -1), (-1, 0), (1, 0), (0, 1)],
        }
    }
}

/// A strategy for tracing the outline of a region.
pub trait BoundaryTracer {
    /// Trace the outline of the region containing `seed`.
    ///
    /// `inside(x, y)` reports region membership and must return
    /// `false` outside the image. The walk gives up after `max_steps`
    /// unit moves and returns an empty outline.
    fn trace(
        &self,
        seed: PixelPoint,
        inside: &dyn Fn(i32, i32) -> bool,
        max_steps: usize,
    ) -> Vec<PixelPoint>;
}

impl BoundaryTracer for Connectivity {
    fn trace(
        &self,
        seed: PixelPoint,
        inside: &dyn Fn(i32, i32) -> bool,
        max_steps: usize,
    ) -> Vec<PixelPoint> {
        trace_cracks(*self, seed, inside, max_steps)
    }
}

/// Walking directions, clockwise with y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    Up,
    Right,
    Down,
    Left,
}

impl Heading {
    const fn turn_left(self) -> Self {
        match self {
            Self::Up => Self::Left,
            Self::Right => Self::Up,
            Self::Down => Self::Right,
            Self::Left => Self::Down,
        }
    }

    const fn turn_right(self) -> Self {
        match self {
            Self::Up => Self::Right,
            Self::Right => Self::Down,
            Self::Down => Self::Left,
            Self::Left => Self::Up,
        }
    }

    const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Right => (1, 0),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    /// The pixels ahead-left and ahead-right of corner `(x, y)`.
    const fn ahead(self, x: i32, y: i32) -> ((i32, i32), (i32, i32)) {
        match self {
            Self::Up => ((x - 1, y - 1), (x, y - 1)),
            Self::Right => ((x, y - 1), (x, y)),
            Self::Down => ((x, y), (x - 1, y)),
            Self::Left => ((x - 1, y), (x - 1, y - 1)),
        }
    }
}

fn trace_cracks(
    connectivity: Connectivity,
    seed: PixelPoint,
    inside: &dyn Fn(i32, i32) -> bool,
    max_steps: usize,
) -> Vec<PixelPoint> {
    let start = PixelPoint::new(seed.x, seed.y + 1);
    let mut at = start;
    let mut heading = Heading::Up;
    let mut vertices = Vec::new();

    for step in 0..max_steps {
        let ((lx, ly), (rx, ry)) = heading.ahead(at.x, at.y);
        let left = inside(lx, ly);
        let right = inside(rx, ry);
        let next = match connectivity {
            Connectivity::Eight if left => heading.turn_left(),
            Connectivity::Four if left && right => heading.turn_left(),
            _ if right => heading,
            _ => heading.turn_right(),
        };

        if step > 0 && at == start && next == Heading::Up {
            if heading != Heading::Up {
                vertices.push(at);
            }
            return vertices;
        }
        if next != heading {
            vertices.push(at);
        }
        let (dx, dy) = next.delta();
        at = PixelPoint::new(at.x + dx, at.y + dy);
        heading = next;
    }
    tracing::warn!(
        seed_x = seed.x,
        seed_y = seed.y,
        max_steps,
        "boundary trace did not close"
    );
    Vec::new()
}
