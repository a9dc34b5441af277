// Integer line walking

use glam::{IVec2, Vec2};

use super::math::VecExt;
use super::{X, Y};

/// Walks the pixels of a line from `floor(start)` to `floor(start + ray)`.
///
/// The start pixel itself is not yielded. One pixel is produced per step along the
/// dominant axis, so the count equals the larger of the two pixel deltas.
#[derive(Debug, Clone)]
pub struct PixelLine {
    pos: [i32; 2],
    delta: [i32; 2],
    delta2: [i32; 2],
    increment: [i32; 2],
    dom: usize,
    sub: usize,
    error: i32,
    steps: i32,
}

impl PixelLine {
    pub fn new(start: Vec2, ray: Vec2) -> Self {
        let origin = start.floor_int();
        let end = (start + ray).floor_int();
        let mut delta = [end.x - origin.x, end.y - origin.y];
        let mut increment = [1, 1];
        for axis in [X, Y] {
            if delta[axis] < 0 {
                increment[axis] = -1;
                delta[axis] = -delta[axis];
            }
        }
        let (dom, sub) = if delta[X] > delta[Y] { (X, Y) } else { (Y, X) };
        let delta2 = [delta[X] << 1, delta[Y] << 1];

        Self {
            pos: [origin.x, origin.y],
            delta,
            delta2,
            increment,
            dom,
            sub,
            error: delta2[sub] - delta[dom],
            steps: 0,
        }
    }

    /// Total number of pixels the line will yield
    pub fn len(&self) -> usize {
        self.delta[self.dom] as usize
    }

    /// True for a line that never leaves its start pixel
    pub fn is_empty(&self) -> bool {
        self.delta[self.dom] == 0
    }

    /// Steps taken so far
    pub fn steps_taken(&self) -> i32 {
        self.steps
    }

    /// True once the final pixel has been yielded
    pub fn is_last(&self) -> bool {
        self.steps == self.delta[self.dom]
    }
}

impl Iterator for PixelLine {
    type Item = IVec2;

    fn next(&mut self) -> Option<IVec2> {
        if self.steps >= self.delta[self.dom] {
            return None;
        }
        self.steps += 1;
        self.pos[self.dom] += self.increment[self.dom];
        if self.error >= 0 {
            self.pos[self.sub] += self.increment[self.sub];
            self.error -= self.delta2[self.dom];
        }
        self.error += self.delta2[self.sub];
        Some(IVec2::new(self.pos[X], self.pos[Y]))
    }
}
