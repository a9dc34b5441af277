// Math utilities and helper functions

use glam::{IVec2, Vec2};

/// Axis index for the horizontal component
pub const X: usize = 0;
/// Axis index for the vertical component
pub const Y: usize = 1;

/// Vector helpers used throughout the atom stepping and response code.
///
/// Scene space is y-down. Angles follow the body convention: a point at offset `r`
/// on a body spinning at `w` rad/s moves with velocity `r.perpendicular() * w`, and
/// `rad_rotated` turns offsets the same way.
pub trait VecExt {
    /// Perpendicular vector `(y, -x)`
    fn perpendicular(self) -> Vec2;
    /// Shorten the vector to `max` if it is longer
    fn cap_magnitude(self, max: f32) -> Vec2;
    /// Same direction, new length. Zero vectors stay zero.
    fn with_magnitude(self, magnitude: f32) -> Vec2;
    /// Mirror the x component when `flipped`
    fn x_flipped(self, flipped: bool) -> Vec2;
    /// Largest absolute component
    fn largest_component(self) -> f32;
    /// Component-wise floor
    fn floored(self) -> Vec2;
    /// Floor to integer pixel coordinates
    fn floor_int(self) -> IVec2;
    /// Rotate by `angle` radians
    fn rad_rotated(self, angle: f32) -> Vec2;
    /// Rotate to point the same way as `reference`, keeping the length
    fn abs_rotated_to(self, reference: Vec2) -> Vec2;
}

impl VecExt for Vec2 {
    fn perpendicular(self) -> Vec2 {
        Vec2::new(self.y, -self.x)
    }

    fn cap_magnitude(self, max: f32) -> Vec2 {
        let length = self.length();
        if length > max && length > 0.0 {
            self * (max / length)
        } else {
            self
        }
    }

    fn with_magnitude(self, magnitude: f32) -> Vec2 {
        let length = self.length();
        if length > 0.0 {
            self * (magnitude / length)
        } else {
            self
        }
    }

    fn x_flipped(self, flipped: bool) -> Vec2 {
        if flipped {
            Vec2::new(-self.x, self.y)
        } else {
            self
        }
    }

    fn largest_component(self) -> f32 {
        self.x.abs().max(self.y.abs())
    }

    fn floored(self) -> Vec2 {
        self.floor()
    }

    fn floor_int(self) -> IVec2 {
        IVec2::new(self.x.floor() as i32, self.y.floor() as i32)
    }

    fn rad_rotated(self, angle: f32) -> Vec2 {
        // glam rotates counter-clockwise in y-up space, which is the opposite turn to ours
        Vec2::from_angle(-angle).rotate(self)
    }

    fn abs_rotated_to(self, reference: Vec2) -> Vec2 {
        if reference == Vec2::ZERO {
            return self;
        }
        reference.normalize() * self.length()
    }
}
