// Per-collision physics values

use glam::Vec2;

use crate::core::VecExt;
use crate::engine::material::MaterialId;
use crate::engine::scene::MoId;

/// Index of the moving, initiating body in every `[_; 2]` field
pub const HITOR: usize = 0;
/// Index of the struck body (or terrain)
pub const HITEE: usize = 1;

/// Everything known about one collision between two bodies, or a body and terrain.
///
/// A `HitData` is a plain value. It is filled by the call that detects the hit and
/// copied into every callback, so nothing refers back to it after the call returns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HitData {
    pub body: [Option<MoId>; 2],
    /// Top ancestors of the colliding bodies
    pub root_body: [Option<MoId>; 2],
    /// Scene coordinates of the hit pixel
    pub hit_point: Vec2,
    /// Estimated surface normal at the hit pixel, facing the hitor
    pub bitmap_normal: Vec2,
    pub hit_material: [MaterialId; 2],
    pub total_mass: [f32; 2],
    pub mom_inertia: [f32; 2],
    /// Offset from each body's centre of mass to the hit point, in meters
    pub hit_radius: [Vec2; 2],
    /// Velocity of each body at the hit point, spin included
    pub hit_vel: [Vec2; 2],
    pub vel_diff: Vec2,
    pub pre_impulse: [Vec2; 2],
    pub res_impulse: [Vec2; 2],
    pub hit_denominator: f32,
    /// Share of the impulse each side takes when several hits make up one event
    pub impulse_factor: [f32; 2],
    pub squared_mi_handle: [f32; 2],
    /// Set when the body should stop and be removed
    pub terminate: [bool; 2],
}

impl HitData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every field
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Lever arm of a hit radius against the normal: `perp(r) . n`
    #[inline]
    pub fn lever(&self, role: usize) -> f32 {
        self.hit_radius[role].perpendicular().dot(self.bitmap_normal)
    }

    /// `1/m + lever^2/I` for one side of the hit
    pub fn inverse_effective_mass(&self, role: usize) -> f32 {
        let lever = self.lever(role);
        1.0 / self.total_mass[role] + lever * lever / self.mom_inertia[role]
    }

    /// Resolve a rigid collision between the two bodies along `bitmap_normal`.
    ///
    /// Fills the hitee's hit velocity from its motion, then writes opposite impulses
    /// into `res_impulse`, each scaled by its impulse factor. Returns false when the
    /// bodies are already separating, leaving the impulses zeroed.
    pub fn resolve_rigid(
        &mut self,
        hitee_pos: Vec2,
        hitee_vel: Vec2,
        hitee_ang_vel: f32,
        restitution: f32,
        meters_per_pixel: f32,
    ) -> bool {
        self.res_impulse = [Vec2::ZERO; 2];
        self.hit_radius[HITEE] = (self.hit_point - hitee_pos) * meters_per_pixel;
        self.hit_vel[HITEE] = point_velocity(hitee_vel, hitee_ang_vel, self.hit_radius[HITEE]);
        self.vel_diff = self.hit_vel[HITOR] - self.hit_vel[HITEE];

        if self.vel_diff.dot(self.bitmap_normal) >= 0.0 {
            return false;
        }

        let hit_acc = -self.vel_diff * (1.0 + restitution);
        let hitor_lever = self.lever(HITOR).powi(2);
        let hitee_lever = self.lever(HITEE).powi(2);
        self.hit_denominator = 1.0 / self.total_mass[HITOR]
            + 1.0 / self.total_mass[HITEE]
            + hitor_lever / self.mom_inertia[HITOR]
            + hitee_lever / self.mom_inertia[HITEE];
        let impulse = hit_acc.dot(self.bitmap_normal) / self.hit_denominator;

        self.res_impulse[HITOR] = self.bitmap_normal * impulse * self.impulse_factor[HITOR];
        self.res_impulse[HITEE] = self.bitmap_normal * -impulse * self.impulse_factor[HITEE];
        true
    }
}

/// Velocity of a point at `radius` (meters) on a body moving at `vel` and spinning at `ang_vel`
#[inline]
pub fn point_velocity(vel: Vec2, ang_vel: f32, radius: Vec2) -> Vec2 {
    vel + radius.perpendicular() * ang_vel
}
