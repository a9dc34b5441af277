// Scene collaborators: terrain material grid and movable-object lookup
//
// The atom physics never reaches for a global scene. Everything it needs from the
// world goes through the two traits here, so the stepping code can run against the
// reference `PixelScene`/`ObjectRegistry` pair or an engine's own storage.

mod lock;
mod pixel_scene;
mod rays;
mod registry;

pub use lock::SceneLock;
pub use pixel_scene::{Debris, PixelScene};
pub use rays::{cast_clear_ray, cast_material_ray, cast_obstacle_ray, cast_weakness_ray, ObstacleRay};
pub use registry::{ObjectRegistry, RegisteredBody};

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::engine::material::{Material, MaterialId};
use crate::engine::physics::HitData;

/// Identifier of a movable object as painted into the MOID raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoId(pub u32);

/// Team index of an object
pub type Team = i32;

/// Budget for removing terrain islands cut loose by a penetration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrphanRemoval {
    /// Search radius in pixels
    pub radius: i32,
    /// Largest island area (pixels) that may be removed
    pub max_area: i32,
    /// Chance (0..1) per penetration that removal is attempted
    pub rate: f32,
}

impl OrphanRemoval {
    /// Check if every part of the budget is set
    pub fn is_enabled(&self) -> bool {
        self.radius > 0 && self.max_area > 0 && self.rate > 0.0
    }
}

/// Parameters for a single terrain penetration attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenetrationParams {
    /// Chance that a pixel is cleared once the impactor has already penetrated a few times
    pub air_ratio: f32,
    /// Consecutive penetrations made by the impactor so far
    pub num_penetrations: u32,
    /// Orphan removal budget of the impactor
    pub orphans: OrphanRemoval,
}

impl PenetrationParams {
    pub fn new(air_ratio: f32, num_penetrations: u32) -> Self {
        Self {
            air_ratio,
            num_penetrations,
            orphans: OrphanRemoval::default(),
        }
    }

    pub fn with_orphans(mut self, orphans: OrphanRemoval) -> Self {
        self.orphans = orphans;
        self
    }
}

/// Addressable, mutable grid of terrain material ids
pub trait TerrainQuery {
    /// Material id at a pixel. Out-of-range pixels on non-wrapping axes are out-of-bounds.
    fn material_at(&self, x: i32, y: i32) -> MaterialId;

    /// Material properties for an id. Never fails.
    fn material(&self, id: MaterialId) -> &Material;

    /// Wrap an integer pixel position across toroidal edges. Returns true if it wrapped.
    fn wrap_point(&self, point: &mut IVec2) -> bool;

    /// Wrap a scene position across toroidal edges. Returns true if it wrapped.
    fn wrap_position(&self, pos: &mut Vec2) -> bool;

    /// Shortest vector from `from` to `to`, taking wrapping into account
    fn shortest_distance(&self, from: Vec2, to: Vec2) -> Vec2;

    /// Would an impulse of this size knock the pixel loose?
    fn will_penetrate(&self, x: i32, y: i32, impulse: Vec2) -> bool;

    /// Try to knock a pixel loose.
    ///
    /// Returns the retardation (a negative velocity multiplier) when the pixel gave way,
    /// or `None` when it resisted.
    fn try_penetrate(
        &mut self,
        x: i32,
        y: i32,
        impulse: Vec2,
        velocity: Vec2,
        params: PenetrationParams,
    ) -> Option<f32>;

    /// Paint a material into the grid, used when sticky matter adheres
    fn deposit(&mut self, x: i32, y: i32, material: MaterialId);

    fn lock_scene(&mut self);
    fn unlock_scene(&mut self);
    fn is_locked(&self) -> bool;

    /// Convenience: material properties at a pixel
    fn material_props_at(&self, x: i32, y: i32) -> &Material {
        self.material(self.material_at(x, y))
    }
}

/// Snapshot of what the physics needs to know about another movable object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyProfile {
    pub id: MoId,
    /// Top ancestor of the object
    pub root: MoId,
    pub team: Option<Team>,
    pub ignores_team_hits: bool,
    pub ignores_atom_group_hits: bool,
    /// Collides through an atom group (a rotating, sprite-shaped body)
    pub is_rotating: bool,
    pub is_actor: bool,
    pub gets_hit_by_mos: bool,
    pub mass: f32,
    pub radius: f32,
    /// Impulse needed to tear the body loose; zero means free
    pub pin_strength: f32,
    pub pos: Vec2,
}

/// Lookup of movable objects by MOID
pub trait ObjectLookup {
    /// Object painted at a pixel of the MOID raster
    fn mo_id_at(&self, x: i32, y: i32) -> Option<MoId>;

    fn profile(&self, id: MoId) -> Option<BodyProfile>;

    /// Rigid-body collision at `hit.hit_point`. Fills the hitee side of the impulse
    /// and applies it to the hit object. Returns false when the hit is rejected.
    fn collide_at_point(&mut self, id: MoId, hit: &mut HitData) -> bool;

    /// Notify an object it was hit by `other`. Returning true vetoes the hit.
    fn on_mo_hit(&mut self, id: MoId, other: Option<MoId>) -> bool;

    /// Credit an actor's team with absorbed matter
    fn credit_absorbed(&mut self, actor: MoId, amount: f32);

    /// Move an object
    fn translate(&mut self, id: MoId, delta: Vec2);

    /// Squish or gib the object if it is buried deep in terrain. Returns true if it was.
    fn squish_if_buried(&mut self, id: MoId, impulse: Vec2, terrain: &dyn TerrainQuery) -> bool;

    /// Record which object last hit `id`
    fn set_hit_by(&mut self, _id: MoId, _by: Option<MoId>) {}
}
