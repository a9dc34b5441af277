// Atom: a single collision sample point stepped pixel by pixel

use glam::{IVec2, Vec2};

use super::body::MovableBody;
use super::hit_data::{HitData, HITEE, HITOR};
use crate::core::{X, Y};
use crate::engine::assets::Sprite;
use crate::engine::material::MaterialId;
use crate::engine::scene::{MoId, ObjectLookup, TerrainQuery};

/// Ring of sprite offsets sampled around an atom to estimate its surface normal
pub const NORMAL_CHECKS: [[i32; 2]; 16] = [
    [0, -3],
    [1, -3],
    [2, -2],
    [3, -1],
    [3, 0],
    [3, 1],
    [2, 2],
    [1, 3],
    [0, 3],
    [-1, 3],
    [-2, 2],
    [-3, 1],
    [-3, 0],
    [-3, -1],
    [-2, -2],
    [-1, -3],
];

/// What a single step, or a segment setup, ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing was hit, or no step was taken
    None,
    HitTerrain,
    HitMO,
    /// The start position was already inside terrain or an object
    Embedded,
}

impl StepOutcome {
    pub fn is_hit(self) -> bool {
        !matches!(self, StepOutcome::None)
    }
}

/// Bresenham state needed to undo one pixel step
#[derive(Debug, Clone, Copy)]
struct StepRecord {
    sub_stepped: bool,
    error: i32,
}

/// A point on a body that collides with terrain and other objects.
///
/// The atom keeps its authored data (offset, normal, material, trail) plus the
/// state of the segment it is currently stepping through. Segment state is reset by
/// every `setup_pos`/`setup_seg` call.
#[derive(Debug, Clone)]
pub struct Atom {
    offset: Vec2,
    original_offset: Vec2,
    normal: Vec2,
    material: MaterialId,
    sub_id: i64,
    trail_color: u8,
    trail_length: usize,

    // Per-frame ignores
    ignore_mo_id: Option<MoId>,
    ignore_mo_ids: Vec<MoId>,

    // Penetration carry-over between lone travel segments
    pub(crate) num_penetrations: u32,
    pub(crate) changed_dir: bool,
    pub(crate) prev_error: i32,

    // Segment stepping
    int_pos: [i32; 2],
    prev_int_pos: [i32; 2],
    hit_pos: [i32; 2],
    step_ratio: f32,
    seg_progress: f32,
    seg_traj: Vec2,
    delta: [i32; 2],
    delta2: [i32; 2],
    increment: [i32; 2],
    error: i32,
    dom: usize,
    sub: usize,
    dom_steps: i32,
    sub_steps: i32,
    sub_stepped: bool,
    // One entry per advancing step_forward call this segment, None when no pixel step was taken
    step_history: Vec<Option<StepRecord>>,

    // Hit state
    terrain_mat_hit: MaterialId,
    mo_id_hit: Option<MoId>,
    terrain_hits_disabled: bool,
    mo_hits_disabled: bool,
    pub(crate) last_hit: HitData,
}

impl Default for Atom {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            original_offset: Vec2::ZERO,
            normal: Vec2::ZERO,
            material: MaterialId::AIR,
            sub_id: 0,
            trail_color: 0,
            trail_length: 0,
            ignore_mo_id: None,
            ignore_mo_ids: Vec::new(),
            num_penetrations: 0,
            changed_dir: true,
            prev_error: 0,
            int_pos: [0; 2],
            prev_int_pos: [0; 2],
            hit_pos: [0; 2],
            step_ratio: 1.0,
            seg_progress: 0.0,
            seg_traj: Vec2::ZERO,
            delta: [0; 2],
            delta2: [0; 2],
            increment: [1; 2],
            error: 0,
            dom: X,
            sub: Y,
            dom_steps: 0,
            sub_steps: 0,
            sub_stepped: false,
            step_history: Vec::new(),
            terrain_mat_hit: MaterialId::AIR,
            mo_id_hit: None,
            terrain_hits_disabled: false,
            mo_hits_disabled: false,
            last_hit: HitData::default(),
        }
    }
}

impl Atom {
    /// Create an atom at `offset` from its owner's origin. The normal starts out
    /// pointing along the offset.
    pub fn new(offset: Vec2, material: MaterialId) -> Self {
        Self {
            offset,
            original_offset: offset,
            normal: offset.normalize_or_zero(),
            material,
            ..Self::default()
        }
    }

    /// Set the trail drawn behind a lone traveling atom
    pub fn with_trail(mut self, color: u8, length: usize) -> Self {
        self.trail_color = color;
        self.trail_length = length;
        self
    }

    /// Copy the authored data of another atom; segment state starts fresh
    pub fn from_reference(reference: &Atom) -> Self {
        Self {
            offset: reference.offset,
            original_offset: reference.original_offset,
            normal: reference.normal,
            material: reference.material,
            sub_id: reference.sub_id,
            trail_color: reference.trail_color,
            trail_length: reference.trail_length,
            ..Self::default()
        }
    }

    /// Return to the freshly constructed state so the atom can be handed out again
    pub fn reset_for_reuse(&mut self) {
        *self = Self::default();
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.offset = offset;
    }

    /// Offset before any subgroup placement
    pub fn original_offset(&self) -> Vec2 {
        self.original_offset
    }

    pub fn set_original_offset(&mut self, offset: Vec2) {
        self.original_offset = offset;
    }

    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    pub fn set_normal(&mut self, normal: Vec2) {
        self.normal = normal;
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn set_material(&mut self, material: MaterialId) {
        self.material = material;
    }

    pub fn sub_id(&self) -> i64 {
        self.sub_id
    }

    pub fn set_sub_id(&mut self, sub_id: i64) {
        self.sub_id = sub_id;
    }

    pub fn trail_color(&self) -> u8 {
        self.trail_color
    }

    pub fn trail_length(&self) -> usize {
        self.trail_length
    }

    pub fn num_penetrations(&self) -> u32 {
        self.num_penetrations
    }

    /// Pixel the atom currently occupies
    pub fn current_pos(&self) -> Vec2 {
        Vec2::new(self.int_pos[X] as f32, self.int_pos[Y] as f32)
    }

    /// Pixel occupied before the current segment began
    pub fn prev_pos(&self) -> Vec2 {
        Vec2::new(self.prev_int_pos[X] as f32, self.prev_int_pos[Y] as f32)
    }

    pub fn step_ratio(&self) -> f32 {
        self.step_ratio
    }

    /// Change the step ratio of the segment already set up
    pub fn set_step_ratio(&mut self, step_ratio: f32) {
        self.step_ratio = step_ratio;
    }

    pub fn last_hit(&self) -> &HitData {
        &self.last_hit
    }

    pub fn last_hit_mut(&mut self) -> &mut HitData {
        &mut self.last_hit
    }

    pub fn mo_id_hit(&self) -> Option<MoId> {
        self.mo_id_hit
    }

    pub(crate) fn set_mo_id_hit(&mut self, id: Option<MoId>) {
        self.mo_id_hit = id;
    }

    pub fn terrain_material_hit(&self) -> MaterialId {
        self.terrain_mat_hit
    }

    pub fn is_ignoring_terrain(&self) -> bool {
        self.terrain_hits_disabled
    }

    // Ignore lists

    /// Always ignore this object, regardless of the per-frame list
    pub fn set_ignore_mo_id(&mut self, id: Option<MoId>) {
        self.ignore_mo_id = id;
    }

    /// Ignore an object for the rest of this frame. Adding twice has no further effect.
    pub fn add_mo_id_to_ignore(&mut self, id: MoId) {
        if !self.ignore_mo_ids.contains(&id) {
            self.ignore_mo_ids.push(id);
        }
    }

    pub fn clear_mo_id_ignore_list(&mut self) {
        self.ignore_mo_ids.clear();
    }

    pub fn ignored_mo_ids(&self) -> &[MoId] {
        &self.ignore_mo_ids
    }

    /// Should a hit on `id` be skipped?
    ///
    /// Checks the permanent ignore, team and atom-group exclusions between the owner
    /// and the root of the hit object, then this atom's list and the group's list.
    pub fn is_ignoring_mo_id(
        &self,
        id: MoId,
        owner: &dyn MovableBody,
        objects: &dyn ObjectLookup,
        group_ignores: &[MoId],
    ) -> bool {
        if Some(id) == self.ignore_mo_id {
            return true;
        }
        if let Some(hit) = objects.profile(id) {
            let root = objects.profile(hit.root).unwrap_or(hit);
            if owner.ignores_team_hits() && root.ignores_team_hits && owner.team() == root.team {
                return true;
            }
            if (owner.ignores_atom_group_hits() && root.is_rotating)
                || (root.ignores_atom_group_hits && owner.is_rotating())
            {
                return true;
            }
        }
        self.ignore_mo_ids.contains(&id) || group_ignores.contains(&id)
    }

    /// Estimate the outward surface normal from the sprite's transparency around the atom.
    ///
    /// Returns false, leaving the normal untouched or zeroed, when the offset is zero
    /// or the atom falls outside the sprite.
    pub fn calculate_normal(&mut self, sprite: &Sprite, sprite_center: Vec2) -> bool {
        if self.offset == Vec2::ZERO {
            self.normal = Vec2::ZERO;
            return false;
        }
        let atom_pos = sprite_center + self.offset;
        if atom_pos.x < 0.0
            || atom_pos.y < 0.0
            || atom_pos.x >= sprite.width() as f32
            || atom_pos.y >= sprite.height() as f32
        {
            return false;
        }

        let base = IVec2::new(atom_pos.x.floor() as i32, atom_pos.y.floor() as i32);
        let mut normal = Vec2::ZERO;
        for [dx, dy] in NORMAL_CHECKS {
            if !sprite.is_solid(base.x + dx, base.y + dy) {
                normal += Vec2::new(dx as f32, dy as f32);
            }
        }
        self.normal = normal.normalize_or_zero();
        true
    }

    // Segment stepping

    /// Start tracking from `start`. Returns true if the start pixel already
    /// intersects terrain or an object.
    pub fn setup_pos(&mut self, start: Vec2, owner: &mut dyn MovableBody, terrain: &dyn TerrainQuery) -> bool {
        self.setup_pos_outcome(start, owner, terrain).is_hit()
    }

    /// `setup_pos` reporting `Embedded` for a start inside something
    pub fn setup_pos_outcome(
        &mut self,
        start: Vec2,
        owner: &mut dyn MovableBody,
        terrain: &dyn TerrainQuery,
    ) -> StepOutcome {
        let start_pixel = [start.x.floor() as i32, start.y.floor() as i32];
        if self.int_pos[X] > 0 && self.int_pos[Y] > 0 {
            self.prev_int_pos = self.int_pos;
        } else {
            self.prev_int_pos = start_pixel;
        }
        self.int_pos = start_pixel;

        self.terrain_mat_hit = terrain.material_at(self.int_pos[X], self.int_pos[Y]);
        if !self.terrain_mat_hit.is_air() {
            owner.set_hit_terrain_material(self.terrain_mat_hit);
            if owner.intersection_warning() {
                self.terrain_hits_disabled = true;
            }
        } else {
            self.terrain_hits_disabled = false;
        }

        if self.mo_id_hit.is_some() || !self.terrain_mat_hit.is_air() {
            StepOutcome::Embedded
        } else {
            StepOutcome::None
        }
    }

    /// Prepare to step along `trajectory` from `start`.
    ///
    /// `step_ratio` (0..1] lets an atom advance more slowly than one pixel per call,
    /// so atoms of a group covering different distances stay in lock-step. Returns the
    /// number of pixel steps along the dominant axis.
    pub fn setup_seg(&mut self, start: Vec2, trajectory: Vec2, step_ratio: f32) -> i32 {
        self.terrain_mat_hit = MaterialId::AIR;
        self.mo_id_hit = None;
        self.step_ratio = step_ratio;
        self.seg_progress = 0.0;
        self.seg_traj = trajectory;

        self.delta[X] = (start.x + trajectory.x).floor() as i32 - start.x.floor() as i32;
        self.delta[Y] = (start.y + trajectory.y).floor() as i32 - start.y.floor() as i32;
        for axis in [X, Y] {
            if self.delta[axis] < 0 {
                self.increment[axis] = -1;
                self.delta[axis] = -self.delta[axis];
            } else {
                self.increment[axis] = 1;
            }
        }
        self.delta2 = [self.delta[X] << 1, self.delta[Y] << 1];

        if self.delta[X] > self.delta[Y] {
            self.dom = X;
            self.sub = Y;
        } else {
            self.dom = Y;
            self.sub = X;
        }
        self.error = self.delta2[self.sub] - self.delta[self.dom];

        self.dom_steps = 0;
        self.sub_steps = 0;
        self.sub_stepped = false;
        self.step_history.clear();

        self.delta[self.dom] - self.dom_steps
    }

    /// Take one step along the segment, if the step ratio allows it this call.
    /// Returns true if the new pixel hit terrain or a non-ignored object.
    pub fn step_forward(
        &mut self,
        owner: &mut dyn MovableBody,
        terrain: &dyn TerrainQuery,
        objects: &dyn ObjectLookup,
        group_ignores: &[MoId],
    ) -> bool {
        self.step_forward_outcome(owner, terrain, objects, group_ignores).is_hit()
    }

    /// Take up to `num_steps` steps, stopping at the first hit
    pub fn step_forward_by(
        &mut self,
        num_steps: u32,
        owner: &mut dyn MovableBody,
        terrain: &dyn TerrainQuery,
        objects: &dyn ObjectLookup,
        group_ignores: &[MoId],
    ) -> StepOutcome {
        for _ in 0..num_steps {
            if self.dom_steps >= self.delta[self.dom] {
                break;
            }
            let outcome = self.step_forward_outcome(owner, terrain, objects, group_ignores);
            if outcome.is_hit() {
                return outcome;
            }
        }
        StepOutcome::None
    }

    /// `step_forward` reporting which kind of hit occurred. An object hit on the same
    /// pixel as terrain wins.
    pub fn step_forward_outcome(
        &mut self,
        owner: &mut dyn MovableBody,
        terrain: &dyn TerrainQuery,
        objects: &dyn ObjectLookup,
        group_ignores: &[MoId],
    ) -> StepOutcome {
        if self.delta[self.dom] == 0 {
            return StepOutcome::None;
        }
        let prev_progress = self.seg_progress;
        self.seg_progress += self.step_ratio;
        if self.seg_progress < (prev_progress + 1.0).floor() {
            self.step_history.push(None);
            return StepOutcome::None;
        }

        self.mo_id_hit = None;
        self.terrain_mat_hit = MaterialId::AIR;

        if self.dom_steps >= self.delta[self.dom] {
            debug_assert!(false, "Atom stepped beyond the end of its trajectory");
            owner.set_to_delete();
            self.step_history.push(None);
            return StepOutcome::None;
        }

        let (dom, sub) = (self.dom, self.sub);
        let error_before = self.error;
        self.dom_steps += 1;
        self.sub_stepped = false;

        self.int_pos[dom] += self.increment[dom];
        if self.error >= 0 {
            self.int_pos[sub] += self.increment[sub];
            self.sub_steps += 1;
            self.sub_stepped = true;
            self.error -= self.delta2[dom];
        }
        self.error += self.delta2[sub];
        self.step_history.push(Some(StepRecord {
            sub_stepped: self.sub_stepped,
            error: error_before,
        }));

        self.wrap_int_pos(terrain);

        let mut outcome = StepOutcome::None;

        self.terrain_mat_hit = terrain.material_at(self.int_pos[X], self.int_pos[Y]);
        if !self.terrain_mat_hit.is_air() {
            if !self.terrain_hits_disabled {
                owner.set_hit_terrain_material(self.terrain_mat_hit);
                self.hit_pos = self.int_pos;
                outcome = StepOutcome::HitTerrain;
            }
        } else {
            self.terrain_hits_disabled = false;
        }

        if owner.hits_mos() {
            self.mo_id_hit = objects
                .mo_id_at(self.int_pos[X], self.int_pos[Y])
                .filter(|&id| !self.is_ignoring_mo_id(id, &*owner, objects, group_ignores));

            match self.mo_id_hit {
                Some(id) => {
                    if !self.mo_hits_disabled {
                        self.hit_pos = self.int_pos;
                        owner.set_hit_mo_id(id);
                        outcome = StepOutcome::HitMO;
                    }
                }
                None => self.mo_hits_disabled = false,
            }
        }
        outcome
    }

    /// Undo the most recent `step_forward` call of this segment. Repeated calls keep
    /// walking back along the segment, so N undos return to the pixel held N calls
    /// earlier. Hit flags are left as they were, and `sub_stepped` keeps describing
    /// the undone step for the hit responses.
    pub fn step_back(&mut self, terrain: &dyn TerrainQuery) {
        let Some(entry) = self.step_history.pop() else {
            return;
        };
        self.seg_progress -= self.step_ratio;
        if let Some(record) = entry {
            let (dom, sub) = (self.dom, self.sub);
            self.dom_steps -= 1;
            self.int_pos[dom] -= self.increment[dom];
            if record.sub_stepped {
                self.sub_steps -= 1;
                self.int_pos[sub] -= self.increment[sub];
            }
            self.sub_stepped = record.sub_stepped;
            self.error = record.error;
            self.wrap_int_pos(terrain);
        }
    }

    fn wrap_int_pos(&mut self, terrain: &dyn TerrainQuery) {
        let mut point = IVec2::new(self.int_pos[X], self.int_pos[Y]);
        terrain.wrap_point(&mut point);
        self.int_pos = [point.x, point.y];
    }

    /// Pixel beside the hit pixel along one axis only: hit position on `axis`,
    /// current position on the other
    fn axis_probe(&self, axis: usize) -> (i32, i32) {
        if axis == X {
            (self.hit_pos[X], self.int_pos[Y])
        } else {
            (self.int_pos[X], self.hit_pos[Y])
        }
    }

    // Hit responses

    /// Work out the collision point and normal of the last object hit and let the
    /// hit object respond.
    ///
    /// Call after `step_back`, with the hitor side of `last_hit` (mass, inertia,
    /// radius, velocity, impulse factors) already filled in. Returns false when the
    /// hit is rejected, including when the bodies are hooked into each other.
    pub fn mo_hit_response(&mut self, owner: &mut dyn MovableBody, objects: &mut dyn ObjectLookup) -> bool {
        let Some(hit_id) = self.mo_id_hit.filter(|_| owner.hits_mos()) else {
            debug_assert!(false, "MO hit response without an MO hit");
            return false;
        };
        let (dom, sub) = (self.dom, self.sub);

        self.last_hit.hit_point = Vec2::ZERO;
        self.last_hit.bitmap_normal = Vec2::ZERO;
        let mut hit = [false; 2];

        let (px, py) = self.axis_probe(dom);
        if self.delta[dom] != 0 && objects.mo_id_at(px, py).is_some() {
            hit[dom] = true;
            self.last_hit.hit_point = Vec2::new(px as f32, py as f32);
            self.last_hit.bitmap_normal[dom] = -self.increment[dom] as f32;
        }

        let (px, py) = self.axis_probe(sub);
        if self.sub_stepped && self.delta[sub] != 0 && objects.mo_id_at(px, py).is_some() {
            hit[sub] = true;
            if self.last_hit.hit_point == Vec2::ZERO {
                self.last_hit.hit_point = Vec2::new(px as f32, py as f32);
            } else {
                self.last_hit.hit_point = Vec2::new(self.hit_pos[X] as f32, self.hit_pos[Y] as f32);
            }
            self.last_hit.bitmap_normal[sub] = -self.increment[sub] as f32;
        }

        if !hit[dom] && !hit[sub] {
            self.last_hit.hit_point = Vec2::new(self.hit_pos[X] as f32, self.hit_pos[Y] as f32);
            self.last_hit.bitmap_normal =
                Vec2::new(-self.increment[X] as f32, -self.increment[Y] as f32);
        }
        self.last_hit.bitmap_normal = self.last_hit.bitmap_normal.normalize_or_zero();

        if self.normal != Vec2::ZERO {
            self.last_hit.bitmap_normal = -owner.rotate_offset(self.normal);
        }

        // Radius and normal facing the same way means the bodies are hooked together
        let valid = self.last_hit.hit_radius[HITOR].dot(self.last_hit.bitmap_normal) < 0.0;

        self.last_hit.body = [owner.mo_id(), Some(hit_id)];
        self.last_hit.root_body[HITOR] = owner.root_id();
        self.last_hit.root_body[HITEE] = objects.profile(hit_id).map(|p| p.root);
        self.last_hit.hit_material[HITOR] = self.material;

        valid && objects.collide_at_point(hit_id, &mut self.last_hit)
    }

    /// Bounce response against the last terrain hit.
    ///
    /// Call after `step_back`, with the hitor side of `last_hit` filled in. Bounce is
    /// `-v - v*r_atom*r_terrain` on each hit axis, friction damps the other axis, and
    /// the result becomes an impulse through `accel / (1/m + handle^2/I)`.
    pub fn terr_hit_response(&mut self, terrain: &dyn TerrainQuery) -> HitData {
        if self.terrain_mat_hit.is_air() {
            debug_assert!(false, "Terrain hit response without a terrain hit");
            return self.last_hit;
        }
        let (dom, sub) = (self.dom, self.sub);
        let own = terrain.material(self.material);
        let hit_material_id = terrain.material_at(self.hit_pos[X], self.hit_pos[Y]);
        let hit_material = terrain.material(hit_material_id);
        let mut dom_material = terrain.material(MaterialId::AIR);
        let mut sub_material = terrain.material(MaterialId::AIR);

        self.last_hit.hit_material = [self.material, hit_material_id];
        self.last_hit.bitmap_normal = Vec2::ZERO;
        let mut hit = [false; 2];
        let mut hit_acc = self.last_hit.hit_vel[HITOR];

        let (px, py) = self.axis_probe(dom);
        let dom_id = terrain.material_at(px, py);
        if self.delta[dom] != 0 && !dom_id.is_air() {
            hit[dom] = true;
            dom_material = terrain.material(dom_id);
            self.last_hit.bitmap_normal[dom] = -self.increment[dom] as f32;
            hit_acc[dom] = -hit_acc[dom] - hit_acc[dom] * own.restitution * dom_material.restitution;
        }

        let (px, py) = self.axis_probe(sub);
        let sub_id = terrain.material_at(px, py);
        if self.sub_stepped && self.delta[sub] != 0 && !sub_id.is_air() {
            hit[sub] = true;
            sub_material = terrain.material(sub_id);
            self.last_hit.bitmap_normal[sub] = -self.increment[sub] as f32;
            hit_acc[sub] = -hit_acc[sub] - hit_acc[sub] * own.restitution * sub_material.restitution;
        }

        if !hit[dom] && !hit[sub] {
            // Corner hit: straight back, no friction
            self.last_hit.bitmap_normal[dom] = -self.increment[dom] as f32;
            self.last_hit.bitmap_normal[sub] = -self.increment[sub] as f32;
            let bounce = own.restitution * hit_material.restitution;
            hit_acc[dom] = -hit_acc[dom] - hit_acc[dom] * bounce;
            hit_acc[sub] = -hit_acc[sub] - hit_acc[sub] * bounce;
        } else if hit[dom] && !hit[sub] {
            let friction = own.friction * dom_material.friction;
            self.last_hit.bitmap_normal[sub] = -self.increment[sub] as f32 * friction;
            hit_acc[sub] = -hit_acc[sub] * friction;
        } else if hit[sub] && !hit[dom] {
            self.last_hit.bitmap_normal[dom] = -self.increment[dom] as f32 * own.friction * dom_material.friction;
            hit_acc[dom] = -hit_acc[dom] * own.friction * sub_material.friction;
        }
        self.last_hit.bitmap_normal = self.last_hit.bitmap_normal.normalize_or_zero();

        let handle = self.last_hit.lever(HITOR);
        self.last_hit.res_impulse[HITOR] = hit_acc
            / (1.0 / self.last_hit.total_mass[HITOR] + handle * handle / self.last_hit.mom_inertia[HITOR])
            * self.last_hit.impulse_factor[HITOR];
        self.last_hit.res_impulse[HITEE] = Vec2::ZERO;
        self.last_hit.body[HITEE] = None;

        self.last_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::material::Material;
    use crate::engine::physics::BodyBuilder;
    use crate::engine::scene::{ObjectRegistry, PixelScene};
    use approx::assert_abs_diff_eq;

    const ROCK: MaterialId = MaterialId(20);
    const BALL: MaterialId = MaterialId(21);

    fn scene() -> PixelScene {
        let mut scene = PixelScene::new(64, 64);
        scene.add_material(Material::new(ROCK, "Rock").with_integrity(1000.0).with_restitution(1.0).with_friction(0.0));
        scene.add_material(Material::new(BALL, "Ball").with_restitution(1.0).with_friction(0.0));
        scene
    }

    /// Bresenham reference: every pixel from `start` (exclusive) to `end` (inclusive)
    fn bresenham(start: IVec2, end: IVec2) -> Vec<IVec2> {
        crate::core::PixelLine::new(start.as_vec2(), (end - start).as_vec2()).collect()
    }

    #[test]
    fn test_step_coverage_matches_bresenham() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();

        for trajectory in [Vec2::new(7.0, 3.0), Vec2::new(-4.0, 9.0), Vec2::new(-6.0, -6.0), Vec2::new(0.0, 5.0)] {
            let start = Vec2::new(30.0, 30.0);
            let mut atom = Atom::new(Vec2::ZERO, BALL);
            atom.setup_pos(start, &mut owner, &scene);
            let steps = atom.setup_seg(start, trajectory, 1.0);

            let mut visited = Vec::new();
            for _ in 0..steps {
                assert!(!atom.step_forward(&mut owner, &scene, &objects, &[]));
                visited.push(atom.current_pos().as_ivec2());
            }
            let expected = bresenham(start.as_ivec2(), (start + trajectory).as_ivec2());
            assert_eq!(visited, expected, "Trajectory {:?} should follow Bresenham", trajectory);
        }
    }

    #[test]
    fn test_step_back_undoes_steps() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();
        let start = Vec2::new(10.0, 10.0);
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        atom.setup_pos(start, &mut owner, &scene);
        atom.setup_seg(start, Vec2::new(8.0, 5.0), 1.0);

        let mut history = vec![atom.current_pos()];
        for _ in 0..5 {
            atom.step_forward(&mut owner, &scene, &objects, &[]);
            history.push(atom.current_pos());
        }
        atom.step_back(&scene);
        assert_eq!(atom.current_pos(), history[4]);
    }

    #[test]
    fn test_step_back_retraces_history() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();

        for trajectory in [Vec2::new(8.0, 5.0), Vec2::new(-3.0, 11.0), Vec2::new(-9.0, -4.0), Vec2::new(6.0, 0.0)] {
            let start = Vec2::new(30.0, 30.0);
            let mut atom = Atom::new(Vec2::ZERO, BALL);
            atom.setup_pos(start, &mut owner, &scene);
            let steps = atom.setup_seg(start, trajectory, 1.0);

            let mut history = vec![atom.current_pos()];
            for _ in 0..steps {
                atom.step_forward(&mut owner, &scene, &objects, &[]);
                history.push(atom.current_pos());
            }

            for undone in 1..=steps as usize {
                atom.step_back(&scene);
                assert_eq!(
                    atom.current_pos(),
                    history[history.len() - 1 - undone],
                    "Trajectory {:?} after {} undos",
                    trajectory,
                    undone
                );
            }
        }
    }

    #[test]
    fn test_step_forward_after_back_off_stays_on_line() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();
        let start = Vec2::new(10.0, 10.0);
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        atom.setup_pos(start, &mut owner, &scene);
        let steps = atom.setup_seg(start, Vec2::new(8.0, 5.0), 1.0);

        for _ in 0..5 {
            atom.step_forward(&mut owner, &scene, &objects, &[]);
        }
        for _ in 0..3 {
            atom.step_back(&scene);
        }
        let line = bresenham(start.as_ivec2(), IVec2::new(18, 15));
        assert_eq!(atom.current_pos().as_ivec2(), line[1]);

        let mut resumed = Vec::new();
        for _ in 0..(steps - 2) {
            atom.step_forward(&mut owner, &scene, &objects, &[]);
            resumed.push(atom.current_pos().as_ivec2());
        }
        assert_eq!(resumed, line[2..].to_vec(), "Resumed steps should stay on the Bresenham line");
    }

    #[test]
    fn test_step_back_skips_delayed_calls() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();
        let start = Vec2::new(10.0, 10.0);
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        atom.setup_pos(start, &mut owner, &scene);
        atom.setup_seg(start, Vec2::new(4.0, 0.0), 0.5);

        atom.step_forward(&mut owner, &scene, &objects, &[]);
        atom.step_forward(&mut owner, &scene, &objects, &[]);
        atom.step_forward(&mut owner, &scene, &objects, &[]);
        assert_eq!(atom.current_pos(), Vec2::new(11.0, 10.0));

        atom.step_back(&scene);
        assert_eq!(atom.current_pos(), Vec2::new(11.0, 10.0), "The last call took no step");
        atom.step_back(&scene);
        assert_eq!(atom.current_pos(), Vec2::new(10.0, 10.0));
    }

    #[test]
    fn test_step_ratio_delays_steps() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();
        let start = Vec2::new(10.0, 10.0);
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        atom.setup_pos(start, &mut owner, &scene);
        atom.setup_seg(start, Vec2::new(4.0, 0.0), 0.5);

        atom.step_forward(&mut owner, &scene, &objects, &[]);
        assert_eq!(atom.current_pos(), Vec2::new(10.0, 10.0), "Half a step is not a step");
        atom.step_forward(&mut owner, &scene, &objects, &[]);
        assert_eq!(atom.current_pos(), Vec2::new(11.0, 10.0));
    }

    #[test]
    fn test_step_hits_terrain() {
        let mut scene = scene();
        scene.fill_rect(15, 0, 1, 64, ROCK);
        let objects = ObjectRegistry::new(64, 64);
        let mut owner = BodyBuilder::particle().build();
        let start = Vec2::new(12.5, 10.5);
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        atom.setup_pos(start, &mut owner, &scene);
        let steps = atom.setup_seg(start, Vec2::new(6.0, 0.0), 1.0);

        let mut outcome = StepOutcome::None;
        for _ in 0..steps {
            outcome = atom.step_forward_outcome(&mut owner, &scene, &objects, &[]);
            if outcome.is_hit() {
                break;
            }
        }
        assert_eq!(outcome, StepOutcome::HitTerrain);
        assert_eq!(atom.current_pos(), Vec2::new(15.0, 10.0));
        assert_eq!(owner.hit_terrain_material, ROCK);
    }

    #[test]
    fn test_setup_pos_embedded() {
        let mut scene = scene();
        scene.set_material(5, 5, ROCK);
        let mut owner = BodyBuilder::particle().build();
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        assert_eq!(atom.setup_pos_outcome(Vec2::new(5.5, 5.5), &mut owner, &scene), StepOutcome::Embedded);
        assert_eq!(atom.setup_pos_outcome(Vec2::new(8.5, 5.5), &mut owner, &scene), StepOutcome::None);
    }

    #[test]
    fn test_calculate_normal() {
        // 9x9 solid square; the atom sits on its right edge
        let sprite = Sprite::from_fn(9, 9, |_, _| 1);
        let mut atom = Atom::new(Vec2::new(4.0, 0.0), BALL);
        assert!(atom.calculate_normal(&sprite, Vec2::new(4.0, 4.0)));
        let first = atom.normal();
        assert_abs_diff_eq!(first.x, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(first.y, 0.0, epsilon = 1e-5);

        // Same input, same output
        assert!(atom.calculate_normal(&sprite, Vec2::new(4.0, 4.0)));
        assert_eq!(atom.normal(), first);
    }

    #[test]
    fn test_calculate_normal_guards() {
        let sprite = Sprite::from_fn(9, 9, |_, _| 1);
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        assert!(!atom.calculate_normal(&sprite, Vec2::new(4.0, 4.0)));
        assert_eq!(atom.normal(), Vec2::ZERO);

        let mut outside = Atom::new(Vec2::new(20.0, 0.0), BALL);
        assert!(!outside.calculate_normal(&sprite, Vec2::new(4.0, 4.0)));

        // Deep inside a big solid block every sample is solid, so the normal stays zero
        let block = Sprite::from_fn(32, 32, |_, _| 1);
        let mut buried = Atom::new(Vec2::new(1.0, 1.0), BALL);
        assert!(buried.calculate_normal(&block, Vec2::new(16.0, 16.0)));
        assert_eq!(buried.normal(), Vec2::ZERO);
        assert!(!buried.normal().x.is_nan());
    }

    #[test]
    fn test_ignore_list_is_idempotent() {
        let mut atom = Atom::new(Vec2::ZERO, BALL);
        atom.add_mo_id_to_ignore(MoId(3));
        atom.add_mo_id_to_ignore(MoId(3));
        assert_eq!(atom.ignored_mo_ids(), &[MoId(3)]);

        let owner = BodyBuilder::particle().build();
        let objects = ObjectRegistry::new(8, 8);
        assert!(atom.is_ignoring_mo_id(MoId(3), &owner, &objects, &[]));
        assert!(!atom.is_ignoring_mo_id(MoId(4), &owner, &objects, &[]));
        assert!(atom.is_ignoring_mo_id(MoId(4), &owner, &objects, &[MoId(4)]));

        atom.clear_mo_id_ignore_list();
        assert!(atom.ignored_mo_ids().is_empty());
    }

    #[test]
    fn test_terrain_bounce_law() {
        // Falling straight down onto a floor
        let mut scene = scene();
        scene.add_material(Material::new(MaterialId(22), "Soft").with_restitution(0.5).with_friction(0.0));
        scene.fill_rect(0, 20, 64, 4, ROCK);
        let objects = ObjectRegistry::new(64, 64);

        for (atom_material, expected) in [(BALL, -10.0), (MaterialId(22), -5.0)] {
            let mut owner = BodyBuilder::particle().build();
            let start = Vec2::new(10.5, 17.5);
            let mut atom = Atom::new(Vec2::ZERO, atom_material);
            atom.setup_pos(start, &mut owner, &scene);
            let steps = atom.setup_seg(start, Vec2::new(0.0, 5.0), 1.0);
            for _ in 0..steps {
                if atom.step_forward(&mut owner, &scene, &objects, &[]) {
                    break;
                }
            }
            atom.step_back(&scene);

            let hit = atom.last_hit_mut();
            hit.total_mass[HITOR] = 1.0;
            hit.mom_inertia[HITOR] = 1.0;
            hit.impulse_factor[HITOR] = 1.0;
            hit.hit_vel[HITOR] = Vec2::new(0.0, 10.0);
            let response = atom.terr_hit_response(&scene);

            // Impulse on a unit mass with no lever is the velocity change
            let post = Vec2::new(0.0, 10.0) + response.res_impulse[HITOR];
            assert_abs_diff_eq!(post.y, expected, epsilon = 1e-4);
            assert_eq!(response.bitmap_normal, Vec2::new(0.0, -1.0));
        }
    }
}
