// Movable bodies that own atoms and atom groups

use glam::Vec2;

use super::HitData;
use crate::core::VecExt;
use crate::engine::material::MaterialId;
use crate::engine::scene::{MoId, OrphanRemoval, Team};

/// The object an atom or atom group moves.
///
/// Travel calls borrow the owner mutably for their whole duration, read its motion
/// state and report hits back through the hooks. Hook defaults do nothing, so a
/// simple body only has to supply its kinematics.
pub trait MovableBody {
    // Identity

    fn mo_id(&self) -> Option<MoId>;

    /// Top ancestor of this body; itself unless attached to something
    fn root_id(&self) -> Option<MoId> {
        self.mo_id()
    }

    fn team(&self) -> Option<Team> {
        None
    }

    fn ignores_team_hits(&self) -> bool {
        false
    }

    fn ignores_atom_group_hits(&self) -> bool {
        false
    }

    /// Collides through an atom group rather than a single atom
    fn is_rotating(&self) -> bool;

    /// Collides with other movable objects
    fn hits_mos(&self) -> bool;

    fn ignores_terrain(&self) -> bool {
        false
    }

    // Kinematics

    fn pos(&self) -> Vec2;
    fn set_pos(&mut self, pos: Vec2);
    fn vel(&self) -> Vec2;
    fn set_vel(&mut self, vel: Vec2);

    fn rotation(&self) -> f32 {
        0.0
    }

    fn set_rotation(&mut self, _rotation: f32) {}

    fn ang_vel(&self) -> f32 {
        0.0
    }

    fn set_ang_vel(&mut self, _ang_vel: f32) {}

    fn is_h_flipped(&self) -> bool {
        false
    }

    fn mass(&self) -> f32;

    /// Multiplier on the impulse used to penetrate terrain
    fn sharpness(&self) -> f32 {
        1.0
    }

    fn radius(&self) -> f32;

    fn diameter(&self) -> f32 {
        self.radius() * 2.0
    }

    fn orphan_removal(&self) -> OrphanRemoval {
        OrphanRemoval::default()
    }

    /// Turn an offset in the body's unrotated frame into scene orientation
    fn rotate_offset(&self, offset: Vec2) -> Vec2 {
        offset.x_flipped(self.is_h_flipped()).rad_rotated(self.rotation())
    }

    // Hit bookkeeping

    fn set_hit_terrain_material(&mut self, _material: MaterialId) {}

    fn set_hit_mo_id(&mut self, _id: MoId) {}

    /// True while the body is known to be intersecting terrain it should ignore
    fn intersection_warning(&self) -> bool {
        false
    }

    // Hooks

    /// Bounced off terrain. Returning true halts the travel.
    fn on_bounce(&mut self, _hit: &HitData) -> bool {
        false
    }

    /// Sank into terrain. Returning true halts the travel.
    fn on_sink(&mut self, _hit: &HitData) -> bool {
        false
    }

    /// Hit another object. Returning true vetoes the hit.
    fn on_mo_hit(&mut self, _other: Option<MoId>) -> bool {
        false
    }

    /// Queue an impulse (kg*m/s) applied at `lever` (meters from the centre of mass)
    fn add_impulse_force(&mut self, impulse: Vec2, lever: Vec2);

    fn set_to_delete(&mut self);

    /// Ask for a full terrain intersection check at the end of the frame
    fn force_deep_check(&mut self) {}

    fn can_be_squished(&self) -> bool {
        false
    }

    fn gib(&mut self, _impulse: Vec2) {}

    /// Amount credited to an actor's team when this body touches one and is absorbed
    /// instead of bouncing. `None` for ordinary bodies.
    fn absorbed_on_actor_contact(&self) -> Option<f32> {
        None
    }
}

/// Plain body state implementing `MovableBody` by recording what happens to it
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub id: Option<MoId>,
    pub root: Option<MoId>,
    pub team: Option<Team>,
    pub ignores_team_hits: bool,
    pub ignores_atom_group_hits: bool,
    pub rotating: bool,
    pub hits_mos: bool,
    pub ignores_terrain: bool,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rotation: f32,
    pub ang_vel: f32,
    pub h_flipped: bool,
    pub mass: f32,
    pub sharpness: f32,
    pub radius: f32,
    pub orphan_removal: OrphanRemoval,
    pub absorb_amount: Option<f32>,
    pub squishable: bool,

    // Recorded by hooks
    pub hit_terrain_material: MaterialId,
    pub hit_mo_id: Option<MoId>,
    pub intersection_warning: bool,
    pub impulses: Vec<(Vec2, Vec2)>,
    pub bounces: u32,
    pub sinks: u32,
    pub mo_hits: u32,
    pub to_delete: bool,
    pub deep_check: bool,
    pub gibbed: bool,
}

impl BodyState {
    /// Sum of queued impulses
    pub fn total_impulse(&self) -> Vec2 {
        self.impulses.iter().map(|(impulse, _)| *impulse).sum()
    }

    /// Apply and clear queued impulses
    pub fn apply_impulses(&mut self, mom_inertia: f32) {
        for (impulse, lever) in self.impulses.drain(..) {
            self.vel += impulse / self.mass;
            if self.rotating && mom_inertia > 0.0 {
                self.ang_vel += lever.perpendicular().dot(impulse) / mom_inertia;
            }
        }
    }
}

impl MovableBody for BodyState {
    fn mo_id(&self) -> Option<MoId> {
        self.id
    }

    fn root_id(&self) -> Option<MoId> {
        self.root.or(self.id)
    }

    fn team(&self) -> Option<Team> {
        self.team
    }

    fn ignores_team_hits(&self) -> bool {
        self.ignores_team_hits
    }

    fn ignores_atom_group_hits(&self) -> bool {
        self.ignores_atom_group_hits
    }

    fn is_rotating(&self) -> bool {
        self.rotating
    }

    fn hits_mos(&self) -> bool {
        self.hits_mos
    }

    fn ignores_terrain(&self) -> bool {
        self.ignores_terrain
    }

    fn pos(&self) -> Vec2 {
        self.pos
    }

    fn set_pos(&mut self, pos: Vec2) {
        self.pos = pos;
    }

    fn vel(&self) -> Vec2 {
        self.vel
    }

    fn set_vel(&mut self, vel: Vec2) {
        self.vel = vel;
    }

    fn rotation(&self) -> f32 {
        self.rotation
    }

    fn set_rotation(&mut self, rotation: f32) {
        self.rotation = rotation;
    }

    fn ang_vel(&self) -> f32 {
        self.ang_vel
    }

    fn set_ang_vel(&mut self, ang_vel: f32) {
        self.ang_vel = ang_vel;
    }

    fn is_h_flipped(&self) -> bool {
        self.h_flipped
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn sharpness(&self) -> f32 {
        self.sharpness
    }

    fn radius(&self) -> f32 {
        self.radius
    }

    fn orphan_removal(&self) -> OrphanRemoval {
        self.orphan_removal
    }

    fn set_hit_terrain_material(&mut self, material: MaterialId) {
        self.hit_terrain_material = material;
    }

    fn set_hit_mo_id(&mut self, id: MoId) {
        self.hit_mo_id = Some(id);
    }

    fn intersection_warning(&self) -> bool {
        self.intersection_warning
    }

    fn on_bounce(&mut self, _hit: &HitData) -> bool {
        self.bounces += 1;
        false
    }

    fn on_sink(&mut self, _hit: &HitData) -> bool {
        self.sinks += 1;
        false
    }

    fn on_mo_hit(&mut self, _other: Option<MoId>) -> bool {
        self.mo_hits += 1;
        false
    }

    fn add_impulse_force(&mut self, impulse: Vec2, lever: Vec2) {
        self.impulses.push((impulse, lever));
    }

    fn set_to_delete(&mut self) {
        self.to_delete = true;
    }

    fn force_deep_check(&mut self) {
        self.deep_check = true;
    }

    fn can_be_squished(&self) -> bool {
        self.squishable
    }

    fn gib(&mut self, _impulse: Vec2) {
        self.gibbed = true;
        self.to_delete = true;
    }

    fn absorbed_on_actor_contact(&self) -> Option<f32> {
        self.absorb_amount
    }
}

/// Builder for body state with common configurations
pub struct BodyBuilder {
    state: BodyState,
}

impl BodyBuilder {
    /// A lone particle moved by a single atom
    pub fn particle() -> Self {
        Self {
            state: BodyState {
                id: None,
                root: None,
                team: None,
                ignores_team_hits: false,
                ignores_atom_group_hits: false,
                rotating: false,
                hits_mos: false,
                ignores_terrain: false,
                pos: Vec2::ZERO,
                vel: Vec2::ZERO,
                rotation: 0.0,
                ang_vel: 0.0,
                h_flipped: false,
                mass: 1.0,
                sharpness: 1.0,
                radius: 1.0,
                orphan_removal: OrphanRemoval::default(),
                absorb_amount: None,
                squishable: false,
                hit_terrain_material: MaterialId::AIR,
                hit_mo_id: None,
                intersection_warning: false,
                impulses: Vec::new(),
                bounces: 0,
                sinks: 0,
                mo_hits: 0,
                to_delete: false,
                deep_check: false,
                gibbed: false,
            },
        }
    }

    /// A rotating body moved by an atom group
    pub fn rigid() -> Self {
        let mut builder = Self::particle();
        builder.state.rotating = true;
        builder.state.hits_mos = true;
        builder
    }

    /// Set the MOID painted for this body
    pub fn id(mut self, id: MoId) -> Self {
        self.state.id = Some(id);
        self
    }

    /// Attach to a root body
    pub fn root(mut self, root: MoId) -> Self {
        self.state.root = Some(root);
        self
    }

    pub fn team(mut self, team: Team) -> Self {
        self.state.team = Some(team);
        self
    }

    /// Skip hits with same-team objects that also skip them
    pub fn ignore_team_hits(mut self) -> Self {
        self.state.ignores_team_hits = true;
        self
    }

    pub fn ignore_atom_group_hits(mut self) -> Self {
        self.state.ignores_atom_group_hits = true;
        self
    }

    pub fn position(mut self, x: f32, y: f32) -> Self {
        self.state.pos = Vec2::new(x, y);
        self
    }

    /// Set the initial velocity (m/s)
    pub fn velocity(mut self, x: f32, y: f32) -> Self {
        self.state.vel = Vec2::new(x, y);
        self
    }

    pub fn rotation(mut self, angle: f32) -> Self {
        self.state.rotation = angle;
        self
    }

    /// Set the angular velocity (radians per second)
    pub fn ang_vel(mut self, ang_vel: f32) -> Self {
        self.state.ang_vel = ang_vel;
        self
    }

    pub fn flipped(mut self, flipped: bool) -> Self {
        self.state.h_flipped = flipped;
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.state.mass = mass;
        self
    }

    pub fn sharpness(mut self, sharpness: f32) -> Self {
        self.state.sharpness = sharpness;
        self
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.state.radius = radius;
        self
    }

    pub fn hits_mos(mut self, hits_mos: bool) -> Self {
        self.state.hits_mos = hits_mos;
        self
    }

    pub fn ignore_terrain(mut self) -> Self {
        self.state.ignores_terrain = true;
        self
    }

    pub fn orphan_removal(mut self, orphans: OrphanRemoval) -> Self {
        self.state.orphan_removal = orphans;
        self
    }

    /// Absorb into actors on contact, crediting `amount`
    pub fn absorbed_by_actors(mut self, amount: f32) -> Self {
        self.state.absorb_amount = Some(amount);
        self
    }

    pub fn squishable(mut self) -> Self {
        self.state.squishable = true;
        self
    }

    pub fn build(self) -> BodyState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_builder_defaults() {
        let body = BodyBuilder::particle().position(3.0, 4.0).mass(2.0).build();
        assert_eq!(body.pos(), Vec2::new(3.0, 4.0));
        assert_eq!(body.mass(), 2.0);
        assert!(!body.is_rotating());
        assert!(!body.hits_mos());
        assert_eq!(body.diameter(), 2.0);

        let rigid = BodyBuilder::rigid().id(MoId(4)).build();
        assert!(rigid.is_rotating());
        assert!(rigid.hits_mos());
        assert_eq!(rigid.root_id(), Some(MoId(4)), "Unattached body is its own root");
    }

    #[test]
    fn test_rotate_offset_flips_then_rotates() {
        let body = BodyBuilder::rigid()
            .flipped(true)
            .rotation(std::f32::consts::FRAC_PI_2)
            .build();
        let rotated = body.rotate_offset(Vec2::new(1.0, 0.0));
        // Flipped to (-1, 0), then a quarter turn in the body convention
        let expected = Vec2::new(-1.0, 0.0).rad_rotated(std::f32::consts::FRAC_PI_2);
        assert_abs_diff_eq!(rotated.x, expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(rotated.y, expected.y, epsilon = 1e-5);
    }

    #[test]
    fn test_apply_impulses() {
        let mut body = BodyBuilder::rigid().mass(2.0).build();
        body.add_impulse_force(Vec2::new(4.0, 0.0), Vec2::new(0.0, 1.0));
        assert_eq!(body.total_impulse(), Vec2::new(4.0, 0.0));

        body.apply_impulses(2.0);
        assert_eq!(body.vel, Vec2::new(2.0, 0.0));
        // perp((0, 1)) = (1, 0); (1, 0) . (4, 0) / 2 = 2
        assert_abs_diff_eq!(body.ang_vel, 2.0, epsilon = 1e-6);
        assert!(body.impulses.is_empty());
    }
}
