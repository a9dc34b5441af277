// Limbs driven along a limb path, or flailing when the path is taken away

use glam::Vec2;
use log::debug;

use crate::core::{PhysicsSettings, VecExt};
use crate::engine::physics::{AtomGroup, BodyState, LimbPath, LimbPush, MovableBody, PhysicsContext};

/// An arm or leg pinned to its owner at `joint_offset`
#[derive(Debug, Clone)]
pub struct Limb {
    group: AtomGroup,
    path: Option<LimbPath>,
    joint_offset: Vec2,
    reach: f32,
    last_push: LimbPush,
}

impl Limb {
    /// A limp limb that can swing up to `reach` pixels from its joint
    pub fn new(mut group: AtomGroup, joint_offset: Vec2, reach: f32) -> Self {
        group.set_joint_offset(joint_offset);
        Self {
            group,
            path: None,
            joint_offset,
            reach,
            last_push: LimbPush::default(),
        }
    }

    pub fn with_path(mut self, path: LimbPath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn group(&self) -> &AtomGroup {
        &self.group
    }

    pub fn path(&self) -> Option<&LimbPath> {
        self.path.as_ref()
    }

    pub fn path_mut(&mut self) -> Option<&mut LimbPath> {
        self.path.as_mut()
    }

    /// Remove the path, leaving the limb to flail
    pub fn take_path(&mut self) -> Option<LimbPath> {
        self.path.take()
    }

    pub fn is_limp(&self) -> bool {
        self.path.is_none()
    }

    pub fn limb_pos(&self) -> Vec2 {
        self.group.limb_pos()
    }

    /// Place the limb without moving it through the scene
    pub fn set_limb_pos(&mut self, pos: Vec2) {
        self.group.set_limb_pos(pos);
    }

    pub fn last_push(&self) -> LimbPush {
        self.last_push
    }

    /// Joint offset turned and flipped with the owner
    fn world_joint_offset(&self, owner: &dyn MovableBody) -> Vec2 {
        self.joint_offset
            .x_flipped(owner.is_h_flipped())
            .rad_rotated(owner.rotation())
    }

    pub fn joint_pos(&self, owner: &dyn MovableBody) -> Vec2 {
        owner.pos() + self.world_joint_offset(owner)
    }

    /// Move the limb for `dt` seconds.
    ///
    /// With a path the limb walks it and pushes the owner with the scene's reaction.
    /// Without one it flails within reach of the joint.
    pub fn update(
        &mut self,
        ctx: &mut PhysicsContext,
        owner: &mut dyn MovableBody,
        dt: f32,
        affect_rotation: bool,
    ) -> LimbPush {
        let joint_offset = self.world_joint_offset(&*owner);
        let owner_pos = owner.pos();
        let velocity = owner.vel();
        let rotation = owner.rotation();
        let ang_vel = owner.ang_vel();

        self.last_push = match self.path.as_mut() {
            Some(path) => {
                let push = self.group.push_as_limb(
                    ctx,
                    owner,
                    owner_pos + joint_offset,
                    velocity,
                    rotation,
                    path,
                    dt,
                    affect_rotation,
                );
                if !push.pushed {
                    debug!("No free spot to restart the limb path from");
                }
                push
            }
            None => {
                let flail = self
                    .group
                    .flail_as_limb(ctx, &*owner, owner_pos, joint_offset, self.reach, velocity, ang_vel, dt);
                LimbPush {
                    impulse: flail.impulse,
                    ..LimbPush::default()
                }
            }
        };
        self.last_push
    }
}

/// A torso held up by one walking leg
#[derive(Debug, Clone)]
pub struct Walker {
    torso: BodyState,
    leg: Limb,
}

impl Walker {
    pub fn new(torso: BodyState, leg: Limb) -> Self {
        Self { torso, leg }
    }

    pub fn torso(&self) -> &BodyState {
        &self.torso
    }

    pub fn torso_mut(&mut self) -> &mut BodyState {
        &mut self.torso
    }

    pub fn leg(&self) -> &Limb {
        &self.leg
    }

    pub fn leg_mut(&mut self) -> &mut Limb {
        &mut self.leg
    }

    /// Walk the leg, then move the torso by its velocity plus the leg's push
    pub fn update(&mut self, ctx: &mut PhysicsContext, gravity: Vec2, dt: f32) -> LimbPush {
        let settings: &PhysicsSettings = ctx.settings;
        let push = self.leg.update(ctx, &mut self.torso, dt, false);

        self.torso.apply_impulses(0.0);
        self.torso.vel += gravity * dt;
        self.torso.pos += self.torso.vel * dt * settings.pixels_per_meter;
        push
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_SETTINGS;
    use crate::engine::material::{Material, MaterialId};
    use crate::engine::physics::{Atom, BodyBuilder};
    use crate::engine::scene::{ObjectRegistry, PixelScene};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const STEEL: MaterialId = MaterialId(40);
    const ROCK: MaterialId = MaterialId(41);

    fn scene(size: i32) -> PixelScene {
        let mut scene = PixelScene::new(size, size);
        scene.add_material(Material::new(STEEL, "Steel"));
        scene.add_material(Material::new(ROCK, "Rock").with_integrity(1.0e6).with_restitution(0.0));
        scene
    }

    fn foot() -> AtomGroup {
        AtomGroup::with_atoms(vec![Atom::new(Vec2::ZERO, STEEL)], STEEL)
    }

    fn step_path() -> LimbPath {
        LimbPath::new()
            .with_start_seg_count(1)
            .with_segment(Vec2::new(0.0, 10.0))
            .with_segment(Vec2::new(10.0, 0.0))
            .with_speeds(2.0, 4.0, 8.0)
            .with_push_force(1000.0)
    }

    #[test]
    fn test_joint_follows_owner_flip() {
        let limb = Limb::new(foot(), Vec2::new(3.0, 4.0), 5.0);
        let mut owner = BodyBuilder::particle().position(10.0, 10.0).build();
        assert_eq!(limb.joint_pos(&owner), Vec2::new(13.0, 14.0));

        owner.h_flipped = true;
        assert_eq!(limb.joint_pos(&owner), Vec2::new(7.0, 14.0));
        assert_eq!(limb.group().joint_offset(), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_limb_walks_its_path() {
        let mut scene = scene(64);
        let mut objects = ObjectRegistry::new(64, 64);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = PhysicsContext::new(&mut scene, &mut objects, &DEFAULT_SETTINGS, &mut rng);

        let mut limb = Limb::new(foot(), Vec2::ZERO, 10.0).with_path(step_path());
        limb.set_limb_pos(Vec2::new(20.0, 20.0));
        let mut owner = BodyBuilder::particle().position(20.5, 20.5).mass(10.0).radius(20.0).build();

        let push = limb.update(&mut ctx, &mut owner, 1.0 / 60.0, true);

        assert!(push.pushed);
        assert!(push.restarted, "A fresh path starts out ended");
        assert_relative_eq!(limb.limb_pos().y, 30.0);
        assert!(limb.path().is_some_and(|path| path.frame_done()));
        assert_eq!(limb.last_push(), push);
    }

    #[test]
    fn test_limp_limb_flails_within_reach() {
        let mut scene = scene(128);
        let mut objects = ObjectRegistry::new(128, 128);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = PhysicsContext::new(&mut scene, &mut objects, &DEFAULT_SETTINGS, &mut rng);

        let mut limb = Limb::new(foot(), Vec2::new(0.0, 10.0), 5.0).with_path(step_path());
        assert!(limb.take_path().is_some());
        assert!(limb.is_limp());

        limb.set_limb_pos(Vec2::new(20.0, 30.0));
        let mut owner = BodyBuilder::particle().position(20.0, 20.0).velocity(0.0, 20.0).mass(10.0).build();

        let push = limb.update(&mut ctx, &mut owner, 0.1, false);

        assert!(!push.pushed);
        assert_relative_eq!(limb.limb_pos().x, 20.0, epsilon = 1e-4);
        assert_relative_eq!(limb.limb_pos().y, 35.0, epsilon = 1e-4);
        assert!(owner.impulses.is_empty(), "Flailing never pushes the owner");
    }

    #[test]
    fn test_walker_leg_holds_torso_up() {
        let mut scene = scene(64);
        scene.fill_rect(0, 25, 64, 39, ROCK);
        let mut objects = ObjectRegistry::new(64, 64);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = PhysicsContext::new(&mut scene, &mut objects, &DEFAULT_SETTINGS, &mut rng);

        let mut leg = Limb::new(foot(), Vec2::new(0.0, 10.0), 10.0)
            .with_path(LimbPath::new().with_segment(Vec2::new(0.0, 20.0)).with_speeds(2.0, 4.0, 8.0).with_push_force(1000.0));
        leg.set_limb_pos(Vec2::new(20.0, 20.0));
        let torso = BodyBuilder::particle().position(20.5, 10.5).mass(10.0).radius(20.0).build();
        let mut walker = Walker::new(torso, leg);

        let push = walker.update(&mut ctx, Vec2::ZERO, 0.1);

        assert!(push.pushed);
        assert_eq!(walker.leg().limb_pos(), Vec2::new(20.0, 24.0), "Foot rests on the ground");
        // The ground's reaction of -40 kg*m/s on 10 kg
        assert_relative_eq!(walker.torso().vel.y, -4.0, epsilon = 1e-3);
        assert!(walker.torso().impulses.is_empty(), "Impulses were applied");
        assert!(walker.torso().pos.y < 10.5);
    }
}
