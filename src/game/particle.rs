// Single-atom bodies: sparks, debris, shots

use glam::Vec2;

use crate::engine::physics::{Atom, BodyState, PhysicsContext, TravelReport};

/// A body made of exactly one atom at its origin
#[derive(Debug, Clone)]
pub struct Particle {
    state: BodyState,
    atom: Atom,
    last_travel: TravelReport,
}

impl Particle {
    pub fn new(state: BodyState, atom: Atom) -> Self {
        Self {
            state,
            atom,
            last_travel: TravelReport::default(),
        }
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BodyState {
        &mut self.state
    }

    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// What the most recent update did
    pub fn last_travel(&self) -> &TravelReport {
        &self.last_travel
    }

    /// Not yet absorbed, gibbed or otherwise flagged for removal
    pub fn is_alive(&self) -> bool {
        !self.state.to_delete
    }

    /// Apply gravity and travel for `dt` seconds. Returns the hits resolved.
    pub fn update(&mut self, ctx: &mut PhysicsContext, gravity: Vec2, dt: f32) -> u32 {
        if !self.is_alive() {
            return 0;
        }

        self.state.vel += gravity * dt;
        self.last_travel = self.atom.travel(ctx, &mut self.state, dt, true, false);
        self.last_travel.hit_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_SETTINGS;
    use crate::engine::material::{Material, MaterialId};
    use crate::engine::physics::BodyBuilder;
    use crate::engine::scene::{ObjectRegistry, PixelScene};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ROCK: MaterialId = MaterialId(20);
    const RUBBER: MaterialId = MaterialId(21);

    fn scene() -> PixelScene {
        let mut scene = PixelScene::new(64, 64);
        scene.add_material(Material::new(ROCK, "Rock").with_integrity(1.0e6).with_restitution(1.0));
        scene.add_material(Material::new(RUBBER, "Rubber").with_restitution(0.5).with_friction(0.0));
        scene
    }

    #[test]
    fn test_gravity_accelerates_free_particle() {
        let mut scene = scene();
        let mut objects = ObjectRegistry::new(64, 64);
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = PhysicsContext::new(&mut scene, &mut objects, &DEFAULT_SETTINGS, &mut rng);

        let state = BodyBuilder::particle().position(10.5, 10.5).build();
        let mut particle = Particle::new(state, Atom::new(Vec2::ZERO, RUBBER));

        let hits = particle.update(&mut ctx, Vec2::new(0.0, 10.0), 0.1);

        assert_eq!(hits, 0);
        assert_relative_eq!(particle.state().vel.y, 1.0, epsilon = 1e-5);
        // 1 m/s for 0.1 s at 20 px/m
        assert_relative_eq!(particle.state().pos.y, 12.5, epsilon = 1e-4);
    }

    #[test]
    fn test_particle_bounces_off_floor() {
        let mut scene = scene();
        scene.fill_rect(0, 20, 64, 4, ROCK);
        let mut objects = ObjectRegistry::new(64, 64);
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = PhysicsContext::new(&mut scene, &mut objects, &DEFAULT_SETTINGS, &mut rng);

        let state = BodyBuilder::particle().position(10.5, 19.5).velocity(0.0, 10.0).build();
        let mut particle = Particle::new(state, Atom::new(Vec2::ZERO, RUBBER));

        let time = 1.5 / (10.0 * DEFAULT_SETTINGS.pixels_per_meter);
        let hits = particle.update(&mut ctx, Vec2::ZERO, time);

        assert!(hits >= 1, "Should hit the floor");
        assert_relative_eq!(particle.state().vel.y, -5.0, max_relative = 1e-4);
        assert!(particle.state().pos.y < 20.0, "Stays out of the rock");
        assert_eq!(particle.state().hit_terrain_material, ROCK);
    }

    #[test]
    fn test_removed_particle_stays_put() {
        let mut scene = scene();
        let mut objects = ObjectRegistry::new(64, 64);
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = PhysicsContext::new(&mut scene, &mut objects, &DEFAULT_SETTINGS, &mut rng);

        let state = BodyBuilder::particle().position(10.5, 10.5).velocity(5.0, 0.0).build();
        let mut particle = Particle::new(state, Atom::new(Vec2::ZERO, RUBBER));
        particle.state_mut().to_delete = true;

        assert_eq!(particle.update(&mut ctx, Vec2::new(0.0, 10.0), 0.1), 0);
        assert!(!particle.is_alive());
        assert_eq!(particle.state().pos, Vec2::new(10.5, 10.5));
        assert_eq!(particle.state().vel, Vec2::new(5.0, 0.0));
    }
}
