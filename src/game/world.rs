// Demo world: a pixel scene plus the bodies stepping through it

use std::time::Duration;

use glam::{IVec2, Vec2};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::limb::{Limb, Walker};
use super::particle::Particle;
use super::rigid_body::RigidBody;
use crate::core::PhysicsSettings;
use crate::engine::assets::Sprite;
use crate::engine::game_loop::{SimClock, FIXED_TIMESTEP};
use crate::engine::material::{Material, MaterialId};
use crate::engine::physics::{Atom, AtomGroup, BodyBuilder, LimbPath, PhysicsContext};
use crate::engine::scene::{ObjectRegistry, PixelScene};

pub const BEDROCK: MaterialId = MaterialId(10);
pub const DIRT: MaterialId = MaterialId(11);
pub const STEEL: MaterialId = MaterialId(12);

/// Downward pull in m/s^2, y grows downward
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, 9.8);

/// Owns the scene collaborators and every body, and steps them on a fixed clock
pub struct DemoWorld {
    scene: PixelScene,
    objects: ObjectRegistry,
    settings: PhysicsSettings,
    rng: StdRng,
    gravity: Vec2,
    clock: SimClock,
    particles: Vec<Particle>,
    bodies: Vec<RigidBody>,
    walkers: Vec<Walker>,
}

impl DemoWorld {
    /// Create an empty world of `width` by `height` pixels
    pub fn new(width: i32, height: i32, settings: PhysicsSettings, seed: u64) -> Self {
        Self {
            scene: PixelScene::new(width, height).with_seed(seed),
            objects: ObjectRegistry::new(width, height).with_settings(settings),
            settings,
            rng: StdRng::seed_from_u64(seed),
            gravity: DEFAULT_GRAVITY,
            clock: SimClock::new(),
            particles: Vec::new(),
            bodies: Vec::new(),
            walkers: Vec::new(),
        }
    }

    /// A bedrock basin with a dirt mound, a shower of dirt particles, a steel crate and a walker
    pub fn demo(settings: PhysicsSettings, seed: u64) -> Self {
        let mut world = Self::new(160, 120, settings, seed);
        world.add_material(Material::new(BEDROCK, "Bedrock").with_integrity(1.0e6).with_restitution(0.2));
        world.add_material(Material::new(DIRT, "Dirt").with_integrity(30.0).with_density(1.5));
        world.add_material(Material::new(STEEL, "Steel").with_density(7.8).with_restitution(0.4));

        world.scene.fill_rect(0, 100, 160, 20, BEDROCK);
        world.scene.fill_rect(90, 88, 40, 12, DIRT);

        for i in 0..24 {
            let x = 60.5 + i as f32 * 2.0;
            let vx = world.rng.gen_range(-2.0..2.0);
            let vy = world.rng.gen_range(-1.0..1.0);
            let state = BodyBuilder::particle().position(x, 20.5).velocity(vx, vy).mass(0.5).build();
            world.add_particle(Particle::new(state, Atom::new(Vec2::ZERO, DIRT).with_trail(7, 4)));
        }

        let crate_sprite = Sprite::from_fn(10, 10, |_, _| 1).with_offset(IVec2::splat(-5));
        let group = AtomGroup::generate(&crate_sprite, STEEL, 2, 0);
        let state = BodyBuilder::rigid().position(110.5, 40.5).ang_vel(1.5).mass(25.0).radius(7.0).build();
        world.add_body(RigidBody::new(state, group));

        let stride = LimbPath::new()
            .with_start_seg_count(1)
            .with_segment(Vec2::new(0.0, 6.0))
            .with_segment(Vec2::new(6.0, 0.0))
            .with_segment(Vec2::new(0.0, -3.0))
            .with_segment(Vec2::new(-6.0, 0.0))
            .with_speeds(2.0, 4.0, 6.0)
            .with_push_force(3000.0);
        let foot = AtomGroup::with_atoms(vec![Atom::new(Vec2::ZERO, STEEL)], STEEL);
        let leg = Limb::new(foot, Vec2::new(0.0, 6.0), 14.0).with_path(stride);
        let torso = BodyBuilder::particle().position(30.5, 86.5).mass(40.0).radius(10.0).build();
        world.add_walker(Walker::new(torso, leg));

        info!(
            "Demo world ready: {} particles, {} bodies, {} walkers",
            world.particles.len(),
            world.bodies.len(),
            world.walkers.len()
        );
        world
    }

    /// Register a material with the scene and the object registry
    pub fn add_material(&mut self, material: Material) {
        self.objects.add_material(material.clone());
        self.scene.add_material(material);
    }

    pub fn add_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn add_body(&mut self, body: RigidBody) {
        self.bodies.push(body);
    }

    pub fn add_walker(&mut self, walker: Walker) {
        self.walkers.push(walker);
    }

    pub fn scene(&self) -> &PixelScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut PixelScene {
        &mut self.scene
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    /// Feed one frame of wall time to the clock and run the steps it hands out
    pub fn run_frame(&mut self, frame_time: Duration) -> u32 {
        let steps = self.clock.advance(frame_time);
        for _ in 0..steps {
            self.step(FIXED_TIMESTEP);
        }
        steps
    }

    /// Advance every body by `dt` seconds, then drop the ones flagged for removal
    pub fn step(&mut self, dt: f32) {
        let gravity = self.gravity;
        let mut ctx = PhysicsContext::new(&mut self.scene, &mut self.objects, &self.settings, &mut self.rng);

        let mut hits = 0;
        for particle in &mut self.particles {
            hits += particle.update(&mut ctx, gravity, dt);
        }
        for body in &mut self.bodies {
            hits += body.update(&mut ctx, gravity, dt).hit_count;
        }
        for walker in &mut self.walkers {
            walker.update(&mut ctx, gravity, dt);
        }

        let before = self.particles.len() + self.bodies.len();
        self.particles.retain(Particle::is_alive);
        self.bodies.retain(RigidBody::is_alive);
        let removed = before - self.particles.len() - self.bodies.len();
        if removed > 0 {
            debug!("Removed {} bodies", removed);
        }

        let debris = self.scene.take_debris();
        if hits > 0 || !debris.is_empty() {
            debug!("Step resolved {} hits, knocked {} pixels loose", hits, debris.len());
        }
    }
}
