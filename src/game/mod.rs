// Game-side bodies built on the atom physics
//
// - Particles: one atom, free flight with bounces and penetration
// - Rigid bodies: atom groups that tumble as one piece
// - Limbs and walkers: atom groups pushed along limb paths
// - The demo world that owns a scene and steps all of them

pub mod limb;
pub mod particle;
pub mod rigid_body;
pub mod world;

pub use limb::{Limb, Walker};
pub use particle::Particle;
pub use rigid_body::RigidBody;
pub use world::DemoWorld;
