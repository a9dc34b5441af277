//! Pixel-accurate atom physics for destructible 2D terrain.
//!
//! Bodies are sampled by atoms that step pixel by pixel through a material grid
//! and a raster of other movable objects. Collisions, bounces, friction and
//! penetration all come from those samples.

pub mod core;
pub mod engine;
pub mod game;
