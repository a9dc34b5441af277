// Core utilities shared by the engine and game modules

pub mod line;
pub mod math;
pub mod settings;

pub use line::PixelLine;
pub use math::{VecExt, X, Y};
pub use settings::{PhysicsSettings, DEFAULT_SETTINGS};
