// Pixel-stepped atom physics: atoms, atom groups and limb paths

mod atom;
mod atom_group;
mod atom_travel;
mod body;
mod debug;
mod group_travel;
mod hit_data;
mod limb_path;
mod preset;
mod push_travel;

use glam::IVec2;
use rand::RngCore;
use thiserror::Error;

use crate::core::PhysicsSettings;
use crate::engine::scene::{ObjectLookup, TerrainQuery};

pub use atom::{Atom, StepOutcome, NORMAL_CHECKS};
pub use atom_group::{AtomGroup, AtomList, SubgroupId};
pub use body::{BodyBuilder, BodyState, MovableBody};
pub use debug::DebugCanvas;
pub use group_travel::GroupTravel;
pub use hit_data::{point_velocity, HitData, HITEE, HITOR};
pub use limb_path::{LimbPath, Speed};
pub use preset::{AtomGroupPreset, AtomPreset, LimbPathPreset};
pub use push_travel::{LimbPush, PushTravel};

/// Collaborators and tuning shared by every travel call in a frame
pub struct PhysicsContext<'a> {
    pub terrain: &'a mut dyn TerrainQuery,
    pub objects: &'a mut dyn ObjectLookup,
    pub settings: &'a PhysicsSettings,
    pub rng: &'a mut dyn RngCore,
}

impl<'a> PhysicsContext<'a> {
    pub fn new(
        terrain: &'a mut dyn TerrainQuery,
        objects: &'a mut dyn ObjectLookup,
        settings: &'a PhysicsSettings,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            terrain,
            objects,
            settings,
            rng,
        }
    }
}

/// What a lone atom's travel call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TravelReport {
    /// Hits resolved, capped by the settings
    pub hit_count: u32,
    /// Last trail-length pixels passed through, oldest first
    pub trail: Vec<IVec2>,
    /// The owner crossed a wrapping scene edge
    pub did_wrap: bool,
}

/// Errors from loading or saving presets and settings
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("Invalid preset JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown material id {0}")]
    InvalidMaterial(u8),

    #[error("Atom group preset has no atoms")]
    EmptyAtomGroup,

    #[error("Limb path preset has no segments")]
    EmptyLimbPath,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
