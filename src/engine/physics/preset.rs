// Authored atom group and limb path presets, stored as JSON

use glam::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::atom::Atom;
use super::atom_group::AtomGroup;
use super::limb_path::{LimbPath, Speed};
use super::PresetError;
use crate::engine::assets::Sprite;
use crate::engine::material::{MaterialId, MaterialPalette};

fn check_material(palette: &MaterialPalette, id: MaterialId) -> Result<(), PresetError> {
    if palette.contains(id) {
        Ok(())
    } else {
        Err(PresetError::InvalidMaterial(id.0))
    }
}

/// One authored atom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomPreset {
    pub offset: Vec2,
    /// Offset before any rotation was baked in; defaults to `offset`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_offset: Option<Vec2>,
    /// Surface normal; defaults to the normalized offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<Vec2>,
    pub material: MaterialId,
    #[serde(default)]
    pub trail_color: u8,
    #[serde(default)]
    pub trail_length: usize,
}

impl AtomPreset {
    pub fn from_atom(atom: &Atom) -> Self {
        Self {
            offset: atom.offset(),
            original_offset: Some(atom.original_offset()),
            normal: Some(atom.normal()),
            material: atom.material(),
            trail_color: atom.trail_color(),
            trail_length: atom.trail_length(),
        }
    }

    pub fn to_atom(&self) -> Atom {
        let mut atom = Atom::new(self.offset, self.material).with_trail(self.trail_color, self.trail_length);
        if let Some(original) = self.original_offset {
            atom.set_original_offset(original);
        }
        if let Some(normal) = self.normal {
            atom.set_normal(normal);
        }
        atom
    }
}

/// Authored atom group.
///
/// Auto-generated groups only record how to generate, their atoms come from the
/// sprite at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomGroupPreset {
    pub material: MaterialId,
    #[serde(default)]
    pub auto_generate: bool,
    #[serde(default)]
    pub resolution: i32,
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub joint_offset: Vec2,
    #[serde(default)]
    pub atoms: Vec<AtomPreset>,
}

impl AtomGroupPreset {
    /// Capture a group. Generated groups keep only their generation parameters.
    pub fn from_group(group: &AtomGroup) -> Self {
        let atoms = if group.is_auto_generated() {
            Vec::new()
        } else {
            group.atoms().iter().map(AtomPreset::from_atom).collect()
        };
        Self {
            material: group.material(),
            auto_generate: group.is_auto_generated(),
            resolution: group.resolution(),
            depth: group.depth(),
            joint_offset: group.joint_offset(),
            atoms,
        }
    }

    /// Check every material against the palette
    pub fn validate(&self, palette: &MaterialPalette) -> Result<(), PresetError> {
        check_material(palette, self.material)?;
        if !self.auto_generate && self.atoms.is_empty() {
            return Err(PresetError::EmptyAtomGroup);
        }
        for atom in &self.atoms {
            check_material(palette, atom.material)?;
        }
        Ok(())
    }

    /// Build the group. Auto-generated presets need the sprite to generate from.
    pub fn build(&self, palette: &MaterialPalette, sprite: Option<&Sprite>) -> Result<AtomGroup, PresetError> {
        self.validate(palette)?;

        let mut group = match (self.auto_generate, sprite) {
            (true, Some(sprite)) => AtomGroup::generate(sprite, self.material, self.resolution, self.depth),
            (true, None) if self.atoms.is_empty() => return Err(PresetError::EmptyAtomGroup),
            _ => AtomGroup::with_atoms(self.atoms.iter().map(AtomPreset::to_atom).collect(), self.material),
        };
        group.set_joint_offset(self.joint_offset);
        debug!("Built atom group with {} atoms from preset", group.atom_count());
        Ok(group)
    }

    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PresetError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PresetError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn default_foot_collisions_segment() -> i32 {
    -1
}

/// Authored limb path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimbPathPreset {
    #[serde(default)]
    pub start_offset: Vec2,
    #[serde(default)]
    pub start_seg_count: usize,
    pub segments: Vec<Vec2>,
    /// Segments from the end on which foot collisions are disabled, -1 for never
    #[serde(default = "default_foot_collisions_segment")]
    pub end_seg_count: i32,
    pub slow_travel_speed: f32,
    pub normal_travel_speed: f32,
    pub fast_travel_speed: f32,
    pub push_force: f32,
    #[serde(default)]
    pub restart_ignore_material: MaterialId,
}

impl LimbPathPreset {
    pub fn from_path(path: &LimbPath) -> Self {
        Self {
            start_offset: path.start_offset(),
            start_seg_count: path.start_seg_count(),
            segments: path.segments().to_vec(),
            end_seg_count: path.foot_collisions_disabled_segment(),
            slow_travel_speed: path.speed_of(Speed::Slow),
            normal_travel_speed: path.speed_of(Speed::Normal),
            fast_travel_speed: path.speed_of(Speed::Fast),
            push_force: path.default_push_force(),
            restart_ignore_material: path.restart_ignore_material(),
        }
    }

    pub fn validate(&self, palette: &MaterialPalette) -> Result<(), PresetError> {
        if self.segments.is_empty() {
            return Err(PresetError::EmptyLimbPath);
        }
        check_material(palette, self.restart_ignore_material)
    }

    /// Build the path. It starts out ended, so the first push restarts it.
    pub fn build(&self, palette: &MaterialPalette) -> Result<LimbPath, PresetError> {
        self.validate(palette)?;

        let mut path = LimbPath::new()
            .with_start_offset(self.start_offset)
            .with_start_seg_count(self.start_seg_count)
            .with_foot_collisions_disabled_segment(self.end_seg_count)
            .with_speeds(self.slow_travel_speed, self.normal_travel_speed, self.fast_travel_speed)
            .with_push_force(self.push_force)
            .with_restart_ignore_material(self.restart_ignore_material);
        for segment in &self.segments {
            path.add_segment(*segment);
        }
        path.terminate();
        Ok(path)
    }

    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PresetError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PresetError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
