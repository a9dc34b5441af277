// Terrain and atom materials

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Numeric material identifier, as stored in the terrain material grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u8);

impl MaterialId {
    /// Empty space. Never collides.
    pub const AIR: MaterialId = MaterialId(0);
    /// Returned for pixels outside a non-wrapping scene
    pub const OUT_OF_BOUNDS: MaterialId = MaterialId(1);

    /// Check if this is the air sentinel
    #[inline]
    pub fn is_air(self) -> bool {
        self == Self::AIR
    }
}

/// Physical properties of a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Identifier used in the terrain grid
    pub id: MaterialId,
    /// Display name
    pub name: String,
    /// Mass density, used for debris pixels knocked out of terrain
    pub density: f32,
    /// Impulse magnitude needed to knock a pixel of this material loose
    pub integrity: f32,
    /// Bounciness, 0 = dead stop, 1 = perfectly elastic
    pub restitution: f32,
    /// Surface friction, 0 = frictionless
    pub friction: f32,
    /// Draw/settle priority
    pub priority: i32,
    /// Chance (0..1) that a bouncing atom of this material adheres instead
    pub stickiness: f32,
    /// Scrap pieces never support the column above them
    pub is_scrap: bool,
    /// Material that debris knocked out of this one becomes
    pub spawn_material: Option<MaterialId>,
}

impl Material {
    /// Create a material with neutral properties
    pub fn new(id: MaterialId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            density: 1.0,
            integrity: 100.0,
            restitution: 0.5,
            friction: 0.5,
            priority: 0,
            stickiness: 0.0,
            is_scrap: false,
            spawn_material: None,
        }
    }

    /// Set the density
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Set the penetration resistance
    pub fn with_integrity(mut self, integrity: f32) -> Self {
        self.integrity = integrity;
        self
    }

    /// Set the restitution
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the friction
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Set the stickiness
    pub fn with_stickiness(mut self, stickiness: f32) -> Self {
        self.stickiness = stickiness;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark as scrap
    pub fn scrap(mut self) -> Self {
        self.is_scrap = true;
        self
    }
}

/// Lookup table from material id to material.
///
/// Air and out-of-bounds are always present. Unknown ids resolve to out-of-bounds so
/// that a lookup never fails.
#[derive(Debug, Clone)]
pub struct MaterialPalette {
    materials: HashMap<MaterialId, Material>,
    name_to_id: HashMap<String, MaterialId>,
    out_of_bounds: Material,
}

impl MaterialPalette {
    /// Create a palette containing only the reserved materials
    pub fn new() -> Self {
        let out_of_bounds = Material::new(MaterialId::OUT_OF_BOUNDS, "Out of Bounds")
            .with_integrity(f32::INFINITY)
            .with_restitution(0.5)
            .with_friction(0.5);
        let mut palette = Self {
            materials: HashMap::new(),
            name_to_id: HashMap::new(),
            out_of_bounds: out_of_bounds.clone(),
        };
        palette.insert(
            Material::new(MaterialId::AIR, "Air")
                .with_density(0.0)
                .with_integrity(0.0)
                .with_restitution(0.0)
                .with_friction(0.0),
        );
        palette.insert(out_of_bounds);
        palette
    }

    /// Add or replace a material
    pub fn insert(&mut self, material: Material) {
        if material.id == MaterialId::OUT_OF_BOUNDS {
            self.out_of_bounds = material.clone();
        }
        self.name_to_id.insert(material.name.clone(), material.id);
        self.materials.insert(material.id, material);
    }

    /// Get a material by id, falling back to out-of-bounds
    pub fn get(&self, id: MaterialId) -> &Material {
        self.materials.get(&id).unwrap_or(&self.out_of_bounds)
    }

    /// Check whether a material id is registered
    pub fn contains(&self, id: MaterialId) -> bool {
        self.materials.contains_key(&id)
    }

    /// Find a material id by name
    pub fn id_by_name(&self, name: &str) -> Option<MaterialId> {
        self.name_to_id.get(name).copied()
    }

    /// Number of registered materials, reserved ones included
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// A palette is never empty
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialPalette {
    fn default() -> Self {
        Self::new()
    }
}
