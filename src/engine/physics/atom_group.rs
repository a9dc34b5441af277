// AtomGroup: the atom silhouette of a rotating body or limb

use std::collections::BTreeMap;

use glam::{IVec2, Vec2};
use log::{debug, trace};

use super::atom::Atom;
use super::body::MovableBody;
use super::debug::{DebugCanvas, NORMAL_COLOR};
use crate::core::{PhysicsSettings, VecExt};
use crate::engine::assets::Sprite;
use crate::engine::material::MaterialId;
use crate::engine::scene::{cast_clear_ray, cast_material_ray, cast_weakness_ray, MoId, ObjectLookup, TerrainQuery};

/// Opaque tag partitioning a group's atoms. Zero marks the owner's own atoms.
pub type SubgroupId = i64;

/// Owned list of atoms handed between groups
pub type AtomList = Vec<Atom>;

/// Resolution used when a group is generated with resolution 0
pub const DEFAULT_RESOLUTION: i32 = 4;

/// Smallest moment of inertia handed out, so responses never divide by zero
const MIN_MOM_INERTIA: f32 = 0.000_001;

/// A collection of atoms approximating one body's silhouette.
///
/// Atoms live in a single owning list. Subgroups index into that list by position
/// and are rebuilt whenever atoms are removed, so an index never outlives its atom.
#[derive(Debug, Clone)]
pub struct AtomGroup {
    pub(super) atoms: Vec<Atom>,
    subgroups: BTreeMap<SubgroupId, Vec<usize>>,
    material: MaterialId,
    auto_generate: bool,
    resolution: i32,
    depth: i32,
    owner: Option<MoId>,
    pub(super) joint_offset: Vec2,
    pub(super) limb_pos: Vec2,
    /// Moment of inertia per kilogram of owner mass; `None` until next asked for
    unit_inertia: Option<f32>,
    pub(super) ignore_mo_ids: Vec<MoId>,
}

impl AtomGroup {
    /// Group with a single atom at the owner's origin
    pub fn new(material: MaterialId) -> Self {
        Self::with_atoms(Vec::new(), material)
    }

    /// Manually authored group. An empty list still gets one atom at the origin, and
    /// the group takes its material from the first atom.
    pub fn with_atoms(atoms: AtomList, material: MaterialId) -> Self {
        let mut group = Self {
            atoms: Vec::new(),
            subgroups: BTreeMap::new(),
            material,
            auto_generate: false,
            resolution: 0,
            depth: 0,
            owner: None,
            joint_offset: Vec2::ZERO,
            limb_pos: Vec2::ZERO,
            unit_inertia: None,
            ignore_mo_ids: Vec::new(),
        };
        if atoms.is_empty() {
            group.atoms.push(Atom::new(Vec2::ZERO, material));
        } else {
            group.material = atoms[0].material();
            group.atoms = atoms;
        }
        group.rebuild_subgroups();
        group
    }

    /// Copy another group's atoms, optionally skipping everything merged in from
    /// attached parts (non-zero sub ids). The copy has no owner.
    pub fn from_reference(reference: &AtomGroup, only_owner_atoms: bool) -> Self {
        let atoms: Vec<Atom> = reference
            .atoms
            .iter()
            .filter(|atom| !only_owner_atoms || atom.sub_id() == 0)
            .map(Atom::from_reference)
            .collect();

        let mut group = Self {
            atoms,
            subgroups: BTreeMap::new(),
            material: reference.material,
            auto_generate: false,
            resolution: reference.resolution,
            depth: reference.depth,
            owner: None,
            joint_offset: reference.joint_offset,
            limb_pos: Vec2::ZERO,
            unit_inertia: None,
            ignore_mo_ids: reference.ignore_mo_ids.clone(),
        };
        if let Some(first) = reference.atoms.first() {
            group.material = first.material();
        }
        group.rebuild_subgroups();
        group
    }

    /// Generate atoms from a sprite silhouette.
    ///
    /// With `depth <= 0` atoms sit on the outer edge: every `resolution`th row is
    /// scanned from both sides, then every `resolution`th column from both ends. With
    /// `depth > 0` atoms sit `depth` pixels inside the silhouette, and only where the
    /// body is at least that thick in the other directions too. A sprite yielding no
    /// atoms gets one in its middle.
    pub fn generate(sprite: &Sprite, material: MaterialId, resolution: i32, depth: i32) -> Self {
        let mut group = Self::with_atoms(Vec::new(), material);
        group.atoms.clear();
        group.auto_generate = true;
        group.resolution = if resolution > 0 { resolution } else { DEFAULT_RESOLUTION };
        group.depth = depth;

        let (width, height) = (sprite.width(), sprite.height());
        if width > 0 && height > 0 {
            let mut marks = vec![false; (width * height) as usize];
            if depth <= 0 {
                group.scan_edges(sprite, &mut marks);
            } else {
                let step = group.resolution as usize;
                let rows: Vec<i32> = (0..height).step_by(step).collect();
                let columns: Vec<i32> = (0..width).step_by(step).collect();
                for &y in &rows {
                    group.scan_depth(sprite, &mut marks, (0..width).map(|x| IVec2::new(x, y)), IVec2::X);
                }
                for &y in &rows {
                    group.scan_depth(sprite, &mut marks, (0..width).rev().map(|x| IVec2::new(x, y)), IVec2::NEG_X);
                }
                for &x in &columns {
                    group.scan_depth(sprite, &mut marks, (0..height).map(|y| IVec2::new(x, y)), IVec2::Y);
                }
                for &x in &columns {
                    group.scan_depth(sprite, &mut marks, (0..height).rev().map(|y| IVec2::new(x, y)), IVec2::NEG_Y);
                }
            }
        }

        if group.atoms.is_empty() {
            let center = IVec2::new(width / 2, height / 2);
            group.add_atom_at(sprite, center, false);
        }

        debug!(
            "Generated {} atoms from a {}x{} sprite (resolution {}, depth {})",
            group.atoms.len(),
            width,
            height,
            group.resolution,
            group.depth
        );
        group
    }

    fn mark(sprite: &Sprite, marks: &mut [bool], pixel: IVec2) -> bool {
        let index = (pixel.y * sprite.width() + pixel.x) as usize;
        !std::mem::replace(&mut marks[index], true)
    }

    /// First solid pixel along each scan line, once per pixel
    fn scan_edges(&mut self, sprite: &Sprite, marks: &mut [bool]) {
        let (width, height) = (sprite.width(), sprite.height());
        let step = self.resolution as usize;

        let mut place_first = |group: &mut Self, mut line: Box<dyn Iterator<Item = IVec2>>| {
            if let Some(pixel) = line.find(|p| sprite.is_solid(p.x, p.y)) {
                if Self::mark(sprite, marks, pixel) {
                    group.add_atom_at(sprite, pixel, true);
                }
            }
        };

        for y in (0..height).step_by(step) {
            place_first(self, Box::new((0..width).map(move |x| IVec2::new(x, y))));
            place_first(self, Box::new((0..width).rev().map(move |x| IVec2::new(x, y))));
        }
        for x in (0..width).step_by(step) {
            place_first(self, Box::new((0..height).map(move |y| IVec2::new(x, y))));
            place_first(self, Box::new((0..height).rev().map(move |y| IVec2::new(x, y))));
        }
    }

    /// Walk one scan line, placing an atom `depth` pixels past every boundary crossing
    fn scan_depth(&mut self, sprite: &Sprite, marks: &mut [bool], line: impl Iterator<Item = IVec2>, dir: IVec2) {
        let side = IVec2::new(dir.y, dir.x);
        let mut inside = false;
        let mut depth_count = 0;

        for pixel in line {
            let solid = sprite.is_solid(pixel.x, pixel.y);
            if solid != inside {
                depth_count = 0;
                inside = !inside;
            } else if inside {
                depth_count += 1;
                if depth_count == self.depth {
                    let clear = (1..=self.depth).all(|i| {
                        let ahead = pixel + dir * i;
                        let left = pixel + side * i;
                        let right = pixel - side * i;
                        sprite.is_solid(ahead.x, ahead.y)
                            && sprite.is_solid(left.x, left.y)
                            && sprite.is_solid(right.x, right.y)
                    });
                    if clear && Self::mark(sprite, marks, pixel) {
                        self.add_atom_at(sprite, pixel, true);
                    }
                }
            }
        }
    }

    fn add_atom_at(&mut self, sprite: &Sprite, pixel: IVec2, calc_normal: bool) {
        let offset = (pixel + sprite.offset()).as_vec2();
        let mut atom = Atom::new(offset, self.material);
        if calc_normal {
            atom.calculate_normal(sprite, sprite.center());
        }
        atom.set_ignore_mo_id(self.owner);
        self.atoms.push(atom);
        self.unit_inertia = None;
    }

    fn rebuild_subgroups(&mut self) {
        self.subgroups.clear();
        for (index, atom) in self.atoms.iter().enumerate() {
            if atom.sub_id() != 0 {
                self.subgroups.entry(atom.sub_id()).or_default().push(index);
            }
        }
    }

    // Accessors

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn is_auto_generated(&self) -> bool {
        self.auto_generate
    }

    /// Every how many pixels an atom was placed; 0 for authored groups
    pub fn resolution(&self) -> i32 {
        self.resolution
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn owner(&self) -> Option<MoId> {
        self.owner
    }

    /// Hand the group to a new owner. Every atom ignores the owner's own MOID pixels.
    pub fn set_owner(&mut self, owner: Option<MoId>) {
        self.owner = owner;
        for atom in &mut self.atoms {
            atom.set_ignore_mo_id(owner);
        }
    }

    pub fn joint_offset(&self) -> Vec2 {
        self.joint_offset
    }

    pub fn set_joint_offset(&mut self, offset: Vec2) {
        self.joint_offset = offset;
    }

    /// Scene position of the limb end this group is acting as
    pub fn limb_pos(&self) -> Vec2 {
        self.limb_pos
    }

    pub fn set_limb_pos(&mut self, pos: Vec2) {
        self.limb_pos = pos;
    }

    /// Sub ids currently present, in ascending order
    pub fn subgroup_ids(&self) -> impl Iterator<Item = SubgroupId> + '_ {
        self.subgroups.keys().copied()
    }

    /// Atoms tagged with `sub_id`
    pub fn subgroup(&self, sub_id: SubgroupId) -> impl Iterator<Item = &Atom> + '_ {
        self.subgroups
            .get(&sub_id)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.atoms.get(index))
    }

    pub fn contains_subgroup(&self, sub_id: SubgroupId) -> bool {
        self.subgroups.contains_key(&sub_id)
    }

    // Group-shared ignore list

    /// Ignore an object for the rest of this frame, for every atom in the group
    pub fn add_mo_id_to_ignore(&mut self, id: MoId) {
        if !self.ignore_mo_ids.contains(&id) {
            self.ignore_mo_ids.push(id);
        }
    }

    pub fn clear_mo_id_ignore_list(&mut self) {
        self.ignore_mo_ids.clear();
    }

    pub fn is_ignoring_mo_id(&self, id: MoId) -> bool {
        self.ignore_mo_ids.contains(&id)
    }

    pub fn ignored_mo_ids(&self) -> &[MoId] {
        &self.ignore_mo_ids
    }

    // Geometry

    /// Distance from the origin to the farthest atom
    pub fn calculate_max_radius(&self) -> f32 {
        self.atoms
            .iter()
            .map(|atom| atom.offset().length())
            .fold(0.0, f32::max)
    }

    /// Moment of inertia of `mass` spread evenly over the atoms.
    ///
    /// The distribution is cached and only recomputed after atoms were added or removed.
    pub fn moment_of_inertia(&mut self, mass: f32, meters_per_pixel: f32) -> f32 {
        let unit = match self.unit_inertia {
            Some(unit) => unit,
            None => {
                let count = self.atoms.len().max(1) as f32;
                let unit = self
                    .atoms
                    .iter()
                    .map(|atom| (atom.offset().length() * meters_per_pixel).powi(2))
                    .sum::<f32>()
                    / count;
                trace!("Recomputed atom group inertia over {} atoms", self.atoms.len());
                self.unit_inertia = Some(unit);
                unit
            }
        };
        let mom_inertia = mass * unit;
        if mom_inertia == 0.0 {
            MIN_MOM_INERTIA
        } else {
            mom_inertia
        }
    }

    // Subgroups

    /// Merge copies of `atoms` under `sub_id`, placed at `offset` plus their original
    /// offset turned by `rotation`
    pub fn add_atoms(&mut self, atoms: &[Atom], sub_id: SubgroupId, offset: Vec2, rotation: f32) {
        for atom in atoms {
            let mut copy = Atom::from_reference(atom);
            copy.set_sub_id(sub_id);
            copy.set_offset(offset + copy.original_offset().rad_rotated(rotation));
            copy.set_ignore_mo_id(self.owner);
            self.subgroups.entry(sub_id).or_default().push(self.atoms.len());
            self.atoms.push(copy);
        }
        if !atoms.is_empty() {
            self.unit_inertia = None;
        }
    }

    /// Drop every atom tagged with `sub_id`. Returns true if any were removed.
    pub fn remove_atoms(&mut self, sub_id: SubgroupId) -> bool {
        let before = self.atoms.len();
        self.atoms.retain(|atom| atom.sub_id() != sub_id);
        let removed = self.atoms.len() != before;
        if removed {
            self.unit_inertia = None;
        }
        self.rebuild_subgroups();
        removed
    }

    /// Move the atoms of one subgroup to `offset` plus their original offset turned by
    /// `rotation`. Returns false if there is no such subgroup.
    pub fn update_sub_atoms(&mut self, sub_id: SubgroupId, offset: Vec2, rotation: f32) -> bool {
        let Some(indices) = self.subgroups.get(&sub_id) else {
            return false;
        };
        debug_assert!(!indices.is_empty(), "Empty atom subgroup {}", sub_id);
        for &index in indices {
            if let Some(atom) = self.atoms.get_mut(index) {
                atom.set_offset(offset + atom.original_offset().rad_rotated(rotation));
            }
        }
        self.unit_inertia = None;
        true
    }

    // Terrain queries

    /// Scene pixels the atoms occupy with the owner at `position` turned by `rotation`
    fn atom_pixels<'a>(
        &'a self,
        owner: &'a dyn MovableBody,
        position: Vec2,
        rotation: f32,
    ) -> impl Iterator<Item = IVec2> + 'a {
        let flipped = owner.is_h_flipped();
        self.atoms
            .iter()
            .map(move |atom| (position + atom.offset().x_flipped(flipped).rad_rotated(rotation)).floor_int())
    }

    /// Check if any atom sits inside terrain
    pub fn in_terrain(&self, owner: &dyn MovableBody, terrain: &dyn TerrainQuery) -> bool {
        self.atom_pixels(owner, owner.pos(), owner.rotation())
            .any(|pixel| !terrain.material_at(pixel.x, pixel.y).is_air())
    }

    /// Fraction of atoms sitting inside terrain
    pub fn ratio_in_terrain(&self, owner: &dyn MovableBody, terrain: &dyn TerrainQuery) -> f32 {
        self.ratio_in_terrain_at(owner, terrain, owner.pos(), owner.rotation())
    }

    pub(super) fn ratio_in_terrain_at(
        &self,
        owner: &dyn MovableBody,
        terrain: &dyn TerrainQuery,
        position: Vec2,
        rotation: f32,
    ) -> f32 {
        if self.atoms.is_empty() {
            return 0.0;
        }
        let buried = self
            .atom_pixels(owner, position, rotation)
            .filter(|pixel| !terrain.material_at(pixel.x, pixel.y).is_air())
            .count();
        buried as f32 / self.atoms.len() as f32
    }

    /// Exit direction for a set of embedded atoms: against their summed normals,
    /// as long as the owner is wide
    fn exit_direction<'a>(
        owner: &dyn MovableBody,
        rotation: f32,
        atoms: impl Iterator<Item = &'a Atom>,
    ) -> Option<Vec2> {
        let flipped = owner.is_h_flipped();
        let sum: Vec2 = atoms
            .map(|atom| atom.normal().x_flipped(flipped).rad_rotated(rotation))
            .sum();
        if sum == Vec2::ZERO {
            return None;
        }
        Some((-sum).with_magnitude(owner.diameter()))
    }

    /// Push `position` out of terrain stronger than `stronger_than`.
    ///
    /// Atoms in such terrain cast along the reverse of their summed normals for the
    /// first pixel weak enough to stand in. The longest of those exits moves the
    /// owner, unless it exceeds the owner's radius. Returns false when every atom is
    /// embedded, there is no exit direction, or the exit is too long. With air as
    /// the threshold no atom ever counts as embedded.
    pub fn resolve_terrain_intersection(
        &self,
        owner: &dyn MovableBody,
        terrain: &dyn TerrainQuery,
        position: &mut Vec2,
        rotation: f32,
        stronger_than: MaterialId,
    ) -> bool {
        let threshold = if stronger_than.is_air() {
            0.0
        } else {
            terrain.material(stronger_than).integrity
        };

        let pixels: Vec<IVec2> = self.atom_pixels(owner, *position, rotation).collect();
        let intersecting: Vec<usize> = pixels
            .iter()
            .enumerate()
            .filter(|(_, pixel)| {
                let id = terrain.material_at(pixel.x, pixel.y);
                !id.is_air() && threshold > 0.0 && terrain.material(id).integrity > threshold
            })
            .map(|(index, _)| index)
            .collect();

        if intersecting.is_empty() {
            return true;
        }
        if intersecting.len() >= self.atoms.len() {
            debug!("Every atom is embedded, cannot resolve terrain intersection");
            return false;
        }

        let Some(exit) = Self::exit_direction(owner, rotation, intersecting.iter().map(|&i| &self.atoms[i])) else {
            return false;
        };

        let mut total_exit = Vec2::ZERO;
        for &index in &intersecting {
            let atom_pos = (*position + self.atoms[index].offset().x_flipped(owner.is_h_flipped()).rad_rotated(rotation))
                .floored();
            let clear = if threshold <= 0.0 {
                cast_material_ray(terrain, atom_pos, exit, MaterialId::AIR, 0, false)
            } else {
                cast_weakness_ray(terrain, atom_pos, exit, threshold, 0, false)
            };
            if let Some(clear_pos) = clear {
                let atom_exit = clear_pos - atom_pos;
                if atom_exit.length() > total_exit.length() {
                    total_exit = atom_exit;
                }
            }
        }

        if total_exit.length() > owner.radius() {
            debug!("Terrain exit of {:.1}px is too far for radius {:.1}", total_exit.length(), owner.radius());
            return false;
        }
        *position += total_exit;
        true
    }

    /// Separate the owner from the first other body its atoms overlap.
    ///
    /// Both bodies report the hit first and either may veto it. The exit is found
    /// along the reverse of the overlapping atoms' summed normals and is shared
    /// between the two bodies by inverse mass, unless the other body is pinned or
    /// much heavier. Either body left mostly buried in terrain is squished.
    ///
    /// Returns true right away for owners that do not hit objects. Otherwise returns
    /// whether no atoms overlapped the other body.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_mos_intersection(
        &self,
        owner: &mut dyn MovableBody,
        terrain: &dyn TerrainQuery,
        objects: &mut dyn ObjectLookup,
        settings: &PhysicsSettings,
        position: &mut Vec2,
        rotation: f32,
    ) -> bool {
        if !owner.hits_mos() {
            return true;
        }

        let pixels: Vec<IVec2> = self.atom_pixels(&*owner, *position, rotation).collect();

        let mut intersected = None;
        for (atom, pixel) in self.atoms.iter().zip(&pixels) {
            let Some(hit_id) = objects.mo_id_at(pixel.x, pixel.y) else {
                continue;
            };
            if atom.is_ignoring_mo_id(hit_id, &*owner, &*objects, &self.ignore_mo_ids) {
                continue;
            }
            let root = objects
                .profile(hit_id)
                .and_then(|profile| objects.profile(profile.root));
            if let Some(root) = root.filter(|root| root.gets_hit_by_mos) {
                intersected = Some((hit_id, root));
                break;
            }
        }
        let Some((hit_id, other)) = intersected else {
            return false;
        };

        if owner.on_mo_hit(Some(other.id)) {
            return false;
        }
        if objects.on_mo_hit(other.id, owner.root_id()) {
            return false;
        }

        let intersecting: Vec<usize> = pixels
            .iter()
            .enumerate()
            .filter(|(_, pixel)| objects.mo_id_at(pixel.x, pixel.y) == Some(hit_id))
            .map(|(index, _)| index)
            .collect();

        let Some(exit) = Self::exit_direction(&*owner, rotation, intersecting.iter().map(|&i| &self.atoms[i])) else {
            return false;
        };

        let mut total_exit = Vec2::ZERO;
        for &index in &intersecting {
            let atom_pos = pixels[index].as_vec2();
            if let Some(clear_pos) = cast_clear_ray(terrain, &*objects, atom_pos, exit) {
                let atom_exit = clear_pos - atom_pos;
                if atom_exit.length() > total_exit.length() {
                    total_exit = atom_exit;
                }
            }
        }

        let mut this_exit = total_exit;
        let mut other_exit = Vec2::ZERO;
        if other.pin_strength <= 0.0 {
            let inv_a = 1.0 / owner.mass();
            let inv_b = 1.0 / other.mass;
            let norm_a = inv_a / (inv_a + inv_b);
            let norm_b = inv_b / (inv_a + inv_b);
            if norm_b >= settings.mos_exit_mass_ratio {
                this_exit = total_exit * norm_a;
                other_exit = -total_exit * norm_b;
            }
        }

        if this_exit.length() < owner.radius() {
            *position += this_exit;
        }
        if other_exit != Vec2::ZERO && other_exit.length() < other.radius {
            objects.translate(other.id, other_exit);
        }

        if owner.can_be_squished()
            && self.ratio_in_terrain_at(&*owner, terrain, *position, rotation) > settings.squish_ratio
        {
            debug!("Squished between {:?} and terrain", other.id);
            *position -= this_exit;
            owner.gib(-total_exit);
        }
        if objects.squish_if_buried(other.id, total_exit, terrain) && other_exit != Vec2::ZERO {
            objects.translate(other.id, -other_exit);
        }

        intersecting.is_empty()
    }

    // Debug drawing

    /// Plot every atom, and its normal where it has one.
    ///
    /// Atoms are placed around the owner, or around the limb position when
    /// `use_limb_pos` is set.
    pub fn draw_debug(&self, canvas: &mut DebugCanvas, owner: &dyn MovableBody, use_limb_pos: bool, color: u8) {
        let origin = if use_limb_pos { self.limb_pos } else { owner.pos() };
        for atom in &self.atoms {
            let atom_pos = origin + owner.rotate_offset(atom.offset());
            if atom.normal() != Vec2::ZERO {
                let normal = owner.rotate_offset(atom.normal()) * 5.0;
                canvas.draw_line(atom_pos, atom_pos + normal, NORMAL_COLOR);
            }
            canvas.draw_point(atom_pos, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_SETTINGS;
    use crate::engine::material::Material;
    use crate::engine::physics::BodyBuilder;
    use crate::engine::scene::{ObjectRegistry, PixelScene, RegisteredBody};
    use approx::assert_relative_eq;
    use std::f32::consts::TAU;

    const STEEL: MaterialId = MaterialId(30);
    const ROCK: MaterialId = MaterialId(31);
    const SOIL: MaterialId = MaterialId(32);

    fn ring(count: usize, radius: f32) -> AtomList {
        (0..count)
            .map(|i| {
                let angle = i as f32 / count as f32 * TAU;
                Atom::new(Vec2::new(angle.cos(), angle.sin()) * radius, STEEL)
            })
            .collect()
    }

    fn square_sprite(size: u32) -> Sprite {
        Sprite::from_fn(size, size, |_, _| 1)
    }

    #[test]
    fn test_empty_group_gets_origin_atom() {
        let group = AtomGroup::new(STEEL);
        assert_eq!(group.atom_count(), 1);
        assert_eq!(group.atoms()[0].offset(), Vec2::ZERO);
        assert_eq!(group.resolution(), 0, "Authored groups have no resolution");
    }

    #[test]
    fn test_material_comes_from_first_atom() {
        let group = AtomGroup::with_atoms(vec![Atom::new(Vec2::X, ROCK)], STEEL);
        assert_eq!(group.material(), ROCK);
    }

    #[test]
    fn test_ring_moment_of_inertia() {
        // 8 atoms at 20px = 1m, 1kg each
        let mut group = AtomGroup::with_atoms(ring(8, 20.0), STEEL);
        let mpp = DEFAULT_SETTINGS.meters_per_pixel();
        assert_relative_eq!(group.moment_of_inertia(8.0, mpp), 8.0 * 1.0 * 1.0, max_relative = 1e-4);
        assert_relative_eq!(group.calculate_max_radius(), 20.0, max_relative = 1e-5);
    }

    #[test]
    fn test_subgroup_changes_invalidate_inertia() {
        let mpp = DEFAULT_SETTINGS.meters_per_pixel();
        let mut group = AtomGroup::with_atoms(ring(4, 20.0), STEEL);
        let before = group.moment_of_inertia(4.0, mpp);
        assert_relative_eq!(before, 4.0, max_relative = 1e-4);

        // Four more atoms at 2m: mean r^2 becomes (4*1 + 4*4) / 8 = 2.5
        group.add_atoms(&ring(4, 40.0), 7, Vec2::ZERO, 0.0);
        assert_eq!(group.atom_count(), 8);
        assert_relative_eq!(group.moment_of_inertia(4.0, mpp), 10.0, max_relative = 1e-4);

        assert!(group.remove_atoms(7));
        assert!(!group.remove_atoms(7), "Nothing left under that id");
        assert_relative_eq!(group.moment_of_inertia(4.0, mpp), before, max_relative = 1e-4);
    }

    #[test]
    fn test_zero_radius_inertia_is_not_zero() {
        let mut group = AtomGroup::new(STEEL);
        assert!(group.moment_of_inertia(5.0, 0.05) > 0.0);
    }

    #[test]
    fn test_add_and_update_sub_atoms() {
        let mut group = AtomGroup::new(STEEL);
        let part = vec![Atom::new(Vec2::new(2.0, 0.0), ROCK)];
        group.add_atoms(&part, 3, Vec2::new(10.0, 0.0), 0.0);

        let placed: Vec<Vec2> = group.subgroup(3).map(Atom::offset).collect();
        assert_eq!(placed, vec![Vec2::new(12.0, 0.0)]);
        assert_eq!(group.subgroup(3).next().map(Atom::sub_id), Some(3));

        assert!(group.update_sub_atoms(3, Vec2::new(0.0, 5.0), std::f32::consts::PI));
        let moved = group.subgroup(3).next().map(Atom::offset).unwrap_or_default();
        assert_relative_eq!(moved.x, -2.0, epsilon = 1e-4);
        assert_relative_eq!(moved.y, 5.0, epsilon = 1e-4);
        assert_eq!(group.atoms()[0].offset(), Vec2::ZERO, "Owner atoms stay put");

        assert!(!group.update_sub_atoms(9, Vec2::ZERO, 0.0));
    }

    #[test]
    fn test_from_reference_only_owner_atoms() {
        let mut source = AtomGroup::with_atoms(ring(4, 5.0), STEEL);
        source.add_atoms(&ring(2, 3.0), 11, Vec2::ZERO, 0.0);
        source.add_mo_id_to_ignore(MoId(6));

        let all = AtomGroup::from_reference(&source, false);
        assert_eq!(all.atom_count(), 6);
        assert!(all.contains_subgroup(11));
        assert!(all.is_ignoring_mo_id(MoId(6)));

        let own = AtomGroup::from_reference(&source, true);
        assert_eq!(own.atom_count(), 4);
        assert!(!own.contains_subgroup(11));
        assert_eq!(own.owner(), None);
    }

    #[test]
    fn test_generate_edge_atoms() {
        // Solid 8x8 block: rows and columns 0 and 4 hit both edges
        let sprite = square_sprite(8);
        let group = AtomGroup::generate(&sprite, STEEL, 4, 0);
        assert!(group.is_auto_generated());
        assert_eq!(group.resolution(), 4);

        let offsets: Vec<Vec2> = group.atoms().iter().map(Atom::offset).collect();
        // Row 0: (0,0) and (7,0). Row 4: (0,4), (7,4). Column 0 hits (0,0) again and
        // (0,7). Column 4: (4,0), (4,7).
        assert_eq!(offsets.len(), 7, "Got {:?}", offsets);
        assert!(offsets.contains(&Vec2::new(-4.0, -4.0)));
        assert!(offsets.contains(&Vec2::new(3.0, 0.0)));
        assert!(offsets.contains(&Vec2::new(0.0, 3.0)));

        let corner = group.atoms().iter().find(|a| a.offset() == Vec2::new(-4.0, -4.0));
        let normal = corner.map(Atom::normal).unwrap_or_default();
        assert!(normal.x < 0.0 && normal.y < 0.0, "Corner normal points out, got {:?}", normal);
    }

    #[test]
    fn test_generate_depth_atoms() {
        let sprite = square_sprite(12);
        let group = AtomGroup::generate(&sprite, STEEL, 4, 2);
        assert!(group.atom_count() > 0);
        for atom in group.atoms() {
            let pixel = atom.offset() + sprite.center();
            assert!(pixel.x >= 2.0 && pixel.x <= 9.0, "Atom at {:?} is too near the edge", pixel);
        }
    }

    #[test]
    fn test_generate_empty_sprite_falls_back() {
        let sprite = Sprite::from_fn(6, 4, |_, _| 0);
        let group = AtomGroup::generate(&sprite, STEEL, 0, 0);
        assert_eq!(group.resolution(), DEFAULT_RESOLUTION);
        assert_eq!(group.atom_count(), 1);
        assert_eq!(group.atoms()[0].offset(), Vec2::ZERO);
    }

    fn scene() -> PixelScene {
        let mut scene = PixelScene::new(64, 64);
        scene.add_material(Material::new(ROCK, "Rock").with_integrity(500.0));
        scene.add_material(Material::new(SOIL, "Soil").with_integrity(10.0));
        scene
    }

    fn bar(count: i32) -> AtomGroup {
        let atoms = (0..count)
            .map(|i| {
                let mut atom = Atom::new(Vec2::new(i as f32 - (count / 2) as f32, 0.0), STEEL);
                atom.set_normal(Vec2::new(0.0, 1.0));
                atom
            })
            .collect();
        AtomGroup::with_atoms(atoms, STEEL)
    }

    #[test]
    fn test_ratio_in_terrain() {
        let mut scene = scene();
        scene.fill_rect(30, 20, 10, 1, ROCK);
        let group = bar(10);
        let owner = BodyBuilder::rigid().position(30.5, 20.5).build();
        // Offsets -5..=4 put atoms on x = 25..=34, half of them in the rock
        assert_relative_eq!(group.ratio_in_terrain(&owner, &scene), 0.5);
        assert!(group.in_terrain(&owner, &scene));

        let clear = BodyBuilder::rigid().position(30.5, 10.5).build();
        assert!(!group.in_terrain(&clear, &scene));
    }

    #[test]
    fn test_resolve_terrain_intersection_lifts_out() {
        // A bar with downward normals, its right half dipped one pixel into rock
        let mut scene = scene();
        scene.fill_rect(30, 20, 10, 10, ROCK);
        let group = bar(10);
        let owner = BodyBuilder::rigid().position(30.5, 20.5).radius(6.0).build();

        let mut position = owner.pos;
        assert!(group.resolve_terrain_intersection(&owner, &scene, &mut position, 0.0, SOIL));
        assert_eq!(position, Vec2::new(30.5, 19.5), "Moved up one pixel");

        let mut untouched = owner.pos;
        assert!(
            group.resolve_terrain_intersection(&owner, &scene, &mut untouched, 0.0, MaterialId::AIR),
            "Air threshold never counts atoms as embedded"
        );
        assert_eq!(untouched, owner.pos);
    }

    #[test]
    fn test_resolve_terrain_fully_embedded_fails() {
        let mut scene = scene();
        scene.fill_rect(0, 0, 64, 64, ROCK);
        let group = bar(4);
        let owner = BodyBuilder::rigid().position(30.5, 20.5).radius(6.0).build();
        let mut position = owner.pos;
        assert!(!group.resolve_terrain_intersection(&owner, &scene, &mut position, 0.0, SOIL));
        assert_eq!(position, owner.pos);
    }

    #[test]
    fn test_resolve_mos_intersection_shares_exit() {
        let scene = scene();
        let mut objects = ObjectRegistry::new(64, 64);
        let other = BodyBuilder::rigid().id(MoId(2)).position(30.0, 24.0).mass(1.0).radius(10.0).build();
        objects.register(RegisteredBody::new(other, ROCK));
        objects.stamp_rect(20, 20, 20, 8, MoId(2));

        let group = bar(6);
        let mut owner = BodyBuilder::rigid().id(MoId(1)).position(30.5, 20.5).mass(1.0).radius(8.0).build();
        let mut position = owner.pos;
        let clear = group.resolve_mos_intersection(
            &mut owner,
            &scene,
            &mut objects,
            &DEFAULT_SETTINGS,
            &mut position,
            0.0,
        );

        assert!(!clear, "Atoms were overlapping the other body");
        assert_eq!(owner.mo_hits, 1);
        // The first free pixel is one above the raster; equal masses split the exit
        assert_relative_eq!(position.y, 20.0, epsilon = 1e-4);
        let moved = objects.get(MoId(2)).map(|b| b.state.pos).unwrap_or_default();
        assert_relative_eq!(moved.y, 24.5, epsilon = 1e-4);
    }

    #[test]
    fn test_resolve_mos_respects_veto() {
        let scene = scene();
        let mut objects = ObjectRegistry::new(64, 64);
        let other = BodyBuilder::rigid().id(MoId(2)).position(30.0, 24.0).build();
        objects.register(RegisteredBody::new(other, ROCK).vetoing_hits());
        objects.stamp_rect(20, 20, 20, 8, MoId(2));

        let group = bar(6);
        let mut owner = BodyBuilder::rigid().id(MoId(1)).position(30.5, 20.5).radius(8.0).build();
        let mut position = owner.pos;
        assert!(!group.resolve_mos_intersection(
            &mut owner,
            &scene,
            &mut objects,
            &DEFAULT_SETTINGS,
            &mut position,
            0.0
        ));
        assert_eq!(position, owner.pos, "Vetoed hits are not separated");
    }

    #[test]
    fn test_draw_debug_plots_atoms() {
        let group = bar(4);
        let owner = BodyBuilder::rigid().position(10.5, 10.5).build();
        let mut canvas = DebugCanvas::new(32, 32);
        group.draw_debug(&mut canvas, &owner, false, 15);
        for x in 8..12 {
            assert_eq!(canvas.pixel(x, 10), Some(15));
        }
        assert_eq!(canvas.pixel(8, 15), Some(NORMAL_COLOR), "Normal drawn five pixels down");
    }
}
