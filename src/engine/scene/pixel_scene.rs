// Reference terrain: a material grid with destructible pixels

use glam::{IVec2, Vec2};
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{PenetrationParams, TerrainQuery};
use crate::core::VecExt;
use crate::engine::material::{Material, MaterialId, MaterialPalette};

/// Largest side of the square searched for orphaned terrain
pub const MAX_ORPHAN_RADIUS: i32 = 11;

/// Height of the column above a knocked-out pixel that may collapse with it
pub const COMPACTING_HEIGHT: i32 = 25;

/// A pixel knocked loose from the terrain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Debris {
    pub pos: Vec2,
    pub vel: Vec2,
    pub material: MaterialId,
}

/// Material grid with optional wrapping, a background support mask and debris output.
///
/// Penetration randomness comes from a seeded `StdRng`, so two scenes built with the
/// same seed carve identically.
#[derive(Debug, Clone)]
pub struct PixelScene {
    width: i32,
    height: i32,
    wraps_x: bool,
    wraps_y: bool,
    cells: Vec<MaterialId>,
    supported: Vec<bool>,
    palette: MaterialPalette,
    debris: Vec<Debris>,
    rng: StdRng,
    lock_count: u32,
}

impl PixelScene {
    /// Create an all-air scene where every pixel has background support
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let area = (width * height) as usize;
        Self {
            width,
            height,
            wraps_x: false,
            wraps_y: false,
            cells: vec![MaterialId::AIR; area],
            supported: vec![true; area],
            palette: MaterialPalette::new(),
            debris: Vec::new(),
            rng: StdRng::seed_from_u64(0),
            lock_count: 0,
        }
    }

    /// Set toroidal wrapping per axis
    pub fn with_wrapping(mut self, wraps_x: bool, wraps_y: bool) -> Self {
        self.wraps_x = wraps_x;
        self.wraps_y = wraps_y;
        self
    }

    /// Reseed the penetration randomness
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Replace the material palette
    pub fn with_palette(mut self, palette: MaterialPalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn palette(&self) -> &MaterialPalette {
        &self.palette
    }

    /// Register a material
    pub fn add_material(&mut self, material: Material) {
        self.palette.insert(material);
    }

    /// Check if a pixel lies inside the grid, ignoring wrapping
    pub fn is_within_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    /// Wrap a point, returning None if it still lies outside the grid
    fn resolve(&self, x: i32, y: i32) -> Option<IVec2> {
        let mut point = IVec2::new(x, y);
        self.wrap_point(&mut point);
        self.is_within_bounds(point.x, point.y).then_some(point)
    }

    /// Set the material at a pixel. Out-of-range pixels are ignored.
    pub fn set_material(&mut self, x: i32, y: i32, material: MaterialId) {
        if let Some(point) = self.resolve(x, y) {
            let index = self.index(point.x, point.y);
            self.cells[index] = material;
        }
    }

    /// Fill a rectangle with a material
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, material: MaterialId) {
        for py in y..y + h {
            for px in x..x + w {
                self.set_material(px, py, material);
            }
        }
    }

    /// Mark whether a pixel has background behind it holding it in place
    pub fn set_supported(&mut self, x: i32, y: i32, supported: bool) {
        if let Some(point) = self.resolve(x, y) {
            let index = self.index(point.x, point.y);
            self.supported[index] = supported;
        }
    }

    /// Clear background support over a rectangle
    pub fn clear_support_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        for py in y..y + h {
            for px in x..x + w {
                self.set_supported(px, py, false);
            }
        }
    }

    pub fn is_supported(&self, x: i32, y: i32) -> bool {
        self.resolve(x, y)
            .map(|p| self.supported[self.index(p.x, p.y)])
            .unwrap_or(false)
    }

    /// Number of pixels of a given material
    pub fn count_material(&self, material: MaterialId) -> usize {
        self.cells.iter().filter(|&&id| id == material).count()
    }

    /// Debris knocked loose since the last `take_debris`
    pub fn debris(&self) -> &[Debris] {
        &self.debris
    }

    /// Drain the debris list
    pub fn take_debris(&mut self) -> Vec<Debris> {
        std::mem::take(&mut self.debris)
    }

    fn spawn_material(&self, id: MaterialId) -> MaterialId {
        self.palette.get(id).spawn_material.unwrap_or(id)
    }

    fn clear_pixel(&mut self, point: IVec2) {
        let index = self.index(point.x, point.y);
        self.cells[index] = MaterialId::AIR;
    }

    /// Knock a pixel out of the terrain and turn it into debris
    fn knock_loose(&mut self, point: IVec2, vel: Vec2) {
        let index = self.index(point.x, point.y);
        let id = self.cells[index];
        if id.is_air() {
            return;
        }
        self.debris.push(Debris {
            pos: point.as_vec2(),
            vel,
            material: self.spawn_material(id),
        });
        self.cells[index] = MaterialId::AIR;
    }

    fn random_between(&mut self, a: f32, b: f32) -> f32 {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if high - low <= f32::EPSILON {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    /// Collapse unsupported or scrap pixels stacked above a knocked-out pixel
    fn compact_column(&mut self, x: i32, y: i32, velocity: Vec2) {
        let spray = velocity.largest_component() * 0.1;
        let mut test_y = y - 1;
        while test_y > y - COMPACTING_HEIGHT && test_y >= 0 {
            let point = IVec2::new(x, test_y);
            let id = self.cells[self.index(x, test_y)];
            if !id.is_air() {
                let scrap = self.palette.get(id).is_scrap;
                if !scrap && self.supported[self.index(x, test_y)] {
                    break;
                }
                if self.rng.gen::<f32>() > 0.75 {
                    let vel = Vec2::new(
                        spray * self.random_between(-0.5, 0.5),
                        -spray * 0.5 - spray * self.random_between(0.0, 0.5),
                    );
                    self.knock_loose(point, vel);
                    let side = if test_y % 2 != 0 { -1 } else { 1 };
                    self.remove_orphans(x + side, test_y, 5, 25, true);
                } else {
                    self.clear_pixel(point);
                }
            }
            test_y -= 1;
        }
    }

    /// Measure the terrain island around a pixel and optionally remove it.
    ///
    /// The search covers a `radius` square centred on the pixel. Reaching its border
    /// means the island is anchored, which reports an area larger than any budget.
    pub fn remove_orphans(&mut self, x: i32, y: i32, radius: i32, max_area: i32, remove: bool) -> i32 {
        let radius = radius.min(MAX_ORPHAN_RADIUS);
        let Some(region) = self.orphan_region(IVec2::new(x, y), radius, max_area) else {
            return MAX_ORPHAN_RADIUS * MAX_ORPHAN_RADIUS + 1;
        };
        let area = region.len() as i32;
        if remove && area <= max_area {
            trace!("Removing orphaned terrain island of {} px at ({}, {})", area, x, y);
            for point in region {
                let vel = Vec2::new(-self.random_between(0.1, 0.2), -self.random_between(0.1, 0.2));
                self.knock_loose(point, vel);
            }
        }
        area
    }

    fn orphan_region(&self, center: IVec2, radius: i32, max_area: i32) -> Option<Vec<IVec2>> {
        const NEIGHBOURS: [IVec2; 8] = [
            IVec2::new(-1, -1),
            IVec2::new(0, -1),
            IVec2::new(1, -1),
            IVec2::new(-1, 0),
            IVec2::new(1, 0),
            IVec2::new(-1, 1),
            IVec2::new(0, 1),
            IVec2::new(1, 1),
        ];

        let origin = center - IVec2::splat(radius / 2);
        let side = radius.max(1) as usize;
        let mut visited = vec![false; side * side];
        let mut stack = vec![center];
        let mut region = Vec::new();

        while let Some(point) = stack.pop() {
            if !self.is_within_bounds(point.x, point.y) {
                continue;
            }
            if self.cells[self.index(point.x, point.y)].is_air() && point != center {
                continue;
            }
            let local = point - origin;
            if local.x <= 0 || local.y <= 0 || local.x >= radius - 1 || local.y >= radius - 1 {
                return None;
            }
            let slot = local.y as usize * side + local.x as usize;
            if visited[slot] {
                continue;
            }
            visited[slot] = true;
            region.push(point);
            if region.len() as i32 > max_area {
                break;
            }
            stack.extend(NEIGHBOURS.iter().map(|offset| point + *offset));
        }
        Some(region)
    }
}

impl TerrainQuery for PixelScene {
    fn material_at(&self, x: i32, y: i32) -> MaterialId {
        match self.resolve(x, y) {
            Some(point) => self.cells[self.index(point.x, point.y)],
            None => MaterialId::OUT_OF_BOUNDS,
        }
    }

    fn material(&self, id: MaterialId) -> &Material {
        self.palette.get(id)
    }

    fn wrap_point(&self, point: &mut IVec2) -> bool {
        let mut wrapped = false;
        if self.wraps_x && (point.x < 0 || point.x >= self.width) {
            point.x = point.x.rem_euclid(self.width);
            wrapped = true;
        }
        if self.wraps_y && (point.y < 0 || point.y >= self.height) {
            point.y = point.y.rem_euclid(self.height);
            wrapped = true;
        }
        wrapped
    }

    fn wrap_position(&self, pos: &mut Vec2) -> bool {
        let mut point = pos.floor_int();
        let fraction = *pos - pos.floor();
        let wrapped = self.wrap_point(&mut point);
        *pos = point.as_vec2() + fraction;
        wrapped
    }

    fn shortest_distance(&self, from: Vec2, to: Vec2) -> Vec2 {
        let mut from = from;
        let mut to = to;
        self.wrap_position(&mut from);
        self.wrap_position(&mut to);

        let mut distance = to - from;
        let (width, height) = (self.width as f32, self.height as f32);
        if self.wraps_x {
            if distance.x > width / 2.0 {
                distance.x -= width;
            } else if distance.x < -width / 2.0 {
                distance.x += width;
            }
        }
        if self.wraps_y {
            if distance.y > height / 2.0 {
                distance.y -= height;
            } else if distance.y < -height / 2.0 {
                distance.y += height;
            }
        }
        distance
    }

    fn will_penetrate(&self, x: i32, y: i32, impulse: Vec2) -> bool {
        match self.resolve(x, y) {
            Some(point) => {
                let id = self.cells[self.index(point.x, point.y)];
                impulse.length() >= self.palette.get(id).integrity
            }
            None => false,
        }
    }

    fn try_penetrate(
        &mut self,
        x: i32,
        y: i32,
        impulse: Vec2,
        velocity: Vec2,
        params: PenetrationParams,
    ) -> Option<f32> {
        let point = self.resolve(x, y)?;
        let id = self.cells[self.index(point.x, point.y)];
        if id.is_air() {
            return Some(0.0);
        }

        let (integrity, scrap) = {
            let material = self.palette.get(id);
            (material.integrity, material.is_scrap)
        };
        let impulse_mag = impulse.length();
        if impulse_mag < integrity {
            return None;
        }

        if params.num_penetrations <= 3 {
            let spray = velocity * 0.1;
            let vel = Vec2::new(
                -self.random_between(spray.x / 2.0, spray.x),
                -self.random_between(spray.y / 2.0, spray.y),
            );
            self.knock_loose(point, vel);
        } else if self.rng.gen::<f32>() <= params.air_ratio {
            self.clear_pixel(point);
        }

        let retardation = -(integrity / impulse_mag);

        if scrap || !self.supported[self.index(point.x, point.y)] {
            self.compact_column(point.x, point.y, velocity);
        }

        let orphans = params.orphans;
        if orphans.is_enabled() && self.rng.gen::<f32>() < orphans.rate {
            self.remove_orphans(point.x, point.y, orphans.radius, orphans.max_area, true);
        }

        Some(retardation)
    }

    fn deposit(&mut self, x: i32, y: i32, material: MaterialId) {
        self.set_material(x, y, material);
    }

    fn lock_scene(&mut self) {
        self.lock_count += 1;
    }

    fn unlock_scene(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    fn is_locked(&self) -> bool {
        self.lock_count > 0
    }
}
