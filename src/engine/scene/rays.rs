// Ray casts over the terrain grid and the MOID raster

use glam::Vec2;

use super::{MoId, ObjectLookup, Team, TerrainQuery};
use crate::core::PixelLine;
use crate::engine::material::MaterialId;

/// Result of an obstacle ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObstacleRay {
    /// Nothing but passable pixels along the whole ray
    Clear { free_pos: Vec2 },
    /// Something blocks the ray. A distance of zero means the first pixel was blocked.
    Blocked {
        distance: f32,
        obstacle_pos: Vec2,
        free_pos: Vec2,
    },
}

impl ObstacleRay {
    /// Last free position found along the ray
    pub fn free_pos(&self) -> Vec2 {
        match *self {
            ObstacleRay::Clear { free_pos } => free_pos,
            ObstacleRay::Blocked { free_pos, .. } => free_pos,
        }
    }

    /// Check if the ray hit something
    pub fn is_blocked(&self) -> bool {
        matches!(self, ObstacleRay::Blocked { .. })
    }
}

/// Walk a ray, checking every `skip + 1`th pixel and always the last one
fn checked_pixels(start: Vec2, ray: Vec2, skip: u32) -> impl Iterator<Item = (bool, glam::IVec2)> {
    let mut line = PixelLine::new(start, ray);
    let mut skipped = skip;
    std::iter::from_fn(move || {
        let pixel = line.next()?;
        skipped += 1;
        let check = skipped > skip || line.is_last();
        if check {
            skipped = 0;
        }
        Some((check, pixel))
    })
}

/// First pixel along the ray made of `material`
pub fn cast_material_ray(
    terrain: &dyn TerrainQuery,
    start: Vec2,
    ray: Vec2,
    material: MaterialId,
    skip: u32,
    wrap: bool,
) -> Option<Vec2> {
    for (check, mut pixel) in checked_pixels(start, ray, skip) {
        if !check {
            continue;
        }
        if wrap {
            terrain.wrap_point(&mut pixel);
        }
        if terrain.material_at(pixel.x, pixel.y) == material {
            return Some(pixel.as_vec2());
        }
    }
    None
}

/// First pixel along the ray whose integrity is at most `strength`
pub fn cast_weakness_ray(
    terrain: &dyn TerrainQuery,
    start: Vec2,
    ray: Vec2,
    strength: f32,
    skip: u32,
    wrap: bool,
) -> Option<Vec2> {
    for (check, mut pixel) in checked_pixels(start, ray, skip) {
        if !check {
            continue;
        }
        if wrap {
            terrain.wrap_point(&mut pixel);
        }
        if terrain.material_props_at(pixel.x, pixel.y).integrity <= strength {
            return Some(pixel.as_vec2());
        }
    }
    None
}

/// Cast a ray until it meets solid terrain or a movable object.
///
/// Terrain of `ignore_material` is passable. Objects whose root is `ignore_root`, or
/// which ignore hits from `ignore_team`, are passable too.
#[allow(clippy::too_many_arguments)]
pub fn cast_obstacle_ray(
    terrain: &dyn TerrainQuery,
    objects: &dyn ObjectLookup,
    start: Vec2,
    ray: Vec2,
    ignore_root: Option<MoId>,
    ignore_team: Option<Team>,
    ignore_material: MaterialId,
    skip: u32,
) -> ObstacleRay {
    let start_fraction = start - start.floor();
    let mut free_pos = start;
    let mut steps = 0;

    for (check, mut pixel) in checked_pixels(start, ray, skip) {
        terrain.wrap_point(&mut pixel);
        if check {
            let material = terrain.material_at(pixel.x, pixel.y);
            let blocking_object = objects
                .mo_id_at(pixel.x, pixel.y)
                .and_then(|id| objects.profile(id))
                .filter(|hit| {
                    let team_ignored = ignore_team.is_some()
                        && hit.ignores_team_hits
                        && hit.team == ignore_team;
                    !team_ignored && Some(hit.root) != ignore_root
                });

            if (!material.is_air() && material != ignore_material) || blocking_object.is_some() {
                let obstacle_pos = pixel.as_vec2() + start_fraction;
                let distance = if steps == 0 {
                    0.0
                } else {
                    terrain.shortest_distance(obstacle_pos, start).length()
                };
                return ObstacleRay::Blocked {
                    distance,
                    obstacle_pos,
                    free_pos,
                };
            }
        }
        free_pos = pixel.as_vec2() + start_fraction;
        steps += 1;
    }

    ObstacleRay::Clear { free_pos }
}

/// First pixel along the ray not covered by any movable object
pub fn cast_clear_ray(
    terrain: &dyn TerrainQuery,
    objects: &dyn ObjectLookup,
    start: Vec2,
    ray: Vec2,
) -> Option<Vec2> {
    for (_, mut pixel) in checked_pixels(start, ray, 0) {
        terrain.wrap_point(&mut pixel);
        if objects.mo_id_at(pixel.x, pixel.y).is_none() {
            return Some(pixel.as_vec2());
        }
    }
    None
}
