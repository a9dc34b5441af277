// Atom group travel: one frame of rigid, rotating motion through the scene

use std::collections::BTreeMap;

use glam::Vec2;
use log::{debug, trace};

use super::atom_group::AtomGroup;
use super::body::MovableBody;
use super::hit_data::{point_velocity, HitData, HITEE, HITOR};
use super::PhysicsContext;
use crate::core::VecExt;
use crate::engine::scene::{MoId, ObjectLookup, PenetrationParams, SceneLock};

/// What an atom group's travel call did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupTravel {
    /// Seconds of the travel time left unused; zero when the last segment ran clear
    pub remaining_time: f32,
    /// Steps on which at least one atom hit something
    pub hit_count: u32,
    /// The owner crossed a wrapping scene edge
    pub did_wrap: bool,
    /// Sum of every impulse applied to the owner (kg*m/s)
    pub total_impulse: Vec2,
}

impl AtomGroup {
    /// Move the owner as a rigid, rotating body for `travel_time` seconds.
    ///
    /// The frame is cut into segments whose rotation stays under the configured
    /// limit. Every atom rasterizes its own path over a segment, and all of them step
    /// together in proportion so the body keeps its shape. The first step on which
    /// any atom hits something ends the segment: atoms that can break the terrain
    /// sink into it, the rest bounce, object hits are resolved against the other
    /// body, and the summed impulses change the owner's velocity and spin before the
    /// next segment is planned.
    ///
    /// Returns the time left over when the travel ended on a hit or a halt.
    pub fn travel(
        &mut self,
        ctx: &mut PhysicsContext,
        owner: &mut dyn MovableBody,
        travel_time: f32,
        call_on_bounce: bool,
        call_on_sink: bool,
        scene_pre_locked: bool,
    ) -> GroupTravel {
        let settings = ctx.settings;
        let objects: &mut dyn ObjectLookup = &mut *ctx.objects;
        let mut scene = SceneLock::acquire(&mut *ctx.terrain, scene_pre_locked);

        let mut report = GroupTravel::default();
        if self.atoms.is_empty() {
            debug_assert!(false, "Traveling an empty atom group");
            return report;
        }

        let ppm = settings.pixels_per_meter;
        let mpp = settings.meters_per_pixel();
        let mass = owner.mass();
        let mom_inertia = self.moment_of_inertia(mass, mpp);
        let flipped = owner.is_h_flipped();
        let hits_mos = owner.hits_mos();
        let orphans = owner.orphan_removal();
        let share = self.resolution().max(1) as f32;

        let mut position = owner.pos();
        let mut velocity = owner.vel();
        let mut rotation = owner.rotation();
        let mut ang_vel = owner.ang_vel();
        let mut time_left = travel_time;

        let mut hit_step = false;
        let mut halted = false;

        let mut hit_terr: Vec<usize> = Vec::new();
        let mut penetrating: Vec<usize> = Vec::new();
        let mut hit_mo_atoms: BTreeMap<MoId, Vec<usize>> = BTreeMap::new();
        let mut responses: Vec<usize> = Vec::new();
        let mut steps_left: Vec<i32> = vec![0; self.atoms.len()];

        loop {
            // Push out atoms stuck in terrain they are allowed to pass through
            for atom in &mut self.atoms {
                let start_off = atom.offset().x_flipped(flipped).rad_rotated(rotation);
                if atom.setup_pos(position + start_off, owner, &*scene)
                    && atom.is_ignoring_terrain()
                    && atom.normal() != Vec2::ZERO
                {
                    let radius = start_off * mpp;
                    let hit_vel = point_velocity(velocity, ang_vel, radius);
                    let impulse = (-atom.normal().x_flipped(flipped).rad_rotated(rotation)).with_magnitude(hit_vel.length());
                    velocity += impulse / mass;
                    ang_vel += radius.perpendicular().dot(impulse) / mom_inertia;
                    report.total_impulse += impulse;
                }
            }

            let mut seg_traj = velocity * time_left * ppm;
            let mut rot_delta = ang_vel * time_left;
            let seg_ratio = if rot_delta.abs() > settings.segment_rotation_limit {
                let ratio = settings.segment_rotation_limit / rot_delta.abs();
                rot_delta = settings.segment_rotation_limit.copysign(rot_delta);
                seg_traj *= ratio;
                ratio
            } else {
                1.0
            };
            let mut seg_progress = 0.0;

            if seg_traj == Vec2::ZERO && rot_delta == 0.0 {
                break;
            }

            let mut steps_on_seg = 0;
            for (atom, steps) in self.atoms.iter_mut().zip(steps_left.iter_mut()) {
                let start_off = atom.offset().x_flipped(flipped).rad_rotated(rotation);
                let arc = start_off.rad_rotated(rot_delta) - start_off;
                *steps = atom.setup_seg(position + start_off, seg_traj + arc, 1.0);
                steps_on_seg = steps_on_seg.max(*steps);
            }
            if steps_on_seg > 0 {
                for (atom, &steps) in self.atoms.iter_mut().zip(&steps_left) {
                    atom.set_step_ratio(steps as f32 / steps_on_seg as f32);
                }
            }

            hit_step = false;
            let mut step_count = 0;
            while !hit_step && step_count < steps_on_seg {
                hit_terr.clear();
                penetrating.clear();
                hit_mo_atoms.clear();
                responses.clear();
                let mut atoms_hit_mos = 0;

                for (index, atom) in self.atoms.iter_mut().enumerate() {
                    if !atom.step_forward(owner, &*scene, &*objects, &self.ignore_mo_ids) {
                        continue;
                    }
                    let terrain_hit = atom.terrain_material_hit();
                    if !terrain_hit.is_air() {
                        owner.set_hit_terrain_material(terrain_hit);
                        hit_terr.push(index);
                    }
                    if let Some(hit_id) = atom.mo_id_hit().filter(|_| hits_mos) {
                        owner.set_hit_mo_id(hit_id);
                        objects.set_hit_by(hit_id, owner.mo_id());
                        hit_mo_atoms.entry(hit_id).or_default().push(index);
                        atoms_hit_mos += 1;
                    }
                }

                if hit_terr.is_empty() && hit_mo_atoms.is_empty() {
                    step_count += 1;
                    continue;
                }

                hit_step = true;
                report.hit_count += 1;

                if step_count == 0 && steps_on_seg == 1 {
                    halted = true;
                }
                seg_progress = step_count as f32 / steps_on_seg as f32;

                position += seg_traj * seg_progress;
                report.did_wrap |= scene.wrap_position(&mut position);
                rotation += rot_delta * seg_progress;

                // Sort terrain hits into the ones that break through and the ones that bounce
                loop {
                    let mut something_penetrated = false;
                    let count = hit_terr.len() as f32 * share;
                    let mass_share = mass / count;
                    let inertia_share = mom_inertia / count;

                    let mut i = 0;
                    while i < hit_terr.len() {
                        let atom = &mut self.atoms[hit_terr[i]];
                        let radius = atom.offset().x_flipped(flipped).rad_rotated(rotation) * mpp;
                        let mut hit = HitData::new();
                        hit.hit_radius[HITOR] = radius;
                        hit.hit_vel[HITOR] = point_velocity(velocity, ang_vel, radius);
                        hit.hit_denominator = 1.0 / mass_share + radius.length_squared() / inertia_share;
                        hit.pre_impulse[HITOR] = hit.hit_vel[HITOR] / hit.hit_denominator;
                        atom.last_hit = hit;

                        let pixel = atom.current_pos().floor_int();
                        if scene.will_penetrate(pixel.x, pixel.y, hit.pre_impulse[HITOR]) {
                            penetrating.push(hit_terr.swap_remove(i));
                            something_penetrated = true;
                        } else {
                            i += 1;
                        }
                    }

                    if hit_terr.is_empty() || !something_penetrated {
                        break;
                    }
                }

                if !hit_terr.is_empty() {
                    let hit_factor = 1.0 / hit_terr.len() as f32;
                    for &index in &hit_terr {
                        let atom = &mut self.atoms[index];
                        atom.step_back(&*scene);
                        atom.last_hit.total_mass[HITOR] = mass;
                        atom.last_hit.mom_inertia[HITOR] = mom_inertia;
                        atom.last_hit.impulse_factor[HITOR] = hit_factor;
                        if call_on_bounce {
                            halted = owner.on_bounce(&atom.last_hit) || halted;
                        }
                        atom.terr_hit_response(&*scene);
                        responses.push(index);
                    }
                }

                if !penetrating.is_empty() {
                    let hit_factor = 1.0 / penetrating.len() as f32;
                    for &index in &penetrating {
                        let atom = &mut self.atoms[index];
                        let pixel = atom.current_pos().floor_int();
                        let mut hit = atom.last_hit;
                        let params = PenetrationParams::new(settings.group_sink_air_ratio, 1).with_orphans(orphans);
                        let Some(retardation) =
                            scene.try_penetrate(pixel.x, pixel.y, hit.pre_impulse[HITOR], hit.hit_vel[HITOR], params)
                        else {
                            continue;
                        };

                        hit.hit_denominator = 1.0 / mass + hit.hit_radius[HITOR].length_squared() / mom_inertia;
                        hit.pre_impulse[HITOR] = hit.hit_vel[HITOR] / hit.hit_denominator;
                        hit.total_mass[HITOR] = mass;
                        hit.mom_inertia[HITOR] = mom_inertia;
                        hit.impulse_factor[HITOR] = hit_factor;
                        hit.res_impulse[HITOR] = hit.hit_vel[HITOR] * retardation / hit.hit_denominator * hit_factor;
                        if call_on_sink {
                            halted = owner.on_sink(&hit) || halted;
                        }
                        atom.last_hit = hit;
                        responses.push(index);
                    }
                }

                if hits_mos && !hit_mo_atoms.is_empty() {
                    let hitor_factor = 1.0 / atoms_hit_mos as f32;
                    for atom_indices in hit_mo_atoms.values() {
                        let hitee_factor = 1.0 / atom_indices.len() as f32;
                        for &index in atom_indices {
                            let atom = &mut self.atoms[index];
                            atom.step_back(&*scene);

                            let radius = atom.offset().x_flipped(flipped).rad_rotated(rotation) * mpp;
                            let mut hit = HitData::new();
                            hit.total_mass[HITOR] = mass;
                            hit.mom_inertia[HITOR] = mom_inertia;
                            hit.impulse_factor = [hitor_factor, hitee_factor];
                            hit.hit_radius[HITOR] = radius;
                            hit.hit_vel[HITOR] = point_velocity(velocity, ang_vel, radius);
                            atom.last_hit = hit;

                            if !atom.mo_hit_response(owner, objects) {
                                continue;
                            }
                            let [hitor_root, hitee_root] = atom.last_hit.root_body;
                            let vetoed = owner.on_mo_hit(hitee_root)
                                || hitee_root.is_some_and(|root| objects.on_mo_hit(root, hitor_root));
                            if !vetoed {
                                responses.push(index);
                            }
                        }
                    }
                }
            }

            if hit_step {
                for &index in &responses {
                    let hit = &self.atoms[index].last_hit;
                    let impulse = hit.res_impulse[HITOR];
                    velocity += impulse / mass;
                    ang_vel += hit.hit_radius[HITOR].perpendicular().dot(impulse) / mom_inertia;
                    report.total_impulse += impulse;
                }
            } else {
                seg_progress = 1.0;
                position += seg_traj;
                report.did_wrap |= scene.wrap_position(&mut position);
                rotation += rot_delta;
            }
            time_left -= time_left * seg_progress * seg_ratio;

            trace!(
                "Group segment done: progress {:.2}, ratio {:.2}, time left {:.4}",
                seg_progress,
                seg_ratio,
                time_left
            );

            if report.hit_count > settings.group_hit_cap {
                debug!("Atom group travel gave up after {} hits", report.hit_count);
                break;
            }
            if seg_ratio == 1.0 && !(hit_step && !halted) {
                break;
            }
        }

        self.resolve_mos_intersection(owner, &*scene, objects, settings, &mut position, rotation);
        drop(scene);

        owner.set_pos(position);
        owner.set_vel(velocity);
        owner.set_rotation(rotation);
        owner.set_ang_vel(ang_vel);

        self.clear_mo_id_ignore_list();

        let ignoring = self.atoms.iter().filter(|atom| atom.is_ignoring_terrain()).count();
        if ignoring > 0 && ignoring >= self.atoms.len() / 2 {
            owner.force_deep_check();
        }

        report.remaining_time = if !hit_step && !halted { 0.0 } else { time_left };
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_SETTINGS;
    use crate::engine::material::{Material, MaterialId};
    use crate::engine::physics::{Atom, BodyBuilder, BodyState};
    use crate::engine::scene::{ObjectRegistry, PixelScene, RegisteredBody, TerrainQuery};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f32::consts::TAU;

    const STEEL: MaterialId = MaterialId(40);
    const ROCK: MaterialId = MaterialId(41);
    const DIRT: MaterialId = MaterialId(42);

    fn scene() -> PixelScene {
        let mut scene = PixelScene::new(128, 128);
        scene.add_material(Material::new(STEEL, "Steel").with_friction(0.0));
        scene.add_material(Material::new(ROCK, "Rock").with_integrity(1.0e6).with_restitution(0.0));
        scene.add_material(Material::new(DIRT, "Dirt").with_integrity(1.0));
        scene
    }

    fn bar(count: i32) -> AtomGroup {
        let atoms = (0..count)
            .map(|i| Atom::new(Vec2::new((i - count / 2) as f32, 0.0), STEEL))
            .collect();
        AtomGroup::with_atoms(atoms, STEEL)
    }

    fn ring(count: usize, radius: f32) -> AtomGroup {
        let atoms = (0..count)
            .map(|i| {
                let angle = i as f32 / count as f32 * TAU;
                Atom::new(Vec2::new(angle.cos(), angle.sin()) * radius, STEEL)
            })
            .collect();
        AtomGroup::with_atoms(atoms, STEEL)
    }

    fn travel(
        group: &mut AtomGroup,
        scene: &mut PixelScene,
        objects: &mut ObjectRegistry,
        owner: &mut BodyState,
        time: f32,
    ) -> GroupTravel {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ctx = PhysicsContext::new(scene, objects, &DEFAULT_SETTINGS, &mut rng);
        group.travel(&mut ctx, owner, time, true, true, false)
    }

    #[test]
    fn test_free_flight_with_spin() {
        let mut scene = scene();
        let mut objects = ObjectRegistry::new(128, 128);
        let mut group = ring(8, 5.0);
        let mut owner = BodyBuilder::rigid()
            .position(40.5, 40.5)
            .velocity(1.0, 0.0)
            .ang_vel(1.0)
            .build();

        let result = travel(&mut group, &mut scene, &mut objects, &mut owner, 1.0);

        assert_eq!(result.hit_count, 0);
        assert_eq!(result.remaining_time, 0.0);
        // Rotation was chunked into arcs under the limit but adds up to the full turn
        assert_relative_eq!(owner.rotation, 1.0, epsilon = 1e-4);
        assert_relative_eq!(owner.pos.x, 60.5, epsilon = 1e-3);
        assert_relative_eq!(owner.pos.y, 40.5, epsilon = 1e-4);
        assert_eq!(owner.vel, Vec2::new(1.0, 0.0));
        assert!(!scene.is_locked());
    }

    #[test]
    fn test_bar_stops_against_wall() {
        let mut scene = scene();
        scene.fill_rect(40, 0, 24, 64, ROCK);
        let mut objects = ObjectRegistry::new(128, 128);
        let mut group = bar(10);
        let mut owner = BodyBuilder::rigid().position(20.5, 20.5).velocity(10.0, 0.0).build();

        let result = travel(&mut group, &mut scene, &mut objects, &mut owner, 0.1);

        // The leading atom starts at x = 24 and meets the wall on the 16th of 20 steps
        assert_eq!(result.hit_count, 1);
        assert_eq!(owner.bounces, 1, "Only the leading atom bounced");
        assert_relative_eq!(owner.pos.x, 35.5, epsilon = 1e-4);
        assert_relative_eq!(owner.vel.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(owner.ang_vel, 0.0, epsilon = 1e-5);
        assert_relative_eq!(result.remaining_time, 0.025, epsilon = 1e-5);
        assert_eq!(scene.count_material(ROCK), 24 * 64, "The wall holds");
        assert!(result.total_impulse.x < 0.0);
    }

    #[test]
    fn test_bar_stops_against_single_pixel_wall() {
        let mut scene = scene();
        scene.fill_rect(40, 0, 1, 64, ROCK);
        let mut objects = ObjectRegistry::new(128, 128);
        let mut group = bar(10);
        let mut owner = BodyBuilder::rigid().position(20.5, 20.5).velocity(10.0, 0.0).build();
        let integrity = scene.material(ROCK).integrity;
        assert!(owner.mass * owner.vel.x * owner.sharpness < integrity);

        let result = travel(&mut group, &mut scene, &mut objects, &mut owner, 0.1);

        assert_eq!(result.hit_count, 1);
        assert_eq!(owner.bounces, 1);
        assert_relative_eq!(owner.vel.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(owner.pos.x, 35.5, epsilon = 1e-4);
        assert_eq!(scene.count_material(ROCK), 64, "The wall holds");

        // Atoms run from offset -5 to 4; only the one at the front touched the wall
        for atom in group.atoms() {
            let hit = atom.last_hit();
            if atom.offset().x == 4.0 {
                assert_eq!(hit.hit_material, [STEEL, ROCK], "Leading atom hit the wall");
                assert!(hit.res_impulse[HITOR].x < 0.0);
                assert_eq!(atom.current_pos(), Vec2::new(39.0, 20.0), "Backed off the wall pixel");
            } else {
                assert_eq!(*hit, HitData::default(), "Atom at {} stayed in open air", atom.offset().x);
            }
        }
    }

    #[test]
    fn test_sinks_through_weak_terrain() {
        let mut scene = scene();
        scene.fill_rect(0, 15, 64, 2, DIRT);
        let mut objects = ObjectRegistry::new(128, 128);
        let mut group = bar(3);
        let mut owner = BodyBuilder::rigid().position(30.5, 10.5).velocity(0.0, 10.0).mass(10.0).build();

        travel(&mut group, &mut scene, &mut objects, &mut owner, 0.05);

        assert!(owner.sinks >= 6, "Every atom sank through both rows, got {}", owner.sinks);
        assert_eq!(scene.count_material(DIRT), 128 - 6);
        assert!(owner.vel.y > 0.0 && owner.vel.y < 10.0, "Slowed but not stopped: {}", owner.vel.y);
        assert!(owner.pos.y > 17.0, "Came out the other side at {}", owner.pos.y);
    }

    #[test]
    fn test_hits_another_body() {
        let mut scene = scene();
        let mut objects = ObjectRegistry::new(128, 128);
        let other = BodyBuilder::rigid().id(MoId(9)).position(50.0, 20.0).mass(2.0).radius(4.0).build();
        objects.register(RegisteredBody::new(other, STEEL));
        objects.stamp_rect(46, 16, 8, 8, MoId(9));

        let mut group = bar(4);
        group.set_owner(Some(MoId(1)));
        let mut owner = BodyBuilder::rigid()
            .id(MoId(1))
            .position(30.5, 20.5)
            .velocity(10.0, 0.0)
            .mass(2.0)
            .radius(3.0)
            .build();

        let result = travel(&mut group, &mut scene, &mut objects, &mut owner, 0.1);

        assert!(result.hit_count >= 1);
        assert_eq!(owner.hit_mo_id, Some(MoId(9)));
        assert!(owner.vel.x < 10.0, "Owner slowed by the hit, got {}", owner.vel.x);
        let hitee = objects.get(MoId(9)).map(|b| (b.state.vel, b.hits_received)).unwrap_or_default();
        assert!(hitee.0.x > 0.0, "Hit body pushed forward");
        assert!(hitee.1 >= 1);
        assert!(group.ignored_mo_ids().is_empty(), "Frame ignores cleared after travel");
    }
}
