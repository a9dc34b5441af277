// Push travel: non-rotating motion that shoves against the scene with a capped force

use std::collections::{BTreeMap, BTreeSet};

use glam::{IVec2, Vec2};
use log::trace;

use super::atom_group::AtomGroup;
use super::body::MovableBody;
use super::hit_data::{HitData, HITEE, HITOR};
use super::limb_path::LimbPath;
use super::PhysicsContext;
use crate::core::{VecExt, X, Y};
use crate::engine::material::MaterialId;
use crate::engine::scene::{MoId, ObjectLookup, PenetrationParams, SceneLock};

/// What a push travel call did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PushTravel {
    /// Net impulse (kg*m/s) the scene pushed back with
    pub impulse: Vec2,
    /// Legs that ended on a hit
    pub hit_count: u32,
    /// The position crossed a wrapping scene edge
    pub did_wrap: bool,
}

/// Outcome of driving a limb along its path for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimbPush {
    /// False when the path had to restart and no free spot was found
    pub pushed: bool,
    /// The path ended and was restarted this frame
    pub restarted: bool,
    /// Impulse handed to the owner
    pub impulse: Vec2,
}

/// Pixel that tells which axis a hit came from: the hit pixel's coordinate on
/// `axis`, the backed-up pixel's on the other
fn axis_probe(axis: usize, hit: IVec2, backed: IVec2) -> IVec2 {
    if axis == X {
        IVec2::new(hit.x, backed.y)
    } else {
        IVec2::new(backed.x, hit.y)
    }
}

impl AtomGroup {
    /// Move `position` along `velocity` for `travel_time` seconds without rotating.
    ///
    /// The group is stepped pixel by pixel in straight legs. When any atom meets
    /// terrain or, if the owner hits objects, another body, the leg ends there. The
    /// reaction is computed from the velocity capped to what `push_force` can
    /// deliver in the remaining time, so a weak push cannot shove hard. Terrain the
    /// push can break is sunk into, the rest bounces the group, and the next leg
    /// starts from the new velocity.
    ///
    /// Atoms that start out on top of another body ignore that body for the
    /// whole call.
    #[allow(clippy::too_many_arguments)]
    pub fn push_travel(
        &self,
        ctx: &mut PhysicsContext,
        owner: &dyn MovableBody,
        position: &mut Vec2,
        velocity: Vec2,
        push_force: f32,
        travel_time: f32,
        scene_pre_locked: bool,
    ) -> PushTravel {
        let settings = ctx.settings;
        let objects: &mut dyn ObjectLookup = &mut *ctx.objects;
        let mut scene = SceneLock::acquire(&mut *ctx.terrain, scene_pre_locked);

        let mut report = PushTravel::default();
        if self.atoms.is_empty() {
            debug_assert!(false, "Push traveling an empty atom group");
            return report;
        }

        let ppm = settings.pixels_per_meter;
        let mpp = settings.meters_per_pixel();
        let mass = owner.mass();
        let hits_mos = owner.hits_mos();
        let share = self.resolution().max(1) as f32;
        let offsets: Vec<Vec2> = self
            .atoms
            .iter()
            .map(|atom| atom.offset().x_flipped(owner.is_h_flipped()))
            .collect();
        let pixel_offsets: Vec<IVec2> = offsets.iter().map(|offset| offset.floor_int()).collect();

        let mut velocity = velocity;
        let mut time_left = travel_time;
        let mut trajectory = velocity * travel_time * ppm;
        let mut hit: [bool; 2];

        let mut start_overlaps: BTreeSet<(MoId, usize)> = BTreeSet::new();
        if hits_mos {
            let int_pos = position.floor_int();
            for (index, offset) in pixel_offsets.iter().enumerate() {
                let pixel = int_pos + *offset;
                if let Some(id) = objects.mo_id_at(pixel.x, pixel.y) {
                    start_overlaps.insert((id, index));
                }
            }
        }

        loop {
            let mut int_pos = position.floor_int();
            let prev_traj_mag = trajectory.length();
            trajectory = velocity * time_left * ppm;

            let mut delta = (*position + trajectory).floor_int() - int_pos;
            hit = [false; 2];
            if delta == IVec2::ZERO {
                break;
            }

            let increment = IVec2::new(
                if delta.x < 0 { -1 } else { 1 },
                if delta.y < 0 { -1 } else { 1 },
            );
            delta = delta.abs();
            let delta2 = delta * 2;
            let (dom, sub) = if delta.x > delta.y { (X, Y) } else { (Y, X) };
            let mut error = delta2[sub] - delta[dom];
            delta = delta.min(IVec2::splat(settings.push_delta_cap));

            let mut impulses: Vec<Vec2> = Vec::new();
            let mut sub_steps = 0;
            let mut sub_stepped = false;

            for dom_steps in 0..delta[dom] {
                if sub_stepped {
                    sub_steps += 1;
                }
                sub_stepped = false;

                int_pos[dom] += increment[dom];
                if error >= 0 {
                    int_pos[sub] += increment[sub];
                    sub_stepped = true;
                    error -= delta2[dom];
                }
                error += delta2[sub];

                report.did_wrap |= scene.wrap_point(&mut int_pos);

                // Object hits take precedence; once one atom hits a body, terrain is
                // left for the next leg
                let mut hit_mo_atoms: BTreeMap<MoId, Vec<usize>> = BTreeMap::new();
                let mut hit_terr: Vec<usize> = Vec::new();
                let mut atoms_hit_mos = 0;
                for (index, offset) in pixel_offsets.iter().enumerate() {
                    let pixel = int_pos + *offset;
                    let mo_hit = if hits_mos {
                        objects.mo_id_at(pixel.x, pixel.y).filter(|&id| {
                            !start_overlaps.contains(&(id, index))
                                && !self.atoms[index].is_ignoring_mo_id(id, owner, &*objects, &self.ignore_mo_ids)
                        })
                    } else {
                        None
                    };

                    if let Some(id) = mo_hit {
                        hit_mo_atoms.entry(id).or_default().push(index);
                        atoms_hit_mos += 1;
                    } else if atoms_hit_mos == 0 && !scene.material_at(pixel.x, pixel.y).is_air() {
                        hit_terr.push(index);
                    }
                }

                if hit_terr.is_empty() && hit_mo_atoms.is_empty() {
                    continue;
                }

                let hit_pos = int_pos;
                report.hit_count += 1;

                let mut leg_progress = Vec2::ZERO;
                leg_progress[dom] = (dom_steps * increment[dom]) as f32;
                leg_progress[sub] = (sub_steps * increment[sub]) as f32;
                time_left *= (trajectory.length() - leg_progress.length()) / prev_traj_mag;

                // a = F / m
                let force_vel = velocity.cap_magnitude(push_force * time_left / mass);

                if !hit_mo_atoms.is_empty() {
                    int_pos[dom] -= increment[dom];
                    if sub_stepped {
                        int_pos[sub] -= increment[sub];
                    }
                    report.did_wrap = !scene.wrap_point(&mut int_pos) && report.did_wrap;

                    let mut hit_data = HitData::new();
                    hit_data.body[HITOR] = owner.mo_id();
                    hit_data.root_body[HITOR] = owner.root_id();
                    hit_data.hit_material[HITOR] = self.material();
                    hit_data.total_mass[HITOR] = mass;
                    hit_data.mom_inertia[HITOR] = 1.0;
                    hit_data.impulse_factor[HITOR] = 1.0 / atoms_hit_mos as f32;
                    hit_data.hit_vel[HITOR] = force_vel;

                    for indices in hit_mo_atoms.values() {
                        hit_data.impulse_factor[HITEE] = 1.0 / indices.len() as f32;

                        for &index in indices {
                            let atom_backed = int_pos + pixel_offsets[index];
                            let atom_hit = hit_pos + pixel_offsets[index];
                            hit_data.hit_radius[HITOR] = offsets[index] * mpp;
                            hit_data.hit_point = Vec2::ZERO;
                            hit_data.bitmap_normal = Vec2::ZERO;

                            let dom_probe = axis_probe(dom, atom_hit, atom_backed);
                            if delta[dom] != 0 && objects.mo_id_at(dom_probe.x, dom_probe.y).is_some() {
                                hit[dom] = true;
                                hit_data.hit_point = dom_probe.as_vec2();
                                hit_data.bitmap_normal[dom] = -increment[dom] as f32;
                            }

                            let sub_probe = axis_probe(sub, atom_hit, atom_backed);
                            if sub_stepped && delta[sub] != 0 && objects.mo_id_at(sub_probe.x, sub_probe.y).is_some() {
                                hit[sub] = true;
                                hit_data.hit_point = sub_probe.as_vec2();
                                hit_data.bitmap_normal[sub] = -increment[sub] as f32;
                            }

                            // Straight onto a corner
                            if !hit[dom] && !hit[sub] {
                                hit = [true; 2];
                                hit_data.hit_point = atom_hit.as_vec2();
                                hit_data.bitmap_normal = -increment.as_vec2();
                            }
                            hit_data.bitmap_normal = hit_data.bitmap_normal.normalize_or_zero();

                            let hit_pixel = hit_data.hit_point.floor_int();
                            if let Some(hitee) = objects.mo_id_at(hit_pixel.x, hit_pixel.y) {
                                hit_data.body[HITEE] = Some(hitee);
                                hit_data.root_body[HITEE] = objects.profile(hitee).map(|profile| profile.root);
                                if objects.collide_at_point(hitee, &mut hit_data) {
                                    impulses.push(hit_data.res_impulse[HITOR]);
                                }
                            }
                        }
                    }
                    trace!("Push leg hit {} bodies", hit_mo_atoms.len());
                    hit_terr.clear();
                }

                // Move atoms that can break their pixel with all the mass behind them
                // over to the penetrating set, until the rest all resist
                let mut penetrating: Vec<usize> = Vec::new();
                while !hit_terr.is_empty() {
                    let mass_dist = mass / (hit_terr.len() as f32 * share);
                    let before = hit_terr.len();
                    hit_terr.retain(|&index| {
                        let pixel = int_pos + pixel_offsets[index];
                        if scene.will_penetrate(pixel.x, pixel.y, force_vel * mass_dist) {
                            penetrating.push(index);
                            false
                        } else {
                            true
                        }
                    });
                    if hit_terr.len() == before {
                        break;
                    }
                }

                if !hit_terr.is_empty() {
                    int_pos[dom] -= increment[dom];
                    if sub_stepped {
                        int_pos[sub] -= increment[sub];
                    }
                    report.did_wrap = !scene.wrap_point(&mut int_pos) && report.did_wrap;

                    let mass_dist = mass / (hit_terr.len() as f32 * share);
                    let mut dom_material = MaterialId::AIR;
                    let mut sub_material = MaterialId::AIR;

                    for &index in &hit_terr {
                        let atom_backed = int_pos + pixel_offsets[index];
                        let atom_hit = hit_pos + pixel_offsets[index];
                        let (atom_restitution, atom_friction) = {
                            let material = scene.material(self.atoms[index].material());
                            (material.restitution, material.friction)
                        };
                        let hit_material = scene.material_at(atom_hit.x, atom_hit.y);
                        let mut new_vel = force_vel;

                        let dom_probe = axis_probe(dom, atom_hit, atom_backed);
                        let dom_hit_material = scene.material_at(dom_probe.x, dom_probe.y);
                        if delta[dom] != 0 && !dom_hit_material.is_air() {
                            hit[dom] = true;
                            dom_material = dom_hit_material;
                            new_vel[dom] = -new_vel[dom] * atom_restitution * scene.material(dom_material).restitution;
                        }

                        let sub_probe = axis_probe(sub, atom_hit, atom_backed);
                        let sub_hit_material = scene.material_at(sub_probe.x, sub_probe.y);
                        if sub_stepped && delta[sub] != 0 && !sub_hit_material.is_air() {
                            hit[sub] = true;
                            sub_material = sub_hit_material;
                            new_vel[sub] = -new_vel[sub] * atom_restitution * scene.material(sub_material).restitution;
                        }

                        if !hit[dom] && !hit[sub] {
                            // Corner hit bounces straight back without friction
                            let restitution = atom_restitution * scene.material(hit_material).restitution;
                            hit = [true; 2];
                            new_vel = -new_vel * restitution;
                        } else if hit[dom] && !hit[sub] {
                            new_vel[sub] -= new_vel[sub] * atom_friction * scene.material(dom_material).friction;
                        } else if hit[sub] && !hit[dom] {
                            new_vel[dom] -= new_vel[dom] * atom_friction * scene.material(sub_material).friction;
                        }

                        impulses.push((new_vel - force_vel) * mass_dist);
                    }
                } else if !penetrating.is_empty() {
                    hit = [true; 2];
                    let mass_dist = mass / (penetrating.len() as f32 * share);

                    for &index in &penetrating {
                        let pixel = int_pos + pixel_offsets[index];
                        let params = PenetrationParams::new(1.0, self.atoms[index].num_penetrations());
                        if let Some(retardation) =
                            scene.try_penetrate(pixel.x, pixel.y, force_vel * mass_dist, force_vel, params)
                        {
                            impulses.push(force_vel * mass_dist * retardation);
                        }
                    }
                }

                if hit[X] || hit[Y] {
                    *position += leg_progress;
                    report.did_wrap |= scene.wrap_position(position);

                    for impulse in &impulses {
                        velocity += *impulse / mass;
                        report.impulse += *impulse;
                    }
                    if velocity == Vec2::ZERO {
                        time_left = 0.0;
                    }
                    break;
                }
            }

            if !(hit[X] || hit[Y]) || time_left <= 0.0 || report.hit_count >= settings.push_hit_cap {
                break;
            }
        }

        if !(hit[X] || hit[Y]) {
            *position += trajectory;
            report.did_wrap |= scene.wrap_position(position);
        }
        report
    }

    /// Push the limb along `path` for one frame, with the path pinned to `joint_pos`.
    ///
    /// The path is restarted from a free spot whenever it ends, and terminated first
    /// if the limb has strayed further from the joint than the owner is wide. The
    /// limb is pushed toward each segment target in turn until the frame's time is
    /// spent or the path ends. The resulting impulse goes to the owner, acting at the
    /// joint when `affect_rotation` is set.
    #[allow(clippy::too_many_arguments)]
    pub fn push_as_limb(
        &mut self,
        ctx: &mut PhysicsContext,
        owner: &mut dyn MovableBody,
        joint_pos: Vec2,
        velocity: Vec2,
        rotation: f32,
        path: &mut LimbPath,
        travel_time: f32,
        affect_rotation: bool,
    ) -> LimbPush {
        let settings = ctx.settings;
        let mut result = LimbPush::default();

        path.set_joint_pos(joint_pos);
        path.set_joint_vel(velocity);
        path.set_rotation(rotation);
        path.set_h_flip(owner.is_h_flipped());
        path.set_frame_time(travel_time);

        if ctx.terrain.shortest_distance(joint_pos, self.limb_pos).length() > owner.diameter() {
            trace!("Limb strayed from its joint, terminating path");
            path.terminate();
        }

        let ignore_team = if owner.ignores_team_hits() { owner.team() } else { None };
        let mut impulse;
        loop {
            if path.path_ended() {
                result.restarted = true;
                let mut limb_pos = self.limb_pos;
                let found = path.restart_free(
                    &mut limb_pos,
                    &*ctx.terrain,
                    &*ctx.objects,
                    settings,
                    owner.root_id(),
                    ignore_team,
                );
                self.limb_pos = limb_pos;
                if !found {
                    return result;
                }
            }

            let mut limb_pos = self.limb_pos;
            let push_vel = path.current_vel(limb_pos, &*ctx.terrain, settings);
            let push_force = path.push_force(settings);
            let time_chunk = path.next_time_chunk(limb_pos, &*ctx.terrain, settings);
            impulse = self
                .push_travel(ctx, &*owner, &mut limb_pos, push_vel, push_force, time_chunk, false)
                .impulse;
            self.limb_pos = limb_pos;

            path.report_progress(self.limb_pos, &*ctx.terrain, settings);

            if path.frame_done() || path.path_ended() {
                break;
            }
        }

        if impulse.largest_component() > settings.push_impulse_sanity_cap {
            impulse = Vec2::ZERO;
        }

        let lever = if affect_rotation {
            ctx.terrain.shortest_distance(owner.pos(), joint_pos) * settings.meters_per_pixel()
        } else {
            Vec2::ZERO
        };
        owner.add_impulse_force(impulse, lever);

        result.pushed = true;
        result.impulse = impulse;
        result
    }

    /// Let a limb without a path swing loosely, kept within `limb_radius` of its joint.
    ///
    /// The joint sits at `owner_pos + joint_offset`. The limb is pushed with the
    /// owner's velocity plus the outward pull of its spin, using the configured flail
    /// push force. The push impulse is not applied to the owner.
    #[allow(clippy::too_many_arguments)]
    pub fn flail_as_limb(
        &mut self,
        ctx: &mut PhysicsContext,
        owner: &dyn MovableBody,
        owner_pos: Vec2,
        joint_offset: Vec2,
        limb_radius: f32,
        velocity: Vec2,
        ang_vel: f32,
        travel_time: f32,
    ) -> PushTravel {
        let joint_pos = owner_pos + joint_offset;
        let centrifugal_vel = joint_offset * ang_vel.abs();
        let push_force = ctx.settings.flail_push_force;

        let mut limb_pos = self.limb_pos;
        let report = self.push_travel(
            ctx,
            owner,
            &mut limb_pos,
            velocity + centrifugal_vel,
            push_force,
            travel_time,
            false,
        );

        let limb_vec = limb_pos - joint_pos;
        if limb_vec.length() > limb_radius {
            limb_pos = joint_pos + limb_vec.with_magnitude(limb_radius);
        }
        self.limb_pos = limb_pos;
        report
    }
}
