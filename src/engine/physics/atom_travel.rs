// Lone atom travel: the full per-frame tick for single-atom particles

use glam::{IVec2, Vec2};
use log::{debug, trace};
use rand::Rng;

use super::atom::Atom;
use super::body::MovableBody;
use super::hit_data::HITOR;
use super::{PhysicsContext, TravelReport};
use crate::core::{VecExt, X, Y};
use crate::engine::material::MaterialId;
use crate::engine::scene::{ObjectLookup, PenetrationParams, SceneLock};

/// Pixel next to the hit pixel along `axis` only
fn probe_pixel(axis: usize, hit_pos: [i32; 2], int_pos: [i32; 2]) -> (i32, i32) {
    if axis == X {
        (hit_pos[X], int_pos[Y])
    } else {
        (int_pos[X], hit_pos[Y])
    }
}

impl Atom {
    /// Move the owner through the scene for `travel_time` seconds as a lone atom.
    ///
    /// Each segment is stepped pixel by pixel. An embedded start tries to penetrate
    /// first; then object hits take priority over terrain hits. Terrain either gives
    /// way (sink), takes a sticky deposit, or bounces the atom with friction. After a
    /// hit the remaining time is re-segmented from the new velocity, until a segment
    /// completes, the hit cap is reached, or the owner is terminated.
    ///
    /// With `auto_travel` off the owner is only moved up to its last hit. The per-frame
    /// ignore list is always empty afterwards.
    pub fn travel(
        &mut self,
        ctx: &mut PhysicsContext,
        owner: &mut dyn MovableBody,
        travel_time: f32,
        auto_travel: bool,
        scene_pre_locked: bool,
    ) -> TravelReport {
        let settings = ctx.settings;
        let objects: &mut dyn ObjectLookup = &mut *ctx.objects;
        let rng = &mut *ctx.rng;
        let mut scene = SceneLock::acquire(&mut *ctx.terrain, scene_pre_locked);

        let ppm = settings.pixels_per_meter;
        let mass = owner.mass();
        let sharpness = owner.sharpness();
        let orphans = owner.orphan_removal();
        let own_material = scene.material(self.material()).clone();

        self.last_hit.reset();
        let mut report = TravelReport::default();
        let mut trail: Vec<IVec2> = Vec::with_capacity(6);

        let mut position = owner.pos() + self.offset();
        let mut velocity = owner.vel();
        let mut time_left = travel_time;
        let mut seg_traj = Vec2::ZERO;
        let mut hit = [false; 2];

        loop {
            let mut int_pos = [position.x.floor() as i32, position.y.floor() as i32];
            if self.trail_length() > 0 {
                trail.push(IVec2::new(int_pos[X], int_pos[Y]));
            }

            seg_traj = velocity * time_left * ppm;
            let mut delta = [
                (position.x + seg_traj.x).floor() as i32 - int_pos[X],
                (position.y + seg_traj.y).floor() as i32 - int_pos[Y],
            ];

            hit = [false; 2];
            let mut hit_pos = int_pos;
            let mut sub_steps = 0;
            let mut sub_stepped = false;
            let mut sink_hit = false;
            let mut hit_accel = Vec2::ZERO;

            if delta == [0, 0] {
                break;
            }

            let mut increment = [1, 1];
            for axis in [X, Y] {
                if delta[axis] < 0 {
                    increment[axis] = -1;
                    delta[axis] = -delta[axis];
                }
            }
            let delta2 = [delta[X] << 1, delta[Y] << 1];
            let (dom, sub) = if delta[X] > delta[Y] { (X, Y) } else { (Y, X) };
            let mut error = if self.changed_dir {
                delta2[sub] - delta[dom]
            } else {
                self.prev_error
            };

            for dom_steps in 0..delta[dom] {
                if hit[X] || hit[Y] {
                    break;
                }

                // Started out embedded, e.g. after something was pasted into the terrain
                if dom_steps == 0 && !scene.material_at(int_pos[X], int_pos[Y]).is_air() {
                    report.hit_count += 1;
                    hit = [true, true];
                    let params = PenetrationParams::new(settings.embedded_air_ratio, self.num_penetrations)
                        .with_orphans(orphans);
                    match scene.try_penetrate(int_pos[X], int_pos[Y], velocity * mass * sharpness, velocity, params) {
                        Some(retardation) => {
                            velocity += velocity * retardation;
                            continue;
                        }
                        None => {
                            velocity = Vec2::ZERO;
                            time_left = 0.0;
                            break;
                        }
                    }
                }

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

                let mut wrapped = IVec2::new(int_pos[X], int_pos[Y]);
                scene.wrap_point(&mut wrapped);
                int_pos = [wrapped.x, wrapped.y];

                let mo_hit = objects
                    .mo_id_at(int_pos[X], int_pos[Y])
                    .filter(|_| owner.hits_mos())
                    .filter(|&id| !self.is_ignoring_mo_id(id, &*owner, &*objects, &[]));
                self.set_mo_id_hit(mo_hit);
                let terrain_id = scene.material_at(int_pos[X], int_pos[Y]);

                if let Some(hit_id) = mo_hit {
                    owner.set_hit_mo_id(hit_id);
                    report.hit_count += 1;
                    hit_pos = int_pos;

                    // Back out of the other object
                    int_pos[dom] -= increment[dom];
                    if sub_stepped {
                        int_pos[sub] -= increment[sub];
                    }

                    self.last_hit.reset();
                    self.last_hit.total_mass[HITOR] = mass;
                    self.last_hit.mom_inertia[HITOR] = 1.0;
                    self.last_hit.impulse_factor = [1.0, 1.0];
                    self.last_hit.hit_vel[HITOR] = velocity;
                    self.last_hit.hit_material[HITOR] = self.material();
                    self.last_hit.body = [owner.mo_id(), Some(hit_id)];
                    objects.set_hit_by(hit_id, owner.mo_id());

                    let hit_root = objects.profile(hit_id).map_or(hit_id, |profile| profile.root);
                    if let Some(amount) = owner.absorbed_on_actor_contact() {
                        if objects.profile(hit_root).is_some_and(|root| root.is_actor) {
                            debug!("Absorbed into actor {:?}", hit_root);
                            objects.credit_absorbed(hit_root, amount);
                            owner.set_to_delete();
                            self.last_hit.terminate[HITOR] = true;
                            hit = [true, true];
                            break;
                        }
                    }

                    let (px, py) = probe_pixel(dom, hit_pos, int_pos);
                    if delta[dom] != 0 && objects.mo_id_at(px, py).is_some() {
                        hit[dom] = true;
                        self.last_hit.hit_point = Vec2::new(px as f32, py as f32);
                        self.last_hit.bitmap_normal[dom] = -increment[dom] as f32;
                    }

                    let (px, py) = probe_pixel(sub, hit_pos, int_pos);
                    if sub_stepped && delta[sub] != 0 && objects.mo_id_at(px, py).is_some() {
                        hit[sub] = true;
                        if self.last_hit.hit_point == Vec2::ZERO {
                            self.last_hit.hit_point = Vec2::new(px as f32, py as f32);
                        } else {
                            self.last_hit.hit_point = Vec2::new(hit_pos[X] as f32, hit_pos[Y] as f32);
                        }
                        self.last_hit.bitmap_normal[sub] = -increment[sub] as f32;
                    }

                    if !hit[dom] && !hit[sub] {
                        hit = [true, true];
                        self.last_hit.hit_point = Vec2::new(hit_pos[X] as f32, hit_pos[Y] as f32);
                        self.last_hit.bitmap_normal = Vec2::new(-increment[X] as f32, -increment[Y] as f32);
                    }
                    self.last_hit.bitmap_normal = self.last_hit.bitmap_normal.normalize_or_zero();

                    // The other object only moves once its own update applies the impulse
                    self.add_mo_id_to_ignore(hit_id);

                    objects.collide_at_point(hit_id, &mut self.last_hit);
                    hit_accel = self.last_hit.res_impulse[HITOR] / mass;

                    self.last_hit.root_body = [owner.root_id(), Some(hit_root)];
                    owner.on_mo_hit(Some(hit_root));
                    objects.on_mo_hit(hit_root, owner.root_id());
                } else if !terrain_id.is_air() && !owner.ignores_terrain() {
                    owner.set_hit_terrain_material(terrain_id);
                    hit_pos = int_pos;
                    report.hit_count += 1;
                    let hit_restitution = scene.material(terrain_id).restitution;

                    let params = PenetrationParams::new(settings.atom_sink_air_ratio, self.num_penetrations)
                        .with_orphans(orphans);
                    let penetration = if terrain_id != MaterialId::OUT_OF_BOUNDS {
                        scene.try_penetrate(int_pos[X], int_pos[Y], velocity * mass * sharpness, velocity, params)
                    } else {
                        None
                    };

                    if let Some(retardation) = penetration {
                        hit = [true, true];
                        sink_hit = true;
                        self.num_penetrations += 1;
                        self.changed_dir = false;
                        self.prev_error = error;
                        hit_accel = velocity * retardation;
                        trace!("Atom sank into {:?} at {:?}", terrain_id, int_pos);
                    } else {
                        self.num_penetrations = 0;
                        self.changed_dir = true;
                        self.prev_error = error;

                        int_pos[dom] -= increment[dom];
                        if sub_stepped {
                            int_pos[sub] -= increment[sub];
                        }
                        let mut wrapped = IVec2::new(int_pos[X], int_pos[Y]);
                        scene.wrap_point(&mut wrapped);
                        int_pos = [wrapped.x, wrapped.y];

                        if own_material.stickiness >= rng.gen::<f32>()
                            && velocity.largest_component() > settings.sticky_min_speed
                        {
                            trace!("Atom stuck at {:?}", int_pos);
                            position = Vec2::new(int_pos[X] as f32, int_pos[Y] as f32) + self.offset();
                            scene.deposit(int_pos[X], int_pos[Y], self.material());
                            owner.set_to_delete();
                            self.last_hit.terminate[HITOR] = true;
                            hit = [true, true];
                            break;
                        }

                        let mut dom_friction = 0.0;
                        let mut sub_friction = 0.0;

                        let (px, py) = probe_pixel(dom, hit_pos, int_pos);
                        let dom_id = scene.material_at(px, py);
                        if delta[dom] != 0 && !dom_id.is_air() {
                            hit[dom] = true;
                            let material = scene.material(dom_id);
                            dom_friction = material.friction;
                            hit_accel[dom] =
                                -velocity[dom] - velocity[dom] * own_material.restitution * material.restitution;
                        }

                        let (px, py) = probe_pixel(sub, hit_pos, int_pos);
                        let sub_id = scene.material_at(px, py);
                        if sub_stepped && delta[sub] != 0 && !sub_id.is_air() {
                            hit[sub] = true;
                            let material = scene.material(sub_id);
                            sub_friction = material.friction;
                            hit_accel[sub] =
                                -velocity[sub] - velocity[sub] * own_material.restitution * material.restitution;
                        }

                        if !hit[dom] && !hit[sub] {
                            // Right on a pixel corner: straight back, no friction
                            hit = [true, true];
                            let bounce = own_material.restitution * hit_restitution;
                            hit_accel[dom] = -velocity[dom] - velocity[dom] * bounce;
                            hit_accel[sub] = -velocity[sub] - velocity[sub] * bounce;
                        } else if hit[dom] && !hit[sub] {
                            hit_accel[sub] -= velocity[sub] * own_material.friction * dom_friction;
                        } else if hit[sub] && !hit[dom] {
                            hit_accel[dom] -= velocity[dom] * own_material.friction * sub_friction;
                        }
                    }
                } else if self.trail_length() > 0 {
                    trail.push(IVec2::new(int_pos[X], int_pos[Y]));
                }

                if (hit[X] || hit[Y]) && !self.last_hit.terminate[HITOR] {
                    // A sink leaves the atom inside the hit pixel, so that step counts
                    let dom_made = dom_steps + sink_hit as i32;
                    let seg_progress = if dom_made < delta[dom] {
                        dom_made as f32 / seg_traj[dom].abs()
                    } else {
                        1.0
                    };
                    time_left -= time_left * seg_progress;

                    position[dom] += (dom_made * increment[dom]) as f32;
                    let sub_made = sub_steps + (sub_stepped && sink_hit) as i32;
                    if sub_made < delta[sub] {
                        position[sub] += (sub_made * increment[sub]) as f32;
                    } else {
                        position[sub] += seg_traj[sub];
                    }

                    let mut test_pos = position - self.offset();
                    report.did_wrap = scene.wrap_position(&mut test_pos) || report.did_wrap;

                    velocity += hit_accel;
                }
            }

            let keep_going = (hit[X] || hit[Y])
                && report.hit_count < settings.atom_hit_cap
                && !self.last_hit.terminate[HITOR];
            if !keep_going {
                break;
            }
        }

        if report.hit_count >= settings.atom_hit_cap {
            debug!("Atom travel cut off after {} hits", report.hit_count);
        }

        let keep = trail.len().saturating_sub(self.trail_length());
        report.trail = trail.split_off(keep);

        position -= self.offset();
        if !(hit[X] || hit[Y]) && auto_travel {
            position += seg_traj;
        }
        report.did_wrap = scene.wrap_position(&mut position) || report.did_wrap;
        drop(scene);

        owner.set_pos(position);
        owner.set_vel(velocity);
        self.clear_mo_id_ignore_list();

        report
    }
}
