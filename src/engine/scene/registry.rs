// Reference object manager: MOID raster plus registered bodies

use std::collections::HashMap;

use glam::Vec2;
use log::{debug, info, trace};

use super::{BodyProfile, MoId, ObjectLookup, Team, TerrainQuery};
use crate::core::{PhysicsSettings, VecExt};
use crate::engine::material::{Material, MaterialId, MaterialPalette};
use crate::engine::physics::{AtomGroup, BodyState, HitData, MovableBody, HITEE, HITOR};

/// A body known to the registry
#[derive(Debug, Clone)]
pub struct RegisteredBody {
    pub state: BodyState,
    pub material: MaterialId,
    pub is_actor: bool,
    pub gets_hit_by_mos: bool,
    pub pin_strength: f32,
    /// Veto every MO hit reported to this body
    pub vetoes_hits: bool,
    pub atom_group: Option<AtomGroup>,
    pub hit_by: Option<MoId>,
    pub hits_received: u32,
    /// Particles that punched into this body instead of bouncing off
    pub particle_penetrations: u32,
}

impl RegisteredBody {
    pub fn new(state: BodyState, material: MaterialId) -> Self {
        Self {
            state,
            material,
            is_actor: false,
            gets_hit_by_mos: true,
            pin_strength: 0.0,
            vetoes_hits: false,
            atom_group: None,
            hit_by: None,
            hits_received: 0,
            particle_penetrations: 0,
        }
    }

    /// Mark as an actor that can receive absorbed matter
    pub fn actor(mut self) -> Self {
        self.is_actor = true;
        self
    }

    pub fn with_pin_strength(mut self, strength: f32) -> Self {
        self.pin_strength = strength;
        self
    }

    pub fn with_atom_group(mut self, group: AtomGroup) -> Self {
        self.atom_group = Some(group);
        self.state.rotating = true;
        self
    }

    pub fn vetoing_hits(mut self) -> Self {
        self.vetoes_hits = true;
        self
    }

    /// Moment of inertia from the atom group, or a uniform disc of the body radius
    pub fn mom_inertia(&mut self, meters_per_pixel: f32) -> f32 {
        let mass = self.state.mass;
        match self.atom_group.as_mut() {
            Some(group) => group.moment_of_inertia(mass, meters_per_pixel),
            None => {
                let radius = self.state.radius * meters_per_pixel;
                (0.5 * mass * radius * radius).max(0.000_001)
            }
        }
    }

    /// A particle struck this body hard enough to break through its material
    fn particle_penetration(&mut self, hit: &HitData, integrity: f32) -> bool {
        if hit.res_impulse[HITEE].length() > integrity {
            self.particle_penetrations += 1;
            trace!("Particle penetrated body {:?}", self.state.id);
            return true;
        }
        false
    }
}

/// MOID raster and body table used as the object side of a scene
#[derive(Debug, Clone)]
pub struct ObjectRegistry {
    width: i32,
    height: i32,
    raster: Vec<Option<MoId>>,
    bodies: HashMap<MoId, RegisteredBody>,
    team_funds: HashMap<Team, f32>,
    palette: MaterialPalette,
    settings: PhysicsSettings,
}

impl ObjectRegistry {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            raster: vec![None; (width * height) as usize],
            bodies: HashMap::new(),
            team_funds: HashMap::new(),
            palette: MaterialPalette::new(),
            settings: PhysicsSettings::default(),
        }
    }

    /// Use this palette for collision restitution
    pub fn with_palette(mut self, palette: MaterialPalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_settings(mut self, settings: PhysicsSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn add_material(&mut self, material: Material) {
        self.palette.insert(material);
    }

    /// Add a body. Its state must carry an id.
    pub fn register(&mut self, body: RegisteredBody) -> Option<MoId> {
        let id = body.state.id?;
        debug!("Registered body {:?} at {:?}", id, body.state.pos);
        self.bodies.insert(id, body);
        Some(id)
    }

    pub fn get(&self, id: MoId) -> Option<&RegisteredBody> {
        self.bodies.get(&id)
    }

    pub fn get_mut(&mut self, id: MoId) -> Option<&mut RegisteredBody> {
        self.bodies.get_mut(&id)
    }

    pub fn team_funds(&self, team: Team) -> f32 {
        self.team_funds.get(&team).copied().unwrap_or(0.0)
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    fn paint(&mut self, x: i32, y: i32, id: Option<MoId>) {
        if self.in_bounds(x, y) {
            let index = (y * self.width + x) as usize;
            self.raster[index] = id;
        }
    }

    /// Clear the MOID raster
    pub fn clear_raster(&mut self) {
        self.raster.fill(None);
    }

    /// Paint a filled disc of `id` into the raster
    pub fn stamp_disc(&mut self, center: Vec2, radius: f32, id: MoId) {
        let r = radius.ceil() as i32;
        let c = center.floor_int();
        for y in c.y - r..=c.y + r {
            for x in c.x - r..=c.x + r {
                let d = Vec2::new((x - c.x) as f32, (y - c.y) as f32);
                if d.length_squared() <= radius * radius {
                    self.paint(x, y, Some(id));
                }
            }
        }
    }

    /// Paint a filled rectangle of `id` into the raster
    pub fn stamp_rect(&mut self, x: i32, y: i32, w: i32, h: i32, id: MoId) {
        for py in y..y + h {
            for px in x..x + w {
                self.paint(px, py, Some(id));
            }
        }
    }
}

impl ObjectLookup for ObjectRegistry {
    fn mo_id_at(&self, x: i32, y: i32) -> Option<MoId> {
        if !self.in_bounds(x, y) {
            return None;
        }
        self.raster[(y * self.width + x) as usize]
    }

    fn profile(&self, id: MoId) -> Option<BodyProfile> {
        let body = self.bodies.get(&id)?;
        let state = &body.state;
        Some(BodyProfile {
            id,
            root: state.root_id().unwrap_or(id),
            team: state.team,
            ignores_team_hits: state.ignores_team_hits,
            ignores_atom_group_hits: state.ignores_atom_group_hits,
            is_rotating: state.rotating,
            is_actor: body.is_actor,
            gets_hit_by_mos: body.gets_hit_by_mos,
            mass: state.mass,
            radius: state.radius,
            pin_strength: body.pin_strength,
            pos: state.pos,
        })
    }

    fn collide_at_point(&mut self, id: MoId, hit: &mut HitData) -> bool {
        let mpp = self.settings.meters_per_pixel();
        let hitor_restitution = self.palette.get(hit.hit_material[HITOR]).restitution;
        let hitor_is_particle = hit.body[HITOR]
            .and_then(|hitor| self.bodies.get(&hitor))
            .map_or(true, |hitor| !hitor.state.rotating);
        let Some(body) = self.bodies.get_mut(&id) else {
            return false;
        };
        if body.state.to_delete {
            return false;
        }

        hit.total_mass[HITEE] = body.state.mass;
        hit.mom_inertia[HITEE] = body.mom_inertia(mpp);
        hit.hit_material[HITEE] = body.material;
        let material = self.palette.get(body.material);
        let restitution = hitor_restitution * material.restitution;
        let integrity = material.integrity;

        let state = &body.state;
        if !hit.resolve_rigid(state.pos, state.vel, state.ang_vel, restitution, mpp) {
            return false;
        }
        if hitor_is_particle {
            body.particle_penetration(hit, integrity);
        }

        if body.pin_strength > 0.0 && hit.res_impulse[HITEE].length() > body.pin_strength {
            debug!("Body {:?} knocked loose from its pin", id);
            body.pin_strength = 0.0;
        } else if body.pin_strength > 0.0 {
            hit.res_impulse[HITEE] = Vec2::ZERO;
        }

        let impulse = hit.res_impulse[HITEE];
        let lever = hit.hit_radius[HITEE];
        let mom_inertia = hit.mom_inertia[HITEE];
        let state = &mut body.state;
        state.vel += impulse / state.mass;
        if state.rotating {
            state.ang_vel += lever.perpendicular().dot(impulse) / mom_inertia;
        }
        true
    }

    fn on_mo_hit(&mut self, id: MoId, other: Option<MoId>) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.hits_received += 1;
                body.hit_by = other;
                body.vetoes_hits
            }
            None => false,
        }
    }

    fn credit_absorbed(&mut self, actor: MoId, amount: f32) {
        let Some(team) = self.bodies.get(&actor).and_then(|body| body.state.team) else {
            return;
        };
        let funds = self.team_funds.entry(team).or_insert(0.0);
        *funds += amount;
        info!("Team {} absorbed {:.3}, funds now {:.3}", team, amount, funds);
    }

    fn translate(&mut self, id: MoId, delta: Vec2) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.state.pos += delta;
        }
    }

    fn squish_if_buried(&mut self, id: MoId, impulse: Vec2, terrain: &dyn TerrainQuery) -> bool {
        let squish_ratio = self.settings.squish_ratio;
        let Some(body) = self.bodies.get_mut(&id) else {
            return false;
        };
        if !body.state.squishable {
            return false;
        }
        let buried = body
            .atom_group
            .as_ref()
            .map(|group| group.ratio_in_terrain(&body.state, terrain))
            .unwrap_or(0.0);
        if buried > squish_ratio {
            info!("Body {:?} squished ({:.0}% in terrain)", id, buried * 100.0);
            body.state.gib(impulse);
            return true;
        }
        false
    }

    fn set_hit_by(&mut self, id: MoId, by: Option<MoId>) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.hit_by = by;
        }
    }
}
