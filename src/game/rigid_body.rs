// Rotating bodies whose silhouette is an atom group

use glam::Vec2;

use crate::engine::physics::{AtomGroup, BodyState, GroupTravel, MovableBody, PhysicsContext};

/// A crate, a gib, a dropped weapon: anything that tumbles as one rigid piece
#[derive(Debug, Clone)]
pub struct RigidBody {
    state: BodyState,
    group: AtomGroup,
    last_travel: GroupTravel,
}

impl RigidBody {
    pub fn new(state: BodyState, mut group: AtomGroup) -> Self {
        group.set_owner(state.mo_id());
        Self {
            state,
            group,
            last_travel: GroupTravel::default(),
        }
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BodyState {
        &mut self.state
    }

    pub fn group(&self) -> &AtomGroup {
        &self.group
    }

    pub fn last_travel(&self) -> &GroupTravel {
        &self.last_travel
    }

    pub fn is_alive(&self) -> bool {
        !self.state.to_delete
    }

    /// Apply gravity and travel for `dt` seconds
    pub fn update(&mut self, ctx: &mut PhysicsContext, gravity: Vec2, dt: f32) -> GroupTravel {
        if !self.is_alive() {
            return GroupTravel::default();
        }

        self.state.vel += gravity * dt;
        self.last_travel = self.group.travel(ctx, &mut self.state, dt, true, true, false);
        self.last_travel
    }
}
