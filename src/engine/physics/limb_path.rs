// Limb paths: authored waypoint sequences that limbs are pushed along

use glam::Vec2;
use log::trace;
use serde::{Deserialize, Serialize};

use super::debug::DebugCanvas;
use crate::core::{PhysicsSettings, VecExt};
use crate::engine::game_loop::SimTimer;
use crate::engine::material::MaterialId;
use crate::engine::scene::{cast_obstacle_ray, MoId, ObjectLookup, ObstacleRay, Team, TerrainQuery};

/// Travel speed presets of a limb path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Speed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl Speed {
    pub const ALL: [Speed; 3] = [Speed::Slow, Speed::Normal, Speed::Fast];

    /// Preset for an integer index, clamped into range
    pub fn clamped(index: i32) -> Self {
        match index {
            i32::MIN..=0 => Speed::Slow,
            1 => Speed::Normal,
            _ => Speed::Fast,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A limb's scripted motion: a start offset from the joint followed by relative
/// segments, walked one target at a time.
///
/// The first `start_seg_count` segments lead in to the repeating part of the
/// cycle and are where `restart_free` looks for space. All offsets are in the
/// owner's unrotated, unflipped frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LimbPath {
    start: Vec2,
    start_seg_count: usize,
    segments: Vec<Vec2>,
    current: usize,
    /// Segments from the end on which foot collisions turn off, negative for never
    foot_collisions_disabled_segment: i32,
    seg_progress: f32,

    travel_speed: [f32; 3],
    which_speed: Speed,
    push_force: f32,

    joint_pos: Vec2,
    joint_vel: Vec2,
    rotation: f32,
    h_flipped: bool,
    time_left: f32,

    path_timer: SimTimer,
    seg_timer: SimTimer,

    total_length: f32,
    regular_length: f32,
    ended: bool,
    /// Terrain the limb may start inside when restarting, e.g. grass
    restart_ignore_material: MaterialId,
}

impl Default for LimbPath {
    fn default() -> Self {
        Self::new()
    }
}

impl LimbPath {
    /// An empty path, which behaves as a static point at the joint
    pub fn new() -> Self {
        Self {
            start: Vec2::ZERO,
            start_seg_count: 0,
            segments: Vec::new(),
            current: 0,
            foot_collisions_disabled_segment: -1,
            seg_progress: 0.0,
            travel_speed: [0.0; 3],
            which_speed: Speed::Normal,
            push_force: 0.0,
            joint_pos: Vec2::ZERO,
            joint_vel: Vec2::ZERO,
            rotation: 0.0,
            h_flipped: false,
            time_left: 0.0,
            path_timer: SimTimer::new(),
            seg_timer: SimTimer::new(),
            total_length: 0.0,
            regular_length: 0.0,
            ended: true,
            restart_ignore_material: MaterialId::AIR,
        }
    }

    /// Copy the authored part of another path. The copy starts out ended.
    pub fn from_reference(reference: &LimbPath) -> Self {
        let mut path = reference.clone();
        path.path_timer.reset();
        path.seg_timer.reset();
        path.time_left = 0.0;
        path.terminate();
        path
    }

    pub fn with_start_offset(mut self, start: Vec2) -> Self {
        self.start = start;
        self
    }

    /// Must be set before segments are added, as it decides which ones count as regular
    pub fn with_start_seg_count(mut self, count: usize) -> Self {
        self.start_seg_count = count;
        self
    }

    pub fn with_segment(mut self, segment: Vec2) -> Self {
        self.add_segment(segment);
        self
    }

    pub fn with_foot_collisions_disabled_segment(mut self, segment: i32) -> Self {
        self.foot_collisions_disabled_segment = segment;
        self
    }

    pub fn with_speeds(mut self, slow: f32, normal: f32, fast: f32) -> Self {
        self.travel_speed = [slow, normal, fast];
        self
    }

    pub fn with_push_force(mut self, push_force: f32) -> Self {
        self.push_force = push_force;
        self
    }

    pub fn with_restart_ignore_material(mut self, material: MaterialId) -> Self {
        self.restart_ignore_material = material;
        self
    }

    /// Material the restart probe sees through
    pub fn restart_ignore_material(&self) -> MaterialId {
        self.restart_ignore_material
    }

    /// Append a segment, updating the total and regular path lengths
    pub fn add_segment(&mut self, segment: Vec2) {
        self.segments.push(segment);
        let length = segment.length();
        self.total_length += length;
        if self.segments.len() >= self.start_seg_count {
            self.regular_length += length;
        }
    }

    pub fn start_offset(&self) -> Vec2 {
        self.start
    }

    pub fn set_start_offset(&mut self, start: Vec2) {
        self.start = start;
    }

    pub fn start_seg_count(&self) -> usize {
        self.start_seg_count
    }

    pub fn foot_collisions_disabled_segment(&self) -> i32 {
        self.foot_collisions_disabled_segment
    }

    pub fn segments(&self) -> &[Vec2] {
        &self.segments
    }

    pub fn seg_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> Option<Vec2> {
        self.segments.get(index).copied()
    }

    /// Replace an existing segment. Path lengths are left as authored.
    pub fn set_segment(&mut self, index: usize, segment: Vec2) -> bool {
        match self.segments.get_mut(index) {
            Some(existing) => {
                *existing = segment;
                true
            }
            None => false,
        }
    }

    pub fn seg_progress(&self) -> f32 {
        self.seg_progress
    }

    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    pub fn regular_length(&self) -> f32 {
        self.regular_length
    }

    /// Travel speed of the selected preset, in m/s
    pub fn speed(&self) -> f32 {
        self.travel_speed[self.which_speed.index()]
    }

    pub fn speed_of(&self, preset: Speed) -> f32 {
        self.travel_speed[preset.index()]
    }

    pub fn which_speed(&self) -> Speed {
        self.which_speed
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.which_speed = speed;
    }

    /// Select a speed preset by index, clamping out-of-range values
    pub fn set_speed_index(&mut self, index: i32) {
        self.which_speed = Speed::clamped(index);
    }

    /// Change the travel speed of one preset
    pub fn override_speed(&mut self, preset: Speed, speed: f32) {
        self.travel_speed[preset.index()] = speed;
    }

    /// Authored push force, without stall escalation
    pub fn default_push_force(&self) -> f32 {
        self.push_force
    }

    /// Push force, growing by its own size every `push_escalation_ms` spent on the
    /// current segment
    pub fn push_force(&self, settings: &PhysicsSettings) -> f32 {
        let stalled = (self.seg_timer.elapsed_ms() / settings.push_escalation_ms as f64) as f32;
        self.push_force + self.push_force * stalled
    }

    pub fn joint_pos(&self) -> Vec2 {
        self.joint_pos
    }

    pub fn set_joint_pos(&mut self, joint_pos: Vec2) {
        self.joint_pos = joint_pos;
    }

    pub fn set_joint_vel(&mut self, joint_vel: Vec2) {
        self.joint_vel = joint_vel;
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        self.rotation = rotation;
    }

    pub fn is_h_flipped(&self) -> bool {
        self.h_flipped
    }

    pub fn set_h_flip(&mut self, flipped: bool) {
        self.h_flipped = flipped;
    }

    /// Hand the path this frame's time budget and advance its timers by it
    pub fn set_frame_time(&mut self, frame_time: f32) {
        self.time_left = frame_time;
        self.path_timer.advance(frame_time);
        self.seg_timer.advance(frame_time);
    }

    pub fn time_left(&self) -> f32 {
        self.time_left
    }

    pub fn frame_done(&self) -> bool {
        self.time_left <= 0.0
    }

    pub fn path_ended(&self) -> bool {
        self.ended
    }

    pub fn path_is_at_start(&self) -> bool {
        self.current == 0 && self.seg_progress == 0.0
    }

    pub fn is_static_point(&self) -> bool {
        self.segments.is_empty()
    }

    /// Index of the segment being walked, zero when ended or static
    pub fn current_segment_number(&self) -> usize {
        if self.ended || self.is_static_point() {
            0
        } else {
            self.current
        }
    }

    pub fn foot_collisions_should_be_disabled(&self) -> bool {
        self.foot_collisions_disabled_segment >= 0
            && self.seg_count() as i32 - self.current_segment_number() as i32 <= self.foot_collisions_disabled_segment
    }

    /// Path-local vector in scene orientation
    fn oriented(&self, v: Vec2) -> Vec2 {
        v.x_flipped(self.h_flipped).rad_rotated(self.rotation)
    }

    fn start_pos(&self) -> Vec2 {
        self.joint_pos.floored() + self.oriented(self.start)
    }

    fn walked_before_current(&self) -> Vec2 {
        self.segments[..self.current]
            .iter()
            .fold(Vec2::ZERO, |sum, seg| sum + self.oriented(*seg))
    }

    /// Scene position of the current progress along the path
    pub fn progress_pos(&self) -> Vec2 {
        if self.is_static_point() {
            return self.start_pos();
        }
        let partial = self
            .segments
            .get(self.current)
            .map_or(Vec2::ZERO, |seg| self.oriented(*seg * self.seg_progress));
        self.start_pos() + self.walked_before_current() + partial
    }

    /// Scene position of the end of the current segment
    pub fn current_seg_target(&self) -> Vec2 {
        if self.is_static_point() {
            return self.start_pos();
        }
        let current = self
            .segments
            .get(self.current)
            .map_or(Vec2::ZERO, |seg| self.oriented(*seg));
        self.start_pos() + self.walked_before_current() + current
    }

    fn current_seg_length(&self) -> f32 {
        self.segments.get(self.current).map_or(0.0, |seg| seg.length())
    }

    /// Velocity (m/s) a limb at `limb_pos` should push with to reach the current target
    pub fn current_vel(&self, limb_pos: Vec2, terrain: &dyn TerrainQuery, settings: &PhysicsSettings) -> Vec2 {
        let dist = terrain.shortest_distance(limb_pos, self.current_seg_target());
        let adjusted_speed = self.speed() / (1.0 + self.joint_vel.length() * 0.1);

        if self.is_static_point() {
            let chase = dist * settings.meters_per_pixel() / settings.static_limb_time;
            chase.cap_magnitude(adjusted_speed) + self.joint_vel
        } else {
            Vec2::new(adjusted_speed, 0.0).abs_rotated_to(dist) + self.joint_vel
        }
    }

    /// Time needed to reach the current target at the current speed, capped by and
    /// deducted from this frame's remaining time
    pub fn next_time_chunk(&mut self, limb_pos: Vec2, terrain: &dyn TerrainQuery, settings: &PhysicsSettings) -> f32 {
        if self.is_static_point() {
            return std::mem::take(&mut self.time_left);
        }

        let distance = terrain.shortest_distance(limb_pos, self.current_seg_target()) * settings.meters_per_pixel();
        let chunk = (distance.length() / (self.speed() + self.joint_vel.length())).min(self.time_left);
        self.time_left -= chunk;
        chunk
    }

    /// Update segment progress from where the limb got to, moving on to the next
    /// segment once the target is within reach
    pub fn report_progress(&mut self, limb_pos: Vec2, terrain: &dyn TerrainQuery, settings: &PhysicsSettings) {
        let distance = terrain.shortest_distance(limb_pos, self.current_seg_target()).length();

        if self.is_static_point() {
            self.ended = distance < 1.0;
            return;
        }

        let seg_length = self.current_seg_length();
        let progress_on_segment = if distance > seg_length {
            0.0
        } else {
            1.0 - distance / seg_length
        };

        if distance < settings.limb_arrive_distance {
            if self.current + 1 == self.segments.len() {
                self.seg_progress = progress_on_segment;
                self.ended = true;
            } else {
                self.current += 1;
                self.seg_progress = 0.0;
                self.seg_timer.reset();
                self.ended = false;
            }
        } else {
            self.seg_progress = progress_on_segment;
            self.ended = false;
        }

        let expected_ms = (seg_length * settings.meters_per_pixel() / self.speed()) * 1000.0;
        if !self.ended && self.seg_timer.is_past_ms((expected_ms * settings.limb_stall_factor) as f64) {
            trace!("Limb path stalled on segment {}, terminating", self.current);
            self.terminate();
        }
    }

    /// Fraction of the whole path covered, zero when ended or static
    pub fn total_progress(&self) -> f32 {
        if self.ended || self.is_static_point() || self.total_length <= 0.0 {
            return 0.0;
        }
        let walked: f32 = self.segments[..self.current].iter().map(|seg| seg.length()).sum();
        (walked + self.current_seg_length() * self.seg_progress) / self.total_length
    }

    /// Fraction of the regular part of the path covered, zero when ended or static
    pub fn regular_progress(&self) -> f32 {
        if self.ended || self.is_static_point() || self.regular_length <= 0.0 {
            return 0.0;
        }
        let walked: f32 = self.segments[..self.current].iter().map(|seg| seg.length()).sum();
        (self.regular_length - self.total_length + walked + self.current_seg_length() * self.seg_progress)
            / self.regular_length
    }

    /// Milliseconds to walk the whole path at the current speed
    pub fn total_path_time_ms(&self, settings: &PhysicsSettings) -> f32 {
        (self.total_length * settings.meters_per_pixel() / self.speed()) * 1000.0
    }

    /// Milliseconds to walk the regular part of the path at the current speed
    pub fn regular_path_time_ms(&self, settings: &PhysicsSettings) -> f32 {
        (self.regular_length * settings.meters_per_pixel() / self.speed()) * 1000.0
    }

    pub fn total_time_progress(&self, settings: &PhysicsSettings) -> f32 {
        if self.ended {
            return 0.0;
        }
        self.path_timer.elapsed_ms() as f32 / self.total_path_time_ms(settings)
    }

    pub fn regular_time_progress(&self, settings: &PhysicsSettings) -> f32 {
        if self.ended {
            return 0.0;
        }
        self.path_timer.elapsed_ms() as f32 / self.regular_path_time_ms(settings)
    }

    /// Jump to the end of the last segment and mark the path ended
    pub fn terminate(&mut self) {
        if !self.is_static_point() {
            self.current = self.segments.len() - 1;
            self.seg_progress = 1.0;
        }
        self.ended = true;
    }

    /// Start over from the first segment
    pub fn restart(&mut self) {
        self.current = 0;
        self.path_timer.reset();
        self.seg_timer.reset();
        self.seg_progress = 0.0;
        self.ended = false;
    }

    /// Restart from the first free spot along the start segments.
    ///
    /// Rays are cast along each start segment in turn. The first one blocked past
    /// its first pixel becomes the current segment, with the limb placed at the
    /// last free pixel. A segment blocked right away falls back to the one before
    /// it. If every start segment is clear the walk begins at the first regular
    /// segment. A static path instead searches down onto its point from above.
    ///
    /// On success `limb_pos` is moved to the restart spot. On failure the path is
    /// left where it was and `false` is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn restart_free(
        &mut self,
        limb_pos: &mut Vec2,
        terrain: &dyn TerrainQuery,
        objects: &dyn ObjectLookup,
        settings: &PhysicsSettings,
        ignore_root: Option<MoId>,
        ignore_team: Option<Team>,
    ) -> bool {
        let prev_segment = self.current;
        let prev_progress = self.seg_progress;
        self.seg_progress = 0.0;
        let mut found = false;

        if self.is_static_point() {
            let target = self.start_pos();
            let begin = target - Vec2::new(0.0, settings.static_restart_lift);
            let ray = cast_obstacle_ray(
                terrain,
                objects,
                begin,
                target - begin,
                ignore_root,
                ignore_team,
                self.restart_ignore_material,
                0,
            );
            *limb_pos = ray.free_pos();
            // Only a ray that passed through free pixels found space
            found = !matches!(ray, ObstacleRay::Blocked { distance, .. } if distance == 0.0);
        } else {
            self.current = 0;
            let mut checked = 0;
            while checked < self.start_seg_count {
                let ray = cast_obstacle_ray(
                    terrain,
                    objects,
                    self.progress_pos(),
                    self.oriented(self.segments[self.current]),
                    ignore_root,
                    ignore_team,
                    self.restart_ignore_material,
                    0,
                );

                match ray {
                    ObstacleRay::Blocked { distance, free_pos, .. } if distance > 0.0 => {
                        *limb_pos = free_pos;
                        let seg_length = self.current_seg_length();
                        self.seg_progress =
                            terrain.shortest_distance(self.progress_pos(), *limb_pos).length() / seg_length;
                        *limb_pos = self.progress_pos();
                        self.ended = false;
                        found = true;
                        break;
                    }
                    ObstacleRay::Blocked { .. } if self.current > 0 => {
                        self.current -= 1;
                        *limb_pos = self.progress_pos();
                        self.seg_progress = 0.0;
                        self.ended = false;
                        found = true;
                        break;
                    }
                    ObstacleRay::Blocked { .. } => break,
                    ObstacleRay::Clear { .. } => {}
                }

                self.current += 1;
                if self.current == self.segments.len() {
                    break;
                }
                checked += 1;
            }

            if !found && checked == self.start_seg_count && self.current < self.segments.len() {
                *limb_pos = self.progress_pos();
                self.seg_progress = 0.0;
                self.ended = false;
                found = true;
            }
        }

        if found {
            self.path_timer.reset();
            self.seg_timer.reset();
            return true;
        }

        self.current = prev_segment;
        self.seg_progress = prev_progress;
        false
    }

    /// Plot the path from its start point through every segment
    pub fn draw_debug(&self, canvas: &mut DebugCanvas, color: u8) {
        let mut from = self.start_pos();
        canvas.draw_cross(from, 1.0, color);
        for segment in &self.segments {
            let to = from + self.oriented(*segment);
            canvas.draw_line(from, to, color);
            from = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_SETTINGS;
    use crate::engine::material::Material;
    use crate::engine::scene::{ObjectRegistry, PixelScene};
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    const ROCK: MaterialId = MaterialId(41);

    fn scene() -> PixelScene {
        let mut scene = PixelScene::new(64, 64);
        scene.add_material(Material::new(ROCK, "Rock"));
        scene
    }

    fn stride() -> LimbPath {
        let mut path = LimbPath::new()
            .with_start_seg_count(2)
            .with_segment(Vec2::new(0.0, 5.0))
            .with_segment(Vec2::new(0.0, 5.0))
            .with_segment(Vec2::new(5.0, 0.0))
            .with_speeds(1.0, 2.0, 4.0)
            .with_push_force(100.0);
        path.set_joint_pos(Vec2::new(10.5, 10.5));
        path
    }

    #[test]
    fn test_new_path_is_ended_static_point() {
        let path = LimbPath::new();
        assert!(path.is_static_point());
        assert!(path.path_ended());
        assert!(path.frame_done());
        assert_eq!(path.which_speed(), Speed::Normal);
    }

    #[test]
    fn test_segment_lengths() {
        let path = stride();
        assert_relative_eq!(path.total_length(), 15.0);
        // The first lead-in segment is not part of the regular cycle
        assert_relative_eq!(path.regular_length(), 10.0);
    }

    #[test]
    fn test_progress_pos_and_target() {
        let mut path = stride();
        path.restart();
        assert_eq!(path.progress_pos(), Vec2::new(10.0, 10.0), "Joint position is floored");
        assert_eq!(path.current_seg_target(), Vec2::new(10.0, 15.0));

        path.current = 2;
        path.seg_progress = 0.5;
        assert_eq!(path.progress_pos(), Vec2::new(12.5, 20.0));
        assert_eq!(path.current_seg_target(), Vec2::new(15.0, 20.0));
        assert_relative_eq!(path.total_progress(), 12.5 / 15.0);
        assert_relative_eq!(path.regular_progress(), 7.5 / 10.0);
        assert_eq!(path.current_segment_number(), 2);
    }

    #[test]
    fn test_flipped_and_rotated_orientation() {
        let mut path = LimbPath::new().with_segment(Vec2::new(4.0, 0.0));
        path.set_joint_pos(Vec2::new(20.0, 20.0));
        path.set_h_flip(true);
        assert_eq!(path.current_seg_target(), Vec2::new(16.0, 20.0));

        path.set_h_flip(false);
        path.set_rotation(FRAC_PI_2);
        let target = path.current_seg_target();
        assert_relative_eq!(target.x, 20.0, epsilon = 1e-5);
        assert_relative_eq!(target.y, 16.0, epsilon = 1e-5);
    }

    #[test]
    fn test_current_vel_points_at_target() {
        let scene = scene();
        let mut path = stride();
        path.restart();

        let vel = path.current_vel(Vec2::new(10.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert_relative_eq!(vel.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(vel.y, 2.0, epsilon = 1e-6);

        // Joint motion slows the path speed and is added on top
        path.set_joint_vel(Vec2::new(10.0, 0.0));
        let vel = path.current_vel(Vec2::new(10.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert_relative_eq!(vel.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(vel.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_static_point_vel_is_capped() {
        let scene = scene();
        let mut path = LimbPath::new().with_start_offset(Vec2::new(0.0, 10.0)).with_speeds(1.0, 3.0, 5.0);
        path.set_joint_pos(Vec2::new(20.0, 20.0));

        let near = path.current_vel(Vec2::new(20.0, 29.8), &scene, &DEFAULT_SETTINGS);
        // 0.2 px = 0.01 m, closed over 20 ms
        assert_relative_eq!(near.y, 0.5, epsilon = 1e-4);

        let far = path.current_vel(Vec2::new(20.0, 20.0), &scene, &DEFAULT_SETTINGS);
        assert_relative_eq!(far.length(), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_time_chunks_share_frame_budget() {
        let scene = scene();
        let mut path = stride();
        path.restart();
        path.set_frame_time(1.0);

        // 5 px is 0.25 m, 0.125 s at 2 m/s
        let chunk = path.next_time_chunk(Vec2::new(10.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert_relative_eq!(chunk, 0.125, epsilon = 1e-6);
        assert_relative_eq!(path.time_left(), 0.875, epsilon = 1e-6);

        path.set_frame_time(0.05);
        let chunk = path.next_time_chunk(Vec2::new(10.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert_relative_eq!(chunk, 0.05);
        assert!(path.frame_done());
    }

    #[test]
    fn test_static_point_takes_all_time() {
        let scene = scene();
        let mut path = LimbPath::new();
        path.set_frame_time(0.3);
        assert_eq!(path.next_time_chunk(Vec2::ZERO, &scene, &DEFAULT_SETTINGS), 0.3);
        assert!(path.frame_done());
    }

    #[test]
    fn test_report_progress_advances_and_ends() {
        let scene = scene();
        let mut path = stride();
        path.restart();

        path.report_progress(Vec2::new(10.0, 12.0), &scene, &DEFAULT_SETTINGS);
        assert_relative_eq!(path.seg_progress(), 0.4, epsilon = 1e-6);
        assert!(!path.path_ended());

        path.report_progress(Vec2::new(10.0, 14.0), &scene, &DEFAULT_SETTINGS);
        assert_eq!(path.current_segment_number(), 1, "Within reach of the target");
        assert_eq!(path.seg_progress(), 0.0);

        path.current = 2;
        path.report_progress(Vec2::new(14.0, 20.0), &scene, &DEFAULT_SETTINGS);
        assert!(path.path_ended());
        assert_relative_eq!(path.seg_progress(), 0.8, epsilon = 1e-6);
        assert_eq!(path.current_segment_number(), 0, "Ended paths report no segment");
    }

    #[test]
    fn test_stalled_segment_terminates() {
        let scene = scene();
        let mut path = stride();
        path.restart();

        // 5 px at 2 m/s is 125 ms, so 250 ms on it counts as a stall
        path.set_frame_time(0.2);
        path.report_progress(Vec2::new(10.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert!(!path.path_ended());

        path.set_frame_time(0.1);
        path.report_progress(Vec2::new(10.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert!(path.path_ended());
        assert_eq!(path.current, 2);
        assert_eq!(path.seg_progress(), 1.0);
    }

    #[test]
    fn test_static_point_ends_on_arrival() {
        let scene = scene();
        let mut path = LimbPath::new().with_start_offset(Vec2::new(0.0, 4.0));
        path.set_joint_pos(Vec2::new(8.0, 8.0));
        path.report_progress(Vec2::new(8.0, 10.0), &scene, &DEFAULT_SETTINGS);
        assert!(!path.path_ended());
        path.report_progress(Vec2::new(8.0, 11.5), &scene, &DEFAULT_SETTINGS);
        assert!(path.path_ended());
    }

    #[test]
    fn test_push_force_escalates_with_segment_time() {
        let mut path = stride();
        path.restart();
        assert_relative_eq!(path.push_force(&DEFAULT_SETTINGS), 100.0);

        path.set_frame_time(0.25);
        assert_relative_eq!(path.push_force(&DEFAULT_SETTINGS), 150.0, epsilon = 1e-3);
        assert_relative_eq!(path.default_push_force(), 100.0);
    }

    #[test]
    fn test_speed_selection() {
        let mut path = stride();
        path.set_speed_index(-3);
        assert_eq!(path.which_speed(), Speed::Slow);
        path.set_speed_index(7);
        assert_eq!(path.which_speed(), Speed::Fast);
        assert_eq!(path.speed(), 4.0);

        path.set_speed_index(1);
        path.override_speed(Speed::Fast, 9.0);
        assert_eq!(path.speed(), 2.0, "Only the named preset changes");
        assert_eq!(path.speed_of(Speed::Fast), 9.0);
    }

    #[test]
    fn test_terminate_and_restart() {
        let mut path = stride();
        path.restart();
        assert!(path.path_is_at_start());

        path.terminate();
        assert!(path.path_ended());
        assert!(!path.path_is_at_start());
        assert_eq!(path.current, 2);

        path.restart();
        assert!(path.path_is_at_start());
        assert!(!path.path_ended());
    }

    #[test]
    fn test_foot_collisions_disabled_near_end() {
        let mut path = stride().with_foot_collisions_disabled_segment(1);
        path.restart();
        assert!(!path.foot_collisions_should_be_disabled());

        path.current = 2;
        assert!(path.foot_collisions_should_be_disabled());

        let never = stride();
        assert!(!never.foot_collisions_should_be_disabled());
    }

    #[test]
    fn test_restart_free_stops_at_obstacle() {
        let mut scene = scene();
        scene.fill_rect(0, 17, 64, 10, ROCK);
        let objects = ObjectRegistry::new(64, 64);
        let mut path = stride();
        let mut limb_pos = Vec2::ZERO;

        assert!(path.restart_free(&mut limb_pos, &scene, &objects, &DEFAULT_SETTINGS, None, None));
        assert!(!path.path_ended());
        assert_eq!(path.current, 1, "Second lead-in segment meets the ground");
        assert_relative_eq!(path.seg_progress(), 0.2, epsilon = 1e-6);
        assert_eq!(limb_pos, Vec2::new(10.0, 16.0));
    }

    #[test]
    fn test_restart_free_clear_start_uses_regular_segment() {
        let scene = scene();
        let objects = ObjectRegistry::new(64, 64);
        let mut path = stride();
        let mut limb_pos = Vec2::ZERO;

        assert!(path.restart_free(&mut limb_pos, &scene, &objects, &DEFAULT_SETTINGS, None, None));
        assert_eq!(path.current, 2);
        assert_eq!(path.seg_progress(), 0.0);
        assert_eq!(limb_pos, Vec2::new(10.0, 20.0));
    }

    #[test]
    fn test_restart_free_fails_when_buried() {
        let mut scene = scene();
        scene.fill_rect(0, 0, 64, 64, ROCK);
        let objects = ObjectRegistry::new(64, 64);
        let mut path = stride();
        path.terminate();
        let mut limb_pos = Vec2::new(1.0, 1.0);

        assert!(!path.restart_free(&mut limb_pos, &scene, &objects, &DEFAULT_SETTINGS, None, None));
        assert!(path.path_ended());
        assert_eq!(path.current, 2, "State restored");
        assert_eq!(path.seg_progress(), 1.0);
    }

    #[test]
    fn test_restart_free_static_point_drops_onto_ground() {
        let mut scene = scene();
        scene.fill_rect(0, 42, 64, 10, ROCK);
        let objects = ObjectRegistry::new(64, 64);
        let mut path = LimbPath::new().with_start_offset(Vec2::new(0.0, 4.0));
        path.set_joint_pos(Vec2::new(30.0, 40.0));
        let mut limb_pos = Vec2::ZERO;

        assert!(path.restart_free(&mut limb_pos, &scene, &objects, &DEFAULT_SETTINGS, None, None));
        assert_eq!(limb_pos, Vec2::new(30.0, 41.0));
    }

    #[test]
    fn test_from_reference_starts_ended() {
        let mut original = stride();
        original.restart();
        let copy = LimbPath::from_reference(&original);
        assert!(copy.path_ended());
        assert_eq!(copy.segments(), original.segments());
        assert_eq!(copy.speed(), 2.0);
    }

    #[test]
    fn test_draw_debug_plots_segments() {
        let mut path = stride();
        path.set_joint_pos(Vec2::new(2.0, 2.0));
        let mut canvas = DebugCanvas::new(16, 16);
        path.draw_debug(&mut canvas, 6);
        assert_eq!(canvas.pixel(2, 7), Some(6));
        assert_eq!(canvas.pixel(5, 12), Some(6));
        assert_eq!(canvas.pixel(9, 9), Some(0));
    }
}
