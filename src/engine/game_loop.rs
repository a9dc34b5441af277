/// Simulation timing
///
/// Implements a fixed timestep clock for the physics update. Wall-clock frame
/// time is accumulated and handed out as whole simulation steps, so travel calls
/// always see the same step length regardless of how fast frames arrive.
use std::time::{Duration, Instant};

/// Seconds per simulation step
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;
const FIXED_TIMESTEP_DURATION: Duration = Duration::from_micros(16_667);

/// Steps handed out per frame at most; any backlog past this is dropped
const MAX_PHYSICS_STEPS: u32 = 5;

/// Fixed timestep simulation clock
pub struct SimClock {
    /// Wall time not yet turned into steps
    accumulator: Duration,

    /// When `begin_frame` last ran
    last_frame_time: Instant,

    paused: bool,

    /// Frames fed in, paused ones included
    frame_count: u64,

    /// Steps handed out
    update_count: u64,

    /// Simulated seconds handed out so far
    sim_time: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            accumulator: Duration::ZERO,
            last_frame_time: Instant::now(),
            paused: false,
            frame_count: 0,
            update_count: 0,
            sim_time: 0.0,
        }
    }

    /// Begin a new frame from wall-clock time, returns the number of fixed updates to run
    pub fn begin_frame(&mut self) -> u32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time);
        self.last_frame_time = now;
        self.advance(frame_time)
    }

    /// Feed `frame_time` into the clock, returns the number of fixed updates to run.
    ///
    /// Headless runs call this directly with a synthetic frame time.
    pub fn advance(&mut self, frame_time: Duration) -> u32 {
        self.frame_count += 1;

        if self.paused {
            return 0;
        }

        self.accumulator += frame_time;

        let mut updates = 0;
        while self.accumulator >= FIXED_TIMESTEP_DURATION && updates < MAX_PHYSICS_STEPS {
            self.accumulator -= FIXED_TIMESTEP_DURATION;
            updates += 1;
        }

        if updates == MAX_PHYSICS_STEPS && self.accumulator >= FIXED_TIMESTEP_DURATION {
            log::debug!("Dropping {:?} of simulation backlog", self.accumulator);
            self.accumulator = Duration::ZERO;
        }

        self.update_count += updates as u64;
        self.sim_time += updates as f64 * FIXED_TIMESTEP as f64;
        updates
    }

    /// Step length in seconds
    pub fn fixed_timestep(&self) -> f32 {
        FIXED_TIMESTEP
    }

    /// Fraction of a step left in the accumulator
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / FIXED_TIMESTEP
    }

    /// Total simulated seconds
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            log::info!("Simulation paused");
        }
    }

    /// Resume without replaying the time spent paused
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.accumulator = Duration::ZERO;
            log::info!("Simulation resumed");
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Stopwatch over simulated time.
///
/// Only advances when told to, so a paused or slowed simulation never trips
/// time-based rules early.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimTimer {
    elapsed_ms: f64,
}

impl SimTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from zero again
    pub fn reset(&mut self) {
        self.elapsed_ms = 0.0;
    }

    /// Add `seconds` of simulated time
    pub fn advance(&mut self, seconds: f32) {
        self.elapsed_ms += seconds as f64 * 1000.0;
    }

    /// Simulated milliseconds since the last reset
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Check if more than `ms` simulated milliseconds have passed
    pub fn is_past_ms(&self, ms: f64) -> bool {
        self.elapsed_ms > ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clock_creation() {
        let clock = SimClock::new();
        assert_eq!(clock.frame_count(), 0);
        assert_eq!(clock.update_count(), 0);
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_fixed_timestep() {
        let clock = SimClock::new();
        assert_eq!(clock.fixed_timestep(), FIXED_TIMESTEP);
        assert!((clock.fixed_timestep() - 1.0 / 60.0).abs() < 0.0001);
    }

    #[test]
    fn test_toggle_pause() {
        let mut clock = SimClock::new();
        clock.toggle_pause();
        assert!(clock.is_paused());

        clock.toggle_pause();
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_paused_no_updates() {
        let mut clock = SimClock::new();
        clock.pause();

        let updates = clock.advance(Duration::from_millis(50));
        assert_eq!(updates, 0);
        assert_eq!(clock.frame_count(), 1, "Paused frames still count");
    }

    #[test]
    fn test_accumulates_partial_frames() {
        let mut clock = SimClock::new();
        assert_eq!(clock.advance(Duration::from_millis(10)), 0);
        assert_eq!(clock.advance(Duration::from_millis(10)), 1, "20ms holds one step");
        assert_eq!(clock.advance(Duration::from_millis(35)), 2);
        assert_eq!(clock.update_count(), 3);
        assert_relative_eq!(clock.sim_time(), 3.0 / 60.0, epsilon = 1e-6);
        assert!(clock.alpha() >= 0.0 && clock.alpha() <= 1.0);
    }

    #[test]
    fn test_max_physics_steps_limit() {
        let mut clock = SimClock::new();

        // 300ms would allow 18 updates
        let updates = clock.advance(Duration::from_millis(300));
        assert_eq!(updates, MAX_PHYSICS_STEPS);

        // The backlog was dropped rather than replayed
        assert_eq!(clock.advance(Duration::ZERO), 0);
    }

    #[test]
    fn test_sim_timer() {
        let mut timer = SimTimer::new();
        timer.advance(0.25);
        timer.advance(0.25);
        assert_relative_eq!(timer.elapsed_ms(), 500.0, epsilon = 1e-6);
        assert!(timer.is_past_ms(499.0));
        assert!(!timer.is_past_ms(500.0));

        timer.reset();
        assert_eq!(timer.elapsed_ms(), 0.0);
    }
}
