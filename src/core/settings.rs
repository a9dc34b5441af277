// Physics tuning constants

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::Path;

use crate::engine::physics::PresetError;

/// Every tunable constant used by atom, atom-group and limb-path motion.
///
/// Distances are in pixels unless noted, times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Pixels per meter of simulated space
    pub pixels_per_meter: f32,

    // Safety caps
    /// Resolved hits allowed in one lone-atom travel call
    pub atom_hit_cap: u32,
    /// Hit steps allowed in one atom-group travel call
    pub group_hit_cap: u32,
    /// Hit legs allowed in one push travel call
    pub push_hit_cap: u32,
    /// Largest per-axis pixel delta a push travel leg may step
    pub push_delta_cap: i32,
    /// Push impulses with a larger component than this are discarded
    pub push_impulse_sanity_cap: f32,

    // Group travel
    /// Largest rotation (radians) a single group travel segment may cover
    pub segment_rotation_limit: f32,

    // Penetration
    /// Air ratio used when an atom starts a segment embedded in terrain
    pub embedded_air_ratio: f32,
    /// Air ratio used when a lone atom sinks into terrain
    pub atom_sink_air_ratio: f32,
    /// Air ratio used when a group atom sinks into terrain
    pub group_sink_air_ratio: f32,
    /// Minimum largest velocity component for sticky materials to adhere
    pub sticky_min_speed: f32,

    // Intersection resolution
    /// Below this normalized inverse mass, the other body is treated as immovable
    pub mos_exit_mass_ratio: f32,
    /// Fraction of atoms buried in terrain that squishes a body
    pub squish_ratio: f32,

    // Limbs
    /// Push force used when a limb flails without a path
    pub flail_push_force: f32,
    /// Distance (pixels) at which a limb counts as having reached its segment target
    pub limb_arrive_distance: f32,
    /// Time constant (seconds) for limbs chasing a static point
    pub static_limb_time: f32,
    /// Multiple of the expected segment time after which a stalled path is terminated
    pub limb_stall_factor: f32,
    /// Segment time (ms) over which the push force escalates by its own size
    pub push_escalation_ms: f32,
    /// Height (pixels) above a static target from which free space is searched
    pub static_restart_lift: f32,
}

/// Default settings used by the engine
pub const DEFAULT_SETTINGS: PhysicsSettings = PhysicsSettings {
    pixels_per_meter: 20.0,
    atom_hit_cap: 100,
    group_hit_cap: 10,
    push_hit_cap: 3,
    push_delta_cap: 1000,
    push_impulse_sanity_cap: 10_000.0,
    segment_rotation_limit: PI / 6.0,
    embedded_air_ratio: 0.5,
    atom_sink_air_ratio: 0.65,
    group_sink_air_ratio: 1.0,
    sticky_min_speed: 0.5,
    mos_exit_mass_ratio: 0.33,
    squish_ratio: 0.75,
    flail_push_force: 100.0,
    limb_arrive_distance: 1.5,
    static_limb_time: 0.020,
    limb_stall_factor: 2.0,
    push_escalation_ms: 500.0,
    static_restart_lift: 24.0,
};

impl PhysicsSettings {
    /// Meters per pixel
    #[inline]
    pub fn meters_per_pixel(&self) -> f32 {
        1.0 / self.pixels_per_meter
    }

    /// Parse settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize settings to pretty JSON
    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PresetError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write settings to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PresetError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        DEFAULT_SETTINGS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_per_pixel() {
        let settings = PhysicsSettings::default();
        assert_eq!(settings.pixels_per_meter, 20.0);
        assert!((settings.meters_per_pixel() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut settings = PhysicsSettings::default();
        settings.atom_hit_cap = 42;
        settings.squish_ratio = 0.5;

        let json = settings.to_json().expect("serialize");
        let loaded = PhysicsSettings::from_json(&json).expect("deserialize");
        assert_eq!(loaded, settings, "Settings should survive a JSON round trip");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let loaded = PhysicsSettings::from_json(r#"{ "group_hit_cap": 4 }"#).expect("parse");
        assert_eq!(loaded.group_hit_cap, 4);
        assert_eq!(loaded.atom_hit_cap, DEFAULT_SETTINGS.atom_hit_cap);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(PhysicsSettings::from_json("not json").is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("rte-atoms-settings-{}.json", std::process::id()));
        let mut settings = PhysicsSettings::default();
        settings.flail_push_force = 250.0;

        settings.save(&path).expect("save");
        let loaded = PhysicsSettings::load(&path).expect("load");
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, settings);
    }
}
