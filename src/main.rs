use std::time::Duration;

use anyhow::{Context, Result};
use glam::Vec2;
use log::info;

use rte_atoms::core::{PhysicsSettings, DEFAULT_SETTINGS};
use rte_atoms::engine::physics::DebugCanvas;
use rte_atoms::engine::scene::TerrainQuery;
use rte_atoms::game::DemoWorld;

const FRAMES: u32 = 600;

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting atom physics demo...");

    // Optional settings file, then an optional path for a debug snapshot
    let mut args = std::env::args().skip(1);
    let settings: PhysicsSettings = match args.next() {
        Some(path) => PhysicsSettings::load(&path).with_context(|| format!("Loading settings from {}", path))?,
        None => DEFAULT_SETTINGS,
    };
    let snapshot = args.next();

    let mut world = DemoWorld::demo(settings, 0x5eed);
    let frame_time = Duration::from_millis(17);

    for frame in 1..=FRAMES {
        world.run_frame(frame_time);

        if frame % 60 == 0 {
            let crate_pos = world.bodies().first().map(|body| body.state().pos);
            let walker_pos = world.walkers().first().map(|walker| walker.torso().pos);
            info!(
                "t={:.2}s particles={} crate={:?} walker={:?}",
                world.clock().sim_time(),
                world.particles().len(),
                crate_pos,
                walker_pos
            );
        }
    }

    if let Some(path) = snapshot {
        let scene = world.scene();
        let mut canvas = DebugCanvas::new(scene.width() as u32, scene.height() as u32);
        for y in 0..scene.height() {
            for x in 0..scene.width() {
                let material = scene.material_at(x, y);
                if !material.is_air() {
                    canvas.draw_point(Vec2::new(x as f32, y as f32), material.0);
                }
            }
        }
        for body in world.bodies() {
            body.group().draw_debug(&mut canvas, body.state(), false, 255);
        }
        for walker in world.walkers() {
            let leg = walker.leg();
            leg.group().draw_debug(&mut canvas, walker.torso(), true, 200);
            if let Some(stride) = leg.path() {
                stride.draw_debug(&mut canvas, 128);
            }
        }
        canvas.save(&path).with_context(|| format!("Writing snapshot to {}", path))?;
        info!("Saved debug snapshot to {}", path);
    }

    info!("Demo finished after {} simulation steps", world.clock().update_count());
    Ok(())
}
