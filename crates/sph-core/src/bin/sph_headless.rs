//! Headless driver: runs a fluid scene for a number of frames and prints a
//! summary line per second of simulated time.
//!
//! Usage: sph-headless [2d|3d] [settings.json] [frames]

use std::error::Error;
use std::path::Path;

use glam::{Vec2, Vec3};
use log::info;
use sph_core::{
    BoxSpawner, Device, Dim2, Dim3, ObstacleMesh, Pipeline, SimulationSettings, Space, Spawner,
};

const FRAME_TIME: f32 = 1.0 / 60.0;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let dims = args.get(1).map(String::as_str).unwrap_or("3d");
    let settings_path = args.get(2).filter(|a| a.as_str() != "-");
    let frames: u64 = match args.get(3) {
        Some(f) => f.parse()?,
        None => 600,
    };

    match dims {
        "2d" => {
            let settings = match settings_path {
                Some(path) => SimulationSettings::<Dim2>::load_json(Path::new(path))?,
                None => SimulationSettings::default(),
            };
            let spawn = BoxSpawner::<Dim2>::new(Vec2::new(-3.0, 0.5), Vec2::new(7.0, 7.0), 4096)
                .with_jitter(0.02)
                .spawn_data();
            let wedge = ObstacleMesh::<Dim2>::new(
                vec![Vec2::new(2.0, -4.6), Vec2::new(8.5, -4.6), Vec2::new(8.5, -1.0)],
                vec![0, 1, 2],
            )?;
            run(Pipeline::new(Device::new(), settings, spawn, Some(&wedge))?, frames)
        }
        "3d" => {
            let settings = match settings_path {
                Some(path) => SimulationSettings::<Dim3>::load_json(Path::new(path))?,
                None => SimulationSettings::default(),
            };
            let spawn = BoxSpawner::<Dim3>::new(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(3.0), 16_384)
                .with_jitter(0.01)
                .spawn_data();
            run(Pipeline::new(Device::new(), settings, spawn, Some(&ramp()?))?, frames)
        }
        other => Err(format!("unknown dimensionality `{}`, expected 2d or 3d", other).into()),
    }
}

/// A tilted square below the spawn box.
fn ramp() -> Result<ObstacleMesh<Dim3>, Box<dyn Error>> {
    let local = ObstacleMesh::<Dim3>::new(
        vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ],
        vec![0, 1, 2, 0, 2, 3],
    )?;
    let rotation = glam::Quat::from_rotation_z(0.4);
    Ok(local.transformed(|v| rotation * (v * 3.0) + Vec3::new(0.0, -2.0, 0.0)))
}

fn run<S: Space>(mut pipeline: Pipeline<S>, frames: u64) -> Result<(), Box<dyn Error>> {
    let steps = pipeline.subscribe();
    for frame in 1..=frames {
        let report = pipeline.tick(FRAME_TIME)?;
        if frame % 60 == 0 {
            let densities = pipeline.densities();
            let mean = densities.iter().map(|d| d.x).sum::<f32>() / densities.len().max(1) as f32;
            println!(
                "frame {:>5}: {} substeps total, dt {:.5}, mean density {:.2}",
                frame, report.total_substeps, report.delta_time, mean
            );
        }
    }
    info!("{} step notifications", steps.try_iter().count());

    let device = pipeline.shutdown();
    info!("{} buffers still live after shutdown", device.live_buffers());
    Ok(())
}
