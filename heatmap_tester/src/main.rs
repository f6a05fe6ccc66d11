use anyhow::{Context, Result, bail};
use glam::Vec3;
use occupancy_heatmap::pipeline::{HeatmapConfig, HeatmapPipeline, TrackedId};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::env;
use std::path::Path;
use tracing::info;

const AGENT_COUNT: usize = 12;
const FRAME_SECONDS: f32 = 1.0 / 60.0;
const AGENT_SPEED: f32 = 1.5;

struct Walker {
    id: TrackedId,
    position: Vec3,
    heading: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: heatmap_tester <simulated_seconds> [config.json] [--parallel]");
        return Ok(());
    }
    let seconds: f32 = args[1]
        .parse()
        .with_context(|| format!("invalid duration {:?}", args[1]))?;
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("duration must be positive, got {seconds}");
    }
    let parallel = args.iter().any(|arg| arg == "--parallel");
    let config = match args.iter().skip(2).find(|arg| !arg.starts_with("--")) {
        Some(path) => HeatmapConfig::from_json_file(Path::new(path))?,
        None => HeatmapConfig::default(),
    };

    // --- 2. Pipeline Initialization ---
    let extent = config.volume_extent;
    let center = config.volume_center;
    let mut pipeline = HeatmapPipeline::new(config)?;
    let mut rng = SmallRng::seed_from_u64(0x5EED_0F_4EA7);

    let mut walkers: Vec<Walker> = (0..AGENT_COUNT)
        .map(|_| {
            let position = center
                + Vec3::new(
                    rng.random_range(-0.5..0.5) * extent.x,
                    0.0,
                    rng.random_range(-0.5..0.5) * extent.z,
                );
            Walker {
                id: pipeline.tracked_mut().register(position),
                position,
                heading: rng.random_range(0.0..std::f32::consts::TAU),
            }
        })
        .collect();

    // --- 3. Simulation Loop ---
    let mut elapsed = 0.0f32;
    while elapsed < seconds {
        // Irregular frame pacing, so sampling ticks land late by varying amounts.
        let delta = FRAME_SECONDS * rng.random_range(0.5..1.5);
        for walker in &mut walkers {
            walker.heading += rng.random_range(-0.3..0.3);
            let step = Vec3::new(walker.heading.cos(), 0.0, walker.heading.sin()) * AGENT_SPEED * delta;
            walker.position = (walker.position + step).clamp(
                center - extent * 0.6,
                center + extent * 0.6,
            );
            pipeline.tracked_mut().set_position(walker.id, walker.position);
            pipeline
                .tracked_mut()
                .set_active(walker.id, rng.random_range(0.0..1.0) > 0.05);
        }
        pipeline.update(delta)?;
        elapsed += delta;
    }

    // --- 4. Finalize ---
    let image = if parallel {
        pipeline.finalize_parallel().await?
    } else {
        pipeline.finalize()?
    };
    info!(
        bytes = image.len(),
        path = %pipeline.accumulator().output_path().display(),
        "heatmap written"
    );
    println!(
        "Processing complete. Output saved to {}",
        pipeline.accumulator().output_path().display()
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
