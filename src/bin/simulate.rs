//! Headless simulation driver.
//!
//! Stands in for the rendering loop: ticks an agent at a fixed frame rate and
//! prints each `StepResult` as one JSON line on stdout.
//!
//! # Environment Variables
//!
//! - `AFFECT_CONFIG` — agent config file, YAML or `.json` (default: built-in defaults)
//! - `AFFECT_TICKS` — number of ticks (default: 120)
//! - `AFFECT_TICK_MS` — frame interval in milliseconds (default: 16)
//! - `AFFECT_SEED` — predictor weight and reward-noise seed (default: 7)
//! - `AFFECT_EMOTION_WIDTH` — predictor output width (default: 8)
//! - `RUST_LOG` — tracing filter (default: "info,affective_agent=debug")
//!
//! # Usage
//!
//! ```bash
//! AFFECT_TICKS=600 cargo run --bin simulate > trajectory.jsonl
//! ```

use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use affective_agent::{
    AgentConfig, CpuBackend, DensePredictor, NumericBackend, Simulation, BELIEF_DIM,
};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,affective_agent=debug".into()),
        )
        .init();

    let config = match std::env::var("AFFECT_CONFIG") {
        Ok(path) => AgentConfig::from_file(&path)
            .with_context(|| format!("failed to load agent config from {}", path))?,
        Err(_) => AgentConfig::default(),
    };
    let ticks: u64 = env_or("AFFECT_TICKS", 120)?;
    let tick_ms: u64 = env_or("AFFECT_TICK_MS", 16)?;
    let seed: u64 = env_or("AFFECT_SEED", 7)?;
    let emotion_width: usize = env_or("AFFECT_EMOTION_WIDTH", 8)?;

    // Startup handshake: the backend is ready before the agent exists.
    let backend = CpuBackend::ready(None);
    let predictor = DensePredictor::seeded(BELIEF_DIM + emotion_width + 2, emotion_width, seed);
    let mut sim = Simulation::start(config, backend.clone(), Box::new(predictor))
        .context("failed to start simulation")?;

    tracing::info!("simulation {} running {} ticks every {}ms", sim.id(), ticks, tick_ms);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut frame = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    for t in 0..ticks {
        frame.tick().await;

        let phase = t as f32 * 0.1;
        let reward = phase.sin() + rng.gen_range(-0.25..0.25);
        let context = (t % 4) as f32;
        let observation: Vec<f32> = (0..BELIEF_DIM)
            .map(|i| (phase + i as f32 * 0.05).cos() * 0.5)
            .collect();

        let record = sim.tick(reward, context, Some(&observation))?;
        println!("{}", serde_json::to_string(&record.result)?);
    }

    let summary = sim.teardown();
    tracing::info!(
        "done: {} ticks, {} invalid, trust {:.3} (mean {:.3}), integration {:.3}, live allocations {}",
        summary.ticks,
        summary.invalid_steps,
        summary.trust_score,
        summary.mean_trust,
        summary.integration_param,
        backend.live_allocations()
    );

    Ok(())
}
