//! SDE - headless demo driver
//!
//! Spawns a population of bodies, then drives the demo systems through a
//! fixed-timestep clock until the configured number of ticks has run.

mod demo;
mod settings;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sde_core::SimTime;
use sde_ecs::World;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use demo::Population;
use settings::{DriverSettings, LoggingSettings, SettingsSource};

fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(settings.show_target)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn main() -> Result<()> {
    let (settings, source) = DriverSettings::load();
    init_logging(&settings.logging)?;

    match &source {
        SettingsSource::File(path) => info!("Loaded settings from {:?}", path),
        SettingsSource::Defaults(reason) => {
            info!("Using default settings: {}", reason);
            match settings.save() {
                Ok(path) => info!("Wrote default settings to {:?}", path),
                Err(e) => warn!("Could not write default settings: {:#}", e),
            }
        }
    }

    let sim = &settings.simulation;
    let seed = sim.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(
        "Starting SDE demo: {} bodies, {} ticks, seed {}",
        sim.entity_count, sim.ticks, seed
    );

    let world = World::new();
    let mut population = Population::spawn(&world, sim, &mut rng);
    population.initialize();

    let mut time = SimTime::new(settings.time);
    let (mut schedule, tally) = demo::schedule(&world, sim, time.config.fixed_timestep);
    info!("Schedule: {}", schedule.names().join(" -> "));

    let ticks = demo::run(&world, &mut schedule, &mut population, &mut time, sim);

    info!(
        "Finished after {} ticks ({:.2}s simulated): {} bodies left ({} registered), {} collisions, {} expired",
        ticks,
        time.elapsed,
        population.len(),
        world.entity_count(),
        tally.collisions.get(),
        tally.expired.get()
    );
    Ok(())
}
