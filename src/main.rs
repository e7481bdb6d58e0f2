// src/main.rs

mod allocator;
mod config;
mod corridor;
mod forecast;
mod store;
mod types;

use allocator::SignalAllocator;
use anyhow::Result;
use chrono::{Duration, Utc};
use corridor::CorridorSynchronizer;
use forecast::{CompositeForecaster, EmaForecaster, Forecaster, LearnedForecaster};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use store::{MemoryStore, ObservationStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use types::{Config, Direction, LaneType, Observation};

fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("🚦 Signal Timing Engine starting (mode: {})", config.mode);

    let store = MemoryStore::new();
    seed_demo_observations(&store, &config)?;
    info!("✓ Demo observations seeded");

    // ── Green-time allocation ────────────────────────────────────────────
    let allocator = SignalAllocator::new(&config.allocator, config.mode);
    let report = allocator.run_for_all(&store)?;
    for (intersection, allocation) in &report.allocations {
        let summary: Vec<String> = allocation
            .iter()
            .map(|(direction, green)| format!("{}={:.2}s", direction, green))
            .collect();
        info!("{}: {}", intersection, summary.join(" "));
    }
    for (intersection, reason) in &report.failures {
        warn!("{}: allocation skipped ({})", intersection, reason);
    }

    // ── Queue forecasting ────────────────────────────────────────────────
    let learned = LearnedForecaster::new(&config.forecast, config.mode);
    if learned.is_available() {
        info!("✓ Learned forecaster ready");
    } else {
        info!("⚪ Learned forecaster unavailable, EMA only");
    }
    let composite = CompositeForecaster::new(
        Box::new(learned),
        Box::new(EmaForecaster::new(&config.forecast, config.mode)),
    );

    let forecasts = composite.run_for_all(&store)?;
    for (intersection, forecast) in &forecasts.forecasts {
        let busiest = forecast
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(key, estimate)| format!("{} ({:.2})", key, estimate))
            .unwrap_or_else(|| "none".to_string());
        info!(
            "{}: {} keys forecast, busiest approach {}",
            intersection,
            forecast.len(),
            busiest
        );
    }

    // ── Corridor synchronization ─────────────────────────────────────────
    let known: BTreeSet<String> = store
        .intersections()?
        .into_iter()
        .map(|i| i.name)
        .collect();
    let synchronizer = CorridorSynchronizer::new(config.corridor.approach_speed_kmh);
    for plan in synchronizer.plan(&config.corridor.groups, &known) {
        info!("corridor '{}' (master: {})", plan.group, plan.master);
        for row in &plan.rows {
            info!(
                "  {} | {:.0} m | travel {:.1}s | offset {:+}s{}",
                row.node,
                row.distance_m,
                row.travel_time_s,
                row.offset_s,
                if row.exists { "" } else { " (not live)" }
            );
        }
    }

    info!("✓ Cycle complete");
    Ok(())
}

/// Seed the in-memory store with randomized demand, one batch of
/// observations per round for every direction-lane key.
fn seed_demo_observations(store: &MemoryStore, config: &Config) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(config.demo.seed);
    let rounds = config.demo.rounds.max(1);

    for seed in &config.demo.intersections {
        store.register_intersection(&seed.name, seed.location.as_deref())?;
    }

    let base = Utc::now() - Duration::minutes(rounds as i64);
    for round in 0..rounds {
        let timestamp = base + Duration::minutes(round as i64);
        for seed in &config.demo.intersections {
            for direction in Direction::ALL {
                for lane in LaneType::ALL {
                    store.append(Observation {
                        intersection: seed.name.clone(),
                        direction,
                        lane,
                        mode: config.mode,
                        vehicle_count: rng.gen_range(5..=40),
                        timestamp,
                    })?;
                }
            }
        }
    }

    Ok(())
}
