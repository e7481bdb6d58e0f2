// src/forecast/ema.rs

use super::Forecaster;
use crate::store::ObservationStore;
use crate::types::{dir_lane_key, round2, Direction, Forecast, ForecastConfig, LaneType, Mode};
use anyhow::Result;

/// Exponential-moving-average queue estimator.
///
/// Pure function of the observation history: no model artifact, no internal
/// state between calls, so it is always available. Keys with no history
/// estimate to 0.
pub struct EmaForecaster {
    alpha: f64,
    limit: usize,
    mode: Mode,
}

impl EmaForecaster {
    pub fn new(config: &ForecastConfig, mode: Mode) -> Self {
        Self {
            alpha: config.alpha,
            limit: config.history_limit,
            mode,
        }
    }

    /// Seed with the oldest value, then fold forward in time.
    fn smooth(&self, chronological: impl Iterator<Item = f64>) -> Option<f64> {
        chronological.reduce(|ema, value| self.alpha * value + (1.0 - self.alpha) * ema)
    }
}

impl Forecaster for EmaForecaster {
    fn predict(&self, store: &dyn ObservationStore, intersection: &str) -> Result<Forecast> {
        let mut forecast = Forecast::new();

        for direction in Direction::ALL {
            for lane in LaneType::ALL {
                let history =
                    store.recent(intersection, direction, Some(lane), self.mode, self.limit)?;
                let estimate = self
                    .smooth(history.iter().rev().map(|o| f64::from(o.vehicle_count)))
                    .map_or(0.0, round2);
                forecast.insert(dir_lane_key(direction, lane), estimate);
            }
        }

        Ok(forecast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Observation;
    use chrono::{Duration, Utc};

    fn forecaster() -> EmaForecaster {
        EmaForecaster::new(&ForecastConfig::default(), Mode::Normal)
    }

    fn seed_series(store: &MemoryStore, counts: &[u32]) {
        // Oldest first
        let base = Utc::now() - Duration::minutes(counts.len() as i64);
        for (i, count) in counts.iter().enumerate() {
            store
                .append(Observation {
                    intersection: "X".to_string(),
                    direction: Direction::N,
                    lane: LaneType::Straight,
                    mode: Mode::Normal,
                    vehicle_count: *count,
                    timestamp: base + Duration::minutes(i as i64),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_empty_history_estimates_zero_for_all_keys() {
        let store = MemoryStore::new();
        let forecast = forecaster().predict(&store, "X").unwrap();
        assert_eq!(forecast.len(), 12);
        assert!(forecast.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_single_observation_is_its_own_estimate() {
        let store = MemoryStore::new();
        seed_series(&store, &[17]);
        let forecast = forecaster().predict(&store, "X").unwrap();
        assert_eq!(forecast["N-straight"], 17.0);
    }

    #[test]
    fn test_constant_series_stays_at_the_constant() {
        let store = MemoryStore::new();
        seed_series(&store, &[8, 8, 8, 8, 8, 8]);
        let forecast = forecaster().predict(&store, "X").unwrap();
        assert_eq!(forecast["N-straight"], 8.0);
    }

    #[test]
    fn test_smoothing_weights_recent_values() {
        // alpha 0.3 over [10, 20]: 0.3 * 20 + 0.7 * 10 = 13.0
        let store = MemoryStore::new();
        seed_series(&store, &[10, 20]);
        let forecast = forecaster().predict(&store, "X").unwrap();
        assert_eq!(forecast["N-straight"], 13.0);

        // Other keys are untouched
        assert_eq!(forecast["N-left"], 0.0);
        assert_eq!(forecast["S-straight"], 0.0);
    }

    #[test]
    fn test_history_limit_drops_oldest_samples() {
        // 11 samples with limit 10: the huge leading value falls outside
        // the window and cannot skew the estimate upward past the rest.
        let store = MemoryStore::new();
        let mut counts = vec![1000];
        counts.extend(std::iter::repeat(5).take(10));
        seed_series(&store, &counts);

        let forecast = forecaster().predict(&store, "X").unwrap();
        assert_eq!(forecast["N-straight"], 5.0);
    }

    #[test]
    fn test_estimates_are_never_negative() {
        let store = MemoryStore::new();
        seed_series(&store, &[0, 0, 3, 0]);
        let forecast = forecaster().predict(&store, "X").unwrap();
        assert!(forecast.values().all(|v| *v >= 0.0));
    }
}
