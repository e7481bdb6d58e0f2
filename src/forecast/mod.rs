// src/forecast/mod.rs

pub mod ema;
pub mod learned;

pub use ema::EmaForecaster;
pub use learned::{LearnedForecaster, ModelHandle};

use crate::store::ObservationStore;
use crate::types::Forecast;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// A queue-length estimator. Implementations must return a non-negative
/// estimate per "{direction}-{lane}" key, or an empty map when they cannot
/// produce estimates at all (the composite treats that as "fall back").
pub trait Forecaster: Send + Sync {
    fn predict(&self, store: &dyn ObservationStore, intersection: &str) -> Result<Forecast>;

    /// Predict for every known intersection, isolating per-intersection
    /// failures the same way the allocator batch does.
    fn run_for_all(&self, store: &dyn ObservationStore) -> Result<ForecastReport> {
        let mut report = ForecastReport::default();
        for intersection in store.intersections()? {
            match self.predict(store, &intersection.name) {
                Ok(forecast) => {
                    report.forecasts.insert(intersection.name, forecast);
                }
                Err(e) => {
                    error!("forecast failed for {}: {:#}", intersection.name, e);
                    report.failures.insert(intersection.name, format!("{:#}", e));
                }
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Default)]
pub struct ForecastReport {
    pub forecasts: BTreeMap<String, Forecast>,
    pub failures: BTreeMap<String, String>,
}

/// Strict two-tier fallback: the primary's result is used iff it is
/// non-empty, otherwise the fallback's. The two are never blended.
pub struct CompositeForecaster {
    primary: Box<dyn Forecaster>,
    fallback: Box<dyn Forecaster>,
}

impl CompositeForecaster {
    pub fn new(primary: Box<dyn Forecaster>, fallback: Box<dyn Forecaster>) -> Self {
        Self { primary, fallback }
    }
}

impl Forecaster for CompositeForecaster {
    fn predict(&self, store: &dyn ObservationStore, intersection: &str) -> Result<Forecast> {
        let primary = self.primary.predict(store, intersection)?;
        if !primary.is_empty() {
            return Ok(primary);
        }
        debug!(intersection, "primary forecaster empty, using fallback");
        self.fallback.predict(store, intersection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::anyhow;

    struct FixedForecaster(Forecast);

    impl Forecaster for FixedForecaster {
        fn predict(&self, _: &dyn ObservationStore, _: &str) -> Result<Forecast> {
            Ok(self.0.clone())
        }
    }

    struct ErrForecaster;

    impl Forecaster for ErrForecaster {
        fn predict(&self, _: &dyn ObservationStore, _: &str) -> Result<Forecast> {
            Err(anyhow!("store unreachable"))
        }
    }

    fn forecast(pairs: &[(&str, f64)]) -> Forecast {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_composite_prefers_non_empty_primary() {
        let composite = CompositeForecaster::new(
            Box::new(FixedForecaster(forecast(&[("N-straight", 12.5)]))),
            Box::new(FixedForecaster(forecast(&[("N-straight", 99.0)]))),
        );
        let store = MemoryStore::new();
        let result = composite.predict(&store, "X").unwrap();
        assert_eq!(result["N-straight"], 12.5);
    }

    #[test]
    fn test_composite_falls_back_on_empty_primary() {
        let composite = CompositeForecaster::new(
            Box::new(FixedForecaster(Forecast::new())),
            Box::new(FixedForecaster(forecast(&[("E-left", 3.0)]))),
        );
        let store = MemoryStore::new();
        let result = composite.predict(&store, "X").unwrap();
        assert_eq!(result["E-left"], 3.0);
    }

    #[test]
    fn test_composite_propagates_primary_errors() {
        // Infrastructure failures are not fallback conditions
        let composite = CompositeForecaster::new(
            Box::new(ErrForecaster),
            Box::new(FixedForecaster(forecast(&[("E-left", 3.0)]))),
        );
        let store = MemoryStore::new();
        assert!(composite.predict(&store, "X").is_err());
    }

    #[test]
    fn test_run_for_all_isolates_failures() {
        let store = MemoryStore::new();
        store.register_intersection("A", None).unwrap();
        store.register_intersection("B", None).unwrap();

        let report = ErrForecaster.run_for_all(&store).unwrap();
        assert!(report.forecasts.is_empty());
        assert_eq!(report.failures.len(), 2);
    }
}
