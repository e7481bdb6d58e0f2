// src/allocator.rs

use crate::store::ObservationStore;
use crate::types::{
    round2, Allocation, AllocatorConfig, Direction, LaneType, LaneWeights, Mode,
};
use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Weighted-fair green-time allocation under a fixed cycle budget.
///
/// Each direction's demand is the lane-weighted sum of its most recent
/// observations. Shares are proportional to demand, floored at `min_green`,
/// then uniformly rescaled when the floor pushes the total over the cycle.
pub struct SignalAllocator {
    cycle_time: f64,
    min_green: f64,
    history_depth: usize,
    weights: LaneWeights,
    mode: Mode,
}

/// Outcome of one batch run. Failed intersections never abort the batch;
/// they are reported here attributed by name.
#[derive(Debug, Default)]
pub struct AllocationReport {
    pub allocations: BTreeMap<String, BTreeMap<Direction, f64>>,
    pub failures: BTreeMap<String, String>,
}

impl SignalAllocator {
    pub fn new(config: &AllocatorConfig, mode: Mode) -> Self {
        Self {
            cycle_time: config.cycle_time_s,
            min_green: config.min_green_s,
            history_depth: config.history_depth,
            weights: config.lane_weights,
            mode,
        }
    }

    /// Lane-weighted demand for one approach. Missing observations count
    /// as zero demand, not as an error.
    fn weighted_load(
        &self,
        store: &dyn ObservationStore,
        intersection: &str,
        direction: Direction,
    ) -> Result<f64> {
        let recent = store.recent(intersection, direction, None, self.mode, self.history_depth)?;

        let mut per_lane: BTreeMap<LaneType, u32> = BTreeMap::new();
        for observation in &recent {
            *per_lane.entry(observation.lane).or_insert(0) += observation.vehicle_count;
        }

        Ok(per_lane
            .iter()
            .map(|(lane, count)| f64::from(*count) * self.weights.weight(*lane))
            .sum())
    }

    /// Compute and record green times for every direction at one intersection.
    pub fn allocate(
        &self,
        store: &dyn ObservationStore,
        intersection: &str,
    ) -> Result<BTreeMap<Direction, f64>> {
        let mut loads: BTreeMap<Direction, f64> = BTreeMap::new();
        for direction in Direction::ALL {
            loads.insert(
                direction,
                self.weighted_load(store, intersection, direction)?,
            );
        }
        let total: f64 = loads.values().sum();

        let mut allocation: BTreeMap<Direction, f64> = if total == 0.0 {
            // No demand signal anywhere: equal share so nothing starves
            Direction::ALL
                .iter()
                .map(|d| (*d, round2(self.cycle_time / 4.0)))
                .collect()
        } else {
            loads
                .iter()
                .map(|(d, load)| {
                    let share = round2(load / total * self.cycle_time).max(self.min_green);
                    (*d, share)
                })
                .collect()
        };

        // The min_green floor can overcommit the cycle; shrink uniformly.
        // This may push low-demand directions back below min_green, which
        // is the accepted trade-off.
        let committed: f64 = allocation.values().sum();
        if committed > self.cycle_time {
            let factor = self.cycle_time / committed;
            for share in allocation.values_mut() {
                *share = round2(*share * factor);
            }
        }

        debug!(
            intersection,
            total_load = total,
            "allocated {:?}",
            allocation
        );

        let generated_at = Utc::now();
        for (direction, green_time) in &allocation {
            store.record_allocation(Allocation {
                intersection: intersection.to_string(),
                direction: *direction,
                green_time_s: *green_time,
                generated_at,
            })?;
        }

        Ok(allocation)
    }

    /// Run the allocator for every known intersection, isolating failures.
    pub fn run_for_all(&self, store: &dyn ObservationStore) -> Result<AllocationReport> {
        let mut report = AllocationReport::default();
        for intersection in store.intersections()? {
            match self.allocate(store, &intersection.name) {
                Ok(allocation) => {
                    report.allocations.insert(intersection.name, allocation);
                }
                Err(e) => {
                    error!("allocation failed for {}: {:#}", intersection.name, e);
                    report.failures.insert(intersection.name, format!("{:#}", e));
                }
            }
        }
        info!(
            completed = report.allocations.len(),
            failed = report.failures.len(),
            "allocation batch finished"
        );
        Ok(report)
    }
}
