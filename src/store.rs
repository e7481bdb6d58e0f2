// src/store.rs

use crate::types::{Allocation, Direction, Intersection, LaneType, Mode, Observation};
use anyhow::{anyhow, Result};
use std::sync::RwLock;

/// Narrow interface to whatever holds observation and allocation history.
///
/// The engine only ever reads the most recent few observations per key and
/// appends allocation rows; everything else (retention, indexing, real
/// persistence) belongs to the backing store.
pub trait ObservationStore: Send + Sync {
    fn intersections(&self) -> Result<Vec<Intersection>>;

    /// Most recent observations for a key, newest first. `lane: None`
    /// matches every lane at the direction.
    fn recent(
        &self,
        intersection: &str,
        direction: Direction,
        lane: Option<LaneType>,
        mode: Mode,
        limit: usize,
    ) -> Result<Vec<Observation>>;

    fn latest(
        &self,
        intersection: &str,
        direction: Direction,
        lane: LaneType,
        mode: Mode,
    ) -> Result<Option<Observation>> {
        Ok(self
            .recent(intersection, direction, Some(lane), mode, 1)?
            .into_iter()
            .next())
    }

    fn append(&self, observation: Observation) -> Result<()>;

    fn record_allocation(&self, allocation: Allocation) -> Result<()>;
}

/// In-memory store used by the demo runner and tests.
pub struct MemoryStore {
    intersections: RwLock<Vec<Intersection>>,
    observations: RwLock<Vec<Observation>>,
    allocations: RwLock<Vec<Allocation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            intersections: RwLock::new(Vec::new()),
            observations: RwLock::new(Vec::new()),
            allocations: RwLock::new(Vec::new()),
        }
    }

    pub fn register_intersection(&self, name: &str, location: Option<&str>) -> Result<()> {
        let mut intersections = self
            .intersections
            .write()
            .map_err(|_| anyhow!("intersection lock poisoned"))?;
        if intersections.iter().any(|i| i.name == name) {
            return Ok(());
        }
        intersections.push(Intersection {
            name: name.to_string(),
            location: location.map(|l| l.to_string()),
        });
        Ok(())
    }

    pub fn allocations(&self) -> Result<Vec<Allocation>> {
        Ok(self
            .allocations
            .read()
            .map_err(|_| anyhow!("allocation lock poisoned"))?
            .clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationStore for MemoryStore {
    fn intersections(&self) -> Result<Vec<Intersection>> {
        Ok(self
            .intersections
            .read()
            .map_err(|_| anyhow!("intersection lock poisoned"))?
            .clone())
    }

    fn recent(
        &self,
        intersection: &str,
        direction: Direction,
        lane: Option<LaneType>,
        mode: Mode,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let observations = self
            .observations
            .read()
            .map_err(|_| anyhow!("observation lock poisoned"))?;

        let mut matched: Vec<(usize, &Observation)> = observations
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                o.intersection == intersection
                    && o.direction == direction
                    && o.mode == mode
                    && lane.map_or(true, |l| o.lane == l)
            })
            .collect();

        // Newest first; insertion order breaks timestamp ties
        matched.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(_, o)| o.clone())
            .collect())
    }

    fn append(&self, observation: Observation) -> Result<()> {
        self.observations
            .write()
            .map_err(|_| anyhow!("observation lock poisoned"))?
            .push(observation);
        Ok(())
    }

    fn record_allocation(&self, allocation: Allocation) -> Result<()> {
        self.allocations
            .write()
            .map_err(|_| anyhow!("allocation lock poisoned"))?
            .push(allocation);
        Ok(())
    }
}
