// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: Mode,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub corridor: CorridorConfig,
    #[serde(default)]
    pub demo: DemoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Total duration of one complete signal cycle (seconds)
    pub cycle_time_s: f64,
    /// Minimum green duration for any direction with demand (seconds)
    pub min_green_s: f64,
    /// Number of recent observations aggregated per direction
    pub history_depth: usize,
    pub lane_weights: LaneWeights,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            cycle_time_s: 60.0,
            min_green_s: 5.0,
            history_depth: 3,
            lane_weights: LaneWeights::default(),
        }
    }
}

/// Per-lane-type importance weights. Must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LaneWeights {
    pub straight: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for LaneWeights {
    fn default() -> Self {
        Self {
            straight: 0.6, // majority flow
            left: 0.2,
            right: 0.2,
        }
    }
}

impl LaneWeights {
    pub fn weight(&self, lane: LaneType) -> f64 {
        match lane {
            LaneType::Straight => self.straight,
            LaneType::Left => self.left,
            LaneType::Right => self.right,
        }
    }

    pub fn sum(&self) -> f64 {
        self.straight + self.left + self.right
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// EMA smoothing factor, must lie strictly inside (0, 1)
    pub alpha: f64,
    /// Maximum number of recent observations per direction-lane key
    pub history_limit: usize,
    /// Upper bound applied to learned estimates (vehicles)
    pub clamp_max: f64,
    /// Root directory holding one artifact set per mode
    pub artifact_dir: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            history_limit: 10,
            clamp_max: 50.0,
            artifact_dir: "artifacts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorridorConfig {
    /// Assumed vehicle propagation speed along corridors (km/h)
    pub approach_speed_kmh: f64,
    pub groups: Vec<CorridorGroupConfig>,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            approach_speed_kmh: 30.0,
            groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorridorGroupConfig {
    pub name: String,
    /// Ordered along the corridor; adjacency follows list order
    pub intersections: Vec<String>,
    /// Preferred master node; falls back to the structural middle
    #[serde(default)]
    pub master: Option<String>,
    #[serde(default)]
    pub distances: Vec<HopDistance>,
}

/// One undirected edge of the sparse distance table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopDistance {
    pub between: [String; 2],
    pub meters: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub intersections: Vec<IntersectionSeed>,
    /// Synthetic observation rounds to generate per direction-lane key
    pub rounds: usize,
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            intersections: Vec::new(),
            rounds: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntersectionSeed {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "signal_engine=info,ort=warn".to_string(),
        }
    }
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    N,
    E,
    S,
    W,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::E => "E",
            Direction::S => "S",
            Direction::W => "W",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneType {
    Straight,
    Left,
    Right,
}

impl LaneType {
    pub const ALL: [LaneType; 3] = [LaneType::Straight, LaneType::Left, LaneType::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneType::Straight => "straight",
            LaneType::Left => "left",
            LaneType::Right => "right",
        }
    }
}

impl fmt::Display for LaneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating regime. Partitions observations and selects the artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    Peak,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Peak => "peak",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intersection {
    pub name: String,
    pub location: Option<String>,
}

/// One demand sample. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub intersection: String,
    pub direction: Direction,
    pub lane: LaneType,
    pub mode: Mode,
    pub vehicle_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// One green-time grant for one direction. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub intersection: String,
    pub direction: Direction,
    pub green_time_s: f64,
    pub generated_at: DateTime<Utc>,
}

/// Forecast output: "{direction}-{lane}" key to estimated vehicle count.
pub type Forecast = BTreeMap<String, f64>;

pub fn dir_lane_key(direction: Direction, lane: LaneType) -> String {
    format!("{}-{}", direction, lane)
}

/// Derived timing for one node of a corridor group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorridorRow {
    pub node: String,
    /// Signed cumulative distance from the master (downstream positive)
    pub cumulative_m: f64,
    pub distance_m: f64,
    pub travel_time_s: f64,
    /// Whole-second start offset relative to the master
    pub offset_s: i64,
    /// Whether the node is present in live intersection data
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorridorPlan {
    pub group: String,
    pub master: String,
    pub rows: Vec<CorridorRow>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
