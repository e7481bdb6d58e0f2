// src/forecast/learned.rs

use super::Forecaster;
use crate::store::ObservationStore;
use crate::types::{dir_lane_key, round2, Direction, Forecast, ForecastConfig, LaneType, Mode};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

const MODEL_FILE: &str = "queue_model.onnx";
const INTERSECTION_ENCODER_FILE: &str = "intersection_encoder.json";
const DIR_LANE_ENCODER_FILE: &str = "dir_lane_encoder.json";

/// Code for categorical labels the model never saw during training.
const UNSEEN_CATEGORY: f32 = -1.0;

/// One complete artifact set: the regressor session plus the categorical
/// encoders it was trained with. Immutable after load; the session sits
/// behind a mutex because ONNX Runtime requires exclusive access per run.
pub struct LoadedArtifacts {
    session: Mutex<Session>,
    intersection_codes: HashMap<String, i64>,
    dir_lane_codes: HashMap<String, i64>,
}

impl LoadedArtifacts {
    fn load(artifact_dir: &Path, mode: Mode) -> Result<Self> {
        let base = artifact_dir.join(mode.as_str());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(base.join(MODEL_FILE))
            .with_context(|| format!("failed to load regressor for mode '{}'", mode))?;

        let intersection_codes = load_encoder(&base.join(INTERSECTION_ENCODER_FILE))?;
        let dir_lane_codes = load_encoder(&base.join(DIR_LANE_ENCODER_FILE))?;

        info!(
            mode = %mode,
            intersections = intersection_codes.len(),
            dir_lanes = dir_lane_codes.len(),
            "queue model artifacts loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            intersection_codes,
            dir_lane_codes,
        })
    }

    fn features(
        &self,
        intersection: &str,
        dir_lane: &str,
        vehicle_count: u32,
        timestamp: DateTime<Utc>,
    ) -> [f32; 5] {
        [
            vehicle_count as f32,
            timestamp.hour() as f32,
            timestamp.weekday().num_days_from_monday() as f32,
            encode(&self.intersection_codes, intersection),
            encode(&self.dir_lane_codes, dir_lane),
        ]
    }

    fn predict_one(&self, features: [f32; 5]) -> Result<f64> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("regressor session lock poisoned"))?;

        let input = ort::value::Value::from_array((
            [1usize, 5].as_slice(),
            features.to_vec().into_boxed_slice(),
        ))?;
        let outputs = session.run(ort::inputs!["input" => input])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        data.first()
            .map(|v| f64::from(*v))
            .ok_or_else(|| anyhow!("regressor returned an empty output tensor"))
    }
}

fn load_encoder(path: &Path) -> Result<HashMap<String, i64>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read encoder {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse encoder {}", path.display()))
}

fn encode(codes: &HashMap<String, i64>, label: &str) -> f32 {
    codes
        .get(label)
        .map(|code| *code as f32)
        .unwrap_or(UNSEEN_CATEGORY)
}

fn finalize(estimate: f64, clamp_max: f64) -> f64 {
    round2(estimate.clamp(0.0, clamp_max))
}

/// Owner of the published artifact set. Readers take an `Arc` snapshot;
/// `reload` builds the complete replacement before publishing it, so
/// in-flight predictions never see a half-updated model.
pub struct ModelHandle {
    artifact_dir: PathBuf,
    current: RwLock<Option<Arc<LoadedArtifacts>>>,
}

impl ModelHandle {
    /// Try to load artifacts for `mode`; a missing or corrupt artifact set
    /// leaves the handle empty rather than failing construction.
    pub fn load(artifact_dir: &Path, mode: Mode) -> Self {
        let current = match LoadedArtifacts::load(artifact_dir, mode) {
            Ok(artifacts) => Some(Arc::new(artifacts)),
            Err(e) => {
                warn!(
                    "queue model unavailable for mode '{}': {:#}. Forecasts will fall back to EMA.",
                    mode, e
                );
                None
            }
        };
        Self {
            artifact_dir: artifact_dir.to_path_buf(),
            current: RwLock::new(current),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<LoadedArtifacts>> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_available(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Swap in a freshly trained or mode-switched artifact set. On failure
    /// the currently published set stays in place.
    pub fn reload(&self, mode: Mode) -> Result<()> {
        let artifacts = Arc::new(LoadedArtifacts::load(&self.artifact_dir, mode)?);
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("model handle lock poisoned"))?;
        *guard = Some(artifacts);
        info!("queue model republished for mode '{}'", mode);
        Ok(())
    }
}

/// Regression-backed queue estimator.
///
/// Degrades in layers: no artifact set at all means every call returns an
/// empty map (the composite's signal to fall back), an unknown categorical
/// label encodes to a sentinel, and a single failed inference falls back
/// to the last observed count for that key only.
pub struct LearnedForecaster {
    handle: ModelHandle,
    clamp_max: f64,
    mode: Mode,
}

impl LearnedForecaster {
    pub fn new(config: &ForecastConfig, mode: Mode) -> Self {
        Self {
            handle: ModelHandle::load(Path::new(&config.artifact_dir), mode),
            clamp_max: config.clamp_max,
            mode,
        }
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }
}

impl Forecaster for LearnedForecaster {
    fn predict(&self, store: &dyn ObservationStore, intersection: &str) -> Result<Forecast> {
        let Some(artifacts) = self.handle.snapshot() else {
            return Ok(Forecast::new());
        };

        let mut forecast = Forecast::new();
        for direction in Direction::ALL {
            for lane in LaneType::ALL {
                let key = dir_lane_key(direction, lane);
                let (vehicle_count, timestamp) =
                    match store.latest(intersection, direction, lane, self.mode)? {
                        Some(observation) => (observation.vehicle_count, observation.timestamp),
                        None => (0, Utc::now()),
                    };

                let features = artifacts.features(intersection, &key, vehicle_count, timestamp);
                let estimate = match artifacts.predict_one(features) {
                    Ok(predicted) => predicted,
                    Err(e) => {
                        warn!(
                            intersection,
                            key = %key,
                            "inference failed ({:#}), using observed count",
                            e
                        );
                        f64::from(vehicle_count)
                    }
                };

                forecast.insert(key, finalize(estimate, self.clamp_max));
            }
        }

        Ok(forecast)
    }
}
