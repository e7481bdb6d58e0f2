use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        let config: Config =
            serde_yaml::from_str(&contents).with_context(|| format!("failed to parse {}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.allocator.cycle_time_s <= 0.0 {
            bail!("allocator.cycle_time_s must be positive");
        }
        if self.allocator.min_green_s < 0.0 {
            bail!("allocator.min_green_s must not be negative");
        }
        if self.allocator.history_depth == 0 {
            bail!("allocator.history_depth must be at least 1");
        }
        let weight_sum = self.allocator.lane_weights.sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            bail!("allocator.lane_weights must sum to 1, got {}", weight_sum);
        }
        if self.forecast.alpha <= 0.0 || self.forecast.alpha >= 1.0 {
            bail!(
                "forecast.alpha must lie strictly inside (0, 1), got {}",
                self.forecast.alpha
            );
        }
        if self.forecast.history_limit == 0 {
            bail!("forecast.history_limit must be at least 1");
        }
        if self.forecast.clamp_max <= 0.0 {
            bail!("forecast.clamp_max must be positive");
        }
        if self.corridor.approach_speed_kmh <= 0.0 {
            bail!("corridor.approach_speed_kmh must be positive");
        }
        for group in &self.corridor.groups {
            if group.intersections.is_empty() {
                bail!("corridor group '{}' has no intersections", group.name);
            }
        }
        Ok(())
    }
}
