//! Run configuration: tolerances, scan budgets, queue sizes.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::constants::PTS_CLOCK_HZ;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Allowed deviation between actual and predicted boundary PTS, seconds.
    pub jitter_tolerance_secs: f64,
    /// Media time scanned by the pre-read pass once the first PTS is seen.
    pub preread_media_budget_ms: u64,
    /// Wall-clock ceiling for the pre-read pass of a single file.
    pub preread_wall_budget_secs: u64,
    /// Bounded capacity of every boundary queue.
    pub fifo_capacity: usize,
    /// Distance in 90 kHz ticks at which a PES unit matches a splice point.
    pub splice_tolerance_ticks: u64,
    /// Entries kept in the SCTE-35 event history before eviction.
    pub splice_history_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jitter_tolerance_secs: 0.1,
            preread_media_budget_ms: 5000,
            preread_wall_budget_secs: 30,
            fifo_capacity: 1024,
            splice_tolerance_ticks: 3003,
            splice_history_capacity: 64,
        }
    }
}

impl Config {
    /// Loads a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.jitter_tolerance_secs.is_finite() && self.jitter_tolerance_secs >= 0.0) {
            anyhow::bail!("jitter_tolerance_secs must be a non-negative number");
        }
        if self.fifo_capacity == 0 {
            anyhow::bail!("fifo_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn jitter_tolerance_ticks(&self) -> u64 {
        (self.jitter_tolerance_secs * PTS_CLOCK_HZ as f64).round() as u64
    }

    pub fn preread_media_budget_ticks(&self) -> u64 {
        self.preread_media_budget_ms * PTS_CLOCK_HZ / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_converts_to_90khz() {
        let cfg = Config::default();
        assert_eq!(cfg.jitter_tolerance_ticks(), 9000);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: Config = serde_json::from_str(r#"{ "fifo_capacity": 8 }"#).unwrap();
        assert_eq!(cfg.fifo_capacity, 8);
        assert_eq!(cfg.preread_media_budget_ms, 5000);
    }

    #[test]
    fn rejects_zero_capacity() {
        let cfg = Config {
            fifo_capacity: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "jitter_tolerance_secs": 0.5 }"#).unwrap();
        let cfg = Config::from_json_file(&path).unwrap();
        assert_eq!(cfg.jitter_tolerance_ticks(), 45000);
    }
}
