// ⚙️ Benchmark Configuration - Fixture sizes and database location
//
// Defaults reproduce the reference data set: 100 000 matches, each trade with
// 2 adjustments and each clearance with 3. Environment variables override the
// defaults for quicker local runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_MATCH_COUNT: usize = 100_000;
pub const DEFAULT_TRADE_ADJUSTMENTS: usize = 2;
pub const DEFAULT_CLEARANCE_ADJUSTMENTS: usize = 3;
pub const DEFAULT_DB_PATH: &str = "aggregate_patterns.db";

pub const ENV_MATCH_COUNT: &str = "AGGREGATE_MATCH_COUNT";
pub const ENV_TRADE_ADJUSTMENTS: &str = "AGGREGATE_TRADE_ADJUSTMENTS";
pub const ENV_CLEARANCE_ADJUSTMENTS: &str = "AGGREGATE_CLEARANCE_ADJUSTMENTS";
pub const ENV_DB_PATH: &str = "AGGREGATE_DB_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Number of Match roots to seed and expect back
    pub match_count: usize,

    /// Adjustments per Trade
    pub trade_adjustment_count: usize,

    /// Adjustments per Clearance
    pub clearance_adjustment_count: usize,

    /// SQLite file used by the CLI
    pub database_path: PathBuf,
}

impl BenchConfig {
    pub fn new() -> Self {
        BenchConfig {
            match_count: DEFAULT_MATCH_COUNT,
            trade_adjustment_count: DEFAULT_TRADE_ADJUSTMENTS,
            clearance_adjustment_count: DEFAULT_CLEARANCE_ADJUSTMENTS,
            database_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }

    /// Config with explicit sizes and the default database path
    pub fn with_counts(
        match_count: usize,
        trade_adjustment_count: usize,
        clearance_adjustment_count: usize,
    ) -> Self {
        BenchConfig {
            match_count,
            trade_adjustment_count,
            clearance_adjustment_count,
            ..Self::new()
        }
    }

    /// Defaults overridden by `AGGREGATE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(value) = lookup(ENV_MATCH_COUNT) {
            config.match_count = parse_count(ENV_MATCH_COUNT, &value)?;
        }
        if let Some(value) = lookup(ENV_TRADE_ADJUSTMENTS) {
            config.trade_adjustment_count = parse_count(ENV_TRADE_ADJUSTMENTS, &value)?;
        }
        if let Some(value) = lookup(ENV_CLEARANCE_ADJUSTMENTS) {
            config.clearance_adjustment_count = parse_count(ENV_CLEARANCE_ADJUSTMENTS, &value)?;
        }
        if let Some(value) = lookup(ENV_DB_PATH) {
            config.database_path = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Adjustments per match across both sides
    pub fn adjustments_per_match(&self) -> usize {
        self.trade_adjustment_count + self.clearance_adjustment_count
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .replace('_', "")
        .parse::<usize>()
        .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_data_set() {
        let config = BenchConfig::default();
        assert_eq!(config.match_count, 100_000);
        assert_eq!(config.trade_adjustment_count, 2);
        assert_eq!(config.clearance_adjustment_count, 3);
        assert_eq!(config.adjustments_per_match(), 5);
    }

    #[test]
    fn test_environment_overrides() {
        let config = BenchConfig::from_lookup(lookup_from(&[
            (ENV_MATCH_COUNT, "1_000"),
            (ENV_CLEARANCE_ADJUSTMENTS, " 4 "),
            (ENV_DB_PATH, "/tmp/bench.db"),
        ]))
        .unwrap();

        assert_eq!(config.match_count, 1000);
        assert_eq!(config.trade_adjustment_count, 2);
        assert_eq!(config.clearance_adjustment_count, 4);
        assert_eq!(config.database_path, PathBuf::from("/tmp/bench.db"));
    }

    #[test]
    fn test_invalid_count_is_an_error() {
        let err = BenchConfig::from_lookup(lookup_from(&[(ENV_TRADE_ADJUSTMENTS, "two")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TRADE_ADJUSTMENTS));
    }
}
