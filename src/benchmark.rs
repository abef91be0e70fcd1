// ⏱️ Benchmark Harness - Time a load, measure its JSON footprint, verify it
//
// The stopwatch wraps the whole load (query + assembly) the way a caller
// experiences it. Serialization happens after the clock stops, then the
// result is checked against the expected counts.

use crate::config::BenchConfig;
use crate::db::{load_matches_joined, load_matches_per_table};
use crate::entities::{distinct_adjustment_ids, Match};
use crate::flatten::JoinShape;
use anyhow::{bail, Context, Result};
use log::info;
use rust_decimal::Decimal;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

// ============================================================================
// APPROACH
// ============================================================================

/// How the aggregate graph is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approach {
    /// Single join query, rows flattened in memory
    Joined(JoinShape),

    /// One query per table, stitched by foreign key
    PerTable,
}

impl Approach {
    /// Every joined shape followed by the per-table load
    pub fn all() -> Vec<Approach> {
        JoinShape::ALL
            .iter()
            .map(|shape| Approach::Joined(*shape))
            .chain(std::iter::once(Approach::PerTable))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Approach::Joined(_) => "join-and-flatten",
            Approach::PerTable => "per-table",
        }
    }

    /// Which part of the graph the approach loads
    pub fn shape(&self) -> JoinShape {
        match self {
            Approach::Joined(shape) => *shape,
            Approach::PerTable => JoinShape::TradeAndClearanceAdjustments,
        }
    }

    pub fn load(&self, conn: &Connection) -> Result<Vec<Match>> {
        match self {
            Approach::Joined(shape) => load_matches_joined(conn, *shape),
            Approach::PerTable => load_matches_per_table(conn),
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.shape())
    }
}

// ============================================================================
// MEASUREMENT
// ============================================================================

/// Run `f` and report how long it took
pub fn time_it<T, F>(f: F) -> Result<(T, Duration)>
where
    F: FnOnce() -> Result<T>,
{
    let started = Instant::now();
    let value = f()?;
    Ok((value, started.elapsed()))
}

/// Whole milliseconds, saturating at `u64::MAX`
pub fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Length in bytes of the JSON encoding of `matches`
pub fn serialized_size(matches: &[Match]) -> Result<usize> {
    let json = serde_json::to_vec(matches).context("Failed to serialize matches to JSON")?;
    Ok(json.len())
}

/// Bytes to MiB, rounded to three decimals
pub fn megabytes(bytes: usize) -> Decimal {
    (Decimal::from(bytes as u64) / Decimal::from(1024 * 1024)).round_dp(3)
}

// ============================================================================
// VERIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectations {
    pub match_count: usize,
    pub trade_adjustments_per_match: usize,
    pub clearance_adjustments_per_match: usize,
}

impl Expectations {
    /// What a load of `shape` over data seeded with `config` must return
    pub fn for_shape(config: &BenchConfig, shape: JoinShape) -> Self {
        Expectations {
            match_count: config.match_count,
            trade_adjustments_per_match: if shape.includes_trade_adjustments() {
                config.trade_adjustment_count
            } else {
                0
            },
            clearance_adjustments_per_match: if shape.includes_clearance_adjustments() {
                config.clearance_adjustment_count
            } else {
                0
            },
        }
    }

    pub fn total_adjustments(&self) -> usize {
        self.match_count * (self.trade_adjustments_per_match + self.clearance_adjustments_per_match)
    }
}

/// Check root count, per-side adjustment counts and the number of distinct
/// adjustment ids across the whole result.
pub fn verify_results(matches: &[Match], expected: &Expectations) -> Result<()> {
    if matches.len() != expected.match_count {
        bail!(
            "expected {} matches, loaded {}",
            expected.match_count,
            matches.len()
        );
    }

    for m in matches {
        if m.trade.adjustments.len() != expected.trade_adjustments_per_match {
            bail!(
                "match {} has {} trade adjustments, expected {}",
                m.id,
                m.trade.adjustments.len(),
                expected.trade_adjustments_per_match
            );
        }
        if m.clearance.adjustments.len() != expected.clearance_adjustments_per_match {
            bail!(
                "match {} has {} clearance adjustments, expected {}",
                m.id,
                m.clearance.adjustments.len(),
                expected.clearance_adjustments_per_match
            );
        }
    }

    let distinct = distinct_adjustment_ids(matches);
    if distinct != expected.total_adjustments() {
        bail!(
            "expected {} distinct adjustments, found {}",
            expected.total_adjustments(),
            distinct
        );
    }

    Ok(())
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub approach: String,
    pub shape: String,
    pub matches: usize,
    pub adjustments: usize,
    pub elapsed_ms: u64,
    pub serialized_bytes: usize,
    pub serialized_mb: Decimal,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<17} {:<32} matches={:<7} adjustments={:<7} elapsed={}ms size={} MB",
            self.approach,
            self.shape,
            self.matches,
            self.adjustments,
            self.elapsed_ms,
            self.serialized_mb
        )
    }
}

/// Load with `approach`, measure, verify. Any failure aborts with no report.
pub fn run_benchmark(
    conn: &Connection,
    approach: Approach,
    expected: &Expectations,
) -> Result<BenchmarkReport> {
    let (matches, elapsed) = time_it(|| approach.load(conn))
        .with_context(|| format!("Failed to load matches ({})", approach))?;

    let serialized_bytes = serialized_size(&matches)?;
    verify_results(&matches, expected).with_context(|| format!("Verification failed ({})", approach))?;

    let report = BenchmarkReport {
        approach: approach.name().to_string(),
        shape: approach.shape().to_string(),
        matches: matches.len(),
        adjustments: matches.iter().map(Match::adjustment_count).sum(),
        elapsed_ms: elapsed_millis(elapsed),
        serialized_bytes,
        serialized_mb: megabytes(serialized_bytes),
    };

    info!("{}", report);
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
