// Aggregate Patterns - Core Library
// Loads the Match → Trade/Clearance → Adjustment graph two ways and flattens
// join-expanded rows back into aggregates. Used by the CLI, benches and tests.

pub mod entities;
pub mod row;
pub mod flatten;    // Row Flattener / Aggregate Merger
pub mod config;
pub mod fixtures;
pub mod db;
pub mod benchmark;

// Re-export commonly used types
pub use entities::{
    Adjustment, AdjustmentSet, Clearance, Match, Trade,
    distinct_adjustment_ids,
};
pub use row::{
    RawJoinRow, MatchSnapshot, SubAggregateSnapshot, AdjustmentSnapshot,
};
pub use flatten::{
    flatten, Flattener, FlattenError, JoinShape, MergeSlot,
    TRADE_ADJUSTMENTS, CLEARANCE_ADJUSTMENTS,
};
pub use config::BenchConfig;
pub use fixtures::{generate_matches, expand_join_rows};
pub use db::{
    TableCounts,
    setup_database, seed_database, clear_database, count_rows,
    load_join_rows, load_matches_joined, load_matches_per_table,
};
pub use benchmark::{
    Approach, BenchmarkReport, Expectations,
    run_benchmark, verify_results, time_it, elapsed_millis, serialized_size, megabytes,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
