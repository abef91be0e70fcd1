// 🏭 Fixtures - Reference data set and its join expansion
//
// generate_matches builds the benchmark graph in memory (the same values
// seed_database writes). expand_join_rows turns matches back into the rows a
// join query would return for a given shape, which is what tests and benches
// feed the flattener.

use crate::config::BenchConfig;
use crate::entities::{Adjustment, Clearance, Match, Trade};
use crate::flatten::JoinShape;
use crate::row::{AdjustmentSnapshot, MatchSnapshot, RawJoinRow, SubAggregateSnapshot};
use rust_decimal::Decimal;

pub const TRADE_ADJUSTMENT_AMOUNT: i64 = 11;
pub const CLEARANCE_ADJUSTMENT_AMOUNT: i64 = 22;

/// Build `config.match_count` matches.
///
/// Match, Trade and Clearance ids are 1-based and aligned; the trade and
/// clearance amount is the zero-based match index. Adjustment ids are unique
/// across the whole set, trade side first within each match.
pub fn generate_matches(config: &BenchConfig) -> Vec<Match> {
    let mut next_adjustment_id: i64 = 1;
    let mut matches = Vec::with_capacity(config.match_count);

    for index in 0..config.match_count {
        let id = index as i64 + 1;
        let amount = Decimal::from(index as i64);

        let mut adjustments = |count: usize, value: i64| -> Vec<Adjustment> {
            (0..count)
                .map(|_| {
                    let adjustment = Adjustment::new(next_adjustment_id, Decimal::from(value));
                    next_adjustment_id += 1;
                    adjustment
                })
                .collect()
        };

        let trade_adjustments = adjustments(config.trade_adjustment_count, TRADE_ADJUSTMENT_AMOUNT);
        let clearance_adjustments =
            adjustments(config.clearance_adjustment_count, CLEARANCE_ADJUSTMENT_AMOUNT);

        matches.push(Match::new(
            id,
            Trade::new(id, amount, trade_adjustments),
            Clearance::new(id, amount, clearance_adjustments),
        ));
    }

    matches
}

/// Rows a join of the given shape returns for `matches`.
///
/// Empty adjustment sides produce one row with a NULL child (outer join);
/// with both sides joined, each match yields the trade × clearance product.
pub fn expand_join_rows(matches: &[Match], shape: JoinShape) -> Vec<RawJoinRow> {
    let mut rows = Vec::new();

    for m in matches {
        let base = RawJoinRow::new(
            MatchSnapshot {
                id: m.id,
                trade_id: m.trade.id,
                clearance_id: m.clearance.id,
            },
            SubAggregateSnapshot {
                id: m.trade.id,
                amount: m.trade.amount,
            },
            SubAggregateSnapshot {
                id: m.clearance.id,
                amount: m.clearance.amount,
            },
        );

        let trade_side = outer_join_side(&m.trade.adjustments, shape.includes_trade_adjustments());
        let clearance_side =
            outer_join_side(&m.clearance.adjustments, shape.includes_clearance_adjustments());

        for trade_adjustment in &trade_side {
            for clearance_adjustment in &clearance_side {
                let mut row = base.clone();
                row.trade_adjustment = *trade_adjustment;
                row.clearance_adjustment = *clearance_adjustment;
                rows.push(row);
            }
        }
    }

    rows
}

fn outer_join_side(adjustments: &[Adjustment], joined: bool) -> Vec<Option<AdjustmentSnapshot>> {
    if !joined || adjustments.is_empty() {
        return vec![None];
    }
    adjustments.iter().map(|a| Some(AdjustmentSnapshot::from(a))).collect()
}
