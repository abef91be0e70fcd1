// 🔗 Match Aggregate - Root, Trade and Clearance value records
//
// Plain values with explicit ids. Equality is structural, there is no
// transient/persistent distinction: every record built by this crate already
// carries the id it was loaded with.

use super::adjustment::Adjustment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// TRADE / CLEARANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Trade {
    pub id: i64,
    pub amount: Decimal,

    /// Ordered by adjustment id
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Clearance {
    pub id: i64,
    pub amount: Decimal,

    /// Ordered by adjustment id
    pub adjustments: Vec<Adjustment>,
}

impl Trade {
    pub fn new(id: i64, amount: Decimal, adjustments: Vec<Adjustment>) -> Self {
        Trade { id, amount, adjustments }
    }
}

impl Clearance {
    pub fn new(id: i64, amount: Decimal, adjustments: Vec<Adjustment>) -> Self {
        Clearance { id, amount, adjustments }
    }
}

// ============================================================================
// MATCH (aggregate root)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Match {
    pub id: i64,
    pub trade: Trade,
    pub clearance: Clearance,
}

impl Match {
    pub fn new(id: i64, trade: Trade, clearance: Clearance) -> Self {
        Match { id, trade, clearance }
    }

    /// Number of adjustments on both sides
    pub fn adjustment_count(&self) -> usize {
        self.trade.adjustments.len() + self.clearance.adjustments.len()
    }

    /// All adjustments of this match, trade side first
    pub fn adjustments(&self) -> impl Iterator<Item = &Adjustment> {
        self.trade
            .adjustments
            .iter()
            .chain(self.clearance.adjustments.iter())
    }
}

/// Count distinct adjustment ids across a result set.
///
/// Only meaningful when adjustment ids are unique across owners, which holds
/// for rows loaded from the database.
pub fn distinct_adjustment_ids(matches: &[Match]) -> usize {
    matches
        .iter()
        .flat_map(Match::adjustments)
        .map(|a| a.id)
        .collect::<HashSet<_>>()
        .len()
}
