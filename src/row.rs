// 🧱 Raw Join Rows - One denormalized row of the Match join
//
// A row carries one root, its two sub-aggregates and at most one adjustment
// per side. Snapshots are optional because they come straight from nullable
// columns; the flattener decides what is required.

use crate::entities::Adjustment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Root columns of a join row, including the foreign keys it references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub id: i64,
    pub trade_id: i64,
    pub clearance_id: i64,
}

/// Trade or Clearance columns of a join row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAggregateSnapshot {
    pub id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentSnapshot {
    pub id: i64,
    pub amount: Decimal,
}

impl AdjustmentSnapshot {
    pub fn to_adjustment(&self) -> Adjustment {
        Adjustment::new(self.id, self.amount)
    }
}

impl From<&Adjustment> for AdjustmentSnapshot {
    fn from(adjustment: &Adjustment) -> Self {
        AdjustmentSnapshot {
            id: adjustment.id,
            amount: adjustment.amount,
        }
    }
}

// ============================================================================
// RAW JOIN ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJoinRow {
    /// Root identifier the row is grouped by
    pub match_id: i64,

    pub root: Option<MatchSnapshot>,
    pub trade: Option<SubAggregateSnapshot>,
    pub clearance: Option<SubAggregateSnapshot>,

    /// None when the outer join found no adjustment for the trade
    pub trade_adjustment: Option<AdjustmentSnapshot>,

    /// None when the outer join found no adjustment for the clearance
    pub clearance_adjustment: Option<AdjustmentSnapshot>,
}

impl RawJoinRow {
    /// Row with root and sub-aggregates populated and no adjustments
    pub fn new(
        root: MatchSnapshot,
        trade: SubAggregateSnapshot,
        clearance: SubAggregateSnapshot,
    ) -> Self {
        RawJoinRow {
            match_id: root.id,
            root: Some(root),
            trade: Some(trade),
            clearance: Some(clearance),
            trade_adjustment: None,
            clearance_adjustment: None,
        }
    }

    pub fn with_trade_adjustment(mut self, adjustment: AdjustmentSnapshot) -> Self {
        self.trade_adjustment = Some(adjustment);
        self
    }

    pub fn with_clearance_adjustment(mut self, adjustment: AdjustmentSnapshot) -> Self {
        self.clearance_adjustment = Some(adjustment);
        self
    }
}
