// 🧮 Row Flattener - Collapse join-expanded rows into Match aggregates
//
// A join of Match → Trade/Clearance → Adjustment repeats the root once per
// adjustment (or once per adjustment pair when both sides are joined). The
// flattener walks the rows grouped by match id, builds one root per group and
// accumulates adjustments into id-keyed sets so repeats collapse.
//
// Precondition: rows of one match are contiguous. `flatten_sorted` establishes
// it; `flatten`/`try_flatten` validate it and fail with InvalidInputOrder.
// Errors are fail-fast: no partial result is ever returned.

use crate::entities::{AdjustmentSet, Clearance, Match, Trade};
use crate::row::{AdjustmentSnapshot, MatchSnapshot, RawJoinRow, SubAggregateSnapshot};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    /// Rows of a match reappeared after a different match had started
    #[error("rows for match {match_id} are not contiguous (seen again at row {row_index})")]
    InvalidInputOrder { match_id: i64, row_index: usize },

    /// A row is missing a required snapshot or contradicts its own root
    #[error("malformed row {row_index}: {reason}")]
    MalformedRow { row_index: usize, reason: String },
}

impl FlattenError {
    fn malformed(row_index: usize, reason: impl Into<String>) -> Self {
        FlattenError::MalformedRow {
            row_index,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// DRAFTS (aggregates under construction)
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubAggregateDraft {
    pub id: i64,
    pub amount: Decimal,
    pub adjustments: AdjustmentSet,
}

impl SubAggregateDraft {
    fn from_snapshot(snapshot: &SubAggregateSnapshot) -> Self {
        SubAggregateDraft {
            id: snapshot.id,
            amount: snapshot.amount,
            adjustments: AdjustmentSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchDraft {
    pub id: i64,
    pub trade: SubAggregateDraft,
    pub clearance: SubAggregateDraft,
}

impl MatchDraft {
    fn into_match(self) -> Match {
        Match::new(
            self.id,
            Trade::new(self.trade.id, self.trade.amount, self.trade.adjustments.into_vec()),
            Clearance::new(
                self.clearance.id,
                self.clearance.amount,
                self.clearance.adjustments.into_vec(),
            ),
        )
    }
}

/// Required parts of a row, checked for internal consistency
struct RowGraph {
    trade: SubAggregateSnapshot,
    clearance: SubAggregateSnapshot,
}

fn validate_row(row: &RawJoinRow, row_index: usize) -> Result<RowGraph, FlattenError> {
    let root: MatchSnapshot = row
        .root
        .ok_or_else(|| FlattenError::malformed(row_index, "missing match snapshot"))?;
    let trade = row
        .trade
        .ok_or_else(|| FlattenError::malformed(row_index, "missing trade snapshot"))?;
    let clearance = row
        .clearance
        .ok_or_else(|| FlattenError::malformed(row_index, "missing clearance snapshot"))?;

    if root.id != row.match_id {
        return Err(FlattenError::malformed(
            row_index,
            format!("match snapshot {} does not belong to match {}", root.id, row.match_id),
        ));
    }
    if trade.id != root.trade_id {
        return Err(FlattenError::malformed(
            row_index,
            format!("match {} references trade {}, row carries trade {}", root.id, root.trade_id, trade.id),
        ));
    }
    if clearance.id != root.clearance_id {
        return Err(FlattenError::malformed(
            row_index,
            format!(
                "match {} references clearance {}, row carries clearance {}",
                root.id, root.clearance_id, clearance.id
            ),
        ));
    }

    Ok(RowGraph { trade, clearance })
}

// ============================================================================
// MERGE SLOTS
// ============================================================================

/// One mergeable child collection: where the child sits in a row and which
/// sub-aggregate of the draft collects it.
#[derive(Clone, Copy)]
pub struct MergeSlot {
    pub name: &'static str,
    pub child: fn(&RawJoinRow) -> Option<&AdjustmentSnapshot>,
    pub target: fn(&mut MatchDraft) -> &mut SubAggregateDraft,
}

impl fmt::Debug for MergeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeSlot").field("name", &self.name).finish()
    }
}

fn trade_adjustment_of(row: &RawJoinRow) -> Option<&AdjustmentSnapshot> {
    row.trade_adjustment.as_ref()
}

fn clearance_adjustment_of(row: &RawJoinRow) -> Option<&AdjustmentSnapshot> {
    row.clearance_adjustment.as_ref()
}

fn trade_of(draft: &mut MatchDraft) -> &mut SubAggregateDraft {
    &mut draft.trade
}

fn clearance_of(draft: &mut MatchDraft) -> &mut SubAggregateDraft {
    &mut draft.clearance
}

pub const TRADE_ADJUSTMENTS: MergeSlot = MergeSlot {
    name: "trade_adjustments",
    child: trade_adjustment_of,
    target: trade_of,
};

pub const CLEARANCE_ADJUSTMENTS: MergeSlot = MergeSlot {
    name: "clearance_adjustments",
    child: clearance_adjustment_of,
    target: clearance_of,
};

// ============================================================================
// FLATTENER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Flattener {
    slots: Vec<MergeSlot>,
}

impl Flattener {
    pub fn new(slots: Vec<MergeSlot>) -> Self {
        Flattener { slots }
    }

    /// Match/Trade/Clearance only; adjustment columns are ignored
    pub fn plain() -> Self {
        Self::new(Vec::new())
    }

    pub fn trade_adjustments() -> Self {
        Self::new(vec![TRADE_ADJUSTMENTS])
    }

    pub fn trade_and_clearance_adjustments() -> Self {
        Self::new(vec![TRADE_ADJUSTMENTS, CLEARANCE_ADJUSTMENTS])
    }

    pub fn slots(&self) -> &[MergeSlot] {
        &self.slots
    }

    /// Flatten rows already grouped by match id.
    pub fn flatten<I>(&self, rows: I) -> Result<Vec<Match>, FlattenError>
    where
        I: IntoIterator<Item = RawJoinRow>,
    {
        self.try_flatten(rows.into_iter().map(Ok))
    }

    /// Sort rows by match id (stable), then flatten.
    pub fn flatten_sorted(&self, mut rows: Vec<RawJoinRow>) -> Result<Vec<Match>, FlattenError> {
        rows.sort_by_key(|row| row.match_id);
        self.flatten(rows)
    }

    /// Flatten a fallible row stream such as a live database cursor.
    ///
    /// Errors from the stream are returned unchanged; flattening errors are
    /// converted through `E: From<FlattenError>`.
    pub fn try_flatten<I, E>(&self, rows: I) -> Result<Vec<Match>, E>
    where
        I: IntoIterator<Item = Result<RawJoinRow, E>>,
        E: From<FlattenError>,
    {
        let mut finished: Vec<Match> = Vec::new();
        let mut closed: HashSet<i64> = HashSet::new();
        let mut current: Option<MatchDraft> = None;
        let mut row_count = 0usize;

        for (row_index, row) in rows.into_iter().enumerate() {
            let row = row?;
            row_count += 1;
            let graph = validate_row(&row, row_index)?;

            if let Some(draft) = current.as_mut().filter(|d| d.id == row.match_id) {
                if graph.trade.id != draft.trade.id || graph.clearance.id != draft.clearance.id {
                    return Err(FlattenError::malformed(
                        row_index,
                        format!(
                            "match {} changed sub-aggregates mid-group (trade {} → {}, clearance {} → {})",
                            draft.id, draft.trade.id, graph.trade.id, draft.clearance.id, graph.clearance.id
                        ),
                    )
                    .into());
                }
                self.merge_children(draft, &row);
                continue;
            }

            if closed.contains(&row.match_id) {
                return Err(FlattenError::InvalidInputOrder {
                    match_id: row.match_id,
                    row_index,
                }
                .into());
            }

            let mut draft = MatchDraft {
                id: row.match_id,
                trade: SubAggregateDraft::from_snapshot(&graph.trade),
                clearance: SubAggregateDraft::from_snapshot(&graph.clearance),
            };
            self.merge_children(&mut draft, &row);

            if let Some(previous) = current.replace(draft) {
                closed.insert(previous.id);
                finished.push(previous.into_match());
            }
        }

        if let Some(last) = current {
            finished.push(last.into_match());
        }

        debug!(
            "flattened {} rows into {} matches ({} merge slots)",
            row_count,
            finished.len(),
            self.slots.len()
        );

        Ok(finished)
    }

    fn merge_children(&self, draft: &mut MatchDraft, row: &RawJoinRow) {
        for slot in &self.slots {
            if let Some(child) = (slot.child)(row) {
                (slot.target)(draft).adjustments.insert(child.to_adjustment());
            }
        }
    }
}

impl Default for Flattener {
    fn default() -> Self {
        Self::trade_and_clearance_adjustments()
    }
}

/// Flatten grouped rows carrying both adjustment sides.
pub fn flatten<I>(rows: I) -> Result<Vec<Match>, FlattenError>
where
    I: IntoIterator<Item = RawJoinRow>,
{
    Flattener::default().flatten(rows)
}

// ============================================================================
// JOIN SHAPES
// ============================================================================

/// Which adjustment sides a join query brings along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinShape {
    /// Match, Trade, Clearance only
    Plain,

    /// Plus one LEFT OUTER JOIN on trade adjustments
    TradeAdjustments,

    /// Plus LEFT OUTER JOINs on both sides (cross product per match)
    TradeAndClearanceAdjustments,
}

impl JoinShape {
    pub const ALL: [JoinShape; 3] = [
        JoinShape::Plain,
        JoinShape::TradeAdjustments,
        JoinShape::TradeAndClearanceAdjustments,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JoinShape::Plain => "plain",
            JoinShape::TradeAdjustments => "trade-adjustments",
            JoinShape::TradeAndClearanceAdjustments => "trade-and-clearance-adjustments",
        }
    }

    pub fn includes_trade_adjustments(&self) -> bool {
        !matches!(self, JoinShape::Plain)
    }

    pub fn includes_clearance_adjustments(&self) -> bool {
        matches!(self, JoinShape::TradeAndClearanceAdjustments)
    }

    pub fn flattener(&self) -> Flattener {
        match self {
            JoinShape::Plain => Flattener::plain(),
            JoinShape::TradeAdjustments => Flattener::trade_adjustments(),
            JoinShape::TradeAndClearanceAdjustments => Flattener::trade_and_clearance_adjustments(),
        }
    }
}

impl fmt::Display for JoinShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// TESTS
// ============================================================================
