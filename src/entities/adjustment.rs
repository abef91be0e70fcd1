// 🧾 Adjustment Entity - Leaf records owned by a Trade or a Clearance
//
// An adjustment is identified by its id alone. Within one owner the same id
// always means the same adjustment, which is what lets the flattener collapse
// join-expanded duplicates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

// ============================================================================
// ADJUSTMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Adjustment {
    pub id: i64,
    pub amount: Decimal,
}

impl Adjustment {
    pub fn new(id: i64, amount: Decimal) -> Self {
        Adjustment { id, amount }
    }
}

// ============================================================================
// ADJUSTMENT SET
// ============================================================================

/// Child collection keyed by adjustment id.
///
/// Each Trade/Clearance being assembled owns its own set, so the effective
/// dedup key is (owner, adjustment id). The set is turned into an id-ordered
/// `Vec` once the owner is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjustmentSet {
    by_id: BTreeMap<i64, Adjustment>,
}

impl AdjustmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an adjustment unless one with the same id is already present.
    /// Returns `true` if the adjustment was added.
    pub fn insert(&mut self, adjustment: Adjustment) -> bool {
        match self.by_id.entry(adjustment.id) {
            Entry::Vacant(slot) => {
                slot.insert(adjustment);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn into_vec(self) -> Vec<Adjustment> {
        self.by_id.into_values().collect()
    }
}

impl FromIterator<Adjustment> for AdjustmentSet {
    fn from_iter<I: IntoIterator<Item = Adjustment>>(iter: I) -> Self {
        let mut set = AdjustmentSet::new();
        for adjustment in iter {
            set.insert(adjustment);
        }
        set
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_set_hashes_adjustments_on_identifier() {
        let mut set = AdjustmentSet::new();

        assert!(set.insert(Adjustment::new(1, dec!(11))));
        assert!(!set.insert(Adjustment::new(1, dec!(11))));

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let mut set = AdjustmentSet::new();
        set.insert(Adjustment::new(7, dec!(1.50)));
        set.insert(Adjustment::new(7, dec!(99)));

        let adjustments = set.into_vec();
        assert_eq!(adjustments, vec![Adjustment::new(7, dec!(1.50))]);
    }

    #[test]
    fn test_into_vec_is_ordered_by_id() {
        let set: AdjustmentSet = [30, 10, 20]
            .into_iter()
            .map(|id| Adjustment::new(id, dec!(22)))
            .collect();

        let ids: Vec<i64> = set.into_vec().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_empty_set() {
        let set = AdjustmentSet::new();
        assert!(set.is_empty());
        assert!(set.into_vec().is_empty());
    }
}
