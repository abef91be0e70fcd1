// Entity Models - Match aggregate graph
//
// Match → Trade / Clearance → Adjustments
//
// Each entity is an immutable value with an explicit id. Child collections are
// assembled through an id-keyed AdjustmentSet and exposed as ordered Vecs.

pub mod adjustment;
pub mod aggregate;

pub use adjustment::{Adjustment, AdjustmentSet};
pub use aggregate::{distinct_adjustment_ids, Clearance, Match, Trade};
