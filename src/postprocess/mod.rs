//! Post-processors
//!
//! Turn the per-epoch series produced by the feature extractors into one
//! time-indexed table, then label and remove (or mask) non-wear time.

mod concat;
mod nonwear;

pub use concat::{FeatureConcat, SortDedupe};
pub use nonwear::{
    extract_runs, label_candidates, merge_short_interruptions, NonWearConfig, NonWearDetector,
    NonWearInterval, NON_WEAR_COLUMN,
};
