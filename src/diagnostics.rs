//! Data-quality diagnostics
//!
//! Conditions that degrade a run without aborting it (removed epochs, empty
//! compliant-day sets, unusual channel counts) are reported here instead of
//! failing. A [`Diagnostics`] handle is shared by every node of one pipeline
//! so a batch driver can collect all warnings of a participant run at once.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Non-fatal data-quality condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DataQualityWarning {
    /// Epochs whose internal sample spacing deviated from the nominal delta
    BadEpochsRemoved { removed: usize, nominal_delta_ms: i64 },
    /// A fixed three-axis node received a different number of channels
    UnexpectedChannelCount { node: String, channels: usize },
    /// No calendar day satisfied the wear-time compliance band
    NoCompliantDays { rows: usize },
    /// Non-wear intervals were removed or masked
    NonWearRemoved { intervals: usize, epochs: usize },
}

impl std::fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataQualityWarning::BadEpochsRemoved {
                removed,
                nominal_delta_ms,
            } => write!(
                f,
                "found {} bad epochs where delta_t != estimated delta_t of {} ms, bad epochs were removed",
                removed, nominal_delta_ms
            ),
            DataQualityWarning::UnexpectedChannelCount { node, channels } => write!(
                f,
                "{} expected three channels (x, y, z), got {}; result might not be as expected",
                node, channels
            ),
            DataQualityWarning::NoCompliantDays { rows } => write!(
                f,
                "no wear-time compliant days found among {} epochs",
                rows
            ),
            DataQualityWarning::NonWearRemoved { intervals, epochs } => write!(
                f,
                "{} non-wear interval(s) covering {} epochs",
                intervals, epochs
            ),
        }
    }
}

/// Shared sink for data-quality warnings
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Arc<Mutex<Vec<DataQualityWarning>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a warning
    pub fn report(&self, warning: DataQualityWarning) {
        warn!(%warning, "data quality");
        // A poisoned sink only means another holder panicked mid-push.
        let mut guard = match self.warnings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(warning);
    }

    /// Snapshot of all warnings reported so far
    pub fn warnings(&self) -> Vec<DataQualityWarning> {
        match self.warnings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return all recorded warnings
    pub fn drain(&self) -> Vec<DataQualityWarning> {
        let mut guard = match self.warnings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }

    pub fn is_empty(&self) -> bool {
        self.warnings().is_empty()
    }
}
