//! Series to table concatenation

use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::node::{expect_inputs, Node};
use crate::segmentation::EpochSegmenter;
use crate::table::FeatureTable;
use crate::types::{unsupported, FeatureSeries, Signal};

/// Joins any number of feature series into a single [`FeatureTable`]
/// indexed by epoch start time.
///
/// Series are joined by position; shorter ones are padded with NaN.
#[derive(Debug, Clone)]
pub struct FeatureConcat {
    epoch_starts_ms: Vec<i64>,
}

impl FeatureConcat {
    pub fn new(epoch_starts_ms: Vec<i64>) -> Self {
        Self { epoch_starts_ms }
    }

    /// Use the retained epoch start times of a timestamp-aware segmenter
    pub fn from_segmenter(segmenter: &EpochSegmenter) -> Result<Self> {
        Ok(Self::new(segmenter.timestamps()?.to_vec()))
    }

    pub fn epoch_starts_ms(&self) -> &[i64] {
        &self.epoch_starts_ms
    }
}

impl Node for FeatureConcat {
    fn output_arity(&self, _inputs: Option<usize>) -> Option<usize> {
        Some(1)
    }

    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        let series = inputs
            .iter()
            .map(|input| {
                input
                    .as_series()
                    .cloned()
                    .ok_or_else(|| unsupported(&name, "series", input))
            })
            .collect::<Result<Vec<FeatureSeries>>>()?;

        let table = FeatureTable::from_series(self.epoch_starts_ms.clone(), series)?;
        debug!(rows = table.n_rows(), columns = table.n_columns(), "features concatenated");
        Ok(vec![Signal::Table(table)])
    }
}

/// Sorts a table by epoch start and drops duplicated timestamps
#[derive(Debug, Clone, Copy, Default)]
pub struct SortDedupe {
    drop_missing: bool,
}

impl SortDedupe {
    /// With `drop_missing`, rows holding any missing value are removed too
    pub fn new(drop_missing: bool) -> Self {
        Self { drop_missing }
    }
}

impl Node for SortDedupe {
    fn input_arity(&self) -> Option<usize> {
        Some(1)
    }

    fn output_arity(&self, _inputs: Option<usize>) -> Option<usize> {
        Some(1)
    }

    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        expect_inputs(&name, inputs, 1)?;
        let table = inputs[0]
            .as_table()
            .ok_or_else(|| unsupported(&name, "table", &inputs[0]))?;
        Ok(vec![Signal::Table(table.sort_dedupe(self.drop_missing))])
    }
}
