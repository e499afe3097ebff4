//! Non-wear detection
//!
//! An epoch is a non-wear candidate when the standard deviation of every axis
//! stays below a threshold. Maximal runs of candidates longer than a minimum
//! duration become intervals, and intervals separated by less than a minimum
//! stretch of wear time are merged in one chronological pass. Rows covered by
//! a final interval are then removed, or masked with NaN.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diagnostics::{DataQualityWarning, Diagnostics};
use crate::error::{PipelineError, Result};
use crate::node::{expect_inputs, Node};
use crate::table::FeatureTable;
use crate::types::{unsupported, FeatureSeries, Signal};

/// Integer column appended in mask mode, 1 for non-wear rows
pub const NON_WEAR_COLUMN: &str = "non_wear";

/// Non-wear detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonWearConfig {
    /// Per-axis standard deviation below which an epoch looks idle (g)
    pub std_threshold_g: f64,
    /// A candidate run must last longer than this to count as non-wear
    pub min_duration_s: f64,
    /// Wear time shorter than this between two intervals is absorbed
    pub min_interruption_s: f64,
    /// Drop non-wear rows instead of masking them
    pub remove: bool,
    pub epoch_length_s: f64,
    pub std_columns: Vec<String>,
}

impl Default for NonWearConfig {
    fn default() -> Self {
        Self {
            std_threshold_g: 0.013,
            min_duration_s: 3600.0,
            min_interruption_s: 3600.0,
            remove: true,
            epoch_length_s: 5.0,
            std_columns: vec!["x_std".into(), "y_std".into(), "z_std".into()],
        }
    }
}

impl NonWearConfig {
    pub fn validate(&self) -> Result<()> {
        if self.std_threshold_g.is_nan() || self.std_threshold_g <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "non-wear std threshold must be positive, got {}",
                self.std_threshold_g
            )));
        }
        if self.min_duration_s < 0.0 || self.min_interruption_s < 0.0 {
            return Err(PipelineError::Configuration(
                "non-wear durations must not be negative".to_string(),
            ));
        }
        if self.epoch_length_s.is_nan() || self.epoch_length_s <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "epoch length must be positive, got {}",
                self.epoch_length_s
            )));
        }
        if self.std_columns.is_empty() {
            return Err(PipelineError::Configuration(
                "at least one standard deviation column is required".to_string(),
            ));
        }
        Ok(())
    }

    fn epoch_length_ms(&self) -> i64 {
        seconds_to_ms(self.epoch_length_s)
    }
}

fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Half-open time range `[start_ms, end_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonWearInterval {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl NonWearInterval {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        self.start_ms <= timestamp_ms && timestamp_ms < self.end_ms
    }
}

/// Flag rows whose standard deviation is below `threshold` on every column.
///
/// Missing values never count as idle.
pub fn label_candidates(table: &FeatureTable, std_columns: &[String], threshold: f64) -> Result<Vec<bool>> {
    let columns = std_columns
        .iter()
        .map(|name| table.series(name))
        .collect::<Result<Vec<&FeatureSeries>>>()?;
    if let Some(c) = columns.iter().find(|c| c.len() != table.n_rows()) {
        return Err(PipelineError::Shape(format!(
            "column {} has {} values for {} rows",
            c.name,
            c.len(),
            table.n_rows()
        )));
    }

    Ok((0..table.n_rows())
        .map(|row| columns.iter().all(|c| c.values[row] < threshold))
        .collect())
}

/// Maximal runs of consecutive candidate rows lasting longer than `min_duration_ms`.
///
/// A run covers its first epoch start up to the end of its last epoch, cut
/// short at the start of the next row when epochs are closer than
/// `epoch_length_ms`.
pub fn extract_runs(
    index: &[i64],
    candidates: &[bool],
    epoch_length_ms: i64,
    min_duration_ms: i64,
) -> Result<Vec<NonWearInterval>> {
    if index.len() != candidates.len() {
        return Err(PipelineError::Shape(format!(
            "{} candidate labels for {} rows",
            candidates.len(),
            index.len()
        )));
    }

    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for row in 0..=candidates.len() {
        let idle = candidates.get(row).copied().unwrap_or(false);
        match (start, idle) {
            (None, true) => start = Some(row),
            (Some(first), false) => {
                let end = index[row - 1] + epoch_length_ms;
                let end = index.get(row).map_or(end, |&next| end.min(next));
                let run = NonWearInterval::new(index[first], end);
                if run.duration_ms() > min_duration_ms {
                    runs.push(run);
                }
                start = None;
            }
            _ => {}
        }
    }
    Ok(runs)
}

/// Merge chronologically ordered intervals separated by less than
/// `min_interruption_ms` of wear time.
///
/// Each interval is compared with the interval accumulated so far, so a chain
/// of short interruptions collapses into one interval.
pub fn merge_short_interruptions(
    intervals: &[NonWearInterval],
    min_interruption_ms: i64,
) -> Result<Vec<NonWearInterval>> {
    if let Some(pair) = intervals.windows(2).find(|w| w[1].start_ms < w[0].end_ms) {
        return Err(PipelineError::UnsortedIndex(format!(
            "interval starting at {} overlaps or precedes the interval ending at {}",
            pair[1].start_ms, pair[0].end_ms
        )));
    }

    let mut merged: Vec<NonWearInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(current) if interval.start_ms - current.end_ms < min_interruption_ms => {
                current.end_ms = interval.end_ms;
            }
            _ => merged.push(*interval),
        }
    }
    Ok(merged)
}

/// Removes or masks non-wear epochs of a feature table
#[derive(Debug, Clone, Default)]
pub struct NonWearDetector {
    config: NonWearConfig,
}

impl NonWearDetector {
    pub fn new(config: NonWearConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NonWearConfig {
        &self.config
    }

    /// Final merged non-wear intervals of a sorted table
    pub fn intervals(&self, table: &FeatureTable) -> Result<Vec<NonWearInterval>> {
        if !table.is_strictly_increasing() {
            return Err(PipelineError::UnsortedIndex(
                "feature table must be sorted and de-duplicated before non-wear detection".to_string(),
            ));
        }

        let candidates =
            label_candidates(table, &self.config.std_columns, self.config.std_threshold_g)?;
        let runs = extract_runs(
            table.index(),
            &candidates,
            self.config.epoch_length_ms(),
            seconds_to_ms(self.config.min_duration_s),
        )?;
        merge_short_interruptions(&runs, seconds_to_ms(self.config.min_interruption_s))
    }

    /// Apply the configured removal or masking
    pub fn apply(&self, table: &FeatureTable, diagnostics: &Diagnostics) -> Result<FeatureTable> {
        let intervals = self.intervals(table)?;
        let flags: Vec<bool> = table
            .index()
            .iter()
            .map(|&ts| intervals.iter().any(|i| i.contains(ts)))
            .collect();
        let epochs = flags.iter().filter(|&&f| f).count();

        debug!(intervals = intervals.len(), epochs, "non-wear labelled");
        if !intervals.is_empty() {
            diagnostics.report(DataQualityWarning::NonWearRemoved {
                intervals: intervals.len(),
                epochs,
            });
        }

        if self.config.remove {
            return Ok(table.filter_rows(|row| !flags[row]));
        }

        let mut masked = table.clone();
        // rows flagged by an earlier pass stay flagged
        let previous = masked.take_column(NON_WEAR_COLUMN);
        for column in masked.columns_mut() {
            for (value, &flag) in column.values.iter_mut().zip(&flags) {
                if flag {
                    *value = f64::NAN;
                }
            }
        }
        let marked = flags
            .iter()
            .enumerate()
            .map(|(row, &f)| i32::from(f || previous.as_ref().is_some_and(|p| p.values[row] == 1.0)))
            .collect();
        masked.push_column(FeatureSeries::integer(NON_WEAR_COLUMN, marked))?;
        info!(epochs, "non-wear epochs masked");
        Ok(masked)
    }
}

impl Node for NonWearDetector {
    fn input_arity(&self) -> Option<usize> {
        Some(1)
    }

    fn output_arity(&self, _inputs: Option<usize>) -> Option<usize> {
        Some(1)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        expect_inputs(&name, inputs, 1)?;
        let table = inputs[0]
            .as_table()
            .ok_or_else(|| unsupported(&name, "table", &inputs[0]))?;
        Ok(vec![Signal::Table(self.apply(table, diagnostics)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR_MS: i64 = 3_600_000;

    /// One-second epochs; rows in `idle` get a tiny std on every axis
    fn table_with_idle(rows: usize, idle: std::ops::Range<usize>) -> FeatureTable {
        let std: Vec<f64> = (0..rows)
            .map(|r| if idle.contains(&r) { 0.001 } else { 0.2 })
            .collect();
        FeatureTable::from_series(
            (0..rows as i64).map(|r| 1_600_000_000_000 + r * 1_000).collect(),
            vec![
                FeatureSeries::new("x_mean", vec![0.5; rows]),
                FeatureSeries::new("x_std", std.clone()),
                FeatureSeries::new("y_std", std.clone()),
                FeatureSeries::new("z_std", std),
            ],
        )
        .unwrap()
    }

    fn config(remove: bool) -> NonWearConfig {
        NonWearConfig {
            min_duration_s: 10.0,
            min_interruption_s: 5.0,
            remove,
            epoch_length_s: 1.0,
            ..NonWearConfig::default()
        }
    }

    #[test]
    fn test_candidates_require_every_axis() {
        let mut table = table_with_idle(4, 0..4);
        table.columns_mut()[2].values[1] = 0.5;
        table.columns_mut()[3].values[2] = f64::NAN;

        let labels = label_candidates(&table, &NonWearConfig::default().std_columns, 0.013).unwrap();
        assert_eq!(labels, vec![true, false, false, true]);
    }

    #[test]
    fn test_short_runs_are_discarded() {
        let index: Vec<i64> = (0..10).map(|i| i * 1_000).collect();
        let candidates = [true, true, false, true, true, true, true, false, true, true];
        let runs = extract_runs(&index, &candidates, 1_000, 3_000).unwrap();
        assert_eq!(runs, vec![NonWearInterval::new(3_000, 7_000)]);
    }

    #[test]
    fn test_run_at_end_of_table_is_closed() {
        let index = [0, 1_000, 2_000];
        let runs = extract_runs(&index, &[false, true, true], 1_000, 1_000).unwrap();
        assert_eq!(runs, vec![NonWearInterval::new(1_000, 3_000)]);
    }

    #[test]
    fn test_run_must_exceed_minimum_duration() {
        let index: Vec<i64> = (0..3600).map(|i| i * 1_000).collect();
        let exact = extract_runs(&index, &vec![true; 3600], 1_000, HOUR_MS).unwrap();
        assert!(exact.is_empty());

        let index: Vec<i64> = (0..3601).map(|i| i * 1_000).collect();
        let longer = extract_runs(&index, &vec![true; 3601], 1_000, HOUR_MS).unwrap();
        assert_eq!(longer, vec![NonWearInterval::new(0, 3_601_000)]);
    }

    #[test]
    fn test_merge_tie_break_around_threshold() {
        let first = NonWearInterval::new(0, 3_601_000);
        let run = 3_601_000;

        let close_start = first.end_ms + 3_599_000;
        let close = [first, NonWearInterval::new(close_start, close_start + run)];
        assert_eq!(
            merge_short_interruptions(&close, HOUR_MS).unwrap(),
            vec![NonWearInterval::new(0, close_start + run)]
        );

        let far_start = first.end_ms + 3_601_000;
        let far = [first, NonWearInterval::new(far_start, far_start + run)];
        assert_eq!(merge_short_interruptions(&far, HOUR_MS).unwrap(), far.to_vec());
    }

    #[test]
    fn test_merge_collapses_chains() {
        let intervals = [
            NonWearInterval::new(0, 10),
            NonWearInterval::new(12, 20),
            NonWearInterval::new(22, 30),
            NonWearInterval::new(100, 110),
        ];
        assert_eq!(
            merge_short_interruptions(&intervals, 5).unwrap(),
            vec![NonWearInterval::new(0, 30), NonWearInterval::new(100, 110)]
        );
    }

    #[test]
    fn test_merge_edge_cases() {
        assert!(merge_short_interruptions(&[], 5).unwrap().is_empty());
        let single = [NonWearInterval::new(0, 10)];
        assert_eq!(merge_short_interruptions(&single, 5).unwrap(), single.to_vec());
    }

    #[test]
    fn test_merge_rejects_unordered_intervals() {
        let intervals = [NonWearInterval::new(50, 60), NonWearInterval::new(0, 10)];
        let err = merge_short_interruptions(&intervals, 5).unwrap_err();
        assert!(matches!(err, PipelineError::UnsortedIndex(_)));
    }

    #[test]
    fn test_remove_mode_drops_non_wear_rows() {
        let diagnostics = Diagnostics::new();
        let detector = NonWearDetector::new(config(true)).unwrap();
        let table = table_with_idle(40, 5..20);

        let out = detector
            .process(&[Signal::Table(table.clone())], &diagnostics)
            .unwrap();
        let cleaned = out[0].as_table().unwrap();

        assert_eq!(cleaned.n_rows(), 25);
        assert_eq!(cleaned.n_columns(), table.n_columns());
        assert!(!cleaned.index().contains(&table.index()[5]));
        assert!(cleaned.index().contains(&table.index()[20]));
        assert_eq!(
            diagnostics.warnings(),
            vec![DataQualityWarning::NonWearRemoved {
                intervals: 1,
                epochs: 15
            }]
        );
    }

    #[test]
    fn test_mask_mode_keeps_rows() {
        let detector = NonWearDetector::new(config(false)).unwrap();
        let masked = detector
            .apply(&table_with_idle(40, 5..20), &Diagnostics::new())
            .unwrap();

        assert_eq!(masked.n_rows(), 40);
        let flags = &masked.column(NON_WEAR_COLUMN).unwrap().values;
        assert_eq!(flags.iter().sum::<f64>(), 15.0);
        assert!(masked.column("x_mean").unwrap().values[5].is_nan());
        assert_eq!(masked.column("x_mean").unwrap().values[20], 0.5);
    }

    #[test]
    fn test_mask_mode_can_run_twice() {
        let detector = NonWearDetector::new(config(false)).unwrap();
        let once = detector.apply(&table_with_idle(40, 5..20), &Diagnostics::new()).unwrap();
        let twice = detector.apply(&once, &Diagnostics::new()).unwrap();

        assert_eq!(twice.n_columns(), once.n_columns());
        assert_eq!(twice.column(NON_WEAR_COLUMN), once.column(NON_WEAR_COLUMN));
    }

    #[test]
    fn test_ragged_std_column_is_a_shape_error() {
        let mut table = table_with_idle(3, 0..3);
        table.columns_mut()[1].values.truncate(1);
        let err = NonWearDetector::default().apply(&table, &Diagnostics::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Shape(_)), "{}", err);
    }

    #[test]
    fn test_runs_stop_at_next_row_when_epochs_are_shorter_than_configured() {
        // one-second rows under the default five-second epoch length
        let mut table = table_with_idle(200, 0..200);
        for c in 1..4 {
            table.columns_mut()[c].values[80] = 0.2;
        }
        let detector = NonWearDetector::new(NonWearConfig {
            min_duration_s: 60.0,
            min_interruption_s: 60.0,
            ..NonWearConfig::default()
        })
        .unwrap();

        let start = table.index()[0];
        let candidates = label_candidates(&table, &detector.config().std_columns, 0.013).unwrap();
        assert_eq!(
            extract_runs(table.index(), &candidates, 5_000, 60_000).unwrap(),
            vec![
                NonWearInterval::new(start, start + 80_000),
                NonWearInterval::new(start + 81_000, start + 204_000),
            ]
        );

        let diagnostics = Diagnostics::new();
        assert!(detector.apply(&table, &diagnostics).unwrap().is_empty());
        assert_eq!(
            diagnostics.warnings(),
            vec![DataQualityWarning::NonWearRemoved { intervals: 1, epochs: 200 }]
        );
    }

    #[test]
    fn test_short_wear_gap_is_removed_with_neighbours() {
        let mut table = table_with_idle(60, 0..20);
        for row in 22..40 {
            for c in 1..4 {
                table.columns_mut()[c].values[row] = 0.001;
            }
        }
        let detector = NonWearDetector::new(config(true)).unwrap();
        assert_eq!(
            detector.intervals(&table).unwrap(),
            vec![NonWearInterval::new(table.index()[0], table.index()[39] + 1_000)]
        );
        assert_eq!(detector.apply(&table, &Diagnostics::new()).unwrap().n_rows(), 20);
    }

    #[test]
    fn test_all_wear_reports_nothing() {
        let diagnostics = Diagnostics::new();
        let detector = NonWearDetector::new(config(true)).unwrap();
        let table = table_with_idle(30, 0..0);
        assert_eq!(detector.apply(&table, &diagnostics).unwrap(), table);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unsorted_index_is_rejected() {
        let table = FeatureTable::from_series(
            vec![2_000, 1_000],
            vec![
                FeatureSeries::new("x_std", vec![0.0, 0.0]),
                FeatureSeries::new("y_std", vec![0.0, 0.0]),
                FeatureSeries::new("z_std", vec![0.0, 0.0]),
            ],
        )
        .unwrap();
        let err = NonWearDetector::default()
            .apply(&table, &Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsortedIndex(_)));
    }

    #[test]
    fn test_missing_std_column_fails_fast() {
        let table = FeatureTable::from_series(vec![0], vec![FeatureSeries::new("x_std", vec![0.0])]).unwrap();
        let err = NonWearDetector::default()
            .apply(&table, &Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(name) if name == "y_std"));
    }

    #[test]
    fn test_requires_exactly_one_table() {
        let detector = NonWearDetector::default();
        let err = detector.process(&[], &Diagnostics::new()).unwrap_err();
        assert!(err.is_configuration());
        let err = detector
            .process(&[Signal::Scalar(1.0)], &Diagnostics::new())
            .unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = NonWearConfig {
            epoch_length_s: 0.0,
            ..NonWearConfig::default()
        };
        assert!(NonWearDetector::new(config).unwrap_err().is_configuration());
    }
}
