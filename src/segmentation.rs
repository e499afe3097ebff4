//! Epoch segmentation
//!
//! Reshapes equal-length channels into `(n_epochs, samples_per_epoch)`
//! matrices. When the raw timestamps are supplied at construction, epochs
//! whose internal sample spacing deviates from the nominal spacing (median
//! of all consecutive deltas) are marked bad once, and the same rows are
//! removed from every channel processed through this instance. Share one
//! instance (via `Arc`) across branches that must stay time-aligned.

use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::diagnostics::{DataQualityWarning, Diagnostics};
use crate::error::{PipelineError, Result};
use crate::node::Node;
use crate::types::{unsupported, Signal};

/// Samples per epoch: 5 s at 100 Hz
pub const DEFAULT_SAMPLES_PER_EPOCH: usize = 500;

/// Timing information derived from the raw timestamp vector
#[derive(Debug, Clone)]
struct EpochTiming {
    nominal_delta_ms: i64,
    total_epochs: usize,
    /// Sorted row indices of epochs with irregular sampling
    bad_epochs: Vec<usize>,
    /// Start timestamp of every retained epoch
    epoch_starts: Vec<i64>,
}

/// Splits channels into fixed-width, non-overlapping epochs
#[derive(Debug, Clone)]
pub struct EpochSegmenter {
    samples_per_epoch: usize,
    timing: Option<EpochTiming>,
}

impl Default for EpochSegmenter {
    fn default() -> Self {
        Self {
            samples_per_epoch: DEFAULT_SAMPLES_PER_EPOCH,
            timing: None,
        }
    }
}

impl EpochSegmenter {
    /// Segmenter without timestamp validation
    pub fn new(samples_per_epoch: usize) -> Result<Self> {
        check_width(samples_per_epoch)?;
        Ok(Self {
            samples_per_epoch,
            timing: None,
        })
    }

    /// Segmenter that validates epoch contiguity against millisecond timestamps
    pub fn with_timestamps(
        timestamps_ms: &[i64],
        samples_per_epoch: usize,
        diagnostics: &Diagnostics,
    ) -> Result<Self> {
        check_width(samples_per_epoch)?;
        if timestamps_ms.len() < 2 {
            return Err(PipelineError::Configuration(format!(
                "at least two timestamps are required to estimate the sampling delta, got {}",
                timestamps_ms.len()
            )));
        }
        if timestamps_ms.len() % samples_per_epoch != 0 {
            return Err(PipelineError::Shape(format!(
                "{} timestamps cannot be split into epochs of {} samples",
                timestamps_ms.len(),
                samples_per_epoch
            )));
        }

        let nominal_delta_ms = nominal_delta(timestamps_ms);
        let total_epochs = timestamps_ms.len() / samples_per_epoch;

        let mut bad_epochs = Vec::new();
        let mut epoch_starts = Vec::with_capacity(total_epochs);
        for (row, epoch) in timestamps_ms.chunks_exact(samples_per_epoch).enumerate() {
            if epoch.windows(2).any(|w| w[1] - w[0] != nominal_delta_ms) {
                bad_epochs.push(row);
            } else {
                epoch_starts.push(epoch[0]);
            }
        }

        if !bad_epochs.is_empty() {
            diagnostics.report(DataQualityWarning::BadEpochsRemoved {
                removed: bad_epochs.len(),
                nominal_delta_ms,
            });
        }
        debug!(
            total_epochs,
            retained = epoch_starts.len(),
            nominal_delta_ms,
            "epoch timing computed"
        );

        Ok(Self {
            samples_per_epoch,
            timing: Some(EpochTiming {
                nominal_delta_ms,
                total_epochs,
                bad_epochs,
                epoch_starts,
            }),
        })
    }

    pub fn samples_per_epoch(&self) -> usize {
        self.samples_per_epoch
    }

    /// Start timestamp (ms) of every retained epoch
    pub fn timestamps(&self) -> Result<&[i64]> {
        self.timing
            .as_ref()
            .map(|t| t.epoch_starts.as_slice())
            .ok_or_else(|| PipelineError::Configuration("no timestamp sequence provided".to_string()))
    }

    /// Row indices removed from every processed channel
    pub fn bad_epochs(&self) -> &[usize] {
        self.timing
            .as_ref()
            .map(|t| t.bad_epochs.as_slice())
            .unwrap_or(&[])
    }

    /// Estimated sampling delta, when timestamps were supplied
    pub fn nominal_delta_ms(&self) -> Option<i64> {
        self.timing.as_ref().map(|t| t.nominal_delta_ms)
    }

    /// Reshape one channel and drop the bad epochs
    pub fn segment(&self, channel: &Array1<f64>) -> Result<Array2<f64>> {
        let width = self.samples_per_epoch;
        if channel.len() % width != 0 {
            return Err(PipelineError::Shape(format!(
                "channel of length {} is not a multiple of the epoch width {}",
                channel.len(),
                width
            )));
        }

        let rows = channel.len() / width;
        let epochs = channel
            .to_owned()
            .into_shape((rows, width))
            .map_err(|e| PipelineError::Shape(e.to_string()))?;

        let timing = match &self.timing {
            Some(timing) => timing,
            None => return Ok(epochs),
        };

        if rows != timing.total_epochs {
            return Err(PipelineError::Shape(format!(
                "channel spans {} epochs but the timestamps span {}",
                rows, timing.total_epochs
            )));
        }
        if timing.bad_epochs.is_empty() {
            return Ok(epochs);
        }

        let keep: Vec<usize> = (0..rows)
            .filter(|row| timing.bad_epochs.binary_search(row).is_err())
            .collect();
        Ok(epochs.select(Axis(0), &keep))
    }
}

impl Node for EpochSegmenter {
    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        inputs
            .iter()
            .map(|input| match input {
                Signal::Channel(channel) => self.segment(channel).map(Signal::Epochs),
                other => Err(unsupported(&self.name(), "channel", other)),
            })
            .collect()
    }
}

fn check_width(samples_per_epoch: usize) -> Result<()> {
    if samples_per_epoch == 0 {
        return Err(PipelineError::Configuration(
            "epoch width must be at least one sample".to_string(),
        ));
    }
    Ok(())
}

/// Median of consecutive deltas, truncated to whole milliseconds
fn nominal_delta(timestamps_ms: &[i64]) -> i64 {
    let mut deltas: Vec<i64> = timestamps_ms.windows(2).map(|w| w[1] - w[0]).collect();
    deltas.sort_unstable();
    let mid = deltas.len() / 2;
    if deltas.len() % 2 == 1 {
        deltas[mid]
    } else {
        ((deltas[mid - 1] as f64 + deltas[mid] as f64) / 2.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_timestamps(n: usize, delta: i64) -> Vec<i64> {
        (0..n as i64).map(|i| 1_600_000_000_000 + i * delta).collect()
    }

    #[test]
    fn test_segment_without_timestamps() {
        let segmenter = EpochSegmenter::new(4).unwrap();
        let channel = Array1::from((0..12).map(f64::from).collect::<Vec<_>>());
        let epochs = segmenter.segment(&channel).unwrap();
        assert_eq!(epochs.dim(), (3, 4));
        assert_eq!(epochs[[1, 0]], 4.0);
        assert_eq!(epochs[[2, 3]], 11.0);
    }

    #[test]
    fn test_length_not_multiple_of_width_is_shape_error() {
        let segmenter = EpochSegmenter::new(5).unwrap();
        let err = segmenter.segment(&Array1::zeros(12)).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_zero_width_is_configuration_error() {
        assert!(EpochSegmenter::new(0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_regular_timestamps_keep_all_epochs() {
        let diagnostics = Diagnostics::new();
        let ts = regular_timestamps(40, 10);
        let segmenter = EpochSegmenter::with_timestamps(&ts, 10, &diagnostics).unwrap();

        assert_eq!(segmenter.nominal_delta_ms(), Some(10));
        assert!(segmenter.bad_epochs().is_empty());
        assert_eq!(segmenter.timestamps().unwrap(), &[ts[0], ts[10], ts[20], ts[30]]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_gap_removes_same_epoch_from_every_channel() {
        let diagnostics = Diagnostics::new();
        let mut ts = regular_timestamps(40, 10);
        // gap between samples 24 and 25 lies inside epoch 2
        for t in ts.iter_mut().skip(25) {
            *t += 500;
        }
        let segmenter = EpochSegmenter::with_timestamps(&ts, 10, &diagnostics).unwrap();
        assert_eq!(segmenter.bad_epochs(), &[2]);
        assert_eq!(segmenter.timestamps().unwrap().len(), 3);

        let x = Signal::channel((0..40).map(f64::from).collect::<Vec<_>>());
        let y = Signal::channel((0..40).map(|i| -f64::from(i)).collect::<Vec<_>>());
        let out = segmenter.process(&[x, y], &diagnostics).unwrap();

        let ex = out[0].as_epochs().unwrap();
        let ey = out[1].as_epochs().unwrap();
        assert_eq!(ex.nrows(), 3);
        assert_eq!(ey.nrows(), 3);
        assert_eq!(ex[[2, 0]], 30.0);
        assert_eq!(ey[[2, 0]], -30.0);

        assert_eq!(
            diagnostics.warnings(),
            vec![DataQualityWarning::BadEpochsRemoved {
                removed: 1,
                nominal_delta_ms: 10
            }]
        );
    }

    #[test]
    fn test_gap_on_epoch_boundary_is_not_flagged() {
        let mut ts = regular_timestamps(30, 10);
        for t in ts.iter_mut().skip(10) {
            *t += 1_000;
        }
        let segmenter = EpochSegmenter::with_timestamps(&ts, 10, &Diagnostics::new()).unwrap();
        assert!(segmenter.bad_epochs().is_empty());
    }

    #[test]
    fn test_channel_epoch_count_must_match_timestamps() {
        let ts = regular_timestamps(20, 10);
        let segmenter = EpochSegmenter::with_timestamps(&ts, 10, &Diagnostics::new()).unwrap();
        assert!(segmenter.segment(&Array1::zeros(30)).unwrap_err().is_shape());
    }

    #[test]
    fn test_timestamps_required_for_epoch_starts() {
        let segmenter = EpochSegmenter::default();
        assert!(segmenter.timestamps().unwrap_err().is_configuration());
    }

    #[test]
    fn test_nominal_delta_even_count_truncates() {
        assert_eq!(nominal_delta(&[0, 10, 21]), 10);
        assert_eq!(nominal_delta(&[0, 10, 20, 40]), 10);
    }

    #[test]
    fn test_rejects_non_channel_input() {
        let segmenter = EpochSegmenter::new(2).unwrap();
        let err = segmenter
            .process(&[Signal::Scalar(1.0)], &Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedSignal { .. }));
    }
}
