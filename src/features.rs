//! Per-epoch feature extraction
//!
//! Viewed as a graph, feature extractors are the sinks of a pipeline. Every
//! extractor works on epoch matrices (rows = epochs) and returns one named
//! series per input channel. When more than one channel is given, names are
//! prefixed with the channel axis (`x_`, `y_`, `z_`).

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::node::Node;
use crate::types::{unsupported, FeatureSeries, Signal};

/// Added to every power bin so empty bins do not hit log(0)
const ENTROPY_EPSILON: f64 = 1e-24;

/// Prefix for channel `index` out of `count` channels
pub fn axis_prefix(index: usize, count: usize) -> String {
    if count == 1 {
        return String::new();
    }
    match index {
        0 => "x_".to_string(),
        1 => "y_".to_string(),
        2 => "z_".to_string(),
        n => format!("c{}_", n),
    }
}

fn expect_epochs<'a>(node: &str, input: &'a Signal) -> Result<&'a Array2<f64>> {
    input
        .as_epochs()
        .ok_or_else(|| unsupported(node, "epochs", input))
}

/// Quantile with linear interpolation between closest ranks
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RowStats {
    mean: f64,
    median: f64,
    std: f64,
    min: f64,
    max: f64,
    q05: f64,
    q95: f64,
}

fn row_stats(row: ArrayView1<f64>) -> RowStats {
    let n = row.len() as f64;
    let mean = row.sum() / n;
    let std = (row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    let mut sorted = row.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    RowStats {
        mean,
        median: quantile(&sorted, 0.5),
        std,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        max: sorted.last().copied().unwrap_or(f64::NAN),
        // quantiles are declared single precision
        q05: quantile(&sorted, 0.05) as f32 as f64,
        q95: quantile(&sorted, 0.95) as f32 as f64,
    }
}

/// Names of the seven summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryNames {
    pub mean: String,
    pub median: String,
    pub std: String,
    pub min: String,
    pub max: String,
    pub q_5: String,
    pub q_95: String,
}

impl SummaryNames {
    /// `mean`, `median`, ... with an optional `_{suffix}`
    pub fn with_suffix(suffix: Option<&str>) -> Self {
        let name = |base: &str| match suffix {
            Some(s) => format!("{}_{}", base, s),
            None => base.to_string(),
        };
        Self {
            mean: name("mean"),
            median: name("median"),
            std: name("std"),
            min: name("min"),
            max: name("max"),
            q_5: name("q_5"),
            q_95: name("q_95"),
        }
    }
}

impl Default for SummaryNames {
    fn default() -> Self {
        Self::with_suffix(None)
    }
}

/// Mean, median, standard deviation, min, max, 5th and 95th percentile per epoch
#[derive(Debug, Clone, Default)]
pub struct TimeDomainSummaryStatistics {
    names: SummaryNames,
    unit: Option<String>,
    label: Option<&'static str>,
}

impl TimeDomainSummaryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(names: SummaryNames) -> Self {
        Self {
            names,
            unit: None,
            label: None,
        }
    }

    /// Statistics of ENMO epochs (`mean_enmo`, ...)
    pub fn enmo() -> Self {
        Self {
            names: SummaryNames::with_suffix(Some("enmo")),
            unit: None,
            label: Some("EnmoSummaryStatistics"),
        }
    }

    /// Statistics of integrated acceleration (`mean_velocity`, ..., in m/s)
    pub fn velocity() -> Self {
        Self {
            names: SummaryNames::with_suffix(Some("velocity")),
            unit: Some("m/s".to_string()),
            label: Some("ApproximateVelocity"),
        }
    }

    pub fn names(&self) -> &SummaryNames {
        &self.names
    }

    fn extract(&self, prefix: &str, epochs: &Array2<f64>) -> Vec<FeatureSeries> {
        let stats: Vec<RowStats> = epochs.axis_iter(Axis(0)).map(row_stats).collect();
        let column = |name: &str, pick: fn(&RowStats) -> f64| {
            let series = FeatureSeries::new(
                format!("{}{}", prefix, name),
                stats.iter().map(pick).collect(),
            );
            match &self.unit {
                Some(unit) => series.with_unit(unit.clone()),
                None => series,
            }
        };

        vec![
            column(&self.names.mean, |s| s.mean),
            column(&self.names.median, |s| s.median),
            column(&self.names.std, |s| s.std),
            column(&self.names.min, |s| s.min),
            column(&self.names.max, |s| s.max),
            column(&self.names.q_5, |s| s.q05),
            column(&self.names.q_95, |s| s.q95),
        ]
    }
}

impl Node for TimeDomainSummaryStatistics {
    fn name(&self) -> String {
        self.label.unwrap_or("TimeDomainSummaryStatistics").to_string()
    }

    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        inputs.map(|n| n * 7)
    }

    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        let mut out = Vec::with_capacity(inputs.len() * 7);
        for (i, input) in inputs.iter().enumerate() {
            let epochs = expect_epochs(&name, input)?;
            let prefix = axis_prefix(i, inputs.len());
            out.extend(self.extract(&prefix, epochs).into_iter().map(Signal::Series));
        }
        Ok(out)
    }
}

/// Names already-integrated per-epoch values as `approximate_distance` (m).
///
/// The integration itself happens upstream in a definite
/// [`TrapezoidalIntegrator`](crate::conditioning::TrapezoidalIntegrator).
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateDistance;

impl Node for ApproximateDistance {
    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let values = match input {
                    Signal::Channel(c) => c.to_vec(),
                    Signal::Scalar(v) => vec![*v],
                    other => return Err(unsupported(&self.name(), "channel or scalar", other)),
                };
                let name = format!("{}approximate_distance", axis_prefix(i, inputs.len()));
                Ok(Signal::Series(FeatureSeries::new(name, values).with_unit("m")))
            })
            .collect()
    }
}

/// Mean squared amplitude per epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct TotalEnergy;

impl Node for TotalEnergy {
    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let power = input.power(&name)?;
                let width = power.ncols() as f64;
                let energy = power.sum_axis(Axis(1)).mapv(|v| v / width).to_vec();
                Ok(Signal::Series(FeatureSeries::new(
                    format!("{}total_energy", axis_prefix(i, inputs.len())),
                    energy,
                )))
            })
            .collect()
    }
}

/// Shannon entropy of the normalized power spectrum per epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralEntropy;

impl SpectralEntropy {
    fn entropy(power: &Array2<f64>) -> Vec<f64> {
        let width = power.ncols() as f64;
        power
            .axis_iter(Axis(0))
            .map(|row| {
                let amp: Vec<f64> = row.iter().map(|p| p / width + ENTROPY_EPSILON).collect();
                let total: f64 = amp.iter().sum();
                -amp.iter()
                    .map(|a| {
                        let p = a / total;
                        p * p.ln()
                    })
                    .sum::<f64>()
            })
            .collect()
    }
}

impl Node for SpectralEntropy {
    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let power = input.power(&name)?;
                Ok(Signal::Series(FeatureSeries::new(
                    format!("{}spectral_entropy", axis_prefix(i, inputs.len())),
                    Self::entropy(&power),
                )))
            })
            .collect()
    }
}

/// Activity intensity cut-points (g)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityThresholds {
    /// Mean epoch values below are sedentary
    pub moderate_threshold_g: f64,
    /// Mean epoch values at or above are vigorous
    pub vigorous_threshold_g: f64,
}

impl Default for ActivityThresholds {
    /// Hildebrand et al. 2014 wrist cut-points
    fn default() -> Self {
        Self {
            moderate_threshold_g: 68.7 / 1000.0,
            vigorous_threshold_g: 266.8 / 1000.0,
        }
    }
}

/// Sedentary / moderate / vigorous indicator series from mean epoch amplitude
#[derive(Debug, Clone, Default)]
pub struct ActivityClasses {
    thresholds: ActivityThresholds,
}

impl ActivityClasses {
    pub fn new(thresholds: ActivityThresholds) -> Self {
        Self { thresholds }
    }
}

impl Node for ActivityClasses {
    fn output_arity(&self, inputs: Option<usize>) -> Option<usize> {
        inputs.map(|n| n * 3)
    }

    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        let moderate = self.thresholds.moderate_threshold_g;
        let vigorous = self.thresholds.vigorous_threshold_g;

        let mut out = Vec::with_capacity(inputs.len() * 3);
        for (i, input) in inputs.iter().enumerate() {
            let epochs = expect_epochs(&name, input)?;
            let means: Vec<f64> = epochs
                .axis_iter(Axis(0))
                .map(|row| row.sum() / row.len() as f64)
                .collect();
            let prefix = axis_prefix(i, inputs.len());
            let indicator = |f: &dyn Fn(f64) -> bool| -> Vec<i32> {
                means.iter().map(|&m| i32::from(f(m))).collect()
            };

            out.push(Signal::Series(FeatureSeries::integer(
                format!("{}sedentary", prefix),
                indicator(&|m| m < moderate),
            )));
            out.push(Signal::Series(FeatureSeries::integer(
                format!("{}moderate", prefix),
                indicator(&|m| m >= moderate && m < vigorous),
            )));
            out.push(Signal::Series(FeatureSeries::integer(
                format!("{}vigorous", prefix),
                indicator(&|m| m >= vigorous),
            )));
        }
        Ok(out)
    }
}
