//! Core types for the ax3-flux pipeline
//!
//! This module defines the values that flow between nodes: raw channels,
//! epoch matrices, spectra, per-epoch feature series and feature tables.

use ndarray::{Array1, Array2, ArrayD};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::table::FeatureTable;

/// A value passed between pipeline nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// One physical quantity sampled over time
    Channel(Array1<f64>),
    /// Rows are epochs, columns the samples within each epoch
    Epochs(Array2<f64>),
    /// Complex spectrum, one row per epoch
    Spectrum(Array2<Complex64>),
    /// Single value, e.g. a definite integral over a whole channel
    Scalar(f64),
    /// Named per-epoch feature values
    Series(FeatureSeries),
    /// Time-indexed feature table
    Table(FeatureTable),
}

impl Signal {
    /// Variant name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Channel(_) => "channel",
            Signal::Epochs(_) => "epochs",
            Signal::Spectrum(_) => "spectrum",
            Signal::Scalar(_) => "scalar",
            Signal::Series(_) => "series",
            Signal::Table(_) => "table",
        }
    }

    pub fn channel(values: impl Into<Vec<f64>>) -> Self {
        Signal::Channel(Array1::from(values.into()))
    }

    pub fn as_channel(&self) -> Option<&Array1<f64>> {
        match self {
            Signal::Channel(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_epochs(&self) -> Option<&Array2<f64>> {
        match self {
            Signal::Epochs(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_spectrum(&self) -> Option<&Array2<Complex64>> {
        match self {
            Signal::Spectrum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&FeatureSeries> {
        match self {
            Signal::Series(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&FeatureTable> {
        match self {
            Signal::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_series(self, node: &str) -> Result<FeatureSeries> {
        match self {
            Signal::Series(s) => Ok(s),
            other => Err(unsupported(node, "series", &other)),
        }
    }

    pub fn into_table(self, node: &str) -> Result<FeatureTable> {
        match self {
            Signal::Table(t) => Ok(t),
            other => Err(unsupported(node, "table", &other)),
        }
    }

    /// Real-valued sample data as an n-dimensional array (channel or epochs)
    pub(crate) fn real_samples(&self, node: &str) -> Result<ArrayD<f64>> {
        match self {
            Signal::Channel(c) => Ok(c.clone().into_dyn()),
            Signal::Epochs(e) => Ok(e.clone().into_dyn()),
            other => Err(unsupported(node, "channel or epochs", other)),
        }
    }

    /// Rebuild a channel or epoch matrix from an n-dimensional array
    pub(crate) fn from_real_samples(array: ArrayD<f64>, node: &str) -> Result<Self> {
        match array.ndim() {
            1 => array
                .into_dimensionality::<ndarray::Ix1>()
                .map(Signal::Channel)
                .map_err(|e| PipelineError::Shape(format!("{}: {}", node, e))),
            2 => array
                .into_dimensionality::<ndarray::Ix2>()
                .map(Signal::Epochs)
                .map_err(|e| PipelineError::Shape(format!("{}: {}", node, e))),
            n => Err(PipelineError::Shape(format!(
                "{}: expected a 1-d channel or 2-d epoch matrix, got {} dimensions",
                node, n
            ))),
        }
    }

    /// Squared magnitude per sample, arranged as rows of epochs
    pub(crate) fn power(&self, node: &str) -> Result<Array2<f64>> {
        match self {
            Signal::Epochs(e) => Ok(e.mapv(|v| v * v)),
            Signal::Spectrum(s) => Ok(s.mapv(|c| c.norm_sqr())),
            other => Err(unsupported(node, "epochs or spectrum", other)),
        }
    }

    /// Array dimensions; `[rows, columns]` for tables, empty for scalars
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Signal::Channel(c) => c.shape().to_vec(),
            Signal::Epochs(e) => e.shape().to_vec(),
            Signal::Spectrum(s) => s.shape().to_vec(),
            Signal::Scalar(_) => Vec::new(),
            Signal::Series(s) => vec![s.len()],
            Signal::Table(t) => vec![t.n_rows(), t.n_columns()],
        }
    }
}

impl From<Array1<f64>> for Signal {
    fn from(values: Array1<f64>) -> Self {
        Signal::Channel(values)
    }
}

impl From<Array2<f64>> for Signal {
    fn from(values: Array2<f64>) -> Self {
        Signal::Epochs(values)
    }
}

impl From<FeatureSeries> for Signal {
    fn from(series: FeatureSeries) -> Self {
        Signal::Series(series)
    }
}

impl From<FeatureTable> for Signal {
    fn from(table: FeatureTable) -> Self {
        Signal::Table(table)
    }
}

pub(crate) fn unsupported(node: &str, expected: &'static str, actual: &Signal) -> PipelineError {
    PipelineError::UnsupportedSignal {
        node: node.to_string(),
        expected,
        actual: actual.kind(),
    }
}

/// Numeric type a feature series was declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Float,
    Integer,
}

/// Named sequence with one value per retained epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub kind: ValueKind,
    /// SI unit when the feature carries a physical meaning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl FeatureSeries {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            kind: ValueKind::Float,
            unit: None,
        }
    }

    pub fn integer(name: impl Into<String>, values: Vec<i32>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(f64::from).collect(),
            kind: ValueKind::Integer,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
