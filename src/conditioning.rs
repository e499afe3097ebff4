//! Signal conditioning nodes
//!
//! - [`TrapezoidalIntegrator`]: cumulative or definite trapezoidal integration
//! - [`VectorMagnitude`]: Euclidean norm across the x, y, z channels
//! - [`EuclideanNormMinusOne`]: gravity-corrected magnitude (ENMO), floored at zero
//! - [`Dft`]: complex spectrum per channel or per epoch
//!
//! Channels are integrated over their whole length, epoch matrices row by row.

use ndarray::{Array1, Array2, ArrayD, Axis, Zip};
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{DataQualityWarning, Diagnostics};
use crate::error::{PipelineError, Result};
use crate::node::Node;
use crate::types::{unsupported, Signal};

/// Trapezoidal integration settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Value the running integral starts from
    pub first_value: f64,
    /// Spacing between samples (seconds)
    pub time_delta_s: f64,
    /// Running integral when true, single definite integral otherwise
    pub cumulative: bool,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            first_value: 0.0,
            time_delta_s: 0.01,
            cumulative: true,
        }
    }
}

/// Numerical integration with the trapezoidal rule
#[derive(Debug, Clone, Default)]
pub struct TrapezoidalIntegrator {
    config: IntegratorConfig,
}

impl TrapezoidalIntegrator {
    pub fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    /// Definite integral with the default sample spacing
    pub fn definite() -> Self {
        Self::new(IntegratorConfig {
            cumulative: false,
            ..IntegratorConfig::default()
        })
    }

    pub fn config(&self) -> IntegratorConfig {
        self.config
    }

    fn cumulative_of(&self, values: &[f64]) -> Vec<f64> {
        let dx = self.config.time_delta_s;
        let mut out = Vec::with_capacity(values.len());
        let mut acc = self.config.first_value;
        if !values.is_empty() {
            out.push(acc);
        }
        for w in values.windows(2) {
            acc += dx * (w[0] + w[1]) / 2.0;
            out.push(acc);
        }
        out
    }

    fn definite_of(&self, values: &[f64]) -> f64 {
        let dx = self.config.time_delta_s;
        values.windows(2).map(|w| dx * (w[0] + w[1]) / 2.0).sum()
    }

    fn integrate(&self, input: &Signal) -> Result<Signal> {
        match (input, self.config.cumulative) {
            (Signal::Channel(c), true) => Ok(Signal::Channel(Array1::from(
                self.cumulative_of(&c.to_vec()),
            ))),
            (Signal::Channel(c), false) => Ok(Signal::Scalar(self.definite_of(&c.to_vec()))),
            (Signal::Epochs(e), true) => {
                let mut out = Array2::zeros(e.raw_dim());
                for (src, mut dst) in e.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
                    dst.assign(&Array1::from(self.cumulative_of(&src.to_vec())));
                }
                Ok(Signal::Epochs(out))
            }
            (Signal::Epochs(e), false) => Ok(Signal::Channel(
                e.axis_iter(Axis(0))
                    .map(|row| self.definite_of(&row.to_vec()))
                    .collect(),
            )),
            (other, _) => Err(unsupported(&self.name(), "channel or epochs", other)),
        }
    }
}

impl Node for TrapezoidalIntegrator {
    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        inputs.iter().map(|input| self.integrate(input)).collect()
    }
}

/// Euclidean norm across equally shaped channels or epoch matrices
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorMagnitude;

impl VectorMagnitude {
    fn magnitude(node: &str, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<ArrayD<f64>> {
        if inputs.is_empty() {
            return Err(PipelineError::Arity {
                node: node.to_string(),
                expected: 3,
                actual: 0,
            });
        }

        let arrays = inputs
            .iter()
            .map(|s| s.real_samples(node))
            .collect::<Result<Vec<_>>>()?;
        let shape = arrays[0].shape().to_vec();
        if let Some(bad) = arrays.iter().find(|a| a.shape() != shape.as_slice()) {
            return Err(PipelineError::Shape(format!(
                "{}: channel shapes differ ({:?} vs {:?})",
                node,
                shape,
                bad.shape()
            )));
        }

        if arrays.len() == 3 {
            let mut out = ArrayD::zeros(arrays[0].raw_dim());
            Zip::from(&mut out)
                .and(&arrays[0])
                .and(&arrays[1])
                .and(&arrays[2])
                .for_each(|o, &x, &y, &z| *o = (x * x + y * y + z * z).sqrt());
            return Ok(out);
        }

        diagnostics.report(DataQualityWarning::UnexpectedChannelCount {
            node: node.to_string(),
            channels: arrays.len(),
        });
        let mut sum = ArrayD::zeros(arrays[0].raw_dim());
        for array in &arrays {
            sum += &array.mapv(|v| v * v);
        }
        Ok(sum.mapv(f64::sqrt))
    }
}

impl Node for VectorMagnitude {
    fn output_arity(&self, _inputs: Option<usize>) -> Option<usize> {
        Some(1)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        let norm = Self::magnitude(&name, inputs, diagnostics)?;
        Ok(vec![Signal::from_real_samples(norm, &name)?])
    }
}

/// Vector magnitude minus one g, with negative values floored to zero
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanNormMinusOne;

impl Node for EuclideanNormMinusOne {
    fn output_arity(&self, _inputs: Option<usize>) -> Option<usize> {
        Some(1)
    }

    fn process(&self, inputs: &[Signal], diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        let name = self.name();
        let enmo = VectorMagnitude::magnitude(&name, inputs, diagnostics)?.mapv(|v| (v - 1.0).max(0.0));
        Ok(vec![Signal::from_real_samples(enmo, &name)?])
    }
}

/// Discrete Fourier transform; channels yield a single-row spectrum
#[derive(Debug, Clone, Copy, Default)]
pub struct Dft;

impl Dft {
    fn transform(&self, rows: &Array2<f64>) -> Array2<Complex64> {
        let width = rows.ncols();
        let mut out = rows.mapv(|v| Complex64::new(v, 0.0));
        if width == 0 {
            return out;
        }

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(width);
        for mut row in out.axis_iter_mut(Axis(0)) {
            let mut buffer = row.to_vec();
            fft.process(&mut buffer);
            row.assign(&Array1::from(buffer));
        }
        out
    }
}

impl Node for Dft {
    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        inputs
            .iter()
            .map(|input| match input {
                Signal::Epochs(e) => Ok(Signal::Spectrum(self.transform(e))),
                Signal::Channel(c) => {
                    let row = c.to_owned().insert_axis(Axis(0));
                    Ok(Signal::Spectrum(self.transform(&row)))
                }
                other => Err(unsupported(&self.name(), "channel or epochs", other)),
            })
            .collect()
    }
}
