//! Zero-phase Butterworth filtering
//!
//! The filter is designed as a cascade of second-order sections (plus one
//! first-order section for odd orders) using the bilinear transform with a
//! pre-warped cutoff. It is applied forward and then backward over each
//! channel, with odd-extension padding and steady-state initial conditions
//! at both ends, so the output has no phase distortion.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::diagnostics::Diagnostics;
use crate::error::{PipelineError, Result};
use crate::node::Node;
use crate::types::{unsupported, Signal};

/// Nominal sampling frequency of the source device (Hz)
pub const DEFAULT_SAMPLING_FREQUENCY_HZ: f64 = 100.0;

/// Filter response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Filter order and cutoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButterworthConfig {
    pub order: usize,
    pub cutoff_hz: f64,
}

impl ButterworthConfig {
    /// 4th order, 20 Hz
    pub fn lowpass_default() -> Self {
        Self {
            order: 4,
            cutoff_hz: 20.0,
        }
    }

    /// 2nd order, 0.1 Hz
    pub fn highpass_default() -> Self {
        Self {
            order: 2,
            cutoff_hz: 0.1,
        }
    }

    pub fn validate(&self, sampling_frequency_hz: f64) -> Result<()> {
        if self.order == 0 {
            return Err(PipelineError::Configuration(
                "filter order must be at least 1".to_string(),
            ));
        }
        if !(sampling_frequency_hz > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "sampling frequency must be positive, got {}",
                sampling_frequency_hz
            )));
        }
        let nyquist = 0.5 * sampling_frequency_hz;
        if !(self.cutoff_hz > 0.0 && self.cutoff_hz < nyquist) {
            return Err(PipelineError::Configuration(format!(
                "cutoff frequency {} Hz must lie in (0, {}) Hz",
                self.cutoff_hz, nyquist
            )));
        }
        Ok(())
    }
}

/// One second-order section in transposed direct form II
#[derive(Debug, Clone, Copy, PartialEq)]
struct Section {
    b: [f64; 3],
    a: [f64; 2],
}

impl Section {
    fn second_order(kind: FilterKind, k: f64, inv_q: f64) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k * inv_q + k2);
        let a = [2.0 * (k2 - 1.0) * norm, (1.0 - k * inv_q + k2) * norm];
        let b = match kind {
            FilterKind::Lowpass => [k2 * norm, 2.0 * k2 * norm, k2 * norm],
            FilterKind::Highpass => [norm, -2.0 * norm, norm],
        };
        Self { b, a }
    }

    fn first_order(kind: FilterKind, k: f64) -> Self {
        let norm = 1.0 / (1.0 + k);
        let a = [(k - 1.0) * norm, 0.0];
        let b = match kind {
            FilterKind::Lowpass => [k * norm, k * norm, 0.0],
            FilterKind::Highpass => [norm, -norm, 0.0],
        };
        Self { b, a }
    }

    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Filter in place, starting from the steady state of a constant `x0` input
    fn run(&self, data: &mut [f64], x0: f64) {
        let y0 = x0 * self.dc_gain();
        let mut z2 = self.b[2] * x0 - self.a[1] * y0;
        let mut z1 = self.b[1] * x0 - self.a[0] * y0 + z2;
        for sample in data.iter_mut() {
            let x = *sample;
            let y = self.b[0] * x + z1;
            z1 = self.b[1] * x - self.a[0] * y + z2;
            z2 = self.b[2] * x - self.a[1] * y;
            *sample = y;
        }
    }
}

/// Butterworth low-pass or high-pass filter applied with zero phase
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    kind: FilterKind,
    config: ButterworthConfig,
    sampling_frequency_hz: f64,
    sections: Vec<Section>,
}

impl ButterworthFilter {
    pub fn new(kind: FilterKind, config: ButterworthConfig, sampling_frequency_hz: f64) -> Result<Self> {
        config.validate(sampling_frequency_hz)?;

        let order = config.order;
        let k = (PI * config.cutoff_hz / sampling_frequency_hz).tan();
        let mut sections: Vec<Section> = (0..order / 2)
            .map(|i| {
                let theta = PI * (2 * i + 1) as f64 / (2 * order) as f64;
                Section::second_order(kind, k, 2.0 * theta.sin())
            })
            .collect();
        if order % 2 == 1 {
            sections.push(Section::first_order(kind, k));
        }

        Ok(Self {
            kind,
            config,
            sampling_frequency_hz,
            sections,
        })
    }

    /// 4th order 20 Hz low-pass at 100 Hz
    pub fn lowpass() -> Result<Self> {
        Self::new(
            FilterKind::Lowpass,
            ButterworthConfig::lowpass_default(),
            DEFAULT_SAMPLING_FREQUENCY_HZ,
        )
    }

    /// 2nd order 0.1 Hz high-pass at 100 Hz
    pub fn highpass() -> Result<Self> {
        Self::new(
            FilterKind::Highpass,
            ButterworthConfig::highpass_default(),
            DEFAULT_SAMPLING_FREQUENCY_HZ,
        )
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn config(&self) -> ButterworthConfig {
        self.config
    }

    pub fn sampling_frequency_hz(&self) -> f64 {
        self.sampling_frequency_hz
    }

    fn cascade(&self, data: &mut [f64]) {
        let mut x0 = data[0];
        for section in &self.sections {
            section.run(data, x0);
            x0 *= section.dc_gain();
        }
    }

    /// Forward-backward filtering of one signal
    pub fn filtfilt(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let n = signal.len();
        if n == 0 {
            return Err(PipelineError::Shape(
                "cannot filter an empty channel".to_string(),
            ));
        }

        let pad = (3 * (self.config.order + 1)).min(n - 1);
        let first = signal[0];
        let last = signal[n - 1];

        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        self.cascade(&mut extended);
        extended.reverse();
        self.cascade(&mut extended);
        extended.reverse();

        Ok(extended[pad..pad + n].to_vec())
    }

    fn filter_rows(&self, epochs: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = epochs.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            let filtered = self.filtfilt(&row.to_vec())?;
            row.assign(&Array1::from(filtered));
        }
        Ok(out)
    }
}

impl Node for ButterworthFilter {
    fn name(&self) -> String {
        match self.kind {
            FilterKind::Lowpass => "LowpassButterworthFilter".to_string(),
            FilterKind::Highpass => "HighpassButterworthFilter".to_string(),
        }
    }

    fn process(&self, inputs: &[Signal], _diagnostics: &Diagnostics) -> Result<Vec<Signal>> {
        inputs
            .iter()
            .map(|input| match input {
                Signal::Channel(channel) => self
                    .filtfilt(&channel.to_vec())
                    .map(|v| Signal::Channel(Array1::from(v))),
                Signal::Epochs(epochs) => self.filter_rows(epochs).map(Signal::Epochs),
                other => Err(unsupported(&self.name(), "channel or epochs", other)),
            })
            .collect()
    }
}
