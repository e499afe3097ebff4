//! Pipeline configuration
//!
//! Every tunable of the reference pipeline in one serde document. Missing
//! sections and fields fall back to their defaults, so `{}` is a valid
//! configuration.

use serde::{Deserialize, Serialize};

use crate::conditioning::IntegratorConfig;
use crate::daily::ComplianceConfig;
use crate::error::{PipelineError, Result};
use crate::features::ActivityThresholds;
use crate::filters::{ButterworthConfig, DEFAULT_SAMPLING_FREQUENCY_HZ};
use crate::postprocess::NonWearConfig;
use crate::segmentation::DEFAULT_SAMPLES_PER_EPOCH;

/// Epoch lengths of the stand-alone sections must agree within this (s)
const EPOCH_LENGTH_TOLERANCE_S: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub frequency_hz: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_SAMPLING_FREQUENCY_HZ,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochConfig {
    pub samples_per_epoch: usize,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            samples_per_epoch: DEFAULT_SAMPLES_PER_EPOCH,
        }
    }
}

/// Integration settings; the sample spacing follows the sampling frequency
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub first_value: f64,
}

/// Configuration of the reference accelerometer pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sampling: SamplingConfig,
    pub lowpass: ButterworthConfig,
    pub highpass: ButterworthConfig,
    pub epoch: EpochConfig,
    pub integrator: IntegrationConfig,
    pub activity: ActivityThresholds,
    pub non_wear: NonWearConfig,
    pub compliance: ComplianceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            lowpass: ButterworthConfig::lowpass_default(),
            highpass: ButterworthConfig::highpass_default(),
            epoch: EpochConfig::default(),
            integrator: IntegrationConfig::default(),
            activity: ActivityThresholds::default(),
            non_wear: NonWearConfig::default(),
            compliance: ComplianceConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Duration of one epoch in seconds
    pub fn epoch_length_s(&self) -> f64 {
        self.epoch.samples_per_epoch as f64 / self.sampling.frequency_hz
    }

    /// Integrator settings with the sample spacing of the configured frequency
    pub fn integrator_config(&self, cumulative: bool) -> IntegratorConfig {
        IntegratorConfig {
            first_value: self.integrator.first_value,
            time_delta_s: 1.0 / self.sampling.frequency_hz,
            cumulative,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fs = self.sampling.frequency_hz;
        if fs.is_nan() || fs <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "sampling frequency must be positive, got {}",
                fs
            )));
        }
        self.lowpass.validate(fs)?;
        self.highpass.validate(fs)?;

        if self.epoch.samples_per_epoch < 2 {
            return Err(PipelineError::Configuration(format!(
                "an epoch needs at least two samples, got {}",
                self.epoch.samples_per_epoch
            )));
        }

        let activity = &self.activity;
        if !(activity.moderate_threshold_g > 0.0
            && activity.moderate_threshold_g < activity.vigorous_threshold_g)
        {
            return Err(PipelineError::Configuration(format!(
                "activity thresholds must satisfy 0 < moderate ({}) < vigorous ({})",
                activity.moderate_threshold_g, activity.vigorous_threshold_g
            )));
        }

        self.non_wear.validate()?;
        self.compliance.validate()?;

        let epoch_length_s = self.epoch_length_s();
        for (section, length) in [
            ("non_wear", self.non_wear.epoch_length_s),
            ("compliance", self.compliance.epoch_length_s),
        ] {
            if (length - epoch_length_s).abs() > EPOCH_LENGTH_TOLERANCE_S {
                return Err(PipelineError::Configuration(format!(
                    "{}.epoch_length_s is {} but epochs of {} samples at {} Hz last {} s",
                    section, length, self.epoch.samples_per_epoch, fs, epoch_length_s
                )));
            }
        }
        Ok(())
    }
}
