//! Pipeline orchestration
//!
//! This module wires the reference accelerometer pipeline and runs it for one
//! participant recording at a time.
//!
//! ```text
//! lowpass ─┬─ highpass ─ segment ─┬─ integrate ─ magnitude ─┬─ velocity stats
//!          │                      │                         └─ definite integral ─ distance
//!          │                      └─ summary stats
//!          └─ ENMO ─ segment ─┬─ ENMO stats
//!                             ├─ activity classes
//!                             └─ DFT ─┬─ total energy
//!                                     └─ spectral entropy
//!   ─ concat ─ sort/dedupe ─ non-wear
//! ```
//!
//! Both `segment` steps are the same [`EpochSegmenter`] instance, so the two
//! branches drop the same bad epochs and share one timestamp index.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::composition::{Parallel, Sequential};
use crate::conditioning::{Dft, EuclideanNormMinusOne, TrapezoidalIntegrator, VectorMagnitude};
use crate::config::PipelineConfig;
use crate::daily::{daily_features, filter_compliant_days, DailySeries};
use crate::diagnostics::{DataQualityWarning, Diagnostics};
use crate::error::{PipelineError, Result};
use crate::features::{
    ActivityClasses, ApproximateDistance, SpectralEntropy, TimeDomainSummaryStatistics, TotalEnergy,
};
use crate::filters::{ButterworthFilter, FilterKind};
use crate::node::{Node, NodeExt};
use crate::postprocess::{FeatureConcat, NonWearDetector, SortDedupe};
use crate::recording::RawRecording;
use crate::segmentation::EpochSegmenter;
use crate::table::FeatureTable;

/// Build the reference feature pipeline for one recording.
///
/// Takes the three axis channels and returns a single [`FeatureTable`].
pub fn reference_pipeline(
    timestamps_ms: &[i64],
    config: &PipelineConfig,
    diagnostics: &Diagnostics,
) -> Result<Sequential> {
    config.validate()?;
    let fs = config.sampling.frequency_hz;
    let segmenter = Arc::new(EpochSegmenter::with_timestamps(
        timestamps_ms,
        config.epoch.samples_per_epoch,
        diagnostics,
    )?);

    let movement = Sequential::new(vec![
        TrapezoidalIntegrator::new(config.integrator_config(true)).boxed(),
        VectorMagnitude.boxed(),
        Parallel::new(vec![
            TimeDomainSummaryStatistics::velocity().boxed(),
            Sequential::new(vec![
                TrapezoidalIntegrator::new(config.integrator_config(false)).boxed(),
                ApproximateDistance.boxed(),
            ])?
            .boxed(),
        ])?
        .boxed(),
    ])?;

    let acceleration = Sequential::new(vec![
        ButterworthFilter::new(FilterKind::Highpass, config.highpass, fs)?.boxed(),
        Arc::clone(&segmenter).boxed(),
        Parallel::new(vec![movement.boxed(), TimeDomainSummaryStatistics::new().boxed()])?.boxed(),
    ])?;

    let enmo = Sequential::new(vec![
        EuclideanNormMinusOne.boxed(),
        Arc::clone(&segmenter).boxed(),
        Parallel::new(vec![
            TimeDomainSummaryStatistics::enmo().boxed(),
            ActivityClasses::new(config.activity).boxed(),
            Sequential::new(vec![
                Dft.boxed(),
                Parallel::new(vec![TotalEnergy.boxed(), SpectralEntropy.boxed()])?.boxed(),
            ])?
            .boxed(),
        ])?
        .boxed(),
    ])?;

    Sequential::new(vec![
        ButterworthFilter::new(FilterKind::Lowpass, config.lowpass, fs)?.boxed(),
        Parallel::new(vec![acceleration.boxed(), enmo.boxed()])?.boxed(),
        FeatureConcat::from_segmenter(&segmenter)?.boxed(),
        SortDedupe::new(false).boxed(),
        NonWearDetector::new(config.non_wear.clone())?.boxed(),
    ])
}

/// Result of one feature extraction run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub table: FeatureTable,
    pub warnings: Vec<DataQualityWarning>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            computed_at: self.computed_at,
            rows: self.table.n_rows(),
            columns: self.table.column_names().iter().map(|c| c.to_string()).collect(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Run metadata without the feature values
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Day-level result of one run
#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub run_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub compliant_epochs: usize,
    pub days: Vec<DailySeries>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Runs the reference pipeline for one participant at a time.
///
/// Every call builds a fresh pipeline and diagnostics sink, so warnings of
/// one recording never leak into the report of another.
#[derive(Debug, Clone, Default)]
pub struct FeatureProcessor {
    config: PipelineConfig,
}

impl FeatureProcessor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract the per-epoch feature table of a recording
    pub fn process(&self, recording: &RawRecording) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let diagnostics = Diagnostics::new();
        let table = self.extract(recording, &diagnostics)?;
        let warnings = diagnostics.drain();

        info!(
            %run_id,
            samples = recording.len(),
            rows = table.n_rows(),
            columns = table.n_columns(),
            warnings = warnings.len(),
            "feature extraction finished"
        );
        Ok(RunReport {
            run_id,
            computed_at: Utc::now(),
            table,
            warnings,
        })
    }

    /// Extract features, keep wear-time compliant days and aggregate per day
    pub fn process_daily(&self, recording: &RawRecording) -> Result<DailyReport> {
        let run_id = Uuid::new_v4();
        let diagnostics = Diagnostics::new();
        let table = self.extract(recording, &diagnostics)?;
        let compliant = filter_compliant_days(&table, &self.config.compliance, &diagnostics)?;
        let days = daily_features(&compliant)?;
        let warnings = diagnostics.drain();

        info!(%run_id, compliant_epochs = compliant.n_rows(), "daily aggregation finished");
        Ok(DailyReport {
            run_id,
            computed_at: Utc::now(),
            compliant_epochs: compliant.n_rows(),
            days,
            warnings,
        })
    }

    fn extract(&self, recording: &RawRecording, diagnostics: &Diagnostics) -> Result<FeatureTable> {
        let pipeline = reference_pipeline(recording.timestamps_ms(), &self.config, diagnostics)?;
        let mut outputs = pipeline.process(&recording.channels(), diagnostics)?;
        if outputs.len() != 1 {
            return Err(PipelineError::Arity {
                node: pipeline.name(),
                expected: 1,
                actual: outputs.len(),
            });
        }
        outputs.remove(0).into_table(&pipeline.name())
    }
}
