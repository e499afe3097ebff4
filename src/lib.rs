//! AX3 Flux - composable feature extraction for raw tri-axial accelerometer data
//!
//! Raw x, y, z samples flow through a tree of nodes: zero-phase filtering →
//! epoch segmentation → per-epoch feature extraction → feature table →
//! non-wear removal. Day-level aggregates are derived from the resulting table.
//!
//! ## Modules
//!
//! - **Engine**: [`node`], [`composition`], [`segmentation`]
//! - **Nodes**: [`filters`], [`conditioning`], [`features`], [`postprocess`]
//! - **Runs**: [`pipeline`], [`daily`], [`config`]

pub mod composition;
pub mod conditioning;
pub mod config;
pub mod daily;
pub mod diagnostics;
pub mod error;
pub mod features;
pub mod filters;
pub mod node;
pub mod pipeline;
pub mod postprocess;
pub mod recording;
pub mod segmentation;
pub mod table;
pub mod types;

pub use composition::{Parallel, Sequential};
pub use config::PipelineConfig;
pub use diagnostics::{DataQualityWarning, Diagnostics};
pub use error::{PipelineError, Result};
pub use node::{Node, NodeExt};
pub use pipeline::{reference_pipeline, FeatureProcessor, RunReport};
pub use recording::RawRecording;
pub use segmentation::EpochSegmenter;
pub use table::FeatureTable;
pub use types::{FeatureSeries, Signal};

/// Crate version, embedded in run reports written by the CLI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name written alongside reports
pub const PRODUCER_NAME: &str = "ax3-flux";
