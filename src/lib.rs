//! Leakage-free preparation of minute-level order book features for
//! sequence classifiers: contiguous windowing, volatility-adaptive labels,
//! warm-up trimming, train-fitted scaling and sample assembly.

pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{DatasetPipeline, PipelineReport, PreparedSplit, ScalerState, ScalingMode, Split};
pub use types::{ColumnRole, ColumnSpec, Frame, MoveClass, Schema};
