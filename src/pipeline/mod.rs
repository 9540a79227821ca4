//! Window → label → trim → normalize → join → scale → rebatch → sample.
//!
//! The scaler runs on the row-joined concatenation of all augmented windows
//! so its statistics cover the whole split instead of one window at a time.
//! Joining breaks temporal contiguity at every window boundary; the
//! rebatcher re-segments the scaled table with the derived window length,
//! which recovers exactly the windows of that length.

pub mod augment;
pub mod labeling;
pub mod normalize;
pub mod rebatch;
pub mod samples;
pub mod sanity;
pub mod scaler;
pub mod segmenter;

pub use augment::{trim_warmup, FeatureAugmenter};
pub use labeling::LabelBands;
pub use normalize::Normalizer;
pub use rebatch::{modal_length, Rebatcher};
pub use samples::{Sample, SampleBatch, SampleBuilder};
pub use sanity::{ColumnSummary, SanityChecker, SanityFailure};
pub use scaler::{ColumnFit, ColumnTransform, Scaler, ScalerState, StatisticFit};
pub use segmenter::Segmenter;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{Frame, MoveClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Validation,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "validation" | "val" => Ok(Split::Validation),
            _ => Err(format!("Unknown split: {}", s)),
        }
    }
}

/// Whether a pass fits new scaler statistics or replays frozen ones.
#[derive(Debug, Clone, Copy)]
pub enum ScalingMode<'a> {
    Fit,
    Apply(&'a ScalerState),
}

/// Counts from every stage of one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub rows: usize,
    pub raw_windows: usize,
    /// Windows left with no row after the warm-up trim
    pub empty_windows: usize,
    pub joined_rows: usize,
    /// Modal row count of the augmented windows
    pub derived_length: usize,
    pub rebatched_windows: usize,
    pub samples: usize,
    pub class_counts: [usize; MoveClass::COUNT],
    pub feature_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PreparedSplit {
    pub batch: SampleBatch,
    /// Fitted state on a training pass; `None` when applying or unscaled
    pub scaler_state: Option<ScalerState>,
    pub report: PipelineReport,
}

pub struct DatasetPipeline {
    config: PipelineConfig,
}

impl DatasetPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.ensure_valid()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, table: &Frame, mode: ScalingMode<'_>) -> Result<PreparedSplit> {
        let cfg = &self.config;
        table.ensure_strictly_increasing()?;
        let mut report = PipelineReport {
            rows: table.len(),
            ..Default::default()
        };

        let raw = Segmenter::new(cfg.windowing.sequence_length).segment(table);
        report.raw_windows = raw.len();
        if raw.is_empty() {
            return Err(PipelineError::NoUsableWindows(format!(
                "no run of {} consecutive minutes in {} rows",
                cfg.windowing.sequence_length,
                table.len()
            )));
        }
        info!("Segmented {} rows into {} windows", table.len(), raw.len());

        let augmenter = FeatureAugmenter::new(cfg);
        let mut windows = augmenter.augment_windows(&raw, cfg.execution.parallel, cfg.execution.workers)?;
        if cfg.normalization.enabled {
            windows = Normalizer.normalize_all(&windows)?;
        }

        let (windows, empty): (Vec<Frame>, Vec<Frame>) = windows.into_iter().partition(|w| !w.is_empty());
        if windows.len() + empty.len() != raw.len() {
            return Err(PipelineError::WindowCountMismatch {
                before: raw.len(),
                after: windows.len() + empty.len(),
            });
        }
        report.empty_windows = empty.len();
        if !empty.is_empty() {
            warn!("{} of {} windows were empty after the warm-up trim", empty.len(), raw.len());
        }
        let rebatcher = Rebatcher::from_windows(&windows)
            .ok_or_else(|| PipelineError::NoUsableWindows("every window was consumed by the warm-up".to_string()))?;
        report.derived_length = rebatcher.derived_length();

        let joined = Frame::concat(&windows)?;
        report.joined_rows = joined.len();

        let (scaled, scaler_state) = self.scale(&joined, mode)?;

        let label_budget = windows.len() * cfg.labeling.horizon;
        let checker = SanityChecker::new(&cfg.sanity, label_budget);
        checker.check(&scaled, Some(&joined))?;

        let rebatched = rebatcher.rebatch(&scaled);
        let expected = windows.iter().filter(|w| w.len() == rebatcher.derived_length()).count();
        if rebatched.len() != expected {
            return Err(PipelineError::WindowCountMismatch {
                before: expected,
                after: rebatched.len(),
            });
        }
        report.rebatched_windows = rebatched.len();

        let builder = SampleBuilder::new(cfg.labeling.horizon, augmenter.label_column());
        let batch = builder.build_batch(&rebatched)?;
        checker.check_tensor(&batch)?;

        report.samples = batch.len();
        report.class_counts = batch.class_counts();
        report.feature_columns = batch.feature_names.clone();
        info!(
            "Prepared {} samples of {}x{} (derived length {}, class counts {:?})",
            batch.len(),
            batch.timesteps(),
            batch.features(),
            report.derived_length,
            report.class_counts
        );

        Ok(PreparedSplit {
            batch,
            scaler_state,
            report,
        })
    }

    fn scale(&self, joined: &Frame, mode: ScalingMode<'_>) -> Result<(Frame, Option<ScalerState>)> {
        let settings = &self.config.scaling;
        if !settings.enabled {
            if let ScalingMode::Apply(_) = mode {
                warn!("Scaling is disabled; ignoring the supplied scaler state");
            }
            return Ok((joined.clone(), None));
        }

        let scaler = Scaler::new(settings);
        match mode {
            ScalingMode::Fit => {
                let (scaled, state) = scaler.fit_transform(joined)?;
                if let Some(path) = &settings.state_path {
                    state.save(path)?;
                }
                Ok((scaled, Some(state)))
            }
            ScalingMode::Apply(state) => Ok((scaler.transform(joined, state)?, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_names() {
        assert_eq!(Split::Train.as_str(), "train");
        assert_eq!("validation".parse::<Split>().unwrap(), Split::Validation);
        assert_eq!("VAL".parse::<Split>().unwrap(), Split::Validation);
        assert!("test".parse::<Split>().is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.labeling.horizon = 0;
        assert!(matches!(DatasetPipeline::new(config), Err(PipelineError::Config(_))));
    }
}
