use std::f64::consts::TAU;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::labeling::LabelBands;
use crate::config::{CyclicalEncoding, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::indicators::{diff, ewm_mean_std, shift};
use crate::types::{ColumnRole, ColumnSpec, Frame};

/// Derives the label and the lagged label statistics for one window.
///
/// Every future-dependent intermediate (`future_open`, `future_close`, the
/// raw delta and its unshifted EWMA stats) is tagged [`ColumnRole::Lookahead`]
/// and stripped before the window is returned, together with any input column
/// declared with that role. Only copies shifted `H` rows into the past remain
/// as model inputs.
#[derive(Debug, Clone)]
pub struct FeatureAugmenter {
    horizon: usize,
    ewma_span: usize,
    std_floor: f64,
    bands: LabelBands,
    entry_price_column: String,
    exit_price_column: String,
    label: ColumnSpec,
    lag_diff: bool,
    cyclical: Vec<CyclicalEncoding>,
    derived: DerivedNames,
}

/// Column names of the derived features, fixed by horizon and span.
#[derive(Debug, Clone)]
struct DerivedNames {
    mean_lag: ColumnSpec,
    std_lag: ColumnSpec,
    delta_lag: ColumnSpec,
    delta_lag_diff: ColumnSpec,
}

impl FeatureAugmenter {
    pub fn new(config: &PipelineConfig) -> Self {
        let labeling = &config.labeling;
        let h = labeling.horizon;
        let w = labeling.ewma_span;
        let derived = DerivedNames {
            mean_lag: config.column_spec(&format!("future_delta_ewma_{}_mean_lag_{}", w, h), ColumnRole::Derived),
            std_lag: config.column_spec(&format!("future_delta_ewma_{}_std_lag_{}", w, h), ColumnRole::Derived),
            delta_lag: config.column_spec(&format!("future_delta_lag_{}", h), ColumnRole::Derived),
            delta_lag_diff: config.column_spec(&format!("future_delta_lag_{}_diff", h), ColumnRole::Derived),
        };
        Self {
            horizon: h,
            ewma_span: w,
            std_floor: labeling.std_floor,
            bands: LabelBands::new(labeling.z_mild, labeling.z_strong),
            entry_price_column: labeling.entry_price_column.clone(),
            exit_price_column: labeling.exit_price_column.clone(),
            label: config.label_spec(),
            lag_diff: labeling.lag_diff,
            cyclical: config.columns.cyclical.clone(),
            derived,
        }
    }

    pub fn label_column(&self) -> &str {
        &self.label.name
    }

    /// Appends the label and derived columns. The row count never changes.
    pub fn augment(&self, window: &Frame) -> Result<Frame> {
        let h = self.horizon as isize;
        let entry = window.column(&self.entry_price_column)?.to_vec();
        let exit = window.column(&self.exit_price_column)?.to_vec();

        let future_open = shift(&entry, -1);
        let future_close = shift(&exit, -h);
        let delta: Vec<f64> = future_close
            .iter()
            .zip(&future_open)
            .map(|(close, open)| close - open)
            .collect();
        let (mean, std) = ewm_mean_std(&delta, self.ewma_span, self.std_floor);
        let labels = self.bands.classify_series(&delta, &mean, &std);

        let delta_lag = shift(&delta, h);
        let mut columns = vec![
            (self.label.clone(), labels),
            (self.derived.mean_lag.clone(), shift(&mean, h)),
            (self.derived.std_lag.clone(), shift(&std, h)),
        ];
        if self.lag_diff {
            columns.push((self.derived.delta_lag_diff.clone(), diff(&delta_lag)));
        }
        columns.push((self.derived.delta_lag.clone(), delta_lag));

        let w = self.ewma_span;
        columns.extend([
            (lookahead("future_open"), future_open),
            (lookahead("future_close"), future_close),
            (lookahead("future_delta"), delta),
            (lookahead(&format!("future_delta_ewma_{}_mean", w)), mean),
            (lookahead(&format!("future_delta_ewma_{}_std", w)), std),
        ]);

        let mut augmented = window.with_columns(columns)?;
        let mut encoded_sources = Vec::with_capacity(self.cyclical.len());
        for encoding in &self.cyclical {
            let phase: Vec<f64> = augmented
                .column(&encoding.column)?
                .iter()
                .map(|v| TAU * v / encoding.period)
                .collect();
            let sin: Vec<f64> = phase.iter().map(|p| p.sin()).collect();
            let cos: Vec<f64> = phase.iter().map(|p| p.cos()).collect();
            augmented = augmented.with_columns(vec![
                (ColumnSpec::new(format!("{}_sin", encoding.column), ColumnRole::Cyclical), sin),
                (ColumnSpec::new(format!("{}_cos", encoding.column), ColumnRole::Cyclical), cos),
            ])?;
            encoded_sources.push(encoding.column.as_str());
        }

        let augmented = augmented
            .without_role(ColumnRole::Lookahead)
            .without_columns(&encoded_sources);

        if augmented.len() != window.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "augmentation changed the row count from {} to {}",
                window.len(),
                augmented.len()
            )));
        }
        Ok(augmented)
    }

    /// Augments and trims every window, preserving enumeration order.
    pub fn augment_windows(&self, windows: &[Frame], parallel: bool, workers: Option<usize>) -> Result<Vec<Frame>> {
        let process = |window: &Frame| self.augment(window).map(|w| trim_warmup(&w));

        let augmented = if !parallel {
            windows.iter().map(process).collect::<Result<Vec<_>>>()?
        } else if let Some(threads) = workers {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;
            pool.install(|| windows.par_iter().map(process).collect::<Result<Vec<_>>>())?
        } else {
            windows.par_iter().map(process).collect::<Result<Vec<_>>>()?
        };

        debug!(
            "Augmented {} windows ({} empty after warm-up trim)",
            augmented.len(),
            augmented.iter().filter(|w| w.is_empty()).count()
        );
        Ok(augmented)
    }
}

fn lookahead(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnRole::Lookahead)
}

/// Drops the leading rows before the first fully defined row. Later rows are
/// kept even if they hold undefined values.
pub fn trim_warmup(window: &Frame) -> Frame {
    match window.first_complete_row() {
        Some(0) => window.clone(),
        Some(first) => window.slice_rows(first, window.len()),
        None => {
            warn!(
                "Window starting {} has no fully defined row; emitting an empty window",
                window
                    .index()
                    .first()
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "<empty>".to_string())
            );
            Frame::empty(window.schema().clone())
        }
    }
}
