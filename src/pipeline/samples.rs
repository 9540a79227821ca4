use ndarray::{s, Array1, Array2, Array3, Axis};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::types::{Frame, MoveClass};

/// One model input: the window's leading rows and the class of the last row
/// whose horizon is still inside the window.
#[derive(Debug, Clone)]
pub struct Sample {
    pub x: Array2<f64>,
    pub y: Option<MoveClass>,
}

/// Stacked samples: `x` is samples x timesteps x features.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub x: Array3<f64>,
    pub y: Array1<u8>,
    pub feature_names: Vec<String>,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn timesteps(&self) -> usize {
        self.x.len_of(Axis(1))
    }

    pub fn features(&self) -> usize {
        self.x.len_of(Axis(2))
    }

    /// Number of NaN or infinite cells in `x`.
    pub fn nonfinite_in_x(&self) -> usize {
        self.x.iter().filter(|v| !v.is_finite()).count()
    }

    /// Samples per class, indexed by class code.
    pub fn class_counts(&self) -> [usize; MoveClass::COUNT] {
        let mut counts = [0usize; MoveClass::COUNT];
        for &label in &self.y {
            if let Some(slot) = counts.get_mut(label as usize) {
                *slot += 1;
            }
        }
        counts
    }
}

#[derive(Debug, Clone)]
pub struct SampleBuilder {
    horizon: usize,
    label_column: String,
}

impl SampleBuilder {
    pub fn new(horizon: usize, label_column: impl Into<String>) -> Self {
        Self {
            horizon,
            label_column: label_column.into(),
        }
    }

    /// For a window of length `L`: X is rows `[0, L - H)` without the label
    /// column, y is the label at row `L - 1 - H`.
    pub fn build(&self, window: &Frame) -> Result<Sample> {
        let length = window.len();
        if length <= self.horizon {
            return Err(PipelineError::ShapeMismatch(format!(
                "window of {} rows cannot hold a horizon of {}",
                length, self.horizon
            )));
        }
        let label_idx = window.schema().require(&self.label_column)?;
        let target_row = length - 1 - self.horizon;
        let y = MoveClass::from_cell(window.column_at(label_idx)[target_row]);

        let features = window.without_columns(&[self.label_column.as_str()]);
        let x = features.values().slice(s![..length - self.horizon, ..]).to_owned();
        Ok(Sample { x, y })
    }

    /// Builds and stacks every window. All windows must share one length.
    ///
    /// Undefined targets are dropped only when every window has one (the
    /// configuration leaves no room for a defined label); a partial set of
    /// undefined targets is a data error.
    pub fn build_batch(&self, windows: &[Frame]) -> Result<SampleBatch> {
        let first = windows
            .first()
            .ok_or_else(|| PipelineError::NoUsableWindows("no windows to build samples from".to_string()))?;
        let feature_names: Vec<String> = first
            .column_names()
            .into_iter()
            .filter(|name| name != &self.label_column)
            .collect();

        let samples = windows.iter().map(|w| self.build(w)).collect::<Result<Vec<_>>>()?;
        let undefined = samples.iter().filter(|s| s.y.is_none()).count();
        let timesteps = samples[0].x.nrows();
        let width = feature_names.len();

        if undefined == samples.len() {
            warn!(
                "All {} samples have an undefined target; dropping them (horizon {} leaves no labelled row)",
                undefined, self.horizon
            );
            return Ok(SampleBatch {
                x: Array3::zeros((0, timesteps, width)),
                y: Array1::zeros(0),
                feature_names,
            });
        }
        if undefined > 0 {
            return Err(PipelineError::UndefinedLabels {
                undefined,
                total: samples.len(),
            });
        }

        let mut x = Array3::zeros((samples.len(), timesteps, width));
        let mut y = Array1::zeros(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            if sample.x.dim() != (timesteps, width) {
                return Err(PipelineError::ShapeMismatch(format!(
                    "sample {} has shape {:?}, expected ({}, {})",
                    i,
                    sample.x.dim(),
                    timesteps,
                    width
                )));
            }
            x.index_axis_mut(Axis(0), i).assign(&sample.x);
            if let Some(class) = sample.y {
                y[i] = class.as_u8();
            }
        }

        debug!(
            "Built {} samples of {} timesteps x {} features",
            samples.len(),
            timesteps,
            width
        );
        Ok(SampleBatch { x, y, feature_names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Segmenter;
    use crate::types::frame::tests::minute;
    use crate::types::{ColumnSpec, Schema};

    /// Window with `feature = row index` and the given labels.
    fn window(start: i64, labels: &[f64]) -> Frame {
        let schema = Schema::new(vec![ColumnSpec::feature("feature"), ColumnSpec::label("target")]).unwrap();
        let rows = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| (minute(start + i as i64), vec![i as f64, l]))
            .collect();
        Frame::from_rows(schema, rows).unwrap()
    }

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_label_row_and_input_rows() {
        // L = 6, H = 2 -> X rows 0..4, y from row 3
        let sample = SampleBuilder::new(2, "target")
            .build(&window(0, &[0.0, 1.0, 2.0, 3.0, NAN, NAN]))
            .unwrap();
        assert_eq!(sample.y, Some(MoveClass::MildUp));
        assert_eq!(sample.x.dim(), (4, 1));
        assert_eq!(sample.x.column(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ten_row_table_into_samples() {
        // 10 contiguous rows, L = 6, H = 2: five windows, X rows [i, i + 4), y from row i + 3
        let labels: Vec<f64> = (0..10).map(|i| (i % 5) as f64).collect();
        let windows = Segmenter::new(6).segment(&window(0, &labels));
        assert_eq!(windows.len(), 5);

        let batch = SampleBuilder::new(2, "target").build_batch(&windows).unwrap();
        assert_eq!(batch.x.dim(), (5, 4, 1));
        assert_eq!(batch.x.slice(s![0, .., 0]).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(batch.x.slice(s![4, .., 0]).to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(batch.y.to_vec(), vec![3, 4, 0, 1, 2]);
    }

    #[test]
    fn test_batch_shapes_and_counts() {
        let windows = vec![
            window(0, &[0.0, 1.0, 4.0, NAN]),
            window(1, &[1.0, 2.0, 0.0, NAN]),
            window(2, &[2.0, 2.0, 2.0, NAN]),
        ];
        let batch = SampleBuilder::new(1, "target").build_batch(&windows).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.x.dim(), (3, 3, 1));
        assert_eq!(batch.y.to_vec(), vec![4, 0, 2]);
        assert_eq!(batch.feature_names, vec!["feature".to_string()]);
        assert_eq!(batch.class_counts(), [1, 0, 1, 0, 1]);
        assert_eq!(batch.nonfinite_in_x(), 0);
    }

    #[test]
    fn test_isolated_undefined_label_is_fatal() {
        let windows = vec![window(0, &[0.0, 1.0, NAN]), window(1, &[0.0, NAN, NAN])];
        let err = SampleBuilder::new(1, "target").build_batch(&windows);
        assert!(matches!(err, Err(PipelineError::UndefinedLabels { undefined: 1, total: 2 })));
    }

    #[test]
    fn test_structurally_undefined_labels_dropped() {
        let windows = vec![window(0, &[NAN, NAN, NAN]), window(1, &[NAN, NAN, NAN])];
        let batch = SampleBuilder::new(1, "target").build_batch(&windows).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.x.dim(), (0, 2, 1));
    }

    #[test]
    fn test_window_too_short() {
        let err = SampleBuilder::new(3, "target").build(&window(0, &[0.0, 1.0]));
        assert!(matches!(err, Err(PipelineError::ShapeMismatch(_))));
    }
}
