use chrono::{DateTime, Utc};
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::schema::{ColumnRole, ColumnSpec, Schema};
use crate::error::{PipelineError, Result};

/// Minute-indexed table of named numeric columns. `NaN` marks an undefined value.
///
/// Windows, augmented windows and the joined dataset are all frames. Every
/// transformation returns a new frame and leaves its input untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: Vec<DateTime<Utc>>,
    schema: Schema,
    values: Array2<f64>,
}

impl Frame {
    pub fn new(index: Vec<DateTime<Utc>>, schema: Schema, values: Array2<f64>) -> Result<Self> {
        let (rows, cols) = values.dim();
        if rows != index.len() || cols != schema.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "values are {}x{}, index has {} rows and schema {} columns",
                rows,
                cols,
                index.len(),
                schema.len()
            )));
        }
        Ok(Self { index, schema, values })
    }

    pub fn empty(schema: Schema) -> Self {
        let width = schema.len();
        Self {
            index: Vec::new(),
            schema,
            values: Array2::zeros((0, width)),
        }
    }

    /// Builds a frame from `(timestamp, row values)` pairs.
    pub fn from_rows(schema: Schema, rows: Vec<(DateTime<Utc>, Vec<f64>)>) -> Result<Self> {
        let width = schema.len();
        let mut index = Vec::with_capacity(rows.len());
        let mut flat = Vec::with_capacity(rows.len() * width);
        for (i, (ts, row)) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(PipelineError::ShapeMismatch(format!(
                    "row {} has {} values, schema has {} columns",
                    i,
                    row.len(),
                    width
                )));
            }
            index.push(ts);
            flat.extend(row);
        }
        let values = Array2::from_shape_vec((index.len(), width), flat)
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        Self::new(index, schema, values)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.schema.len()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.names()
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.schema.require(name)?;
        Ok(self.values.column(idx))
    }

    pub fn column_at(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.values.column(idx)
    }

    /// Seconds between row `i` and the row before it.
    pub fn gap_seconds(&self, i: usize) -> Option<i64> {
        if i == 0 || i >= self.index.len() {
            return None;
        }
        Some((self.index[i] - self.index[i - 1]).num_seconds())
    }

    pub fn ensure_strictly_increasing(&self) -> Result<()> {
        for i in 1..self.index.len() {
            if self.index[i] <= self.index[i - 1] {
                return Err(PipelineError::NonMonotonicIndex {
                    row: i,
                    previous: self.index[i - 1].to_rfc3339(),
                    current: self.index[i].to_rfc3339(),
                });
            }
        }
        Ok(())
    }

    /// Rows `[start, end)`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Frame {
        let end = end.min(self.len());
        let start = start.min(end);
        Frame {
            index: self.index[start..end].to_vec(),
            schema: self.schema.clone(),
            values: self.values.slice(s![start..end, ..]).to_owned(),
        }
    }

    pub fn row_is_complete(&self, i: usize) -> bool {
        self.values.row(i).iter().all(|v| !v.is_nan())
    }

    pub fn first_complete_row(&self) -> Option<usize> {
        (0..self.len()).find(|&i| self.row_is_complete(i))
    }

    pub fn with_column(&self, spec: ColumnSpec, values: Vec<f64>) -> Result<Frame> {
        if values.len() != self.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "column '{}' has {} values, frame has {} rows",
                spec.name,
                values.len(),
                self.len()
            )));
        }
        let mut schema = self.schema.clone();
        schema.push(spec)?;
        let column = Array1::from(values).insert_axis(Axis(1));
        let values = concatenate(Axis(1), &[self.values.view(), column.view()])
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        Ok(Frame {
            index: self.index.clone(),
            schema,
            values,
        })
    }

    pub fn with_columns(&self, columns: Vec<(ColumnSpec, Vec<f64>)>) -> Result<Frame> {
        let mut frame = self.clone();
        for (spec, values) in columns {
            frame = frame.with_column(spec, values)?;
        }
        Ok(frame)
    }

    /// Keeps only the columns accepted by `keep`.
    pub fn retain_columns<F>(&self, keep: F) -> Frame
    where
        F: Fn(&ColumnSpec) -> bool,
    {
        let positions: Vec<usize> = self
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, spec)| keep(spec))
            .map(|(i, _)| i)
            .collect();
        Frame {
            index: self.index.clone(),
            schema: self.schema.select(&positions),
            values: self.values.select(Axis(1), &positions),
        }
    }

    pub fn without_role(&self, role: ColumnRole) -> Frame {
        self.retain_columns(|spec| spec.role != role)
    }

    pub fn without_columns(&self, names: &[&str]) -> Frame {
        self.retain_columns(|spec| !names.contains(&spec.name.as_str()))
    }

    /// Returns a copy with column `idx` replaced.
    pub fn replace_column(&self, idx: usize, column: Array1<f64>) -> Result<Frame> {
        if column.len() != self.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "replacement for column {} has {} values, frame has {} rows",
                idx,
                column.len(),
                self.len()
            )));
        }
        let mut values = self.values.clone();
        values.column_mut(idx).assign(&column);
        Ok(Frame {
            index: self.index.clone(),
            schema: self.schema.clone(),
            values,
        })
    }

    /// Row-wise concatenation. Schemas must be identical; the index is
    /// concatenated verbatim, so the result may not be monotonic.
    pub fn concat(frames: &[Frame]) -> Result<Frame> {
        let first = frames
            .first()
            .ok_or_else(|| PipelineError::NoUsableWindows("nothing to join".to_string()))?;
        for frame in &frames[1..] {
            if frame.schema != first.schema {
                return Err(PipelineError::ShapeMismatch(format!(
                    "cannot join frames with different columns: {:?} vs {:?}",
                    first.column_names(),
                    frame.column_names()
                )));
            }
        }
        let views: Vec<ArrayView2<f64>> = frames.iter().map(|f| f.values.view()).collect();
        let values = concatenate(Axis(0), &views)
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        let index = frames.iter().flat_map(|f| f.index.iter().copied()).collect();
        Ok(Frame {
            index,
            schema: first.schema.clone(),
            values,
        })
    }
}
