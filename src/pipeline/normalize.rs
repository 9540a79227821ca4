use ndarray::Array1;

use crate::error::Result;
use crate::indicators::pct_change;
use crate::types::Frame;

/// Relative-change transform applied per window before scaling.
///
/// Columns whose spec has `normalize = true` become `(v_t - v_{t-1}) / v_{t-1}`;
/// infinities from zero denominators become zero. The first row is always
/// undefined afterwards and is dropped, so the output is one row shorter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn normalize(&self, window: &Frame) -> Result<Frame> {
        if window.is_empty() {
            return Ok(window.clone());
        }

        let mut out = window.clone();
        for (idx, spec) in window.schema().columns().iter().enumerate() {
            if !spec.normalize {
                continue;
            }
            let changes: Array1<f64> = pct_change(&window.column_at(idx).to_vec())
                .into_iter()
                .map(|v| if v.is_infinite() { 0.0 } else { v })
                .collect();
            out = out.replace_column(idx, changes)?;
        }
        Ok(out.slice_rows(1, out.len()))
    }

    pub fn normalize_all(&self, windows: &[Frame]) -> Result<Vec<Frame>> {
        windows.iter().map(|w| self.normalize(w)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::frame::tests::minute;
    use crate::types::{ColumnRole, ColumnSpec, Schema};

    fn window() -> Frame {
        let schema = Schema::new(vec![
            ColumnSpec::feature("price"),
            ColumnSpec::new("spr", ColumnRole::Ratio),
            ColumnSpec::label("target"),
        ])
        .unwrap();
        let rows = vec![
            (minute(0), vec![2.0, 0.1, 0.0]),
            (minute(1), vec![3.0, 0.2, 3.0]),
            (minute(2), vec![0.0, 0.3, 4.0]),
            (minute(3), vec![1.0, 0.4, f64::NAN]),
        ];
        Frame::from_rows(schema, rows).unwrap()
    }

    #[test]
    fn test_relative_change_and_first_row_dropped() {
        let out = Normalizer.normalize(&window()).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.index()[0], minute(1));
        let price = out.column("price").unwrap();
        assert!((price[0] - 0.5).abs() < 1e-12);
        assert_eq!(price[1], -1.0);
        // 1 / 0 -> inf -> 0
        assert_eq!(price[2], 0.0);
    }

    #[test]
    fn test_excluded_roles_pass_through() {
        let out = Normalizer.normalize(&window()).unwrap();
        assert_eq!(out.column("spr").unwrap().to_vec(), vec![0.2, 0.3, 0.4]);
        let target = out.column("target").unwrap();
        assert_eq!(target[0], 3.0);
        assert!(target[2].is_nan());
    }

    #[test]
    fn test_configured_exclusion() {
        let schema = Schema::new(vec![ColumnSpec::feature("volume").without_normalization()]).unwrap();
        let rows = vec![(minute(0), vec![10.0]), (minute(1), vec![20.0])];
        let frame = Frame::from_rows(schema, rows).unwrap();
        let out = Normalizer.normalize(&frame).unwrap();
        assert_eq!(out.column("volume").unwrap().to_vec(), vec![20.0]);
    }

    #[test]
    fn test_input_untouched() {
        let input = window();
        let _ = Normalizer.normalize(&input).unwrap();
        assert_eq!(input.len(), 4);
        assert_eq!(input.column("price").unwrap()[0], 2.0);
    }
}
