use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{ScalerMethod, ScalingSettings};
use crate::error::{PipelineError, Result};
use crate::types::Frame;

/// Fitted, invertible per-column transform: `(f(x) - center) / scale`, where
/// `f` is `ln(1 + x)` when `log1p` is set and the identity otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransform {
    pub method: ScalerMethod,
    pub center: f64,
    pub scale: f64,
    #[serde(default)]
    pub log1p: bool,
}

impl ColumnTransform {
    pub fn apply(&self, value: f64) -> f64 {
        let x = if self.log1p { value.ln_1p() } else { value };
        (x - self.center) / self.scale
    }

    pub fn inverse(&self, value: f64) -> f64 {
        let x = value * self.scale + self.center;
        if self.log1p {
            x.exp_m1()
        } else {
            x
        }
    }
}

/// Fits the statistics of one column.
#[cfg_attr(test, mockall::automock)]
pub trait ColumnFit {
    fn fit(&self, column: &str, values: &[f64]) -> ColumnTransform;
}

/// Fits the configured [`ScalerMethod`], ignoring non-finite values.
/// A zero or undefined scale falls back to 1.
#[derive(Debug, Clone, Copy)]
pub struct StatisticFit {
    pub method: ScalerMethod,
}

impl ColumnFit for StatisticFit {
    fn fit(&self, _column: &str, values: &[f64]) -> ColumnTransform {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        finite.sort_by(|a, b| a.total_cmp(b));

        let (center, scale) = if finite.is_empty() {
            (0.0, 1.0)
        } else {
            match self.method {
                ScalerMethod::Robust => {
                    let q25 = quantile_sorted(&finite, 0.25);
                    let q75 = quantile_sorted(&finite, 0.75);
                    (quantile_sorted(&finite, 0.5), q75 - q25)
                }
                ScalerMethod::Standard => {
                    let n = finite.len() as f64;
                    let mean = finite.iter().sum::<f64>() / n;
                    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                    (mean, var.sqrt())
                }
                ScalerMethod::MinMax => {
                    let min = finite[0];
                    let max = finite[finite.len() - 1];
                    (min, max - min)
                }
            }
        };

        ColumnTransform {
            method: self.method,
            center,
            scale: if scale.is_finite() && scale > 0.0 { scale } else { 1.0 },
            log1p: false,
        }
    }
}

/// Linear-interpolation quantile of an ascending, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Per-column transforms fitted on the training split.
///
/// Built empty, filled during the training pass, then frozen. A frozen state
/// is read-only and is the only way validation and inference data get scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub method: ScalerMethod,
    pub fitted_at: DateTime<Utc>,
    /// Rows of the joined training table the statistics were fitted on
    pub rows: usize,
    columns: BTreeMap<String, ColumnTransform>,
    frozen: bool,
}

impl ScalerState {
    pub fn new(method: ScalerMethod) -> Self {
        Self {
            method,
            fitted_at: Utc::now(),
            rows: 0,
            columns: BTreeMap::new(),
            frozen: false,
        }
    }

    pub fn insert(&mut self, column: &str, transform: ColumnTransform) -> Result<()> {
        if self.frozen {
            return Err(PipelineError::ScalerFrozen(column.to_string()));
        }
        self.columns.insert(column.to_string(), transform);
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn get(&self, column: &str) -> Option<&ColumnTransform> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &ColumnTransform)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Scales every column flagged for scaling with its stored transform.
    /// Unflagged columns pass through unchanged.
    pub fn apply(&self, frame: &Frame) -> Result<Frame> {
        if !self.frozen {
            return Err(PipelineError::ScalerNotFrozen);
        }
        let mut out = frame.clone();
        for (idx, spec) in frame.schema().columns().iter().enumerate() {
            if !spec.scale {
                continue;
            }
            let transform = self
                .get(&spec.name)
                .ok_or_else(|| PipelineError::MissingScaler(spec.name.clone()))?;
            let scaled: Array1<f64> = frame.column_at(idx).mapv(|v| transform.apply(v));
            out = out.replace_column(idx, scaled)?;
        }
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Saved scaler state ({} columns) to {:?}", self.len(), path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let state: ScalerState = serde_json::from_str(&json)?;
        info!(
            "Loaded {} scaler state ({} columns, fitted {}) from {:?}",
            state.method.as_str(),
            state.len(),
            state.fitted_at,
            path
        );
        Ok(state)
    }
}

/// Fits column statistics on the joined training table and applies frozen
/// statistics to every other split.
pub struct Scaler<F: ColumnFit = StatisticFit> {
    method: ScalerMethod,
    fitter: F,
    log1p: Vec<String>,
}

impl Scaler<StatisticFit> {
    pub fn new(settings: &ScalingSettings) -> Self {
        Self {
            method: settings.method,
            fitter: StatisticFit { method: settings.method },
            log1p: settings.log1p.clone(),
        }
    }
}

impl<F: ColumnFit> Scaler<F> {
    pub fn with_fitter(method: ScalerMethod, fitter: F, log1p: Vec<String>) -> Self {
        Self { method, fitter, log1p }
    }

    /// Training pass: fits every column flagged for scaling over all rows,
    /// scales it, and returns the frozen state.
    pub fn fit_transform(&self, frame: &Frame) -> Result<(Frame, ScalerState)> {
        let mut state = ScalerState::new(self.method);
        state.rows = frame.len();

        for spec in frame.schema().columns().iter().filter(|s| s.scale) {
            let log1p = self.log1p.iter().any(|c| c == &spec.name);
            let raw = frame.column(&spec.name)?;
            let values: Vec<f64> = if log1p {
                raw.iter().map(|v| v.ln_1p()).collect()
            } else {
                raw.to_vec()
            };
            let mut transform = self.fitter.fit(&spec.name, &values);
            transform.log1p = log1p;
            debug!(
                "Fitted {} scaler for {}: center={:.6}, scale={:.6}",
                transform.method.as_str(),
                spec.name,
                transform.center,
                transform.scale
            );
            state.insert(&spec.name, transform)?;
        }
        state.freeze();

        let scaled = state.apply(frame)?;
        info!(
            "Fitted {} scaler on {} rows x {} columns",
            self.method.as_str(),
            frame.len(),
            state.len()
        );
        Ok((scaled, state))
    }

    /// Validation / inference pass. Never fits.
    pub fn transform(&self, frame: &Frame, state: &ScalerState) -> Result<Frame> {
        state.apply(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::frame::tests::minute;
    use crate::types::{ColumnRole, ColumnSpec, Schema};

    fn frame(price: &[f64]) -> Frame {
        let schema = Schema::new(vec![
            ColumnSpec::feature("price"),
            ColumnSpec::new("hour_sin", ColumnRole::Cyclical),
            ColumnSpec::label("target"),
        ])
        .unwrap();
        let rows = price
            .iter()
            .enumerate()
            .map(|(i, &p)| (minute(i as i64), vec![p, 0.5, 1.0]))
            .collect();
        Frame::from_rows(schema, rows).unwrap()
    }

    fn robust() -> Scaler {
        Scaler::new(&ScalingSettings::default())
    }

    #[test]
    fn test_quantiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), 3.0);
        assert_eq!(quantile_sorted(&sorted, 0.25), 2.0);
        assert_eq!(quantile_sorted(&[1.0, 2.0], 0.5), 1.5);
    }

    #[test]
    fn test_robust_fit_transform() {
        let (scaled, state) = robust().fit_transform(&frame(&[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let t = state.get("price").unwrap();
        assert_eq!(t.center, 3.0);
        assert_eq!(t.scale, 2.0);
        assert_eq!(scaled.column("price").unwrap().to_vec(), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        // Excluded roles are neither fitted nor changed
        assert!(state.get("hour_sin").is_none());
        assert!(state.get("target").is_none());
        assert_eq!(scaled.column("hour_sin").unwrap()[0], 0.5);
        assert!(state.is_frozen());
        assert_eq!(state.rows, 5);
    }

    #[test]
    fn test_fit_ignores_undefined_values() {
        let (scaled, state) = robust()
            .fit_transform(&frame(&[1.0, f64::NAN, 3.0, f64::INFINITY, 5.0]))
            .unwrap();
        assert_eq!(state.get("price").unwrap().center, 3.0);
        assert!(scaled.column("price").unwrap()[1].is_nan());
    }

    #[test]
    fn test_constant_column_gets_unit_scale() {
        let (_, state) = robust().fit_transform(&frame(&[4.0; 5])).unwrap();
        assert_eq!(state.get("price").unwrap().scale, 1.0);
    }

    #[test]
    fn test_other_methods() {
        let standard = StatisticFit { method: ScalerMethod::Standard }.fit("x", &[1.0, 3.0]);
        assert_eq!((standard.center, standard.scale), (2.0, 1.0));
        let min_max = StatisticFit { method: ScalerMethod::MinMax }.fit("x", &[2.0, 6.0, 4.0]);
        assert_eq!((min_max.center, min_max.scale), (2.0, 4.0));
        assert_eq!(min_max.apply(6.0), 1.0);
    }

    #[test]
    fn test_log1p_round_trip() {
        let mut settings = ScalingSettings::default();
        settings.log1p.push("price".to_string());
        let (scaled, state) = Scaler::new(&settings).fit_transform(&frame(&[0.0, 1.0, 3.0])).unwrap();
        let t = state.get("price").unwrap();
        assert!(t.log1p);
        let back = t.inverse(scaled.column("price").unwrap()[2]);
        assert!((back - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_apply_uses_training_statistics() {
        let scaler = robust();
        let (_, state) = scaler.fit_transform(&frame(&[1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let validation = frame(&[10.0, 20.0, 30.0]);

        let applied = scaler.transform(&validation, &state).unwrap();
        let (refitted, _) = scaler.fit_transform(&validation).unwrap();

        assert_eq!(applied.column("price").unwrap().to_vec(), vec![3.5, 8.5, 13.5]);
        assert_ne!(applied.column("price").unwrap(), refitted.column("price").unwrap());
    }

    #[test]
    fn test_apply_never_calls_fit() {
        let (_, state) = robust().fit_transform(&frame(&[1.0, 2.0, 3.0])).unwrap();

        let mut fitter = MockColumnFit::new();
        fitter.expect_fit().never();
        let scaler = Scaler::with_fitter(ScalerMethod::Robust, fitter, Vec::new());
        assert!(scaler.transform(&frame(&[5.0, 6.0]), &state).is_ok());
    }

    #[test]
    fn test_fit_path_calls_fitter_per_scaled_column() {
        let mut fitter = MockColumnFit::new();
        fitter
            .expect_fit()
            .withf(|column, values| column == "price" && values.len() == 3)
            .times(1)
            .returning(|_, _| ColumnTransform {
                method: ScalerMethod::Robust,
                center: 0.0,
                scale: 2.0,
                log1p: false,
            });
        let scaler = Scaler::with_fitter(ScalerMethod::Robust, fitter, Vec::new());
        let (scaled, _) = scaler.fit_transform(&frame(&[2.0, 4.0, 6.0])).unwrap();
        assert_eq!(scaled.column("price").unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let (_, state) = robust().fit_transform(&frame(&[1.0, 2.0, 3.0])).unwrap();
        let schema = Schema::new(vec![ColumnSpec::feature("price"), ColumnSpec::feature("volume")]).unwrap();
        let drifted = Frame::from_rows(schema, vec![(minute(0), vec![1.0, 2.0])]).unwrap();
        let err = robust().transform(&drifted, &state);
        assert!(matches!(err, Err(PipelineError::MissingScaler(c)) if c == "volume"));
    }

    #[test]
    fn test_unfrozen_state_rejected_and_frozen_state_immutable() {
        let mut state = ScalerState::new(ScalerMethod::Robust);
        let t = StatisticFit { method: ScalerMethod::Robust }.fit("price", &[1.0, 2.0]);
        state.insert("price", t.clone()).unwrap();
        assert!(matches!(state.apply(&frame(&[1.0])), Err(PipelineError::ScalerNotFrozen)));

        state.freeze();
        assert!(matches!(state.insert("price", t), Err(PipelineError::ScalerFrozen(_))));
    }

    #[test]
    fn test_save_and_load() {
        let (_, state) = robust().fit_transform(&frame(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("scaler.json");
        state.save(&path).unwrap();

        let loaded = ScalerState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.is_frozen());
    }
}
