use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::types::{ColumnRole, ColumnSpec, Schema};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub windowing: WindowingSettings,
    pub labeling: LabelingSettings,
    pub columns: ColumnSettings,
    pub normalization: NormalizationSettings,
    pub scaling: ScalingSettings,
    pub sanity: SanitySettings,
    pub execution: ExecutionSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windowing: WindowingSettings::default(),
            labeling: LabelingSettings::default(),
            columns: ColumnSettings::default(),
            normalization: NormalizationSettings::default(),
            scaling: ScalingSettings::default(),
            sanity: SanitySettings::default(),
            execution: ExecutionSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let labeling = &self.labeling;

        // Windowing / labeling
        if labeling.horizon == 0 {
            errors.push("labeling.horizon must be > 0".to_string());
        }
        if labeling.ewma_span < 2 {
            errors.push(
                "labeling.ewma_span must be >= 2: with span 1 the EWM std is undefined on every row".to_string(),
            );
        }
        if labeling.z_mild <= 0.0 || labeling.z_mild >= labeling.z_strong {
            errors.push("labeling: require 0 < z_mild < z_strong".to_string());
        }
        if labeling.std_floor <= 0.0 {
            errors.push("labeling.std_floor must be > 0".to_string());
        }
        let min_len = self.min_sequence_length();
        if self.windowing.sequence_length < min_len {
            errors.push(format!(
                "windowing.sequence_length {} is too short: horizon {} and ewma_span {} need at least {} rows",
                self.windowing.sequence_length, labeling.horizon, labeling.ewma_span, min_len
            ));
        }

        // Columns
        let features = &self.columns.features;
        if features.is_empty() {
            errors.push("columns.features must list at least one column".to_string());
        }
        let mut seen = BTreeSet::new();
        for column in features {
            if !seen.insert(column.name.as_str()) {
                errors.push(format!("columns.features: duplicate column '{}'", column.name));
            }
            if matches!(column.role, ColumnRole::Label | ColumnRole::Derived) {
                errors.push(format!(
                    "columns.features: '{}' cannot be loaded with role '{}'",
                    column.name, column.role
                ));
            }
        }
        for price in [&labeling.entry_price_column, &labeling.exit_price_column] {
            if !seen.contains(price.as_str()) {
                errors.push(format!("labeling: price column '{}' is not a loaded feature", price));
            }
        }
        if seen.contains(labeling.label_column.as_str()) {
            errors.push(format!(
                "labeling.label_column '{}' collides with a loaded feature",
                labeling.label_column
            ));
        }
        if self.columns.timestamp_column.is_empty() {
            errors.push("columns.timestamp_column must not be empty".to_string());
        }
        for encoding in &self.columns.cyclical {
            if !seen.contains(encoding.column.as_str()) {
                errors.push(format!("columns.cyclical: '{}' is not a loaded feature", encoding.column));
            }
            if encoding.period <= 0.0 {
                errors.push(format!("columns.cyclical: period for '{}' must be > 0", encoding.column));
            }
        }

        // Sanity
        let sanity = &self.sanity;
        if sanity.abs_max_global <= 0.0 {
            errors.push("sanity.abs_max_global must be > 0".to_string());
        }
        if sanity.tail_ratio <= 1.0 {
            errors.push("sanity.tail_ratio must be > 1".to_string());
        }
        if sanity.nzv_threshold < 0.0 {
            errors.push("sanity.nzv_threshold must be >= 0".to_string());
        }
        if sanity.correlation_threshold <= 0.0 || sanity.correlation_threshold > 1.0 {
            errors.push("sanity.correlation_threshold must be in (0, 1]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn ensure_valid(&self) -> Result<()> {
        self.validate().map_err(PipelineError::Config)
    }

    /// Rows dropped from the front of every window before the first fully
    /// defined row: the lagged EWMA stats need `H + W - 1` rows.
    pub fn warmup_rows(&self) -> usize {
        let h = self.labeling.horizon;
        let w = self.labeling.ewma_span;
        let ewma = h + w - 1;
        let lag_diff = if self.labeling.lag_diff { h + 1 } else { h };
        ewma.max(lag_diff)
    }

    /// Shortest raw window that still yields one sample.
    pub fn min_sequence_length(&self) -> usize {
        let normalization = usize::from(self.normalization.enabled);
        self.warmup_rows() + self.labeling.horizon + 1 + normalization
    }

    /// Spec for a column, with the configured exclusions applied.
    pub fn column_spec(&self, name: &str, role: ColumnRole) -> ColumnSpec {
        let mut spec = ColumnSpec::new(name, role);
        if self.scaling.exclude.iter().any(|c| c == name) {
            spec = spec.without_scaling();
        }
        if self.normalization.exclude.iter().any(|c| c == name) {
            spec = spec.without_normalization();
        }
        spec
    }

    /// Layout of the loaded feature table.
    pub fn input_schema(&self) -> Result<Schema> {
        Schema::new(
            self.columns
                .features
                .iter()
                .map(|c| self.column_spec(&c.name, c.role))
                .collect(),
        )
    }

    pub fn label_spec(&self) -> ColumnSpec {
        ColumnSpec::label(self.labeling.label_column.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowingSettings {
    /// Raw rows per window, before augmentation trims warm-up rows
    pub sequence_length: usize,
}

impl Default for WindowingSettings {
    fn default() -> Self {
        Self { sequence_length: 47 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingSettings {
    /// Minutes ahead of the entry for the exit price
    pub horizon: usize,
    pub ewma_span: usize,
    pub z_mild: f64,
    pub z_strong: f64,
    pub std_floor: f64,
    /// Price paid to enter (taken one row ahead)
    pub entry_price_column: String,
    /// Price received to exit (taken `horizon` rows ahead)
    pub exit_price_column: String,
    pub label_column: String,
    /// Also emit the first difference of the lagged delta
    pub lag_diff: bool,
}

impl Default for LabelingSettings {
    fn default() -> Self {
        Self {
            horizon: 5,
            ewma_span: 20,
            z_mild: 0.5,
            z_strong: 1.7,
            std_floor: 1e-8,
            entry_price_column: "open_price__ask_level_1".to_string(),
            exit_price_column: "close_price__bid_level_1".to_string(),
            label_column: "target".to_string(),
            lag_diff: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: ColumnRole,
}

fn default_role() -> ColumnRole {
    ColumnRole::Feature
}

impl ColumnConfig {
    pub fn new(name: impl Into<String>, role: ColumnRole) -> Self {
        Self { name: name.into(), role }
    }

    pub fn feature(name: impl Into<String>) -> Self {
        Self::new(name, ColumnRole::Feature)
    }
}

/// Replaces `column` with `{column}_sin` / `{column}_cos` over `period`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclicalEncoding {
    pub column: String,
    pub period: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSettings {
    pub timestamp_column: String,
    pub features: Vec<ColumnConfig>,
    pub cyclical: Vec<CyclicalEncoding>,
}

impl Default for ColumnSettings {
    fn default() -> Self {
        Self {
            timestamp_column: "minute".to_string(),
            features: vec![
                ColumnConfig::feature("open_price__ask_level_1"),
                ColumnConfig::feature("close_price__bid_level_1"),
            ],
            cyclical: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub enabled: bool,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerMethod {
    /// Median / interquartile range
    Robust,
    /// Mean / population standard deviation
    Standard,
    MinMax,
}

impl ScalerMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalerMethod::Robust => "robust",
            ScalerMethod::Standard => "standard",
            ScalerMethod::MinMax => "min_max",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingSettings {
    pub enabled: bool,
    pub method: ScalerMethod,
    pub exclude: Vec<String>,
    /// Columns passed through `ln(1 + x)` before scaling
    pub log1p: Vec<String>,
    /// Where a training pass writes the fitted state
    pub state_path: Option<PathBuf>,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            method: ScalerMethod::Robust,
            exclude: Vec::new(),
            log1p: Vec::new(),
            state_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLimit<T> {
    pub column: String,
    pub limit: T,
}

impl<T> ColumnLimit<T> {
    pub fn new(column: impl Into<String>, limit: T) -> Self {
        Self { column: column.into(), limit }
    }
}

pub(crate) fn limit_for<T: Copy>(limits: &[ColumnLimit<T>], column: &str, fallback: T) -> T {
    limits
        .iter()
        .find(|l| l.column == column)
        .map(|l| l.limit)
        .unwrap_or(fallback)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitySettings {
    pub enabled: bool,
    pub default_nan_allow: usize,
    /// Per-column NaN budgets; the label column defaults to `windows * horizon`
    pub nan_allow: Vec<ColumnLimit<usize>>,
    pub abs_max_global: f64,
    pub abs_max: Vec<ColumnLimit<f64>>,
    /// Ceiling for |q99.9 / q95|
    pub tail_ratio: f64,
    pub tail_ratio_overrides: Vec<ColumnLimit<f64>>,
    /// Near-zero variance threshold
    pub nzv_threshold: f64,
    pub check_correlation: bool,
    /// All-pairs correlation only runs below this many columns
    pub correlation_max_columns: usize,
    pub correlation_threshold: f64,
    pub max_nonfinite_in_x: usize,
}

impl Default for SanitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_nan_allow: 0,
            nan_allow: Vec::new(),
            abs_max_global: 7.0,
            abs_max: Vec::new(),
            tail_ratio: 10.0,
            tail_ratio_overrides: Vec::new(),
            nzv_threshold: 1e-4,
            check_correlation: true,
            correlation_max_columns: 150,
            correlation_threshold: 0.99999,
            max_nonfinite_in_x: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Augment windows on the rayon pool
    pub parallel: bool,
    /// Pool size; `None` uses rayon's default
    pub workers: Option<usize>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            workers: None,
        }
    }
}
