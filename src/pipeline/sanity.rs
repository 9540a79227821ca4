use std::fmt;

use tracing::{error, info, warn};

use super::samples::SampleBatch;
use super::scaler::quantile_sorted;
use crate::config::{limit_for, SanitySettings};
use crate::error::{PipelineError, Result};
use crate::types::{ColumnRole, Frame};

/// Descriptive statistics of the finite values of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub count: usize,
    pub nonfinite: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub fn describe<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        let mut nonfinite = 0;
        let mut finite = Vec::new();
        for &v in values {
            if v.is_finite() {
                finite.push(v);
            } else {
                nonfinite += 1;
            }
        }
        finite.sort_by(|a, b| a.total_cmp(b));

        let count = finite.len();
        if count == 0 {
            return Self {
                count,
                nonfinite,
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                q25: f64::NAN,
                q50: f64::NAN,
                q75: f64::NAN,
                max: f64::NAN,
            };
        }
        let mean = finite.iter().sum::<f64>() / count as f64;
        Self {
            count,
            nonfinite,
            mean,
            std: sample_std(&finite, mean),
            min: finite[0],
            q25: quantile_sorted(&finite, 0.25),
            q50: quantile_sorted(&finite, 0.5),
            q75: quantile_sorted(&finite, 0.75),
            max: finite[count - 1],
        }
    }
}

impl fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "count={} nonfinite={} mean={:.6} std={:.6} min={:.6} 25%={:.6} 50%={:.6} 75%={:.6} max={:.6}",
            self.count, self.nonfinite, self.mean, self.std, self.min, self.q25, self.q50, self.q75, self.max
        )
    }
}

/// Standard deviation with one degree of freedom removed; `NaN` below two values.
fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Problem {
    Missing { count: usize, allowed: usize },
    Infinite { count: usize },
    NearZeroVariance { variance: f64 },
    ZeroIqr,
    AbsMax { value: f64, limit: f64 },
    FatTail { ratio: f64, limit: f64 },
    Correlated { with: String, r: f64 },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Problem::Missing { count, allowed } => write!(f, "{} NaN values (allowed {})", count, allowed),
            Problem::Infinite { count } => write!(f, "{} infinite values", count),
            Problem::NearZeroVariance { variance } => write!(f, "near-zero variance {:.3e}", variance),
            Problem::ZeroIqr => write!(f, "zero interquartile range"),
            Problem::AbsMax { value, limit } => write!(f, "|value| {:.4} exceeds {}", value, limit),
            Problem::FatTail { ratio, limit } => write!(f, "q99.9/q95 ratio {:.2} exceeds {}", ratio, limit),
            Problem::Correlated { with, r } => write!(f, "correlation {:.6} with '{}'", r, with),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnIssue {
    pub column: String,
    pub problem: Problem,
}

/// Every offending column with its statistics in the scaled and raw views.
#[derive(Debug, Clone)]
pub struct SanityFailure {
    pub issues: Vec<ColumnIssue>,
    pub scaled_stats: Vec<(String, ColumnSummary)>,
    pub raw_stats: Vec<(String, ColumnSummary)>,
}

impl SanityFailure {
    pub fn offending_columns(&self) -> Vec<&str> {
        self.scaled_stats.iter().map(|(c, _)| c.as_str()).collect()
    }
}

impl fmt::Display for SanityFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Sanity check failed: {} issues in {} columns: ",
            self.issues.len(),
            self.scaled_stats.len()
        )?;
        let issues: Vec<String> = self
            .issues
            .iter()
            .map(|i| format!("{}: {}", i.column, i.problem))
            .collect();
        write!(f, "{}", issues.join("; "))
    }
}

/// Validates the finished, scaled table before it is batched.
#[derive(Debug, Clone)]
pub struct SanityChecker {
    settings: SanitySettings,
    label_nan_allow: usize,
}

impl SanityChecker {
    /// `label_nan_allow` is the label column's budget unless `nan_allow`
    /// names the label column explicitly.
    pub fn new(settings: &SanitySettings, label_nan_allow: usize) -> Self {
        Self {
            settings: settings.clone(),
            label_nan_allow,
        }
    }

    pub fn find_issues(&self, frame: &Frame) -> Vec<ColumnIssue> {
        let s = &self.settings;
        let mut issues = Vec::new();

        for (idx, spec) in frame.schema().columns().iter().enumerate() {
            let name = spec.name.as_str();
            let column = frame.column_at(idx);
            let mut finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            let infinite = column.iter().filter(|v| v.is_infinite()).count();
            let missing = column.len() - finite.len() - infinite;
            let push = |issues: &mut Vec<ColumnIssue>, problem| {
                issues.push(ColumnIssue {
                    column: name.to_string(),
                    problem,
                })
            };

            let default_allow = if spec.role == ColumnRole::Label {
                self.label_nan_allow
            } else {
                s.default_nan_allow
            };
            let allowed = limit_for(&s.nan_allow, name, default_allow);
            if missing > allowed {
                push(&mut issues, Problem::Missing { count: missing, allowed });
            }
            // The NaN budget never covers infinities
            if infinite > 0 {
                push(&mut issues, Problem::Infinite { count: infinite });
            }
            if finite.is_empty() {
                continue;
            }
            finite.sort_by(|a, b| a.total_cmp(b));

            if spec.role.variance_checked() {
                let mean = finite.iter().sum::<f64>() / finite.len() as f64;
                let variance = sample_std(&finite, mean).powi(2);
                if variance.is_nan() || variance < s.nzv_threshold {
                    push(&mut issues, Problem::NearZeroVariance { variance });
                }
                if quantile_sorted(&finite, 0.75) - quantile_sorted(&finite, 0.25) == 0.0 {
                    push(&mut issues, Problem::ZeroIqr);
                }
            }

            let limit = limit_for(&s.abs_max, name, s.abs_max_global);
            let peak = finite.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            if peak > limit {
                push(&mut issues, Problem::AbsMax { value: peak, limit });
            }

            // An all-zero body has no defined ratio.
            let q95 = quantile_sorted(&finite, 0.95);
            if q95.abs() > f64::EPSILON {
                let ratio = (quantile_sorted(&finite, 0.999) / q95).abs();
                let limit = limit_for(&s.tail_ratio_overrides, name, s.tail_ratio);
                if ratio > limit {
                    push(&mut issues, Problem::FatTail { ratio, limit });
                }
            }
        }

        if s.check_correlation && frame.width() < s.correlation_max_columns {
            issues.extend(self.correlated_pairs(frame));
        }
        issues
    }

    fn correlated_pairs(&self, frame: &Frame) -> Vec<ColumnIssue> {
        let candidates: Vec<usize> = frame
            .schema()
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, spec)| !matches!(spec.role, ColumnRole::Cyclical | ColumnRole::Flag | ColumnRole::Label))
            .map(|(i, _)| i)
            .collect();

        let mut issues = Vec::new();
        for (a_pos, &a) in candidates.iter().enumerate() {
            for &b in &candidates[a_pos + 1..] {
                let r = pearson(&frame.column_at(a).to_vec(), &frame.column_at(b).to_vec());
                if r.is_finite() && r.abs() > self.settings.correlation_threshold {
                    let names = frame.schema().columns();
                    issues.push(ColumnIssue {
                        column: names[b].name.clone(),
                        problem: Problem::Correlated {
                            with: names[a].name.clone(),
                            r,
                        },
                    });
                }
            }
        }
        issues
    }

    /// Fails with every offending column described in the scaled view and,
    /// when given, the raw (pre-scaling) view.
    pub fn check(&self, scaled: &Frame, raw: Option<&Frame>) -> Result<()> {
        if !self.settings.enabled {
            warn!("Sanity checks disabled");
            return Ok(());
        }

        let issues = self.find_issues(scaled);
        if issues.is_empty() {
            info!(
                "Sanity checks passed: {} rows x {} columns",
                scaled.len(),
                scaled.width()
            );
            return Ok(());
        }

        let mut offending: Vec<&str> = Vec::new();
        for issue in &issues {
            if !offending.contains(&issue.column.as_str()) {
                offending.push(issue.column.as_str());
            }
        }

        let mut scaled_stats = Vec::with_capacity(offending.len());
        let mut raw_stats = Vec::new();
        for &column in &offending {
            for issue in issues.iter().filter(|i| i.column == column) {
                error!("Sanity check failed for '{}': {}", column, issue.problem);
            }
            if let Ok(values) = scaled.column(column) {
                let summary = ColumnSummary::describe(values.iter());
                error!("  scaled '{}': {}", column, summary);
                scaled_stats.push((column.to_string(), summary));
            }
            if let Some(Ok(values)) = raw.map(|r| r.column(column)) {
                let summary = ColumnSummary::describe(values.iter());
                error!("  raw    '{}': {}", column, summary);
                raw_stats.push((column.to_string(), summary));
            }
        }

        Err(SanityFailure {
            issues,
            scaled_stats,
            raw_stats,
        }
        .into())
    }

    /// Final check on the stacked inputs.
    pub fn check_tensor(&self, batch: &SampleBatch) -> Result<()> {
        let nonfinite = batch.nonfinite_in_x();
        if nonfinite > self.settings.max_nonfinite_in_x {
            error!(
                "{} NaN/Inf values in X ({} samples x {} timesteps x {} features)",
                nonfinite,
                batch.len(),
                batch.timesteps(),
                batch.features()
            );
            return Err(PipelineError::NonFiniteInputs {
                count: nonfinite,
                allowed: self.settings.max_nonfinite_in_x,
            });
        }
        Ok(())
    }
}

/// Pearson correlation over rows where both values are finite.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    cov / (var_a * var_b).sqrt()
}
