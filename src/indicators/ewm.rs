use super::Indicator;

/// Exponentially weighted moving average, `adjust = false`.
///
/// Undefined (`NaN`) inputs do not count as observations but still decay the
/// weight of the running value, so a gap leaves the next observation with more
/// influence. No value is produced until `min_periods` observations are seen.
#[derive(Debug, Clone)]
pub struct EwmMean {
    alpha: f64,
    min_periods: usize,
    weighted: f64,
    old_wt: f64,
    nobs: usize,
}

impl EwmMean {
    pub fn new(span: usize, min_periods: usize) -> Self {
        Self {
            alpha: span_to_alpha(span),
            min_periods,
            weighted: f64::NAN,
            old_wt: 1.0,
            nobs: 0,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        let is_observation = !value.is_nan();
        if is_observation {
            self.nobs += 1;
        }

        if !self.weighted.is_nan() {
            self.old_wt *= 1.0 - self.alpha;
            if is_observation {
                if self.weighted != value {
                    self.weighted = (self.old_wt * self.weighted + self.alpha * value)
                        / (self.old_wt + self.alpha);
                }
                self.old_wt = 1.0;
            }
        } else if is_observation {
            self.weighted = value;
        }

        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.nobs >= self.min_periods.max(1) && !self.weighted.is_nan() {
            Some(self.weighted)
        } else {
            None
        }
    }
}

impl Indicator for EwmMean {
    fn name(&self) -> &'static str {
        "EWMA"
    }

    fn is_ready(&self) -> bool {
        self.value().is_some()
    }

    fn reset(&mut self) {
        self.weighted = f64::NAN;
        self.old_wt = 1.0;
        self.nobs = 0;
    }
}

/// Exponentially weighted standard deviation, `adjust = false`, with the
/// unbiased weight correction `sum_wt^2 / (sum_wt^2 - sum_wt2)`.
#[derive(Debug, Clone)]
pub struct EwmStd {
    alpha: f64,
    min_periods: usize,
    mean: f64,
    cov: f64,
    sum_wt: f64,
    sum_wt2: f64,
    old_wt: f64,
    nobs: usize,
    last: Option<f64>,
}

impl EwmStd {
    pub fn new(span: usize, min_periods: usize) -> Self {
        Self {
            alpha: span_to_alpha(span),
            min_periods,
            mean: f64::NAN,
            cov: 0.0,
            sum_wt: 1.0,
            sum_wt2: 1.0,
            old_wt: 1.0,
            nobs: 0,
            last: None,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        let is_observation = !value.is_nan();
        if is_observation {
            self.nobs += 1;
        }

        if !self.mean.is_nan() {
            let factor = 1.0 - self.alpha;
            self.sum_wt *= factor;
            self.sum_wt2 *= factor * factor;
            self.old_wt *= factor;
            if is_observation {
                let old_mean = self.mean;
                let wt_sum = self.old_wt + self.alpha;
                if self.mean != value {
                    self.mean = (self.old_wt * old_mean + self.alpha * value) / wt_sum;
                }
                let drift = old_mean - self.mean;
                let dev = value - self.mean;
                self.cov = (self.old_wt * (self.cov + drift * drift) + self.alpha * dev * dev) / wt_sum;
                self.sum_wt += self.alpha;
                self.sum_wt2 += self.alpha * self.alpha;
                self.old_wt += self.alpha;

                self.sum_wt /= self.old_wt;
                self.sum_wt2 /= self.old_wt * self.old_wt;
                self.old_wt = 1.0;
            }
        } else if is_observation {
            self.mean = value;
        }

        self.last = if self.nobs >= self.min_periods.max(1) {
            let numerator = self.sum_wt * self.sum_wt;
            let denominator = numerator - self.sum_wt2;
            if denominator > 0.0 {
                Some((numerator / denominator * self.cov).max(0.0).sqrt())
            } else {
                None
            }
        } else {
            None
        };
        self.last
    }

    pub fn value(&self) -> Option<f64> {
        self.last
    }
}

impl Indicator for EwmStd {
    fn name(&self) -> &'static str {
        "EWMSTD"
    }

    fn is_ready(&self) -> bool {
        self.last.is_some()
    }

    fn reset(&mut self) {
        *self = Self {
            alpha: self.alpha,
            min_periods: self.min_periods,
            ..Self::new(1, 0)
        };
    }
}

fn span_to_alpha(span: usize) -> f64 {
    2.0 / (span.max(1) as f64 + 1.0)
}

/// Running mean and standard deviation of a whole series. Rows before the
/// warm-up is satisfied are `NaN`; the std is floored at `std_floor`.
pub fn ewm_mean_std(values: &[f64], span: usize, std_floor: f64) -> (Vec<f64>, Vec<f64>) {
    let mut mean = EwmMean::new(span, span);
    let mut std = EwmStd::new(span, span);
    let mut means = Vec::with_capacity(values.len());
    let mut stds = Vec::with_capacity(values.len());
    for &v in values {
        means.push(mean.update(v).unwrap_or(f64::NAN));
        stds.push(std.update(v).map(|s| s.max(std_floor)).unwrap_or(f64::NAN));
    }
    (means, stds)
}
