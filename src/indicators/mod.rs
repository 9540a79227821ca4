pub mod ewm;

pub use ewm::*;

pub trait Indicator {
    fn name(&self) -> &'static str;
    fn is_ready(&self) -> bool;
    fn reset(&mut self);
}

/// Moves every value `periods` rows later (`periods > 0`, a lag) or earlier
/// (`periods < 0`, a lead). Vacated slots are `NaN`.
pub fn shift(values: &[f64], periods: isize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    let offset = periods.unsigned_abs();
    if offset >= n {
        return out;
    }
    if periods >= 0 {
        out[offset..].copy_from_slice(&values[..n - offset]);
    } else {
        out[..n - offset].copy_from_slice(&values[offset..]);
    }
    out
}

/// First difference; the first value is `NaN`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

/// Relative change from the previous row, `(v_t - v_{t-1}) / v_{t-1}`.
/// A zero denominator yields `±inf` (or `NaN` for `0/0`), left for the caller.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = (values[i] - values[i - 1]) / values[i - 1];
    }
    out
}
