use crate::types::MoveClass;

/// Z-score thresholds of the five movement bands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelBands {
    pub z_mild: f64,
    pub z_strong: f64,
}

impl LabelBands {
    pub fn new(z_mild: f64, z_strong: f64) -> Self {
        Self { z_mild, z_strong }
    }

    /// Classifies a price delta against the running EWMA mean and std.
    ///
    /// Upper bounds are inclusive on the "up" side and lower bounds inclusive
    /// on the "down" side, so the no-movement band is open at both ends.
    /// Any non-finite input or a non-positive std leaves the label undefined.
    pub fn classify(&self, delta: f64, mean: f64, std: f64) -> Option<MoveClass> {
        if !delta.is_finite() || !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return None;
        }

        let strong_up = mean + self.z_strong * std;
        let mild_up = mean + self.z_mild * std;
        let mild_down = mean - self.z_mild * std;
        let strong_down = mean - self.z_strong * std;

        let class = if delta >= strong_up {
            MoveClass::StrongUp
        } else if delta >= mild_up {
            MoveClass::MildUp
        } else if delta > mild_down {
            MoveClass::NoMovement
        } else if delta > strong_down {
            MoveClass::MildDown
        } else {
            MoveClass::StrongDown
        };
        Some(class)
    }

    /// Label column for aligned series; undefined rows are `NaN`.
    pub fn classify_series(&self, delta: &[f64], mean: &[f64], std: &[f64]) -> Vec<f64> {
        delta
            .iter()
            .zip(mean)
            .zip(std)
            .map(|((&d, &m), &s)| self.classify(d, m, s).map_or(f64::NAN, |c| c.as_f64()))
            .collect()
    }
}

impl Default for LabelBands {
    fn default() -> Self {
        Self::new(0.5, 1.7)
    }
}
