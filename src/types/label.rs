use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction and magnitude of the price move over the prediction horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoveClass {
    NoMovement = 0,
    MildDown = 1,
    StrongDown = 2,
    MildUp = 3,
    StrongUp = 4,
}

impl MoveClass {
    pub const COUNT: usize = 5;

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn as_f64(&self) -> f64 {
        *self as u8 as f64
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(MoveClass::NoMovement),
            1 => Some(MoveClass::MildDown),
            2 => Some(MoveClass::StrongDown),
            3 => Some(MoveClass::MildUp),
            4 => Some(MoveClass::StrongUp),
            _ => None,
        }
    }

    /// Decodes a label cell. `NaN` and anything outside 0..=4 is undefined.
    pub fn from_cell(value: f64) -> Option<Self> {
        if !value.is_finite() || value.fract() != 0.0 || value < 0.0 {
            return None;
        }
        Self::from_u8(value as u8)
    }

    pub fn description(&self) -> &'static str {
        match self {
            MoveClass::NoMovement => "no movement",
            MoveClass::MildDown => "mild downward",
            MoveClass::StrongDown => "strong downward",
            MoveClass::MildUp => "mild upward",
            MoveClass::StrongUp => "strong upward",
        }
    }

    pub fn all() -> [MoveClass; Self::COUNT] {
        [
            MoveClass::NoMovement,
            MoveClass::MildDown,
            MoveClass::StrongDown,
            MoveClass::MildUp,
            MoveClass::StrongUp,
        ]
    }
}

impl fmt::Display for MoveClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_decoding() {
        assert_eq!(MoveClass::from_cell(3.0), Some(MoveClass::MildUp));
        assert_eq!(MoveClass::from_cell(0.0), Some(MoveClass::NoMovement));
        assert_eq!(MoveClass::from_cell(f64::NAN), None);
        assert_eq!(MoveClass::from_cell(2.5), None);
        assert_eq!(MoveClass::from_cell(7.0), None);
        assert_eq!(MoveClass::from_cell(-1.0), None);
    }

    #[test]
    fn test_codes() {
        for class in MoveClass::all() {
            assert_eq!(MoveClass::from_u8(class.as_u8()), Some(class));
        }
        assert_eq!(MoveClass::StrongDown.as_u8(), 2);
    }
}
