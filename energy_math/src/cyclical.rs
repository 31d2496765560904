//! Sine/cosine encodings for periodic calendar values

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A point on the unit circle representing a periodic value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclicalPair {
    /// `sin(2π·value/period)`
    pub sin: f64,
    /// `cos(2π·value/period)`
    pub cos: f64,
}

impl CyclicalPair {
    /// Encode `value` on a cycle of length `period`
    pub fn encode(value: f64, period: f64) -> Result<Self> {
        if !(period.is_finite() && period > 0.0) {
            return Err(MathError::InvalidInput(format!(
                "Cycle period must be positive, got {}",
                period
            )));
        }
        if !value.is_finite() {
            return Err(MathError::InvalidInput(
                "Cannot encode a non-finite value".to_string(),
            ));
        }

        let angle = 2.0 * PI * value / period;
        Ok(Self {
            sin: angle.sin(),
            cos: angle.cos(),
        })
    }

    /// Squared norm, always 1 up to rounding
    pub fn norm_squared(&self) -> f64 {
        self.sin * self.sin + self.cos * self.cos
    }
}
