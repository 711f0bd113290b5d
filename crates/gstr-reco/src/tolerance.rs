//! Numeric tolerance used by every comparison.

use serde::{Deserialize, Serialize};

/// Absolute difference below which two amounts are the same figure.
///
/// Comparison is inclusive: a difference of exactly the tolerance matches.
/// The default of one rupee absorbs rounding noise between returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tolerance(f64);

/// Float slack so that e.g. `100.0 - 99.0` still counts as exactly `1.0`.
const EPSILON: f64 = 1e-6;

impl Tolerance {
  pub const DEFAULT: Self = Self(1.0);

  /// Negative or non-finite values fall back to zero.
  pub fn new(value: f64) -> Self {
    if value.is_finite() && value > 0.0 { Self(value) } else { Self(0.0) }
  }

  pub fn value(self) -> f64 { self.0 }

  /// `|a - b| <= tolerance`.
  pub fn within(self, a: f64, b: f64) -> bool { (a - b).abs() <= self.0 + EPSILON }

  /// `a` exceeds `b` by more than the tolerance.
  pub fn exceeds(self, a: f64, b: f64) -> bool { a - b > self.0 + EPSILON }
}

impl Default for Tolerance {
  fn default() -> Self { Self::DEFAULT }
}
