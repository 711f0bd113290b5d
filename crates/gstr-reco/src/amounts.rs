//! Tax amount vectors and the fixed supply categories they are grouped by.

use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::Tolerance;

// ─── TaxAmounts ──────────────────────────────────────────────────────────────

/// Taxable value plus the four tax heads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxAmounts {
  pub taxable: f64,
  pub igst:    f64,
  pub cgst:    f64,
  pub sgst:    f64,
  pub cess:    f64,
}

impl TaxAmounts {
  /// Total tax across all heads, excluding the taxable value.
  pub fn tax(&self) -> f64 { self.igst + self.cgst + self.sgst + self.cess }

  fn fields(&self) -> [f64; 5] {
    [self.taxable, self.igst, self.cgst, self.sgst, self.cess]
  }

  /// Sum of absolute per-field differences.
  pub fn abs_diff(&self, other: &Self) -> f64 {
    self
      .fields()
      .iter()
      .zip(other.fields())
      .map(|(a, b)| (a - b).abs())
      .sum()
  }

  /// Every field within tolerance of its counterpart.
  pub fn within(&self, other: &Self, tolerance: Tolerance) -> bool {
    self
      .fields()
      .iter()
      .zip(other.fields())
      .all(|(a, b)| tolerance.within(*a, b))
  }

  pub fn is_zero(&self) -> bool { self.fields().iter().all(|v| *v == 0.0) }

  /// Copy with differences inside the tolerance flattened to zero.
  pub fn snap_within(self, tolerance: Tolerance) -> Self {
    let snap = |v: f64| if tolerance.within(v, 0.0) { 0.0 } else { v };
    Self {
      taxable: snap(self.taxable),
      igst:    snap(self.igst),
      cgst:    snap(self.cgst),
      sgst:    snap(self.sgst),
      cess:    snap(self.cess),
    }
  }
}

impl Add for TaxAmounts {
  type Output = Self;

  fn add(self, rhs: Self) -> Self {
    Self {
      taxable: self.taxable + rhs.taxable,
      igst:    self.igst + rhs.igst,
      cgst:    self.cgst + rhs.cgst,
      sgst:    self.sgst + rhs.sgst,
      cess:    self.cess + rhs.cess,
    }
  }
}

impl AddAssign for TaxAmounts {
  fn add_assign(&mut self, rhs: Self) { *self = *self + rhs; }
}

impl Sub for TaxAmounts {
  type Output = Self;

  fn sub(self, rhs: Self) -> Self { self + -rhs }
}

impl Neg for TaxAmounts {
  type Output = Self;

  fn neg(self) -> Self {
    Self {
      taxable: -self.taxable,
      igst:    -self.igst,
      cgst:    -self.cgst,
      sgst:    -self.sgst,
      cess:    -self.cess,
    }
  }
}

impl std::iter::Sum for TaxAmounts {
  fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
    iter.fold(Self::default(), Add::add)
  }
}

// ─── Supply categories ───────────────────────────────────────────────────────

/// The fixed outward-supply categories of the tax-summary return (table 3.1).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SupplyCategory {
  /// 3.1(a): taxable supplies other than zero-rated, nil and exempt.
  #[strum(serialize = "3.1(a)")]
  Domestic,
  /// 3.1(b): zero-rated supplies (exports and SEZ).
  #[strum(serialize = "3.1(b)")]
  ZeroRated,
  /// 3.1(c): nil-rated and exempt supplies.
  #[strum(serialize = "3.1(c)")]
  NilExempt,
  /// 3.1(d): inward supplies liable to reverse charge.
  #[strum(serialize = "3.1(d)")]
  ReverseCharge,
  /// 3.1(e): non-GST outward supplies.
  #[strum(serialize = "3.1(e)")]
  NonGst,
}

impl SupplyCategory {
  pub const ALL: [Self; 5] = [
    Self::Domestic,
    Self::ZeroRated,
    Self::NilExempt,
    Self::ReverseCharge,
    Self::NonGst,
  ];
}

/// Amounts per [`SupplyCategory`] for one return and period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplySummary {
  pub domestic:       TaxAmounts,
  pub zero_rated:     TaxAmounts,
  pub nil_exempt:     TaxAmounts,
  pub reverse_charge: TaxAmounts,
  pub non_gst:        TaxAmounts,
}

impl SupplySummary {
  pub fn get(&self, category: SupplyCategory) -> &TaxAmounts {
    match category {
      SupplyCategory::Domestic => &self.domestic,
      SupplyCategory::ZeroRated => &self.zero_rated,
      SupplyCategory::NilExempt => &self.nil_exempt,
      SupplyCategory::ReverseCharge => &self.reverse_charge,
      SupplyCategory::NonGst => &self.non_gst,
    }
  }

  pub fn get_mut(&mut self, category: SupplyCategory) -> &mut TaxAmounts {
    match category {
      SupplyCategory::Domestic => &mut self.domestic,
      SupplyCategory::ZeroRated => &mut self.zero_rated,
      SupplyCategory::NilExempt => &mut self.nil_exempt,
      SupplyCategory::ReverseCharge => &mut self.reverse_charge,
      SupplyCategory::NonGst => &mut self.non_gst,
    }
  }

  /// Sum of absolute differences over every category and field.
  pub fn abs_diff(&self, other: &Self) -> f64 {
    SupplyCategory::ALL
      .iter()
      .map(|c| self.get(*c).abs_diff(other.get(*c)))
      .sum()
  }
}

impl Sub for SupplySummary {
  type Output = Self;

  fn sub(self, rhs: Self) -> Self {
    Self {
      domestic:       self.domestic - rhs.domestic,
      zero_rated:     self.zero_rated - rhs.zero_rated,
      nil_exempt:     self.nil_exempt - rhs.nil_exempt,
      reverse_charge: self.reverse_charge - rhs.reverse_charge,
      non_gst:        self.non_gst - rhs.non_gst,
    }
  }
}
