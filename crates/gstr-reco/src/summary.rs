//! Outward-supply return vs tax-summary return, per period.

use gstr_core::Period;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{SupplySummary, Tolerance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SummaryStatus {
  #[strum(serialize = "MATCH")]
  #[serde(rename = "MATCH")]
  Match,
  #[strum(serialize = "MISMATCH")]
  #[serde(rename = "MISMATCH")]
  Mismatch,
  /// Neither return could be read.
  #[strum(serialize = "NO DATA")]
  #[serde(rename = "NO DATA")]
  NoData,
  /// Only one of the two returns could be read.
  #[strum(serialize = "INCOMPLETE")]
  #[serde(rename = "INCOMPLETE")]
  Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReconciliation {
  pub period:           Period,
  pub label:            String,
  /// Liability computed from the outward-supply return.
  pub outward:          SupplySummary,
  /// Liability declared in the filed tax-summary return.
  pub filed:            SupplySummary,
  /// `outward - filed`, per category and field.
  pub difference:       SupplySummary,
  pub total_difference: f64,
  pub status:           SummaryStatus,
}

/// Compare the two liability summaries for one period. A missing side reads
/// as zeros in the figures but decides the status on its own.
pub fn reconcile_summary(
  period: Period,
  outward: Option<&SupplySummary>,
  filed: Option<&SupplySummary>,
  tolerance: Tolerance,
) -> SummaryReconciliation {
  let o = outward.copied().unwrap_or_default();
  let f = filed.copied().unwrap_or_default();
  let total_difference = o.abs_diff(&f);

  let status = match (outward, filed) {
    (None, None) => SummaryStatus::NoData,
    (Some(_), None) | (None, Some(_)) => SummaryStatus::Incomplete,
    _ if tolerance.within(total_difference, 0.0) => SummaryStatus::Match,
    _ => SummaryStatus::Mismatch,
  };

  SummaryReconciliation {
    period,
    label: period.label(),
    outward: o,
    filed: f,
    difference: o - f,
    total_difference,
    status,
  }
}
