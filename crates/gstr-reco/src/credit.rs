//! Credit statement vs the credit claimed in the tax-summary return.
//!
//! Credit claimed on imports and reverse-charge supplies never appears in the
//! credit statement, so it is taken out of the claim before comparing.

use gstr_core::Period;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
  TaxAmounts, Tolerance,
  extract::{CreditAvailable, FiledSummary},
};

/// Listed in the order the checks are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum CreditStatus {
  /// Some head's adjusted claim exceeds the available credit.
  #[strum(serialize = "RISK")]
  #[serde(rename = "RISK")]
  Risk,
  /// Within tolerance once reverse-charge credit was taken out.
  #[strum(serialize = "RECONCILED")]
  #[serde(rename = "RECONCILED")]
  Reconciled,
  #[strum(serialize = "MATCH")]
  #[serde(rename = "MATCH")]
  Match,
  #[strum(serialize = "NO CREDIT-RETURN DATA")]
  #[serde(rename = "NO CREDIT-RETURN DATA")]
  NoCreditReturnData,
  /// Claimed less than available, beyond tolerance.
  #[strum(serialize = "PARTIAL")]
  #[serde(rename = "PARTIAL")]
  Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditReconciliation {
  pub period:           Period,
  pub label:            String,
  /// Total credit per the credit statement.
  pub available:        TaxAmounts,
  /// Total credit claimed in the tax-summary return.
  pub claimed:          TaxAmounts,
  /// Reverse-charge and import part of `claimed`.
  pub reverse_charge:   TaxAmounts,
  /// `claimed - reverse_charge`.
  pub adjusted_claim:   TaxAmounts,
  /// `adjusted_claim - available`.
  pub difference:       TaxAmounts,
  pub total_difference: f64,
  pub status:           CreditStatus,
}

fn heads(t: &TaxAmounts) -> [f64; 4] { [t.igst, t.cgst, t.sgst, t.cess] }

/// Compare available and claimed credit for one period.
///
/// An unreadable credit statement is reported as
/// [`CreditStatus::NoCreditReturnData`] without judging the claim.
pub fn reconcile_credit(
  period: Period,
  credit: Option<&CreditAvailable>,
  filed: Option<&FiledSummary>,
  tolerance: Tolerance,
) -> CreditReconciliation {
  let available = credit.map(CreditAvailable::total).unwrap_or_default();
  let claimed = filed.map(|f| f.itc_claimed).unwrap_or_default();
  let reverse_charge = filed.map(|f| f.itc_reverse_charge).unwrap_or_default();
  let adjusted_claim = claimed - reverse_charge;
  let difference = adjusted_claim - available;
  let total_difference = heads(&difference).iter().map(|d| d.abs()).sum::<f64>();

  let excess = heads(&adjusted_claim)
    .iter()
    .zip(heads(&available))
    .any(|(claim, avl)| tolerance.exceeds(*claim, avl));
  let has_reverse_charge = heads(&reverse_charge).iter().any(|v| *v > 0.0);
  let within = tolerance.within(total_difference, 0.0);

  let status = if credit.is_none() {
    CreditStatus::NoCreditReturnData
  } else if excess {
    CreditStatus::Risk
  } else if within && has_reverse_charge {
    CreditStatus::Reconciled
  } else if within {
    CreditStatus::Match
  } else if available.tax() == 0.0 {
    CreditStatus::NoCreditReturnData
  } else {
    CreditStatus::Partial
  };

  CreditReconciliation {
    period,
    label: period.label(),
    available,
    claimed,
    reverse_charge,
    adjusted_claim,
    difference,
    total_difference,
    status,
  }
}
