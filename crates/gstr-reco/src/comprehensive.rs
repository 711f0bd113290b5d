//! Three-way view: summary and credit reconciliation side by side.

use gstr_core::Period;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  SupplySummary, Tolerance,
  credit::{CreditReconciliation, reconcile_credit},
  extract::{self, CreditAvailable, FiledSummary},
  summary::{SummaryReconciliation, reconcile_summary},
};

/// The three returns of one period, each `None` when it could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReturns {
  pub period:  Period,
  /// Outward liability (auto-liability calculation).
  pub outward: Option<SupplySummary>,
  pub filed:   Option<FiledSummary>,
  pub credit:  Option<CreditAvailable>,
}

impl PeriodReturns {
  /// Build from raw payloads as returned by the fetcher.
  pub fn from_payloads(
    period: Period,
    liability: Option<&Value>,
    filed: Option<&Value>,
    credit: Option<&Value>,
  ) -> Self {
    Self {
      period,
      outward: liability.and_then(extract::outward_liability),
      filed: filed.and_then(extract::filed_summary),
      credit: credit.and_then(extract::credit_available),
    }
  }

  pub fn summary(&self, tolerance: Tolerance) -> SummaryReconciliation {
    reconcile_summary(
      self.period,
      self.outward.as_ref(),
      self.filed.as_ref().map(|f| &f.supplies),
      tolerance,
    )
  }

  pub fn credit(&self, tolerance: Tolerance) -> CreditReconciliation {
    reconcile_credit(
      self.period,
      self.credit.as_ref(),
      self.filed.as_ref(),
      tolerance,
    )
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveReconciliation {
  pub period:  Period,
  pub label:   String,
  pub summary: SummaryReconciliation,
  pub credit:  CreditReconciliation,
}

/// Run both reconciliations independently; a missing return in one pair
/// never affects the other.
pub fn reconcile_comprehensive(
  returns: &PeriodReturns,
  tolerance: Tolerance,
) -> ComprehensiveReconciliation {
  ComprehensiveReconciliation {
    period:  returns.period,
    label:   returns.period.label(),
    summary: returns.summary(tolerance),
    credit:  returns.credit(tolerance),
  }
}
