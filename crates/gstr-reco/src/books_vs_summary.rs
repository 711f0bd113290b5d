//! Tax-summary return vs sales books, per period.

use gstr_core::Period;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
  SupplyCategory, SupplySummary, TaxAmounts, Tolerance, books::BooksEntry,
};

/// Period verdict for the books comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PeriodStatus {
  Matched,
  Mismatched,
}

/// One compared figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticularRow {
  pub particular: String,
  pub books:      f64,
  pub portal:     f64,
  /// `books - portal`.
  pub difference: f64,
}

impl ParticularRow {
  pub fn new(particular: impl Into<String>, books: f64, portal: f64) -> Self {
    Self { particular: particular.into(), books, portal, difference: books - portal }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
  pub period: Period,
  pub label:  String,
  pub status: PeriodStatus,
  pub rows:   Vec<ParticularRow>,
}

impl PeriodComparison {
  /// Mismatched as soon as any row differs by more than `tolerance`.
  pub fn new(period: Period, rows: Vec<ParticularRow>, tolerance: Tolerance) -> Self {
    let status = if rows.iter().all(|r| tolerance.within(r.books, r.portal)) {
      PeriodStatus::Matched
    } else {
      PeriodStatus::Mismatched
    };
    Self { period, label: period.label(), status, rows }
  }
}

type Field = fn(&TaxAmounts) -> f64;

fn taxable(a: &TaxAmounts) -> f64 { a.taxable }
fn igst(a: &TaxAmounts) -> f64 { a.igst }
fn cgst(a: &TaxAmounts) -> f64 { a.cgst }
fn sgst(a: &TaxAmounts) -> f64 { a.sgst }

const PARTICULARS: [(&str, SupplyCategory, Field); 8] = [
  ("3.1.a Taxable Value", SupplyCategory::Domestic, taxable),
  ("3.1.a IGST", SupplyCategory::Domestic, igst),
  ("3.1.a CGST", SupplyCategory::Domestic, cgst),
  ("3.1.a SGST", SupplyCategory::Domestic, sgst),
  ("3.1.b Exports Taxable", SupplyCategory::ZeroRated, taxable),
  ("3.1.b Exports IGST", SupplyCategory::ZeroRated, igst),
  ("3.1.c Nil/Exempt", SupplyCategory::NilExempt, taxable),
  ("3.1.e Non-GST", SupplyCategory::NonGst, taxable),
];

/// Fold the period's books entries into tax-summary sections.
pub fn books_summary(entries: &[BooksEntry], period: Period) -> SupplySummary {
  let mut out = SupplySummary::default();
  for e in entries.iter().filter(|e| e.period == period) {
    *out.get_mut(e.class.summary_category()) += TaxAmounts {
      taxable: e.section_taxable,
      ..e.amounts
    };
  }
  out
}

/// Compare books with the filed tax-summary for one period. A missing
/// return reads as zeros.
pub fn reconcile_books_vs_summary(
  period: Period,
  entries: &[BooksEntry],
  filed: Option<&SupplySummary>,
  tolerance: Tolerance,
) -> PeriodComparison {
  let books = books_summary(entries, period);
  let filed = filed.copied().unwrap_or_default();
  let rows = PARTICULARS
    .iter()
    .map(|(name, category, field)| {
      ParticularRow::new(*name, field(books.get(*category)), field(filed.get(*category)))
    })
    .collect();
  PeriodComparison::new(period, rows, tolerance)
}
