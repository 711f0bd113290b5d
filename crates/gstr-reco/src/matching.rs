//! Two-phase invoice matching between a filed return and the books.
//!
//! Phase 1 pairs rows on the natural key (counterparty GSTIN + document
//! number, trimmed and upper-cased). Phase 2 looks at what is left on both
//! sides and pairs rows of the same counterparty whose taxable value and IGST
//! agree within tolerance. Every row ends up in exactly one bucket.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use gstr_core::Period;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{TaxAmounts, Tolerance};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Document type; credit and debit notes share one kind.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize,
  Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DocKind {
  #[default]
  B2b,
  Cdnr,
}

/// One invoice or note, from either side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
  pub gstin:    String,
  pub supplier: String,
  pub invoice:  String,
  pub date:     Option<NaiveDate>,
  /// Invoice value including tax.
  pub gross:    f64,
  pub amounts:  TaxAmounts,
  pub kind:     DocKind,
}

impl InvoiceRecord {
  pub fn clean_gstin(&self) -> String { self.gstin.trim().to_uppercase() }

  pub fn natural_key(&self) -> (String, String) {
    (self.clean_gstin(), self.invoice.trim().to_uppercase())
  }

  /// Taxable value and IGST both within tolerance.
  fn values_match(&self, other: &Self, tolerance: Tolerance) -> bool {
    tolerance.within(self.amounts.taxable, other.amounts.taxable)
      && tolerance.within(self.amounts.igst, other.amounts.igst)
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
  #[serde(rename = "return")]
  pub filed:      InvoiceRecord,
  pub books:      InvoiceRecord,
  /// `filed - books` per field.
  pub difference: TaxAmounts,
  pub gross_diff: f64,
}

impl MatchedPair {
  fn new(filed: InvoiceRecord, books: InvoiceRecord) -> Self {
    let difference = filed.amounts - books.amounts;
    let gross_diff = ((filed.gross - books.gross).abs() * 100.0).round() / 100.0;
    Self { filed, books, difference, gross_diff }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
  Return,
  Books,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfPeriod {
  pub side:   Side,
  pub record: InvoiceRecord,
}

/// Bucket sizes, for a quick overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMetrics {
  pub matched:           usize,
  pub mismatch_probable: usize,
  pub invoice_mismatch:  usize,
  pub only_in_return:    usize,
  pub only_in_books:     usize,
  pub out_of_period:     usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
  pub tolerance:         f64,
  pub metrics:           MatchMetrics,
  /// Same key, values agree.
  pub matched:           Vec<MatchedPair>,
  /// Same key with differing values, or a fuzzy pair whose gross differs.
  pub mismatch_probable: Vec<MatchedPair>,
  /// Fuzzy pair agreeing on values and gross: the document number differs.
  pub invoice_mismatch:  Vec<MatchedPair>,
  pub only_in_return:    Vec<InvoiceRecord>,
  pub only_in_books:     Vec<InvoiceRecord>,
  pub out_of_period:     Vec<OutOfPeriod>,
}

impl MatchReport {
  fn finish(mut self) -> Self {
    self.metrics = MatchMetrics {
      matched:           self.matched.len(),
      mismatch_probable: self.mismatch_probable.len(),
      invoice_mismatch:  self.invoice_mismatch.len(),
      only_in_return:    self.only_in_return.len(),
      only_in_books:     self.only_in_books.len(),
      out_of_period:     self.out_of_period.len(),
    };
    self
  }
}

// ─── Matching ────────────────────────────────────────────────────────────────

/// Split rows into those inside `periods` and those outside. Undated rows
/// cannot be placed in a period and count as outside.
fn partition_by_period(
  rows: Vec<InvoiceRecord>,
  periods: Option<&[Period]>,
) -> (Vec<InvoiceRecord>, Vec<InvoiceRecord>) {
  match periods {
    None => (rows, Vec::new()),
    Some(periods) => rows.into_iter().partition(|r| {
      r.date.is_some_and(|d| periods.contains(&Period::of(d)))
    }),
  }
}

/// Match `filed` rows against `books` rows.
///
/// When `periods` is given, rows dated outside it on either side are
/// reported under `out_of_period` and take no part in matching. When several
/// rows on one side share a natural key, they pair in input order and the
/// surplus moves on to phase 2.
pub fn match_invoices(
  filed: Vec<InvoiceRecord>,
  books: Vec<InvoiceRecord>,
  periods: Option<&[Period]>,
  tolerance: Tolerance,
) -> MatchReport {
  let mut report = MatchReport { tolerance: tolerance.value(), ..Default::default() };

  let (filed, filed_out) = partition_by_period(filed, periods);
  let (books, books_out) = partition_by_period(books, periods);
  report.out_of_period.extend(
    filed_out
      .into_iter()
      .map(|record| OutOfPeriod { side: Side::Return, record })
      .chain(
        books_out
          .into_iter()
          .map(|record| OutOfPeriod { side: Side::Books, record }),
      ),
  );

  // Phase 1: exact natural key.
  let mut by_key: HashMap<(String, String), VecDeque<usize>> = HashMap::new();
  for (i, b) in books.iter().enumerate() {
    by_key.entry(b.natural_key()).or_default().push_back(i);
  }

  let mut books: Vec<Option<InvoiceRecord>> = books.into_iter().map(Some).collect();
  let mut leftover_filed = Vec::new();
  for f in filed {
    let hit = by_key
      .get_mut(&f.natural_key())
      .and_then(VecDeque::pop_front)
      .and_then(|i| books[i].take());
    match hit {
      Some(b) => {
        let same = f.values_match(&b, tolerance);
        let pair = MatchedPair::new(f, b);
        if same {
          report.matched.push(pair);
        } else {
          report.mismatch_probable.push(pair);
        }
      }
      None => leftover_filed.push(f),
    }
  }

  // Phase 2: same counterparty, values within tolerance.
  for f in leftover_filed {
    let gstin = f.clean_gstin();
    let candidate = books.iter_mut().find(|slot| {
      slot
        .as_ref()
        .is_some_and(|b| b.clean_gstin() == gstin && f.values_match(b, tolerance))
    });
    match candidate.and_then(Option::take) {
      Some(b) => {
        let gross_same = tolerance.within(f.gross, b.gross);
        let pair = MatchedPair::new(f, b);
        if gross_same {
          report.invoice_mismatch.push(pair);
        } else {
          report.mismatch_probable.push(pair);
        }
      }
      None => report.only_in_return.push(f),
    }
  }

  report.only_in_books.extend(books.into_iter().flatten());
  report.finish()
}

#[cfg(test)]
mod tests {
  use super::*;

  const SUPPLIER: &str = "29ABCDE1234F1Z5";

  fn inv(invoice: &str, taxable: f64, igst: f64, gross: f64) -> InvoiceRecord {
    InvoiceRecord {
      gstin: SUPPLIER.into(),
      invoice: invoice.into(),
      date: NaiveDate::from_ymd_opt(2024, 4, 10),
      gross,
      amounts: TaxAmounts { taxable, igst, ..Default::default() },
      ..Default::default()
    }
  }

  fn april() -> Vec<Period> { vec![Period::new(2024, 4).unwrap()] }

  #[test]
  fn exact_and_fuzzy_pairs_land_in_distinct_buckets() {
    let filed = vec![
      inv("INV-1", 1000.0, 180.0, 1180.0),
      inv("INV-2", 5000.0, 900.0, 5900.0),
    ];
    let books = vec![
      inv(" inv-1 ", 1200.0, 216.0, 1416.0),
      inv("INV/2", 5000.5, 900.0, 5900.0),
    ];

    let r = match_invoices(filed, books, Some(&april()), Tolerance::DEFAULT);

    assert_eq!(r.mismatch_probable.len(), 1);
    assert_eq!(r.mismatch_probable[0].filed.invoice, "INV-1");
    assert_eq!(r.invoice_mismatch.len(), 1);
    assert_eq!(r.invoice_mismatch[0].books.invoice, "INV/2");
    assert!(r.matched.is_empty());
    assert!(r.only_in_return.is_empty());
    assert!(r.only_in_books.is_empty());
    assert_eq!(r.metrics.mismatch_probable + r.metrics.invoice_mismatch, 2);
  }

  #[test]
  fn exact_key_with_agreeing_values_matches() {
    let r = match_invoices(
      vec![inv("A1", 100.0, 18.0, 118.0)],
      vec![inv("a1", 101.0, 18.0, 119.0)],
      None,
      Tolerance::DEFAULT,
    );
    assert_eq!(r.metrics.matched, 1);
  }

  #[test]
  fn fuzzy_pair_with_different_gross_is_probable_mismatch() {
    let r = match_invoices(
      vec![inv("X-1", 100.0, 18.0, 118.0)],
      vec![inv("X-9", 100.0, 18.0, 150.0)],
      None,
      Tolerance::DEFAULT,
    );
    assert_eq!(r.metrics.mismatch_probable, 1);
    assert_eq!(r.mismatch_probable[0].gross_diff, 32.0);
  }

  #[test]
  fn fuzzy_requires_same_counterparty() {
    let mut other = inv("Z-1", 100.0, 18.0, 118.0);
    other.gstin = "27AAPFU0939F1ZV".into();
    let r = match_invoices(
      vec![inv("Y-1", 100.0, 18.0, 118.0)],
      vec![other],
      None,
      Tolerance::DEFAULT,
    );
    assert_eq!(r.metrics.only_in_return, 1);
    assert_eq!(r.metrics.only_in_books, 1);
  }

  #[test]
  fn no_double_matching() {
    let filed = vec![inv("F-1", 100.0, 18.0, 118.0), inv("F-2", 100.0, 18.0, 118.0)];
    let books = vec![inv("B-1", 100.0, 18.0, 118.0)];
    let r = match_invoices(filed, books, None, Tolerance::DEFAULT);
    assert_eq!(r.metrics.invoice_mismatch, 1);
    assert_eq!(r.metrics.only_in_return, 1);
    assert_eq!(r.only_in_return[0].invoice, "F-2");
  }

  #[test]
  fn duplicate_keys_pair_in_order() {
    let filed = vec![inv("D", 100.0, 18.0, 118.0), inv("D", 300.0, 54.0, 354.0)];
    let books = vec![inv("D", 100.0, 18.0, 118.0)];
    let r = match_invoices(filed, books, None, Tolerance::DEFAULT);
    assert_eq!(r.metrics.matched, 1);
    assert_eq!(r.metrics.only_in_return, 1);
    assert_eq!(r.only_in_return[0].amounts.taxable, 300.0);
  }

  #[test]
  fn rows_outside_the_period_are_reported_not_matched() {
    let mut late = inv("L-1", 100.0, 18.0, 118.0);
    late.date = NaiveDate::from_ymd_opt(2024, 7, 1);
    let mut undated = inv("U-1", 100.0, 18.0, 118.0);
    undated.date = None;

    let r = match_invoices(
      vec![inv("L-1", 100.0, 18.0, 118.0)],
      vec![late, undated],
      Some(&april()),
      Tolerance::DEFAULT,
    );
    assert_eq!(r.metrics.out_of_period, 2);
    assert!(r.out_of_period.iter().all(|o| o.side == Side::Books));
    assert_eq!(r.metrics.only_in_return, 1);
  }
}
