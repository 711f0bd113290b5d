//! Outward-supply return vs sales books, per section, key and period.

use std::collections::BTreeMap;

use gstr_core::Period;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
  TaxAmounts, Tolerance,
  books::BooksEntry,
  books_vs_summary::{ParticularRow, PeriodComparison},
  extract::{OutwardLine, OutwardSection},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum RowStatus {
  Matched,
  Mismatch,
}

/// One group compared across both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRow {
  pub section:    OutwardSection,
  /// Counterparty GSTIN, rate key or export payment type.
  pub key:        String,
  pub period:     Period,
  pub books:      TaxAmounts,
  pub portal:     TaxAmounts,
  /// `books - portal`, with differences inside tolerance shown as zero.
  pub difference: TaxAmounts,
  pub status:     RowStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooksVsOutward {
  pub rows:    Vec<SectionRow>,
  /// Per period, taxable totals for every section.
  pub monthly: Vec<PeriodComparison>,
}

type GroupKey = (OutwardSection, String, Period);

/// Compare books with the outward return over `periods`.
///
/// `portal` holds the extracted lines of each period that could be read.
/// Books entries outside `periods`, and nil, exempt and non-GST entries, take
/// no part.
pub fn reconcile_books_vs_outward(
  periods: &[Period],
  entries: &[BooksEntry],
  portal: &[(Period, Vec<OutwardLine>)],
  tolerance: Tolerance,
) -> BooksVsOutward {
  let mut groups: BTreeMap<GroupKey, (TaxAmounts, TaxAmounts)> = BTreeMap::new();

  for e in entries.iter().filter(|e| periods.contains(&e.period)) {
    if let Some(section) = e.class.outward_section() {
      groups.entry((section, e.outward_key(), e.period)).or_default().0 += e.amounts;
    }
  }
  for (period, lines) in portal.iter().filter(|(p, _)| periods.contains(p)) {
    for line in lines {
      groups
        .entry((line.section, line.key.trim().to_uppercase(), *period))
        .or_default()
        .1 += line.amounts;
    }
  }

  let rows: Vec<SectionRow> = groups
    .into_iter()
    .map(|((section, key, period), (books, portal))| {
      let difference = (books - portal).snap_within(tolerance);
      let status = if difference.is_zero() {
        RowStatus::Matched
      } else {
        RowStatus::Mismatch
      };
      SectionRow { section, key, period, books, portal, difference, status }
    })
    .collect();

  let monthly = periods
    .iter()
    .map(|&period| {
      let totals = OutwardSection::ALL
        .iter()
        .map(|&section| {
          let (books, portal) = rows
            .iter()
            .filter(|r| r.section == section && r.period == period)
            .fold((0.0, 0.0), |(b, p), r| (b + r.books.taxable, p + r.portal.taxable));
          ParticularRow::new(format!("Total {section} (Taxable)"), books, portal)
        })
        .collect();
      PeriodComparison::new(period, totals, tolerance)
    })
    .collect();

  BooksVsOutward { rows, monthly }
}
