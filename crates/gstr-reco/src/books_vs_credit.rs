//! Credit return vs purchase books, by invoice.

use gstr_core::{Period, Result};
use tracing::info;

use crate::{
  Tolerance,
  books::{BooksTable, parse_purchases},
  matching::{InvoiceRecord, MatchReport, match_invoices},
};

/// Match the credit-return invoices of `periods` against purchase rows
/// already read with [`parse_purchases`].
pub fn reconcile_books_vs_credit(
  periods: &[Period],
  filed: Vec<InvoiceRecord>,
  books: Vec<InvoiceRecord>,
  tolerance: Tolerance,
) -> MatchReport {
  let report = match_invoices(filed, books, Some(periods), tolerance);
  info!(
    matched = report.metrics.matched,
    only_in_return = report.metrics.only_in_return,
    only_in_books = report.metrics.only_in_books,
    "matched credit return against books"
  );
  report
}

/// Both sides uploaded in the purchase-books layout. Without `periods`
/// every row takes part.
pub fn reconcile_manual(
  filed: &BooksTable,
  books: &BooksTable,
  periods: Option<&[Period]>,
  tolerance: Tolerance,
) -> Result<MatchReport> {
  let filed = parse_purchases(filed)?;
  let books = parse_purchases(books)?;
  Ok(match_invoices(filed, books, periods, tolerance))
}
