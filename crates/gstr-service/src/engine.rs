//! Reconciliation runs: fetch what a run needs, reconcile, archive.
//!
//! Every operation takes a [`RunRequest`]. Fetch failures only ever cost the
//! affected cell, so a run always produces a report; the errors that do
//! propagate are malformed uploads, bad period descriptors and store errors
//! from the archive listing.

use std::sync::Arc;

use chrono::Utc;
use gstr_core::{
  Gstin, Period, PeriodDescriptor, Result,
  cache::OwnerId,
  portal::GstPortal,
  report::{NewReport, ReportRecord, ReportType},
  store::{ReportStore, ResponseStore},
};
use gstr_reco::{
  Tolerance,
  books::{self, BooksTable},
  books_vs_credit,
  books_vs_outward::{self, BooksVsOutward},
  books_vs_summary::{self, PeriodComparison},
  comprehensive::{ComprehensiveReconciliation, PeriodReturns, reconcile_comprehensive},
  credit::CreditReconciliation,
  extract::{self, OUTWARD_FETCH_SECTIONS, OutwardLine},
  matching::MatchReport,
  summary::SummaryReconciliation,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{FetchContext, ResponseCache, ReturnFetcher, Settings, pool::fan_out};

/// What the caller asks for: whose returns, which months, with which
/// taxpayer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
  pub owner:          OwnerId,
  pub gstin:          Gstin,
  pub period:         PeriodDescriptor,
  #[serde(skip_serializing, default)]
  pub taxpayer_token: String,
  #[serde(default)]
  pub force_refresh:  bool,
}

impl RunRequest {
  fn context(&self) -> FetchContext {
    FetchContext {
      owner:          self.owner.clone(),
      gstin:          self.gstin.clone(),
      taxpayer_token: self.taxpayer_token.clone(),
      force_refresh:  self.force_refresh,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<T> {
  pub gstin:     Gstin,
  pub period:    PeriodDescriptor,
  pub tolerance: f64,
  pub results:   T,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
  pub tolerance:           Tolerance,
  pub concurrency:         usize,
  pub large_b2c_threshold: f64,
  pub archive:             bool,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      tolerance:           Tolerance::DEFAULT,
      concurrency:         6,
      large_b2c_threshold: books::LARGE_B2C_THRESHOLD,
      archive:             true,
    }
  }
}

impl From<&Settings> for EngineOptions {
  fn from(s: &Settings) -> Self {
    Self {
      tolerance:           Tolerance::new(s.reconcile.tolerance),
      concurrency:         s.fetch.concurrency(),
      large_b2c_threshold: s.reconcile.large_b2c_threshold,
      archive:             s.archive_reports,
    }
  }
}

pub struct ReconciliationEngine<S, P> {
  fetcher: ReturnFetcher<S, P>,
  store:   Arc<S>,
  options: EngineOptions,
}

impl<S, P> ReconciliationEngine<S, P>
where
  S: ResponseStore + ReportStore,
  P: GstPortal,
{
  pub fn new(store: Arc<S>, portal: Arc<P>, ttl_days: u32, options: EngineOptions) -> Self {
    let fetcher = ReturnFetcher::new(ResponseCache::new(store.clone(), ttl_days), portal);
    Self { fetcher, store, options }
  }

  pub fn from_settings(store: Arc<S>, portal: Arc<P>, settings: &Settings) -> Self {
    Self::new(store, portal, settings.cache.ttl_days, settings.into())
  }

  pub fn fetcher(&self) -> &ReturnFetcher<S, P> { &self.fetcher }

  // ── Return vs return ─────────────────────────────────────────────────────

  /// Outward liability vs the filed tax summary, for every due month.
  pub async fn summary(
    &self,
    req: &RunRequest,
  ) -> Result<RunReport<Vec<SummaryReconciliation>>> {
    let results = self
      .period_returns(req, false)
      .await?
      .iter()
      .map(|r| r.summary(self.options.tolerance))
      .collect();
    let report = self.report(req, results);
    self.archive(req, ReportType::Summary, &report).await;
    Ok(report)
  }

  /// Credit statement vs credit claimed, for every due month.
  pub async fn credit(
    &self,
    req: &RunRequest,
  ) -> Result<RunReport<Vec<CreditReconciliation>>> {
    let results = self
      .period_returns(req, true)
      .await?
      .iter()
      .map(|r| r.credit(self.options.tolerance))
      .collect();
    let report = self.report(req, results);
    self.archive(req, ReportType::Credit, &report).await;
    Ok(report)
  }

  /// Both of the above, side by side per month.
  pub async fn comprehensive(
    &self,
    req: &RunRequest,
  ) -> Result<RunReport<Vec<ComprehensiveReconciliation>>> {
    let results = self
      .period_returns(req, true)
      .await?
      .iter()
      .map(|r| reconcile_comprehensive(r, self.options.tolerance))
      .collect();
    let report = self.report(req, results);
    self.archive(req, ReportType::Comprehensive, &report).await;
    Ok(report)
  }

  // ── Books vs return ──────────────────────────────────────────────────────

  pub async fn books_vs_summary(
    &self,
    req: &RunRequest,
    books: &BooksTable,
  ) -> Result<RunReport<Vec<PeriodComparison>>> {
    let entries = books::normalise(&books::parse_sales(books)?, self.options.large_b2c_threshold);
    let periods = req.period.periods()?;
    let ctx = req.context();
    let fetcher = &self.fetcher;
    let ctx_ref = &ctx;
    let filed = fan_out(periods, self.options.concurrency, |p| async move {
      fetcher
        .gstr3b_filed(ctx_ref, p)
        .await
        .and_then(|v| extract::filed_summary(&v))
    })
    .await;

    let results = filed
      .iter()
      .map(|(period, filed)| {
        books_vs_summary::reconcile_books_vs_summary(
          *period,
          &entries,
          filed.as_ref().map(|f| &f.supplies),
          self.options.tolerance,
        )
      })
      .collect();
    let report = self.report(req, results);
    self.archive(req, ReportType::BooksVsSummary, &report).await;
    Ok(report)
  }

  pub async fn books_vs_outward(
    &self,
    req: &RunRequest,
    books: &BooksTable,
  ) -> Result<RunReport<BooksVsOutward>> {
    let entries = books::normalise(&books::parse_sales(books)?, self.options.large_b2c_threshold);
    let periods = req.period.periods()?;
    let cells: Vec<(Period, &'static str)> = periods
      .iter()
      .flat_map(|&p| OUTWARD_FETCH_SECTIONS.iter().map(move |&s| (p, s)))
      .collect();

    let ctx = req.context();
    let fetcher = &self.fetcher;
    let ctx_ref = &ctx;
    let fetched = fan_out(cells, self.options.concurrency, |(p, s)| async move {
      fetcher.gstr1_section(ctx_ref, s, p).await
    })
    .await;

    let portal: Vec<(Period, Vec<OutwardLine>)> = periods
      .iter()
      .map(|&p| {
        let lines = fetched
          .iter()
          .filter(|((period, _), _)| *period == p)
          .filter_map(|((_, section), payload)| {
            payload.as_ref().map(|v| extract::outward_lines(section, v))
          })
          .flatten()
          .collect();
        (p, lines)
      })
      .collect();

    let results = books_vs_outward::reconcile_books_vs_outward(
      &periods,
      &entries,
      &portal,
      self.options.tolerance,
    );
    let report = self.report(req, results);
    self.archive(req, ReportType::BooksVsOutward, &report).await;
    Ok(report)
  }

  /// Credit-return invoices vs purchase books.
  pub async fn books_vs_credit(
    &self,
    req: &RunRequest,
    books: &BooksTable,
  ) -> Result<RunReport<MatchReport>> {
    // Reject a malformed upload before spending upstream calls on it.
    let purchases = books::parse_purchases(books)?;
    let periods = req.period.periods()?;
    let ctx = req.context();
    let fetcher = &self.fetcher;
    let ctx_ref = &ctx;
    let fetched = fan_out(periods.clone(), self.options.concurrency, |p| async move {
      fetcher.gstr2b(ctx_ref, p).await
    })
    .await;

    let filed = fetched
      .iter()
      .filter_map(|(_, payload)| payload.as_ref())
      .flat_map(extract::credit_invoices)
      .collect();
    let results = books_vs_credit::reconcile_books_vs_credit(
      &periods,
      filed,
      purchases,
      self.options.tolerance,
    );
    let report = self.report(req, results);
    self.archive(req, ReportType::BooksVsCredit, &report).await;
    Ok(report)
  }

  /// Both invoice lists uploaded; nothing is fetched.
  pub async fn manual_credit_match(
    &self,
    owner: &OwnerId,
    gstin: &Gstin,
    period: &PeriodDescriptor,
    filed: &BooksTable,
    books: &BooksTable,
  ) -> Result<RunReport<MatchReport>> {
    let periods = period.periods()?;
    let results =
      books_vs_credit::reconcile_manual(filed, books, Some(&periods), self.options.tolerance)?;
    let req = RunRequest {
      owner:          owner.clone(),
      gstin:          gstin.clone(),
      period:         period.clone(),
      taxpayer_token: String::new(),
      force_refresh:  false,
    };
    let report = self.report(&req, results);
    self.archive(&req, ReportType::ManualCreditMatch, &report).await;
    Ok(report)
  }

  // ── Archive ──────────────────────────────────────────────────────────────

  /// Archived reports for one taxpayer, newest first.
  pub async fn reports(&self, owner: &OwnerId, gstin: &Gstin) -> Result<Vec<ReportRecord>> {
    self
      .store
      .list_reports(owner, gstin)
      .await
      .map_err(gstr_core::Error::store)
  }

  // ── Helpers ──────────────────────────────────────────────────────────────

  /// Fetch the returns for each due month, in chronological order.
  async fn period_returns(&self, req: &RunRequest, with_credit: bool) -> Result<Vec<PeriodReturns>> {
    let periods = req.period.due_periods(Utc::now().date_naive())?;
    let ctx = req.context();
    let fetcher = &self.fetcher;
    let ctx_ref = &ctx;
    let fetched = fan_out(periods, self.options.concurrency, |p| async move {
      let credit = async {
        if with_credit { fetcher.gstr2b(ctx_ref, p).await } else { None }
      };
      futures::join!(
        fetcher.gstr3b_auto_liability(ctx_ref, p),
        fetcher.gstr3b_filed(ctx_ref, p),
        credit,
      )
    })
    .await;

    Ok(
      fetched
        .into_iter()
        .map(|(p, (liability, filed, credit))| {
          PeriodReturns::from_payloads(p, liability.as_ref(), filed.as_ref(), credit.as_ref())
        })
        .collect(),
    )
  }

  fn report<T>(&self, req: &RunRequest, results: T) -> RunReport<T> {
    RunReport {
      gstin: req.gstin.clone(),
      period: req.period.clone(),
      tolerance: self.options.tolerance.value(),
      results,
    }
  }

  /// Archiving is best effort; a failed write never costs the caller the
  /// report.
  async fn archive<T: Serialize>(&self, req: &RunRequest, report_type: ReportType, report: &RunReport<T>) {
    if !self.options.archive {
      return;
    }
    let payload = match serde_json::to_value(report) {
      Ok(v) => v,
      Err(e) => {
        warn!(%report_type, error = %e, "failed to serialise report");
        return;
      }
    };
    let new = NewReport {
      owner: req.owner.clone(),
      gstin: req.gstin.clone(),
      report_type,
      period: req.period.clone(),
      payload,
    };
    match self.store.append_report(new).await {
      Ok(record) => info!(report_id = %record.report_id, %report_type, gstin = %req.gstin, "archived report"),
      Err(e) => warn!(%report_type, error = %e, "failed to archive report"),
    }
  }
}

#[cfg(test)]
mod tests {
  use gstr_core::{Error, period::Quarter};
  use gstr_reco::{
    books_vs_summary::PeriodStatus, credit::CreditStatus, extract::OutwardSection,
    summary::SummaryStatus,
  };
  use gstr_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;
  use crate::testing::FakePortal;

  const GSTIN: &str = "27AAPFU0939F1ZV";
  const SUPPLIER: &str = "29ABCDE1234F1Z5";

  struct Harness {
    engine: ReconciliationEngine<SqliteStore, FakePortal>,
    portal: Arc<FakePortal>,
  }

  async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let portal = Arc::new(FakePortal::default());
    Harness {
      engine: ReconciliationEngine::new(store, portal.clone(), 7, EngineOptions::default()),
      portal,
    }
  }

  fn request(period: PeriodDescriptor) -> RunRequest {
    RunRequest {
      owner: OwnerId::new("consultant-1"),
      gstin: Gstin::parse(GSTIN).unwrap(),
      period,
      taxpayer_token: "taxpayer-1".into(),
      force_refresh: false,
    }
  }

  fn april() -> PeriodDescriptor { PeriodDescriptor::Monthly { fy: 2024, month: 4 } }

  fn table(headers: &[&str], rows: &[&[&str]]) -> BooksTable {
    BooksTable::new(
      headers.iter().map(|h| h.to_string()).collect(),
      rows
        .iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect(),
    )
  }

  fn seed_april_returns(portal: &FakePortal) {
    portal.respond(
      "/gstrs/gstr-3b/2024/04/auto-liability-calc",
      Ok(json!({"data": {"liabitc": {"sup_details": {
        "osup_3_1a": {"subtotal": {"txval": 100000, "iamt": 18000}}
      }}}})),
    );
    portal.respond(
      "/gstrs/gstr-3b/2024/04",
      Ok(json!({
        "sup_details": {"osup_det": {"txval": 99500, "iamt": 17950}},
        "itc_elg": {"itc_avl": [
          {"ty": "IMPG", "iamt": 200},
          {"ty": "OTH", "iamt": 1000},
        ]}
      })),
    );
  }

  #[tokio::test]
  async fn summary_flags_mismatch_and_archives() {
    let h = harness().await;
    seed_april_returns(&h.portal);
    let req = request(april());

    let report = h.engine.summary(&req).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, SummaryStatus::Mismatch);
    assert!((report.results[0].total_difference - 550.0).abs() < 1e-9);

    let archived = h.engine.reports(&req.owner, &req.gstin).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].report_type, ReportType::Summary);
  }

  #[tokio::test]
  async fn cached_returns_are_reused_across_runs() {
    let h = harness().await;
    seed_april_returns(&h.portal);
    let req = request(april());
    h.engine.summary(&req).await.unwrap();
    h.engine.summary(&req).await.unwrap();
    assert_eq!(h.portal.calls().get, 2);
  }

  #[tokio::test]
  async fn missing_returns_still_render() {
    let h = harness().await;
    let req = request(PeriodDescriptor::Quarterly { fy: 2024, quarter: Quarter::Q1 });
    let report = h.engine.comprehensive(&req).await.unwrap();
    assert_eq!(report.results.len(), 3);
    let months: Vec<u32> = report.results.iter().map(|r| r.period.month).collect();
    assert_eq!(months, vec![4, 5, 6]);
    for r in &report.results {
      assert_eq!(r.summary.status, SummaryStatus::NoData);
      assert_eq!(r.credit.status, CreditStatus::NoCreditReturnData);
    }
  }

  #[tokio::test]
  async fn credit_over_claim_is_risk() {
    let h = harness().await;
    seed_april_returns(&h.portal);
    h.portal.respond(
      "/gstrs/gstr-2b/2024/04",
      Ok(json!({"itcsumm": {"itcavl": {"nonrevsup": {"iamt": 500}}}})),
    );
    let report = h.engine.credit(&request(april())).await.unwrap();
    let r = &report.results[0];
    assert_eq!(r.adjusted_claim.igst, 1000.0);
    assert_eq!(r.status, CreditStatus::Risk);
  }

  #[tokio::test]
  async fn books_vs_summary_compares_filed_sections() {
    let h = harness().await;
    seed_april_returns(&h.portal);
    let books = table(
      &["Date", "GSTIN", "Taxable", "IGST"],
      &[&["12-04-2024", SUPPLIER, "99500", "17950"]],
    );
    let report = h.engine.books_vs_summary(&request(april()), &books).await.unwrap();
    assert_eq!(report.results[0].status, PeriodStatus::Matched);
  }

  #[tokio::test]
  async fn malformed_books_fail_before_any_fetch() {
    let h = harness().await;
    let books = table(&["GSTIN", "Taxable"], &[&[SUPPLIER, "10"]]);
    let err = h.engine.books_vs_outward(&request(april()), &books).await.unwrap_err();
    assert!(matches!(err, Error::Validation { row: 0, .. }));
    assert_eq!(h.portal.calls().get, 0);
  }

  #[tokio::test]
  async fn books_vs_outward_fetches_every_section() {
    let h = harness().await;
    h.portal.respond(
      "/gstrs/gstr-1/b2b/2024/04",
      Ok(json!({"b2b": [{"ctin": SUPPLIER, "inv": [
        {"inv_typ": "R", "itms": [{"itm_det": {"txval": 1000, "iamt": 180}}]}
      ]}]})),
    );
    let books = table(
      &["Date", "GSTIN", "Taxable", "IGST"],
      &[&["12-04-2024", SUPPLIER, "1000", "180"]],
    );
    let report = h.engine.books_vs_outward(&request(april()), &books).await.unwrap();
    assert_eq!(h.portal.calls().get, OUTWARD_FETCH_SECTIONS.len());
    assert_eq!(report.results.rows.len(), 1);
    assert_eq!(report.results.rows[0].section, OutwardSection::B2b);
    assert_eq!(report.results.monthly[0].status, PeriodStatus::Matched);
  }

  #[tokio::test]
  async fn books_vs_credit_matches_statement_invoices() {
    let h = harness().await;
    h.portal.respond(
      "/gstrs/gstr-2b/2024/04",
      Ok(json!({"data": {"docdata": {"b2b": [{"ctin": SUPPLIER, "trdnm": "Acme", "inv": [
        {"inum": "INV-1", "dt": "05-04-2024", "val": 1180, "txval": 1000, "igst": 180}
      ]}]}}})),
    );
    let books = table(
      &["GSTIN/UIN", "Invoice", "Date", "Gross Amt", "Taxable", "IGST"],
      &[&[SUPPLIER, "INV-1", "05-04-2024", "1180", "1000", "180"]],
    );
    let report = h.engine.books_vs_credit(&request(april()), &books).await.unwrap();
    assert_eq!(report.results.metrics.matched, 1);
  }

  #[tokio::test]
  async fn manual_match_archives_without_fetching() {
    let h = harness().await;
    let req = request(april());
    let side = table(
      &["GSTIN/UIN", "Invoice", "Date", "Gross Amt", "Taxable", "IGST"],
      &[&[SUPPLIER, "A-1", "03-04-2024", "118", "100", "18"]],
    );
    let report = h
      .engine
      .manual_credit_match(&req.owner, &req.gstin, &req.period, &side, &side)
      .await
      .unwrap();
    assert_eq!(report.results.metrics.matched, 1);
    assert_eq!(h.portal.calls().get, 0);
    let archived = h.engine.reports(&req.owner, &req.gstin).await.unwrap();
    assert_eq!(archived[0].report_type, ReportType::ManualCreditMatch);
  }
}
