//! One accessor per upstream return and section.
//!
//! Each accessor builds the cache key and the upstream path, and hands both
//! to [`ResponseCache`]. A cell that cannot be fetched comes back as `None`
//! so a multi-period run can still report on the rest.

use std::sync::Arc;

use gstr_core::{
  Gstin, Period,
  cache::{CacheKey, OwnerId, ReturnType},
  portal::GstPortal,
  store::ResponseStore,
};
use serde_json::Value;
use tracing::warn;

use crate::ResponseCache;

/// Who is fetching, for which taxpayer, with which credential.
#[derive(Debug, Clone)]
pub struct FetchContext {
  pub owner:          OwnerId,
  pub gstin:          Gstin,
  pub taxpayer_token: String,
  pub force_refresh:  bool,
}

impl FetchContext {
  fn key(&self, return_type: ReturnType, section: &str, period: Period) -> CacheKey {
    CacheKey::new(self.owner.clone(), self.gstin.clone(), return_type, section, period)
  }
}

pub mod section {
  pub const SUMMARY: &str = "summary";
  pub const FILED: &str = "filed";
  pub const AUTO_LIABILITY: &str = "auto_liability";
  /// Returns fetched whole.
  pub const ALL: &str = "all";
}

pub struct ReturnFetcher<S, P> {
  cache:  ResponseCache<S>,
  portal: Arc<P>,
}

impl<S, P> Clone for ReturnFetcher<S, P> {
  fn clone(&self) -> Self {
    Self { cache: self.cache.clone(), portal: self.portal.clone() }
  }
}

impl<S: ResponseStore, P: GstPortal> ReturnFetcher<S, P> {
  pub fn new(cache: ResponseCache<S>, portal: Arc<P>) -> Self { Self { cache, portal } }

  pub fn cache(&self) -> &ResponseCache<S> { &self.cache }

  // ── Outward-supply return (GSTR-1) ───────────────────────────────────────

  pub async fn gstr1_summary(&self, ctx: &FetchContext, period: Period) -> Option<Value> {
    let path = format!("/gstrs/gstr-1/{}/{:02}", period.year, period.month);
    self
      .cell(ctx, ctx.key(ReturnType::Gstr1, section::SUMMARY, period), path)
      .await
  }

  pub async fn gstr1_section(
    &self,
    ctx: &FetchContext,
    section: &str,
    period: Period,
  ) -> Option<Value> {
    let section = section.to_lowercase();
    let path = format!("/gstrs/gstr-1/{section}/{}/{:02}", period.year, period.month);
    self
      .cell(ctx, ctx.key(ReturnType::Gstr1, &section, period), path)
      .await
  }

  // ── Tax-summary return (GSTR-3B) ─────────────────────────────────────────

  pub async fn gstr3b_filed(&self, ctx: &FetchContext, period: Period) -> Option<Value> {
    let path = format!("/gstrs/gstr-3b/{}/{:02}", period.year, period.month);
    self
      .cell(ctx, ctx.key(ReturnType::Gstr3b, section::FILED, period), path)
      .await
  }

  /// Liability the portal computes from the outward-supply return.
  pub async fn gstr3b_auto_liability(&self, ctx: &FetchContext, period: Period) -> Option<Value> {
    let path = format!(
      "/gstrs/gstr-3b/{}/{:02}/auto-liability-calc",
      period.year, period.month
    );
    self
      .cell(ctx, ctx.key(ReturnType::Gstr3b, section::AUTO_LIABILITY, period), path)
      .await
  }

  // ── Credit returns (GSTR-2B, GSTR-2A) ────────────────────────────────────

  pub async fn gstr2b(&self, ctx: &FetchContext, period: Period) -> Option<Value> {
    let path = format!("/gstrs/gstr-2b/{}/{:02}", period.year, period.month);
    self
      .cell(ctx, ctx.key(ReturnType::Gstr2b, section::ALL, period), path)
      .await
  }

  pub async fn gstr2a_section(
    &self,
    ctx: &FetchContext,
    section: &str,
    period: Period,
  ) -> Option<Value> {
    let section = section.to_lowercase();
    let path = format!("/gstrs/gstr-2a/{section}/{}/{:02}", period.year, period.month);
    self
      .cell(ctx, ctx.key(ReturnType::Gstr2a, &section, period), path)
      .await
  }

  // ── Taxpayer details ─────────────────────────────────────────────────────

  pub async fn details(&self, ctx: &FetchContext) -> Option<Value> {
    let key = CacheKey::unperiodic(
      ctx.owner.clone(),
      ctx.gstin.clone(),
      ReturnType::Details,
      section::ALL,
    );
    let path = format!("/details?gstin={}", ctx.gstin);
    self.cell(ctx, key, path).await
  }

  async fn cell(&self, ctx: &FetchContext, key: CacheKey, path: String) -> Option<Value> {
    let result = self
      .cache
      .fetch(&key, ctx.force_refresh, || {
        self.portal.get_json(&path, &ctx.taxpayer_token)
      })
      .await;
    match result {
      Ok(payload) => Some(payload),
      Err(e) => {
        warn!(%key, error = %e, "no data for this cell");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use gstr_core::portal::UpstreamError;
  use gstr_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;
  use crate::testing::FakePortal;

  fn ctx() -> FetchContext {
    FetchContext {
      owner:          OwnerId::new("consultant-1"),
      gstin:          Gstin::parse("27AAPFU0939F1ZV").unwrap(),
      taxpayer_token: "taxpayer-1".into(),
      force_refresh:  false,
    }
  }

  async fn fetcher() -> (ReturnFetcher<SqliteStore, FakePortal>, Arc<FakePortal>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let portal = Arc::new(FakePortal::default());
    (ReturnFetcher::new(ResponseCache::new(store, 7), portal.clone()), portal)
  }

  #[tokio::test]
  async fn builds_upstream_paths() {
    let (f, portal) = fetcher().await;
    let ctx = ctx();
    let jan = Period::new(2025, 1).unwrap();
    f.gstr1_summary(&ctx, jan).await;
    f.gstr1_section(&ctx, "B2B", jan).await;
    f.gstr3b_filed(&ctx, jan).await;
    f.gstr3b_auto_liability(&ctx, jan).await;
    f.gstr2b(&ctx, jan).await;
    f.gstr2a_section(&ctx, "cdnr", jan).await;
    f.details(&ctx).await;
    assert_eq!(portal.requested(), vec![
      "/gstrs/gstr-1/2025/01",
      "/gstrs/gstr-1/b2b/2025/01",
      "/gstrs/gstr-3b/2025/01",
      "/gstrs/gstr-3b/2025/01/auto-liability-calc",
      "/gstrs/gstr-2b/2025/01",
      "/gstrs/gstr-2a/cdnr/2025/01",
      "/details?gstin=27AAPFU0939F1ZV",
    ]);
  }

  #[tokio::test]
  async fn filed_and_auto_liability_are_separate_cells() {
    let (f, portal) = fetcher().await;
    let ctx = ctx();
    let apr = Period::new(2024, 4).unwrap();
    portal.respond("/gstrs/gstr-3b/2024/04", Ok(json!({"sup_details": {}})));
    portal.respond(
      "/gstrs/gstr-3b/2024/04/auto-liability-calc",
      Ok(json!({"liabitc": {}})),
    );
    assert_eq!(f.gstr3b_filed(&ctx, apr).await, Some(json!({"sup_details": {}})));
    assert_eq!(f.gstr3b_auto_liability(&ctx, apr).await, Some(json!({"liabitc": {}})));
    f.gstr3b_filed(&ctx, apr).await;
    assert_eq!(portal.calls().get, 2);
  }

  #[tokio::test]
  async fn failures_become_missing_cells() {
    let (f, portal) = fetcher().await;
    let ctx = ctx();
    let apr = Period::new(2024, 4).unwrap();
    portal.respond("/gstrs/gstr-2b/2024/04", Err(UpstreamError::Timeout));
    assert_eq!(f.gstr2b(&ctx, apr).await, None);
    assert_eq!(f.gstr1_summary(&ctx, apr).await, None);
  }
}
