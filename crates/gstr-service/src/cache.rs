//! Cache-first access to upstream payloads.
//!
//! Rows are revalidated on every read: a row that now classifies as an
//! upstream error is deleted and refetched, so a bad payload can never be
//! served for the rest of its TTL.

use std::{future::Future, sync::Arc};

use chrono::{Duration, Utc};
use gstr_core::{
  Error, Gstin, Period, Result,
  cache::{CacheKey, CachedResponse, OwnerId, ReturnType},
  payload::{Payload, PortalError},
  portal::UpstreamError,
  store::ResponseStore,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TTL_DAYS: u32 = 7;

/// Why one cache cell has no data.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error(transparent)]
  Upstream(#[from] UpstreamError),

  #[error("upstream reported an error: {0}")]
  Logical(PortalError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
  fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub struct ResponseCache<S> {
  store:    Arc<S>,
  ttl_days: u32,
}

impl<S> Clone for ResponseCache<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), ttl_days: self.ttl_days } }
}

impl<S: ResponseStore> ResponseCache<S> {
  pub fn new(store: Arc<S>, ttl_days: u32) -> Self { Self { store, ttl_days } }

  pub fn ttl_days(&self) -> u32 { self.ttl_days }

  /// Serve `key` from the cache, or call `fetch_fn` and cache what it
  /// returns. Only validated, unwrapped payloads are ever stored.
  pub async fn fetch<F, Fut>(
    &self,
    key: &CacheKey,
    force_refresh: bool,
    fetch_fn: F,
  ) -> Result<Value, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, UpstreamError>>,
  {
    let now = Utc::now();

    if !force_refresh
      && let Some(row) = self.store.get_cached(key).await.map_err(FetchError::store)?
    {
      let fresh = row.is_fresh_at(now, self.ttl_days);
      match Payload::unwrap_all(row.raw_payload) {
        Err(err) => {
          warn!(%key, error = %err, "deleting cached upstream error");
          self.store.delete_cached(key).await.map_err(FetchError::store)?;
        }
        Ok(doc) if fresh => {
          debug!(%key, "cache hit");
          return Ok(doc);
        }
        Ok(_) => debug!(%key, fetched_at = %row.fetched_at, "cache entry is stale"),
      }
    }

    info!(%key, "fetching from upstream");
    let raw = fetch_fn().await?;
    let payload = Payload::unwrap_all(raw).map_err(FetchError::Logical)?;

    let row = CachedResponse { key: key.clone(), raw_payload: payload, fetched_at: now };
    if let Err(e) = self.store.upsert_cached(row.clone()).await {
      warn!(%key, error = %e, "failed to cache payload");
    }
    Ok(row.raw_payload)
  }

  /// Drop every cached payload for `gstin`, for one owner or all of them.
  pub async fn clear_for_gstin(&self, owner: Option<&OwnerId>, gstin: &Gstin) -> Result<u64> {
    let n = self
      .store
      .delete_for_gstin(owner, gstin)
      .await
      .map_err(Error::store)?;
    info!(%gstin, deleted = n, "cleared cache for GSTIN");
    Ok(n)
  }

  /// Drop every section of one return for one period.
  pub async fn clear_for_period(
    &self,
    gstin: &Gstin,
    return_type: ReturnType,
    period: Period,
  ) -> Result<u64> {
    let n = self
      .store
      .delete_for_period(gstin, return_type, period.year, period.month)
      .await
      .map_err(Error::store)?;
    info!(%gstin, %return_type, %period, deleted = n, "cleared cache for period");
    Ok(n)
  }

  /// Drop rows older than `ttl_days`, or this cache's TTL when `None`.
  pub async fn purge_expired(&self, ttl_days: Option<u32>) -> Result<u64> {
    let days = ttl_days.unwrap_or(self.ttl_days);
    let cutoff = Utc::now() - Duration::days(i64::from(days));
    self
      .store
      .delete_fetched_before(cutoff)
      .await
      .map_err(Error::store)
  }
}
