//! Storage traits for credentials, cached payloads, and report archives.
//!
//! Each trait is implemented by storage backends (e.g. `gstr-store-sqlite`).
//! The services in `gstr-service` depend on these abstractions, never on a
//! concrete backend. Any store offering upsert and timestamp columns can
//! implement them; last write wins everywhere.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Gstin,
  cache::{CacheKey, CachedResponse, OwnerId, ReturnType},
  report::{NewReport, ReportRecord},
  session::{PlatformToken, TaxpayerSession},
};

// ─── Platform token ──────────────────────────────────────────────────────────

/// Holds at most one platform token.
pub trait TokenStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The stored token, expired or not.
  fn current_token(
    &self,
  ) -> impl Future<Output = Result<Option<PlatformToken>, Self::Error>> + Send + '_;

  /// Delete every stored token, then insert `token`.
  fn replace_token(
    &self,
    token: PlatformToken,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete tokens that expired before `now`; returns how many.
  fn delete_expired_tokens(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Taxpayer sessions ───────────────────────────────────────────────────────

pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn insert_session(
    &self,
    session: TaxpayerSession,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a session by id. Returns `None` if not found.
  fn get_session(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<TaxpayerSession>, Self::Error>> + Send + '_;

  /// Overwrite the mutable fields (token, verified flag, username, expiry)
  /// of an existing session.
  fn update_session(
    &self,
    session: TaxpayerSession,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete sessions whose expiry is before `now`; returns how many.
  fn delete_expired_sessions(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Cached upstream payloads ────────────────────────────────────────────────

pub trait ResponseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Exact lookup by composite key.
  fn get_cached<'a>(
    &'a self,
    key: &'a CacheKey,
  ) -> impl Future<Output = Result<Option<CachedResponse>, Self::Error>> + Send + 'a;

  /// Insert or replace the row for `response.key`.
  fn upsert_cached(
    &self,
    response: CachedResponse,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete the row for `key`, if any.
  fn delete_cached<'a>(
    &'a self,
    key: &'a CacheKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Delete every row for `gstin` (any owner, when `owner` is `None`).
  fn delete_for_gstin<'a>(
    &'a self,
    owner: Option<&'a OwnerId>,
    gstin: &'a Gstin,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Delete every section of one return for one period.
  fn delete_for_period<'a>(
    &'a self,
    gstin: &'a Gstin,
    return_type: ReturnType,
    year: i32,
    month: u32,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Delete rows fetched before `cutoff`.
  fn delete_fetched_before(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Report archive ──────────────────────────────────────────────────────────

/// Append-only; records are never updated or deleted.
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn append_report(
    &self,
    report: NewReport,
  ) -> impl Future<Output = Result<ReportRecord, Self::Error>> + Send + '_;

  /// Reports for one (owner, GSTIN), newest first.
  fn list_reports<'a>(
    &'a self,
    owner: &'a OwnerId,
    gstin: &'a Gstin,
  ) -> impl Future<Output = Result<Vec<ReportRecord>, Self::Error>> + Send + 'a;
}
