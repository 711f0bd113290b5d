//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use gstr_core::{
  Gstin, Period, PeriodDescriptor,
  cache::{CacheKey, CachedResponse, OwnerId, ReturnType},
  report::{NewReport, ReportType},
  session::{PlatformToken, TaxpayerSession},
  store::{ReportStore, ResponseStore, SessionStore, TokenStore},
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn gstin() -> Gstin { Gstin::parse("27AAPFU0939F1ZV").unwrap() }

fn owner() -> OwnerId { OwnerId::new("consultant-1") }

fn key(section: &str, month: u32) -> CacheKey {
  CacheKey::new(
    owner(),
    gstin(),
    ReturnType::Gstr1,
    section,
    Period::new(2024, month).unwrap(),
  )
}

// ─── Platform token ──────────────────────────────────────────────────────────

#[tokio::test]
async fn token_store_starts_empty() {
  let s = store().await;
  assert!(s.current_token().await.unwrap().is_none());
}

#[tokio::test]
async fn replace_token_keeps_only_latest() {
  let s = store().await;
  let now = Utc::now();

  s.replace_token(PlatformToken::issue("first".into(), now))
    .await
    .unwrap();
  s.replace_token(PlatformToken::issue("second".into(), now))
    .await
    .unwrap();

  let current = s.current_token().await.unwrap().unwrap();
  assert_eq!(current.token, "second");
  assert!(current.is_valid_at(now));
}

#[tokio::test]
async fn expired_tokens_are_swept() {
  let s = store().await;
  let then = Utc::now() - Duration::days(2);
  s.replace_token(PlatformToken::issue("old".into(), then))
    .await
    .unwrap();

  assert_eq!(s.delete_expired_tokens(Utc::now()).await.unwrap(), 1);
  assert!(s.current_token().await.unwrap().is_none());
}

// ─── Sessions ────────────────────────────────────────────────────────────────

fn pending() -> TaxpayerSession {
  TaxpayerSession::pending(
    owner(),
    gstin(),
    "acme_user".into(),
    "txn-1".into(),
    Utc::now(),
  )
}

#[tokio::test]
async fn insert_and_get_session() {
  let s = store().await;
  let session = pending();
  s.insert_session(session.clone()).await.unwrap();

  let fetched = s.get_session(session.session_id).await.unwrap().unwrap();
  assert_eq!(fetched.session_id, session.session_id);
  assert_eq!(fetched.gstin, gstin());
  assert_eq!(fetched.transaction_id, "txn-1");
  assert!(!fetched.is_verified);
  assert!(fetched.taxpayer_token.is_none());
}

#[tokio::test]
async fn get_session_missing_returns_none() {
  let s = store().await;
  assert!(s.get_session(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn update_session_persists_verification() {
  let s = store().await;
  let mut session = pending();
  s.insert_session(session.clone()).await.unwrap();

  session.mark_verified("tp-token".into(), "acme_user".into(), Utc::now());
  s.update_session(session.clone()).await.unwrap();

  let fetched = s.get_session(session.session_id).await.unwrap().unwrap();
  assert!(fetched.is_verified);
  assert_eq!(fetched.taxpayer_token.as_deref(), Some("tp-token"));
  assert_eq!(fetched.expires_at.timestamp(), session.expires_at.timestamp());
}

#[tokio::test]
async fn update_unknown_session_errors() {
  let s = store().await;
  let err = s.update_session(pending()).await.unwrap_err();
  assert!(matches!(err, crate::Error::SessionNotFound(_)));
}

#[tokio::test]
async fn expired_sessions_are_swept() {
  let s = store().await;
  let mut stale = pending();
  stale.expires_at = Utc::now() - Duration::minutes(1);
  let fresh = pending();
  s.insert_session(stale.clone()).await.unwrap();
  s.insert_session(fresh.clone()).await.unwrap();

  assert_eq!(s.delete_expired_sessions(Utc::now()).await.unwrap(), 1);
  assert!(s.get_session(stale.session_id).await.unwrap().is_none());
  assert!(s.get_session(fresh.session_id).await.unwrap().is_some());
}

// ─── Cached responses ────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_replaces_row_for_same_key() {
  let s = store().await;
  let k = key("b2b", 4);

  s.upsert_cached(CachedResponse {
    key:         k.clone(),
    raw_payload: json!({ "b2b": [] }),
    fetched_at:  Utc::now() - Duration::days(3),
  })
  .await
  .unwrap();
  s.upsert_cached(CachedResponse {
    key:         k.clone(),
    raw_payload: json!({ "b2b": [{ "ctin": "29ABCDE1234F1Z5" }] }),
    fetched_at:  Utc::now(),
  })
  .await
  .unwrap();

  let row = s.get_cached(&k).await.unwrap().unwrap();
  assert_eq!(row.raw_payload["b2b"][0]["ctin"], "29ABCDE1234F1Z5");
  assert!(row.is_fresh_at(Utc::now(), 7));
}

#[tokio::test]
async fn section_is_part_of_the_key() {
  let s = store().await;
  s.upsert_cached(CachedResponse {
    key:         key("b2b", 4),
    raw_payload: json!({}),
    fetched_at:  Utc::now(),
  })
  .await
  .unwrap();

  assert!(s.get_cached(&key("b2cl", 4)).await.unwrap().is_none());
  assert!(s.get_cached(&key("b2b", 5)).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_cached_reports_presence() {
  let s = store().await;
  let k = key("b2b", 4);
  s.upsert_cached(CachedResponse {
    key:         k.clone(),
    raw_payload: json!({}),
    fetched_at:  Utc::now(),
  })
  .await
  .unwrap();

  assert!(s.delete_cached(&k).await.unwrap());
  assert!(!s.delete_cached(&k).await.unwrap());
}

#[tokio::test]
async fn bulk_deletes() {
  let s = store().await;
  for (section, month) in [("b2b", 4), ("b2cl", 4), ("b2b", 5)] {
    s.upsert_cached(CachedResponse {
      key:         key(section, month),
      raw_payload: json!({}),
      fetched_at:  Utc::now(),
    })
    .await
    .unwrap();
  }
  s.upsert_cached(CachedResponse {
    key:         CacheKey::new(
      OwnerId::new("someone-else"),
      gstin(),
      ReturnType::Gstr1,
      "b2b",
      Period::new(2024, 6).unwrap(),
    ),
    raw_payload: json!({}),
    fetched_at:  Utc::now() - Duration::days(30),
  })
  .await
  .unwrap();

  let n = s
    .delete_for_period(&gstin(), ReturnType::Gstr1, 2024, 4)
    .await
    .unwrap();
  assert_eq!(n, 2);

  let n = s
    .delete_fetched_before(Utc::now() - Duration::days(7))
    .await
    .unwrap();
  assert_eq!(n, 1);

  let n = s.delete_for_gstin(Some(&owner()), &gstin()).await.unwrap();
  assert_eq!(n, 1);
  assert_eq!(s.delete_for_gstin(None, &gstin()).await.unwrap(), 0);
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reports_list_newest_first() {
  let s = store().await;
  for n in 0..3 {
    s.append_report(NewReport {
      owner:       owner(),
      gstin:       gstin(),
      report_type: ReportType::Summary,
      period:      PeriodDescriptor::FinancialYear { fy: 2024 },
      payload:     json!({ "n": n }),
    })
    .await
    .unwrap();
  }

  let reports = s.list_reports(&owner(), &gstin()).await.unwrap();
  assert_eq!(reports.len(), 3);
  assert_eq!(reports[0].payload["n"], 2);
  assert_eq!(reports[2].payload["n"], 0);
  assert_eq!(reports[0].period, PeriodDescriptor::FinancialYear { fy: 2024 });

  let other = s
    .list_reports(&OwnerId::new("nobody"), &gstin())
    .await
    .unwrap();
  assert!(other.is_empty());
}
