//! The per-taxpayer OTP session lifecycle.
//!
//! A session starts `PENDING_OTP` for ten minutes after the OTP request, moves
//! to `VERIFIED` (six more hours) once the OTP is accepted, and is gone after
//! expiry. Expired sessions are never revived; the caller creates a new one.

use std::sync::Arc;

use chrono::Utc;
use gstr_core::{
  Error, Gstin, Result,
  cache::OwnerId,
  portal::{GstPortal, UpstreamError},
  session::{SessionStatus, TaxpayerSession},
  store::{SessionStore, TokenStore},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::TokenProvider;

pub struct SessionManager<S, P> {
  store:  Arc<S>,
  portal: Arc<P>,
  tokens: TokenProvider<S, P>,
}

impl<S, P> SessionManager<S, P>
where
  S: SessionStore + TokenStore,
  P: GstPortal,
{
  pub fn new(store: Arc<S>, portal: Arc<P>) -> Self {
    let tokens = TokenProvider::new(store.clone(), portal.clone());
    Self { store, portal, tokens }
  }

  /// Request an OTP and record a pending session. Nothing is stored when the
  /// upstream refuses the request.
  pub async fn create(
    &self,
    owner: OwnerId,
    gstin: &str,
    gst_username: &str,
  ) -> Result<TaxpayerSession> {
    let gstin = Gstin::parse(gstin)?;
    let platform = self.tokens.get_token().await?;
    let challenge = self
      .portal
      .request_otp(&platform, &gstin, gst_username)
      .await
      .map_err(|e| match e {
        UpstreamError::Rejected(m) => Error::OtpRequest(m),
        other => other.into(),
      })?;

    let session = TaxpayerSession::pending(
      owner,
      gstin,
      gst_username.to_owned(),
      challenge.transaction_id,
      Utc::now(),
    );
    self
      .store
      .insert_session(session.clone())
      .await
      .map_err(Error::store)?;
    info!(session_id = %session.session_id, gstin = %session.gstin, "OTP requested");

    if let Err(e) = self.sweep_expired().await {
      warn!(error = %e, "failed to sweep expired sessions");
    }
    Ok(session)
  }

  /// Submit the OTP. Re-verifying a verified session succeeds without an
  /// upstream call; a rejected OTP leaves the session pending.
  pub async fn verify(
    &self,
    owner: &OwnerId,
    session_id: Uuid,
    otp: &str,
    gst_username: Option<&str>,
  ) -> Result<SessionStatus> {
    let now = Utc::now();
    let mut session = self.owned(owner, session_id).await?;
    if session.is_expired_at(now) {
      return Err(Error::SessionExpired(session_id));
    }
    if session.is_usable_at(now) {
      return Ok(session.status_at(now));
    }

    let username = gst_username.unwrap_or(session.gst_username.as_str()).to_owned();
    let platform = self.tokens.get_token().await?;
    let taxpayer_token = self
      .portal
      .verify_otp(&platform, &session.gstin, &username, otp)
      .await
      .map_err(|e| match e {
        UpstreamError::Rejected(m) => Error::OtpInvalid(m),
        other => other.into(),
      })?;

    session.mark_verified(taxpayer_token, username, now);
    self
      .store
      .update_session(session.clone())
      .await
      .map_err(Error::store)?;
    info!(%session_id, gstin = %session.gstin, "session verified");
    Ok(session.status_at(now))
  }

  /// Remaining lifetime and flags. Never changes the session.
  pub async fn status(&self, owner: &OwnerId, session_id: Uuid) -> Result<SessionStatus> {
    Ok(self.owned(owner, session_id).await?.status_at(Utc::now()))
  }

  /// The session, if it can be used to fetch returns right now.
  pub async fn usable(&self, owner: &OwnerId, session_id: Uuid) -> Result<TaxpayerSession> {
    let now = Utc::now();
    let session = self.owned(owner, session_id).await?;
    if session.is_expired_at(now) {
      Err(Error::SessionExpired(session_id))
    } else if !session.is_usable_at(now) {
      Err(Error::SessionNotVerified(session_id))
    } else {
      Ok(session)
    }
  }

  /// Delete expired sessions; returns how many.
  pub async fn sweep_expired(&self) -> Result<u64> {
    self
      .store
      .delete_expired_sessions(Utc::now())
      .await
      .map_err(Error::store)
  }

  /// Another owner's session reads as missing.
  async fn owned(&self, owner: &OwnerId, session_id: Uuid) -> Result<TaxpayerSession> {
    self
      .store
      .get_session(session_id)
      .await
      .map_err(Error::store)?
      .filter(|s| &s.owner == owner)
      .ok_or(Error::SessionNotFound(session_id))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use gstr_core::session::SessionState;
  use gstr_store_sqlite::SqliteStore;

  use super::*;
  use crate::testing::FakePortal;

  const GSTIN: &str = "27AAPFU0939F1ZV";

  struct Harness {
    sessions: SessionManager<SqliteStore, FakePortal>,
    store:    Arc<SqliteStore>,
    portal:   Arc<FakePortal>,
    owner:    OwnerId,
  }

  async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let portal = Arc::new(FakePortal::default());
    Harness {
      sessions: SessionManager::new(store.clone(), portal.clone()),
      store,
      portal,
      owner: OwnerId::new("consultant-1"),
    }
  }

  #[tokio::test]
  async fn create_then_verify() {
    let h = harness().await;
    let s = h.sessions.create(h.owner.clone(), GSTIN, "acme").await.unwrap();
    assert_eq!(s.transaction_id, "txn-0");
    assert!(!s.is_verified);

    let status = h.sessions.verify(&h.owner, s.session_id, "123456", None).await.unwrap();
    assert_eq!(status.state, SessionState::Verified);
    assert!(status.is_usable);
    assert!(status.expires_in_seconds > 5 * 3600);

    let usable = h.sessions.usable(&h.owner, s.session_id).await.unwrap();
    assert_eq!(usable.taxpayer_token.as_deref(), Some("taxpayer-123456"));
  }

  #[tokio::test]
  async fn invalid_gstin_is_rejected_before_upstream() {
    let h = harness().await;
    let err = h.sessions.create(h.owner.clone(), "not-a-gstin", "acme").await.unwrap_err();
    assert!(matches!(err, Error::InvalidGstin(_)));
    assert_eq!(h.portal.calls().otp, 0);
  }

  #[tokio::test]
  async fn rejected_otp_request_creates_nothing() {
    let h = harness().await;
    h.portal.reject_otp();
    let err = h.sessions.create(h.owner.clone(), GSTIN, "acme").await.unwrap_err();
    assert!(matches!(err, Error::OtpRequest(_)));
    assert_eq!(stored_sessions(&h).await, 0);

    let accepted = harness().await;
    accepted.sessions.create(accepted.owner.clone(), GSTIN, "acme").await.unwrap();
    assert_eq!(stored_sessions(&accepted).await, 1);
  }

  /// Every stored session expires within a year, so sweeping with a cutoff
  /// a year out removes and counts all of them.
  async fn stored_sessions(h: &Harness) -> u64 {
    h.store
      .delete_expired_sessions(Utc::now() + Duration::days(365))
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn reverify_makes_one_upstream_call() {
    let h = harness().await;
    let s = h.sessions.create(h.owner.clone(), GSTIN, "acme").await.unwrap();
    h.sessions.verify(&h.owner, s.session_id, "111111", None).await.unwrap();
    h.sessions.verify(&h.owner, s.session_id, "111111", None).await.unwrap();
    assert_eq!(h.portal.calls().verify, 1);
  }

  #[tokio::test]
  async fn wrong_otp_keeps_session_pending_and_retryable() {
    let h = harness().await;
    let s = h.sessions.create(h.owner.clone(), GSTIN, "acme").await.unwrap();

    h.portal.reject_verify(true);
    let err = h.sessions.verify(&h.owner, s.session_id, "000000", None).await.unwrap_err();
    assert!(matches!(err, Error::OtpInvalid(_)));
    let status = h.sessions.status(&h.owner, s.session_id).await.unwrap();
    assert_eq!(status.state, SessionState::PendingOtp);

    h.portal.reject_verify(false);
    let status = h.sessions.verify(&h.owner, s.session_id, "123456", Some("acme2")).await.unwrap();
    assert_eq!(status.gst_username, "acme2");
  }

  #[tokio::test]
  async fn expired_pending_session_never_reaches_upstream() {
    let h = harness().await;
    let s = TaxpayerSession::pending(
      h.owner.clone(),
      Gstin::parse(GSTIN).unwrap(),
      "acme".into(),
      "txn".into(),
      Utc::now() - Duration::minutes(20),
    );
    h.store.insert_session(s.clone()).await.unwrap();

    let err = h.sessions.verify(&h.owner, s.session_id, "123456", None).await.unwrap_err();
    assert!(matches!(err, Error::SessionExpired(_)));
    assert_eq!(h.portal.calls().verify, 0);

    // status is a pure read: the expired row is still there.
    let status = h.sessions.status(&h.owner, s.session_id).await.unwrap();
    assert_eq!(status.state, SessionState::Expired);
    assert_eq!(status.expires_in_seconds, 0);
  }

  #[tokio::test]
  async fn other_owners_cannot_see_a_session() {
    let h = harness().await;
    let s = h.sessions.create(h.owner.clone(), GSTIN, "acme").await.unwrap();
    let stranger = OwnerId::new("consultant-2");
    assert!(matches!(
      h.sessions.status(&stranger, s.session_id).await,
      Err(Error::SessionNotFound(_))
    ));
  }

  #[tokio::test]
  async fn pending_session_is_not_usable() {
    let h = harness().await;
    let s = h.sessions.create(h.owner.clone(), GSTIN, "acme").await.unwrap();
    assert!(matches!(
      h.sessions.usable(&h.owner, s.session_id).await,
      Err(Error::SessionNotVerified(_))
    ));
  }

  #[tokio::test]
  async fn sweep_deletes_expired_sessions() {
    let h = harness().await;
    let old = TaxpayerSession::pending(
      h.owner.clone(),
      Gstin::parse(GSTIN).unwrap(),
      "acme".into(),
      "txn".into(),
      Utc::now() - Duration::hours(1),
    );
    h.store.insert_session(old.clone()).await.unwrap();
    assert_eq!(h.sessions.sweep_expired().await.unwrap(), 1);
    assert!(h.store.get_session(old.session_id).await.unwrap().is_none());
  }
}
