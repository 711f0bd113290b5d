//! Upstream credentials: the shared platform token and the per-taxpayer
//! OTP session.
//!
//! A platform token authorises the application itself; a taxpayer token
//! authorises reads of one GSTIN's returns and is only obtained by completing
//! OTP verification inside a [`TaxpayerSession`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Gstin, cache::OwnerId};

/// Lifetime applied to a freshly issued platform token. The upstream limit is
/// 24 hours; one hour is held back.
pub const PLATFORM_TOKEN_TTL_HOURS: i64 = 23;

/// How long an OTP may be entered after it was requested.
pub const PENDING_OTP_TTL_MINUTES: i64 = 10;

/// Lifetime of a verified session, counted from verification.
pub const VERIFIED_SESSION_TTL_HOURS: i64 = 6;

// ─── Platform token ──────────────────────────────────────────────────────────

/// The single active upstream platform credential. Replaced wholesale, never
/// updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformToken {
  pub token:      String,
  pub issued_at:  DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl PlatformToken {
  pub fn issue(token: String, now: DateTime<Utc>) -> Self {
    Self {
      token,
      issued_at: now,
      expires_at: now + Duration::hours(PLATFORM_TOKEN_TTL_HOURS),
    }
  }

  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool { now < self.expires_at }
}

// ─── Taxpayer session ────────────────────────────────────────────────────────

/// Lifecycle state, derived from the stored fields rather than stored itself.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize,
  Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
  PendingOtp,
  Verified,
  Expired,
}

/// OTP state for one (consultant, GSTIN) pair.
///
/// Invariant: `is_verified` implies `taxpayer_token.is_some()`. The only way
/// to reach the verified state is [`TaxpayerSession::mark_verified`], which
/// sets both together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxpayerSession {
  pub session_id:     Uuid,
  pub owner:          OwnerId,
  pub gstin:          Gstin,
  pub gst_username:   String,
  /// Upstream transaction id returned by the OTP request.
  pub transaction_id: String,
  #[serde(skip_serializing)]
  pub taxpayer_token: Option<String>,
  pub is_verified:    bool,
  pub created_at:     DateTime<Utc>,
  pub expires_at:     DateTime<Utc>,
}

impl TaxpayerSession {
  /// A new `PENDING_OTP` session.
  pub fn pending(
    owner: OwnerId,
    gstin: Gstin,
    gst_username: String,
    transaction_id: String,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      session_id: Uuid::new_v4(),
      owner,
      gstin,
      gst_username,
      transaction_id,
      taxpayer_token: None,
      is_verified: false,
      created_at: now,
      expires_at: now + Duration::minutes(PENDING_OTP_TTL_MINUTES),
    }
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now > self.expires_at }

  pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
    if self.is_expired_at(now) {
      SessionState::Expired
    } else if self.is_verified {
      SessionState::Verified
    } else {
      SessionState::PendingOtp
    }
  }

  /// Whether the session may be used to fetch returns. All three conditions
  /// are checked; `is_verified` alone is not enough.
  pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
    self.is_verified && now < self.expires_at && self.taxpayer_token.is_some()
  }

  /// Flip to `VERIFIED`, store the token, and restart the clock.
  pub fn mark_verified(
    &mut self,
    taxpayer_token: String,
    gst_username: String,
    now: DateTime<Utc>,
  ) {
    self.taxpayer_token = Some(taxpayer_token);
    self.gst_username = gst_username;
    self.is_verified = true;
    self.expires_at = now + Duration::hours(VERIFIED_SESSION_TTL_HOURS);
  }

  pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
    let remaining = (self.expires_at - now).num_seconds().max(0);
    SessionStatus {
      session_id:         self.session_id,
      gstin:              self.gstin.clone(),
      gst_username:       self.gst_username.clone(),
      state:              self.state_at(now),
      is_verified:        self.is_verified,
      is_usable:          self.is_usable_at(now),
      expires_in_seconds: remaining,
    }
  }
}

/// Read-only view returned by a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
  pub session_id:         Uuid,
  pub gstin:              Gstin,
  pub gst_username:       String,
  pub state:              SessionState,
  pub is_verified:        bool,
  pub is_usable:          bool,
  pub expires_in_seconds: i64,
}
