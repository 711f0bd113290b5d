//! Error types for `gstr-core`.
//!
//! The variants mirror how a failure should be handled by the caller:
//! authentication and session errors propagate to the top of a run, upstream
//! errors only ever cost a single cache cell, and validation errors abort the
//! run that received the malformed upload.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  // ── Platform credential ─────────────────────────────────────────────────
  #[error("upstream authentication failed: {0}")]
  Auth(String),

  // ── Taxpayer session state machine ──────────────────────────────────────
  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("session {0} has expired; request a new OTP")]
  SessionExpired(Uuid),

  #[error("session {0} is not verified; complete OTP verification")]
  SessionNotVerified(Uuid),

  #[error("OTP request rejected: {0}")]
  OtpRequest(String),

  #[error("OTP rejected: {0}")]
  OtpInvalid(String),

  // ── Upstream (soft, per cache cell) ─────────────────────────────────────
  #[error("upstream timed out")]
  UpstreamTimeout,

  #[error("upstream unavailable: {0}")]
  UpstreamUnavailable(String),

  #[error("upstream returned HTTP {0}")]
  UpstreamStatus(u16),

  #[error("upstream reported an error: {0}")]
  UpstreamLogical(String),

  // ── Input ───────────────────────────────────────────────────────────────
  #[error("invalid books upload at row {row}, column {column:?}: {message}")]
  Validation {
    /// 1-based data row (the header is row 0); `0` for header-level errors.
    row:     usize,
    column:  String,
    message: String,
  },

  #[error("invalid GSTIN: {0:?}")]
  InvalidGstin(String),

  #[error("invalid period: {0}")]
  InvalidPeriod(String),

  // ── Plumbing ────────────────────────────────────────────────────────────
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error. Used with `map_err` in code generic over a store.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  pub fn validation(
    row: usize,
    column: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self::Validation { row, column: column.into(), message: message.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
