//! The `GstPortal` trait: what the services need from the upstream
//! government API.
//!
//! Implemented over HTTP by `gstr-portal`; tests substitute in-process fakes.

use std::future::Future;

use thiserror::Error;

use crate::{Error, Gstin};

/// Why an upstream call produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
  /// The fixed per-call timeout elapsed.
  #[error("request timed out")]
  Timeout,

  /// Connection failure or any other transport problem.
  #[error("upstream unavailable: {0}")]
  Unavailable(String),

  /// A non-success HTTP status.
  #[error("upstream returned HTTP {0}")]
  Status(u16),

  /// The upstream understood the request and refused it inline
  /// (`status_cd: "0"` or a missing token in an otherwise 200 response).
  #[error("upstream rejected the request: {0}")]
  Rejected(String),

  /// The body could not be parsed as JSON.
  #[error("malformed upstream response: {0}")]
  Malformed(String),
}

impl From<UpstreamError> for Error {
  fn from(err: UpstreamError) -> Self {
    match err {
      UpstreamError::Timeout => Self::UpstreamTimeout,
      UpstreamError::Unavailable(m) | UpstreamError::Malformed(m) => {
        Self::UpstreamUnavailable(m)
      }
      UpstreamError::Status(code) => Self::UpstreamStatus(code),
      UpstreamError::Rejected(m) => Self::UpstreamLogical(m),
    }
  }
}

/// Result of a successful OTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
  pub transaction_id: String,
}

/// Upstream GST portal operations.
///
/// All methods return `Send` futures so implementations can be driven from a
/// multi-threaded runtime.
pub trait GstPortal: Send + Sync {
  /// Exchange the static API key/secret for a platform token.
  fn authenticate(
    &self,
  ) -> impl Future<Output = Result<String, UpstreamError>> + Send + '_;

  /// Ask the portal to send an OTP to the taxpayer's registered contact.
  fn request_otp<'a>(
    &'a self,
    platform_token: &'a str,
    gstin: &'a Gstin,
    username: &'a str,
  ) -> impl Future<Output = Result<OtpChallenge, UpstreamError>> + Send + 'a;

  /// Submit the OTP; on success returns the taxpayer token.
  fn verify_otp<'a>(
    &'a self,
    platform_token: &'a str,
    gstin: &'a Gstin,
    username: &'a str,
    otp: &'a str,
  ) -> impl Future<Output = Result<String, UpstreamError>> + Send + 'a;

  /// `GET` a per-taxpayer resource. `path` is relative to the taxpayer API
  /// root, e.g. `/gstrs/gstr-3b/2024/04`. Any HTTP 200 body is returned as-is,
  /// error-shaped or not.
  fn get_json<'a>(
    &'a self,
    path: &'a str,
    taxpayer_token: &'a str,
  ) -> impl Future<Output = Result<serde_json::Value, UpstreamError>> + Send + 'a;
}
