//! In-process portal for service tests.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use gstr_core::{
  Gstin,
  portal::{GstPortal, OtpChallenge, UpstreamError},
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
  pub auth:   usize,
  pub otp:    usize,
  pub verify: usize,
  pub get:    usize,
}

/// Counts every call and answers GETs from a path table. Unknown paths get
/// HTTP 404.
#[derive(Default)]
pub struct FakePortal {
  auth:            AtomicUsize,
  otp:             AtomicUsize,
  verify:          AtomicUsize,
  get:             AtomicUsize,
  auth_fails:      AtomicBool,
  otp_rejected:    AtomicBool,
  verify_rejected: AtomicBool,
  responses:       Mutex<HashMap<String, Result<Value, UpstreamError>>>,
  requested:       Mutex<Vec<String>>,
}

impl FakePortal {
  pub fn calls(&self) -> Calls {
    Calls {
      auth:   self.auth.load(Ordering::SeqCst),
      otp:    self.otp.load(Ordering::SeqCst),
      verify: self.verify.load(Ordering::SeqCst),
      get:    self.get.load(Ordering::SeqCst),
    }
  }

  pub fn fail_auth(&self) { self.auth_fails.store(true, Ordering::SeqCst); }

  pub fn reject_otp(&self) { self.otp_rejected.store(true, Ordering::SeqCst); }

  pub fn reject_verify(&self, rejected: bool) {
    self.verify_rejected.store(rejected, Ordering::SeqCst);
  }

  pub fn respond(&self, path: &str, response: Result<Value, UpstreamError>) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(path.to_owned(), response);
  }

  pub fn requested(&self) -> Vec<String> { self.requested.lock().unwrap().clone() }
}

impl GstPortal for FakePortal {
  async fn authenticate(&self) -> Result<String, UpstreamError> {
    let n = self.auth.fetch_add(1, Ordering::SeqCst);
    if self.auth_fails.load(Ordering::SeqCst) {
      return Err(UpstreamError::Status(401));
    }
    Ok(format!("platform-{n}"))
  }

  async fn request_otp(
    &self,
    _platform_token: &str,
    _gstin: &Gstin,
    _username: &str,
  ) -> Result<OtpChallenge, UpstreamError> {
    let n = self.otp.fetch_add(1, Ordering::SeqCst);
    if self.otp_rejected.load(Ordering::SeqCst) {
      return Err(UpstreamError::Rejected("invalid username".into()));
    }
    Ok(OtpChallenge { transaction_id: format!("txn-{n}") })
  }

  async fn verify_otp(
    &self,
    _platform_token: &str,
    _gstin: &Gstin,
    _username: &str,
    otp: &str,
  ) -> Result<String, UpstreamError> {
    self.verify.fetch_add(1, Ordering::SeqCst);
    if self.verify_rejected.load(Ordering::SeqCst) {
      return Err(UpstreamError::Rejected("invalid OTP".into()));
    }
    Ok(format!("taxpayer-{otp}"))
  }

  async fn get_json(
    &self,
    path: &str,
    _taxpayer_token: &str,
  ) -> Result<Value, UpstreamError> {
    self.get.fetch_add(1, Ordering::SeqCst);
    self.requested.lock().unwrap().push(path.to_owned());
    self
      .responses
      .lock()
      .unwrap()
      .get(path)
      .cloned()
      .unwrap_or(Err(UpstreamError::Status(404)))
  }
}
