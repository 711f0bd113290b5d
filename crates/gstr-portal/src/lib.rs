//! Async HTTP client for the upstream GST portal.
//!
//! [`PortalClient`] implements [`GstPortal`] over `reqwest`. Every call carries
//! the portal's fixed header set and a per-request timeout; transport failures
//! are reported as [`UpstreamError::Timeout`] or [`UpstreamError::Unavailable`]
//! so callers can tell them apart.

use std::time::Duration;

use gstr_core::{
  Gstin,
  portal::{GstPortal, OtpChallenge, UpstreamError},
};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Connection settings for the upstream portal.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
  /// Root of the taxpayer API; OTP and return paths are appended to it.
  pub base_url:     String,
  /// Platform authentication endpoint.
  pub auth_url:     String,
  pub api_key:      String,
  pub api_secret:   String,
  pub api_version:  String,
  pub timeout_secs: u64,
}

impl Default for PortalConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://api.sandbox.co.in/gst/compliance/tax-payer".into(),
      auth_url:     "https://api.sandbox.co.in/authenticate".into(),
      api_key:      String::new(),
      api_secret:   String::new(),
      api_version:  "1.0.0".into(),
      timeout_secs: 20,
    }
  }
}

/// HTTP implementation of [`GstPortal`].
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct PortalClient {
  client: Client,
  config: PortalConfig,
}

impl PortalClient {
  pub fn new(config: PortalConfig) -> Result<Self, reqwest::Error> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// Attach the headers every taxpayer-API call carries.
  fn headers(&self, req: RequestBuilder, token: &str) -> RequestBuilder {
    req
      .header("x-source", "primary")
      .header("x-api-version", &self.config.api_version)
      .header("x-api-key", &self.config.api_key)
      .header("Authorization", token)
  }

  async fn send(req: RequestBuilder) -> Result<Value, UpstreamError> {
    let resp = req.send().await.map_err(transport_error)?;
    read_json(resp).await
  }
}

impl GstPortal for PortalClient {
  async fn authenticate(&self) -> Result<String, UpstreamError> {
    info!("authenticating with portal platform");
    let req = self
      .client
      .post(&self.config.auth_url)
      .header("x-api-key", &self.config.api_key)
      .header("x-api-secret", &self.config.api_secret)
      .header("x-api-version", &self.config.api_version)
      .header("x-source", "primary");

    let body = Self::send(req).await?;
    body
      .get("access_token")
      .or_else(|| body.pointer("/data/access_token"))
      .and_then(Value::as_str)
      .map(str::to_owned)
      .ok_or_else(|| UpstreamError::Rejected("no access token in response".into()))
  }

  async fn request_otp(
    &self,
    platform_token: &str,
    gstin: &Gstin,
    username: &str,
  ) -> Result<OtpChallenge, UpstreamError> {
    info!(%gstin, "requesting taxpayer OTP");
    let req = self
      .headers(self.client.post(self.url("/otp")), platform_token)
      .json(&json!({ "gstin": gstin.as_str(), "username": username }));

    let body = Self::send(req).await?;
    if let Some(message) = inline_rejection(&body) {
      return Err(UpstreamError::Rejected(message));
    }

    let transaction_id = body
      .get("transaction_id")
      .or_else(|| body.pointer("/data/transaction_id"))
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_owned();
    Ok(OtpChallenge { transaction_id })
  }

  async fn verify_otp(
    &self,
    platform_token: &str,
    gstin: &Gstin,
    username: &str,
    otp: &str,
  ) -> Result<String, UpstreamError> {
    info!(%gstin, "verifying taxpayer OTP");
    // The portal reads the OTP from the query string; it is echoed in the
    // body for deployments that read it there.
    let req = self
      .headers(self.client.post(self.url("/otp/verify")), platform_token)
      .query(&[("otp", otp)])
      .json(&json!({
        "gstin": gstin.as_str(),
        "username": username,
        "otp": otp,
      }));

    let body = Self::send(req).await?;
    if let Some(message) = inline_rejection(&body) {
      return Err(UpstreamError::Rejected(message));
    }

    body
      .pointer("/data/access_token")
      .and_then(Value::as_str)
      .filter(|t| !t.is_empty())
      .map(str::to_owned)
      .ok_or_else(|| UpstreamError::Rejected("OTP verification failed".into()))
  }

  async fn get_json(
    &self,
    path: &str,
    taxpayer_token: &str,
  ) -> Result<Value, UpstreamError> {
    debug!(path, "GET taxpayer resource");
    let req = self.headers(self.client.get(self.url(path)), taxpayer_token);
    Self::send(req).await
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn transport_error(err: reqwest::Error) -> UpstreamError {
  if err.is_timeout() {
    UpstreamError::Timeout
  } else {
    UpstreamError::Unavailable(err.to_string())
  }
}

async fn read_json(resp: Response) -> Result<Value, UpstreamError> {
  let status = resp.status();
  if !status.is_success() {
    return Err(UpstreamError::Status(status.as_u16()));
  }
  let text = resp.text().await.map_err(transport_error)?;
  serde_json::from_str(&text).map_err(|e| UpstreamError::Malformed(e.to_string()))
}

/// An OTP endpoint's 200 response may still carry `data.status_cd == "0"`.
fn inline_rejection(body: &Value) -> Option<String> {
  let data = body.get("data")?;
  let code = data.get("status_cd")?;
  let rejected = code.as_str() == Some("0") || code.as_i64() == Some(0);
  if !rejected {
    return None;
  }
  let message = data
    .get("message")
    .and_then(Value::as_str)
    .or_else(|| data.pointer("/error/message").and_then(Value::as_str))
    .unwrap_or("request rejected by portal");
  Some(message.to_owned())
}
