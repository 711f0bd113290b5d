use std::{net::TcpListener, time::Duration};

use gstr_core::{
  Gstin,
  portal::{GstPortal, UpstreamError},
};
use gstr_portal::{PortalClient, PortalConfig};
use httpmock::{Method::GET, Method::POST, MockServer};
use serde_json::json;

fn can_bind_localhost() -> bool { TcpListener::bind("127.0.0.1:0").is_ok() }

fn gstin() -> Gstin { Gstin::parse("27AAPFU0939F1ZV").unwrap() }

fn client(server: &MockServer, timeout_secs: u64) -> PortalClient {
  PortalClient::new(PortalConfig {
    base_url: server.url("/tax-payer"),
    auth_url: server.url("/authenticate"),
    api_key: "key-1".into(),
    api_secret: "secret-1".into(),
    api_version: "1.0.0".into(),
    timeout_secs,
  })
  .unwrap()
}

#[tokio::test]
async fn authenticate_reads_nested_token() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  let mock = server
    .mock_async(|when, then| {
      when
        .method(POST)
        .path("/authenticate")
        .header("x-api-key", "key-1")
        .header("x-api-secret", "secret-1");
      then
        .status(200)
        .json_body(json!({ "data": { "access_token": "platform-jwt" } }));
    })
    .await;

  let token = client(&server, 5).authenticate().await.unwrap();
  assert_eq!(token, "platform-jwt");
  mock.assert_async().await;
}

#[tokio::test]
async fn request_otp_returns_transaction_id() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  let mock = server
    .mock_async(|when, then| {
      when
        .method(POST)
        .path("/tax-payer/otp")
        .header("authorization", "platform-jwt")
        .header("x-source", "primary")
        .header("x-api-version", "1.0.0")
        .json_body(json!({ "gstin": "27AAPFU0939F1ZV", "username": "acme" }));
      then
        .status(200)
        .json_body(json!({ "transaction_id": "txn-42", "data": { "status_cd": "1" } }));
    })
    .await;

  let challenge = client(&server, 5)
    .request_otp("platform-jwt", &gstin(), "acme")
    .await
    .unwrap();
  assert_eq!(challenge.transaction_id, "txn-42");
  mock.assert_async().await;
}

#[tokio::test]
async fn request_otp_inline_rejection() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when.method(POST).path("/tax-payer/otp");
      then.status(200).json_body(json!({
        "data": { "status_cd": "0", "message": "Invalid username" }
      }));
    })
    .await;

  let err = client(&server, 5)
    .request_otp("platform-jwt", &gstin(), "nobody")
    .await
    .unwrap_err();
  assert_eq!(err, UpstreamError::Rejected("Invalid username".into()));
}

#[tokio::test]
async fn verify_sends_otp_in_query_and_body() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  let mock = server
    .mock_async(|when, then| {
      when
        .method(POST)
        .path("/tax-payer/otp/verify")
        .query_param("otp", "123456")
        .json_body(json!({
          "gstin": "27AAPFU0939F1ZV",
          "username": "acme",
          "otp": "123456",
        }));
      then
        .status(200)
        .json_body(json!({ "data": { "access_token": "taxpayer-jwt" } }));
    })
    .await;

  let token = client(&server, 5)
    .verify_otp("platform-jwt", &gstin(), "acme", "123456")
    .await
    .unwrap();
  assert_eq!(token, "taxpayer-jwt");
  mock.assert_async().await;
}

#[tokio::test]
async fn verify_without_token_is_rejected() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when.method(POST).path("/tax-payer/otp/verify");
      then.status(200).json_body(json!({ "data": {} }));
    })
    .await;

  let err = client(&server, 5)
    .verify_otp("platform-jwt", &gstin(), "acme", "000000")
    .await
    .unwrap_err();
  assert!(matches!(err, UpstreamError::Rejected(_)));
}

#[tokio::test]
async fn get_json_returns_error_shaped_bodies_untouched() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when
        .method(GET)
        .path("/tax-payer/gstrs/gstr-3b/2024/04")
        .header("authorization", "taxpayer-jwt");
      then
        .status(200)
        .json_body(json!({ "status_cd": "0", "error": { "message": "boom" } }));
    })
    .await;

  let body = client(&server, 5)
    .get_json("/gstrs/gstr-3b/2024/04", "taxpayer-jwt")
    .await
    .unwrap();
  assert_eq!(body["status_cd"], "0");
}

#[tokio::test]
async fn non_success_status_is_reported() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when.method(GET).path("/tax-payer/gstrs/gstr-2b/2024/04");
      then.status(500);
    })
    .await;

  let err = client(&server, 5)
    .get_json("/gstrs/gstr-2b/2024/04", "taxpayer-jwt")
    .await
    .unwrap_err();
  assert_eq!(err, UpstreamError::Status(500));
}

#[tokio::test]
async fn slow_upstream_times_out() {
  if !can_bind_localhost() {
    return;
  }
  let server = MockServer::start_async().await;
  server
    .mock_async(|when, then| {
      when.method(GET).path("/tax-payer/gstrs/gstr-1/2024/04");
      then
        .status(200)
        .delay(Duration::from_secs(3))
        .json_body(json!({}));
    })
    .await;

  let err = client(&server, 1)
    .get_json("/gstrs/gstr-1/2024/04", "taxpayer-jwt")
    .await
    .unwrap_err();
  assert_eq!(err, UpstreamError::Timeout);
}

#[tokio::test]
async fn unreachable_upstream_is_unavailable() {
  let client = PortalClient::new(PortalConfig {
    base_url: "http://127.0.0.1:9".into(),
    timeout_secs: 2,
    ..PortalConfig::default()
  })
  .unwrap();

  let err = client
    .get_json("/gstrs/gstr-1/2024/04", "taxpayer-jwt")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    UpstreamError::Unavailable(_) | UpstreamError::Timeout
  ));
}
