//! The shared platform credential.

use std::sync::Arc;

use chrono::Utc;
use gstr_core::{
  Error, Result,
  portal::GstPortal,
  session::PlatformToken,
  store::TokenStore,
};
use tracing::info;

/// Hands out the platform token, re-authenticating when the stored one has
/// expired. Concurrent refreshes may both authenticate; the last write wins.
pub struct TokenProvider<S, P> {
  store:  Arc<S>,
  portal: Arc<P>,
}

impl<S, P> Clone for TokenProvider<S, P> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), portal: self.portal.clone() }
  }
}

impl<S: TokenStore, P: GstPortal> TokenProvider<S, P> {
  pub fn new(store: Arc<S>, portal: Arc<P>) -> Self { Self { store, portal } }

  pub async fn get_token(&self) -> Result<String> {
    let now = Utc::now();
    if let Some(token) = self.store.current_token().await.map_err(Error::store)?
      && token.is_valid_at(now)
    {
      return Ok(token.token);
    }

    let raw = self
      .portal
      .authenticate()
      .await
      .map_err(|e| Error::Auth(e.to_string()))?;
    let token = PlatformToken::issue(raw, now);
    info!(expires_at = %token.expires_at, "issued platform token");
    self
      .store
      .replace_token(token.clone())
      .await
      .map_err(Error::store)?;
    Ok(token.token)
  }

  /// Drop expired tokens; returns how many.
  pub async fn purge_expired(&self) -> Result<u64> {
    self
      .store
      .delete_expired_tokens(Utc::now())
      .await
      .map_err(Error::store)
  }
}
