//! Cached upstream payloads and the composite key that addresses them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Gstin, Period};

/// The consultant who owns sessions, cache rows and reports. The account
/// model itself lives outside this crate; only the identifier crosses over.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OwnerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The upstream document a payload came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  AsRefStr,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ReturnType {
  /// Outward-supply return (GSTR-1).
  Gstr1,
  /// Self-assessed tax-summary return (GSTR-3B).
  Gstr3b,
  /// Auto-populated credit statement (GSTR-2B).
  Gstr2b,
  /// Auto-drafted credit return (GSTR-2A).
  Gstr2a,
  /// Taxpayer registration details; not period-bound.
  Details,
}

/// Composite cache key. At most one [`CachedResponse`] exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
  pub owner:       OwnerId,
  pub gstin:       Gstin,
  pub return_type: ReturnType,
  /// Section within the return, e.g. `b2b` or `auto-liability-calc`. Empty
  /// when the return has no sections.
  pub section:     String,
  /// `0` for keys that are not period-bound.
  pub year:        i32,
  /// `0` for keys that are not period-bound.
  pub month:       u32,
}

impl CacheKey {
  pub fn new(
    owner: OwnerId,
    gstin: Gstin,
    return_type: ReturnType,
    section: impl Into<String>,
    period: Period,
  ) -> Self {
    Self {
      owner,
      gstin,
      return_type,
      section: section.into(),
      year: period.year,
      month: period.month,
    }
  }

  /// A key for data that does not belong to any period.
  pub fn unperiodic(
    owner: OwnerId,
    gstin: Gstin,
    return_type: ReturnType,
    section: impl Into<String>,
  ) -> Self {
    Self {
      owner,
      gstin,
      return_type,
      section: section.into(),
      year: 0,
      month: 0,
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{} {:02}-{}",
      self.gstin, self.return_type, self.section, self.month, self.year
    )
  }
}

/// A stored upstream payload. Only validated, unwrapped, non-error payloads
/// are ever written; validity is nevertheless re-checked on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
  pub key:         CacheKey,
  pub raw_payload: serde_json::Value,
  pub fetched_at:  DateTime<Utc>,
}

impl CachedResponse {
  /// Whether the row is younger than `ttl_days` at `now`.
  pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl_days: u32) -> bool {
    now - self.fetched_at < Duration::days(i64::from(ttl_days))
  }
}
