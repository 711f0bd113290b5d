//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC strings so that
//! lexicographic comparison in SQL matches chronological order. Payloads and period
//! descriptors are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use gstr_core::{
  Gstin,
  cache::{CacheKey, CachedResponse, OwnerId, ReturnType},
  report::{ReportRecord, ReportType},
  session::{PlatformToken, TaxpayerSession},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_return_type(s: &str) -> Result<ReturnType> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "return_type",
    value:  s.to_owned(),
  })
}

pub fn decode_report_type(s: &str) -> Result<ReportType> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "report_type",
    value:  s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from the `platform_tokens` table.
pub struct RawToken {
  pub token:      String,
  pub issued_at:  String,
  pub expires_at: String,
}

impl RawToken {
  pub fn into_token(self) -> Result<PlatformToken> {
    Ok(PlatformToken {
      token:      self.token,
      issued_at:  decode_dt(&self.issued_at)?,
      expires_at: decode_dt(&self.expires_at)?,
    })
  }
}

/// Raw strings read from the `taxpayer_sessions` table.
pub struct RawSession {
  pub session_id:     String,
  pub owner_id:       String,
  pub gstin:          String,
  pub gst_username:   String,
  pub transaction_id: String,
  pub taxpayer_token: Option<String>,
  pub is_verified:    bool,
  pub created_at:     String,
  pub expires_at:     String,
}

impl RawSession {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:     row.get(0)?,
      owner_id:       row.get(1)?,
      gstin:          row.get(2)?,
      gst_username:   row.get(3)?,
      transaction_id: row.get(4)?,
      taxpayer_token: row.get(5)?,
      is_verified:    row.get(6)?,
      created_at:     row.get(7)?,
      expires_at:     row.get(8)?,
    })
  }

  pub fn into_session(self) -> Result<TaxpayerSession> {
    Ok(TaxpayerSession {
      session_id:     decode_uuid(&self.session_id)?,
      owner:          OwnerId::new(self.owner_id),
      gstin:          Gstin::parse(&self.gstin)?,
      gst_username:   self.gst_username,
      transaction_id: self.transaction_id,
      taxpayer_token: self.taxpayer_token,
      is_verified:    self.is_verified,
      created_at:     decode_dt(&self.created_at)?,
      expires_at:     decode_dt(&self.expires_at)?,
    })
  }
}

/// Raw strings read from the `cached_responses` table.
pub struct RawCached {
  pub owner_id:    String,
  pub gstin:       String,
  pub return_type: String,
  pub section:     String,
  pub year:        i32,
  pub month:       u32,
  pub raw_json:    String,
  pub fetched_at:  String,
}

impl RawCached {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      owner_id:    row.get(0)?,
      gstin:       row.get(1)?,
      return_type: row.get(2)?,
      section:     row.get(3)?,
      year:        row.get(4)?,
      month:       row.get(5)?,
      raw_json:    row.get(6)?,
      fetched_at:  row.get(7)?,
    })
  }

  pub fn into_cached(self) -> Result<CachedResponse> {
    Ok(CachedResponse {
      key:         CacheKey {
        owner:       OwnerId::new(self.owner_id),
        gstin:       Gstin::parse(&self.gstin)?,
        return_type: decode_return_type(&self.return_type)?,
        section:     self.section,
        year:        self.year,
        month:       self.month,
      },
      raw_payload: serde_json::from_str(&self.raw_json)?,
      fetched_at:  decode_dt(&self.fetched_at)?,
    })
  }
}

/// Raw strings read from the `reports` table.
pub struct RawReport {
  pub report_id:    String,
  pub owner_id:     String,
  pub gstin:        String,
  pub report_type:  String,
  pub period_json:  String,
  pub payload_json: String,
  pub created_at:   String,
}

impl RawReport {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      report_id:    row.get(0)?,
      owner_id:     row.get(1)?,
      gstin:        row.get(2)?,
      report_type:  row.get(3)?,
      period_json:  row.get(4)?,
      payload_json: row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_report(self) -> Result<ReportRecord> {
    Ok(ReportRecord {
      report_id:   decode_uuid(&self.report_id)?,
      owner:       OwnerId::new(self.owner_id),
      gstin:       Gstin::parse(&self.gstin)?,
      report_type: decode_report_type(&self.report_type)?,
      period:      serde_json::from_str(&self.period_json)?,
      payload:     serde_json::from_str(&self.payload_json)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}
