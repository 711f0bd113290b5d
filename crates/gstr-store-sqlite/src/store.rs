//! [`SqliteStore`]: the SQLite implementation of every `gstr_core` store
//! trait.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use gstr_core::{
  Gstin,
  cache::{CacheKey, CachedResponse, OwnerId, ReturnType},
  report::{NewReport, ReportRecord},
  session::{PlatformToken, TaxpayerSession},
  store::{ReportStore, ResponseStore, SessionStore, TokenStore},
};

use crate::{
  Error, Result,
  encode::{RawCached, RawReport, RawSession, RawToken, encode_dt, encode_uuid},
  schema::SCHEMA,
};

const SESSION_COLUMNS: &str = "session_id, owner_id, gstin, gst_username, \
                               transaction_id, taxpayer_token, is_verified, \
                               created_at, expires_at";

const CACHE_COLUMNS: &str =
  "owner_id, gstin, return_type, section, year, month, raw_json, fetched_at";

const REPORT_COLUMNS: &str = "report_id, owner_id, gstin, report_type, \
                              period_json, payload_json, created_at";

// ─── Store ───────────────────────────────────────────────────────────────────

/// Credential, cache and report storage backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single `DELETE` with one timestamp parameter.
  async fn delete_where_before(
    &self,
    sql: &'static str,
    cutoff: DateTime<Utc>,
  ) -> Result<u64> {
    let cutoff = encode_dt(cutoff);
    let n = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params![cutoff])?))
      .await?;
    debug!(rows = n, sql, "purged rows");
    Ok(n as u64)
  }
}

// ─── TokenStore ──────────────────────────────────────────────────────────────

impl TokenStore for SqliteStore {
  type Error = Error;

  async fn current_token(&self) -> Result<Option<PlatformToken>> {
    let raw: Option<RawToken> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT token, issued_at, expires_at FROM platform_tokens \
               ORDER BY expires_at DESC LIMIT 1",
              [],
              |row| {
                Ok(RawToken {
                  token:      row.get(0)?,
                  issued_at:  row.get(1)?,
                  expires_at: row.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawToken::into_token).transpose()
  }

  async fn replace_token(&self, token: PlatformToken) -> Result<()> {
    let issued_at = encode_dt(token.issued_at);
    let expires_at = encode_dt(token.expires_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM platform_tokens", [])?;
        tx.execute(
          "INSERT INTO platform_tokens (token, issued_at, expires_at) \
           VALUES (?1, ?2, ?3)",
          rusqlite::params![token.token, issued_at, expires_at],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
    self
      .delete_where_before(
        "DELETE FROM platform_tokens WHERE expires_at < ?1",
        now,
      )
      .await
  }
}

// ─── SessionStore ────────────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  type Error = Error;

  async fn insert_session(&self, session: TaxpayerSession) -> Result<()> {
    let id = encode_uuid(session.session_id);
    let created_at = encode_dt(session.created_at);
    let expires_at = encode_dt(session.expires_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO taxpayer_sessions (session_id, owner_id, gstin, \
           gst_username, transaction_id, taxpayer_token, is_verified, \
           created_at, expires_at) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id,
            session.owner.as_str(),
            session.gstin.as_str(),
            session.gst_username,
            session.transaction_id,
            session.taxpayer_token,
            session.is_verified,
            created_at,
            expires_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_session(&self, session_id: Uuid) -> Result<Option<TaxpayerSession>> {
    let id = encode_uuid(session_id);

    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SESSION_COLUMNS} FROM taxpayer_sessions WHERE \
                 session_id = ?1"
              ),
              rusqlite::params![id],
              RawSession::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  async fn update_session(&self, session: TaxpayerSession) -> Result<()> {
    let id = encode_uuid(session.session_id);
    let expires_at = encode_dt(session.expires_at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE taxpayer_sessions SET gst_username = ?2, \
           taxpayer_token = ?3, is_verified = ?4, expires_at = ?5 \
           WHERE session_id = ?1",
          rusqlite::params![
            id,
            session.gst_username,
            session.taxpayer_token,
            session.is_verified,
            expires_at,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::SessionNotFound(session.session_id));
    }
    Ok(())
  }

  async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
    self
      .delete_where_before(
        "DELETE FROM taxpayer_sessions WHERE expires_at < ?1",
        now,
      )
      .await
  }
}

// ─── ResponseStore ───────────────────────────────────────────────────────────

impl ResponseStore for SqliteStore {
  type Error = Error;

  async fn get_cached(&self, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let owner = key.owner.as_str().to_owned();
    let gstin = key.gstin.as_str().to_owned();
    let return_type = key.return_type.as_ref().to_owned();
    let section = key.section.clone();
    let (year, month) = (key.year, key.month);

    let raw: Option<RawCached> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CACHE_COLUMNS} FROM cached_responses WHERE \
                 owner_id = ?1 AND gstin = ?2 AND return_type = ?3 AND \
                 section = ?4 AND year = ?5 AND month = ?6"
              ),
              rusqlite::params![owner, gstin, return_type, section, year, month],
              RawCached::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCached::into_cached).transpose()
  }

  async fn upsert_cached(&self, response: CachedResponse) -> Result<()> {
    let raw_json = serde_json::to_string(&response.raw_payload)?;
    let fetched_at = encode_dt(response.fetched_at);
    let key = response.key;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cached_responses (owner_id, gstin, return_type, \
           section, year, month, raw_json, fetched_at) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
           ON CONFLICT (owner_id, gstin, return_type, section, year, month) \
           DO UPDATE SET raw_json = excluded.raw_json, \
                         fetched_at = excluded.fetched_at",
          rusqlite::params![
            key.owner.as_str(),
            key.gstin.as_str(),
            key.return_type.as_ref(),
            key.section,
            key.year,
            key.month,
            raw_json,
            fetched_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_cached(&self, key: &CacheKey) -> Result<bool> {
    let owner = key.owner.as_str().to_owned();
    let gstin = key.gstin.as_str().to_owned();
    let return_type = key.return_type.as_ref().to_owned();
    let section = key.section.clone();
    let (year, month) = (key.year, key.month);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM cached_responses WHERE owner_id = ?1 AND gstin = ?2 \
           AND return_type = ?3 AND section = ?4 AND year = ?5 AND month = ?6",
          rusqlite::params![owner, gstin, return_type, section, year, month],
        )?)
      })
      .await?;
    Ok(n > 0)
  }

  async fn delete_for_gstin(
    &self,
    owner: Option<&OwnerId>,
    gstin: &Gstin,
  ) -> Result<u64> {
    let owner = owner.map(|o| o.as_str().to_owned());
    let gstin = gstin.as_str().to_owned();

    let n = self
      .conn
      .call(move |conn| {
        Ok(match owner {
          Some(owner) => conn.execute(
            "DELETE FROM cached_responses WHERE gstin = ?1 AND owner_id = ?2",
            rusqlite::params![gstin, owner],
          )?,
          None => conn.execute(
            "DELETE FROM cached_responses WHERE gstin = ?1",
            rusqlite::params![gstin],
          )?,
        })
      })
      .await?;
    Ok(n as u64)
  }

  async fn delete_for_period(
    &self,
    gstin: &Gstin,
    return_type: ReturnType,
    year: i32,
    month: u32,
  ) -> Result<u64> {
    let gstin = gstin.as_str().to_owned();
    let return_type = return_type.as_ref().to_owned();

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM cached_responses WHERE gstin = ?1 AND \
           return_type = ?2 AND year = ?3 AND month = ?4",
          rusqlite::params![gstin, return_type, year, month],
        )?)
      })
      .await?;
    Ok(n as u64)
  }

  async fn delete_fetched_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
    self
      .delete_where_before(
        "DELETE FROM cached_responses WHERE fetched_at < ?1",
        cutoff,
      )
      .await
  }
}

// ─── ReportStore ─────────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  async fn append_report(&self, report: NewReport) -> Result<ReportRecord> {
    let record = ReportRecord {
      report_id:   Uuid::new_v4(),
      owner:       report.owner,
      gstin:       report.gstin,
      report_type: report.report_type,
      period:      report.period,
      payload:     report.payload,
      created_at:  Utc::now(),
    };

    let id = encode_uuid(record.report_id);
    let owner = record.owner.as_str().to_owned();
    let gstin = record.gstin.as_str().to_owned();
    let report_type = record.report_type.as_ref().to_owned();
    let period_json = serde_json::to_string(&record.period)?;
    let payload_json = serde_json::to_string(&record.payload)?;
    let created_at = encode_dt(record.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reports (report_id, owner_id, gstin, report_type, \
           period_json, payload_json, created_at) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id,
            owner,
            gstin,
            report_type,
            period_json,
            payload_json,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn list_reports(
    &self,
    owner: &OwnerId,
    gstin: &Gstin,
  ) -> Result<Vec<ReportRecord>> {
    let owner = owner.as_str().to_owned();
    let gstin = gstin.as_str().to_owned();

    let raws: Vec<RawReport> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REPORT_COLUMNS} FROM reports WHERE owner_id = ?1 AND \
           gstin = ?2 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner, gstin], RawReport::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReport::into_report).collect()
  }
}
