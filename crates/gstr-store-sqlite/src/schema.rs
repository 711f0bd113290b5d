//! SQL schema for the GST reconciliation SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- At most one row; replaced by DELETE + INSERT, never updated.
CREATE TABLE IF NOT EXISTS platform_tokens (
    token       TEXT NOT NULL,
    issued_at   TEXT NOT NULL,   -- RFC 3339 UTC
    expires_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS taxpayer_sessions (
    session_id      TEXT PRIMARY KEY,
    owner_id        TEXT NOT NULL,
    gstin           TEXT NOT NULL,
    gst_username    TEXT NOT NULL,
    transaction_id  TEXT NOT NULL,
    taxpayer_token  TEXT,            -- NULL until verified
    is_verified     INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    CHECK (is_verified = 0 OR taxpayer_token IS NOT NULL)
);

-- Raw upstream payloads; one row per composite key.
CREATE TABLE IF NOT EXISTS cached_responses (
    owner_id     TEXT    NOT NULL,
    gstin        TEXT    NOT NULL,
    return_type  TEXT    NOT NULL,   -- 'GSTR1' | 'GSTR3B' | 'GSTR2B' | 'GSTR2A' | 'DETAILS'
    section      TEXT    NOT NULL DEFAULT '',
    year         INTEGER NOT NULL,
    month        INTEGER NOT NULL,
    raw_json     TEXT    NOT NULL,
    fetched_at   TEXT    NOT NULL,
    UNIQUE (owner_id, gstin, return_type, section, year, month)
);

-- Reports are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS reports (
    report_id    TEXT PRIMARY KEY,
    owner_id     TEXT NOT NULL,
    gstin        TEXT NOT NULL,
    report_type  TEXT NOT NULL,
    period_json  TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sessions_owner_gstin_idx ON taxpayer_sessions(owner_id, gstin, is_verified);
CREATE INDEX IF NOT EXISTS sessions_expiry_idx      ON taxpayer_sessions(expires_at);
CREATE INDEX IF NOT EXISTS cache_gstin_idx          ON cached_responses(gstin, return_type, year, month);
CREATE INDEX IF NOT EXISTS cache_fetched_idx        ON cached_responses(fetched_at);
CREATE INDEX IF NOT EXISTS reports_owner_gstin_idx  ON reports(owner_id, gstin, created_at);

PRAGMA user_version = 1;
";
