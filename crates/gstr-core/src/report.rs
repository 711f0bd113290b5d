//! Append-only audit records of reconciliation runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Gstin, PeriodDescriptor, cache::OwnerId};

/// Which comparison produced a report.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  AsRefStr,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
  /// Outward-supply return vs tax-summary return.
  Summary,
  /// Credit statement vs claimed credit.
  Credit,
  /// Summary and credit side by side, per period.
  Comprehensive,
  BooksVsOutward,
  BooksVsSummary,
  BooksVsCredit,
  /// Two uploaded invoice lists matched against each other.
  ManualCreditMatch,
}

/// Input to [`crate::store::ReportStore::append_report`]. `report_id` and
/// `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewReport {
  pub owner:       OwnerId,
  pub gstin:       Gstin,
  pub report_type: ReportType,
  pub period:      PeriodDescriptor,
  pub payload:     serde_json::Value,
}

/// A persisted report. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
  pub report_id:   Uuid,
  pub owner:       OwnerId,
  pub gstin:       Gstin,
  pub report_type: ReportType,
  pub period:      PeriodDescriptor,
  pub payload:     serde_json::Value,
  pub created_at:  DateTime<Utc>,
}
