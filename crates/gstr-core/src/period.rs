//! Return periods and the descriptors that expand into them.
//!
//! Returns are filed monthly. A reconciliation run covers a month, an Indian
//! financial-year quarter, or a whole financial year (April to March).

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Period ──────────────────────────────────────────────────────────────────

/// A single calendar month. Ordering is chronological.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct Period {
  pub year:  i32,
  pub month: u32,
}

impl Period {
  pub fn new(year: i32, month: u32) -> Result<Self> {
    if !(1..=12).contains(&month) {
      return Err(Error::InvalidPeriod(format!("month {month} out of range")));
    }
    Ok(Self { year, month })
  }

  /// The period a date falls in.
  pub fn of(date: NaiveDate) -> Self {
    Self { year: date.year(), month: date.month() }
  }

  /// `YYYY-MM`, used as a stable map key in reports.
  pub fn key(&self) -> String { format!("{}-{:02}", self.year, self.month) }

  /// Human label, e.g. `Apr 2024`.
  pub fn label(&self) -> String {
    NaiveDate::from_ymd_opt(self.year, self.month, 1)
      .map(|d| d.format("%b %Y").to_string())
      .unwrap_or_else(|| self.key())
  }

  pub fn contains(&self, date: NaiveDate) -> bool { Self::of(date) == *self }

  /// The latest period whose returns are expected to be filed by `today`.
  ///
  /// Early in a month (days 1 to 10) the previous month's returns are not due
  /// yet, so the cutoff steps back further.
  pub fn filing_cutoff(today: NaiveDate) -> Self {
    let first = today.with_day(1).unwrap_or(today);
    let back = if today.day() <= 10 { 45 } else { 15 };
    Self::of(first - Duration::days(back))
  }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}-{}", self.month, self.year)
  }
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// Financial-year quarter. `Q1` is April to June.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quarter {
  Q1,
  Q2,
  Q3,
  Q4,
}

impl Quarter {
  pub fn from_number(n: u32) -> Result<Self> {
    match n {
      1 => Ok(Self::Q1),
      2 => Ok(Self::Q2),
      3 => Ok(Self::Q3),
      4 => Ok(Self::Q4),
      other => Err(Error::InvalidPeriod(format!("quarter {other}"))),
    }
  }

  fn months(self) -> [u32; 3] {
    match self {
      Self::Q1 => [4, 5, 6],
      Self::Q2 => [7, 8, 9],
      Self::Q3 => [10, 11, 12],
      Self::Q4 => [1, 2, 3],
    }
  }
}

/// What the consultant asked to reconcile. `fy` is the calendar year in
/// which the financial year starts (`2024` means April 2024 to March 2025).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodDescriptor {
  Monthly { fy: i32, month: u32 },
  Quarterly { fy: i32, quarter: Quarter },
  FinancialYear { fy: i32 },
}

impl PeriodDescriptor {
  /// Expand into chronologically ordered months.
  pub fn periods(&self) -> Result<Vec<Period>> {
    let in_fy = |fy: i32, m: u32| Period::new(if m >= 4 { fy } else { fy + 1 }, m);
    match *self {
      Self::Monthly { fy, month } => Ok(vec![in_fy(fy, month)?]),
      Self::Quarterly { fy, quarter } => {
        quarter.months().into_iter().map(|m| in_fy(fy, m)).collect()
      }
      Self::FinancialYear { fy } => (4..=12)
        .chain(1..=3)
        .map(|m| in_fy(fy, m))
        .collect(),
    }
  }

  /// Like [`periods`](Self::periods), minus months not yet due on `today`.
  pub fn due_periods(&self, today: NaiveDate) -> Result<Vec<Period>> {
    let cutoff = Period::filing_cutoff(today);
    let mut periods = self.periods()?;
    periods.retain(|p| *p <= cutoff);
    Ok(periods)
  }
}

impl fmt::Display for PeriodDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Monthly { fy, month } => {
        write!(f, "FY {fy}-{:02} month {month:02}", (fy + 1) % 100)
      }
      Self::Quarterly { fy, quarter } => {
        write!(f, "FY {fy}-{:02} {quarter:?}", (fy + 1) % 100)
      }
      Self::FinancialYear { fy } => write!(f, "FY {fy}-{:02}", (fy + 1) % 100),
    }
  }
}
