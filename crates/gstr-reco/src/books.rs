//! Uploaded bookkeeping rows: parsing, classification, normalisation.
//!
//! The file format is the uploader's concern. What reaches this module is a
//! [`BooksTable`] of header names and string cells.

use chrono::NaiveDate;
use gstr_core::{Error, Period, Result, gstin};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::{
  SupplyCategory, TaxAmounts,
  extract::{
    EXPORT_WITH_PAYMENT, EXPORT_WITHOUT_PAYMENT, OutwardSection, parse_date,
    rate_key,
  },
  matching::{DocKind, InvoiceRecord},
};

/// Plain sales above this taxable value with IGST go to B2CL.
pub const LARGE_B2C_THRESHOLD: f64 = 250_000.0;

/// Statutory rate brackets, in percent.
pub const STANDARD_RATES: [f64; 10] =
  [0.0, 0.1, 0.25, 1.0, 1.5, 3.0, 5.0, 12.0, 18.0, 28.0];

// ─── Table ───────────────────────────────────────────────────────────────────

/// Raw uploaded rows. Row numbers in errors are 1-based data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooksTable {
  pub headers: Vec<String>,
  pub rows:    Vec<Vec<String>>,
}

fn normalise_header(name: &str) -> String {
  name.trim().to_lowercase().replace('_', " ")
}

impl BooksTable {
  pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
    Self { headers, rows }
  }

  /// Index of the first header matching any of `names`.
  fn column(&self, names: &[&str]) -> Option<usize> {
    let wanted: Vec<String> = names.iter().map(|n| normalise_header(n)).collect();
    self
      .headers
      .iter()
      .position(|h| wanted.contains(&normalise_header(h)))
  }

  fn require(&self, name: &str) -> Result<usize> {
    self
      .column(&[name])
      .ok_or_else(|| Error::validation(0, name, "required column is missing"))
  }

  /// Data rows with at least one non-blank cell, numbered from 1.
  fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
    self
      .rows
      .iter()
      .enumerate()
      .map(|(i, r)| (i + 1, r.as_slice()))
      .filter(|(_, r)| r.iter().any(|c| !c.trim().is_empty()))
  }
}

/// A row's view of the table's columns.
struct Cells<'a> {
  table: &'a BooksTable,
  row:   usize,
  cells: &'a [String],
}

impl<'a> Cells<'a> {
  fn raw(&self, column: Option<usize>) -> &'a str {
    column
      .and_then(|i| self.cells.get(i))
      .map(|c| c.trim())
      .unwrap_or("")
  }

  fn text(&self, names: &[&str]) -> String {
    self.raw(self.table.column(names)).to_owned()
  }

  fn number(&self, names: &[&str]) -> Result<f64> {
    let raw = self.raw(self.table.column(names)).replace(',', "");
    if raw.is_empty() {
      return Ok(0.0);
    }
    raw.parse::<f64>().map_err(|_| {
      Error::validation(self.row, names[0], format!("not a number: {raw:?}"))
    })
  }

  fn date(&self, column: usize) -> Result<Option<NaiveDate>> {
    let raw = self.raw(Some(column));
    if raw.is_empty() {
      return Ok(None);
    }
    parse_date(raw).map(Some).ok_or_else(|| {
      Error::validation(self.row, "Date", format!("not a date: {raw:?}"))
    })
  }
}

// ─── Sales books ─────────────────────────────────────────────────────────────

/// One outward-supply row as uploaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesRow {
  pub date:           NaiveDate,
  pub gstin:          String,
  pub taxable:        f64,
  pub export_taxable: f64,
  pub sez_taxable:    f64,
  pub nil_rated:      f64,
  pub exempt:         f64,
  pub non_gst:        f64,
  pub igst:           f64,
  pub cgst:           f64,
  pub sgst:           f64,
  pub cess:           f64,
  /// Declared rate in percent; `0` when not given.
  pub rate:           f64,
  pub is_rcm:         bool,
}

impl SalesRow {
  pub fn tax(&self) -> f64 { self.igst + self.cgst + self.sgst }

  /// Sum of every taxable-value column.
  pub fn taxable_total(&self) -> f64 {
    self.taxable
      + self.export_taxable
      + self.sez_taxable
      + self.nil_rated
      + self.exempt
      + self.non_gst
  }
}

fn parse_flag(raw: &str) -> bool {
  matches!(raw.trim().to_uppercase().as_str(), "Y" | "YES" | "TRUE" | "1")
}

/// Parse outward-supply books. `Date` is required on every row.
pub fn parse_sales(table: &BooksTable) -> Result<Vec<SalesRow>> {
  let date_col = table.require("Date")?;
  let mut out = Vec::new();
  for (row, cells) in table.data_rows() {
    let c = Cells { table, row, cells };
    let date = c
      .date(date_col)?
      .ok_or_else(|| Error::validation(row, "Date", "date is blank"))?;
    out.push(SalesRow {
      date,
      gstin: c.text(&["GSTIN", "GSTIN/UIN"]).to_uppercase(),
      taxable: c.number(&["Taxable"])?,
      export_taxable: c.number(&["Export_Taxable"])?,
      sez_taxable: c.number(&["SEZ_Taxable"])?,
      nil_rated: c.number(&["Nil_Rated"])?,
      exempt: c.number(&["Exempt"])?,
      non_gst: c.number(&["Non_GST"])?,
      igst: c.number(&["IGST"])?,
      cgst: c.number(&["CGST"])?,
      sgst: c.number(&["SGST"])?,
      cess: c.number(&["Cess"])?,
      rate: c.number(&["Rate"])?,
      is_rcm: parse_flag(&c.text(&["Is_RCM"])),
    });
  }
  debug!(rows = out.len(), "parsed sales books");
  Ok(out)
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Derived supply type of a sales row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
pub enum SupplyClass {
  #[strum(serialize = "RCM")]
  #[serde(rename = "RCM")]
  ReverseCharge,
  #[strum(serialize = "EXPWP")]
  #[serde(rename = "EXPWP")]
  ExportWithPayment,
  #[strum(serialize = "EXPWOP")]
  #[serde(rename = "EXPWOP")]
  ExportWithoutPayment,
  #[strum(serialize = "SEZWP")]
  #[serde(rename = "SEZWP")]
  SezWithPayment,
  #[strum(serialize = "SEZWOP")]
  #[serde(rename = "SEZWOP")]
  SezWithoutPayment,
  #[strum(serialize = "B2B")]
  #[serde(rename = "B2B")]
  B2b,
  #[strum(serialize = "NIL")]
  #[serde(rename = "NIL")]
  Nil,
  #[strum(serialize = "EXEMPT")]
  #[serde(rename = "EXEMPT")]
  Exempt,
  #[strum(serialize = "NON_GST")]
  #[serde(rename = "NON_GST")]
  NonGst,
  #[strum(serialize = "B2CL")]
  #[serde(rename = "B2CL")]
  B2cl,
  #[strum(serialize = "B2CS")]
  #[serde(rename = "B2CS")]
  B2cs,
}

impl SupplyClass {
  /// Tax-summary section the class reports under.
  pub fn summary_category(self) -> SupplyCategory {
    match self {
      Self::ReverseCharge => SupplyCategory::ReverseCharge,
      Self::ExportWithPayment
      | Self::ExportWithoutPayment
      | Self::SezWithPayment
      | Self::SezWithoutPayment => SupplyCategory::ZeroRated,
      Self::Nil | Self::Exempt => SupplyCategory::NilExempt,
      Self::NonGst => SupplyCategory::NonGst,
      Self::B2b | Self::B2cl | Self::B2cs => SupplyCategory::Domestic,
    }
  }

  /// Outward-return section the class reports under. Nil, exempt and
  /// non-GST supplies have no per-party section there.
  pub fn outward_section(self) -> Option<OutwardSection> {
    match self {
      Self::ReverseCharge => Some(OutwardSection::Cdnr),
      Self::ExportWithPayment | Self::ExportWithoutPayment => {
        Some(OutwardSection::Exp)
      }
      Self::SezWithPayment | Self::SezWithoutPayment => Some(OutwardSection::Sez),
      Self::B2b => Some(OutwardSection::B2b),
      Self::B2cl => Some(OutwardSection::B2cl),
      Self::B2cs => Some(OutwardSection::B2cs),
      Self::Nil | Self::Exempt | Self::NonGst => None,
    }
  }
}

/// Derive the supply class. Checks run in a fixed order and the first hit
/// wins: reverse charge, export, SEZ, registered buyer, nil, exempt,
/// non-GST, then plain sales split on `large_b2c_threshold`.
pub fn classify(row: &SalesRow, large_b2c_threshold: f64) -> SupplyClass {
  let taxed = row.tax() > 0.0;
  if row.is_rcm {
    SupplyClass::ReverseCharge
  } else if row.export_taxable > 0.0 {
    if taxed {
      SupplyClass::ExportWithPayment
    } else {
      SupplyClass::ExportWithoutPayment
    }
  } else if row.sez_taxable > 0.0 {
    if taxed {
      SupplyClass::SezWithPayment
    } else {
      SupplyClass::SezWithoutPayment
    }
  } else if gstin::is_valid(&row.gstin.trim().to_uppercase()) {
    SupplyClass::B2b
  } else if row.nil_rated != 0.0 {
    SupplyClass::Nil
  } else if row.exempt != 0.0 {
    SupplyClass::Exempt
  } else if row.non_gst != 0.0 {
    SupplyClass::NonGst
  } else if row.igst > 0.0 && row.taxable > large_b2c_threshold {
    SupplyClass::B2cl
  } else {
    SupplyClass::B2cs
  }
}

/// Nearest statutory bracket to `raw` percent. Ties go to the lower bracket.
pub fn snap_rate(raw: f64) -> f64 {
  STANDARD_RATES
    .iter()
    .copied()
    .fold(STANDARD_RATES[0], |best, r| {
      if (r - raw).abs() < (best - raw).abs() { r } else { best }
    })
}

/// A classified sales row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooksEntry {
  pub date:            NaiveDate,
  pub period:          Period,
  pub gstin:           String,
  pub class:           SupplyClass,
  /// Declared rate, or the back-computed bracket when none was declared.
  pub rate:            f64,
  /// Taxable value is the sum of every taxable column.
  pub amounts:         TaxAmounts,
  /// Taxable value attributed to the row's tax-summary section.
  pub section_taxable: f64,
}

impl BooksEntry {
  pub fn from_row(row: &SalesRow, large_b2c_threshold: f64) -> Self {
    let class = classify(row, large_b2c_threshold);
    let taxable_total = row.taxable_total();
    let rate = if row.rate == 0.0 && taxable_total > 0.0 && row.tax() > 0.0 {
      snap_rate(row.tax() / taxable_total * 100.0)
    } else {
      row.rate
    };
    let section_taxable = match class {
      SupplyClass::ReverseCharge => taxable_total,
      SupplyClass::ExportWithPayment | SupplyClass::ExportWithoutPayment => {
        row.export_taxable
      }
      SupplyClass::SezWithPayment | SupplyClass::SezWithoutPayment => {
        row.sez_taxable
      }
      SupplyClass::Nil | SupplyClass::Exempt => row.nil_rated + row.exempt,
      SupplyClass::NonGst => row.non_gst,
      SupplyClass::B2b | SupplyClass::B2cl | SupplyClass::B2cs => row.taxable,
    };
    Self {
      date: row.date,
      period: Period::of(row.date),
      gstin: row.gstin.trim().to_uppercase(),
      class,
      rate,
      amounts: TaxAmounts {
        taxable: taxable_total,
        igst:    row.igst,
        cgst:    row.cgst,
        sgst:    row.sgst,
        cess:    row.cess,
      },
      section_taxable,
    }
  }

  /// Grouping key within the outward-return section.
  pub fn outward_key(&self) -> String {
    match self.class {
      SupplyClass::B2cl | SupplyClass::B2cs => rate_key(self.rate),
      SupplyClass::ExportWithPayment => EXPORT_WITH_PAYMENT.to_owned(),
      SupplyClass::ExportWithoutPayment => EXPORT_WITHOUT_PAYMENT.to_owned(),
      _ => self.gstin.clone(),
    }
  }
}

/// Classify every row.
pub fn normalise(rows: &[SalesRow], large_b2c_threshold: f64) -> Vec<BooksEntry> {
  rows
    .iter()
    .map(|r| BooksEntry::from_row(r, large_b2c_threshold))
    .collect()
}

// ─── Purchase books ──────────────────────────────────────────────────────────

fn is_note_type(raw: &str) -> bool {
  let upper = raw.to_uppercase();
  ["CDNR", "CREDIT", "CR.", "DEBIT", "DR.", "NOTE"]
    .iter()
    .any(|m| upper.contains(m))
}

/// Spreadsheets turn numeric invoice numbers into floats.
fn clean_invoice(raw: &str) -> String {
  let raw = raw.trim();
  raw.strip_suffix(".0").unwrap_or(raw).to_owned()
}

/// Parse purchase books into invoice records. Blank dates are kept as
/// undated rows; unparseable ones are rejected.
pub fn parse_purchases(table: &BooksTable) -> Result<Vec<InvoiceRecord>> {
  let date_col = table.require("Date")?;
  let mut out = Vec::new();
  for (row, cells) in table.data_rows() {
    let c = Cells { table, row, cells };
    let kind = if is_note_type(&c.text(&["Type"])) {
      DocKind::Cdnr
    } else {
      DocKind::B2b
    };
    out.push(InvoiceRecord {
      gstin: c.text(&["GSTIN/UIN", "GSTIN"]).to_uppercase(),
      supplier: c.text(&["Supplier"]),
      invoice: clean_invoice(&c.text(&["Invoice"])),
      date: c.date(date_col)?,
      gross: c.number(&["Gross Amt"])?,
      amounts: TaxAmounts {
        taxable: c.number(&["Taxable"])?,
        igst:    c.number(&["IGST"])?,
        cgst:    c.number(&["CGST"])?,
        sgst:    c.number(&["SGST"])?,
        cess:    c.number(&["Cess"])?,
      },
      kind,
    });
  }
  debug!(rows = out.len(), "parsed purchase books");
  Ok(out)
}
