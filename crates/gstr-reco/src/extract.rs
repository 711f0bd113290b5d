//! Typed views over unwrapped upstream payloads.
//!
//! The portal is inconsistent about key names and nesting, so every reader
//! here is lenient: amounts may be numbers or numeric strings, alternative
//! keys are tried in order, and a missing value reads as zero. A reader
//! returns `None` only when the block it needs is absent altogether.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::{
  SupplySummary, TaxAmounts,
  matching::{DocKind, InvoiceRecord},
};

// ─── Lenient readers ─────────────────────────────────────────────────────────

/// A number or numeric string; anything else is zero.
pub fn amount(value: Option<&Value>) -> f64 {
  match value {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
    Some(Value::String(s)) => s.trim().replace(',', "").parse().unwrap_or(0.0),
    _ => 0.0,
  }
}

/// The first non-zero amount among `keys`.
fn first_amount(obj: &Value, keys: &[&str]) -> f64 {
  keys
    .iter()
    .map(|k| amount(obj.get(*k)))
    .find(|v| *v != 0.0)
    .unwrap_or(0.0)
}

/// The first of `keys` holding a non-empty object or array.
fn first_block<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
  keys.iter().filter_map(|k| obj.get(*k)).find(|v| match v {
    Value::Object(m) => !m.is_empty(),
    Value::Array(a) => !a.is_empty(),
    _ => false,
  })
}

fn text(obj: &Value, keys: &[&str]) -> String {
  keys
    .iter()
    .filter_map(|k| obj.get(*k))
    .find_map(|v| match v {
      Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    })
    .unwrap_or_default()
}

/// Arrays iterate their elements; objects iterate their values.
fn items(value: Option<&Value>) -> Vec<&Value> {
  match value {
    Some(Value::Array(a)) => a.iter().collect(),
    Some(Value::Object(m)) => m.values().collect(),
    _ => Vec::new(),
  }
}

/// Step into a leftover `data` object, if the payload still has one.
fn inner(value: &Value) -> &Value {
  match value.get("data") {
    Some(d @ Value::Object(_)) => d,
    _ => value,
  }
}

/// Read the five amount fields using the portal's short key names, falling
/// back to the long ones.
fn tax_amounts(obj: &Value) -> TaxAmounts {
  TaxAmounts {
    taxable: first_amount(obj, &["txval"]),
    igst:    first_amount(obj, &["iamt", "igst"]),
    cgst:    first_amount(obj, &["camt", "cgst"]),
    sgst:    first_amount(obj, &["samt", "sgst"]),
    cess:    first_amount(obj, &["csamt", "cess"]),
  }
}

/// Section amounts, either on the section itself or under `subtotal`.
fn section_amounts(sup_details: &Value, key: &str) -> TaxAmounts {
  match sup_details.get(key) {
    Some(section) => match section.get("subtotal") {
      Some(sub @ Value::Object(_)) => tax_amounts(sub),
      _ => tax_amounts(section),
    },
    None => TaxAmounts::default(),
  }
}

/// Dates as the portal and common spreadsheets write them.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  let day_part = raw.split(' ').next().unwrap_or(raw);
  // ISO timestamps: keep the date before the `T`.
  let day_part = match day_part.get(..10) {
    Some(date) if day_part.as_bytes().get(10) == Some(&b'T') => date,
    _ => day_part,
  };
  ["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d", "%d.%m.%Y", "%d-%b-%Y"]
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(day_part, fmt).ok())
}

/// Stable grouping key for a tax rate.
pub fn rate_key(rate: f64) -> String { format!("{rate:.2}") }

// ─── Tax-summary return ──────────────────────────────────────────────────────

/// Outward liability as computed by the portal from the outward-supply
/// return (the tax-summary auto-liability calculation).
pub fn outward_liability(payload: &Value) -> Option<SupplySummary> {
  let root = inner(payload);
  let sup = root
    .pointer("/liabitc/sup_details")
    .filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))
    .or_else(|| root.pointer("/r3bautopop/liabitc/sup_details"))
    .filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))?;

  Some(SupplySummary {
    domestic:       section_amounts(sup, "osup_3_1a"),
    zero_rated:     section_amounts(sup, "osup_3_1b"),
    nil_exempt:     section_amounts(sup, "osup_3_1c"),
    reverse_charge: if sup.get("osup_3_1d").is_some() {
      section_amounts(sup, "osup_3_1d")
    } else {
      section_amounts(sup, "isup_rev")
    },
    non_gst:        section_amounts(sup, "osup_3_1e"),
  })
}

/// Figures from a filed tax-summary return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FiledSummary {
  pub supplies:           SupplySummary,
  /// All eligible credit claimed, summed per head.
  pub itc_claimed:        TaxAmounts,
  /// The part of `itc_claimed` sourced from imports and reverse charge.
  pub itc_reverse_charge: TaxAmounts,
}

/// Credit rows whose source is never visible in the credit statement.
const REVERSE_CHARGE_ITC_TYPES: [&str; 3] = ["IMPG", "IMPS", "ISRC"];

pub fn filed_summary(payload: &Value) -> Option<FiledSummary> {
  let root = inner(payload);
  let sup = root
    .get("sup_details")
    .filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))?;

  let supplies = SupplySummary {
    domestic:       section_amounts(sup, "osup_det"),
    zero_rated:     section_amounts(sup, "osup_zero"),
    nil_exempt:     section_amounts(sup, "osup_nil_exmp"),
    reverse_charge: section_amounts(sup, "isup_rev"),
    non_gst:        section_amounts(sup, "osup_nongst"),
  };

  let mut itc_claimed = TaxAmounts::default();
  let mut itc_reverse_charge = TaxAmounts::default();
  for row in items(root.pointer("/itc_elg/itc_avl")) {
    let amounts = TaxAmounts { taxable: 0.0, ..tax_amounts(row) };
    itc_claimed += amounts;
    let ty = row.get("ty").and_then(Value::as_str).unwrap_or_default();
    if REVERSE_CHARGE_ITC_TYPES.contains(&ty) {
      itc_reverse_charge += amounts;
    }
  }

  Some(FiledSummary { supplies, itc_claimed, itc_reverse_charge })
}

// ─── Credit statement ────────────────────────────────────────────────────────

/// Credit available per the auto-populated credit statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditAvailable {
  /// Supplies not attracting reverse charge.
  pub non_reverse: TaxAmounts,
  /// Everything else the statement lists (ISD, imports, and so on).
  pub other:       TaxAmounts,
}

impl CreditAvailable {
  pub fn total(&self) -> TaxAmounts { self.non_reverse + self.other }
}

pub fn credit_available(payload: &Value) -> Option<CreditAvailable> {
  let root = inner(payload);
  let summary = first_block(root, &["itcsumm", "itc_summ"])?;
  let avl = summary.get("itcavl").unwrap_or(&Value::Null);
  let read = |keys: &[&str]| {
    first_block(avl, keys)
      .map(|b| TaxAmounts { taxable: 0.0, ..tax_amounts(b) })
      .unwrap_or_default()
  };
  Some(CreditAvailable {
    non_reverse: read(&["nonrevsup", "non_rev_sup"]),
    other:       read(&["othersup", "other_sup"]),
  })
}

/// Locate the document-level block of a credit statement.
fn docdata(payload: &Value) -> Option<&Value> {
  const SECTIONS: [&str; 4] = ["b2b", "b2ba", "cdnr", "cdnra"];
  let has_sections =
    |v: &Value| SECTIONS.iter().any(|k| v.get(*k).is_some());

  let root = inner(payload);
  if let Some(d) = first_block(payload, &["docdata"]) {
    return Some(d);
  }
  if let Some(d) = first_block(root, &["docdata"]) {
    return Some(d);
  }
  if has_sections(root) {
    return Some(root);
  }
  root
    .as_object()?
    .values()
    .find_map(|v| if has_sections(v) { Some(v) } else { first_block(v, &["docdata"]) })
}

/// Amounts on a document, or summed from its items when the document itself
/// carries no taxable value.
fn document_amounts(doc: &Value) -> TaxAmounts {
  let own = tax_amounts(doc);
  if own.taxable != 0.0 {
    return own;
  }
  let from_items: TaxAmounts = items(doc.get("itms"))
    .into_iter()
    .map(|itm| {
      let detail = first_block(itm, &["itms_det", "itm_det"]).unwrap_or(itm);
      tax_amounts(detail)
    })
    .sum();
  if from_items.is_zero() { own } else { from_items }
}

/// Invoice-level rows from a credit statement, invoices and notes alike.
pub fn credit_invoices(payload: &Value) -> Vec<InvoiceRecord> {
  let Some(doc) = docdata(payload) else {
    return Vec::new();
  };

  let mut out = Vec::new();
  for (section, docs_key, number_keys, kind) in [
    ("b2b", "inv", &["inum"][..], DocKind::B2b),
    ("b2ba", "inv", &["inum"][..], DocKind::B2b),
    ("cdnr", "nt", &["ntnum", "nt_num"][..], DocKind::Cdnr),
    ("cdnra", "nt", &["ntnum", "nt_num"][..], DocKind::Cdnr),
  ] {
    for supplier in items(doc.get(section)) {
      let gstin = text(supplier, &["ctin"]);
      let name = text(supplier, &["trdnm"]);
      for d in items(supplier.get(docs_key)) {
        out.push(InvoiceRecord {
          gstin:    gstin.clone(),
          supplier: name.clone(),
          invoice:  text(d, number_keys),
          date:     parse_date(&text(d, &["dt"])),
          gross:    amount(d.get("val")),
          amounts:  document_amounts(d),
          kind,
        });
      }
    }
  }
  out
}

// ─── Outward-supply return ───────────────────────────────────────────────────

/// The outward-return sections compared against books.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum OutwardSection {
  B2b,
  B2cl,
  B2cs,
  Exp,
  Sez,
  Cdnr,
}

impl OutwardSection {
  pub const ALL: [Self; 6] =
    [Self::B2b, Self::B2cl, Self::B2cs, Self::Exp, Self::Sez, Self::Cdnr];
}

/// Sections fetched upstream. SEZ invoices arrive inside `b2b`.
pub const OUTWARD_FETCH_SECTIONS: [&str; 5] = ["b2b", "b2cl", "b2cs", "exp", "cdnr"];

/// One grouped line of an outward-return section. `key` is the counterparty
/// GSTIN, a [`rate_key`], or the export payment type, depending on section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutwardLine {
  pub section: OutwardSection,
  pub key:     String,
  pub amounts: TaxAmounts,
}

/// Export payment types as the portal names them.
pub const EXPORT_WITH_PAYMENT: &str = "WPAY";
pub const EXPORT_WITHOUT_PAYMENT: &str = "WOPAY";

fn section_rows<'a>(payload: &'a Value, section: &str) -> Vec<&'a Value> {
  match payload {
    Value::Array(_) => items(Some(payload)),
    _ => {
      let root = inner(payload);
      items(root.get(section).or_else(|| payload.get(section)))
    }
  }
}

fn item_details(doc: &Value) -> Vec<&Value> {
  items(doc.get("itms"))
    .into_iter()
    .map(|itm| first_block(itm, &["itm_det"]).unwrap_or(itm))
    .collect()
}

/// Lines of one fetched outward-return section.
pub fn outward_lines(section: &str, payload: &Value) -> Vec<OutwardLine> {
  let rows = section_rows(payload, section);
  let mut out = Vec::new();
  match section {
    "b2b" => {
      for party in rows {
        let ctin = text(party, &["ctin"]).to_uppercase();
        for inv in items(party.get("inv")) {
          let kind = match text(inv, &["inv_typ"]).as_str() {
            "SEWP" | "SEWOP" => OutwardSection::Sez,
            _ => OutwardSection::B2b,
          };
          for det in item_details(inv) {
            out.push(OutwardLine {
              section: kind,
              key:     ctin.clone(),
              amounts: tax_amounts(det),
            });
          }
        }
      }
    }
    "b2cl" | "b2cs" => {
      let kind = if section == "b2cl" {
        OutwardSection::B2cl
      } else {
        OutwardSection::B2cs
      };
      for row in rows {
        let invoices = items(row.get("inv"));
        if invoices.is_empty() {
          out.push(OutwardLine {
            section: kind,
            key:     rate_key(amount(row.get("rt"))),
            amounts: tax_amounts(row),
          });
          continue;
        }
        for inv in invoices {
          for det in item_details(inv) {
            out.push(OutwardLine {
              section: kind,
              key:     rate_key(amount(det.get("rt"))),
              amounts: tax_amounts(det),
            });
          }
        }
      }
    }
    "exp" => {
      for group in rows {
        let key = match text(group, &["exp_typ"]).as_str() {
          EXPORT_WITH_PAYMENT => EXPORT_WITH_PAYMENT,
          _ => EXPORT_WITHOUT_PAYMENT,
        };
        for inv in items(group.get("inv")) {
          for det in item_details(inv) {
            out.push(OutwardLine {
              section: OutwardSection::Exp,
              key:     key.to_owned(),
              amounts: tax_amounts(det),
            });
          }
        }
      }
    }
    "cdnr" => {
      for party in rows {
        let ctin = text(party, &["ctin"]).to_uppercase();
        for note in items(party.get("nt")) {
          for det in item_details(note) {
            out.push(OutwardLine {
              section: OutwardSection::Cdnr,
              key:     ctin.clone(),
              amounts: -tax_amounts(det),
            });
          }
        }
      }
    }
    _ => {}
  }
  out
}
