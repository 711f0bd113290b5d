//! GSTIN, the 15-character taxpayer registration identifier.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A structurally valid GSTIN, stored trimmed and uppercased.
///
/// Layout: 2-digit state code, 5-letter + 4-digit + 1-letter PAN, entity
/// number (`1-9` or `A-Z`), the literal `Z`, and a check character.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Gstin(String);

impl Gstin {
  pub fn parse(raw: &str) -> Result<Self> {
    let normalized = raw.trim().to_ascii_uppercase();
    if is_valid(&normalized) {
      Ok(Self(normalized))
    } else {
      Err(Error::InvalidGstin(raw.to_owned()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The two-digit state code prefix.
  pub fn state_code(&self) -> &str { &self.0[..2] }
}

/// Check `s` against the GSTIN layout. Callers are expected to have trimmed
/// and uppercased the input already.
pub fn is_valid(s: &str) -> bool {
  let b = s.as_bytes();
  if b.len() != 15 {
    return false;
  }
  let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
  let letters =
    |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_uppercase);

  digits(0..2)
    && letters(2..7)
    && digits(7..11)
    && letters(11..12)
    && (matches!(b[12], b'1'..=b'9') || b[12].is_ascii_uppercase())
    && b[13] == b'Z'
    && (b[14].is_ascii_digit() || b[14].is_ascii_uppercase())
}

impl fmt::Display for Gstin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for Gstin {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for Gstin {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<Gstin> for String {
  fn from(g: Gstin) -> Self { g.0 }
}

impl AsRef<str> for Gstin {
  fn as_ref(&self) -> &str { &self.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_well_formed_gstin() {
    let g = Gstin::parse(" 27aapfu0939f1zv ").unwrap();
    assert_eq!(g.as_str(), "27AAPFU0939F1ZV");
    assert_eq!(g.state_code(), "27");
  }

  #[test]
  fn rejects_wrong_length_and_layout() {
    assert!(Gstin::parse("27AAPFU0939F1Z").is_err());
    assert!(Gstin::parse("27AAPFU0939F1XV").is_err());
    assert!(Gstin::parse("2AAAPFU0939F1ZV").is_err());
    assert!(Gstin::parse("27AAPFU0939F0ZV").is_err());
    assert!(Gstin::parse("").is_err());
  }

  #[test]
  fn serde_rejects_invalid() {
    let ok: Gstin = serde_json::from_str("\"29ABCDE1234F1Z5\"").unwrap();
    assert_eq!(ok.as_str(), "29ABCDE1234F1Z5");
    assert!(serde_json::from_str::<Gstin>("\"URP\"").is_err());
  }
}
