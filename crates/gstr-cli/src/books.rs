//! Loading uploaded books from CSV files.

use std::{io::Read, path::Path};

use anyhow::{Context, Result};
use gstr_reco::books::BooksTable;

/// Read a CSV with a header row. Ragged rows are accepted; missing trailing
/// cells read as blank.
pub fn read_table(reader: impl Read) -> Result<BooksTable> {
  let mut csv = csv::ReaderBuilder::new()
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(reader);

  let headers = csv
    .headers()
    .context("reading header row")?
    .iter()
    .map(str::to_owned)
    .collect();
  let rows = csv
    .records()
    .enumerate()
    .map(|(i, record)| {
      record
        .with_context(|| format!("reading row {}", i + 1))
        .map(|r| r.iter().map(str::to_owned).collect())
    })
    .collect::<Result<_>>()?;
  Ok(BooksTable::new(headers, rows))
}

pub fn load(path: &Path) -> Result<BooksTable> {
  let file = std::fs::File::open(path)
    .with_context(|| format!("opening books file {}", path.display()))?;
  read_table(file).with_context(|| format!("parsing {}", path.display()))
}
