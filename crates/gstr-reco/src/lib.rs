//! Reconciliation algorithms for GST returns.
//!
//! Everything here is pure: payloads come in as `serde_json::Value`, uploaded
//! books as [`books::BooksTable`], and results go out as serialisable structs.
//! Fetching, caching and archiving live in `gstr-service`.
//!
//! - [`extract`] turns unwrapped upstream payloads into typed summaries.
//! - [`summary`], [`credit`] and [`comprehensive`] compare returns with each
//!   other per period.
//! - [`matching`] pairs invoice lists in two phases.
//! - [`books`] normalises uploaded bookkeeping rows; the `books_vs_*` modules
//!   compare them with the filed returns.

pub mod amounts;
pub mod books;
pub mod books_vs_credit;
pub mod books_vs_outward;
pub mod books_vs_summary;
pub mod comprehensive;
pub mod credit;
pub mod extract;
pub mod matching;
pub mod summary;
pub mod tolerance;

pub use amounts::{SupplyCategory, SupplySummary, TaxAmounts};
pub use tolerance::Tolerance;
