//! Services over the GST portal: credentials, OTP sessions, the response
//! cache, return fetching and reconciliation runs.
//!
//! Everything is generic over the storage traits in [`gstr_core::store`] and
//! the [`GstPortal`](gstr_core::portal::GstPortal) trait, so the same code runs
//! against SQLite and the HTTP client in production and against in-memory
//! stores and fakes in tests.

pub mod cache;
pub mod engine;
pub mod fetcher;
pub mod pool;
pub mod session;
pub mod settings;
pub mod token;

#[cfg(test)]
mod testing;

pub use cache::{FetchError, ResponseCache};
pub use engine::{ReconciliationEngine, RunReport, RunRequest};
pub use fetcher::{FetchContext, ReturnFetcher};
pub use session::SessionManager;
pub use settings::Settings;
pub use token::TokenProvider;
