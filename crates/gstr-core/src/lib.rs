//! Core types and trait definitions for GST return reconciliation.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; the storage backend, the upstream portal
//! client, and the reconciliation algorithms meet here only through types
//! and traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod error;
pub mod gstin;
pub mod payload;
pub mod period;
pub mod portal;
pub mod report;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use gstin::Gstin;
pub use period::{Period, PeriodDescriptor};
