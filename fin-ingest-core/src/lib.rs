//! fin-ingest core: SQL merge engine, bulk loader, resilient API client.
//!
//! This crate contains the parts of the ingestion system that must stay
//! correct under repeated, overlapping or retried runs:
//! - Typed SQL values rendered into statements with ordered bound parameters
//! - Staging tables and paged bulk loading
//! - Set-based `MERGE` and single-row `INSERT ... ON CONFLICT` with
//!   distinct-from guards and returning-with-fallback
//! - An authenticated API client with one-shot token recovery
//! - Store helpers for assets, trades and accounts

pub mod api;
pub mod sql;
pub mod store;
