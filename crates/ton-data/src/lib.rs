//! ton-data crate
//!
//! Account-history ingestion for TON DEX accounts: TonAPI paging, block
//! lookups, SQLite persistence and NDJSON import/export.

pub mod blocks;
pub mod ndjson;
pub mod store;
pub mod tonapi;
pub mod types;

pub use types::{AccountRef, BlockLocation, MessageLeg, RawTransaction};
