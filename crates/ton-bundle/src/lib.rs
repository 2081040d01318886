//! Swap bundle reconstruction for TON DEX venues.
//!
//! Raw account history goes in; validated swap records come out:
//! [`correlator::correlate`] joins legs by `query_id`, [`resolver`] derives
//! direction, amounts and rate, and [`filter::apply_filter`] drops anything
//! incomplete, refunded or implausible.

pub mod adapter;
pub mod correlator;
pub mod filter;
pub mod resolver;
pub mod venue;

pub use correlator::{BundleLeg, SwapBundle};
pub use filter::{Exclusion, FilterReport, SwapRecord};
pub use venue::{Direction, VenueConfig};

use ton_data::RawTransaction;

/// Correlates and filters `txs` in one pass.
pub fn build_records(
    txs: &[RawTransaction],
    venue: &VenueConfig,
) -> (Vec<SwapRecord>, FilterReport) {
    let bundles = correlator::correlate(txs, venue);
    filter::apply_filter(bundles, venue)
}
