//! Ordering keys, block placement and the three scan indexes.
//!
//! Every record gets a `primary_lt` and a scaled rate. The global list is
//! sorted by `(primary_lt, utime, query_id)`; records with a known block are
//! also indexed per block and per shard.

use std::collections::{BTreeMap, BTreeSet};

use eyre::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use ton_bundle::resolver::scaled_rate;
use ton_bundle::{SwapRecord, VenueConfig};
use ton_data::blocks::BlockCache;
use ton_data::store::SwapRecordRow;
use ton_data::BlockLocation;

/// A swap record placed in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderedSwap {
    pub primary_lt: u64,
    pub rate1000: Decimal,
    pub block: Option<BlockLocation>,
    #[serde(flatten)]
    pub record: SwapRecord,
}

impl OrderedSwap {
    pub fn query_id(&self) -> &str {
        self.record.query_id()
    }

    pub fn block_key(&self) -> Option<String> {
        self.block.as_ref().map(BlockLocation::key)
    }

    /// Store row for this swap.
    ///
    /// # Errors
    /// Returns error if the record cannot be serialized.
    pub fn to_row(&self) -> Result<SwapRecordRow> {
        let body = serde_json::to_string(self)
            .wrap_err_with(|| format!("failed to serialize swap {}", self.query_id()))?;
        let direction = serde_json::to_value(self.record.direction)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Ok((
            self.record.venue.clone(),
            self.query_id().to_string(),
            direction,
            self.primary_lt,
            self.record.utime,
            body,
        ))
    }
}

/// Ordering key: the initiating leg's creation lt, else the smallest non-zero
/// creation lt of the other legs, else the anchor lt.
pub fn primary_lt(record: &SwapRecord, venue: &VenueConfig) -> u64 {
    let bundle = &record.bundle;
    let initiating = bundle
        .leg(venue.initiating_role)
        .and_then(|leg| leg.leg.created_lt)
        .filter(|lt| *lt > 0);

    initiating
        .or_else(|| {
            bundle
                .legs
                .values()
                .filter_map(|leg| leg.leg.created_lt)
                .filter(|lt| *lt > 0)
                .min()
        })
        .unwrap_or(record.lt)
}

/// Distinct transaction hashes to look blocks up for, in record order.
pub fn lookup_hashes(records: &[SwapRecord]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .map(|record| record.tx_hash.as_str())
        .filter(|hash| !hash.is_empty() && seen.insert(*hash))
        .collect()
}

/// The derived indexes over one run's swaps.
#[derive(Clone, Debug, Default)]
pub struct SwapIndex {
    /// All swaps by `(primary_lt, utime, query_id)`.
    pub swaps: Vec<OrderedSwap>,
    /// Block key → positions in `swaps`, by `primary_lt`.
    pub by_block: BTreeMap<String, Vec<usize>>,
    /// `(workchain, shard)` → positions in `swaps`, by `(seqno, primary_lt)`.
    pub by_shard: BTreeMap<(i32, String), Vec<usize>>,
}

impl SwapIndex {
    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    /// Number of swaps placed in a block.
    pub fn placed(&self) -> usize {
        self.swaps.iter().filter(|swap| swap.block.is_some()).count()
    }
}

/// Orders `records` and builds the block indexes.
///
/// Blocks are read from `blocks` by each record's anchor transaction hash;
/// records without a cached location only appear in the global list.
pub fn build_index(
    records: Vec<SwapRecord>,
    venue: &VenueConfig,
    blocks: Option<&BlockCache>,
) -> SwapIndex {
    let mut swaps: Vec<OrderedSwap> = records
        .into_iter()
        .filter_map(|record| {
            let Some(rate1000) = scaled_rate(record.direction, record.rate, venue.rate_scale)
            else {
                tracing::debug!(query_id = %record.query_id(), "rate cannot be scaled");
                return None;
            };
            let block = blocks
                .and_then(|cache| cache.get(&record.tx_hash))
                .flatten()
                .cloned();
            Some(OrderedSwap {
                primary_lt: primary_lt(&record, venue),
                rate1000,
                block,
                record,
            })
        })
        .collect();

    swaps.sort_by(|a, b| {
        (a.primary_lt, a.record.utime, a.query_id()).cmp(&(
            b.primary_lt,
            b.record.utime,
            b.query_id(),
        ))
    });

    let mut by_block: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut by_shard: BTreeMap<(i32, String), Vec<usize>> = BTreeMap::new();
    for (idx, swap) in swaps.iter().enumerate() {
        if let Some(block) = &swap.block {
            by_block.entry(block.key()).or_default().push(idx);
            by_shard.entry(block.shard_key()).or_default().push(idx);
        }
    }
    for positions in by_shard.values_mut() {
        positions.sort_by_key(|idx| {
            let swap = &swaps[*idx];
            (swap.block.as_ref().map_or(0, |b| b.seqno), swap.primary_lt, *idx)
        });
    }

    let index = SwapIndex {
        swaps,
        by_block,
        by_shard,
    };
    tracing::info!(
        swaps = index.len(),
        placed = index.placed(),
        blocks = index.by_block.len(),
        shards = index.by_shard.len(),
        "swaps indexed"
    );
    index
}
