//! Analysis report assembled from the index, the detector and the stats.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use ton_bundle::{FilterReport, VenueConfig};

use crate::detector::{detect, Detection, MevKind, MevPair, Scope};
use crate::ordering::{OrderedSwap, SwapIndex};
use crate::stats::{
    busy_blocks, min_out_coverage, rate_summary, rate_summary_by_direction, BlockActivity,
    MinOutCoverage, RateSummary,
};

/// Tuning of one analysis run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Largest seqno gap scanned across blocks.
    pub block_gap: u64,
    /// Run the cross-block scan.
    pub cross_block: bool,
    /// Entries kept in "closest to min_out".
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            block_gap: 1,
            cross_block: false,
            top_n: 5,
        }
    }
}

/// Printable view of a swap inside a pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwapRef {
    pub query_id: String,
    pub tx_hash: String,
    pub direction_label: String,
    pub primary_lt: u64,
    pub utime: u64,
    pub rate1000: Decimal,
    pub block: Option<String>,
}

impl From<&OrderedSwap> for SwapRef {
    fn from(swap: &OrderedSwap) -> Self {
        Self {
            query_id: swap.query_id().to_string(),
            tx_hash: swap.record.tx_hash.clone(),
            direction_label: swap.record.direction_label.clone(),
            primary_lt: swap.primary_lt,
            utime: swap.record.utime,
            rate1000: swap.rate1000,
            block: swap.block_key(),
        }
    }
}

/// A detected pair with both swaps resolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairView {
    pub kind: MevKind,
    pub scope: Scope,
    pub leading: SwapRef,
    pub following: SwapRef,
    /// Seconds between the two swaps.
    pub dt_secs: i64,
    /// Block distance, when both swaps are placed.
    pub seqno_gap: Option<u64>,
}

fn view(index: &SwapIndex, pair: &MevPair) -> Option<PairView> {
    let leading = index.swaps.get(pair.leading)?;
    let following = index.swaps.get(pair.following)?;
    let dt_secs = following.record.utime as i64 - leading.record.utime as i64;
    let seqno_gap = leading
        .block
        .as_ref()
        .zip(following.block.as_ref())
        .map(|(a, b)| b.seqno.saturating_sub(a.seqno));

    Some(PairView {
        kind: pair.kind,
        scope: pair.scope,
        leading: leading.into(),
        following: following.into(),
        dt_secs,
        seqno_gap,
    })
}

/// Everything one `analyze` run reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub venue: String,
    pub filter: FilterReport,
    pub swaps: usize,
    /// Swaps with a known block; `None` when blocks were not looked up.
    pub placed: Option<usize>,
    pub blocks: usize,
    pub overall: Option<RateSummary>,
    pub by_direction: BTreeMap<String, RateSummary>,
    pub min_out: MinOutCoverage,
    pub busy_blocks: Vec<BlockActivity>,
    pub cross_block_enabled: bool,
    pub block_gap: u64,
    pub pairs: Vec<PairView>,
}

impl AnalysisReport {
    /// Pairs of one kind and scope, in scan order.
    pub fn pairs_of(&self, kind: MevKind, scope: Scope) -> impl Iterator<Item = &PairView> {
        self.pairs
            .iter()
            .filter(move |pair| pair.kind == kind && pair.scope == scope)
    }
}

/// Runs detection and statistics over an index.
///
/// `blocks_resolved` tells whether block lookup ran; without it the block
/// scans are empty by construction and reported as skipped.
pub fn build_report(
    index: &SwapIndex,
    venue: &VenueConfig,
    filter: FilterReport,
    config: &AnalysisConfig,
    blocks_resolved: bool,
) -> (Detection, AnalysisReport) {
    let cross_block = config.cross_block && blocks_resolved;
    let detection = detect(index, cross_block.then_some(config.block_gap));
    let pairs = detection
        .all()
        .filter_map(|pair| view(index, pair))
        .collect();

    let report = AnalysisReport {
        venue: venue.name.to_string(),
        filter,
        swaps: index.len(),
        placed: blocks_resolved.then(|| index.placed()),
        blocks: index.by_block.len(),
        overall: rate_summary(&index.swaps),
        by_direction: rate_summary_by_direction(&index.swaps),
        min_out: min_out_coverage(&index.swaps, venue, config.top_n),
        busy_blocks: busy_blocks(index),
        cross_block_enabled: cross_block,
        block_gap: config.block_gap,
        pairs,
    };
    (detection, report)
}
