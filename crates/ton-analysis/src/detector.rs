//! Frontrun / backrun candidate detection.
//!
//! Heuristic scans over adjacent pairs of pre-sorted swaps. Candidates are
//! patterns worth a manual look, not proven MEV: the detector sees neither
//! senders nor pool state.
//!
//! All comparisons use the scaled rate (`rate1000`), which puts both
//! directions on one axis.

use serde::Serialize;
use ton_bundle::Direction;

use crate::ordering::{OrderedSwap, SwapIndex};

/// Candidate pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MevKind {
    Frontrun,
    Backrun,
}

/// Granularity of the scan that produced a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Adjacent in the global order, ignoring blocks.
    Global,
    /// Adjacent within one block.
    SameBlock,
    /// Adjacent across nearby blocks of one shard.
    CrossBlock,
}

/// Two adjacent swaps flagged by a scan; indices point into `SwapIndex::swaps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MevPair {
    pub leading: usize,
    pub following: usize,
    pub kind: MevKind,
    pub scope: Scope,
}

/// Same direction, and the later trade got a worse rate.
pub fn is_frontrun(first: &OrderedSwap, second: &OrderedSwap) -> bool {
    let direction = first.record.direction;
    if direction != second.record.direction {
        return false;
    }
    match direction {
        Direction::AToB => second.rate1000 < first.rate1000,
        Direction::BToA => second.rate1000 > first.rate1000,
        Direction::Unknown => false,
    }
}

/// Opposite directions, and the later trade profits from the earlier move.
pub fn is_backrun(first: &OrderedSwap, second: &OrderedSwap) -> bool {
    match (first.record.direction, second.record.direction) {
        (Direction::BToA, Direction::AToB) => second.rate1000 > first.rate1000,
        (Direction::AToB, Direction::BToA) => second.rate1000 < first.rate1000,
        _ => false,
    }
}

/// Pattern of an adjacent pair, if any. The two patterns are exclusive.
pub fn classify(first: &OrderedSwap, second: &OrderedSwap) -> Option<MevKind> {
    if is_frontrun(first, second) {
        Some(MevKind::Frontrun)
    } else if is_backrun(first, second) {
        Some(MevKind::Backrun)
    } else {
        None
    }
}

fn scan_positions(swaps: &[OrderedSwap], positions: &[usize], scope: Scope) -> Vec<MevPair> {
    positions
        .windows(2)
        .filter_map(|pair| {
            let (leading, following) = (pair[0], pair[1]);
            let kind = classify(swaps.get(leading)?, swaps.get(following)?)?;
            Some(MevPair {
                leading,
                following,
                kind,
                scope,
            })
        })
        .collect()
}

/// Adjacent pairs of the global order.
pub fn scan_global(index: &SwapIndex) -> Vec<MevPair> {
    let positions: Vec<usize> = (0..index.swaps.len()).collect();
    scan_positions(&index.swaps, &positions, Scope::Global)
}

/// Adjacent pairs inside each block.
pub fn scan_same_block(index: &SwapIndex) -> Vec<MevPair> {
    index
        .by_block
        .values()
        .flat_map(|positions| scan_positions(&index.swaps, positions, Scope::SameBlock))
        .collect()
}

/// Adjacent pairs on one shard whose blocks are `1..=block_gap` apart.
///
/// Pairs inside one block are left to [`scan_same_block`].
pub fn scan_cross_block(index: &SwapIndex, block_gap: u64) -> Vec<MevPair> {
    let mut pairs = Vec::new();
    for positions in index.by_shard.values() {
        for window in positions.windows(2) {
            let (leading, following) = (window[0], window[1]);
            let (Some(first), Some(second)) = (index.swaps.get(leading), index.swaps.get(following))
            else {
                continue;
            };
            let (Some(a), Some(b)) = (&first.block, &second.block) else {
                continue;
            };
            let gap = b.seqno.saturating_sub(a.seqno);
            if gap == 0 || gap > block_gap {
                continue;
            }
            if let Some(kind) = classify(first, second) {
                pairs.push(MevPair {
                    leading,
                    following,
                    kind,
                    scope: Scope::CrossBlock,
                });
            }
        }
    }
    pairs
}

/// Candidates of every scan, kept as separate overlapping lists.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Detection {
    pub global: Vec<MevPair>,
    pub same_block: Vec<MevPair>,
    pub cross_block: Vec<MevPair>,
}

impl Detection {
    pub fn all(&self) -> impl Iterator<Item = &MevPair> {
        self.global
            .iter()
            .chain(&self.same_block)
            .chain(&self.cross_block)
    }

    pub fn count(&self, kind: MevKind, scope: Scope) -> usize {
        self.all()
            .filter(|pair| pair.kind == kind && pair.scope == scope)
            .count()
    }
}

/// Runs the global and same-block scans, plus the cross-block scan when
/// `block_gap` is given.
pub fn detect(index: &SwapIndex, block_gap: Option<u64>) -> Detection {
    let detection = Detection {
        global: scan_global(index),
        same_block: scan_same_block(index),
        cross_block: block_gap
            .map(|gap| scan_cross_block(index, gap))
            .unwrap_or_default(),
    };
    tracing::info!(
        global = detection.global.len(),
        same_block = detection.same_block.len(),
        cross_block = detection.cross_block.len(),
        "mev candidates detected"
    );
    detection
}
