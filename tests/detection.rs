//! Ordering and MEV detection over correlated STON.fi swaps.

mod common;

use common::stonfi_ok;
use ton_analysis::{build_index, build_report, AnalysisConfig, MevKind, Scope};
use ton_bundle::{build_records, VenueConfig};
use ton_data::blocks::{parse_block_str, BlockCache};
use ton_data::RawTransaction;

/// Four swaps: two TON->USDT at 650 then 700, then USDT->TON at 1/800 and 1/1000.
fn history() -> Vec<RawTransaction> {
    let mut txs = Vec::new();
    txs.extend(stonfi_ok(1, 1_000, true, "1000000000", "650000000000"));
    txs.extend(stonfi_ok(2, 1_010, true, "1000000000", "700000000000"));
    txs.extend(stonfi_ok(3, 1_020, false, "800000000000", "1000000000"));
    txs.extend(stonfi_ok(4, 1_030, false, "1000000000000", "1000000000"));
    txs
}

fn blocks() -> BlockCache {
    let mut cache = BlockCache::new();
    for (qid, seqno) in [(1, 100), (2, 100), (3, 101), (4, 103)] {
        cache.insert(
            &format!("stonfi-notify-{qid}"),
            parse_block_str(&format!("(0,8000000000000000,{seqno})")),
        );
    }
    cache
}

#[test]
fn global_scan_finds_frontrun_then_backrun() {
    let venue = VenueConfig::stonfi();
    let (records, _) = build_records(&history(), &venue);
    let index = build_index(records, &venue, None);

    let order: Vec<&str> = index.swaps.iter().map(|s| s.query_id()).collect();
    assert_eq!(order, vec!["1", "2", "3", "4"]);

    let detection = ton_analysis::detector::detect(&index, None);
    let pairs: Vec<(usize, usize, MevKind)> = detection
        .global
        .iter()
        .map(|p| (p.leading, p.following, p.kind))
        .collect();
    assert_eq!(
        pairs,
        vec![(0, 1, MevKind::Frontrun), (1, 2, MevKind::Backrun)]
    );
    assert!(detection.same_block.is_empty());
    assert!(detection.cross_block.is_empty());
}

#[test]
fn block_scans_respect_block_boundaries() {
    let venue = VenueConfig::stonfi();
    let (records, filter) = build_records(&history(), &venue);
    let cache = blocks();
    let index = build_index(records, &venue, Some(&cache));

    assert_eq!(index.placed(), 4);
    assert_eq!(index.by_block.len(), 3);

    let config = AnalysisConfig {
        cross_block: true,
        ..Default::default()
    };
    let (detection, report) = build_report(&index, &venue, filter, &config, true);

    assert_eq!(detection.count(MevKind::Frontrun, Scope::SameBlock), 1);
    assert_eq!(detection.count(MevKind::Backrun, Scope::CrossBlock), 1);
    assert_eq!(detection.count(MevKind::Frontrun, Scope::CrossBlock), 0);

    let cross: Vec<_> = report.pairs_of(MevKind::Backrun, Scope::CrossBlock).collect();
    assert_eq!(cross.len(), 1);
    assert_eq!(cross[0].leading.query_id, "2");
    assert_eq!(cross[0].following.query_id, "3");
    assert_eq!(cross[0].seqno_gap, Some(1));
    assert_eq!(report.placed, Some(4));
    assert_eq!(report.pairs.len(), 4);
}

#[test]
fn cross_block_scan_needs_resolved_blocks() {
    let venue = VenueConfig::stonfi();
    let (records, filter) = build_records(&history(), &venue);
    let index = build_index(records, &venue, None);

    let config = AnalysisConfig {
        cross_block: true,
        block_gap: 5,
        ..Default::default()
    };
    let (detection, report) = build_report(&index, &venue, filter, &config, false);

    assert!(!report.cross_block_enabled);
    assert_eq!(report.placed, None);
    assert_eq!(report.blocks, 0);
    assert!(detection.cross_block.is_empty());
    assert_eq!(report.pairs.len(), 2);
}

#[test]
fn wider_block_gap_reaches_further() {
    let venue = VenueConfig::stonfi();
    let mut txs = stonfi_ok(1, 1_000, true, "1000000000", "650000000000");
    txs.extend(stonfi_ok(2, 1_010, true, "1000000000", "700000000000"));
    let (records, _) = build_records(&txs, &venue);

    let mut cache = BlockCache::new();
    cache.insert("stonfi-notify-1", parse_block_str("(0,8000000000000000,10)"));
    cache.insert("stonfi-notify-2", parse_block_str("(0,8000000000000000,13)"));
    let index = build_index(records, &venue, Some(&cache));

    let near = ton_analysis::detector::scan_cross_block(&index, 2);
    let far = ton_analysis::detector::scan_cross_block(&index, 3);
    assert!(near.is_empty());
    assert_eq!(far.len(), 1);
    assert_eq!(far[0].kind, MevKind::Frontrun);
}
