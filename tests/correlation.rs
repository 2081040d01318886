//! Correlation and filtering across whole account histories.

mod common;

use common::{dedust_swap, leg, stonfi_ok, stonfi_swap, tonco_swap, tx};
use rust_decimal_macros::dec;
use serde_json::json;
use ton_bundle::venue::roles::{NOTIFY, PAY, SWAP, TRANSFER};
use ton_bundle::{build_records, Direction, VenueConfig};

#[test]
fn stonfi_history_yields_one_record_per_swap() {
    let venue = VenueConfig::stonfi();
    let mut txs = stonfi_ok(11, 1_000, true, "1000000000", "650000000000");
    txs.extend(stonfi_ok(12, 1_010, false, "800000000000", "1000000000"));

    let (records, report) = build_records(&txs, &venue);

    assert_eq!(report.bundles, 2);
    assert_eq!(report.kept, 2);
    assert_eq!(report.dropped_total(), 0);

    let first = &records[0];
    assert_eq!(first.query_id(), "11");
    assert_eq!(first.direction, Direction::AToB);
    assert_eq!(first.direction_label, "TON->USDT");
    assert_eq!(first.rate, dec!(650));
    assert_eq!(first.rate.to_string(), "650.000000000000000000");
    for role in [NOTIFY, SWAP, PAY, TRANSFER] {
        assert!(first.bundle.has(role), "missing {role}");
    }

    let second = &records[1];
    assert_eq!(second.direction, Direction::BToA);
    assert_eq!(second.rate, dec!(0.00125));
}

#[test]
fn input_order_does_not_change_the_records() {
    let venue = VenueConfig::stonfi();
    let mut txs = Vec::new();
    for (qid, lt) in [(1_u64, 100_u64), (2, 200), (3, 300)] {
        txs.extend(stonfi_ok(qid, lt, qid % 2 == 1, "1000000000", "650000000000"));
    }
    let mut reversed = txs.clone();
    reversed.reverse();

    let summary = |input: &[ton_data::RawTransaction]| {
        let (records, _) = build_records(input, &venue);
        records
            .iter()
            .map(|r| (r.query_id().to_string(), r.direction, r.rate, r.tx_hash.clone()))
            .collect::<Vec<_>>()
    };

    let forward = summary(&txs);
    // Opposite-direction fixtures fall outside the USDT->TON range.
    assert_eq!(forward.len(), 2);
    assert_eq!(forward, summary(&reversed));
}

#[test]
fn refunds_and_noise_are_accounted_for() {
    let venue = VenueConfig::stonfi();
    let mut txs = stonfi_ok(1, 100, true, "1000000000", "650000000000");
    txs.extend(stonfi_swap(2, 200, true, "1000000000", "650000000000", 1));
    txs.push(tx(
        "unrelated",
        300,
        Some(leg("0xdeadbeef", 299, json!({"query_id": 3}))),
        Vec::new(),
    ));
    txs.push(tx(
        "keyless",
        400,
        Some(leg("0x7362d09c", 399, json!({"query_id": 0, "amount": "5"}))),
        Vec::new(),
    ));

    let (records, report) = build_records(&txs, &venue);

    assert_eq!(records.len(), 1);
    assert_eq!(report.dropped.get("refunded"), Some(&1));
    assert_eq!(report.bundles, 2);
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].query_id, "2");
}

#[test]
fn dedust_direction_follows_the_route() {
    let venue = VenueConfig::dedust();
    let txs = vec![
        dedust_swap(1, 500, true, "1000000000", "3000000"),
        dedust_swap(2, 510, false, "3000000", "1000000000"),
    ];

    let (records, report) = build_records(&txs, &venue);

    assert_eq!(report.kept, 2);
    assert_eq!(records[0].direction, Direction::AToB);
    assert_eq!(records[0].rate, dec!(0.003));
    assert_eq!(records[1].direction, Direction::BToA);
    assert_eq!(records[1].out_amount, dec!(1000000000));
}

#[test]
fn tonco_output_comes_from_the_coin_pair() {
    let venue = VenueConfig::tonco();
    let txs = vec![
        tonco_swap(7, 900, false, "3000000", "1000000000"),
        tonco_swap(8, 910, true, "1000000000", "3100000"),
    ];

    let (records, _) = build_records(&txs, &venue);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].direction, Direction::BToA);
    assert_eq!(records[0].out_amount, dec!(1000000000));
    assert_eq!(records[1].direction, Direction::AToB);
    assert_eq!(records[1].out_amount, dec!(3100000));
}

#[test]
fn dust_rates_are_counted_as_unresolved() {
    let venue = VenueConfig::dedust();
    let txs = vec![
        dedust_swap(1, 500, true, "1000000000", "3000000"),
        dedust_swap(2, 510, true, "10000000000000000000000000", "1"),
    ];

    let (records, report) = build_records(&txs, &venue);

    assert_eq!(report.kept, 1);
    assert_eq!(report.dropped.get("rate_unresolved"), Some(&1));
    let index = ton_analysis::build_index(records, &venue, None);
    assert_eq!(index.len(), report.kept);
}
