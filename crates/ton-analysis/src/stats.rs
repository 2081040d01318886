//! Rate distributions, min-out coverage and block activity.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use ton_bundle::resolver::{field_value, parse_decimal};
use ton_bundle::VenueConfig;

use crate::ordering::{OrderedSwap, SwapIndex};

/// Distribution summary of a series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RateSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
    /// Sample standard deviation; 0 for fewer than two values.
    pub stdev: f64,
}

fn as_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Summarizes `values`; `None` when empty.
pub fn summarize<I>(values: I) -> Option<RateSummary>
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mid = count / 2;
    let median = if count % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let stdev = if count < 2 {
        0.0
    } else {
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    };

    Some(RateSummary {
        count,
        min: sorted[0],
        max: sorted[count - 1],
        median,
        mean,
        stdev,
    })
}

/// Scaled-rate summary over every swap.
pub fn rate_summary(swaps: &[OrderedSwap]) -> Option<RateSummary> {
    summarize(swaps.iter().map(|swap| as_f64(swap.rate1000)))
}

/// Scaled-rate summary per direction label.
pub fn rate_summary_by_direction(swaps: &[OrderedSwap]) -> BTreeMap<String, RateSummary> {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for swap in swaps {
        grouped
            .entry(swap.record.direction_label.clone())
            .or_default()
            .push(as_f64(swap.rate1000));
    }
    grouped
        .into_iter()
        .filter_map(|(label, values)| Some((label, summarize(values)?)))
        .collect()
}

/// A swap whose payout is compared to its declared minimum.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinOutHit {
    pub query_id: String,
    pub direction_label: String,
    pub lt: u64,
    pub min_out: Decimal,
    pub out_amount: Decimal,
    /// `min_out / out_amount * 100`.
    pub hit_pct: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MinOutCoverage {
    pub with_min_out: usize,
    pub missing_or_invalid: usize,
    pub hit_pct: Option<RateSummary>,
    /// Highest `hit_pct` first.
    pub closest: Vec<MinOutHit>,
}

/// Declared minimum output of a swap; the first present path decides.
pub fn extract_min_out(swap: &OrderedSwap, venue: &VenueConfig) -> Option<Decimal> {
    venue
        .min_out_fields
        .iter()
        .find_map(|field| field_value(&swap.record.bundle, field))
        .and_then(parse_decimal)
}

/// Compares each swap's declared minimum output with what it received.
pub fn min_out_coverage(
    swaps: &[OrderedSwap],
    venue: &VenueConfig,
    top_n: usize,
) -> MinOutCoverage {
    let mut coverage = MinOutCoverage::default();
    let mut hits = Vec::new();

    for swap in swaps {
        let out_amount = swap.record.out_amount;
        let hit = extract_min_out(swap, venue).and_then(|min_out| {
            if out_amount.is_zero() {
                return None;
            }
            let pct = min_out.checked_div(out_amount)?.checked_mul(Decimal::ONE_HUNDRED)?;
            Some(MinOutHit {
                query_id: swap.query_id().to_string(),
                direction_label: swap.record.direction_label.clone(),
                lt: swap.record.lt,
                min_out,
                out_amount,
                hit_pct: as_f64(pct),
            })
        });
        match hit {
            Some(hit) => hits.push(hit),
            None => coverage.missing_or_invalid += 1,
        }
    }

    coverage.with_min_out = hits.len();
    coverage.hit_pct = summarize(hits.iter().map(|hit| hit.hit_pct));
    hits.sort_by(|a, b| b.hit_pct.total_cmp(&a.hit_pct));
    hits.truncate(top_n);
    coverage.closest = hits;
    coverage
}

/// Swaps observed in one block.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockActivity {
    pub block: String,
    pub query_ids: Vec<String>,
    pub primary_lts: Vec<u64>,
    pub directions: Vec<String>,
}

/// Blocks holding more than one swap, by block key.
pub fn busy_blocks(index: &SwapIndex) -> Vec<BlockActivity> {
    index
        .by_block
        .iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|(block, positions)| {
            let swaps: Vec<&OrderedSwap> = positions
                .iter()
                .filter_map(|idx| index.swaps.get(*idx))
                .collect();
            BlockActivity {
                block: block.clone(),
                query_ids: swaps.iter().map(|s| s.query_id().to_string()).collect(),
                primary_lts: swaps.iter().map(|s| s.primary_lt).collect(),
                directions: swaps.iter().map(|s| s.record.direction_label.clone()).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use ton_bundle::venue::roles::{NOTIFY, SWAP};
    use ton_bundle::venue::Side;
    use ton_bundle::{BundleLeg, Direction, SwapBundle, SwapRecord};
    use ton_data::MessageLeg;

    fn swap(
        qid: &str,
        label: &str,
        rate1000: Decimal,
        out: Decimal,
        legs: Vec<(&'static str, serde_json::Value)>,
    ) -> OrderedSwap {
        let mut bundle = SwapBundle::new(qid);
        for (role, body) in legs {
            bundle.attach(
                role,
                BundleLeg {
                    tx_hash: String::new(),
                    tx_lt: 0,
                    tx_utime: 0,
                    side: Side::Out,
                    leg: MessageLeg {
                        decoded_body: Some(body),
                        ..Default::default()
                    },
                },
            );
        }
        OrderedSwap {
            primary_lt: 0,
            rate1000,
            block: None,
            record: SwapRecord {
                venue: "stonfi".to_string(),
                direction: Direction::AToB,
                direction_label: label.to_string(),
                lt: 0,
                utime: 0,
                tx_hash: String::new(),
                in_amount: dec!(1),
                out_amount: out,
                rate: dec!(1),
                bundle,
            },
        }
    }

    #[test]
    fn summary_statistics() {
        let summary = summarize([1.0, 2.0, 3.0, 4.0]).expect("non-empty");
        assert_eq!(summary.count, 4);
        assert_eq!((summary.min, summary.max), (1.0, 4.0));
        assert!((summary.median - 2.5).abs() < 1e-12);
        assert!((summary.mean - 2.5).abs() < 1e-12);
        assert!((summary.stdev - 1.290_994_448_735_805_6).abs() < 1e-9);

        let single = summarize([7.0]).expect("non-empty");
        assert_eq!(single.stdev, 0.0);
        assert_eq!(single.median, 7.0);

        assert!(summarize(Vec::<f64>::new()).is_none());
    }

    #[test]
    fn summaries_split_by_direction() {
        let swaps = vec![
            swap("1", "TON->USDT", dec!(1.5), dec!(1), vec![]),
            swap("2", "USDT->TON", dec!(1.6), dec!(1), vec![]),
            swap("3", "TON->USDT", dec!(1.7), dec!(1), vec![]),
        ];
        let by_direction = rate_summary_by_direction(&swaps);
        assert_eq!(by_direction["TON->USDT"].count, 2);
        assert_eq!(by_direction["USDT->TON"].count, 1);
        assert_eq!(rate_summary(&swaps).map(|s| s.count), Some(3));
    }

    #[test]
    fn min_out_coverage_ranks_closest_first() {
        let venue = VenueConfig::stonfi();
        let swaps = vec![
            swap(
                "1",
                "TON->USDT",
                dec!(1),
                dec!(1000),
                vec![(SWAP, json!({"dex_payload": {"swap_body": {"min_out": "900"}}}))],
            ),
            swap(
                "2",
                "TON->USDT",
                dec!(1),
                dec!(1000),
                vec![(
                    NOTIFY,
                    json!({"forward_payload": {"value": {"value": {
                        "cross_swap_body": {"min_out": 990}
                    }}}}),
                )],
            ),
            swap("3", "TON->USDT", dec!(1), dec!(1000), vec![]),
            swap(
                "4",
                "TON->USDT",
                dec!(1),
                dec!(1000),
                vec![(SWAP, json!({"dex_payload": {"swap_body": {"min_out": "bogus"}}}))],
            ),
        ];

        let coverage = min_out_coverage(&swaps, &venue, 1);
        assert_eq!(coverage.with_min_out, 2);
        assert_eq!(coverage.missing_or_invalid, 2);
        assert_eq!(coverage.closest.len(), 1);
        assert_eq!(coverage.closest[0].query_id, "2");
        assert!((coverage.closest[0].hit_pct - 99.0).abs() < 1e-9);
        assert_eq!(coverage.hit_pct.map(|s| s.count), Some(2));
    }

    #[test]
    fn busy_blocks_skip_single_swap_blocks() {
        let mut index = SwapIndex {
            swaps: vec![
                swap("1", "TON->USDT", dec!(1), dec!(1), vec![]),
                swap("2", "USDT->TON", dec!(1), dec!(1), vec![]),
                swap("3", "TON->USDT", dec!(1), dec!(1), vec![]),
            ],
            ..Default::default()
        };
        index.by_block.insert("0:8000000000000000:5".to_string(), vec![0, 1]);
        index.by_block.insert("0:8000000000000000:6".to_string(), vec![2]);

        let busy = busy_blocks(&index);
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].query_ids, vec!["1", "2"]);
        assert_eq!(busy[0].directions, vec!["TON->USDT", "USDT->TON"]);
    }
}
