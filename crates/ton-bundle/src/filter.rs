//! Validity filter: turns resolved bundles into swap records.
//!
//! Rules run in a fixed order and the first failing rule names the
//! [`Exclusion`]. Exclusions are counted, never raised.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use ton_data::types::value_as_u64;

use crate::correlator::{BundleLeg, SwapBundle};
use crate::resolver::{field_text, field_value, resolve, Resolution};
use crate::venue::{Direction, VenueConfig};

/// Dropped bundles kept as samples in a [`FilterReport`].
pub const DROPPED_SAMPLE_LIMIT: usize = 5;

/// Why a bundle was excluded.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exclusion {
    UnknownDirection,
    PoolMismatch,
    MissingAmount,
    ZeroAmount,
    Refunded { exit_code: Option<u64> },
    /// No rate, or one that rounds to zero and cannot be scaled.
    RateUnresolved,
    RateOutOfRange { rate: Decimal },
}

impl Exclusion {
    pub fn label(&self) -> &'static str {
        match self {
            Exclusion::UnknownDirection => "unknown_direction",
            Exclusion::PoolMismatch => "pool_mismatch",
            Exclusion::MissingAmount => "missing_amount",
            Exclusion::ZeroAmount => "zero_amount",
            Exclusion::Refunded { .. } => "refunded",
            Exclusion::RateUnresolved => "rate_unresolved",
            Exclusion::RateOutOfRange { .. } => "rate_out_of_range",
        }
    }
}

/// A bundle that passed every rule.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwapRecord {
    pub venue: String,
    pub direction: Direction,
    pub direction_label: String,
    /// Creation lt of the anchor leg.
    pub lt: u64,
    pub utime: u64,
    /// Transaction carrying the anchor leg; keys the block lookup.
    pub tx_hash: String,
    pub in_amount: Decimal,
    pub out_amount: Decimal,
    pub rate: Decimal,
    #[serde(flatten)]
    pub bundle: SwapBundle,
}

impl SwapRecord {
    pub fn query_id(&self) -> &str {
        &self.bundle.query_id
    }
}

/// A dropped bundle kept for inspection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DroppedSample {
    pub query_id: String,
    pub direction: Direction,
    pub exclusion: Exclusion,
    pub in_amount: Option<Decimal>,
    pub out_amount: Option<Decimal>,
    pub rate: Option<Decimal>,
}

/// Outcome counts of one filter run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FilterReport {
    pub venue: String,
    pub bundles: usize,
    pub kept: usize,
    pub dropped: BTreeMap<&'static str, usize>,
    pub samples: Vec<DroppedSample>,
}

impl FilterReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// The leg that anchors a bundle in time: the initiating role if present,
/// else the leg of the earliest transaction.
pub fn anchor_leg<'a>(bundle: &'a SwapBundle, venue: &VenueConfig) -> Option<&'a BundleLeg> {
    bundle
        .leg(venue.initiating_role)
        .or_else(|| {
            bundle
                .legs
                .values()
                .min_by(|a, b| (a.tx_lt, &a.tx_hash).cmp(&(b.tx_lt, &b.tx_hash)))
        })
}

fn pool_matches(bundle: &SwapBundle, venue: &VenueConfig) -> bool {
    let Some(guard) = &venue.pool_guard else {
        return true;
    };
    let (Some(first), Some(second)) = (
        field_text(bundle, &guard.first),
        field_text(bundle, &guard.second),
    ) else {
        return false;
    };
    let [x, y] = guard.tokens;
    let eq = |found: &str, expected: &str| found.eq_ignore_ascii_case(expected);
    (eq(&first, x) && eq(&second, y)) || (eq(&first, y) && eq(&second, x))
}

/// Checks one resolved bundle against the venue's rules.
///
/// # Errors
/// Returns the first rule the bundle fails.
pub fn validate(
    bundle: &SwapBundle,
    venue: &VenueConfig,
    resolution: &Resolution,
) -> Result<(), Exclusion> {
    if !resolution.direction.is_known() {
        return Err(Exclusion::UnknownDirection);
    }
    if !pool_matches(bundle, venue) {
        return Err(Exclusion::PoolMismatch);
    }

    let (Some(in_amount), Some(out_amount)) = (resolution.in_amount, resolution.out_amount) else {
        return Err(Exclusion::MissingAmount);
    };
    if in_amount.is_zero() || out_amount.is_zero() {
        return Err(Exclusion::ZeroAmount);
    }

    if let Some(rule) = &venue.exit_code {
        if bundle.has(rule.field.role) {
            let exit_code = field_value(bundle, &rule.field).and_then(value_as_u64);
            if exit_code != Some(rule.success) {
                return Err(Exclusion::Refunded { exit_code });
            }
        }
    }

    let Some(rate) = resolution.rate.filter(|rate| !rate.is_zero()) else {
        return Err(Exclusion::RateUnresolved);
    };
    let range = venue
        .rate_ranges
        .as_ref()
        .and_then(|ranges| ranges.for_direction(resolution.direction));
    if let Some(range) = range {
        if !range.contains(rate) {
            return Err(Exclusion::RateOutOfRange { rate });
        }
    }
    Ok(())
}

/// Resolves and validates every bundle, keeping the survivors as records.
pub fn apply_filter(
    bundles: BTreeMap<String, SwapBundle>,
    venue: &VenueConfig,
) -> (Vec<SwapRecord>, FilterReport) {
    let mut report = FilterReport {
        venue: venue.name.to_string(),
        bundles: bundles.len(),
        ..Default::default()
    };
    let mut records = Vec::new();

    for bundle in bundles.into_values() {
        let resolution = resolve(&bundle, venue);
        if let Err(exclusion) = validate(&bundle, venue, &resolution) {
            tracing::debug!(
                query_id = %bundle.query_id,
                reason = exclusion.label(),
                "bundle excluded"
            );
            *report.dropped.entry(exclusion.label()).or_default() += 1;
            if report.samples.len() < DROPPED_SAMPLE_LIMIT {
                report.samples.push(DroppedSample {
                    query_id: bundle.query_id.clone(),
                    direction: resolution.direction,
                    exclusion,
                    in_amount: resolution.in_amount,
                    out_amount: resolution.out_amount,
                    rate: resolution.rate,
                });
            }
            continue;
        }

        // validate() guarantees all three are present
        let (Some(in_amount), Some(out_amount), Some(rate)) =
            (resolution.in_amount, resolution.out_amount, resolution.rate)
        else {
            continue;
        };
        let Some(anchor) = anchor_leg(&bundle, venue) else {
            continue;
        };

        records.push(SwapRecord {
            venue: venue.name.to_string(),
            direction: resolution.direction,
            direction_label: venue.direction_label(resolution.direction),
            lt: anchor.leg.created_lt.unwrap_or(anchor.tx_lt),
            utime: anchor.leg.created_at.unwrap_or(anchor.tx_utime),
            tx_hash: anchor.tx_hash.clone(),
            in_amount,
            out_amount,
            rate,
            bundle,
        });
    }

    report.kept = records.len();
    tracing::info!(
        venue = venue.name,
        bundles = report.bundles,
        kept = report.kept,
        dropped = report.dropped_total(),
        "bundles filtered"
    );
    (records, report)
}
