//! Direction, amount and rate resolution for a correlated bundle.
//!
//! Every extractor is a pure function of the bundle. Missing or malformed
//! values resolve to `None`, never to zero.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use ton_data::types::{lookup, value_as_text};

use crate::correlator::SwapBundle;
use crate::venue::{AmountSource, Direction, DirectionStrategy, FieldRef, LegField, VenueConfig};

/// Fractional digits kept on a rate.
pub const RATE_DP: u32 = 18;

/// Direction and amounts of one bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub direction: Direction,
    pub in_amount: Option<Decimal>,
    pub out_amount: Option<Decimal>,
    pub rate: Option<Decimal>,
}

/// Parses a JSON string or number into a decimal.
///
/// Accepts plain and scientific notation; anything else is `None`.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = value_as_text(value)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Reads an address that may be a string or an `{address|addr|value}` object.
pub fn address_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Object(map) => ["address", "addr", "value"]
            .iter()
            .find_map(|key| map.get(*key).and_then(value_as_text)),
        other => value_as_text(other),
    }?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// JSON value behind `field`, if the role is populated and the path exists.
pub fn field_value<'a>(bundle: &'a SwapBundle, field: &FieldRef) -> Option<&'a Value> {
    match field.field {
        LegField::Body(path) => lookup(bundle.leg(field.role)?.leg.body(), path),
        LegField::Source | LegField::Destination => None,
    }
}

/// Address or scalar text behind `field`.
pub fn field_text(bundle: &SwapBundle, field: &FieldRef) -> Option<String> {
    let leg = &bundle.leg(field.role)?.leg;
    match field.field {
        LegField::Source => leg.source_address().map(str::to_string),
        LegField::Destination => leg.destination_address().map(str::to_string),
        LegField::Body(path) => address_text(lookup(leg.body(), path)?),
    }
}

/// Decimal behind `field`.
pub fn field_decimal(bundle: &SwapBundle, field: &FieldRef) -> Option<Decimal> {
    parse_decimal(field_value(bundle, field)?)
}

fn same_address(found: &str, expected: &str) -> bool {
    found.trim().eq_ignore_ascii_case(expected)
}

impl DirectionStrategy {
    /// Direction implied by this strategy, if it applies to the bundle.
    pub fn resolve(&self, bundle: &SwapBundle) -> Option<Direction> {
        match self {
            DirectionStrategy::FieldMatch {
                field,
                a_to_b,
                b_to_a,
            } => {
                let found = field_text(bundle, field)?;
                if same_address(&found, a_to_b) {
                    Some(Direction::AToB)
                } else if same_address(&found, b_to_a) {
                    Some(Direction::BToA)
                } else {
                    None
                }
            }
            DirectionStrategy::RoutePair {
                from,
                to,
                a_side,
                b_side,
            } => {
                let from = field_text(bundle, from)?;
                let to = field_text(bundle, to)?;
                if same_address(&from, a_side) && same_address(&to, b_side) {
                    Some(Direction::AToB)
                } else if same_address(&from, b_side) && same_address(&to, a_side) {
                    Some(Direction::BToA)
                } else {
                    None
                }
            }
        }
    }
}

impl AmountSource {
    /// Amount read by this source for a swap in `direction`.
    pub fn resolve(&self, bundle: &SwapBundle, direction: Direction) -> Option<Decimal> {
        match self {
            AmountSource::Field { field, only } => {
                if only.is_some_and(|d| d != direction) {
                    return None;
                }
                field_decimal(bundle, field)
            }
            AmountSource::CoinPair {
                coins,
                source_jetton,
                a_to_b_slot,
                b_to_a_slot,
            } => {
                let coins = field_value(bundle, coins)?;
                let slots = [coin_slot(coins, 0)?, coin_slot(coins, 1)?];
                let non_zero: Vec<&(Decimal, String)> =
                    slots.iter().filter(|(amount, _)| !amount.is_zero()).collect();

                if let [(amount, _)] = non_zero.as_slice() {
                    return Some(*amount);
                }
                if let Some(source) = field_text(bundle, source_jetton) {
                    let other = non_zero
                        .iter()
                        .find(|(_, jetton)| !same_address(jetton, &source));
                    if let Some((amount, _)) = other {
                        return Some(*amount);
                    }
                }
                let slot = match direction {
                    Direction::AToB => *a_to_b_slot,
                    Direction::BToA => *b_to_a_slot,
                    Direction::Unknown => return None,
                };
                slots.get(slot).map(|(amount, _)| *amount)
            }
        }
    }
}

fn coin_slot(coins: &Value, index: usize) -> Option<(Decimal, String)> {
    let amount_key = format!("amount{index}");
    let jetton_key = format!("jetton{index}_address");
    let amount = parse_decimal(lookup(coins, &[amount_key.as_str()])?)?;
    let jetton = address_text(lookup(coins, &[jetton_key.as_str()])?)?;
    Some((amount, jetton))
}

/// Walks a priority chain.
///
/// The first non-zero amount wins; if every source yields zero the first zero
/// is returned so the caller can tell "zero" from "missing".
fn first_amount(
    sources: &[AmountSource],
    bundle: &SwapBundle,
    direction: Direction,
) -> Option<Decimal> {
    let mut first_zero = None;
    for source in sources {
        match source.resolve(bundle, direction) {
            Some(amount) if !amount.is_zero() => return Some(amount),
            Some(zero) => {
                first_zero.get_or_insert(zero);
            }
            None => {}
        }
    }
    first_zero
}

/// Trade direction of `bundle`; the first strategy that applies wins.
pub fn resolve_direction(bundle: &SwapBundle, venue: &VenueConfig) -> Direction {
    venue
        .direction_strategies
        .iter()
        .find_map(|strategy| strategy.resolve(bundle))
        .unwrap_or(Direction::Unknown)
}

/// `out / in` rounded to [`RATE_DP`] digits with banker's rounding.
///
/// `None` if either operand is missing or the input is zero.
pub fn compute_rate(in_amount: Option<Decimal>, out_amount: Option<Decimal>) -> Option<Decimal> {
    let (in_amount, out_amount) = (in_amount?, out_amount?);
    if in_amount.is_zero() {
        return None;
    }
    let mut rate = out_amount.checked_div(in_amount)?.round_dp(RATE_DP);
    rate.rescale(RATE_DP);
    Some(rate)
}

/// Rate in the venue's canonical orientation, multiplied by `scale`.
///
/// A→B rates are inverted so both directions compare on one axis.
pub fn scaled_rate(direction: Direction, rate: Decimal, scale: Decimal) -> Option<Decimal> {
    match direction {
        Direction::AToB => scale.checked_div(rate),
        Direction::BToA => rate.checked_mul(scale),
        Direction::Unknown => None,
    }
}

/// Resolves direction, amounts and rate of one bundle.
///
/// Amounts are only looked up once the direction is known.
pub fn resolve(bundle: &SwapBundle, venue: &VenueConfig) -> Resolution {
    let direction = resolve_direction(bundle, venue);
    if !direction.is_known() {
        return Resolution {
            direction,
            in_amount: None,
            out_amount: None,
            rate: None,
        };
    }

    let in_amount = first_amount(&venue.input_sources, bundle, direction);
    let out_amount = first_amount(&venue.output_sources, bundle, direction);
    Resolution {
        direction,
        in_amount,
        out_amount,
        rate: compute_rate(in_amount, out_amount),
    }
}
