//! Per-venue protocol tables.
//!
//! A venue is pure data: op-code → role tables, the field paths that carry
//! direction and amounts, and the validity rules of the protocol. The engine
//! is generic over [`VenueConfig`]; adding a venue never touches control flow.
//!
//! STON.fi wallet labels: see DESIGN.md.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Role name of a leg inside a bundle (`notify`, `swap`, `pay`, `transfer`).
pub type Role = &'static str;

/// Well-known role names.
pub mod roles {
    use super::Role;

    /// Jetton notification / external swap request that starts the swap.
    pub const NOTIFY: Role = "notify";
    /// Router → pool swap request.
    pub const SWAP: Role = "swap";
    /// Pool → router payout instruction.
    pub const PAY: Role = "pay";
    /// Final jetton transfer / payout to the trader.
    pub const TRANSFER: Role = "transfer";
}

use roles::{NOTIFY, PAY, SWAP, TRANSFER};

/// Trade direction relative to the venue's two assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Asset A in, asset B out.
    AToB,
    /// Asset B in, asset A out.
    BToA,
    /// Not resolvable from the bundle.
    Unknown,
}

impl Direction {
    /// The opposite direction; `Unknown` stays `Unknown`.
    pub fn reversed(self) -> Self {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
            Direction::Unknown => Direction::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Direction::Unknown)
    }
}

/// Which side of the transaction a leg came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    In,
    Out,
}

/// A value inside a leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegField {
    /// Message source address.
    Source,
    /// Message destination address.
    Destination,
    /// Nested path inside the decoded payload.
    Body(&'static [&'static str]),
}

/// A value inside a bundle: a role plus a field of that role's leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub role: Role,
    pub field: LegField,
}

impl FieldRef {
    pub const fn body(role: Role, path: &'static [&'static str]) -> Self {
        Self {
            role,
            field: LegField::Body(path),
        }
    }

    pub const fn source(role: Role) -> Self {
        Self {
            role,
            field: LegField::Source,
        }
    }

    pub const fn destination(role: Role) -> Self {
        Self {
            role,
            field: LegField::Destination,
        }
    }
}

/// One step of a direction priority chain.
#[derive(Clone, Debug, PartialEq)]
pub enum DirectionStrategy {
    /// A single address field names the direction.
    FieldMatch {
        field: FieldRef,
        a_to_b: &'static str,
        b_to_a: &'static str,
    },
    /// Direction is implied by where value came from and where it went.
    RoutePair {
        from: FieldRef,
        to: FieldRef,
        a_side: &'static str,
        b_side: &'static str,
    },
}

/// One step of an amount priority chain.
#[derive(Clone, Debug, PartialEq)]
pub enum AmountSource {
    /// A decimal field, optionally only for one direction.
    Field {
        field: FieldRef,
        only: Option<Direction>,
    },
    /// A two-slot coin record (`amount{0,1}` / `jetton{0,1}_address`).
    ///
    /// Picks the single non-zero slot, else the non-zero slot whose jetton
    /// differs from `source_jetton`, else the slot fixed for the direction.
    CoinPair {
        coins: FieldRef,
        source_jetton: FieldRef,
        a_to_b_slot: usize,
        b_to_a_slot: usize,
    },
}

/// Explicit completion code carried by a payout leg.
#[derive(Clone, Debug, PartialEq)]
pub struct ExitCodeRule {
    pub field: FieldRef,
    pub success: u64,
}

/// Restricts bundles to one pool by its two token addresses.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolGuard {
    pub first: FieldRef,
    pub second: FieldRef,
    pub tokens: [&'static str; 2],
}

/// Open interval of plausible rates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateRange {
    pub low: Decimal,
    pub high: Decimal,
}

impl RateRange {
    pub fn contains(&self, rate: Decimal) -> bool {
        rate > self.low && rate < self.high
    }
}

/// Sanity ranges per direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateRanges {
    pub a_to_b: Option<RateRange>,
    pub b_to_a: Option<RateRange>,
}

impl RateRanges {
    pub fn for_direction(&self, direction: Direction) -> Option<&RateRange> {
        match direction {
            Direction::AToB => self.a_to_b.as_ref(),
            Direction::BToA => self.b_to_a.as_ref(),
            Direction::Unknown => None,
        }
    }
}

/// Everything the engine needs to know about one venue.
#[derive(Clone, Debug, PartialEq)]
pub struct VenueConfig {
    /// Short name (`stonfi`, `dedust`, `tonco`).
    pub name: &'static str,
    /// Router or pool account whose history is analyzed.
    pub account: &'static str,
    /// Label of asset A.
    pub asset_a: &'static str,
    /// Label of asset B.
    pub asset_b: &'static str,
    /// Inbound op code → role.
    pub inbound_roles: &'static [(&'static str, Role)],
    /// Outbound op code → role.
    pub outbound_roles: &'static [(&'static str, Role)],
    /// Role that starts a swap; preferred for ordering and block lookup.
    pub initiating_role: Role,
    pub direction_strategies: Vec<DirectionStrategy>,
    pub input_sources: Vec<AmountSource>,
    pub output_sources: Vec<AmountSource>,
    pub exit_code: Option<ExitCodeRule>,
    pub pool_guard: Option<PoolGuard>,
    pub rate_ranges: Option<RateRanges>,
    /// Paths of the trader's minimum-output guard, in priority order.
    pub min_out_fields: Vec<FieldRef>,
    /// Multiplier of the scaled comparison rate.
    pub rate_scale: Decimal,
}

/// STON.fi v2 router.
pub const STONFI_ROUTER: &str = "EQCS4UEa5UaJLzOyyKieqQOQ2P9M-7kXpkO5HnP3Bv250cN3";
/// STON.fi router wallet named by `token_wallet1` for TON → USDT swaps.
pub const STONFI_USDT_WALLET: &str =
    "0:922d627d7d8edbd00e4e23bdb0c54a76ee5e1f46573a1af4417857fa3e23e91f";
/// STON.fi router wallet named by `token_wallet1` for USDT → TON swaps.
pub const STONFI_PTON_WALLET: &str =
    "0:9220c181a6cfeacd11b7b8f62138df1bb9cc82b6ed2661d2f5faee204b3efb20";
/// STON.fi pay-to success code.
pub const STONFI_SWAP_OK: u64 = 3_326_308_581;

/// DeDust classic TON/USDT pool.
pub const DEDUST_POOL: &str = "EQA-X_yo3fzzbDbJ_0bzFWKqtRuZFIRa1sJsveZJ1YpViO3r";
pub const DEDUST_TON_SIDE: &str =
    "0:dae153a74d894bbc32748198cd626e4f5df4a69ad2fa56ce80fc2644b5708d20";
pub const DEDUST_USDT_VAULT: &str =
    "0:18aa8e2eed51747dae033c079b93883d941cad8f65459f2ee9cd7474b6b8ed5d";

/// TONCO v3 TON/USDT pool.
pub const TONCO_POOL: &str = "EQD25vStEwc-h1QT1qlsYPQwqU5IiOhox5II0C_xsDNpMVo7";
pub const TONCO_TON_WALLET: &str =
    "0:871da9215b14902166f0ea2a16db56278d528108377f8158c5f4ccfdfdd22e17";
pub const TONCO_USDT_WALLET: &str =
    "0:acad45796724b3f00ad42a4311b20667da4be28a43951587a381f73aa9552209";

const STONFI_INBOUND: &[(&str, Role)] = &[("0x7362d09c", NOTIFY), ("0x657b54f5", PAY)];
const STONFI_OUTBOUND: &[(&str, Role)] = &[("0x6664de2a", SWAP), ("0x0f8a7ea5", TRANSFER)];

const DEDUST_INBOUND: &[(&str, Role)] = &[("0x61ee542d", NOTIFY)];
const DEDUST_OUTBOUND: &[(&str, Role)] = &[("0xad4eb6f5", TRANSFER), ("0x9c610de3", SWAP)];

const TONCO_INBOUND: &[(&str, Role)] = &[("0xa7fb58f8", SWAP)];
const TONCO_OUTBOUND: &[(&str, Role)] = &[("0xa1daa96d", PAY)];

const AMOUNT: &[&str] = &["amount"];

impl VenueConfig {
    /// STON.fi v2 router, TON/USDT pool.
    pub fn stonfi() -> Self {
        Self {
            name: "stonfi",
            account: STONFI_ROUTER,
            asset_a: "TON",
            asset_b: "USDT",
            inbound_roles: STONFI_INBOUND,
            outbound_roles: STONFI_OUTBOUND,
            initiating_role: NOTIFY,
            direction_strategies: vec![DirectionStrategy::FieldMatch {
                field: FieldRef::body(SWAP, &["dex_payload", "token_wallet1"]),
                a_to_b: STONFI_USDT_WALLET,
                b_to_a: STONFI_PTON_WALLET,
            }],
            input_sources: vec![AmountSource::Field {
                field: FieldRef::body(NOTIFY, AMOUNT),
                only: None,
            }],
            output_sources: vec![
                AmountSource::Field {
                    field: FieldRef::body(TRANSFER, AMOUNT),
                    only: None,
                },
                AmountSource::Field {
                    field: FieldRef::body(PAY, &["additional_info", "amount1_out"]),
                    only: Some(Direction::AToB),
                },
                AmountSource::Field {
                    field: FieldRef::body(PAY, &["additional_info", "amount0_out"]),
                    only: Some(Direction::BToA),
                },
            ],
            exit_code: Some(ExitCodeRule {
                field: FieldRef::body(PAY, &["exit_code"]),
                success: STONFI_SWAP_OK,
            }),
            pool_guard: Some(PoolGuard {
                first: FieldRef::body(PAY, &["additional_info", "token0_address"]),
                second: FieldRef::body(PAY, &["additional_info", "token1_address"]),
                tokens: [STONFI_USDT_WALLET, STONFI_PTON_WALLET],
            }),
            rate_ranges: Some(RateRanges {
                a_to_b: Some(RateRange {
                    low: Decimal::new(10, 0),
                    high: Decimal::new(5000, 0),
                }),
                b_to_a: Some(RateRange {
                    low: Decimal::new(1, 6),
                    high: Decimal::new(1, 2),
                }),
            }),
            min_out_fields: vec![
                FieldRef::body(SWAP, &["dex_payload", "swap_body", "min_out"]),
                FieldRef::body(
                    NOTIFY,
                    &["forward_payload", "value", "value", "cross_swap_body", "min_out"],
                ),
            ],
            rate_scale: Decimal::new(1000, 0),
        }
    }

    /// DeDust classic TON/USDT pool.
    pub fn dedust() -> Self {
        Self {
            name: "dedust",
            account: DEDUST_POOL,
            asset_a: "TON",
            asset_b: "USDT",
            inbound_roles: DEDUST_INBOUND,
            outbound_roles: DEDUST_OUTBOUND,
            initiating_role: NOTIFY,
            direction_strategies: vec![DirectionStrategy::RoutePair {
                from: FieldRef::source(NOTIFY),
                to: FieldRef::destination(TRANSFER),
                a_side: DEDUST_TON_SIDE,
                b_side: DEDUST_USDT_VAULT,
            }],
            input_sources: vec![AmountSource::Field {
                field: FieldRef::body(NOTIFY, AMOUNT),
                only: None,
            }],
            output_sources: vec![AmountSource::Field {
                field: FieldRef::body(TRANSFER, AMOUNT),
                only: None,
            }],
            exit_code: None,
            pool_guard: None,
            rate_ranges: None,
            min_out_fields: Vec::new(),
            rate_scale: Decimal::new(1000, 0),
        }
    }

    /// TONCO v3 TON/USDT pool.
    pub fn tonco() -> Self {
        Self {
            name: "tonco",
            account: TONCO_POOL,
            asset_a: "TON",
            asset_b: "USDT",
            inbound_roles: TONCO_INBOUND,
            outbound_roles: TONCO_OUTBOUND,
            initiating_role: SWAP,
            direction_strategies: vec![DirectionStrategy::FieldMatch {
                field: FieldRef::body(SWAP, &["source_wallet"]),
                a_to_b: TONCO_TON_WALLET,
                b_to_a: TONCO_USDT_WALLET,
            }],
            input_sources: vec![AmountSource::Field {
                field: FieldRef::body(SWAP, &["params_cell", "amount"]),
                only: None,
            }],
            output_sources: vec![AmountSource::CoinPair {
                coins: FieldRef::body(PAY, &["pay_to", "pay_to_code200", "coinsinfo_cell"]),
                source_jetton: FieldRef::body(SWAP, &["source_wallet"]),
                a_to_b_slot: 1,
                b_to_a_slot: 0,
            }],
            exit_code: None,
            pool_guard: None,
            rate_ranges: None,
            min_out_fields: Vec::new(),
            rate_scale: Decimal::new(1000, 0),
        }
    }

    /// Looks up a built-in venue by name (case-insensitive).
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "stonfi" | "ston.fi" => Some(Self::stonfi()),
            "dedust" => Some(Self::dedust()),
            "tonco" => Some(Self::tonco()),
            _ => None,
        }
    }

    /// Names accepted by [`VenueConfig::by_name`].
    pub fn names() -> &'static [&'static str] {
        &["stonfi", "dedust", "tonco"]
    }

    /// Role of an inbound op code, compared case-insensitively.
    pub fn inbound_role(&self, op_code: &str) -> Option<Role> {
        find_role(self.inbound_roles, op_code)
    }

    /// Role of an outbound op code, compared case-insensitively.
    pub fn outbound_role(&self, op_code: &str) -> Option<Role> {
        find_role(self.outbound_roles, op_code)
    }

    /// Human label such as `TON->USDT`.
    pub fn direction_label(&self, direction: Direction) -> String {
        match direction {
            Direction::AToB => format!("{}->{}", self.asset_a, self.asset_b),
            Direction::BToA => format!("{}->{}", self.asset_b, self.asset_a),
            Direction::Unknown => "unknown".to_string(),
        }
    }
}

fn find_role(table: &[(&'static str, Role)], op_code: &str) -> Option<Role> {
    let op = op_code.trim();
    table
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(op))
        .map(|(_, role)| *role)
}
