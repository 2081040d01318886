//! Shared test helpers and utilities.
//!
//! Factory functions that build TonAPI-shaped transactions for each venue
//! with sensible defaults.

#![allow(dead_code)]

use serde_json::{json, Value};
use ton_bundle::venue::{
    DEDUST_TON_SIDE, DEDUST_USDT_VAULT, STONFI_PTON_WALLET, STONFI_SWAP_OK, STONFI_USDT_WALLET,
    TONCO_TON_WALLET, TONCO_USDT_WALLET,
};
use ton_data::store::Store;
use ton_data::{AccountRef, MessageLeg, RawTransaction};

/// Base unix time of generated transactions.
pub const BASE_UTIME: u64 = 1_717_000_000;

/// Creates an in-memory SQLite Store for tests.
///
/// # Panics
/// Panics if the in-memory database cannot be created (should never happen).
pub fn test_store() -> Store {
    Store::new(":memory:").expect("in-memory store should always open")
}

/// A leg with an op code, payload and creation lt.
pub fn leg(op: &str, created_lt: u64, body: Value) -> MessageLeg {
    MessageLeg {
        op_code: Some(op.to_string()),
        decoded_body: Some(body),
        created_lt: Some(created_lt),
        ..Default::default()
    }
}

/// Same as [`leg`] with source and destination addresses.
pub fn routed_leg(
    op: &str,
    created_lt: u64,
    source: &str,
    destination: &str,
    body: Value,
) -> MessageLeg {
    MessageLeg {
        source: Some(AccountRef {
            address: source.to_string(),
        }),
        destination: Some(AccountRef {
            address: destination.to_string(),
        }),
        ..leg(op, created_lt, body)
    }
}

pub fn tx(
    hash: &str,
    lt: u64,
    in_msg: Option<MessageLeg>,
    out_msgs: Vec<MessageLeg>,
) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        lt,
        utime: BASE_UTIME + lt % 1_000,
        in_msg,
        out_msgs,
    }
}

/// One STON.fi swap as its two router transactions.
///
/// `a_to_b` selects TON → USDT; `exit_code` is written on the pay leg.
pub fn stonfi_swap(
    qid: u64,
    lt: u64,
    a_to_b: bool,
    amount_in: &str,
    amount_out: &str,
    exit_code: u64,
) -> Vec<RawTransaction> {
    let wallet = if a_to_b { STONFI_USDT_WALLET } else { STONFI_PTON_WALLET };
    vec![
        tx(
            &format!("stonfi-notify-{qid}"),
            lt,
            Some(leg("0x7362d09c", lt - 1, json!({"query_id": qid, "amount": amount_in}))),
            vec![leg(
                "0x6664de2a",
                lt + 1,
                json!({
                    "query_id": qid,
                    "dex_payload": {
                        "token_wallet1": wallet,
                        "swap_body": {"min_out": "1"}
                    }
                }),
            )],
        ),
        tx(
            &format!("stonfi-pay-{qid}"),
            lt + 3,
            Some(leg(
                "0x657b54f5",
                lt + 2,
                json!({
                    "query_id": qid,
                    "exit_code": exit_code,
                    "additional_info": {
                        "token0_address": STONFI_PTON_WALLET,
                        "token1_address": STONFI_USDT_WALLET,
                    }
                }),
            )),
            vec![leg("0x0f8a7ea5", lt + 4, json!({"query_id": qid, "amount": amount_out}))],
        ),
    ]
}

/// A successful STON.fi swap.
pub fn stonfi_ok(
    qid: u64,
    lt: u64,
    a_to_b: bool,
    amount_in: &str,
    amount_out: &str,
) -> Vec<RawTransaction> {
    stonfi_swap(qid, lt, a_to_b, amount_in, amount_out, STONFI_SWAP_OK)
}

/// One DeDust swap: notify in, payout transfer out, in one transaction.
pub fn dedust_swap(
    qid: u64,
    lt: u64,
    a_to_b: bool,
    amount_in: &str,
    amount_out: &str,
) -> RawTransaction {
    let (from, to) = if a_to_b {
        (DEDUST_TON_SIDE, DEDUST_USDT_VAULT)
    } else {
        (DEDUST_USDT_VAULT, DEDUST_TON_SIDE)
    };
    tx(
        &format!("dedust-{qid}"),
        lt,
        Some(routed_leg(
            "0x61ee542d",
            lt - 1,
            from,
            "0:pool",
            json!({"query_id": qid, "amount": amount_in}),
        )),
        vec![routed_leg(
            "0xad4eb6f5",
            lt + 1,
            "0:pool",
            to,
            json!({"query_id": qid, "amount": amount_out}),
        )],
    )
}

/// One TONCO swap: swap request in, pay instruction out.
pub fn tonco_swap(
    qid: u64,
    lt: u64,
    a_to_b: bool,
    amount_in: &str,
    amount_out: &str,
) -> RawTransaction {
    let (source, other) = if a_to_b {
        (TONCO_TON_WALLET, TONCO_USDT_WALLET)
    } else {
        (TONCO_USDT_WALLET, TONCO_TON_WALLET)
    };
    tx(
        &format!("tonco-{qid}"),
        lt,
        Some(leg(
            "0xa7fb58f8",
            lt - 1,
            json!({"query_id": qid, "source_wallet": source, "params_cell": {"amount": amount_in}}),
        )),
        vec![leg(
            "0xa1daa96d",
            lt + 1,
            json!({
                "query_id": qid,
                "pay_to": {"pay_to_code200": {"coinsinfo_cell": {
                    "amount0": "0", "jetton0_address": source,
                    "amount1": amount_out, "jetton1_address": {"address": other},
                }}}
            }),
        )],
    )
}
