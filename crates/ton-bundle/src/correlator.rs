//! Groups recognized legs of many transactions into per-swap bundles.
//!
//! A bundle is keyed by the `query_id` shared by every leg of one swap. The
//! first leg seen for a role wins; later legs for the same role are ignored,
//! so feeding the same transaction twice never changes a bundle.

use std::collections::BTreeMap;

use serde::Serialize;
use ton_data::{MessageLeg, RawTransaction};

use crate::adapter::{is_usable_key, normalize_legs, raw_query_id};
use crate::venue::{Role, Side, VenueConfig};

/// One leg attached to a bundle, with the transaction it came from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BundleLeg {
    pub tx_hash: String,
    pub tx_lt: u64,
    pub tx_utime: u64,
    pub side: Side,
    pub leg: MessageLeg,
}

/// All legs of one swap, keyed by role.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SwapBundle {
    pub query_id: String,
    pub legs: BTreeMap<Role, BundleLeg>,
}

impl SwapBundle {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            legs: BTreeMap::new(),
        }
    }

    pub fn leg(&self, role: Role) -> Option<&BundleLeg> {
        self.legs.get(role)
    }

    pub fn has(&self, role: Role) -> bool {
        self.legs.contains_key(role)
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Attaches `leg` under `role` unless the role is already populated.
    ///
    /// Returns `true` if the leg was attached.
    pub fn attach(&mut self, role: Role, leg: BundleLeg) -> bool {
        if self.legs.contains_key(role) {
            return false;
        }
        self.legs.insert(role, leg);
        true
    }
}

/// Correlation key of a transaction, or `None` if it cannot be correlated.
///
/// A recognized inbound leg is asked first; otherwise the first outbound leg
/// exposing a non-empty `query_id` decides, even if that key is `"0"`.
pub fn transaction_key(tx: &RawTransaction, venue: &VenueConfig) -> Option<String> {
    let inbound_key = tx
        .in_msg
        .as_ref()
        .filter(|leg| leg.op().and_then(|op| venue.inbound_role(&op)).is_some())
        .and_then(raw_query_id)
        .filter(|qid| is_usable_key(qid));

    let key = inbound_key.or_else(|| tx.out_msgs.iter().find_map(raw_query_id))?;
    is_usable_key(&key).then_some(key)
}

/// Correlates `txs` into bundles keyed by `query_id`.
///
/// Transactions without a usable key are dropped, as are bundles that end up
/// with no recognized leg.
pub fn correlate(txs: &[RawTransaction], venue: &VenueConfig) -> BTreeMap<String, SwapBundle> {
    let mut bundles: BTreeMap<String, SwapBundle> = BTreeMap::new();
    let mut keyless = 0_usize;
    let mut ignored_legs = 0_usize;

    for tx in txs {
        let Some(key) = transaction_key(tx, venue) else {
            keyless += 1;
            tracing::debug!(tx_hash = %tx.hash, venue = venue.name, "no correlation key");
            continue;
        };

        let bundle = bundles
            .entry(key.clone())
            .or_insert_with(|| SwapBundle::new(key));

        for normalized in normalize_legs(tx, venue) {
            let attached = bundle.attach(
                normalized.role,
                BundleLeg {
                    tx_hash: tx.hash.clone(),
                    tx_lt: tx.lt,
                    tx_utime: tx.utime,
                    side: normalized.side,
                    leg: normalized.leg.clone(),
                },
            );
            if !attached {
                ignored_legs += 1;
            }
        }
    }

    let before = bundles.len();
    bundles.retain(|_, bundle| !bundle.is_empty());

    tracing::info!(
        venue = venue.name,
        txs = txs.len(),
        keyless,
        ignored_legs,
        empty_bundles = before - bundles.len(),
        bundles = bundles.len(),
        "transactions correlated"
    );
    bundles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::roles::{NOTIFY, PAY, SWAP, TRANSFER};
    use serde_json::{json, Value};

    fn leg(op: &str, body: Value) -> MessageLeg {
        MessageLeg {
            op_code: Some(op.to_string()),
            decoded_body: Some(body),
            ..Default::default()
        }
    }

    fn tx(
        hash: &str,
        lt: u64,
        in_msg: Option<MessageLeg>,
        out_msgs: Vec<MessageLeg>,
    ) -> RawTransaction {
        RawTransaction {
            hash: hash.to_string(),
            lt,
            utime: 1_717_000_000,
            in_msg,
            out_msgs,
        }
    }

    fn stonfi_swap(qid: u64) -> Vec<RawTransaction> {
        vec![
            tx(
                &format!("notify-{qid}"),
                qid * 10,
                Some(leg("0x7362d09c", json!({"query_id": qid, "amount": "1000"}))),
                vec![leg("0x6664de2a", json!({"query_id": qid}))],
            ),
            tx(
                &format!("pay-{qid}"),
                qid * 10 + 1,
                Some(leg("0x657b54f5", json!({"query_id": qid, "exit_code": 3326308581u64}))),
                vec![leg("0x0f8a7ea5", json!({"query_id": qid, "amount": "650"}))],
            ),
        ]
    }

    #[test]
    fn joins_legs_across_transactions() {
        let bundles = correlate(&stonfi_swap(7), &VenueConfig::stonfi());
        assert_eq!(bundles.len(), 1);

        let bundle = &bundles["7"];
        for role in [NOTIFY, SWAP, PAY, TRANSFER] {
            assert!(bundle.has(role), "missing {role}");
        }
        assert_eq!(bundle.leg(PAY).map(|l| l.tx_hash.as_str()), Some("pay-7"));
        assert_eq!(bundle.leg(SWAP).map(|l| l.side), Some(Side::Out));
    }

    #[test]
    fn first_writer_wins() {
        let mut txs = stonfi_swap(7);
        txs.push(tx(
            "late-notify",
            999,
            Some(leg("0x7362d09c", json!({"query_id": 7, "amount": "5"}))),
            vec![],
        ));

        let bundles = correlate(&txs, &VenueConfig::stonfi());
        assert_eq!(bundles["7"].leg(NOTIFY).map(|l| l.tx_hash.as_str()), Some("notify-7"));
    }

    #[test]
    fn duplicates_and_reordering_do_not_change_result() {
        let venue = VenueConfig::stonfi();
        let mut txs = stonfi_swap(1);
        txs.extend(stonfi_swap(2));
        let baseline = correlate(&txs, &venue);

        let mut shuffled = txs.clone();
        shuffled.reverse();
        shuffled.extend(txs.iter().cloned());

        assert_eq!(correlate(&shuffled, &venue), baseline);
    }

    #[test]
    fn falls_back_to_outbound_key() {
        let txs = vec![tx(
            "h",
            1,
            Some(leg("0x7362d09c", json!({"amount": "1"}))),
            vec![
                leg("0xffffffff", json!({"note": "no key"})),
                leg("0x6664de2a", json!({"query_id": "99"})),
            ],
        )];

        let bundles = correlate(&txs, &VenueConfig::stonfi());
        let bundle = &bundles["99"];
        assert!(bundle.has(NOTIFY));
        assert!(bundle.has(SWAP));
    }

    #[test]
    fn zero_key_disqualifies_transaction() {
        let txs = vec![tx(
            "h",
            1,
            Some(leg("0x7362d09c", json!({"query_id": 0}))),
            vec![leg("0x6664de2a", json!({"query_id": "0"}))],
        )];
        assert!(correlate(&txs, &VenueConfig::stonfi()).is_empty());
    }

    #[test]
    fn unrecognized_inbound_with_keyless_outbound_is_dropped() {
        let txs = vec![tx(
            "h",
            1,
            Some(leg("0x12345678", json!({"query_id": 5}))),
            vec![leg("0x6664de2a", json!({}))],
        )];
        assert!(correlate(&txs, &VenueConfig::stonfi()).is_empty());
    }

    #[test]
    fn keyed_transaction_without_known_legs_leaves_no_bundle() {
        let txs = vec![tx(
            "h",
            1,
            Some(leg("0x12345678", json!({}))),
            vec![leg("0xabcdef01", json!({"query_id": 5}))],
        )];
        assert!(correlate(&txs, &VenueConfig::stonfi()).is_empty());
    }
}
