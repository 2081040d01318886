//! Maps raw transaction messages onto venue roles.

use ton_data::types::{lookup, value_as_text};
use ton_data::{MessageLeg, RawTransaction};

use crate::venue::{Role, Side, VenueConfig};

/// A message whose op code the venue recognizes.
#[derive(Clone, Copy, Debug)]
pub struct NormalizedLeg<'a> {
    pub role: Role,
    pub side: Side,
    pub leg: &'a MessageLeg,
    pub tx: &'a RawTransaction,
}

/// Recognized legs of `tx`: the inbound leg first, then outbound legs in
/// emission order. Unrecognized or op-less legs are skipped.
pub fn normalize_legs<'a>(tx: &'a RawTransaction, venue: &VenueConfig) -> Vec<NormalizedLeg<'a>> {
    let inbound = tx.in_msg.iter().filter_map(|leg| {
        let role = venue.inbound_role(&leg.op()?)?;
        Some(NormalizedLeg {
            role,
            side: Side::In,
            leg,
            tx,
        })
    });

    let outbound = tx.out_msgs.iter().filter_map(|leg| {
        let role = venue.outbound_role(&leg.op()?)?;
        Some(NormalizedLeg {
            role,
            side: Side::Out,
            leg,
            tx,
        })
    });

    inbound.chain(outbound).collect()
}

/// Raw `query_id` of a leg as text, if present and non-empty.
///
/// `"0"` is returned as-is; callers decide whether it is usable.
pub fn raw_query_id(leg: &MessageLeg) -> Option<String> {
    lookup(leg.body(), &["query_id"])
        .and_then(value_as_text)
        .map(|qid| qid.trim().to_string())
        .filter(|qid| !qid.is_empty())
}

/// True if `qid` can correlate legs.
pub fn is_usable_key(qid: &str) -> bool {
    !qid.is_empty() && qid != "0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::roles;
    use serde_json::json;

    fn leg(op: &str, body: serde_json::Value) -> MessageLeg {
        MessageLeg {
            op_code: Some(op.to_string()),
            decoded_body: Some(body),
            ..Default::default()
        }
    }

    #[test]
    fn keeps_only_recognized_legs_in_order() {
        let tx = RawTransaction {
            hash: "h".to_string(),
            in_msg: Some(leg("0x7362D09C", json!({"query_id": 1}))),
            out_msgs: vec![
                leg("0xdeadbeef", json!({})),
                leg("0x0f8a7ea5", json!({"query_id": 1})),
                MessageLeg::default(),
                leg("0x6664de2a", json!({"query_id": 1})),
            ],
            ..Default::default()
        };

        let legs = normalize_legs(&tx, &VenueConfig::stonfi());
        let seen: Vec<(Role, Side)> = legs.iter().map(|l| (l.role, l.side)).collect();
        assert_eq!(
            seen,
            vec![
                (roles::NOTIFY, Side::In),
                (roles::TRANSFER, Side::Out),
                (roles::SWAP, Side::Out),
            ]
        );
    }

    #[test]
    fn query_id_accepts_numbers_and_strings() {
        assert_eq!(raw_query_id(&leg("0x1", json!({"query_id": 42}))).as_deref(), Some("42"));
        assert_eq!(raw_query_id(&leg("0x1", json!({"query_id": " 7 "}))).as_deref(), Some("7"));
        assert_eq!(raw_query_id(&leg("0x1", json!({"query_id": ""}))), None);
        assert_eq!(raw_query_id(&leg("0x1", json!({"query_id": null}))), None);
        assert_eq!(raw_query_id(&MessageLeg::default()), None);
        assert!(!is_usable_key("0"));
        assert!(is_usable_key("42"));
    }
}
