//! Type definitions for TonAPI account history.
//!
//! Shapes follow the `/v2/blockchain/accounts/{account}/transactions`
//! response. Every field is optional on the wire; deserialization is lenient
//! so one malformed transaction never rejects a whole page.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One ledger transaction as delivered by the fetch stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Transaction hash (hex text).
    #[serde(default)]
    pub hash: String,
    /// Logical time, monotonic per account.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub lt: u64,
    /// Unix timestamp in seconds.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub utime: u64,
    /// Inbound message, if any.
    #[serde(default)]
    pub in_msg: Option<MessageLeg>,
    /// Outbound messages in emission order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub out_msgs: Vec<MessageLeg>,
}

/// Inbound or outbound message of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLeg {
    /// Operation code as hex text (e.g. `0x7362d09c`).
    #[serde(default)]
    pub op_code: Option<String>,
    /// Decoded payload. Shape depends on `op_code`.
    #[serde(default)]
    pub decoded_body: Option<Value>,
    /// Sender account.
    #[serde(default)]
    pub source: Option<AccountRef>,
    /// Recipient account.
    #[serde(default)]
    pub destination: Option<AccountRef>,
    /// Logical time at which the message was created.
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub created_lt: Option<u64>,
    /// Unix timestamp at which the message was created.
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub created_at: Option<u64>,
}

/// Account reference embedded in messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    /// Raw address (`wc:hex`).
    #[serde(default)]
    pub address: String,
}

static EMPTY_BODY: Value = Value::Null;

impl MessageLeg {
    /// Lowercased op code, if present and non-empty.
    pub fn op(&self) -> Option<String> {
        self.op_code
            .as_deref()
            .map(str::trim)
            .filter(|op| !op.is_empty())
            .map(str::to_lowercase)
    }

    /// Decoded payload; an absent payload behaves as an empty mapping.
    pub fn body(&self) -> &Value {
        self.decoded_body.as_ref().unwrap_or(&EMPTY_BODY)
    }

    /// Sender address, if present and non-empty.
    pub fn source_address(&self) -> Option<&str> {
        self.source
            .as_ref()
            .map(|acc| acc.address.as_str())
            .filter(|addr| !addr.is_empty())
    }

    /// Recipient address, if present and non-empty.
    pub fn destination_address(&self) -> Option<&str> {
        self.destination
            .as_ref()
            .map(|acc| acc.address.as_str())
            .filter(|addr| !addr.is_empty())
    }
}

/// Block coordinates of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockLocation {
    /// Workchain id (`0` basechain, `-1` masterchain).
    pub workchain: i32,
    /// Shard prefix as hex text.
    pub shard: String,
    /// Block sequence number within the shard.
    pub seqno: u64,
}

impl BlockLocation {
    /// Block identifier string, `wc:shard:seqno`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.workchain, self.shard, self.seqno)
    }

    /// Shard identifier used to group blocks for cross-block scans.
    pub fn shard_key(&self) -> (i32, String) {
        (self.workchain, self.shard.clone())
    }
}

/// Reads a JSON number or numeric string as `u64`.
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a scalar JSON value the way it appears on the wire.
///
/// Strings are returned as-is, numbers and booleans via their JSON text.
/// Objects, arrays and null yield `None`.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Walks a nested object path; missing keys and non-objects yield `None`.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_object()?.get(*key))
        .filter(|found| !found.is_null())
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_u64(&value).unwrap_or(0))
}

fn lenient_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_u64(&value))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<MessageLeg>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<MessageLeg>>::deserialize(deserializer)?.unwrap_or_default())
}
