//! Block-location lookup for individual transactions.
//!
//! Every lookup failure degrades to "no block"; callers treat such
//! transactions as unplaced rather than aborting. Results are memoized per
//! hash in [`BlockCache`], including failures.

use std::collections::HashMap;
use std::time::Duration;

use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::tonapi::TonApiClient;
use crate::types::{value_as_text, value_as_u64, BlockLocation};

/// Pause between consecutive lookups.
pub const DEFAULT_PACING: Duration = Duration::from_millis(50);

/// Memoized `tx_hash -> block` lookups for one run.
#[derive(Clone, Debug, Default)]
pub struct BlockCache {
    entries: HashMap<String, Option<BlockLocation>>,
    lookups: usize,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `hash`; the outer `None` means "never looked up".
    pub fn get(&self, hash: &str) -> Option<Option<&BlockLocation>> {
        self.entries.get(hash).map(Option::as_ref)
    }

    /// Returns the cached location or calls `lookup` once for an unseen hash.
    pub fn resolve_with<F>(&mut self, hash: &str, mut lookup: F) -> Option<BlockLocation>
    where
        F: FnMut(&str) -> Option<BlockLocation>,
    {
        if let Some(cached) = self.entries.get(hash) {
            return cached.clone();
        }
        self.lookups += 1;
        let found = lookup(hash);
        self.entries.insert(hash.to_string(), found.clone());
        found
    }

    /// Records an externally obtained result.
    pub fn insert(&mut self, hash: &str, location: Option<BlockLocation>) {
        if !self.entries.contains_key(hash) {
            self.lookups += 1;
        }
        self.entries.insert(hash.to_string(), location);
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of lookups performed (cache misses).
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Number of hashes that resolved to a block.
    pub fn resolved(&self) -> usize {
        self.entries.values().filter(|loc| loc.is_some()).count()
    }
}

/// Parses the TonAPI tuple form `(wc,shard,seqno)`.
pub fn parse_block_str(raw: &str) -> Option<BlockLocation> {
    let inner = raw.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.split(',').map(str::trim);
    let workchain = parts.next()?.parse().ok()?;
    let shard = parts.next()?.to_string();
    let seqno = parts.next()?.parse().ok()?;
    if parts.next().is_some() || shard.is_empty() {
        return None;
    }
    Some(BlockLocation {
        workchain,
        shard,
        seqno,
    })
}

/// Extracts a block location from a transaction body (`block_id` or `block`).
pub fn parse_block_field(tx: &Value) -> Option<BlockLocation> {
    let block = tx
        .get("block_id")
        .filter(|v| !v.is_null())
        .or_else(|| tx.get("block"))?;

    if let Some(raw) = block.as_str() {
        return parse_block_str(raw);
    }

    let workchain = block.get("workchain").and_then(|wc| match wc {
        Value::String(text) => text.trim().parse::<i64>().ok(),
        other => other.as_i64(),
    })?;
    let shard = block.get("shard").and_then(value_as_text)?;
    let seqno = block.get("seqno").and_then(value_as_u64)?;
    Some(BlockLocation {
        workchain: i32::try_from(workchain).ok()?,
        shard,
        seqno,
    })
}

impl TonApiClient {
    /// Looks up the block containing `tx_hash`.
    ///
    /// Any transport, status or shape failure yields `None`.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_block_location(&self, tx_hash: &str) -> Option<BlockLocation> {
        if tx_hash.is_empty() {
            return None;
        }

        let response = match self
            .get(&format!("/v2/blockchain/transactions/{tx_hash}"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "block lookup rejected");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "block lookup failed");
                return None;
            }
        };

        match response.json::<Value>().await {
            Ok(body) => parse_block_field(&body),
            Err(err) => {
                tracing::debug!(error = %err, "block lookup body undecodable");
                None
            }
        }
    }

    /// Resolves each unseen hash sequentially, pausing `pacing` after every
    /// network lookup.
    ///
    /// # Errors
    /// Returns error only if the progress bar template is invalid.
    pub async fn resolve_blocks<'a, I>(
        &self,
        hashes: I,
        cache: &mut BlockCache,
        pacing: Duration,
    ) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pending: Vec<&str> = hashes
            .into_iter()
            .filter(|hash| !hash.is_empty())
            .collect();

        let pb = ProgressBar::new(pending.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} block lookups")
                .wrap_err("invalid progress bar template")?,
        );

        for hash in pending {
            pb.inc(1);
            if cache.contains(hash) {
                continue;
            }
            let location = self.fetch_block_location(hash).await;
            cache.insert(hash, location);
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }

        pb.finish_and_clear();
        tracing::info!(
            lookups = cache.lookups(),
            resolved = cache.resolved(),
            "block locations resolved"
        );
        Ok(())
    }
}
