//! TonAPI HTTP client for paging through an account's transaction history.
//!
//! Pages backward by logical time using the `before_lt` cursor. Transient
//! failures are retried with exponential backoff; pages are not checked for
//! gaps.

use std::time::Duration;

use eyre::{eyre, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::Value;

use crate::types::RawTransaction;

/// Default public endpoint.
pub const DEFAULT_BASE_URL: &str = "https://tonapi.io";

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paging parameters for [`TonApiClient::fetch_pages`].
#[derive(Clone, Debug)]
pub struct PageOptions {
    /// Transactions per page.
    pub limit: u32,
    /// Maximum number of pages.
    pub pages: u32,
    /// Start strictly below this logical time.
    pub before_lt: Option<u64>,
    /// Stop once a page reaches transactions older than this unix time.
    pub cutoff_utime: Option<u64>,
    /// Pause between pages.
    pub sleep: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            pages: 20,
            before_lt: None,
            cutoff_utime: None,
            sleep: Duration::ZERO,
        }
    }
}

#[derive(Deserialize)]
struct TransactionsPage {
    #[serde(default)]
    transactions: Vec<Value>,
}

/// Thin async client over the TonAPI v2 blockchain endpoints.
#[derive(Clone, Debug)]
pub struct TonApiClient {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl TonApiClient {
    /// Creates a client for `base_url` with an optional bearer key.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    /// Creates a client from `TON_API_BASE_URL` / `TON_API_KEY`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("TON_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(&base_url, std::env::var("TON_API_KEY").ok())
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.get(url).header("Accept", "application/json");
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Fetches one page of account transactions, newest first.
    ///
    /// Transport failures, rejected statuses and undecodable pages are all
    /// retried. Transactions that fail to deserialize are skipped.
    ///
    /// # Errors
    /// Returns error once all retry attempts fail.
    #[tracing::instrument(skip(self), fields(account = %account))]
    pub async fn fetch_page(
        &self,
        account: &str,
        limit: u32,
        before_lt: Option<u64>,
    ) -> Result<Vec<RawTransaction>> {
        let path = format!("/v2/blockchain/accounts/{account}/transactions");
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(lt) = before_lt {
            query.push(("before_lt", lt.to_string()));
        }

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = BACKOFF_BASE * 2_u32.pow(attempt - 1);
                tracing::warn!(attempt, ?backoff, "retrying transactions page");
                tokio::time::sleep(backoff).await;
            }

            let response = match self.get(&path).query(&query).send().await {
                Ok(resp) => resp,
                Err(err) => {
                    last_err = Some(eyre!(err).wrap_err("transactions request failed"));
                    continue;
                }
            };

            let response = match response.error_for_status() {
                Ok(resp) => resp,
                Err(err) => {
                    last_err = Some(eyre!(err).wrap_err("transactions request rejected"));
                    continue;
                }
            };

            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    last_err = Some(eyre!(err).wrap_err("transactions body unreadable"));
                    continue;
                }
            };
            match decode_page(&body) {
                Ok(txs) => return Ok(txs),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| eyre!("transactions request failed")))
    }

    /// Pages backward through account history.
    ///
    /// Stops on an empty page, on a short page, after `pages` pages, or once
    /// the oldest transaction of a page is older than `cutoff_utime`. Zero
    /// pages fetches nothing.
    ///
    /// # Errors
    /// Returns error if a page cannot be fetched.
    #[tracing::instrument(skip(self, opts), fields(account = %account, pages = opts.pages))]
    pub async fn fetch_pages(
        &self,
        account: &str,
        opts: &PageOptions,
    ) -> Result<Vec<RawTransaction>> {
        if opts.pages == 0 {
            tracing::info!(account = %account, "page budget is zero; nothing fetched");
            return Ok(Vec::new());
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} {pos} pages / {msg}")
                .wrap_err("invalid progress bar template")?,
        );

        let mut all = Vec::new();
        let mut cursor = opts.before_lt;
        for page_index in 0..opts.pages {
            let txs = self.fetch_page(account, opts.limit, cursor).await?;
            spinner.inc(1);
            if txs.is_empty() {
                break;
            }

            let page_len = txs.len();
            let oldest_utime = txs.iter().map(|tx| tx.utime).filter(|t| *t > 0).min();
            let oldest_lt = txs.iter().map(|tx| tx.lt).filter(|lt| *lt > 0).min();
            all.extend(txs);
            spinner.set_message(format!("{} txs", all.len()));

            if let (Some(cutoff), Some(oldest)) = (opts.cutoff_utime, oldest_utime) {
                if oldest < cutoff {
                    tracing::debug!(page_index, oldest, cutoff, "reached utime cutoff");
                    break;
                }
            }
            if page_len < opts.limit as usize {
                break;
            }
            match oldest_lt {
                Some(lt) => cursor = Some(lt - 1),
                None => break,
            }
            if !opts.sleep.is_zero() {
                tokio::time::sleep(opts.sleep).await;
            }
        }

        spinner.finish_with_message(format!("{} txs", all.len()));
        tracing::info!(account = %account, txs = all.len(), "account history fetched");
        Ok(all)
    }
}

/// Decodes a transactions page body, skipping transactions that do not parse.
///
/// # Errors
/// Returns error if the body is not a transactions page.
pub fn decode_page(body: &str) -> Result<Vec<RawTransaction>> {
    let page: TransactionsPage =
        serde_json::from_str(body).wrap_err("failed to decode transactions page")?;

    let txs = page
        .transactions
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawTransaction>(value) {
            Ok(tx) => Some(tx),
            Err(err) => {
                tracing::debug!(error = %err, "skipping undecodable transaction");
                None
            }
        })
        .collect();
    Ok(txs)
}
