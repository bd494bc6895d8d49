//! Account-model chains behind an Etherscan-style explorer.
//!
//! The explorer's token-transfer history for the configured contract address
//! is scanned for the deposit's hash. A transfer only counts once it has at
//! least `min_depth` confirmations; until then the lookup is retried by the
//! [`ConfirmationPoller`].

use async_trait::async_trait;
use chrono::DateTime;
use paysettle_core::config::{ChainConfig, ConfirmationConfig, TokenConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{http_client, read_json};
use crate::amount::scale_token_amount;
use crate::error::SettlementError;
use crate::poll::{ConfirmationPoller, PollState};
use crate::traits::ChainIndexer;
use crate::types::CryptoLookup;

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

/// One row of the explorer's `tokentx` listing. Every field is a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TokenTransfer {
    block_number: String,
    time_stamp: String,
    hash: String,
    from: String,
    to: String,
    contract_address: String,
    value: String,
    token_symbol: String,
    token_decimal: String,
    confirmations: String,
}

impl TokenTransfer {
    fn depth(&self) -> u64 {
        self.confirmations.trim().parse().unwrap_or(0)
    }
}

pub struct EvmIndexer {
    config: ChainConfig,
    client: reqwest::Client,
    poller: ConfirmationPoller,
    min_depth: u64,
}

impl EvmIndexer {
    pub fn new(config: ChainConfig, confirmation: &ConfirmationConfig) -> Result<Self, SettlementError> {
        let client = http_client(&config.name, config.timeout_secs)?;
        tracing::debug!(
            chain = %config.name,
            mode = ?config.mode,
            min_depth = confirmation.min_depth,
            "EVM indexer configured"
        );
        Ok(Self {
            config,
            client,
            poller: ConfirmationPoller::from_config(confirmation),
            min_depth: confirmation.min_depth,
        })
    }

    /// Fetch the transfer history and pick the row for `tx_hash` and `token`.
    async fn find_row(
        &self,
        tx_hash: &str,
        token: &TokenConfig,
    ) -> Result<Option<(TokenTransfer, Value)>, SettlementError> {
        let name = &self.config.name;
        let address = if self.config.contract_address.is_empty() {
            token.address.as_str()
        } else {
            self.config.contract_address.as_str()
        };

        let response = self
            .client
            .get(&self.config.explorer)
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("address", address),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SettlementError::http(name, tx_hash, e))?;
        let body: ExplorerResponse = serde_json::from_value(read_json(name, tx_hash, response).await?)
            .map_err(|e| SettlementError::decode(name, tx_hash, e))?;

        let rows = match body.result {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => {
                return Err(SettlementError::external(
                    name,
                    tx_hash,
                    format!(
                        "explorer status {} ({}): {}",
                        body.status,
                        body.message,
                        other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string())
                    ),
                ))
            }
        };

        for raw in rows {
            let row: TokenTransfer = serde_json::from_value(raw.clone())
                .map_err(|e| SettlementError::decode(name, tx_hash, e))?;
            let same_hash = row.hash.eq_ignore_ascii_case(tx_hash);
            let same_token = row.contract_address.is_empty()
                || row.contract_address.eq_ignore_ascii_case(&token.address);
            // History for a merchant address also lists its outgoing transfers.
            let to_merchant = self.config.contract_address.is_empty()
                || row.to.eq_ignore_ascii_case(address);
            if same_hash && same_token && to_merchant {
                return Ok(Some((row, raw)));
            }
        }
        Ok(None)
    }

    async fn check(
        &self,
        tx_hash: &str,
        token: &TokenConfig,
    ) -> Result<PollState<(TokenTransfer, Value)>, SettlementError> {
        Ok(match self.find_row(tx_hash, token).await? {
            None => PollState::Pending { depth: None },
            Some((row, raw)) => {
                let depth = row.depth();
                if depth >= self.min_depth {
                    PollState::Ready((row, raw))
                } else {
                    PollState::Pending { depth: Some(depth) }
                }
            }
        })
    }
}

#[async_trait]
impl ChainIndexer for EvmIndexer {
    async fn lookup(
        &self,
        tx_hash: &str,
        token: &TokenConfig,
        cancel: &CancellationToken,
    ) -> Result<CryptoLookup, SettlementError> {
        let (row, raw) = self
            .poller
            .run(&self.config.name, tx_hash, cancel, |_| self.check(tx_hash, token))
            .await?;

        let decimals = row.token_decimal.trim().parse().unwrap_or(token.decimals);
        let amount = scale_token_amount(&row.value, decimals)?;
        let timestamp = row
            .time_stamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        tracing::info!(
            chain = %self.config.name,
            tx_hash = %tx_hash,
            token = %token.symbol,
            amount = %amount,
            confirmations = row.depth(),
            "Token transfer confirmed"
        );

        Ok(CryptoLookup {
            tx_hash: tx_hash.to_string(),
            amount,
            from: row.from,
            to: row.to,
            token: token.clone(),
            confirmed: true,
            timestamp,
            raw,
        })
    }

    fn chain_name(&self) -> &str {
        &self.config.name
    }

    fn tokens(&self) -> &[TokenConfig] {
        &self.config.tokens
    }
}
