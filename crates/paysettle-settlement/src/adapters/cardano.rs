//! UTXO chains behind a Blockfrost-style indexer.
//!
//! A transaction the indexer returns is already on chain, so lookups are
//! always reported as confirmed.

use async_trait::async_trait;
use chrono::DateTime;
use paysettle_core::config::{ChainConfig, TokenConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{http_client, read_json};
use crate::amount::scale_token_amount;
use crate::error::SettlementError;
use crate::traits::ChainIndexer;
use crate::types::CryptoLookup;

#[derive(Debug, Deserialize)]
struct TxContent {
    #[serde(default)]
    block: String,
    #[serde(default)]
    block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TxUtxos {
    #[serde(default)]
    inputs: Vec<Utxo>,
    #[serde(default)]
    outputs: Vec<Utxo>,
}

#[derive(Debug, Deserialize)]
struct Utxo {
    address: String,
    #[serde(default)]
    amount: Vec<UnitAmount>,
}

#[derive(Debug, Deserialize)]
struct UnitAmount {
    unit: String,
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(default)]
    time: Option<i64>,
}

impl Utxo {
    fn quantity_of(&self, unit: &str) -> Option<&str> {
        self.amount
            .iter()
            .find(|a| a.unit.eq_ignore_ascii_case(unit))
            .map(|a| a.quantity.as_str())
    }
}

pub struct CardanoIndexer {
    config: ChainConfig,
    client: reqwest::Client,
}

impl CardanoIndexer {
    pub fn new(config: ChainConfig) -> Result<Self, SettlementError> {
        let client = http_client(&config.name, config.timeout_secs)?;
        tracing::debug!(chain = %config.name, mode = ?config.mode, "Cardano indexer configured");
        Ok(Self { config, client })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        reference: &str,
        path: &str,
    ) -> Result<(T, Value), SettlementError> {
        let name = &self.config.name;
        let url = format!("{}{}", self.config.explorer.trim_end_matches('/'), path);
        let response = self
            .client
            .get(url)
            .header("project_id", &self.config.api_key)
            .send()
            .await
            .map_err(|e| SettlementError::http(name, reference, e))?;
        let raw = read_json(name, reference, response).await?;
        let value = serde_json::from_value(raw.clone())
            .map_err(|e| SettlementError::decode(name, reference, e))?;
        Ok((value, raw))
    }

    async fn fetch(&self, tx_hash: &str, token: &TokenConfig) -> Result<CryptoLookup, SettlementError> {
        let name = &self.config.name;
        let (tx, tx_raw): (TxContent, Value) = self.get(tx_hash, &format!("/txs/{}", tx_hash)).await?;
        let (utxos, utxos_raw): (TxUtxos, Value) =
            self.get(tx_hash, &format!("/txs/{}/utxos", tx_hash)).await?;
        let (block, block_raw): (Block, Value) =
            self.get(tx_hash, &format!("/blocks/{}", tx.block)).await?;

        let from = utxos
            .inputs
            .first()
            .map(|u| u.address.clone())
            .ok_or_else(|| SettlementError::decode(name, tx_hash, "transaction has no inputs"))?;

        let unit = token.address.as_str();
        let to = utxos
            .outputs
            .iter()
            .find(|o| o.address != from && o.quantity_of(unit).is_some())
            .map(|o| o.address.clone())
            .ok_or_else(|| SettlementError::not_found(name, &format!("{} ({})", tx_hash, unit)))?;

        let mut total: u128 = 0;
        for quantity in utxos
            .outputs
            .iter()
            .filter(|o| o.address == to)
            .filter_map(|o| o.quantity_of(unit))
        {
            let quantity: u128 = quantity.trim().parse().map_err(|_| {
                SettlementError::InvalidAmount(format!("{}: quantity {:?} of {}", tx_hash, quantity, unit))
            })?;
            total = total.checked_add(quantity).ok_or_else(|| {
                SettlementError::InvalidAmount(format!("{}: {} total overflows", tx_hash, unit))
            })?;
        }
        let amount = scale_token_amount(&total.to_string(), token.decimals)?;

        let timestamp = block
            .time
            .or(tx.block_time)
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        tracing::info!(
            chain = %name,
            tx_hash = %tx_hash,
            token = %token.symbol,
            amount = %amount,
            "UTXO transfer found"
        );

        Ok(CryptoLookup {
            tx_hash: tx_hash.to_string(),
            amount,
            from,
            to,
            token: token.clone(),
            confirmed: true,
            timestamp,
            raw: json!({ "info": tx_raw, "utxos": utxos_raw, "block": block_raw }),
        })
    }
}

#[async_trait]
impl ChainIndexer for CardanoIndexer {
    async fn lookup(
        &self,
        tx_hash: &str,
        token: &TokenConfig,
        cancel: &CancellationToken,
    ) -> Result<CryptoLookup, SettlementError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SettlementError::Cancelled(tx_hash.to_string())),
            result = self.fetch(tx_hash, token) => result,
        }
    }

    fn chain_name(&self) -> &str {
        &self.config.name
    }

    fn tokens(&self) -> &[TokenConfig] {
        &self.config.tokens
    }
}
