use std::collections::HashMap;
use std::sync::Arc;

use paysettle_core::config::{ChainKind, FiatServiceKind, SettlementConfig, TokenConfig};
use tokio_util::sync::CancellationToken;

use crate::adapters::cardano::CardanoIndexer;
use crate::adapters::evm::EvmIndexer;
use crate::adapters::stripe::StripeRail;
use crate::error::SettlementError;
use crate::traits::{ChainIndexer, FiatAccounts, FiatRail};
use crate::types::CryptoLookup;

/// Card-rail adapters keyed by service name, plus the account management
/// side of those services that offer one.
#[derive(Default)]
pub struct FiatRegistry {
    services: HashMap<String, Arc<dyn FiatRail>>,
    accounts: HashMap<String, Arc<dyn FiatAccounts>>,
}

impl FiatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its `service_name()`, replacing any previous one.
    pub fn register(&mut self, rail: Arc<dyn FiatRail>) {
        let name = rail.service_name().to_string();
        tracing::info!(service = %name, "Registering fiat rail");
        self.services.insert(name, rail);
    }

    /// Register an adapter that also manages customers and connected accounts.
    pub fn register_with_accounts<T>(&mut self, rail: Arc<T>)
    where
        T: FiatRail + FiatAccounts + 'static,
    {
        self.accounts
            .insert(rail.service_name().to_string(), rail.clone());
        self.register(rail);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn FiatRail>, SettlementError> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| SettlementError::AdapterNotFound(name.to_string()))
    }

    /// Customer and account management for `name`.
    pub fn accounts(&self, name: &str) -> Result<Arc<dyn FiatAccounts>, SettlementError> {
        self.accounts
            .get(name)
            .cloned()
            .ok_or_else(|| SettlementError::AdapterNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Chain indexers, searched in registration order when resolving a token.
#[derive(Default)]
pub struct ChainRegistry {
    chains: Vec<Arc<dyn ChainIndexer>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, indexer: Arc<dyn ChainIndexer>) {
        tracing::info!(
            chain = %indexer.chain_name(),
            tokens = indexer.tokens().len(),
            "Registering chain indexer"
        );
        self.chains.push(indexer);
    }

    /// Find the chain that accepts `token_address` (case-insensitive).
    pub fn resolve(
        &self,
        token_address: &str,
    ) -> Result<(Arc<dyn ChainIndexer>, TokenConfig), SettlementError> {
        self.chains
            .iter()
            .find_map(|chain| {
                chain
                    .tokens()
                    .iter()
                    .find(|t| t.address.eq_ignore_ascii_case(token_address))
                    .map(|t| (chain.clone(), t.clone()))
            })
            .ok_or_else(|| SettlementError::TokenNotFound(token_address.to_string()))
    }

    /// Resolve the token, then look the transfer up on its chain.
    pub async fn lookup(
        &self,
        tx_hash: &str,
        token_address: &str,
        cancel: &CancellationToken,
    ) -> Result<CryptoLookup, SettlementError> {
        let (chain, token) = self.resolve(token_address)?;
        tracing::debug!(
            chain = %chain.chain_name(),
            token = %token.symbol,
            tx_hash = %tx_hash,
            "Looking up crypto transfer"
        );
        chain.lookup(tx_hash, &token, cancel).await
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chains
            .iter()
            .map(|c| c.chain_name().to_string())
            .collect()
    }
}

/// Build both registries from configuration.
pub fn build(config: &SettlementConfig) -> Result<(FiatRegistry, ChainRegistry), SettlementError> {
    let mut fiat = FiatRegistry::new();
    for service in &config.fiat {
        match service.kind {
            FiatServiceKind::Stripe => {
                fiat.register_with_accounts(Arc::new(StripeRail::new(service.clone())?))
            }
        }
    }

    let mut chains = ChainRegistry::new();
    for chain in &config.chains {
        match chain.kind {
            ChainKind::Evm => chains.register(Arc::new(EvmIndexer::new(
                chain.clone(),
                &config.confirmation,
            )?)),
            ChainKind::Cardano => chains.register(Arc::new(CardanoIndexer::new(chain.clone())?)),
        }
    }

    Ok((fiat, chains))
}
