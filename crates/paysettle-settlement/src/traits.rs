use async_trait::async_trait;
use paysettle_core::config::TokenConfig;
use tokio_util::sync::CancellationToken;

use crate::error::SettlementError;
use crate::types::{
    AccountLink, Card, ChargeOutcome, ChargeRequest, ConnectedAccount, ContinuationOutcome,
    CryptoLookup, Customer,
};

/// Card-rail adapter interface.
///
/// Each implementation owns its credentials; nothing is shared between
/// instances.
#[async_trait]
pub trait FiatRail: Send + Sync {
    /// Charge the payer's stored instrument.
    ///
    /// Returns `Confirmed` only for an explicit success and `RequiresAction`
    /// only for an explicit step-up demand; any other processor state is an
    /// error.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, SettlementError>;

    /// Re-fetch a charge that was waiting on step-up authentication.
    async fn get_continuation(&self, token: &str) -> Result<ContinuationOutcome, SettlementError>;

    /// Service name payments bind to (e.g. "stripe-us").
    fn service_name(&self) -> &str;
}

/// Customer, card and connected-account management on a card rail.
///
/// `FiatRail::charge` bills the card stored here for the payer, and transfer
/// splits are routed to accounts onboarded here.
#[async_trait]
pub trait FiatAccounts: Send + Sync {
    async fn add_customer(&self, email: &str) -> Result<Customer, SettlementError>;

    /// Store the tokenized card for `customer` and make it the default
    /// instrument.
    async fn attach_card(&self, customer: &str, card_token: &str)
        -> Result<Card, SettlementError>;

    async fn list_cards(&self, customer: &str) -> Result<Vec<Card>, SettlementError>;

    async fn delete_card(&self, card_id: &str) -> Result<(), SettlementError>;

    /// Open an express account able to take card payments and transfers.
    /// Payouts are left on a manual schedule.
    async fn create_account(&self, country: &str) -> Result<ConnectedAccount, SettlementError>;

    /// Onboarding link; `redirect_url` serves as both return and refresh URL.
    async fn create_account_link(
        &self,
        account_id: &str,
        redirect_url: &str,
    ) -> Result<AccountLink, SettlementError>;

    async fn fetch_account(&self, account_id: &str) -> Result<ConnectedAccount, SettlementError>;
}

/// Blockchain lookup interface.
#[async_trait]
pub trait ChainIndexer: Send + Sync {
    /// Find the transfer of `token` made in `tx_hash`.
    ///
    /// Implementations that wait for confirmation depth must stop as soon as
    /// `cancel` fires.
    async fn lookup(
        &self,
        tx_hash: &str,
        token: &TokenConfig,
        cancel: &CancellationToken,
    ) -> Result<CryptoLookup, SettlementError>;

    fn chain_name(&self) -> &str;

    /// Tokens accepted on this chain.
    fn tokens(&self) -> &[TokenConfig];
}
