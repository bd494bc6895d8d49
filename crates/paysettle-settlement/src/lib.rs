//! Paysettle Settlement Layer
//!
//! Adapters that talk to external settlement rails (card processors,
//! account-model explorers, UTXO indexers) and the registries that map a
//! payment's rail binding onto a concrete adapter.

pub mod adapters;
pub mod amount;
pub mod error;
pub mod poll;
pub mod registry;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SettlementError;
pub use poll::{ConfirmationPoller, PollState};
pub use registry::{ChainRegistry, FiatRegistry};
pub use traits::{ChainIndexer, FiatAccounts, FiatRail};
pub use types::{
    AccountLink, Card, ChargeOutcome, ChargeRequest, ChargeStatus, ConnectedAccount,
    ContinuationOutcome, CryptoLookup, Customer, Transfer,
};

pub use tokio_util::sync::CancellationToken;
