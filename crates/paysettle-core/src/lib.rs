//! Paysettle Core
//!
//! Data model, status state machines, persistence contract and the
//! append-only transaction ledger shared by the settlement adapters and the
//! payment aggregate.

pub mod config;
pub mod error;
pub mod ledger;
pub mod state_machine;
pub mod store;
pub mod types;

pub use config::SettlementConfig;
pub use error::CoreError;
pub use ledger::TransactionLedger;
pub use state_machine::{
    PaymentEvent, PaymentStateMachine, TransactionEvent, TransactionStateMachine,
};
pub use store::{InMemoryStore, PaymentStore};
pub use types::{
    Currency, IdentityParams, NewTransaction, Payment, PaymentId, PaymentIdentity,
    PaymentParams, PaymentStatus, Rail, RailBinding, Transaction, TransactionId,
    TransactionKind, TransactionStatus,
};
