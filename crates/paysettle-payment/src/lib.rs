//! Paysettle Payments
//!
//! The payment aggregate and the reconciliation controller that applies
//! card-rail and chain outcomes to the ledger and to the payment's status.

pub mod aggregate;
pub mod controller;
pub mod error;
pub mod service;


pub use aggregate::PaymentAggregate;
pub use controller::{Reconciliation, ReconciliationController};
pub use error::PaymentError;
pub use service::PaymentService;
