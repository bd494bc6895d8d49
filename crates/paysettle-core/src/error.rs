use crate::types::{PaymentId, TransactionId};

/// Core errors: validation, state transitions, persistence and configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid {entity} state transition from {from} on {event}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("payment {id} was modified concurrently: expected version {expected}, found {found}")]
    VersionConflict {
        id: PaymentId,
        expected: u64,
        found: u64,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("external reference {reference} is already verified on transaction {existing}")]
    DuplicateReference {
        reference: String,
        existing: TransactionId,
    },

    #[error("configuration io error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("configuration encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),
}
