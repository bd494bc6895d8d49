use paysettle_core::CoreError;
use paysettle_settlement::SettlementError;
use rust_decimal::Decimal;

/// Errors returned by payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("amount mismatch: expected at least {expected}, got {actual}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{rail}: external call for {reference} failed: {message}")]
    ExternalService {
        rail: String,
        reference: String,
        message: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl PaymentError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<CoreError> for PaymentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            e @ CoreError::InvalidStateTransition { .. } => Self::Validation(e.to_string()),
            CoreError::NotFound(what) => Self::NotFound(what),
            e @ CoreError::VersionConflict { .. } => Self::Persistence(e.to_string()),
            CoreError::Persistence(msg) => Self::Persistence(msg),
            e @ CoreError::DuplicateReference { .. } => Self::Validation(e.to_string()),
            e @ (CoreError::ConfigIo(_) | CoreError::ConfigParse(_) | CoreError::ConfigEncode(_)) => {
                Self::Validation(e.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("cannot encode ledger metadata: {}", err))
    }
}

impl From<SettlementError> for PaymentError {
    fn from(err: SettlementError) -> Self {
        match err {
            e @ (SettlementError::AdapterNotFound(_)
            | SettlementError::TokenNotFound(_)
            | SettlementError::InvalidAmount(_)) => Self::Validation(e.to_string()),
            e @ SettlementError::NotFound { .. } => Self::NotFound(e.to_string()),
            SettlementError::ExternalService {
                rail,
                reference,
                message,
            } => Self::ExternalService {
                rail,
                reference,
                message,
            },
            SettlementError::Http {
                rail,
                reference,
                source,
            } => Self::ExternalService {
                rail,
                reference,
                message: source.to_string(),
            },
            SettlementError::Decode {
                rail,
                reference,
                message,
            } => Self::ExternalService {
                rail,
                reference,
                message: format!("undecodable response: {}", message),
            },
            SettlementError::Unconfirmed {
                rail,
                reference,
                depth,
                attempts,
            } => Self::ExternalService {
                rail,
                reference,
                message: format!("only {} confirmations after {} attempts", depth, attempts),
            },
            SettlementError::Cancelled(reference) => Self::ExternalService {
                rail: "crypto".into(),
                reference,
                message: "confirmation wait was cancelled".into(),
            },
            SettlementError::DeadlineExceeded { reference, waited } => Self::ExternalService {
                rail: "crypto".into(),
                reference,
                message: format!("confirmation wait exceeded {:?}", waited),
            },
        }
    }
}
