use std::time::Duration;

/// Settlement-layer errors.
///
/// Every variant raised by an adapter names the rail (service or chain) and
/// the reference (customer, intent id, tx hash) of the failed call.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("fiat service not registered: {0}")]
    AdapterNotFound(String),

    #[error("no configured chain accepts token {0}")]
    TokenNotFound(String),

    #[error("{rail}: {reference} not found")]
    NotFound { rail: String, reference: String },

    #[error("{rail}: call for {reference} failed: {message}")]
    ExternalService {
        rail: String,
        reference: String,
        message: String,
    },

    #[error("{rail}: transport error for {reference}: {source}")]
    Http {
        rail: String,
        reference: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{rail}: could not decode response for {reference}: {message}")]
    Decode {
        rail: String,
        reference: String,
        message: String,
    },

    #[error("{rail}: {reference} has {depth} confirmations after {attempts} attempts")]
    Unconfirmed {
        rail: String,
        reference: String,
        depth: u64,
        attempts: u32,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("confirmation wait for {0} was cancelled")]
    Cancelled(String),

    #[error("confirmation wait for {reference} exceeded {waited:?}")]
    DeadlineExceeded { reference: String, waited: Duration },
}

impl SettlementError {
    pub(crate) fn http(rail: &str, reference: &str, source: reqwest::Error) -> Self {
        Self::Http {
            rail: rail.to_string(),
            reference: reference.to_string(),
            source,
        }
    }

    pub(crate) fn decode(rail: &str, reference: &str, message: impl ToString) -> Self {
        Self::Decode {
            rail: rail.to_string(),
            reference: reference.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn external(rail: &str, reference: &str, message: impl ToString) -> Self {
        Self::ExternalService {
            rail: rail.to_string(),
            reference: reference.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn not_found(rail: &str, reference: &str) -> Self {
        Self::NotFound {
            rail: rail.to_string(),
            reference: reference.to_string(),
        }
    }
}
