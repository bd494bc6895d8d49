use chrono::{DateTime, Utc};
use paysettle_core::config::TokenConfig;
use paysettle_core::types::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Part of a charge routed to a connected destination account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub destination: String,
    /// Major units forwarded to `destination`.
    pub amount: Decimal,
}

/// A card-rail charge, amounts in major units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Processor-side customer the stored card belongs to.
    pub payer_account: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub transfer: Option<Transfer>,
}

impl ChargeRequest {
    /// Platform share kept when part of the charge is transferred.
    pub fn platform_fee(&self) -> Option<Decimal> {
        self.transfer.as_ref().map(|t| self.amount - t.amount)
    }
}

/// How the card rail left a charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChargeStatus {
    Confirmed,
    /// Step-up authentication pending; `token` resumes the flow.
    RequiresAction { token: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeOutcome {
    /// Processor id of the charge (payment intent id).
    pub external_id: String,
    /// Charged amount in minor units as reported by the processor.
    pub amount_minor: i64,
    pub currency: String,
    pub status: ChargeStatus,
    /// Raw provider payload.
    pub raw: Value,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationOutcome {
    pub external_id: String,
    /// True only when the processor reports the charge as succeeded.
    pub confirmed: bool,
    /// Processor status string at the time of the query.
    pub status: String,
    pub raw: Value,
}

/// A token transfer found on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoLookup {
    pub tx_hash: String,
    /// Amount already scaled by the token's decimals.
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub token: TokenConfig,
    pub confirmed: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw: Value,
}

/// A processor-side customer that stored cards belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub raw: Value,
}

/// A card instrument stored for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub customer: Option<String>,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub raw: Value,
}

/// A connected account that transfers can be routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub country: Option<String>,
    /// Whether the account may receive card payments yet.
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    /// Whether the owner finished onboarding.
    pub details_submitted: bool,
    pub raw: Value,
}

/// Hosted onboarding link for a connected account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountLink {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub raw: Value,
}
