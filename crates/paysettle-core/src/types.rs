use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    /// Create a new random payment ID (UUID v7, time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currencies accepted by the card rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::JPY => "JPY",
        }
    }

    /// Minor-unit exponent (2 for cents, 0 for yen).
    pub fn decimals(&self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "JPY" => Some(Self::JPY),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The settlement channel a payment is funded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rail {
    Fiat,
    Crypto,
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fiat => write!(f, "FIAT"),
            Self::Crypto => write!(f, "CRYPTO"),
        }
    }
}

/// Rail-specific binding, written once per payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RailBinding {
    Fiat {
        service_name: String,
    },
    Crypto {
        token_address: String,
        rate: Decimal,
    },
}

impl RailBinding {
    pub fn rail(&self) -> Rail {
        match self {
            Self::Fiat { .. } => Rail::Fiat,
            Self::Crypto { .. } => Rail::Crypto,
        }
    }

    /// Whether `other` binds the same rail to the same target.
    ///
    /// Token addresses compare case-insensitively (EVM checksum casing).
    pub fn matches(&self, other: &RailBinding) -> bool {
        match (self, other) {
            (Self::Fiat { service_name: a }, Self::Fiat { service_name: b }) => a == b,
            (
                Self::Crypto {
                    token_address: a,
                    rate: ra,
                },
                Self::Crypto {
                    token_address: b,
                    rate: rb,
                },
            ) => a.eq_ignore_ascii_case(b) && ra == rb,
            _ => false,
        }
    }
}

impl fmt::Display for RailBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fiat { service_name } => write!(f, "FIAT({})", service_name),
            Self::Crypto {
                token_address,
                rate,
            } => write!(f, "CRYPTO({} @ {})", token_address, rate),
        }
    }
}

/// Lifecycle status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Deposited,
    OnHold,
    PaidOut,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    /// Whether a fresh deposit attempt may start from this status.
    pub fn accepts_deposit(&self) -> bool {
        matches!(self, Self::Initiated)
    }

    /// Whether funds have already moved (or the payment was abandoned).
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Deposited | Self::PaidOut | Self::Canceled | Self::Refunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "INITIATED",
            Self::Deposited => "DEPOSITED",
            Self::OnHold => "ON_HOLD",
            Self::PaidOut => "PAID_OUT",
            Self::Canceled => "CANCELED",
            Self::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

/// Outcome status of a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Verified,
    Canceled,
    ActionRequired,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Canceled)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Canceled => "CANCELED",
            Self::ActionRequired => "ACTION_REQUIRED",
        };
        f.write_str(s)
    }
}

/// Kind of ledger entry. Settlement only ever records incoming deposits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
        }
    }
}

/// A unit of money owed or received, together with its parties and ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub tag: String,
    pub description: String,
    /// Idempotency key.
    pub unique_ref: String,
    pub total_amount: Decimal,
    pub currency: Currency,
    /// Write-once rail binding.
    pub rail: Option<RailBinding>,
    pub meta: Value,
    pub status: PaymentStatus,
    /// Mirrors the outcome of the most recent ledger entry.
    pub transaction_status: Option<TransactionStatus>,
    /// Step-up continuation token returned by the card rail.
    pub continuation_token: Option<String>,
    /// Optimistic concurrency counter, bumped by the store on every write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub identities: Vec<PaymentIdentity>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Payment {
    /// Build a fresh `INITIATED` row from creation parameters.
    pub fn new(params: &PaymentParams, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            tag: params.tag.clone(),
            description: params.description.clone(),
            unique_ref: params.unique_ref.clone(),
            total_amount: params.total_amount,
            currency: params.currency,
            rail: None,
            meta: params.meta.clone(),
            status: PaymentStatus::Initiated,
            transaction_status: None,
            continuation_token: None,
            version: 0,
            created_at: now,
            updated_at: now,
            identities: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// The primary payer (first identity attached).
    pub fn payer(&self) -> Option<&PaymentIdentity> {
        self.identities.first()
    }

    /// The transfer destination (second identity attached), if any.
    pub fn transfer_party(&self) -> Option<&PaymentIdentity> {
        self.identities.get(1)
    }

    pub fn latest_transaction(&self) -> Option<&Transaction> {
        self.transactions.last()
    }

    /// Replace the row fields with a freshly persisted row, keeping the
    /// loaded identity and transaction lists.
    pub fn absorb_row(&mut self, mut row: Payment) {
        row.identities = std::mem::take(&mut self.identities);
        row.transactions = std::mem::take(&mut self.transactions);
        *self = row;
    }
}

/// A party participating in a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIdentity {
    pub id: Uuid,
    pub payment_id: PaymentId,
    /// External identity reference.
    pub identity_id: Uuid,
    pub role_name: String,
    /// Rail-specific account: card customer, connected account or wallet.
    pub account: String,
    pub allocated_amount: Decimal,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

/// One append-only settlement attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub payment_id: PaymentId,
    /// Row id of the [`PaymentIdentity`] that funded this attempt.
    pub identity_id: Uuid,
    /// Rail-issued reference (payment intent id, chain tx hash).
    pub external_ref: Option<String>,
    pub tag: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub discount: Decimal,
    pub status: TransactionStatus,
    pub meta: Value,
    pub canceled_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating (or re-submitting) a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentParams {
    pub tag: String,
    pub description: String,
    pub unique_ref: String,
    pub currency: Currency,
    pub total_amount: Decimal,
    #[serde(default)]
    pub meta: Value,
}

/// Parameters for attaching an identity to a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityParams {
    pub identity_id: Uuid,
    pub role_name: String,
    pub account: String,
    pub amount: Decimal,
    #[serde(default)]
    pub meta: Value,
}

/// Insert payload for a new `PENDING` ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub payment_id: PaymentId,
    pub identity_id: Uuid,
    pub external_ref: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub fee: Decimal,
    pub discount: Decimal,
    pub meta: Value,
}
