//! Persistence contract and the in-memory store.
//!
//! Every insert and update returns the complete resulting row. Payment rows
//! come back without their identity and transaction lists; those are loaded
//! through the keyed list queries.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{
    IdentityParams, NewTransaction, Payment, PaymentId, PaymentIdentity, PaymentParams,
    Transaction, TransactionId, TransactionStatus,
};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a payment, or overwrite the descriptive fields of the row that
    /// already owns `params.unique_ref`.
    async fn upsert_payment(&self, params: &PaymentParams) -> Result<Payment, CoreError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, CoreError>;

    async fn get_payment_by_ref(&self, unique_ref: &str) -> Result<Option<Payment>, CoreError>;

    /// Persist the row fields of `payment`. Fails with
    /// [`CoreError::VersionConflict`] when the stored version differs.
    async fn update_payment(&self, payment: &Payment) -> Result<Payment, CoreError>;

    async fn insert_identity(
        &self,
        payment_id: PaymentId,
        params: &IdentityParams,
    ) -> Result<PaymentIdentity, CoreError>;

    /// Identities in attachment order.
    async fn list_identities(&self, payment_id: PaymentId)
        -> Result<Vec<PaymentIdentity>, CoreError>;

    async fn insert_transaction(&self, tx: &NewTransaction) -> Result<Transaction, CoreError>;

    /// Persist a transaction. Rows already in a terminal status are immutable,
    /// and at most one transaction may be `VERIFIED` for a given external
    /// reference (compared case-insensitively); a second one fails with
    /// [`CoreError::DuplicateReference`].
    async fn update_transaction(&self, tx: &Transaction) -> Result<Transaction, CoreError>;

    /// Transactions in creation order.
    async fn list_transactions(&self, payment_id: PaymentId)
        -> Result<Vec<Transaction>, CoreError>;

    /// Any transaction, across all payments, carrying `external_ref` with the given status.
    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, CoreError>;
}

/// Thread-safe in-memory store backed by `DashMap`.
///
/// Child rows are kept per payment in insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    payments: DashMap<PaymentId, Payment>,
    refs: DashMap<String, PaymentId>,
    identities: DashMap<PaymentId, Vec<PaymentIdentity>>,
    transactions: DashMap<PaymentId, Vec<Transaction>>,
    /// Lowercased external reference to the transaction verified under it.
    verified_refs: DashMap<String, TransactionId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    fn ensure_payment(&self, payment_id: PaymentId) -> Result<(), CoreError> {
        if self.payments.contains_key(&payment_id) {
            Ok(())
        } else {
            Err(CoreError::Persistence(format!(
                "foreign key violation: payment {} does not exist",
                payment_id
            )))
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn upsert_payment(&self, params: &PaymentParams) -> Result<Payment, CoreError> {
        let now = Utc::now();
        match self.refs.entry(params.unique_ref.clone()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let mut row = self.payments.get_mut(&id).ok_or_else(|| {
                    CoreError::Persistence(format!(
                        "unique_ref {} points at missing payment {}",
                        params.unique_ref, id
                    ))
                })?;
                row.tag = params.tag.clone();
                row.description = params.description.clone();
                row.total_amount = params.total_amount;
                row.currency = params.currency;
                row.meta = params.meta.clone();
                row.version += 1;
                row.updated_at = now;
                Ok(row.clone())
            }
            Entry::Vacant(entry) => {
                let payment = Payment::new(params, now);
                self.payments.insert(payment.id, payment.clone());
                entry.insert(payment.id);
                Ok(payment)
            }
        }
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, CoreError> {
        Ok(self.payments.get(&id).map(|p| p.clone()))
    }

    async fn get_payment_by_ref(&self, unique_ref: &str) -> Result<Option<Payment>, CoreError> {
        let id = match self.refs.get(unique_ref) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_payment(id).await
    }

    async fn update_payment(&self, payment: &Payment) -> Result<Payment, CoreError> {
        let mut stored = self
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment.id)))?;

        if stored.version != payment.version {
            return Err(CoreError::VersionConflict {
                id: payment.id,
                expected: payment.version,
                found: stored.version,
            });
        }

        let mut row = payment.clone();
        row.identities.clear();
        row.transactions.clear();
        row.unique_ref = stored.unique_ref.clone();
        row.created_at = stored.created_at;
        row.version = stored.version + 1;
        row.updated_at = Utc::now();
        *stored = row.clone();
        Ok(row)
    }

    async fn insert_identity(
        &self,
        payment_id: PaymentId,
        params: &IdentityParams,
    ) -> Result<PaymentIdentity, CoreError> {
        self.ensure_payment(payment_id)?;
        let identity = PaymentIdentity {
            id: Uuid::now_v7(),
            payment_id,
            identity_id: params.identity_id,
            role_name: params.role_name.clone(),
            account: params.account.clone(),
            allocated_amount: params.amount,
            meta: params.meta.clone(),
            created_at: Utc::now(),
        };
        self.identities
            .entry(payment_id)
            .or_default()
            .push(identity.clone());
        Ok(identity)
    }

    async fn list_identities(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentIdentity>, CoreError> {
        Ok(self
            .identities
            .get(&payment_id)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }

    async fn insert_transaction(&self, tx: &NewTransaction) -> Result<Transaction, CoreError> {
        self.ensure_payment(tx.payment_id)?;
        let row = Transaction {
            id: TransactionId::new(),
            payment_id: tx.payment_id,
            identity_id: tx.identity_id,
            external_ref: tx.external_ref.clone(),
            tag: tx.kind.to_string(),
            kind: tx.kind,
            amount: tx.amount,
            fee: tx.fee,
            discount: tx.discount,
            status: TransactionStatus::Pending,
            meta: tx.meta.clone(),
            canceled_at: None,
            verified_at: None,
            created_at: Utc::now(),
        };
        self.transactions
            .entry(tx.payment_id)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update_transaction(&self, tx: &Transaction) -> Result<Transaction, CoreError> {
        let mut rows = self
            .transactions
            .get_mut(&tx.payment_id)
            .ok_or_else(|| CoreError::NotFound(format!("transaction {}", tx.id)))?;
        let stored = rows
            .iter_mut()
            .find(|row| row.id == tx.id)
            .ok_or_else(|| CoreError::NotFound(format!("transaction {}", tx.id)))?;

        if stored.status.is_terminal() {
            return Err(CoreError::Persistence(format!(
                "transaction {} is {} and can no longer change",
                tx.id, stored.status
            )));
        }

        if tx.status == TransactionStatus::Verified {
            if let Some(reference) = tx.external_ref.as_deref() {
                match self.verified_refs.entry(reference.to_ascii_lowercase()) {
                    Entry::Occupied(claimed) if *claimed.get() != tx.id => {
                        return Err(CoreError::DuplicateReference {
                            reference: reference.to_string(),
                            existing: *claimed.get(),
                        });
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(tx.id);
                    }
                }
            }
        }

        let mut row = tx.clone();
        row.created_at = stored.created_at;
        *stored = row.clone();
        Ok(row)
    }

    async fn list_transactions(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<Transaction>, CoreError> {
        Ok(self
            .transactions
            .get(&payment_id)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
        status: TransactionStatus,
    ) -> Result<Option<Transaction>, CoreError> {
        for rows in self.transactions.iter() {
            if let Some(tx) = rows.iter().find(|tx| {
                tx.status == status
                    && tx
                        .external_ref
                        .as_deref()
                        .is_some_and(|r| r.eq_ignore_ascii_case(external_ref))
            }) {
                return Ok(Some(tx.clone()));
            }
        }
        Ok(None)
    }
}
