use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::error::CoreError;
use crate::state_machine::{TransactionEvent, TransactionStateMachine};
use crate::store::PaymentStore;
use crate::types::{NewTransaction, Transaction, TransactionStatus};

/// Append-only record of settlement attempts.
///
/// Every operation writes through to the store and replaces the caller's
/// copy with the persisted row. Terminal entries reject further events.
#[derive(Clone)]
pub struct TransactionLedger {
    store: Arc<dyn PaymentStore>,
}

impl TransactionLedger {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// Insert a new `PENDING` entry.
    pub async fn create(&self, new: NewTransaction) -> Result<Transaction, CoreError> {
        let tx = self.store.insert_transaction(&new).await?;
        tracing::info!(
            transaction_id = %tx.id,
            payment_id = %tx.payment_id,
            amount = %tx.amount,
            "ledger entry created"
        );
        Ok(tx)
    }

    pub async fn verify(
        &self,
        tx: &mut Transaction,
        external_ref: Option<String>,
        meta: Value,
    ) -> Result<(), CoreError> {
        self.apply(tx, TransactionEvent::Verified, external_ref, meta)
            .await
    }

    pub async fn cancel(&self, tx: &mut Transaction, meta: Value) -> Result<(), CoreError> {
        self.apply(tx, TransactionEvent::Canceled, None, meta).await
    }

    /// Park the entry while the rail waits for step-up authentication.
    pub async fn mark_action_required(
        &self,
        tx: &mut Transaction,
        external_ref: Option<String>,
        meta: Value,
    ) -> Result<(), CoreError> {
        self.apply(tx, TransactionEvent::ActionRequired, external_ref, meta)
            .await
    }

    async fn apply(
        &self,
        tx: &mut Transaction,
        event: TransactionEvent,
        external_ref: Option<String>,
        meta: Value,
    ) -> Result<(), CoreError> {
        let from = tx.status;
        let next = TransactionStateMachine::transition(from, event)?;

        let mut updated = tx.clone();
        updated.status = next;
        if external_ref.is_some() {
            updated.external_ref = external_ref;
        }
        merge_meta(&mut updated.meta, meta);
        match next {
            TransactionStatus::Verified => updated.verified_at = Some(Utc::now()),
            TransactionStatus::Canceled => updated.canceled_at = Some(Utc::now()),
            _ => {}
        }

        *tx = self.store.update_transaction(&updated).await?;
        if next == TransactionStatus::Canceled {
            tracing::warn!(transaction_id = %tx.id, from = %from, to = %next, "ledger entry canceled");
        } else {
            tracing::info!(transaction_id = %tx.id, from = %from, to = %next, "ledger entry updated");
        }
        Ok(())
    }
}

/// Merge `patch` into `target` key by key. Non-object values replace `target`,
/// except `null`, which leaves it alone.
pub fn merge_meta(target: &mut Value, patch: Value) {
    match (target, patch) {
        (_, Value::Null) => {}
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}
