//! Turns one adapter outcome into ledger and payment state.
//!
//! The controller never retries. Every path ends in exactly one of: the
//! entry verified and the payment deposited, the entry parked for step-up
//! with the payment on hold, or the entry canceled with the error in its
//! metadata and the payment status untouched.

use std::sync::Arc;

use paysettle_core::ledger::merge_meta;
use paysettle_core::{
    Payment, PaymentEvent, PaymentStateMachine, PaymentStore, Transaction, TransactionLedger,
};
use paysettle_settlement::{
    CancellationToken, ChainRegistry, ChargeRequest, ChargeStatus, FiatRegistry,
};
use serde_json::{json, Value};

use crate::error::PaymentError;

/// How a settlement attempt left the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Deposited,
    /// The card rail wants step-up authentication; `token` resumes it.
    OnHold { token: String },
}

#[derive(Clone)]
pub struct ReconciliationController {
    fiat: Arc<FiatRegistry>,
    chains: Arc<ChainRegistry>,
    ledger: TransactionLedger,
    store: Arc<dyn PaymentStore>,
}

impl ReconciliationController {
    pub fn new(
        fiat: Arc<FiatRegistry>,
        chains: Arc<ChainRegistry>,
        ledger: TransactionLedger,
        store: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            fiat,
            chains,
            ledger,
            store,
        }
    }

    /// Charge the card rail bound as `service` for a freshly created entry.
    pub async fn settle_fiat(
        &self,
        payment: &mut Payment,
        tx: &mut Transaction,
        service: &str,
        request: &ChargeRequest,
    ) -> Result<Reconciliation, PaymentError> {
        let outcome = match self.fiat.get(service) {
            Ok(rail) => rail.charge(request).await,
            Err(err) => Err(err),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.abandon(payment, tx, err.into(), Value::Null).await),
        };
        let meta = json!({
            "charge": {
                "id": outcome.external_id,
                "amount_minor": outcome.amount_minor,
                "currency": outcome.currency,
                "observed_at": outcome.observed_at,
                "raw": outcome.raw,
            }
        });

        match outcome.status {
            ChargeStatus::RequiresAction { token } => {
                let next =
                    PaymentStateMachine::transition(payment.status, PaymentEvent::StepUpRequired)?;
                self.ledger
                    .mark_action_required(tx, Some(outcome.external_id), meta)
                    .await?;
                payment.status = next;
                payment.transaction_status = Some(tx.status);
                payment.continuation_token = Some(token.clone());
                self.persist(payment).await?;
                tracing::info!(
                    payment_id = %payment.id,
                    transaction_id = %tx.id,
                    service = %service,
                    "Card charge waiting on step-up authentication"
                );
                Ok(Reconciliation::OnHold { token })
            }
            ChargeStatus::Confirmed => {
                self.deposit(payment, tx, Some(outcome.external_id), meta, None)
                    .await?;
                Ok(Reconciliation::Deposited)
            }
        }
    }

    /// Re-query a charge parked for step-up.
    ///
    /// Neither a transport error nor a still-pending charge changes any
    /// state, so the caller may simply retry.
    pub async fn settle_continuation(
        &self,
        payment: &mut Payment,
        tx: &mut Transaction,
        service: &str,
        token: &str,
    ) -> Result<Reconciliation, PaymentError> {
        let outcome = self.fiat.get(service)?.get_continuation(token).await?;
        if let Some(charge) = tx.external_ref.as_deref() {
            if charge != outcome.external_id {
                return Err(PaymentError::validation(format!(
                    "continuation resolves to charge {} but entry {} belongs to charge {}",
                    outcome.external_id, tx.id, charge
                )));
            }
        }
        if !outcome.confirmed {
            tracing::info!(
                payment_id = %payment.id,
                service = %service,
                status = %outcome.status,
                "Step-up charge not confirmed yet"
            );
            return Err(PaymentError::ExternalService {
                rail: service.to_string(),
                reference: outcome.external_id,
                message: format!("charge is not confirmed yet ({})", outcome.status),
            });
        }

        let meta = json!({ "continuation": outcome.raw });
        self.deposit(payment, tx, Some(outcome.external_id), meta, None)
            .await?;
        Ok(Reconciliation::Deposited)
    }

    /// Look up an on-chain transfer for a freshly created entry.
    ///
    /// A shortfall cancels the entry and fails with `AmountMismatch`; the
    /// payment status stays as it was.
    pub async fn settle_crypto(
        &self,
        payment: &mut Payment,
        tx: &mut Transaction,
        token_address: &str,
        tx_hash: &str,
        meta: Value,
        cancel: &CancellationToken,
    ) -> Result<Reconciliation, PaymentError> {
        let lookup = match self.chains.lookup(tx_hash, token_address, cancel).await {
            Ok(lookup) => lookup,
            Err(err) => return Err(self.abandon(payment, tx, err.into(), Value::Null).await),
        };
        let lookup_meta = match serde_json::to_value(&lookup) {
            Ok(value) => json!({ "lookup": value }),
            Err(err) => return Err(self.abandon(payment, tx, err.into(), Value::Null).await),
        };

        if !lookup.confirmed {
            let err = PaymentError::ExternalService {
                rail: lookup.token.symbol.clone(),
                reference: tx_hash.to_string(),
                message: "transfer is not confirmed".into(),
            };
            return Err(self.abandon(payment, tx, err, lookup_meta).await);
        }

        if lookup.amount < tx.amount {
            let err = PaymentError::AmountMismatch {
                expected: tx.amount,
                actual: lookup.amount,
            };
            return Err(self.abandon(payment, tx, err, lookup_meta).await);
        }

        if let Err(err) = self
            .deposit(payment, tx, Some(tx_hash.to_string()), lookup_meta.clone(), Some(meta))
            .await
        {
            // A refused verification leaves the entry open.
            if tx.status.is_terminal() {
                return Err(err);
            }
            return Err(self.abandon(payment, tx, err, lookup_meta).await);
        }
        Ok(Reconciliation::Deposited)
    }

    /// Verify `tx` and move the payment to `DEPOSITED`, replacing its
    /// metadata when `payment_meta` is given.
    async fn deposit(
        &self,
        payment: &mut Payment,
        tx: &mut Transaction,
        external_ref: Option<String>,
        meta: Value,
        payment_meta: Option<Value>,
    ) -> Result<(), PaymentError> {
        let next = PaymentStateMachine::transition(payment.status, PaymentEvent::DepositConfirmed)?;
        self.ledger.verify(tx, external_ref, meta).await?;
        if let Some(payment_meta) = payment_meta {
            payment.meta = payment_meta;
        }
        payment.status = next;
        payment.transaction_status = Some(tx.status);
        payment.continuation_token = None;
        self.persist(payment).await?;
        tracing::info!(
            payment_id = %payment.id,
            transaction_id = %tx.id,
            amount = %tx.amount,
            "Payment deposited"
        );
        Ok(())
    }

    /// Cancel `tx` with `err` and `detail` in its metadata, mirror that on
    /// the payment and hand the error back.
    async fn abandon(
        &self,
        payment: &mut Payment,
        tx: &mut Transaction,
        err: PaymentError,
        detail: Value,
    ) -> PaymentError {
        tracing::warn!(
            payment_id = %payment.id,
            transaction_id = %tx.id,
            error = %err,
            "Settlement attempt failed"
        );

        let mut meta = json!({ "error": err.to_string() });
        merge_meta(&mut meta, detail);
        if let Err(cancel_err) = self.ledger.cancel(tx, meta).await {
            return cancel_err.into();
        }

        payment.transaction_status = Some(tx.status);
        if let Err(persist_err) = self.persist(payment).await {
            return persist_err;
        }
        err
    }

    async fn persist(&self, payment: &mut Payment) -> Result<(), PaymentError> {
        let row = self.store.update_payment(payment).await?;
        payment.absorb_row(row);
        Ok(())
    }
}
