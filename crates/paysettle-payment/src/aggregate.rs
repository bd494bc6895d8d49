//! The payment aggregate: the single entry point for mutating one payment.
//!
//! Every mutating operation takes the payment's lock and reloads the row
//! from the store before checking its preconditions, so a handle held for a
//! long time never acts on a stale status. After a settlement attempt the
//! handle is reloaded again and reflects exactly what was persisted.

use std::sync::Arc;

use paysettle_core::{
    IdentityParams, NewTransaction, Payment, PaymentIdentity, PaymentStatus, RailBinding,
    Transaction, TransactionKind, TransactionStatus,
};
use paysettle_settlement::{CancellationToken, ChargeRequest, Transfer};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::controller::Reconciliation;
use crate::error::PaymentError;
use crate::service::ServiceContext;

pub struct PaymentAggregate {
    payment: Payment,
    ctx: Arc<ServiceContext>,
}

impl std::fmt::Debug for PaymentAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentAggregate")
            .field("payment", &self.payment)
            .finish_non_exhaustive()
    }
}

impl PaymentAggregate {
    pub(crate) fn new(payment: Payment, ctx: Arc<ServiceContext>) -> Self {
        Self { payment, ctx }
    }

    /// Current projection: row fields, identities and ledger history.
    pub fn payment(&self) -> &Payment {
        &self.payment
    }

    pub fn into_payment(self) -> Payment {
        self.payment
    }

    /// Reload the projection from the store.
    pub async fn refresh(&mut self) -> Result<(), PaymentError> {
        self.payment = self.ctx.load(self.payment.id).await?;
        Ok(())
    }

    /// Attach a party. The first identity is the payer; a second one is the
    /// transfer destination and receives its allocated amount.
    pub async fn add_identity(
        &mut self,
        params: IdentityParams,
    ) -> Result<PaymentIdentity, PaymentError> {
        let _guard = self.ctx.locks.acquire(self.payment.id).await;
        self.refresh().await?;

        let status = self.payment.status;
        if status.is_settled() || status == PaymentStatus::OnHold {
            return Err(PaymentError::validation(format!(
                "cannot add identities to a {} payment",
                status
            )));
        }
        if params.amount.is_sign_negative() && !params.amount.is_zero() {
            return Err(PaymentError::validation(format!(
                "allocated amount {} must not be negative",
                params.amount
            )));
        }
        if self.payment.identities.len() == 1 && params.amount > self.payment.total_amount {
            return Err(PaymentError::validation(format!(
                "transfer allocation {} exceeds total {}",
                params.amount, self.payment.total_amount
            )));
        }

        let identity = self
            .ctx
            .store
            .insert_identity(self.payment.id, &params)
            .await?;
        tracing::info!(
            payment_id = %self.payment.id,
            identity_id = %identity.identity_id,
            role = %identity.role_name,
            "Identity attached"
        );
        self.payment.identities.push(identity.clone());
        Ok(identity)
    }

    /// Bind the card rail registered as `service_name`.
    pub async fn bind_fiat_rail(&mut self, service_name: &str) -> Result<(), PaymentError> {
        if !self.ctx.fiat.contains(service_name) {
            return Err(PaymentError::validation(format!(
                "fiat service {} is not registered",
                service_name
            )));
        }
        self.bind(RailBinding::Fiat {
            service_name: service_name.to_string(),
        })
        .await
    }

    /// Bind a token known to one of the configured chains.
    pub async fn bind_crypto_rail(
        &mut self,
        token_address: &str,
        rate: Decimal,
    ) -> Result<(), PaymentError> {
        if rate <= Decimal::ZERO {
            return Err(PaymentError::validation(format!(
                "exchange rate {} must be positive",
                rate
            )));
        }
        self.ctx.chains.resolve(token_address)?;
        self.bind(RailBinding::Crypto {
            token_address: token_address.to_string(),
            rate,
        })
        .await
    }

    async fn bind(&mut self, binding: RailBinding) -> Result<(), PaymentError> {
        let _guard = self.ctx.locks.acquire(self.payment.id).await;
        self.refresh().await?;

        match &self.payment.rail {
            Some(existing) if existing.matches(&binding) => return Ok(()),
            Some(existing) => {
                return Err(PaymentError::validation(format!(
                    "payment {} is already bound to {}",
                    self.payment.id, existing
                )))
            }
            None => {}
        }

        self.payment.rail = Some(binding.clone());
        let row = self.ctx.store.update_payment(&self.payment).await?;
        self.payment.absorb_row(row);
        tracing::info!(
            payment_id = %self.payment.id,
            rail = %binding.rail(),
            binding = %binding,
            "Rail bound"
        );
        Ok(())
    }

    /// Charge the payer on the bound card rail.
    pub async fn deposit(&mut self) -> Result<Reconciliation, PaymentError> {
        let _guard = self.ctx.locks.acquire(self.payment.id).await;
        self.refresh().await?;

        let service = match &self.payment.rail {
            Some(RailBinding::Fiat { service_name }) => service_name.clone(),
            _ => return Err(PaymentError::validation("only fiat payments can be deposited")),
        };
        let payer = self
            .payment
            .payer()
            .cloned()
            .ok_or_else(|| PaymentError::validation("assign an identity before depositing"))?;
        self.ensure_accepts_deposit()?;

        let request = ChargeRequest {
            payer_account: payer.account.clone(),
            amount: self.payment.total_amount,
            currency: self.payment.currency,
            description: self.payment.description.clone(),
            transfer: self.payment.transfer_party().map(|party| Transfer {
                destination: party.account.clone(),
                amount: party.allocated_amount,
            }),
        };
        let fee = request.platform_fee().unwrap_or(Decimal::ZERO);
        let request_meta = serde_json::to_value(&request)?;

        let mut tx = self.open_entry(&payer, None, fee, request_meta).await?;
        let outcome = self
            .ctx
            .controller
            .settle_fiat(&mut self.payment, &mut tx, &service, &request)
            .await;
        self.refresh().await?;
        outcome
    }

    /// Resume a card charge that was parked for step-up authentication.
    pub async fn confirm_payment(
        &mut self,
        continuation_token: &str,
    ) -> Result<Reconciliation, PaymentError> {
        let _guard = self.ctx.locks.acquire(self.payment.id).await;
        self.refresh().await?;

        let service = match &self.payment.rail {
            Some(RailBinding::Fiat { service_name }) => service_name.clone(),
            _ => return Err(PaymentError::validation("only fiat payments can be confirmed")),
        };
        if self.payment.status != PaymentStatus::OnHold
            || self.payment.transaction_status != Some(TransactionStatus::ActionRequired)
        {
            return Err(PaymentError::validation(format!(
                "only on-hold payments awaiting action can be confirmed (status {})",
                self.payment.status
            )));
        }
        let mut tx = self
            .payment
            .latest_transaction()
            .cloned()
            .ok_or_else(|| PaymentError::validation("payment has no transaction to confirm"))?;

        let outcome = self
            .ctx
            .controller
            .settle_continuation(&mut self.payment, &mut tx, &service, continuation_token)
            .await;
        self.refresh().await?;
        outcome
    }

    /// Credit an on-chain transfer to this payment, waiting for confirmation
    /// depth where the chain requires it.
    pub async fn confirm_deposit(
        &mut self,
        tx_ref: &str,
        meta: Value,
    ) -> Result<Reconciliation, PaymentError> {
        self.confirm_deposit_with(tx_ref, meta, &CancellationToken::new())
            .await
    }

    /// Like [`confirm_deposit`](Self::confirm_deposit), aborting the
    /// confirmation wait when `cancel` fires.
    pub async fn confirm_deposit_with(
        &mut self,
        tx_ref: &str,
        meta: Value,
        cancel: &CancellationToken,
    ) -> Result<Reconciliation, PaymentError> {
        let _guard = self.ctx.locks.acquire(self.payment.id).await;
        self.refresh().await?;

        let (token_address, rate) = match &self.payment.rail {
            Some(RailBinding::Crypto {
                token_address,
                rate,
            }) => (token_address.clone(), *rate),
            _ => return Err(PaymentError::validation("only crypto payments can confirm deposits")),
        };
        let tx_ref = tx_ref.trim();
        if tx_ref.is_empty() {
            return Err(PaymentError::validation("transaction reference must not be empty"));
        }
        self.ensure_accepts_deposit()?;
        let payer = self
            .payment
            .payer()
            .cloned()
            .ok_or_else(|| PaymentError::validation("assign an identity before confirming deposits"))?;

        if let Some(credited) = self
            .ctx
            .store
            .find_transaction_by_ref(tx_ref, TransactionStatus::Verified)
            .await?
        {
            return Err(PaymentError::validation(format!(
                "transfer {} was already credited to payment {}",
                tx_ref, credited.payment_id
            )));
        }

        let request_meta = json!({
            "tx_hash": tx_ref,
            "token_address": token_address,
            "rate": rate,
            "meta": meta,
        });
        let mut tx = self
            .open_entry(&payer, Some(tx_ref.to_string()), Decimal::ZERO, request_meta)
            .await?;
        let outcome = self
            .ctx
            .controller
            .settle_crypto(&mut self.payment, &mut tx, &token_address, tx_ref, meta, cancel)
            .await;
        self.refresh().await?;
        outcome
    }

    fn ensure_accepts_deposit(&self) -> Result<(), PaymentError> {
        if self.payment.status.accepts_deposit() {
            Ok(())
        } else {
            Err(PaymentError::validation(format!(
                "payment {} is {} and accepts no further deposits",
                self.payment.id, self.payment.status
            )))
        }
    }

    /// Create the `PENDING` deposit entry for the full amount, recording
    /// every party and the outgoing request.
    async fn open_entry(
        &self,
        payer: &PaymentIdentity,
        external_ref: Option<String>,
        fee: Decimal,
        request: Value,
    ) -> Result<Transaction, PaymentError> {
        let tx = self
            .ctx
            .ledger
            .create(NewTransaction {
                payment_id: self.payment.id,
                identity_id: payer.id,
                external_ref,
                kind: TransactionKind::Deposit,
                amount: self.payment.total_amount,
                fee,
                discount: Decimal::ZERO,
                meta: json!({
                    "parties": self.payment.identities,
                    "request": request,
                }),
            })
            .await?;
        Ok(tx)
    }
}
