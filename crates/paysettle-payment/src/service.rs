use std::sync::Arc;

use dashmap::DashMap;
use paysettle_core::{
    Payment, PaymentId, PaymentParams, PaymentStore, SettlementConfig, TransactionLedger,
};
use paysettle_settlement::{registry, ChainRegistry, FiatAccounts, FiatRegistry};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::aggregate::PaymentAggregate;
use crate::controller::ReconciliationController;
use crate::error::PaymentError;

/// One async mutex per payment; settlement attempts on the same payment
/// run one at a time.
#[derive(Default)]
pub(crate) struct PaymentLocks {
    locks: DashMap<PaymentId, Arc<Mutex<()>>>,
}

impl PaymentLocks {
    pub(crate) async fn acquire(&self, id: PaymentId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id).or_default().clone();
        lock.lock_owned().await
    }
}

/// Shared collaborators handed to every aggregate.
pub(crate) struct ServiceContext {
    pub(crate) store: Arc<dyn PaymentStore>,
    pub(crate) ledger: TransactionLedger,
    pub(crate) controller: ReconciliationController,
    pub(crate) fiat: Arc<FiatRegistry>,
    pub(crate) chains: Arc<ChainRegistry>,
    pub(crate) locks: PaymentLocks,
}

impl ServiceContext {
    /// Read a payment with its full identity list and transaction history.
    pub(crate) async fn load(&self, id: PaymentId) -> Result<Payment, PaymentError> {
        let mut payment = self
            .store
            .get_payment(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", id)))?;
        payment.identities = self.store.list_identities(id).await?;
        payment.transactions = self.store.list_transactions(id).await?;
        Ok(payment)
    }
}

/// Entry point for creating and loading payments.
#[derive(Clone)]
pub struct PaymentService {
    ctx: Arc<ServiceContext>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, fiat: FiatRegistry, chains: ChainRegistry) -> Self {
        let fiat = Arc::new(fiat);
        let chains = Arc::new(chains);
        let ledger = TransactionLedger::new(store.clone());
        let controller =
            ReconciliationController::new(fiat.clone(), chains.clone(), ledger.clone(), store.clone());

        Self {
            ctx: Arc::new(ServiceContext {
                store,
                ledger,
                controller,
                fiat,
                chains,
                locks: PaymentLocks::default(),
            }),
        }
    }

    /// Build the rail registries from configuration.
    pub fn from_config(
        store: Arc<dyn PaymentStore>,
        config: &SettlementConfig,
    ) -> Result<Self, PaymentError> {
        let (fiat, chains) = registry::build(config)?;
        tracing::info!(
            fiat_services = ?fiat.service_names(),
            chains = ?chains.chain_names(),
            "Payment service configured"
        );
        Ok(Self::new(store, fiat, chains))
    }

    /// Create a payment, or update the one already holding `unique_ref`.
    ///
    /// Re-submission overwrites the descriptive fields and keeps status,
    /// rail binding and history. Amount and currency are frozen once the
    /// payment has left the deposit-accepting statuses, and the total never
    /// drops below what is already allocated to the transfer recipient.
    pub async fn create(&self, params: PaymentParams) -> Result<PaymentAggregate, PaymentError> {
        if params.unique_ref.trim().is_empty() {
            return Err(PaymentError::validation("unique_ref must not be empty"));
        }
        if params.total_amount.is_sign_negative() && !params.total_amount.is_zero() {
            return Err(PaymentError::validation(format!(
                "total amount {} must not be negative",
                params.total_amount
            )));
        }

        let store = &self.ctx.store;
        let row = match store.get_payment_by_ref(&params.unique_ref).await? {
            Some(existing) => {
                let _guard = self.ctx.locks.acquire(existing.id).await;
                let current = self.ctx.load(existing.id).await?;
                let changes_money = current.total_amount != params.total_amount
                    || current.currency != params.currency;
                if changes_money && !current.status.accepts_deposit() {
                    return Err(PaymentError::validation(format!(
                        "payment {} is {}; amount and currency can no longer change",
                        current.unique_ref, current.status
                    )));
                }
                if let Some(party) = current.transfer_party() {
                    if params.total_amount < party.allocated_amount {
                        return Err(PaymentError::validation(format!(
                            "total amount {} is below the {} already allocated to {}",
                            params.total_amount, party.allocated_amount, party.account
                        )));
                    }
                }
                store.upsert_payment(&params).await?
            }
            None => store.upsert_payment(&params).await?,
        };

        tracing::info!(
            payment_id = %row.id,
            unique_ref = %row.unique_ref,
            amount = %row.total_amount,
            currency = %row.currency,
            version = row.version,
            "Payment created"
        );
        self.fetch(row.id).await
    }

    /// Customer, card and connected-account management of a card service.
    pub fn fiat_accounts(&self, service: &str) -> Result<Arc<dyn FiatAccounts>, PaymentError> {
        Ok(self.ctx.fiat.accounts(service)?)
    }

    pub async fn fetch(&self, id: PaymentId) -> Result<PaymentAggregate, PaymentError> {
        let payment = self.ctx.load(id).await?;
        Ok(PaymentAggregate::new(payment, self.ctx.clone()))
    }

    pub async fn fetch_by_ref(&self, unique_ref: &str) -> Result<PaymentAggregate, PaymentError> {
        let row = self
            .ctx
            .store
            .get_payment_by_ref(unique_ref)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment with ref {}", unique_ref)))?;
        self.fetch(row.id).await
    }
}
