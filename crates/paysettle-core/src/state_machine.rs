use crate::error::CoreError;
use crate::types::{PaymentStatus, TransactionStatus};

/// Events that move a payment through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The card rail demanded step-up authentication.
    StepUpRequired,
    /// A ledger entry was verified for the full amount.
    DepositConfirmed,
}

/// Payment lifecycle transitions driven by settlement outcomes.
///
/// Valid transitions:
/// - Initiated → OnHold (StepUpRequired)
/// - Initiated | OnHold → Deposited (DepositConfirmed)
///
/// Payout, refund and cancellation statuses are owned by the application
/// layer and never entered from here.
pub struct PaymentStateMachine;

impl PaymentStateMachine {
    pub fn transition(
        current: PaymentStatus,
        event: PaymentEvent,
    ) -> Result<PaymentStatus, CoreError> {
        let next = match (current, event) {
            (PaymentStatus::Initiated, PaymentEvent::StepUpRequired) => PaymentStatus::OnHold,
            (
                PaymentStatus::Initiated | PaymentStatus::OnHold,
                PaymentEvent::DepositConfirmed,
            ) => PaymentStatus::Deposited,
            _ => {
                return Err(CoreError::InvalidStateTransition {
                    entity: "payment",
                    from: current.to_string(),
                    event: format!("{:?}", event),
                })
            }
        };

        tracing::debug!(from = %current, to = %next, event = ?event, "payment state transition");
        Ok(next)
    }

    pub fn can_transition(current: PaymentStatus, event: PaymentEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

/// Events recorded against a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    ActionRequired,
    Verified,
    Canceled,
}

/// Ledger entry transitions. Terminal entries accept no event.
///
/// Valid transitions:
/// - Pending → ActionRequired
/// - Pending | ActionRequired → Verified
/// - Pending | ActionRequired → Canceled
pub struct TransactionStateMachine;

impl TransactionStateMachine {
    pub fn transition(
        current: TransactionStatus,
        event: TransactionEvent,
    ) -> Result<TransactionStatus, CoreError> {
        let next = match (current, event) {
            (TransactionStatus::Pending, TransactionEvent::ActionRequired) => {
                TransactionStatus::ActionRequired
            }
            (
                TransactionStatus::Pending | TransactionStatus::ActionRequired,
                TransactionEvent::Verified,
            ) => TransactionStatus::Verified,
            (
                TransactionStatus::Pending | TransactionStatus::ActionRequired,
                TransactionEvent::Canceled,
            ) => TransactionStatus::Canceled,
            _ => {
                return Err(CoreError::InvalidStateTransition {
                    entity: "transaction",
                    from: current.to_string(),
                    event: format!("{:?}", event),
                })
            }
        };

        tracing::debug!(from = %current, to = %next, event = ?event, "transaction state transition");
        Ok(next)
    }
}
