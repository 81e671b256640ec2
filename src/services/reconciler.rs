use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::TransactionStatus;
use crate::error::{PaymentError, Rejection};
use crate::ports::{Completion, CompletionOutcome, DonationRepository};
use crate::services::notification::ConfirmedPayment;

/// Acknowledgement for a notification that needs no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpnAck {
    Applied,
    AlreadyReconciled(TransactionStatus),
    UnknownTransaction,
}

impl IpnAck {
    pub fn message(&self) -> &'static str {
        match self {
            IpnAck::Applied => "IPN handled successfully.",
            IpnAck::AlreadyReconciled(_) => "IPN handled, duplicate transaction.",
            IpnAck::UnknownTransaction => "IPN handled, but transaction not found.",
        }
    }
}

/// Applies confirmed payments to the ledger, at most once per transaction.
pub struct TransactionReconciler {
    repository: Arc<dyn DonationRepository>,
}

impl TransactionReconciler {
    pub fn new(repository: Arc<dyn DonationRepository>) -> Self {
        Self { repository }
    }

    pub async fn reconcile(&self, payment: &ConfirmedPayment) -> Result<IpnAck, PaymentError> {
        let completion = Completion {
            transaction_id: payment.transaction_id.clone(),
            amount: payment.amount.clone(),
            validation: payment.record.clone(),
            payment_method: payment.payment_method.clone(),
            bank_transaction_id: payment.bank_transaction_id.clone(),
        };

        match self.repository.complete_transaction(&completion).await? {
            CompletionOutcome::Applied {
                donor_id,
                donated_amount,
            } => {
                info!(
                    transaction_id = %payment.transaction_id,
                    donor_id = %donor_id,
                    amount = %payment.amount,
                    donated_amount = %donated_amount,
                    "donation reconciled"
                );
                Ok(IpnAck::Applied)
            }
            CompletionOutcome::AlreadyTerminal(status) => {
                info!(
                    transaction_id = %payment.transaction_id,
                    status = %status,
                    "duplicate notification for settled transaction"
                );
                Ok(IpnAck::AlreadyReconciled(status))
            }
            CompletionOutcome::AmountMismatch { expected } => {
                Err(PaymentError::Rejected(Rejection::LedgerMismatch {
                    recorded: expected.to_string(),
                    confirmed: payment.amount.to_string(),
                }))
            }
            CompletionOutcome::NotFound => {
                warn!(
                    transaction_id = %payment.transaction_id,
                    "notification for unknown transaction"
                );
                Ok(IpnAck::UnknownTransaction)
            }
        }
    }
}
