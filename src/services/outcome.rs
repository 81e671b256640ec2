//! Browser redirects coming back from the hosted payment page.
//!
//! These requests only steer the browser. The success redirect never
//! touches the ledger; fail and cancel close a transaction that is still
//! `initiated` and leave anything else as it is.

use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::config::FrontendPages;
use crate::domain::Closure;
use crate::ports::{CloseOutcome, DonationRepository};

pub struct OutcomeResolver {
    repository: Arc<dyn DonationRepository>,
    pages: FrontendPages,
}

fn present(transaction_id: Option<&str>) -> Option<&str> {
    transaction_id.map(str::trim).filter(|id| !id.is_empty())
}

impl OutcomeResolver {
    pub fn new(repository: Arc<dyn DonationRepository>, pages: FrontendPages) -> Self {
        Self { repository, pages }
    }

    pub async fn success(&self, transaction_id: Option<&str>) -> Url {
        let Some(id) = present(transaction_id) else {
            warn!("success redirect without transaction id");
            return self.pages.error.clone();
        };

        match self.repository.find_transaction(id).await {
            Ok(Some(_)) => FrontendPages::with_transaction(&self.pages.success, Some(id)),
            Ok(None) => {
                warn!(transaction_id = %id, "success redirect for unknown transaction");
                self.pages.error.clone()
            }
            Err(e) => {
                error!(transaction_id = %id, error = %e, "transaction lookup failed");
                self.pages.error.clone()
            }
        }
    }

    pub async fn fail(&self, transaction_id: Option<&str>, reason: Option<String>) -> Url {
        let id = present(transaction_id);
        self.close(id, Closure::Failed { reason }).await;
        FrontendPages::with_transaction(&self.pages.fail, id)
    }

    pub async fn cancel(&self, transaction_id: Option<&str>) -> Url {
        let id = present(transaction_id);
        self.close(id, Closure::Cancelled).await;
        FrontendPages::with_transaction(&self.pages.cancel, id)
    }

    async fn close(&self, transaction_id: Option<&str>, closure: Closure) {
        let Some(id) = transaction_id else {
            return;
        };

        match self.repository.close_transaction(id, &closure).await {
            Ok(CloseOutcome::Closed) => {
                info!(transaction_id = %id, status = %closure.status(), "transaction closed")
            }
            Ok(CloseOutcome::AlreadyTerminal(status)) => info!(
                transaction_id = %id,
                status = %status,
                "redirect ignored for settled transaction"
            ),
            Ok(CloseOutcome::NotFound) => {
                warn!(transaction_id = %id, "redirect for unknown transaction")
            }
            Err(e) => error!(transaction_id = %id, error = %e, "failed to close transaction"),
        }
    }
}
