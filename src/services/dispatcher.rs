use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::ports::{Notifier, OutboxRepository, RepositoryError};
use crate::services::notices::NoticeRenderer;

const BATCH_SIZE: i64 = 10;
pub const MAX_ATTEMPTS: i32 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub retried: usize,
    pub abandoned: usize,
}

pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    notifier: Arc<dyn Notifier>,
    renderer: NoticeRenderer,
}

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        notifier: Arc<dyn Notifier>,
        renderer: NoticeRenderer,
    ) -> Self {
        Self {
            outbox,
            notifier,
            renderer,
        }
    }

    /// Claims and delivers one batch of pending notices.
    pub async fn dispatch_batch(&self) -> Result<DispatchReport, RepositoryError> {
        let entries = self.outbox.claim_pending(BATCH_SIZE).await?;
        let mut report = DispatchReport::default();

        if entries.is_empty() {
            return Ok(report);
        }

        debug!("Dispatching {} notice(s)", entries.len());

        for entry in entries {
            let notice = &entry.notice;
            let mail = self.renderer.render(notice);

            match self.notifier.notify(&mail).await {
                Ok(()) => {
                    self.outbox.mark_sent(notice.id).await?;
                    info!(notice_id = %notice.id, kind = %notice.kind, "notice delivered");
                    report.sent += 1;
                }
                Err(e) => {
                    let give_up = entry.attempts >= MAX_ATTEMPTS;
                    self.outbox
                        .mark_failed(notice.id, &e.to_string(), give_up)
                        .await?;
                    if give_up {
                        error!(
                            notice_id = %notice.id,
                            kind = %notice.kind,
                            attempts = entry.attempts,
                            error = %e,
                            "notice abandoned"
                        );
                        report.abandoned += 1;
                    } else {
                        warn!(
                            notice_id = %notice.id,
                            attempts = entry.attempts,
                            error = %e,
                            "notice delivery failed, will retry"
                        );
                        report.retried += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Runs the dispatcher until `shutdown` flips to true.
pub async fn run_dispatcher(
    dispatcher: Arc<OutboxDispatcher>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Outbox dispatcher started");

    loop {
        if let Err(e) = dispatcher.dispatch_batch().await {
            error!("Dispatcher batch error: {}", e);
        }

        tokio::select! {
            _ = sleep(poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Outbox dispatcher stopped");
                    return;
                }
            }
        }
    }
}
