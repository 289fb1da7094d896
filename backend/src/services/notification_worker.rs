//! # Notification Worker
//!
//! Background task that drains the notification outbox.
//!
//! ## Delivery Flow
//!
//! ```text
//! NotificationWorker (background task)
//!              │
//!              ├── Every N seconds: claim due jobs (lease 5m)
//!              │
//!              ├── Send each through the MailTransport
//!              │       ├── ok    → status = sent
//!              │       └── error → attempts + 1, retry after
//!              │                   base * 2^(attempts-1) (max 1h),
//!              │                   or status = failed at max attempts
//!              │
//!              └── Shutdown signal: finish the batch, then exit
//! ```
//!
//! Complaint requests never wait for delivery, and a delivery failure
//! never undoes the complaint change that queued it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::db::{ComplaintStore, DatabaseError};
use crate::utils::truncate_string;

use super::mailer::{EmailMessage, MailTransport};

/// How long a claimed job stays invisible to other workers.
const CLAIM_LEASE_SECS: i64 = 300;

/// Upper bound for the retry delay.
const MAX_BACKOFF_SECS: u64 = 3600;

/// Counts from one pass over the outbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

/// The outbox delivery service.
///
/// ## Usage
///
/// ```rust,ignore
/// let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
/// let worker = NotificationWorker::new(store, mailer, &config);
///
/// let handle = tokio::spawn(async move { worker.start(shutdown_rx).await });
/// // ...
/// shutdown_tx.send(true).ok();
/// handle.await.ok();
/// ```
#[derive(Clone)]
pub struct NotificationWorker {
    store: Arc<dyn ComplaintStore>,
    mailer: Arc<dyn MailTransport>,
    poll_interval: Duration,
    batch_size: i64,
    max_attempts: i32,
    retry_base_secs: u64,
}

impl NotificationWorker {
    pub fn new(
        store: Arc<dyn ComplaintStore>,
        mailer: Arc<dyn MailTransport>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            poll_interval: Duration::from_secs(config.notification_poll_interval),
            batch_size: config.notification_batch_size,
            max_attempts: config.notification_max_attempts,
            retry_base_secs: config.notification_retry_base,
        }
    }

    /// Poll the outbox until `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting notification worker (every {:?}, batch {}, max attempts {})",
            self.poll_interval, self.batch_size, self.max_attempts
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.process_due().await {
                        Ok(report) if report != DeliveryReport::default() => {
                            info!(
                                "Notification pass: sent={}, retried={}, failed={}",
                                report.sent, report.retried, report.failed
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Notification pass failed: {}", e),
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Notification worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Claim and deliver one batch of due jobs.
    pub async fn process_due(&self) -> Result<DeliveryReport, DatabaseError> {
        let jobs = self
            .store
            .claim_due_notifications(
                Utc::now(),
                chrono::Duration::seconds(CLAIM_LEASE_SECS),
                self.batch_size,
            )
            .await?;

        let mut report = DeliveryReport::default();

        for job in jobs {
            let message = EmailMessage {
                to: job.recipient.clone(),
                subject: job.subject.clone(),
                html_body: job.html_body.clone(),
            };

            match self.mailer.send(&message).await {
                Ok(()) => {
                    self.store.mark_notification_sent(job.id, Utc::now()).await?;
                    info!(
                        "📧 {} email sent to {} for complaint {}",
                        job.kind.as_str(),
                        job.recipient,
                        truncate_string(&job.transaction_hash, 20)
                    );
                    report.sent += 1;
                }
                Err(e) => {
                    let attempts = job.attempts + 1;
                    let retry_at = if attempts >= self.max_attempts {
                        None
                    } else {
                        Some(Utc::now() + self.backoff(attempts))
                    };

                    match retry_at {
                        Some(at) => {
                            warn!(
                                "Email {} (attempt {}/{}) failed: {}. Retrying at {}",
                                job.id, attempts, self.max_attempts, e, at
                            );
                            report.retried += 1;
                        }
                        None => {
                            error!(
                                "Email {} to {} failed permanently after {} attempts: {}",
                                job.id, job.recipient, attempts, e
                            );
                            report.failed += 1;
                        }
                    }

                    self.store
                        .record_notification_failure(job.id, &e.to_string(), retry_at, Utc::now())
                        .await?;
                }
            }
        }

        debug!("Notification pass complete: {:?}", report);
        Ok(report)
    }

    /// Delay before the next attempt after `attempts` failures.
    pub fn backoff(&self, attempts: i32) -> chrono::Duration {
        let exponent = (attempts.max(1) - 1).min(16) as u32;
        let secs = self
            .retry_base_secs
            .saturating_mul(1u64 << exponent)
            .min(MAX_BACKOFF_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{
        ComplaintRecord, ComplaintStatus, FormData, NotificationJob, NotificationKind,
        NotificationStatus,
    };
    use crate::services::mailer::testing::RecordingMailer;

    fn complaint(hash: &str) -> ComplaintRecord {
        let now = Utc::now();
        ComplaintRecord {
            transaction_hash: hash.to_string(),
            ipfs_cid: None,
            ipfs_url: None,
            metadata_uri: None,
            station: "Central".to_string(),
            category: "theft".to_string(),
            wallet_address: String::new(),
            status: ComplaintStatus::Pending,
            form_data: FormData::default(),
            nft_tx_hash: None,
            fir_cid: None,
            fir_nft_tx_hash: None,
            updates: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let job = NotificationJob::new(
            "0xAA",
            NotificationKind::FirFiled,
            "a@b.com",
            "FIR Filed".to_string(),
            "<p>body</p>".to_string(),
        );
        store
            .insert_complaint(&complaint("0xAA"), Some(&job))
            .await
            .unwrap();
        store
    }

    fn worker(store: Arc<MemoryStore>, mailer: Arc<RecordingMailer>) -> NotificationWorker {
        NotificationWorker::new(store, mailer, &AppConfig::for_tests())
    }

    #[tokio::test]
    async fn test_successful_delivery_marks_sent() {
        let store = seeded_store().await;
        let mailer = Arc::new(RecordingMailer::new());
        let worker = worker(store.clone(), mailer.clone());

        let report = worker.process_due().await.unwrap();
        assert_eq!(report, DeliveryReport { sent: 1, retried: 0, failed: 0 });

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");

        let job = &store.all_notifications()[0];
        assert_eq!(job.status, NotificationStatus::Sent);
        assert_eq!(job.attempts, 1);
        assert!(job.sent_at.is_some());

        // Nothing left to deliver.
        let report = worker.process_due().await.unwrap();
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(mailer.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_rescheduled_not_lost() {
        let store = seeded_store().await;
        let mailer = Arc::new(RecordingMailer::failing());
        let worker = worker(store.clone(), mailer.clone());

        let before = Utc::now();
        let report = worker.process_due().await.unwrap();
        assert_eq!(report.retried, 1);

        let job = &store.all_notifications()[0];
        assert_eq!(job.status, NotificationStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.as_deref().unwrap().contains("connection refused"));
        assert!(job.next_attempt_at >= before + chrono::Duration::seconds(30));

        // Not due yet, so the next pass leaves it alone.
        let report = worker.process_due().await.unwrap();
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(mailer.attempts(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = seeded_store().await;
        let mailer = Arc::new(RecordingMailer::failing());
        let mut worker = worker(store.clone(), mailer.clone());
        worker.retry_base_secs = 0;

        // for_tests() allows 3 attempts.
        let mut reports = Vec::new();
        for _ in 0..3 {
            reports.push(worker.process_due().await.unwrap());
        }

        assert_eq!(reports[0].retried, 1);
        assert_eq!(reports[1].retried, 1);
        assert_eq!(reports[2].failed, 1);

        let job = &store.all_notifications()[0];
        assert_eq!(job.status, NotificationStatus::Failed);
        assert_eq!(job.attempts, 3);

        assert_eq!(worker.process_due().await.unwrap(), DeliveryReport::default());
        assert_eq!(mailer.attempts(), 3);
    }

    #[tokio::test]
    async fn test_store_outage_is_reported() {
        let store = seeded_store().await;
        store.set_unavailable(true);
        let worker = worker(store, Arc::new(RecordingMailer::new()));
        assert!(worker.process_due().await.is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let worker = worker(Arc::new(MemoryStore::new()), Arc::new(RecordingMailer::new()));
        assert_eq!(worker.backoff(1), chrono::Duration::seconds(30));
        assert_eq!(worker.backoff(2), chrono::Duration::seconds(60));
        assert_eq!(worker.backoff(3), chrono::Duration::seconds(120));
        assert_eq!(worker.backoff(20), chrono::Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let store = seeded_store().await;
        let mailer = Arc::new(RecordingMailer::new());
        let worker = worker(store.clone(), mailer.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.start(rx).await });

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert_eq!(mailer.sent().len(), 1);
    }
}
