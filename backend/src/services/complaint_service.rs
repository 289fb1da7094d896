//! # Complaint Service
//!
//! The ComplaintService is the central service for the complaint lifecycle.
//! It coordinates between the store and the notification templates.
//!
//! ## Responsibilities
//!
//! - Mirror on-ledger submissions into the store (idempotently)
//! - List and fetch complaints for dashboards
//! - Apply station updates (status, FIR, token hashes, audit entries)
//! - Decide which email each change produces and enqueue it with the change
//!
//! ## Flow Example: FIR filed
//!
//! ```text
//! 1. Station dashboard pins the FIR and mints its token
//!                ↓
//! 2. POST /api/update-complaint { id, firCid, firNftTxHash, updates }
//!                ↓
//! 3. ComplaintService.apply_update() builds a ComplaintPatch
//!                ↓
//! 4. Store locks the row, applies the patch, writes it
//!                ↓
//! 5. Notifier plans a `fir_filed` email; store writes it to the outbox
//!                ↓
//! 6. Transaction commits; NotificationWorker delivers the email later
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::db::{
    ComplaintFilter, ComplaintPatch, ComplaintRecord, ComplaintStore, DatabaseError,
    InsertOutcome, NotificationJob, UpdateEntry, UpdateOutcome, SUBMITTED_MESSAGE,
};
use crate::models::{RecordEvidenceRequest, UpdateComplaintRequest};
use crate::utils::{format_update_date, non_blank, truncate_string};

use super::Notifier;

/// Errors that can occur in complaint operations.
#[derive(Debug, thiserror::Error)]
pub enum ComplaintError {
    /// A required field was missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// No complaint with the given transaction hash.
    #[error("Complaint not found: {0}")]
    NotFound(String),

    /// Store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// Result of [`ComplaintService::create_if_absent`].
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub record: ComplaintRecord,

    /// `false` when the hash was already recorded.
    pub created: bool,

    /// Notification enqueued with the new record.
    pub notification: Option<NotificationJob>,
}

/// The main service for complaint operations.
///
/// ## Usage
///
/// ```rust,ignore
/// let service = ComplaintService::new(store, Notifier::new(&config.ipfs_gateway_url));
///
/// let result = service.create_if_absent(request).await?;
/// let complaints = service.list_all(&ComplaintFilter::default()).await?;
/// ```
#[derive(Clone)]
pub struct ComplaintService {
    /// Complaint and outbox storage.
    store: Arc<dyn ComplaintStore>,

    /// Email templates.
    notifier: Notifier,
}

impl ComplaintService {
    pub fn new(store: Arc<dyn ComplaintStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Record a complaint unless its transaction hash is already known.
    ///
    /// A repeated call returns the stored record and enqueues nothing.
    pub async fn create_if_absent(
        &self,
        request: RecordEvidenceRequest,
    ) -> Result<CreateResult, ComplaintError> {
        let transaction_hash = request.transaction_hash.trim().to_string();
        if transaction_hash.is_empty() {
            return Err(ComplaintError::MissingField("transactionHash"));
        }

        let now = Utc::now();
        let record = ComplaintRecord {
            transaction_hash,
            ipfs_cid: non_blank(request.ipfs_cid),
            ipfs_url: non_blank(request.ipfs_url),
            metadata_uri: non_blank(request.metadata_uri),
            station: request.station.trim().to_string(),
            category: request.category.trim().to_string(),
            wallet_address: request.wallet_address.trim().to_string(),
            status: request.status.unwrap_or_default(),
            form_data: request.form_data,
            nft_tx_hash: None,
            fir_cid: None,
            fir_nft_tx_hash: None,
            updates: vec![UpdateEntry {
                date: format_update_date(now),
                message: SUBMITTED_MESSAGE.to_string(),
            }],
            created_at: now,
            updated_at: now,
        };

        let notification = self.notifier.complaint_registered(&record);

        match self
            .store
            .insert_complaint(&record, notification.as_ref())
            .await?
        {
            InsertOutcome::Created(record) => {
                info!(
                    "Complaint {} recorded for station {:?} (email queued: {})",
                    truncate_string(&record.transaction_hash, 20),
                    record.station,
                    notification.is_some()
                );
                Ok(CreateResult {
                    record,
                    created: true,
                    notification,
                })
            }
            InsertOutcome::Existing(record) => {
                info!(
                    "Complaint {} already recorded",
                    truncate_string(&record.transaction_hash, 20)
                );
                Ok(CreateResult {
                    record,
                    created: false,
                    notification: None,
                })
            }
        }
    }

    /// Every complaint matching the filter, newest first.
    pub async fn list_all(
        &self,
        filter: &ComplaintFilter,
    ) -> Result<Vec<ComplaintRecord>, ComplaintError> {
        debug!("Listing complaints: {:?}", filter);
        Ok(self.store.list_complaints(filter).await?)
    }

    /// One complaint by transaction hash.
    pub async fn get(&self, transaction_hash: &str) -> Result<ComplaintRecord, ComplaintError> {
        let key = transaction_hash.trim();
        self.store
            .find_complaint(key)
            .await?
            .ok_or_else(|| ComplaintError::NotFound(key.to_string()))
    }

    /// Patch a complaint and enqueue the email the change calls for.
    ///
    /// Blank string patches count as absent. An update entry without a date
    /// gets today's date.
    pub async fn apply_update(
        &self,
        request: UpdateComplaintRequest,
    ) -> Result<UpdateOutcome, ComplaintError> {
        let key = request.id.trim().to_string();
        if key.is_empty() {
            return Err(ComplaintError::MissingField("id"));
        }

        let now = Utc::now();
        let update = request.updates.map(|mut entry| {
            if entry.date.trim().is_empty() {
                entry.date = format_update_date(now);
            }
            entry
        });

        let patch = ComplaintPatch {
            status: request.status,
            fir_cid: non_blank(request.fir_cid),
            nft_tx_hash: non_blank(request.nft_tx_hash),
            fir_nft_tx_hash: non_blank(request.fir_nft_tx_hash),
            update,
        };
        let notify = request.notify;

        let notifier = &self.notifier;
        let plan = |record: &ComplaintRecord| notifier.plan_for_update(record, &patch, notify);

        let outcome = self
            .store
            .update_complaint(&key, &patch, &plan)
            .await?
            .ok_or_else(|| ComplaintError::NotFound(key.clone()))?;

        info!(
            "Complaint {} updated (status={}, notification={:?})",
            truncate_string(&key, 20),
            outcome.record.status,
            outcome.notification.as_ref().map(|n| n.kind.as_str())
        );

        Ok(outcome)
    }

    /// Outbox rows for a complaint, newest first.
    pub async fn notifications_for(
        &self,
        transaction_hash: &str,
    ) -> Result<Vec<NotificationJob>, ComplaintError> {
        let key = transaction_hash.trim();
        if self.store.find_complaint(key).await?.is_none() {
            return Err(ComplaintError::NotFound(key.to_string()));
        }
        Ok(self.store.notifications_for(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{ComplaintStatus, FormData, NotificationKind};

    fn service() -> (ComplaintService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = ComplaintService::new(
            store.clone(),
            Notifier::new("https://gateway.pinata.cloud/ipfs"),
        );
        (service, store)
    }

    fn create_request(hash: &str, email: Option<&str>) -> RecordEvidenceRequest {
        RecordEvidenceRequest {
            transaction_hash: hash.to_string(),
            station: "Central".to_string(),
            category: "theft".to_string(),
            form_data: FormData {
                full_name: Some("A".to_string()),
                email: email.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn entry(date: &str, message: &str) -> UpdateEntry {
        UpdateEntry {
            date: date.to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_seeds_pending_with_one_entry() {
        let (service, _) = service();
        let result = service
            .create_if_absent(create_request("0xAA", Some("a@b.com")))
            .await
            .unwrap();

        assert!(result.created);
        assert_eq!(result.record.status, ComplaintStatus::Pending);
        assert_eq!(result.record.updates.len(), 1);
        assert_eq!(result.record.updates[0].message, SUBMITTED_MESSAGE);
        assert_eq!(
            result.notification.map(|n| n.kind),
            Some(NotificationKind::ComplaintRegistered)
        );
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (service, store) = service();
        service
            .create_if_absent(create_request("0xAA", Some("a@b.com")))
            .await
            .unwrap();

        let mut second = create_request("0xAA", Some("other@b.com"));
        second.station = "North".to_string();
        let result = service.create_if_absent(second).await.unwrap();

        assert!(!result.created);
        assert!(result.notification.is_none());
        assert_eq!(result.record.station, "Central");
        assert_eq!(store.complaint_count(), 1);
        assert_eq!(store.all_notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_hash() {
        let (service, store) = service();
        let err = service
            .create_if_absent(create_request("   ", Some("a@b.com")))
            .await
            .unwrap_err();

        assert!(matches!(err, ComplaintError::MissingField("transactionHash")));
        assert_eq!(store.complaint_count(), 0);
        assert!(store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_create_without_email_queues_nothing() {
        let (service, store) = service();
        let result = service
            .create_if_absent(create_request("0xAA", None))
            .await
            .unwrap();
        assert!(result.created);
        assert!(result.notification.is_none());
        assert!(store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_create_honours_explicit_status() {
        let (service, _) = service();
        let mut request = create_request("0xAA", None);
        request.status = Some(ComplaintStatus::InProgress);
        let result = service.create_if_absent(request).await.unwrap();
        assert_eq!(result.record.status, ComplaintStatus::InProgress);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let (service, store) = service();
        let err = service
            .apply_update(UpdateComplaintRequest {
                id: "0xMISSING".to_string(),
                status: Some(ComplaintStatus::Resolved),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ComplaintError::NotFound(ref k) if k == "0xMISSING"));
        assert_eq!(store.complaint_count(), 0);
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let (service, _) = service();
        let err = service
            .apply_update(UpdateComplaintRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ComplaintError::MissingField("id")));
    }

    #[tokio::test]
    async fn test_status_only_update() {
        let (service, _) = service();
        let created = service
            .create_if_absent(create_request("0xAA", Some("a@b.com")))
            .await
            .unwrap()
            .record;

        let outcome = service
            .apply_update(UpdateComplaintRequest {
                id: "0xAA".to_string(),
                status: Some(ComplaintStatus::Resolved),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.record.status, ComplaintStatus::Resolved);
        assert_eq!(outcome.record.updates, created.updates);
        assert_eq!(outcome.record.fir_cid, None);
        assert_eq!(outcome.record.form_data, created.form_data);
        assert!(outcome.notification.is_none());
    }

    #[tokio::test]
    async fn test_fir_update_scenario() {
        let (service, store) = service();
        service
            .create_if_absent(create_request("0xAA", Some("a@b.com")))
            .await
            .unwrap();

        let outcome = service
            .apply_update(UpdateComplaintRequest {
                id: "0xAA".to_string(),
                fir_cid: Some("Qm123".to_string()),
                updates: Some(entry("2024-01-01", "Filed")),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.record.fir_cid.as_deref(), Some("Qm123"));
        assert_eq!(outcome.record.updates.len(), 2);

        let job = outcome.notification.unwrap();
        assert_eq!(job.kind, NotificationKind::FirFiled);
        assert_eq!(job.recipient, "a@b.com");

        let fir_jobs: Vec<_> = store
            .all_notifications()
            .into_iter()
            .filter(|j| j.kind == NotificationKind::FirFiled)
            .collect();
        assert_eq!(fir_jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_patches_are_ignored() {
        let (service, _) = service();
        service
            .create_if_absent(create_request("0xAA", Some("a@b.com")))
            .await
            .unwrap();
        service
            .apply_update(UpdateComplaintRequest {
                id: "0xAA".to_string(),
                nft_tx_hash: Some("0xNFT".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let outcome = service
            .apply_update(UpdateComplaintRequest {
                id: "0xAA".to_string(),
                nft_tx_hash: Some(String::new()),
                fir_cid: Some("  ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.record.nft_tx_hash.as_deref(), Some("0xNFT"));
        assert!(outcome.record.fir_cid.is_none());
        assert!(outcome.notification.is_none());
    }

    #[tokio::test]
    async fn test_notify_update_queues_station_message() {
        let (service, _) = service();
        service
            .create_if_absent(create_request("0xAA", Some("a@b.com")))
            .await
            .unwrap();

        let outcome = service
            .apply_update(UpdateComplaintRequest {
                id: "0xAA".to_string(),
                updates: Some(entry("", "Please bring the receipt")),
                notify: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            outcome.notification.map(|n| n.kind),
            Some(NotificationKind::StationMessage)
        );
        let last = outcome.record.updates.last().unwrap();
        assert_eq!(last.message, "Please bring the receipt");
        assert_eq!(last.date, format_update_date(Utc::now()));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filter() {
        let (service, _) = service();
        service
            .create_if_absent(create_request("0x01", None))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut north = create_request("0x02", None);
        north.station = "North".to_string();
        service.create_if_absent(north).await.unwrap();

        let all = service.list_all(&ComplaintFilter::default()).await.unwrap();
        let hashes: Vec<_> = all.iter().map(|c| c.transaction_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0x02", "0x01"]);

        let central = service
            .list_all(&ComplaintFilter {
                station: Some("Central".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(central.len(), 1);
        assert_eq!(central[0].transaction_hash, "0x01");
    }

    #[tokio::test]
    async fn test_lookups_trim_the_hash() {
        let (service, _) = service();
        service
            .create_if_absent(create_request(" 0xAA ", Some("a@b.com")))
            .await
            .unwrap();

        let record = service.get(" 0xAA ").await.unwrap();
        assert_eq!(record.transaction_hash, "0xAA");

        let jobs = service.notifications_for("\t0xAA ").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, NotificationKind::ComplaintRegistered);
    }

    #[tokio::test]
    async fn test_notifications_for_unknown_complaint() {
        let (service, _) = service();
        let err = service.notifications_for("0xNOPE").await.unwrap_err();
        assert!(matches!(err, ComplaintError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_database_error() {
        let (service, store) = service();
        store.set_unavailable(true);
        let err = service
            .create_if_absent(create_request("0xAA", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ComplaintError::DatabaseError(_)));
    }
}
