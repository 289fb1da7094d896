//! In-memory [`ComplaintStore`] used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::models::*;
use super::{ComplaintStore, DatabaseError, NotificationPlanner};

#[derive(Default)]
struct Inner {
    complaints: HashMap<String, ComplaintRecord>,
    notifications: Vec<NotificationJob>,
}

/// Mutex-guarded maps standing in for the two tables.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_queries: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.fail_queries.lock().unwrap() = unavailable;
    }

    pub fn complaint_count(&self) -> usize {
        self.inner.lock().unwrap().complaints.len()
    }

    /// Snapshot of the whole outbox, in insertion order.
    pub fn all_notifications(&self) -> Vec<NotificationJob> {
        self.inner.lock().unwrap().notifications.clone()
    }

    fn check(&self) -> Result<(), DatabaseError> {
        if *self.fail_queries.lock().unwrap() {
            Err(DatabaseError::ConnectionError("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ComplaintStore for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check()
    }

    async fn insert_complaint(
        &self,
        record: &ComplaintRecord,
        notification: Option<&NotificationJob>,
    ) -> Result<InsertOutcome, DatabaseError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.complaints.get(&record.transaction_hash) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        inner
            .complaints
            .insert(record.transaction_hash.clone(), record.clone());
        if let Some(job) = notification {
            inner.notifications.push(job.clone());
        }
        Ok(InsertOutcome::Created(record.clone()))
    }

    async fn find_complaint(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<ComplaintRecord>, DatabaseError> {
        self.check()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .complaints
            .get(transaction_hash)
            .cloned())
    }

    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> Result<Vec<ComplaintRecord>, DatabaseError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut complaints: Vec<ComplaintRecord> = inner
            .complaints
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    async fn update_complaint(
        &self,
        transaction_hash: &str,
        patch: &ComplaintPatch,
        plan: NotificationPlanner<'_>,
    ) -> Result<Option<UpdateOutcome>, DatabaseError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();

        let record = match inner.complaints.get_mut(transaction_hash) {
            Some(record) => record,
            None => return Ok(None),
        };
        patch.apply_to(record, Utc::now());
        let record = record.clone();

        let notification = plan(&record);
        if let Some(job) = &notification {
            inner.notifications.push(job.clone());
        }

        Ok(Some(UpdateOutcome {
            record,
            notification,
        }))
    }

    async fn notifications_for(
        &self,
        transaction_hash: &str,
    ) -> Result<Vec<NotificationJob>, DatabaseError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<NotificationJob> = inner
            .notifications
            .iter()
            .filter(|j| j.transaction_hash == transaction_hash)
            .cloned()
            .collect();
        jobs.reverse();
        Ok(jobs)
    }

    async fn claim_due_notifications(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: i64,
    ) -> Result<Vec<NotificationJob>, DatabaseError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let mut claimed = Vec::new();
        for job in inner.notifications.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if job.status == NotificationStatus::Pending && job.next_attempt_at <= now {
                job.next_attempt_at = now + lease;
                job.updated_at = now;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_notification_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.notifications.iter_mut().find(|j| j.id == id) {
            job.status = NotificationStatus::Sent;
            job.attempts += 1;
            job.last_error = None;
            job.sent_at = Some(sent_at);
            job.updated_at = sent_at;
        }
        Ok(())
    }

    async fn record_notification_failure(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.notifications.iter_mut().find(|j| j.id == id) {
            job.attempts += 1;
            job.last_error = Some(error.to_string());
            job.updated_at = now;
            match retry_at {
                Some(at) => job.next_attempt_at = at,
                None => job.status = NotificationStatus::Failed,
            }
        }
        Ok(())
    }
}
