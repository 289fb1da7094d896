//! # Database Queries
//!
//! This module contains all the SQL queries for interacting with the database.
//! Each function performs a specific database operation.
//!
//! ## Query Organization
//!
//! Queries are grouped by the table they operate on:
//! - `complaint_*` - Complaint table operations
//! - `notification_*` - Outbox operations
//!
//! ## Error Handling
//!
//! All queries return `Result<T, DatabaseError>`. Common errors:
//! - `ConnectionError` - No connection could be taken from the pool
//! - `QueryError` - SQL execution failed
//! - `InvalidData` - A stored enum value was not recognized

use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::*;
use super::{DatabaseError, NotificationPlanner};

const COMPLAINT_COLUMNS: &str = r#"
    transaction_hash, ipfs_cid, ipfs_url, metadata_uri,
    station, category, wallet_address, status, form_data,
    nft_tx_hash, fir_cid, fir_nft_tx_hash, updates,
    created_at, updated_at
"#;

const NOTIFICATION_COLUMNS: &str = r#"
    id, transaction_hash, kind, recipient, subject, html_body,
    status, attempts, last_error, next_attempt_at,
    created_at, updated_at, sent_at
"#;

// ============================================
// HELPER FUNCTIONS
// ============================================

async fn client(pool: &Pool) -> Result<Object, DatabaseError> {
    pool.get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))
}

/// Helper to convert a database row to ComplaintRecord
fn row_to_complaint(row: &Row) -> Result<ComplaintRecord, DatabaseError> {
    let status: String = row.try_get("status")?;
    let form_data: Json<FormData> = row.try_get("form_data")?;
    let updates: Json<Vec<UpdateEntry>> = row.try_get("updates")?;

    Ok(ComplaintRecord {
        transaction_hash: row.try_get("transaction_hash")?,
        ipfs_cid: row.try_get("ipfs_cid")?,
        ipfs_url: row.try_get("ipfs_url")?,
        metadata_uri: row.try_get("metadata_uri")?,
        station: row.try_get("station")?,
        category: row.try_get("category")?,
        wallet_address: row.try_get("wallet_address")?,
        status: status.parse().map_err(DatabaseError::InvalidData)?,
        form_data: form_data.0,
        nft_tx_hash: row.try_get("nft_tx_hash")?,
        fir_cid: row.try_get("fir_cid")?,
        fir_nft_tx_hash: row.try_get("fir_nft_tx_hash")?,
        updates: updates.0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Helper to convert a database row to NotificationJob
fn row_to_notification(row: &Row) -> Result<NotificationJob, DatabaseError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;

    Ok(NotificationJob {
        id: row.try_get("id")?,
        transaction_hash: row.try_get("transaction_hash")?,
        kind: kind.parse().map_err(DatabaseError::InvalidData)?,
        recipient: row.try_get("recipient")?,
        subject: row.try_get("subject")?,
        html_body: row.try_get("html_body")?,
        status: status.parse().map_err(DatabaseError::InvalidData)?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        sent_at: row.try_get("sent_at")?,
    })
}

/// Insert an outbox row inside an open transaction.
async fn insert_notification(
    tx: &tokio_postgres::Transaction<'_>,
    job: &NotificationJob,
) -> Result<(), DatabaseError> {
    tx.execute(
        r#"
        INSERT INTO notifications (
            id, transaction_hash, kind, recipient, subject, html_body,
            status, attempts, last_error, next_attempt_at,
            created_at, updated_at, sent_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
        &[
            &job.id,
            &job.transaction_hash,
            &job.kind.as_str(),
            &job.recipient,
            &job.subject,
            &job.html_body,
            &job.status.as_str(),
            &job.attempts,
            &job.last_error,
            &job.next_attempt_at,
            &job.created_at,
            &job.updated_at,
            &job.sent_at,
        ],
    )
    .await?;

    info!(
        "Queued {} notification {} for complaint {}",
        job.kind.as_str(),
        job.id,
        job.transaction_hash
    );
    Ok(())
}

// ============================================
// COMPLAINT QUERIES
// ============================================

/// Trivial round trip used by the health check.
pub async fn ping(pool: &Pool) -> Result<(), DatabaseError> {
    let client = client(pool).await?;
    client.query_one("SELECT 1", &[]).await?;
    Ok(())
}

/// Get a complaint by its ledger transaction hash.
pub async fn get_complaint(
    pool: &Pool,
    transaction_hash: &str,
) -> Result<Option<ComplaintRecord>, DatabaseError> {
    debug!("Fetching complaint: {}", transaction_hash);

    let client = client(pool).await?;

    let sql = format!(
        "SELECT {} FROM complaints WHERE transaction_hash = $1",
        COMPLAINT_COLUMNS
    );
    let row = client.query_opt(sql.as_str(), &[&transaction_hash]).await?;

    row.as_ref().map(row_to_complaint).transpose()
}

/// List complaints matching the filter, newest first.
pub async fn list_complaints(
    pool: &Pool,
    filter: &ComplaintFilter,
) -> Result<Vec<ComplaintRecord>, DatabaseError> {
    debug!("Listing complaints with filter: {:?}", filter);

    let client = client(pool).await?;

    let status = filter.status.map(|s| s.as_str());
    let station = filter.station.as_deref();
    let wallet = filter.wallet_address.as_deref();

    let sql = format!(
        r#"
        SELECT {}
        FROM complaints
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR station = $2)
          AND ($3::text IS NULL OR wallet_address = $3)
        ORDER BY created_at DESC
        "#,
        COMPLAINT_COLUMNS
    );
    let rows = client.query(sql.as_str(), &[&status, &station, &wallet]).await?;

    let mut complaints = Vec::with_capacity(rows.len());
    for row in rows {
        complaints.push(row_to_complaint(&row)?);
    }

    Ok(complaints)
}

/// Insert a complaint unless the hash is already taken.
///
/// The optional notification is written in the same transaction, so it
/// exists only if the complaint was actually created.
pub async fn insert_complaint(
    pool: &Pool,
    record: &ComplaintRecord,
    notification: Option<&NotificationJob>,
) -> Result<InsertOutcome, DatabaseError> {
    debug!("Inserting complaint: {}", record.transaction_hash);

    let mut client = client(pool).await?;
    let tx = client.transaction().await?;

    let inserted = tx
        .query_opt(
            r#"
            INSERT INTO complaints (
                transaction_hash, ipfs_cid, ipfs_url, metadata_uri,
                station, category, wallet_address, status, form_data,
                nft_tx_hash, fir_cid, fir_nft_tx_hash, updates,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (transaction_hash) DO NOTHING
            RETURNING transaction_hash
            "#,
            &[
                &record.transaction_hash,
                &record.ipfs_cid,
                &record.ipfs_url,
                &record.metadata_uri,
                &record.station,
                &record.category,
                &record.wallet_address,
                &record.status.as_str(),
                &Json(&record.form_data),
                &record.nft_tx_hash,
                &record.fir_cid,
                &record.fir_nft_tx_hash,
                &Json(&record.updates),
                &record.created_at,
                &record.updated_at,
            ],
        )
        .await?;

    if inserted.is_none() {
        tx.rollback().await?;
        debug!("Complaint {} already exists", record.transaction_hash);

        let sql = format!(
            "SELECT {} FROM complaints WHERE transaction_hash = $1",
            COMPLAINT_COLUMNS
        );
        let row = client
            .query_opt(sql.as_str(), &[&record.transaction_hash])
            .await?
            .ok_or_else(|| {
                DatabaseError::InvalidData(format!(
                    "conflict on {} but no row found",
                    record.transaction_hash
                ))
            })?;
        return Ok(InsertOutcome::Existing(row_to_complaint(&row)?));
    }

    if let Some(job) = notification {
        insert_notification(&tx, job).await?;
    }

    tx.commit().await?;

    debug!("Complaint recorded: {}", record.transaction_hash);
    Ok(InsertOutcome::Created(record.clone()))
}

/// Patch a complaint and enqueue its notification in one transaction.
///
/// The row is read `FOR UPDATE`, so concurrent updates of the same
/// complaint are applied one after the other.
pub async fn update_complaint(
    pool: &Pool,
    transaction_hash: &str,
    patch: &ComplaintPatch,
    plan: NotificationPlanner<'_>,
) -> Result<Option<UpdateOutcome>, DatabaseError> {
    debug!("Updating complaint: {}", transaction_hash);

    let mut client = client(pool).await?;
    let tx = client.transaction().await?;

    let sql = format!(
        "SELECT {} FROM complaints WHERE transaction_hash = $1 FOR UPDATE",
        COMPLAINT_COLUMNS
    );
    let row = match tx.query_opt(sql.as_str(), &[&transaction_hash]).await? {
        Some(row) => row,
        None => {
            tx.rollback().await?;
            return Ok(None);
        }
    };

    let mut record = row_to_complaint(&row)?;
    patch.apply_to(&mut record, Utc::now());

    tx.execute(
        r#"
        UPDATE complaints
        SET
            status = $2,
            fir_cid = $3,
            nft_tx_hash = $4,
            fir_nft_tx_hash = $5,
            updates = $6,
            updated_at = $7
        WHERE transaction_hash = $1
        "#,
        &[
            &transaction_hash,
            &record.status.as_str(),
            &record.fir_cid,
            &record.nft_tx_hash,
            &record.fir_nft_tx_hash,
            &Json(&record.updates),
            &record.updated_at,
        ],
    )
    .await?;

    let notification = plan(&record);
    if let Some(job) = &notification {
        insert_notification(&tx, job).await?;
    }

    tx.commit().await?;

    debug!(
        "Complaint {} updated: status={}, updates={}",
        transaction_hash,
        record.status,
        record.updates.len()
    );
    Ok(Some(UpdateOutcome {
        record,
        notification,
    }))
}

// ============================================
// NOTIFICATION QUERIES
// ============================================

/// Get every outbox row for a complaint.
pub async fn get_complaint_notifications(
    pool: &Pool,
    transaction_hash: &str,
) -> Result<Vec<NotificationJob>, DatabaseError> {
    let client = client(pool).await?;

    let sql = format!(
        r#"
        SELECT {}
        FROM notifications
        WHERE transaction_hash = $1
        ORDER BY created_at DESC
        "#,
        NOTIFICATION_COLUMNS
    );
    let rows = client.query(sql.as_str(), &[&transaction_hash]).await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        jobs.push(row_to_notification(&row)?);
    }

    Ok(jobs)
}

/// Claim due jobs for delivery.
///
/// `SKIP LOCKED` lets several workers poll the same table; the lease keeps
/// a claimed job invisible until it is marked sent or rescheduled.
pub async fn claim_due_notifications(
    pool: &Pool,
    now: DateTime<Utc>,
    lease: Duration,
    limit: i64,
) -> Result<Vec<NotificationJob>, DatabaseError> {
    let client = client(pool).await?;

    let lease_until = now + lease;
    let sql = format!(
        r#"
        UPDATE notifications
        SET next_attempt_at = $2, updated_at = $1
        WHERE id IN (
            SELECT id FROM notifications
            WHERE status = 'pending' AND next_attempt_at <= $1
            ORDER BY next_attempt_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {}
        "#,
        NOTIFICATION_COLUMNS
    );
    let rows = client
        .query(sql.as_str(), &[&now, &lease_until, &limit])
        .await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        jobs.push(row_to_notification(&row)?);
    }

    if !jobs.is_empty() {
        debug!("Claimed {} notification(s)", jobs.len());
    }
    Ok(jobs)
}

/// Mark a job delivered.
pub async fn mark_notification_sent(
    pool: &Pool,
    id: Uuid,
    sent_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let client = client(pool).await?;

    client
        .execute(
            r#"
            UPDATE notifications
            SET
                status = 'sent',
                attempts = attempts + 1,
                last_error = NULL,
                sent_at = $2,
                updated_at = $2
            WHERE id = $1
            "#,
            &[&id, &sent_at],
        )
        .await?;

    Ok(())
}

/// Record a failed delivery attempt.
///
/// With `retry_at = None` the job is marked `failed` and never retried.
pub async fn record_notification_failure(
    pool: &Pool,
    id: Uuid,
    error: &str,
    retry_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let client = client(pool).await?;

    client
        .execute(
            r#"
            UPDATE notifications
            SET
                attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN $3::timestamptz IS NULL THEN 'failed' ELSE 'pending' END,
                next_attempt_at = COALESCE($3, next_attempt_at),
                updated_at = $4
            WHERE id = $1
            "#,
            &[&id, &error, &retry_at, &now],
        )
        .await?;

    Ok(())
}
