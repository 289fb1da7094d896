//! # Database Module
//!
//! This module handles all persistence for the CivicChain backend.
//! We use PostgreSQL for storing:
//!
//! - Complaint records (mirrors of on-ledger submissions)
//! - The notification outbox (emails waiting for delivery)
//!
//! ## Why a Store Trait?
//!
//! The service layer talks to [`ComplaintStore`] rather than to the pool
//! directly. [`Database`] is the PostgreSQL implementation used in
//! production; tests run the same service code against an in-memory
//! store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DATABASE LAYER                              │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                 ComplaintStore (trait)                    │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                              │                                   │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                   Connection Pool                         │   │
//! │  │                  (deadpool-postgres)                      │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                              │                                   │
//! │              ┌───────────────┴───────────────┐                  │
//! │              ▼                               ▼                  │
//! │       ┌────────────┐                 ┌──────────────┐           │
//! │       │ complaints │                 │notifications │           │
//! │       │   table    │                 │   (outbox)   │           │
//! │       └────────────┘                 └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod models;
pub mod queries;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use thiserror::Error;
use tokio_postgres::{Config as TokioConfig, NoTls};
use tracing::{error, info};
use uuid::Uuid;

/// Schema applied at start-up. Every statement is idempotent.
const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to connect to the database
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryError(#[from] tokio_postgres::Error),

    /// Migration failed
    #[error("Migration failed: {0}")]
    MigrationError(String),

    /// A stored value could not be decoded
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Builds the notification (if any) for a complaint after a patch has
/// been applied. Runs inside the store's write transaction.
pub type NotificationPlanner<'a> =
    &'a (dyn Fn(&ComplaintRecord) -> Option<NotificationJob> + Send + Sync);

/// Persistence operations the complaint service and notification worker
/// rely on.
///
/// Implementations must write a complaint change and the notification it
/// produced atomically.
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Cheap connectivity check for `/health`.
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Insert a new complaint unless one with the same hash exists.
    ///
    /// The notification is only written when the complaint is.
    async fn insert_complaint(
        &self,
        record: &ComplaintRecord,
        notification: Option<&NotificationJob>,
    ) -> Result<InsertOutcome, DatabaseError>;

    async fn find_complaint(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<ComplaintRecord>, DatabaseError>;

    /// All matching complaints, newest first.
    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> Result<Vec<ComplaintRecord>, DatabaseError>;

    /// Apply `patch` to the complaint and enqueue whatever `plan` returns
    /// for the patched record. `Ok(None)` when the complaint is unknown.
    async fn update_complaint(
        &self,
        transaction_hash: &str,
        patch: &ComplaintPatch,
        plan: NotificationPlanner<'_>,
    ) -> Result<Option<UpdateOutcome>, DatabaseError>;

    /// Outbox rows for one complaint, newest first.
    async fn notifications_for(
        &self,
        transaction_hash: &str,
    ) -> Result<Vec<NotificationJob>, DatabaseError>;

    /// Claim up to `limit` pending jobs due at `now`, pushing their next
    /// attempt time out by `lease` so no other worker picks them up.
    async fn claim_due_notifications(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: i64,
    ) -> Result<Vec<NotificationJob>, DatabaseError>;

    async fn mark_notification_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Record a failed attempt. `retry_at = None` marks the job failed for
    /// good.
    async fn record_notification_failure(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

/// PostgreSQL-backed store.
///
/// This struct wraps the connection pool and implements
/// [`ComplaintStore`] with the queries in [`queries`].
///
/// ## Usage
///
/// ```rust,ignore
/// let db = Database::connect("postgres://...").await?;
/// db.run_migrations().await?;
/// let complaint = db.find_complaint("0x9f2c...").await?;
/// ```
#[derive(Clone)]
pub struct Database {
    /// The connection pool
    pool: Pool,
}

impl Database {
    /// Connect to the PostgreSQL database.
    ///
    /// Creates a connection pool of at most 10 connections and verifies
    /// it with a trivial query.
    ///
    /// ## Arguments
    ///
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        info!("Connecting to database...");

        let tokio_config = database_url
            .parse::<TokioConfig>()
            .map_err(|e| DatabaseError::ConfigError(format!("Invalid database URL: {}", e)))?;

        let mut config = Config::new();

        if let Some(dbname) = tokio_config.get_dbname() {
            config.dbname = Some(dbname.to_string());
        }
        if let Some(user) = tokio_config.get_user() {
            config.user = Some(user.to_string());
        }
        if let Some(password) = tokio_config.get_password() {
            config.password = Some(String::from_utf8_lossy(password).to_string());
        }
        if let Some(tokio_postgres::config::Host::Tcp(host)) = tokio_config.get_hosts().first() {
            config.host = Some(host.clone());
        }
        if let Some(port) = tokio_config.get_ports().first() {
            config.port = Some(*port);
        }

        config.pool = Some(deadpool_postgres::PoolConfig {
            max_size: 10,
            ..Default::default()
        });

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        let client = pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Apply the bundled schema.
    ///
    /// The schema only uses `IF NOT EXISTS` statements, so running it on
    /// every start-up is safe.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        info!("Running database migrations...");

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        if let Err(e) = client.batch_execute(INITIAL_SCHEMA).await {
            let detail = e
                .as_db_error()
                .and_then(|db_err| db_err.detail())
                .unwrap_or("No detail available");
            error!("Migration execution error: {} ({})", e, detail);
            return Err(DatabaseError::MigrationError(format!("{} ({})", e, detail)));
        }

        info!("Migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl ComplaintStore for Database {
    async fn ping(&self) -> Result<(), DatabaseError> {
        queries::ping(&self.pool).await
    }

    async fn insert_complaint(
        &self,
        record: &ComplaintRecord,
        notification: Option<&NotificationJob>,
    ) -> Result<InsertOutcome, DatabaseError> {
        queries::insert_complaint(&self.pool, record, notification).await
    }

    async fn find_complaint(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<ComplaintRecord>, DatabaseError> {
        queries::get_complaint(&self.pool, transaction_hash).await
    }

    async fn list_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> Result<Vec<ComplaintRecord>, DatabaseError> {
        queries::list_complaints(&self.pool, filter).await
    }

    async fn update_complaint(
        &self,
        transaction_hash: &str,
        patch: &ComplaintPatch,
        plan: NotificationPlanner<'_>,
    ) -> Result<Option<UpdateOutcome>, DatabaseError> {
        queries::update_complaint(&self.pool, transaction_hash, patch, plan).await
    }

    async fn notifications_for(
        &self,
        transaction_hash: &str,
    ) -> Result<Vec<NotificationJob>, DatabaseError> {
        queries::get_complaint_notifications(&self.pool, transaction_hash).await
    }

    async fn claim_due_notifications(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: i64,
    ) -> Result<Vec<NotificationJob>, DatabaseError> {
        queries::claim_due_notifications(&self.pool, now, lease, limit).await
    }

    async fn mark_notification_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        queries::mark_notification_sent(&self.pool, id, sent_at).await
    }

    async fn record_notification_failure(
        &self,
        id: Uuid,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        queries::record_notification_failure(&self.pool, id, error, retry_at, now).await
    }
}

// Re-export commonly used items
pub use models::*;
