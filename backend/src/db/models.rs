//! # Database Models
//!
//! This module defines the data structures that map to database tables.
//! Each struct represents a row in a table.
//!
//! ## Table Overview
//!
//! | Table | Description |
//! |-------|-------------|
//! | `complaints` | Mirror of on-ledger complaint submissions |
//! | `notifications` | Email outbox drained by the notification worker |
//!
//! ## Relationship Diagram
//!
//! ```text
//! ┌──────────────────────┐       ┌──────────────────────┐
//! │     complaints       │──────<│    notifications     │
//! │                      │       │                      │
//! │ transaction_hash(PK) │       │ transaction_hash(FK) │
//! │ status               │       │ kind                 │
//! │ form_data (jsonb)    │       │ status, attempts     │
//! │ updates (jsonb)      │       │ next_attempt_at      │
//! └──────────────────────┘       └──────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message of the audit entry every new complaint starts with.
pub const SUBMITTED_MESSAGE: &str = "Complaint submitted";

/// Case status as shown on the police dashboard.
///
/// Updates may write any value; there is no enforced ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    /// Submitted, not yet looked at by the station.
    #[default]
    Pending,
    /// Acknowledged or FIR filed.
    InProgress,
    /// Case closed.
    Resolved,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "pending",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ComplaintStatus::Pending),
            "in_progress" => Ok(ComplaintStatus::InProgress),
            "resolved" => Ok(ComplaintStatus::Resolved),
            other => Err(format!("unknown complaint status: {}", other)),
        }
    }
}

/// Citizen-supplied fields collected by the complaint wizard.
///
/// Stored as JSONB and never modified after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,

    /// National identity number.
    #[serde(rename = "aadhar", alias = "nationalId")]
    pub national_id: Option<String>,

    pub address: Option<String>,
    pub incident_date: Option<String>,
    pub incident_time: Option<String>,
    pub incident_location: Option<String>,
    pub description: Option<String>,
    pub witnesses: Option<String>,
}

impl FormData {
    /// Citizen email address, if one was given and is not blank.
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Name used in email salutations.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Citizen")
    }
}

/// One entry of a complaint's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateEntry {
    /// Date as supplied by the client. Filled with today's date when blank.
    #[serde(default)]
    pub date: String,

    /// Human-readable message.
    pub message: String,
}

/// Represents a complaint record in the database.
///
/// This is the off-chain mirror of a complaint submitted to the ledger.
/// The ledger transaction hash is the primary key.
///
/// ## Example
///
/// ```text
/// ComplaintRecord {
///     transaction_hash: "0x9f2c...",
///     station: "Central",
///     category: "theft",
///     status: Pending,
///     updates: [{ date: "2024-01-01", message: "Complaint submitted" }],
///     ...
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRecord {
    /// Ledger transaction hash of the submission. Primary key, immutable.
    pub transaction_hash: String,

    /// CID list of pinned evidence files.
    pub ipfs_cid: Option<String>,

    /// Gateway URL of the evidence.
    pub ipfs_url: Option<String>,

    /// Metadata URI of the receipt token.
    pub metadata_uri: Option<String>,

    pub station: String,
    pub category: String,
    pub wallet_address: String,

    pub status: ComplaintStatus,

    pub form_data: FormData,

    /// Receipt token mint transaction.
    pub nft_tx_hash: Option<String>,

    /// CID of the filed FIR document.
    pub fir_cid: Option<String>,

    /// FIR token mint transaction.
    pub fir_nft_tx_hash: Option<String>,

    /// Append-only audit trail.
    pub updates: Vec<UpdateEntry>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to an existing complaint.
///
/// Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplaintPatch {
    pub status: Option<ComplaintStatus>,
    pub fir_cid: Option<String>,
    pub nft_tx_hash: Option<String>,
    pub fir_nft_tx_hash: Option<String>,
    pub update: Option<UpdateEntry>,
}

impl ComplaintPatch {
    /// Apply the patch in place. Shared by every store implementation.
    pub fn apply_to(&self, record: &mut ComplaintRecord, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(fir_cid) = &self.fir_cid {
            record.fir_cid = Some(fir_cid.clone());
        }
        if let Some(nft_tx_hash) = &self.nft_tx_hash {
            record.nft_tx_hash = Some(nft_tx_hash.clone());
        }
        if let Some(fir_nft_tx_hash) = &self.fir_nft_tx_hash {
            record.fir_nft_tx_hash = Some(fir_nft_tx_hash.clone());
        }
        if let Some(update) = &self.update {
            record.updates.push(update.clone());
        }
        record.updated_at = now;
    }
}

/// Exact-match filters for listing complaints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub station: Option<String>,
    pub wallet_address: Option<String>,
}

impl ComplaintFilter {
    pub fn matches(&self, record: &ComplaintRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.station.as_deref().map_or(true, |s| record.station == s)
            && self
                .wallet_address
                .as_deref()
                .map_or(true, |w| record.wallet_address == w)
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The record was stored (and its notification, if any, enqueued).
    Created(ComplaintRecord),
    /// A record with the same hash already existed; nothing was written.
    Existing(ComplaintRecord),
}

/// Result of a successful patch.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The record as persisted.
    pub record: ComplaintRecord,
    /// Notification enqueued with the change, if any.
    pub notification: Option<NotificationJob>,
}

/// Kinds of email the service sends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Sent once when a complaint is first recorded.
    ComplaintRegistered,
    /// Sent when a station attaches an FIR.
    FirFiled,
    /// Free-form message from the station.
    StationMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ComplaintRegistered => "complaint_registered",
            NotificationKind::FirFiled => "fir_filed",
            NotificationKind::StationMessage => "station_message",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complaint_registered" => Ok(NotificationKind::ComplaintRegistered),
            "fir_filed" => Ok(NotificationKind::FirFiled),
            "station_message" => Ok(NotificationKind::StationMessage),
            other => Err(format!("unknown notification kind: {}", other)),
        }
    }
}

/// Delivery status of an outbox row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Waiting for (re)delivery.
    Pending,
    /// Accepted by the mail transport.
    Sent,
    /// Gave up after the maximum number of attempts.
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {}", other)),
        }
    }
}

/// A row of the notification outbox.
///
/// Written in the same transaction as the complaint change that caused
/// it, then delivered by the notification worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub id: Uuid,
    pub transaction_hash: String,
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub status: NotificationStatus,

    /// Delivery attempts made so far.
    pub attempts: i32,

    pub last_error: Option<String>,

    /// Earliest time the worker may try (again).
    pub next_attempt_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NotificationJob {
    /// Build a fresh pending job, due immediately.
    pub fn new(
        transaction_hash: &str,
        kind: NotificationKind,
        recipient: &str,
        subject: String,
        html_body: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_hash: transaction_hash.to_string(),
            kind,
            recipient: recipient.to_string(),
            subject,
            html_body,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
            sent_at: None,
        }
    }
}
