//! # API Response Models
//!
//! Structures for outgoing API response bodies.
//! All responses are wrapped in a standard format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    ComplaintRecord, NotificationJob, NotificationKind, NotificationStatus,
};

/// Standard API response wrapper.
///
/// All API responses follow this format:
///
/// ## Success Response
///
/// ```json
/// {
///     "success": true,
///     "data": { ... },
///     "error": null
/// }
/// ```
///
/// ## Error Response
///
/// ```json
/// {
///     "success": false,
///     "data": null,
///     "error": {
///         "code": "COMPLAINT_NOT_FOUND",
///         "message": "Complaint not found: 0x9f2c..."
///     }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the request was successful.
    pub success: bool,

    /// Response data (null on error).
    pub data: Option<T>,

    /// Error information (null on success).
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// API error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Error code (e.g., "COMPLAINT_NOT_FOUND").
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

/// Delivery status of one notification, without its rendered body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient: String,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<&NotificationJob> for NotificationSummary {
    fn from(job: &NotificationJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            recipient: job.recipient.clone(),
            status: job.status,
            attempts: job.attempts,
            last_error: job.last_error.clone(),
            created_at: job.created_at,
            sent_at: job.sent_at,
        }
    }
}

/// Result of `POST /api/record-evidence` and `POST /api/update-complaint`.
///
/// ## Example Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "message": "Complaint recorded successfully",
///         "created": true,
///         "complaint": { "transactionHash": "0x9f2c...", "status": "pending", ... },
///         "notification": { "kind": "complaint_registered", "status": "pending", ... }
///     }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintResponse {
    pub message: String,

    /// `false` for duplicate creates and for updates.
    pub created: bool,

    pub complaint: ComplaintRecord,

    /// Email queued by this call, if any.
    pub notification: Option<NotificationSummary>,
}

/// Complaint list response.
///
/// Returned by `GET /api/complaints`, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintListResponse {
    pub complaints: Vec<ComplaintRecord>,
    pub total: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy" or "unhealthy".
    pub status: String,

    /// Whether the complaint store answered.
    pub database: bool,

    /// Open live-feed connections.
    pub websocket_connections: usize,

    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let value = serde_json::to_value(ApiResponse::<()>::error("COMPLAINT_NOT_FOUND", "nope"))
            .unwrap();
        assert_eq!(value["success"], false);
        assert!(value["data"].is_null());
        assert_eq!(value["error"]["code"], "COMPLAINT_NOT_FOUND");
    }

    #[test]
    fn test_summary_omits_body() {
        let job = NotificationJob::new(
            "0xAA",
            NotificationKind::FirFiled,
            "a@b.com",
            "subject".to_string(),
            "<p>secret body</p>".to_string(),
        );
        let value = serde_json::to_value(NotificationSummary::from(&job)).unwrap();
        assert_eq!(value["kind"], "fir_filed");
        assert_eq!(value["status"], "pending");
        assert!(value.get("htmlBody").is_none());
    }
}
