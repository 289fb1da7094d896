//! # API Request Handlers
//!
//! This module contains the handler functions for each API endpoint.
//! Each handler:
//! 1. Extracts request data
//! 2. Calls the complaint service
//! 3. Publishes live-feed events on success
//! 4. Returns a formatted response
//!
//! ## Error Handling
//!
//! All errors are caught and returned as JSON:
//!
//! ```json
//! {
//!     "success": false,
//!     "error": {
//!         "code": "COMPLAINT_NOT_FOUND",
//!         "message": "Complaint not found: 0x9f2c..."
//!     }
//! }
//! ```
//!
//! Store failures are logged in full and answered with a generic message.

use std::sync::Arc;

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::db::ComplaintRecord;
use crate::models::{
    ApiResponse, ComplaintListResponse, ComplaintQuery, ComplaintResponse, HealthResponse,
    NotificationSummary, RecordEvidenceRequest, UpdateComplaintRequest,
};
use crate::services::ComplaintError;
use crate::utils::truncate_string;
use crate::websocket::{publish_complaint_event, WsEventType};
use crate::AppState;

/// Liveness text served at `GET /`.
pub const LIVENESS_TEXT: &str = "CivicChain backend running";

/// Liveness endpoint.
///
/// ## Endpoint
///
/// `GET /`
pub async fn root() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(LIVENESS_TEXT)
}

/// Health check endpoint.
///
/// ## Endpoint
///
/// `GET /health`
///
/// ## Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "status": "healthy",
///         "database": true,
///         "websocketConnections": 3,
///         "version": "0.1.0",
///         "timestamp": "2025-12-08T12:00:00Z"
///     }
/// }
/// ```
///
/// Answers 503 when the store does not respond.
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let db_healthy = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: store unavailable: {}", e);
            false
        }
    };

    let response = HealthResponse {
        status: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
        database: db_healthy,
        websocket_connections: state.ws_registry.total_connections().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    HttpResponse::build(status_code).json(ApiResponse::success(response))
}

/// Record a complaint submitted on the ledger.
///
/// ## Endpoint
///
/// `POST /api/record-evidence`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:5000/api/record-evidence \
///   -H "Content-Type: application/json" \
///   -d '{
///     "transactionHash": "0x9f2c...",
///     "ipfsCid": "QmA,QmB",
///     "station": "Central",
///     "category": "theft",
///     "formData": { "fullName": "A", "email": "a@b.com" }
///   }'
/// ```
///
/// Answers 201 for a new record and 200 with the stored record when the
/// hash is already known.
pub async fn record_evidence(
    state: web::Data<Arc<AppState>>,
    body: web::Json<RecordEvidenceRequest>,
) -> HttpResponse {
    info!(
        "Record evidence request for: {}",
        truncate_string(body.transaction_hash.trim(), 20)
    );

    match state.complaints.create_if_absent(body.into_inner()).await {
        Ok(result) => {
            if !result.created {
                return HttpResponse::Ok().json(ApiResponse::success(ComplaintResponse {
                    message: "Evidence already recorded".to_string(),
                    created: false,
                    complaint: result.record,
                    notification: None,
                }));
            }

            publish(&state, WsEventType::ComplaintCreated, &result.record).await;

            HttpResponse::Created().json(ApiResponse::success(ComplaintResponse {
                message: "Evidence recorded successfully".to_string(),
                created: true,
                notification: result.notification.as_ref().map(NotificationSummary::from),
                complaint: result.record,
            }))
        }
        Err(e) => complaint_error_response(e, "RECORD_FAILED", "Failed to record complaint"),
    }
}

/// List complaints, newest first.
///
/// ## Endpoint
///
/// `GET /api/complaints?status=pending&station=Central&walletAddress=0x51ab...`
///
/// All query parameters are optional exact-match filters.
pub async fn list_complaints(
    state: web::Data<Arc<AppState>>,
    query: web::Query<ComplaintQuery>,
) -> HttpResponse {
    let filter = query.into_inner().into();

    match state.complaints.list_all(&filter).await {
        Ok(complaints) => HttpResponse::Ok().json(ApiResponse::success(ComplaintListResponse {
            total: complaints.len(),
            complaints,
        })),
        Err(e) => complaint_error_response(
            e,
            "COMPLAINT_QUERY_FAILED",
            "Failed to fetch complaints",
        ),
    }
}

/// Get one complaint.
///
/// ## Endpoint
///
/// `GET /api/complaints/{transactionHash}`
pub async fn get_complaint(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> HttpResponse {
    let transaction_hash = path.into_inner();

    match state.complaints.get(&transaction_hash).await {
        Ok(record) => HttpResponse::Ok().json(ApiResponse::success(record)),
        Err(e) => complaint_error_response(
            e,
            "COMPLAINT_QUERY_FAILED",
            "Failed to fetch complaint",
        ),
    }
}

/// Delivery status of every email queued for a complaint.
///
/// ## Endpoint
///
/// `GET /api/complaints/{transactionHash}/notifications`
///
/// ## Response
///
/// ```json
/// {
///     "success": true,
///     "data": [
///         { "kind": "fir_filed", "status": "failed", "attempts": 5,
///           "lastError": "Mail transport error: ..." }
///     ]
/// }
/// ```
pub async fn get_complaint_notifications(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> HttpResponse {
    let transaction_hash = path.into_inner();

    match state.complaints.notifications_for(&transaction_hash).await {
        Ok(jobs) => {
            let summaries: Vec<NotificationSummary> =
                jobs.iter().map(NotificationSummary::from).collect();
            HttpResponse::Ok().json(ApiResponse::success(summaries))
        }
        Err(e) => complaint_error_response(
            e,
            "COMPLAINT_QUERY_FAILED",
            "Failed to fetch notifications",
        ),
    }
}

/// Apply a station update to a complaint.
///
/// ## Endpoint
///
/// `POST /api/update-complaint`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:5000/api/update-complaint \
///   -H "Content-Type: application/json" \
///   -d '{
///     "id": "0x9f2c...",
///     "firCid": "Qm123",
///     "updates": { "date": "2024-01-01", "message": "FIR filed" }
///   }'
/// ```
///
/// The response is the same whether or not the queued email is later
/// delivered.
pub async fn update_complaint(
    state: web::Data<Arc<AppState>>,
    body: web::Json<UpdateComplaintRequest>,
) -> HttpResponse {
    info!(
        "Update complaint request for: {}",
        truncate_string(body.id.trim(), 20)
    );

    match state.complaints.apply_update(body.into_inner()).await {
        Ok(outcome) => {
            publish(&state, WsEventType::ComplaintUpdated, &outcome.record).await;

            HttpResponse::Ok().json(ApiResponse::success(ComplaintResponse {
                message: "Updated successfully".to_string(),
                created: false,
                notification: outcome.notification.as_ref().map(NotificationSummary::from),
                complaint: outcome.record,
            }))
        }
        Err(e) => complaint_error_response(e, "UPDATE_FAILED", "Failed to update complaint"),
    }
}

/// Turn a JSON body rejection into a 400 envelope.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("Rejected request body: {}", err);
    let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error(
        "INVALID_REQUEST",
        &format!("Invalid request body: {}", err),
    ));
    InternalError::from_response(err, response).into()
}

/// Turn a query string rejection into a 400 envelope.
pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("Rejected query string: {}", err);
    let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error(
        "INVALID_REQUEST",
        &format!("Invalid query string: {}", err),
    ));
    InternalError::from_response(err, response).into()
}

async fn publish(state: &AppState, event: WsEventType, record: &ComplaintRecord) {
    if let Err(e) = publish_complaint_event(&state.ws_registry, event, record).await {
        warn!(
            "Failed to publish {:?} for {}: {}",
            event,
            truncate_string(&record.transaction_hash, 20),
            e
        );
    }
}

fn complaint_error_response(
    err: ComplaintError,
    failure_code: &str,
    failure_message: &str,
) -> HttpResponse {
    match &err {
        ComplaintError::MissingField(field) => {
            let code = match *field {
                "transactionHash" => "TRANSACTION_HASH_REQUIRED",
                "id" => "ID_REQUIRED",
                _ => "INVALID_REQUEST",
            };
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(code, &err.to_string()))
        }
        ComplaintError::NotFound(_) => HttpResponse::NotFound()
            .json(ApiResponse::<()>::error("COMPLAINT_NOT_FOUND", &err.to_string())),
        ComplaintError::DatabaseError(e) => {
            error!("{}: {}", failure_message, e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(failure_code, failure_message))
        }
    }
}
