//! # API Route Configuration
//!
//! This module sets up all the HTTP routes for the API.

use actix_web::web;

use super::handlers;

/// Configure all API routes.
///
/// This function is called from main.rs to set up
/// all the endpoint routes.
///
/// ## Route Structure
///
/// ```text
/// /                          GET - Liveness text
/// ├── /health                GET - Health check
/// └── /api
///     ├── /record-evidence   POST - Create complaint if absent
///     ├── /complaints        GET - List complaints (filterable)
///     ├── /complaints/:hash  GET - One complaint
///     ├── /complaints/:hash/notifications  GET - Email delivery status
///     └── /update-complaint  POST - Apply station update
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Body and query rejections use the API envelope
        .app_data(web::JsonConfig::default().error_handler(handlers::json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(handlers::query_error_handler))

        .route("/", web::get().to(handlers::root))
        .route("/health", web::get().to(handlers::health_check))

        .service(
            web::scope("/api")
                // Mirror an on-ledger submission
                .route("/record-evidence", web::post().to(handlers::record_evidence))

                .route("/complaints", web::get().to(handlers::list_complaints))
                .route(
                    "/complaints/{transaction_hash}",
                    web::get().to(handlers::get_complaint),
                )
                .route(
                    "/complaints/{transaction_hash}/notifications",
                    web::get().to(handlers::get_complaint_notifications),
                )

                // Station dashboard updates
                .route("/update-complaint", web::post().to(handlers::update_complaint)),
        );
}
