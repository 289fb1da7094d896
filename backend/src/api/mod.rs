//! # REST API Module
//!
//! This module defines all HTTP endpoints for the CivicChain backend.
//!
//! ## Endpoint Overview
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/` | Liveness text |
//! | GET | `/health` | Health check |
//! | POST | `/api/record-evidence` | Record a complaint once |
//! | GET | `/api/complaints` | List complaints, newest first |
//! | GET | `/api/complaints/:hash` | One complaint |
//! | GET | `/api/complaints/:hash/notifications` | Email delivery status |
//! | POST | `/api/update-complaint` | Apply a station update |
//!
//! ## Request/Response Format
//!
//! All JSON responses use one envelope:
//!
//! ```json
//! // Success response
//! {
//!     "success": true,
//!     "data": { ... }
//! }
//!
//! // Error response
//! {
//!     "success": false,
//!     "error": {
//!         "code": "ERROR_CODE",
//!         "message": "Human readable message"
//!     }
//! }
//! ```

pub mod handlers;
pub mod routes;

pub use routes::configure_routes;
