//! # CivicChain Backend Service
//!
//! This is the main entry point for the backend that mirrors on-ledger
//! citizen complaints into PostgreSQL. It provides:
//!
//! - REST API for recording, listing and updating complaints
//! - WebSocket topics for live dashboard updates
//! - A background worker that delivers citizen emails
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BACKEND SERVICE                           │
//! │                                                                  │
//! │  ┌──────────────────┐  ┌─────────────┐  ┌────────────────────┐  │
//! │  │  REST API        │  │  WebSocket  │  │ Background Worker  │  │
//! │  │  (Actix)         │  │  /ws/:topic │  │ • Email outbox     │  │
//! │  │  /record-evidence│  │             │  │   delivery + retry │  │
//! │  │  /complaints     │  │             │  │                    │  │
//! │  │  /update-complaint│ │             │  │                    │  │
//! │  └──────────────────┘  └─────────────┘  └────────────────────┘  │
//! │         │                    ▲                    │              │
//! │         ▼                    │ events             ▼              │
//! │  ┌───────────────────────────┴───────┐   ┌──────────────────┐   │
//! │  │  ComplaintService + Notifier      │   │  SMTP relay      │   │
//! │  └───────────────────────────────────┘   └──────────────────┘   │
//! │                          │                                       │
//! │                   ┌──────┴──────┐                                │
//! │                   │  PostgreSQL │  complaints + notifications    │
//! │                   └─────────────┘                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! 1. Set up PostgreSQL and create the database
//! 2. Copy `.env.example` to `.env` and configure
//! 3. Start the server: `cargo run` (migrations run at start-up)

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api;
mod config;
mod db;
mod models;
mod services;
mod utils;
mod websocket;

use config::AppConfig;
use db::{ComplaintStore, Database};
use services::{ComplaintService, LogMailer, MailTransport, NotificationWorker, Notifier, SmtpMailer};
use websocket::WsRegistry;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,civicchain_backend=debug";

/// Application state shared across all handlers.
pub struct AppState {
    /// Complaint and outbox storage.
    pub store: Arc<dyn ComplaintStore>,

    /// Complaint lifecycle service
    pub complaints: ComplaintService,

    /// WebSocket connection registry for live updates
    pub ws_registry: WsRegistry,
}

impl AppState {
    pub fn new(store: Arc<dyn ComplaintStore>, config: &AppConfig) -> Self {
        let notifier = Notifier::new(&config.ipfs_gateway_url);
        Self {
            complaints: ComplaintService::new(store.clone(), notifier),
            store,
            ws_registry: WsRegistry::new(),
        }
    }
}

/// Main entry point for the backend service.
///
/// This function:
/// 1. Loads configuration from environment
/// 2. Connects to PostgreSQL and applies the schema
/// 3. Starts the notification worker
/// 4. Launches the HTTP server
/// 5. Stops the worker once the server has shut down
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // =========================================
    // STEP 1: Initialize Logging
    // =========================================
    dotenvy::dotenv().ok(); // .env is optional and may set RUST_LOG

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| startup_error("Failed to set tracing subscriber", e))?;

    info!("🚀 Starting CivicChain Backend Service");

    // =========================================
    // STEP 2: Load Configuration
    // =========================================
    let config = AppConfig::from_env()
        .map_err(|e| startup_error("Failed to load configuration", e))?;

    info!("📋 Configuration loaded");
    info!("   IPFS gateway: {}", config.ipfs_gateway_url);
    info!(
        "   Notification worker: every {}s, {} attempts max",
        config.notification_poll_interval, config.notification_max_attempts
    );

    // =========================================
    // STEP 3: Initialize Database
    // =========================================
    let db = Database::connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;

    info!("🗄️  Database connected");

    db.run_migrations()
        .await
        .map_err(|e| startup_error("Failed to run migrations", e))?;

    info!("📦 Database migrations complete");

    let store: Arc<dyn ComplaintStore> = Arc::new(db);

    // =========================================
    // STEP 4: Initialize Mail Transport
    // =========================================
    let mailer: Arc<dyn MailTransport> = match &config.smtp {
        Some(settings) => Arc::new(
            SmtpMailer::new(settings, &config.mail_from)
                .map_err(|e| startup_error("Failed to configure SMTP", e))?,
        ),
        None => {
            warn!("EMAIL_USER/EMAIL_PASS not set; outgoing mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    // =========================================
    // STEP 5: Create Application State
    // =========================================
    let app_state = Arc::new(AppState::new(store.clone(), &config));

    // =========================================
    // STEP 6: Start Background Services
    // =========================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = NotificationWorker::new(store, mailer, &config);
    let worker_handle = tokio::spawn(async move {
        worker.start(shutdown_rx).await;
    });

    info!("📧 Notification worker started");

    // =========================================
    // STEP 7: Start HTTP Server
    // =========================================
    let server_host = config.server_host.clone();
    let server_port = config.server_port;
    let cors_origin = config.cors_allowed_origin.clone();

    info!("🌐 Starting HTTP server on {}:{}", server_host, server_port);

    let server_result = HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
            None => Cors::permissive(),
        };

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(api::configure_routes)
            .configure(websocket::configure_routes)
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await;

    // =========================================
    // STEP 8: Shut Down Background Services
    // =========================================
    info!("🛑 HTTP server stopped, shutting down notification worker");
    shutdown_tx.send(true).ok();
    if let Err(e) = worker_handle.await {
        error!("Notification worker task failed: {}", e);
    }

    server_result
}

/// Log a fatal start-up failure and turn it into the error `main` returns.
fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}
