//! # Services Module
//!
//! This module contains the business logic of the CivicChain backend.
//! Handlers stay thin and call into these services.
//!
//! ## Services Overview
//!
//! | Service | Responsibility |
//! |---------|---------------|
//! | `ComplaintService` | Create-if-absent, list, lookup, apply-update |
//! | `Notifier` | Decide which email a change triggers and render it |
//! | `NotificationWorker` | Deliver queued emails, retry with backoff |
//! | `MailTransport` | SMTP (or log-only) delivery of one message |
//!
//! ## Service Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SERVICES LAYER                            │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                   ComplaintService                        │   │
//! │  │  • create_if_absent()  • list_all()  • apply_update()     │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │            │ plans email via              │ writes record +     │
//! │            ▼                              ▼ outbox row          │
//! │  ┌────────────┐                   ┌──────────────────┐          │
//! │  │  Notifier  │                   │  ComplaintStore  │          │
//! │  └────────────┘                   └──────────────────┘          │
//! │                                           ▲ claims due jobs     │
//! │  ┌────────────────────┐           ┌───────┴──────────┐          │
//! │  │   MailTransport    │◀──────────│NotificationWorker│          │
//! │  │ SmtpMailer/LogMailer│  send     └──────────────────┘          │
//! │  └────────────────────┘                                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod complaint_service;
pub mod mailer;
pub mod notification_worker;
pub mod notifier;

pub use complaint_service::{ComplaintError, ComplaintService};
pub use mailer::{LogMailer, MailTransport, SmtpMailer};
pub use notification_worker::NotificationWorker;
pub use notifier::Notifier;
