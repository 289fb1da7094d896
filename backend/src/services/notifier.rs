//! # Notification Templates
//!
//! Renders the three citizen emails and decides which one (if any) a
//! complaint operation produces.
//!
//! | Kind | Trigger |
//! |------|---------|
//! | `complaint_registered` | New complaint with a contact email |
//! | `fir_filed` | Update carrying an FIR CID |
//! | `station_message` | Update with `notify` and a message, no FIR |
//!
//! Every interpolated value is HTML-escaped.

use chrono::Utc;

use crate::db::{
    ComplaintPatch, ComplaintRecord, ComplaintStatus, NotificationJob, NotificationKind,
};
use crate::utils::{escape_html, format_update_date};

/// Renders notification jobs for complaints.
#[derive(Debug, Clone)]
pub struct Notifier {
    /// Gateway prefix for FIR links, without a trailing slash.
    ipfs_gateway_url: String,
}

impl Notifier {
    pub fn new(ipfs_gateway_url: &str) -> Self {
        Self {
            ipfs_gateway_url: ipfs_gateway_url.trim_end_matches('/').to_string(),
        }
    }

    /// Link to a pinned FIR document.
    pub fn fir_link(&self, fir_cid: &str) -> String {
        format!("{}/{}", self.ipfs_gateway_url, fir_cid)
    }

    /// Confirmation for a newly recorded complaint. `None` without an email.
    pub fn complaint_registered(&self, record: &ComplaintRecord) -> Option<NotificationJob> {
        let email = record.form_data.contact_email()?;

        let subject = match record.status {
            ComplaintStatus::Pending => "Complaint Registered - Pending Review".to_string(),
            other => format!("Complaint Registered - {}", other),
        };

        let body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #2c3e50;">Complaint Registered</h2>
    <p>Dear {name},</p>
    <p>Your complaint has been recorded on the blockchain and in the station's case register.</p>
    <div style="background-color: #f8f9fa; border-left: 4px solid #007bff; padding: 15px; margin: 20px 0;">
        <p style="margin: 5px 0;"><strong>Station:</strong> {station}</p>
        <p style="margin: 5px 0;"><strong>Category:</strong> {category}</p>
        <p style="margin: 5px 0;"><strong>Transaction Hash:</strong> <span style="font-family: monospace;">{hash}</span></p>
    </div>
    <p>The police station has been notified. Further updates will be sent to this address when an officer processes your case.</p>
    {footer}
</div>"#,
            name = escape_html(record.form_data.display_name()),
            station = escape_html(&record.station),
            category = escape_html(&record.category),
            hash = escape_html(&record.transaction_hash),
            footer = footer("Your complaint reference ID is your transaction hash."),
        );

        Some(NotificationJob::new(
            &record.transaction_hash,
            NotificationKind::ComplaintRegistered,
            email,
            subject,
            body,
        ))
    }

    /// FIR filed notice, with the officer's remark when one was given.
    pub fn fir_filed(
        &self,
        record: &ComplaintRecord,
        fir_cid: &str,
        remark: Option<&str>,
    ) -> Option<NotificationJob> {
        let email = record.form_data.contact_email()?;

        let remark_block = remark
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| {
                format!(
                    r#"<div style="background-color: #fff3cd; border: 1px solid #ffeeba; color: #856404; padding: 10px; margin-bottom: 20px; border-radius: 4px;">
        <strong>Officer Remarks:</strong> {}
    </div>"#,
                    escape_html(r)
                )
            })
            .unwrap_or_default();

        let body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #2c3e50;">FIR Filed Successfully</h2>
    <p>Dear {name},</p>
    <p>A <strong>First Information Report (FIR)</strong> has been officially filed for your complaint.</p>
    <div style="background-color: #f8f9fa; border-left: 4px solid #28a745; padding: 15px; margin: 20px 0;">
        <p style="margin: 5px 0;"><strong>Complaint ID:</strong> {hash}</p>
        <p style="margin: 5px 0;"><strong>Status:</strong> {status}</p>
        <p style="margin: 5px 0;"><strong>Date:</strong> {date}</p>
    </div>
    {remark}
    <p>You can view the digital FIR document using the link below:</p>
    <p>
        <a href="{link}" style="background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;">View FIR Document</a>
    </p>
    {footer}
</div>"#,
            name = escape_html(record.form_data.display_name()),
            hash = escape_html(&record.transaction_hash),
            status = status_label(record.status),
            date = format_update_date(Utc::now()),
            remark = remark_block,
            link = escape_html(&self.fir_link(fir_cid)),
            footer = footer("Your complaint is securely recorded on the blockchain."),
        );

        Some(NotificationJob::new(
            &record.transaction_hash,
            NotificationKind::FirFiled,
            email,
            "FIR Filed - Complaint Status Update".to_string(),
            body,
        ))
    }

    /// Free-form message from the station to the citizen.
    pub fn station_message(
        &self,
        record: &ComplaintRecord,
        message: &str,
    ) -> Option<NotificationJob> {
        let email = record.form_data.contact_email()?;

        let signature = if record.station.trim().is_empty() {
            "Station Officer"
        } else {
            record.station.as_str()
        };

        let body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #2c3e50;">New Message from Police Station</h2>
    <p>Dear {name},</p>
    <div style="background-color: #f8f9fa; border-left: 4px solid #007bff; padding: 15px; margin: 20px 0;">
        <p style="margin: 5px 0; font-size: 16px;">"{message}"</p>
        <p style="margin: 10px 0 0; font-size: 12px; color: #666;">- {signature}</p>
    </div>
    {footer}
</div>"#,
            name = escape_html(record.form_data.display_name()),
            message = escape_html(message),
            signature = escape_html(signature),
            footer = footer("You can view the full status of your case on the citizen portal."),
        );

        Some(NotificationJob::new(
            &record.transaction_hash,
            NotificationKind::StationMessage,
            email,
            format!("Update on your Complaint - {}", record.transaction_hash),
            body,
        ))
    }

    /// Decide the notification for a patched record.
    ///
    /// An FIR CID wins over a station message; a station message needs the
    /// `notify` flag and an update entry. Nothing is sent without an email.
    pub fn plan_for_update(
        &self,
        record: &ComplaintRecord,
        patch: &ComplaintPatch,
        notify: bool,
    ) -> Option<NotificationJob> {
        if let Some(fir_cid) = &patch.fir_cid {
            let remark = patch.update.as_ref().map(|u| u.message.as_str());
            return self.fir_filed(record, fir_cid, remark);
        }

        if notify {
            if let Some(update) = &patch.update {
                return self.station_message(record, &update.message);
            }
        }

        None
    }
}

fn status_label(status: ComplaintStatus) -> &'static str {
    match status {
        ComplaintStatus::Pending => "Pending",
        ComplaintStatus::InProgress => "In Progress",
        ComplaintStatus::Resolved => "Resolved",
    }
}

fn footer(note: &str) -> String {
    format!(
        r#"<p style="font-size: 12px; color: #6c757d; margin-top: 30px;">
        This is an automated message. Please do not reply directly to this email.<br>
        {}
    </p>"#,
        note
    )
}
