//! # Utilities Module
//!
//! This module contains helper functions and utilities used
//! across the backend service.

use chrono::{DateTime, Utc};

/// Date format used for audit trail entries.
pub const UPDATE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp as an audit-trail date (`YYYY-MM-DD`).
pub fn format_update_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format(UPDATE_DATE_FORMAT).to_string()
}

/// Trim an optional string, treating blank values as absent.
///
/// Clients send `""` for fields they have nothing for; those must not
/// overwrite stored values.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Escape text for interpolation into an HTML email body.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Truncate a string to a maximum length.
///
/// Useful for logging long transaction hashes.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let half = max_len.saturating_sub(3) / 2;
        let head: String = s.chars().take(half).collect();
        let tail: String = s
            .chars()
            .rev()
            .take(half)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}...{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_update_date() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
        assert_eq!(format_update_date(ts), "2024-01-01");
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("".to_string())), None);
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(Some(" Qm123 ".to_string())), Some("Qm123".to_string()));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("abcdefghij", 10), "abcdefghij");
        assert_eq!(truncate_string("abcdefghijklmnop", 10), "abc...nop");
    }
}
