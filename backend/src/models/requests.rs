//! # API Request Models
//!
//! Structures for incoming API request bodies and query strings.
//! Each struct represents the expected JSON for an endpoint; anything
//! that fails to deserialize is rejected before it reaches the service.

use serde::{Deserialize, Deserializer, Serialize};

use crate::db::{ComplaintFilter, ComplaintStatus, FormData, UpdateEntry};
use crate::utils::non_blank;

/// Request to mirror an on-ledger complaint into the store.
///
/// ## Example JSON
///
/// ```json
/// {
///     "transactionHash": "0x9f2c...",
///     "ipfsCid": "QmA,QmB",
///     "station": "Central",
///     "category": "theft",
///     "walletAddress": "0x51ab...",
///     "formData": { "fullName": "A", "email": "a@b.com" }
/// }
/// ```
///
/// ## Notes
///
/// - `transactionHash` is the only required field; it is checked by the
///   service so a missing hash gets a specific error code
/// - `status` defaults to `pending`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvidenceRequest {
    /// Ledger transaction hash of the complaint submission.
    #[serde(default, deserialize_with = "null_as_default")]
    pub transaction_hash: String,

    pub ipfs_cid: Option<String>,
    pub ipfs_url: Option<String>,
    pub metadata_uri: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub station: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub wallet_address: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub form_data: FormData,

    pub status: Option<ComplaintStatus>,
}

/// Request to patch a complaint.
///
/// ## Example JSON
///
/// ```json
/// {
///     "id": "0x9f2c...",
///     "firCid": "Qm123",
///     "firNftTxHash": "0x77e0...",
///     "status": "in_progress",
///     "updates": { "date": "2024-01-01", "message": "FIR filed" }
/// }
/// ```
///
/// ## Notes
///
/// - `id` is the complaint's transaction hash
/// - `updates` is a single entry appended to the audit trail
/// - `notify` asks for the entry to be emailed to the citizen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComplaintRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    pub updates: Option<UpdateEntry>,
    pub status: Option<ComplaintStatus>,
    pub fir_cid: Option<String>,
    pub nft_tx_hash: Option<String>,
    pub fir_nft_tx_hash: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub notify: bool,
}

/// Treat an explicit JSON `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Query string for `GET /api/complaints`.
///
/// All filters are exact matches and optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintQuery {
    pub status: Option<ComplaintStatus>,
    pub station: Option<String>,
    pub wallet_address: Option<String>,
}

impl From<ComplaintQuery> for ComplaintFilter {
    fn from(query: ComplaintQuery) -> Self {
        ComplaintFilter {
            status: query.status,
            station: non_blank(query.station),
            wallet_address: non_blank(query.wallet_address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_request_minimal() {
        let req: RecordEvidenceRequest =
            serde_json::from_str(r#"{"transactionHash":"0xAA"}"#).unwrap();
        assert_eq!(req.transaction_hash, "0xAA");
        assert!(req.station.is_empty());
        assert!(req.status.is_none());
        assert_eq!(req.form_data, FormData::default());
    }

    #[test]
    fn test_record_request_missing_hash_deserializes_empty() {
        let req: RecordEvidenceRequest = serde_json::from_str(r#"{"station":"Central"}"#).unwrap();
        assert!(req.transaction_hash.is_empty());
    }

    #[test]
    fn test_record_request_null_fields_are_defaulted() {
        let req: RecordEvidenceRequest = serde_json::from_str(
            r#"{"transactionHash":"0xAA","station":null,"category":null,
                "walletAddress":null,"formData":null}"#,
        )
        .unwrap();
        assert_eq!(req.transaction_hash, "0xAA");
        assert!(req.station.is_empty());
        assert!(req.category.is_empty());
        assert!(req.wallet_address.is_empty());
        assert_eq!(req.form_data, FormData::default());

        let req: RecordEvidenceRequest =
            serde_json::from_str(r#"{"transactionHash":null}"#).unwrap();
        assert!(req.transaction_hash.is_empty());
    }

    #[test]
    fn test_update_request_null_id_and_notify() {
        let req: UpdateComplaintRequest =
            serde_json::from_str(r#"{"id":null,"notify":null}"#).unwrap();
        assert!(req.id.is_empty());
        assert!(!req.notify);
    }

    #[test]
    fn test_record_request_rejects_unknown_status() {
        let result: Result<RecordEvidenceRequest, _> =
            serde_json::from_str(r#"{"transactionHash":"0xAA","status":"closed"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_request_notify_defaults_false() {
        let req: UpdateComplaintRequest =
            serde_json::from_str(r#"{"id":"0xAA","status":"resolved"}"#).unwrap();
        assert!(!req.notify);
        assert_eq!(req.status, Some(ComplaintStatus::Resolved));
    }

    #[test]
    fn test_update_entry_date_optional() {
        let req: UpdateComplaintRequest =
            serde_json::from_str(r#"{"id":"0xAA","updates":{"message":"hi"}}"#).unwrap();
        let entry = req.updates.unwrap();
        assert!(entry.date.is_empty());
        assert_eq!(entry.message, "hi");
    }

    #[test]
    fn test_query_blank_filters_dropped() {
        let filter: ComplaintFilter = ComplaintQuery {
            status: None,
            station: Some(" ".to_string()),
            wallet_address: Some("0xw".to_string()),
        }
        .into();
        assert!(filter.station.is_none());
        assert_eq!(filter.wallet_address.as_deref(), Some("0xw"));
    }
}
