use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LeadId, LeadStatus};

/// A lead row as the remote store returns it. `id`, `created_at`, and the
/// initial `status` are assigned server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: LeadId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Creation payload. Status and ownership cannot be expressed here; the
/// remote store binds both to the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    pub status: LeadStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn lead_record_parses_a_remote_row() {
        let row = serde_json::json!({
            "id": "7b0e1e2a-9f62-4c83-9a43-cc0a1f0cf26d",
            "name": "Ana",
            "contact_handle": "5511999",
            "category": "salon",
            "status": "new",
            "note": null,
            "created_at": "2026-01-05T12:30:00Z",
        });

        let lead: LeadRecord = serde_json::from_value(row).expect("parse row");
        assert_eq!(
            lead.id,
            LeadId(Uuid::parse_str("7b0e1e2a-9f62-4c83-9a43-cc0a1f0cf26d").expect("uuid"))
        );
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.contact_handle.as_deref(), Some("5511999"));
        assert_eq!(lead.note, None);
    }

    #[test]
    fn new_lead_payload_never_carries_status_or_owner() {
        let payload = NewLead {
            name: "Ana".to_string(),
            contact_handle: Some("5511999".to_string()),
            category: None,
            note: None,
        };

        let value = serde_json::to_value(&payload).expect("serialize");
        let object = value.as_object().expect("object");
        assert!(!object.contains_key("status"));
        assert!(!object.contains_key("owner_id"));
        assert!(!object.contains_key("user_id"));
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("name"));
        assert!(object.contains_key("contact_handle"));
    }
}
