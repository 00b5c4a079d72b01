use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stages::StageId;

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id_newtype!(DealId);

const LEGACY_ROW_PREFIX: &str = "row-";

impl DealId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Identifier for a pipeline row written before ids were stored in the sheet.
    pub fn legacy_row(row_number: u32) -> Self {
        Self(format!("{LEGACY_ROW_PREFIX}{row_number}"))
    }

    pub fn legacy_row_number(&self) -> Option<u32> {
        self.0
            .strip_prefix(LEGACY_ROW_PREFIX)
            .and_then(|n| n.parse::<u32>().ok())
    }
}

/// One firm's progress through the sales pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: DealId,
    pub firm_name: String,
    pub stage: StageId,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub contact_count: u32,
    #[serde(default)]
    pub email_count: u32,
    #[serde(default)]
    pub meeting_count: u32,
    #[serde(default)]
    pub note_count: u32,
    #[serde(default)]
    pub revision: u64,
}

/// Fields submitted when creating a deal. `stage` is a raw label and is
/// canonicalized by whoever ingests it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealDraft {
    pub firm_name: String,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub contact_count: u32,
    #[serde(default)]
    pub email_count: u32,
    #[serde(default)]
    pub meeting_count: u32,
    #[serde(default)]
    pub note_count: u32,
}

impl DealDraft {
    pub fn new(firm_name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            firm_name: firm_name.into(),
            stage: stage.into(),
            ..Self::default()
        }
    }
}

/// A full deal as submitted for replacement. Same shape as [`Deal`] but
/// `stage` is a raw label, so sheet titles like "Won" are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    pub id: DealId,
    pub firm_name: String,
    pub stage: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub contact_count: u32,
    #[serde(default)]
    pub email_count: u32,
    #[serde(default)]
    pub meeting_count: u32,
    #[serde(default)]
    pub note_count: u32,
    #[serde(default)]
    pub revision: u64,
}

impl DealRecord {
    pub fn into_deal(self, stage: StageId) -> Deal {
        Deal {
            id: self.id,
            firm_name: self.firm_name,
            stage,
            created_at: self.created_at,
            last_activity: self.last_activity,
            value: self.value,
            contact_count: self.contact_count,
            email_count: self.email_count,
            meeting_count: self.meeting_count,
            note_count: self.note_count,
            revision: self.revision,
        }
    }
}

impl From<Deal> for DealRecord {
    fn from(deal: Deal) -> Self {
        Self {
            id: deal.id,
            firm_name: deal.firm_name,
            stage: deal.stage.as_str().to_string(),
            created_at: deal.created_at,
            last_activity: deal.last_activity,
            value: deal.value,
            contact_count: deal.contact_count,
            email_count: deal.email_count,
            meeting_count: deal.meeting_count,
            note_count: deal.note_count,
            revision: deal.revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub date: String,
    pub title: String,
    pub stage: String,
    pub owner: String,
}

/// A single booking row from the firms sheet. A firm may appear many times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmBooking {
    pub name: String,
    pub date_booked: String,
    pub aum_millions: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_serializes_with_camel_case_fields() {
        let deal = Deal {
            id: DealId::from("3"),
            firm_name: "Acme Capital".into(),
            stage: StageId::MeetingBooked,
            created_at: String::new(),
            last_activity: "2024-05-01".into(),
            value: "50000".into(),
            contact_count: 2,
            email_count: 0,
            meeting_count: 1,
            note_count: 0,
            revision: 4,
        };

        let json = serde_json::to_value(&deal).expect("json");
        assert_eq!(json["id"], "3");
        assert_eq!(json["firmName"], "Acme Capital");
        assert_eq!(json["stage"], "meeting-booked");
        assert_eq!(json["contactCount"], 2);
        assert_eq!(json["lastActivity"], "2024-05-01");
    }

    #[test]
    fn deal_counts_default_to_zero_when_absent() {
        let deal: Deal = serde_json::from_value(serde_json::json!({
            "id": "9",
            "firmName": "Bridge Partners",
            "stage": "active-conversation",
        }))
        .expect("deal");
        assert_eq!(deal.value, "");
        assert_eq!(deal.contact_count, 0);
        assert_eq!(deal.note_count, 0);
        assert_eq!(deal.revision, 0);
    }

    #[test]
    fn legacy_row_ids_round_trip_their_row_number() {
        let id = DealId::legacy_row(7);
        assert_eq!(id.as_str(), "row-7");
        assert_eq!(id.legacy_row_number(), Some(7));
        assert_eq!(DealId::generate().legacy_row_number(), None);
    }
}
