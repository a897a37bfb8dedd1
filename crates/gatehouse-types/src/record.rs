//! Stored record shapes and the raw-document decode boundary.
//!
//! The store hands out untyped documents: an id plus a JSON field map. Those
//! are converted exactly once, at the subscription boundary, through
//! [`FromDocument`]. Nothing past that point sees a raw [`Fields`] map unless
//! it explicitly asked for one.
//!
//! Wire names are camelCase (`forceId`, `visitingPersonnelId`) and status
//! enums serialize as their display strings (`"On Leave"`, `"On-site"`).
//! Extra fields written by other clients (`createdAt`, …) are ignored.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Raw document fields as delivered by the store.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Errors converting a raw document into a record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("no record shape for collection '{0}'")]
    UnknownCollection(String),
    #[error("document {collection}/{id} does not fit the record shape: {source}")]
    Decode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Conversion from a raw store document into an application record.
///
/// `collection` is the last segment of the document's collection path; `id`
/// is the store's document identifier, which implementors merge into the
/// record's own `id` field.
pub trait FromDocument: Sized {
    fn from_document(collection: &str, id: &str, fields: &Fields) -> Result<Self, RecordError>;
}

/// Raw passthrough, for consumers that stay schema-agnostic. The document id
/// is merged in under `"id"`.
impl FromDocument for Fields {
    fn from_document(_collection: &str, id: &str, fields: &Fields) -> Result<Self, RecordError> {
        let mut merged = fields.clone();
        merged.insert("id".into(), serde_json::Value::String(id.to_string()));
        Ok(merged)
    }
}

/// Decode `fields` as `T` with the document id merged in.
fn decode<T: DeserializeOwned>(collection: &str, id: &str, fields: &Fields) -> Result<T, RecordError> {
    let merged = Fields::from_document(collection, id, fields)?;
    serde_json::from_value(serde_json::Value::Object(merged)).map_err(|source| RecordError::Decode {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    })
}

// ============================================================================
// Record kinds
// ============================================================================

/// Which entity shape a collection holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum RecordKind {
    #[strum(serialize = "personnel")]
    Personnel,
    #[strum(serialize = "visitors")]
    Visitor,
    #[strum(serialize = "users")]
    UserProfile,
}

impl RecordKind {
    /// Collection name this kind is stored under.
    pub const fn collection(self) -> &'static str {
        match self {
            RecordKind::Personnel => "personnel",
            RecordKind::Visitor => "visitors",
            RecordKind::UserProfile => "users",
        }
    }

    /// Resolve the kind stored in `collection`.
    pub fn from_collection(collection: &str) -> Option<Self> {
        collection.parse().ok()
    }
}

// ============================================================================
// Personnel
// ============================================================================

/// Duty status of a personnel record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PersonnelStatus {
    #[default]
    Active,
    #[serde(rename = "On Leave")]
    OnLeave,
    Transferred,
}

impl PersonnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonnelStatus::Active => "Active",
            PersonnelStatus::OnLeave => "On Leave",
            PersonnelStatus::Transferred => "Transferred",
        }
    }
}

/// Someone stationed at a facility who can receive visitors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personnel {
    pub id: String,
    pub name: String,
    pub rank: String,
    pub force_id: String,
    pub department: String,
    pub facility: String,
    pub block: String,
    pub room: String,
    #[serde(default)]
    pub status: PersonnelStatus,
    /// Account that registered this record, when added through the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl FromDocument for Personnel {
    fn from_document(collection: &str, id: &str, fields: &Fields) -> Result<Self, RecordError> {
        decode(collection, id, fields)
    }
}

// ============================================================================
// Visitor
// ============================================================================

/// Whether a visitor is within their allotted time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VisitorStatus {
    #[default]
    #[serde(rename = "On-site")]
    OnSite,
    Overstaying,
}

impl VisitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitorStatus::OnSite => "On-site",
            VisitorStatus::Overstaying => "Overstaying",
        }
    }
}

/// A registered visitor currently on the premises.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<String>,
    pub visiting_personnel_id: String,
    /// Check-in wall-clock time, `HH:MM` (24h).
    pub time_in: String,
    #[serde(default)]
    pub status: VisitorStatus,
}

impl FromDocument for Visitor {
    fn from_document(collection: &str, id: &str, fields: &Fields) -> Result<Self, RecordError> {
        decode(collection, id, fields)
    }
}

// ============================================================================
// UserProfile
// ============================================================================

fn default_role() -> String {
    "gate-guard".to_string()
}

fn default_true() -> bool {
    true
}

/// Profile document stored at `users/{uid}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_role")]
    pub role_id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl UserProfile {
    /// "First Last", or the username when both names are blank.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone().unwrap_or_else(|| self.id.clone())
        } else {
            full.to_string()
        }
    }
}

impl FromDocument for UserProfile {
    fn from_document(collection: &str, id: &str, fields: &Fields) -> Result<Self, RecordError> {
        decode(collection, id, fields)
    }
}

// ============================================================================
// Record (tagged union)
// ============================================================================

/// Any stored entity, tagged by the collection it came from.
///
/// Serializes as the bare inner record; the tag is not written back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Personnel(Personnel),
    Visitor(Visitor),
    UserProfile(UserProfile),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Personnel(p) => &p.id,
            Record::Visitor(v) => &v.id,
            Record::UserProfile(u) => &u.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Personnel(_) => RecordKind::Personnel,
            Record::Visitor(_) => RecordKind::Visitor,
            Record::UserProfile(_) => RecordKind::UserProfile,
        }
    }
}

impl FromDocument for Record {
    fn from_document(collection: &str, id: &str, fields: &Fields) -> Result<Self, RecordError> {
        let kind = RecordKind::from_collection(collection)
            .ok_or_else(|| RecordError::UnknownCollection(collection.to_string()))?;
        Ok(match kind {
            RecordKind::Personnel => Record::Personnel(decode(collection, id, fields)?),
            RecordKind::Visitor => Record::Visitor(decode(collection, id, fields)?),
            RecordKind::UserProfile => Record::UserProfile(decode(collection, id, fields)?),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_personnel_decode_merges_document_id() {
        let f = fields(json!({
            "name": "Clinton Giri",
            "rank": "Cadet",
            "forceId": "F1234",
            "department": "Training Wing",
            "facility": "Military Camp Alpha",
            "block": "Upper Block",
            "room": "Room 12",
            "status": "On Leave",
            "createdAt": 1700000000,
        }));
        let p = Personnel::from_document("personnel", "p1", &f).unwrap();
        assert_eq!(p.id, "p1");
        assert_eq!(p.force_id, "F1234");
        assert_eq!(p.status, PersonnelStatus::OnLeave);
        assert_eq!(p.user_id, None);
    }

    #[test]
    fn test_document_id_wins_over_stored_id() {
        let f = fields(json!({
            "id": "stale",
            "name": "Jane Smith",
            "visitingPersonnelId": "p2",
            "timeIn": "13:30",
        }));
        let v = Visitor::from_document("visitors", "v2", &f).unwrap();
        assert_eq!(v.id, "v2");
        assert_eq!(v.status, VisitorStatus::OnSite);
    }

    #[test]
    fn test_profile_defaults() {
        let f = fields(json!({ "email": "guard@camp.example" }));
        let u = UserProfile::from_document("users", "abc", &f).unwrap();
        assert_eq!(u.role_id, "gate-guard");
        assert!(u.is_active);
        assert_eq!(u.first_name, "");
        assert_eq!(u.display_name(), "abc");
    }

    #[test]
    fn test_record_dispatches_on_collection() {
        let f = fields(json!({
            "name": "John Doe",
            "visitingPersonnelId": "p1",
            "timeIn": "14:00",
            "status": "Overstaying",
        }));
        let r = Record::from_document("visitors", "v1", &f).unwrap();
        assert_eq!(r.kind(), RecordKind::Visitor);
        assert_eq!(r.id(), "v1");
        match r {
            Record::Visitor(v) => assert_eq!(v.status, VisitorStatus::Overstaying),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_record_unknown_collection() {
        let err = Record::from_document("badges", "b1", &Fields::new()).unwrap_err();
        assert!(matches!(err, RecordError::UnknownCollection(c) if c == "badges"));
    }

    #[test]
    fn test_ill_typed_field_is_decode_error() {
        let f = fields(json!({ "name": 42, "visitingPersonnelId": "p1", "timeIn": "10:00" }));
        let err = Visitor::from_document("visitors", "v9", &f).unwrap_err();
        assert!(matches!(err, RecordError::Decode { ref id, .. } if id == "v9"));
    }

    #[test]
    fn test_raw_fields_passthrough() {
        let f = fields(json!({ "anything": true }));
        let raw = Fields::from_document("whatever", "x1", &f).unwrap();
        assert_eq!(raw.get("id"), Some(&json!("x1")));
        assert_eq!(raw.get("anything"), Some(&json!(true)));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(PersonnelStatus::OnLeave).unwrap(), json!("On Leave"));
        assert_eq!(serde_json::to_value(VisitorStatus::OnSite).unwrap(), json!("On-site"));
        assert_eq!(RecordKind::from_collection("users"), Some(RecordKind::UserProfile));
        assert_eq!(RecordKind::Visitor.to_string(), "visitors");
    }

    #[test]
    fn test_collection_names_resolve_back_to_kind() {
        for kind in [RecordKind::Personnel, RecordKind::Visitor, RecordKind::UserProfile] {
            assert_eq!(RecordKind::from_collection(kind.collection()), Some(kind));
            assert_eq!(kind.to_string(), kind.collection());
        }
    }

    #[test]
    fn test_record_serializes_as_inner_shape() {
        let f = fields(json!({ "firstName": "Asha" }));
        let r = Record::from_document("users", "u1", &f).unwrap();
        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(out["id"], json!("u1"));
        assert_eq!(out["firstName"], json!("Asha"));
        assert_eq!(out["roleId"], json!("gate-guard"));
    }
}
