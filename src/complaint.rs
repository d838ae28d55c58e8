use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_SERIOUSNESS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    #[serde(alias = "новая")]
    New,
    #[serde(alias = "в обработке")]
    InProgress,
    #[serde(alias = "ожидает уточнения")]
    Waiting,
    #[serde(alias = "отклонена")]
    Rejected,
    #[serde(alias = "завершена")]
    Completed,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 5] = [
        ComplaintStatus::New,
        ComplaintStatus::InProgress,
        ComplaintStatus::Waiting,
        ComplaintStatus::Rejected,
        ComplaintStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::New => "new",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Waiting => "waiting",
            ComplaintStatus::Rejected => "rejected",
            ComplaintStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComplaintStatus::New => "новая",
            ComplaintStatus::InProgress => "в обработке",
            ComplaintStatus::Waiting => "ожидает уточнения",
            ComplaintStatus::Rejected => "отклонена",
            ComplaintStatus::Completed => "завершена",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.label() == label.trim())
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complaint specialization. Values the desk does not know about are kept
/// verbatim so a new backend category never breaks list decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Medicine,
    Ecology,
    Police,
    Transport,
    Housing,
    Social,
    Government,
    Corruption,
    Education,
    Other(String),
}

impl Category {
    pub const KNOWN: [Category; 9] = [
        Category::Medicine,
        Category::Ecology,
        Category::Police,
        Category::Transport,
        Category::Housing,
        Category::Social,
        Category::Government,
        Category::Corruption,
        Category::Education,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::Other(value) => value,
            known => known.known_names().map_or("", |(canonical, _)| canonical),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Category::Other(value) => value,
            known => known.known_names().map_or("", |(_, label)| label),
        }
    }

    /// `(canonical, display)` names for the fixed specializations.
    fn known_names(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Category::Medicine => Some(("medicine", "медицина")),
            Category::Ecology => Some(("ecology", "экология")),
            Category::Police => Some(("police", "полиция")),
            Category::Transport => Some(("transport", "транспорт")),
            Category::Housing => Some(("housing", "жкх")),
            Category::Social => Some(("social", "соцзащита")),
            Category::Government => Some(("government", "госуслуги")),
            Category::Corruption => Some(("corruption", "коррупция")),
            Category::Education => Some(("education", "образование")),
            Category::Other(_) => None,
        }
    }

    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        Self::KNOWN
            .into_iter()
            .find(|category| category.as_str() == value)
            .unwrap_or_else(|| Category::Other(value.to_string()))
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .find(|category| category.label() == label.trim())
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from_label(&value).unwrap_or_else(|| Category::parse(&value))
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        match value {
            Category::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display form → canonical form. Unknown input passes through unchanged.
pub fn encode_status(display: &str) -> &str {
    ComplaintStatus::from_label(display).map_or(display, |status| status.as_str())
}

/// Canonical form → display form. Unknown input passes through unchanged.
pub fn decode_status(canonical: &str) -> &str {
    ComplaintStatus::parse(canonical).map_or(canonical, |status| status.label())
}

pub fn encode_category(display: &str) -> &str {
    Category::from_label(display)
        .and_then(|category| category.known_names())
        .map_or(display, |(canonical, _)| canonical)
}

pub fn decode_category(canonical: &str) -> &str {
    Category::parse(canonical)
        .known_names()
        .map_or(canonical, |(_, label)| label)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComplaintId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplaintId::Number(value) => write!(f, "{value}"),
            ComplaintId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ComplaintId {
    fn from(value: i64) -> Self {
        ComplaintId::Number(value)
    }
}

impl From<&str> for ComplaintId {
    fn from(value: &str) -> Self {
        ComplaintId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ComplaintId>,
    pub complaint: String,
    #[serde(default)]
    pub address: String,
    pub category: Category,
    pub status: ComplaintStatus,
    #[serde(default, deserialize_with = "deserialize_score")]
    pub seriousness_score: u8,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Complaint {
    /// Creation time, with a missing value treated as the Unix epoch.
    pub fn created_or_epoch(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Payload for `POST /complaints`. The address is optional: an empty string or
/// a coordinate fallback is an acceptable submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComplaint {
    pub complaint: String,
    pub address: String,
    pub category: Category,
    pub status: ComplaintStatus,
}

impl NewComplaint {
    pub fn new(complaint: impl Into<String>, category: Category) -> Self {
        Self {
            complaint: complaint.into(),
            address: String::new(),
            category,
            status: ComplaintStatus::New,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ComplaintStatus>,
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if !raw.is_finite() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, f64::from(MAX_SERIOUSNESS)) as u8)
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| parse_timestamp(&value)))
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates; anything else is
/// treated as missing.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for status in ComplaintStatus::ALL {
            let display = status.label();
            assert_eq!(decode_status(encode_status(display)), display);
            assert_eq!(ComplaintStatus::from_label(display), Some(status));
            assert_eq!(ComplaintStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn category_labels_round_trip() {
        for category in Category::KNOWN {
            let display = category.label();
            assert_eq!(decode_category(encode_category(display)), display);
            assert_eq!(Category::parse(category.as_str()), category);
        }
    }

    #[test]
    fn unknown_values_pass_through() {
        assert_eq!(encode_status("archived"), "archived");
        assert_eq!(decode_status("archived"), "archived");
        assert_eq!(decode_category("roads"), "roads");
        assert_eq!(Category::parse("roads"), Category::Other("roads".into()));
    }

    #[test]
    fn decodes_backend_record() {
        let complaint: Complaint = serde_json::from_value(json!({
            "id": 17,
            "complaint": "Яма на дороге",
            "address": "Бишкек, проспект Чуй",
            "category": "transport",
            "status": "in_progress",
            "seriousnessScore": 7,
            "createdAt": "2024-06-01T10:00:00.000Z",
            "updatedAt": ""
        }))
        .unwrap();

        assert_eq!(complaint.id, Some(ComplaintId::Number(17)));
        assert_eq!(complaint.category, Category::Transport);
        assert_eq!(complaint.status, ComplaintStatus::InProgress);
        assert_eq!(complaint.seriousness_score, 7);
        assert!(complaint.created_at.is_some());
        assert!(complaint.updated_at.is_none());
    }

    #[test]
    fn accepts_display_form_and_clamps_score() {
        let complaint: Complaint = serde_json::from_value(json!({
            "id": "abc",
            "complaint": "Шум",
            "category": "экология",
            "status": "в обработке",
            "seriousnessScore": 14.2
        }))
        .unwrap();

        assert_eq!(complaint.id, Some(ComplaintId::from("abc")));
        assert_eq!(complaint.category, Category::Ecology);
        assert_eq!(complaint.status, ComplaintStatus::InProgress);
        assert_eq!(complaint.seriousness_score, MAX_SERIOUSNESS);
        assert_eq!(complaint.address, "");
        assert_eq!(complaint.created_or_epoch(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn serializes_canonical_forms() {
        let payload = NewComplaint::new("Нет света", Category::Housing)
            .with_address("42.874600, 74.569800");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["category"], "housing");
        assert_eq!(value["status"], "new");
        assert_eq!(value["address"], "42.874600, 74.569800");

        let patch = ComplaintPatch {
            status: Some(ComplaintStatus::Completed),
            ..ComplaintPatch::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "status": "completed" })
        );
    }

    #[test]
    fn parses_bare_dates() {
        let parsed = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_timestamp("not a date").is_none());
    }
}
