use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::UserType;
use crate::models::message_type::{MessageType, MessageTypeDto};

/// Field names accepted at creation and required to be present and non-empty.
pub const REQUIRED_FIELDS: &[&str] = &[
    "sender",
    "sender_type",
    "receiver",
    "receiver_type",
    "message_type",
    "content",
];

/// Field names that may be set at creation or via update.
pub const UPDATABLE_FIELDS: &[&str] = &[
    "retrieved",
    "confirmed",
    "confirmed_by",
    "related_message",
    "cancelled",
    "cancelled_by",
    "internal",
];

/// Audit fields; accepted in create payloads only outside production, for
/// fixture seeding.
pub const BUILTIN_FIELDS: &[&str] = &["uuid", "created", "created_by", "modified", "modified_by"];

/// An absolute instant paired with the caller's utc offset in minutes, so the
/// original wall-clock timezone survives a round trip through storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedTimestamp {
    pub instant: DateTime<Utc>,
    pub tz_offset_minutes: i32,
}

impl ZonedTimestamp {
    pub fn parse(field: &str, raw: &str) -> Result<Self, AppError> {
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| AppError::InvalidTimestamp {
            field: field.to_string(),
            value: raw.to_string(),
        })?;
        Ok(ZonedTimestamp {
            instant: parsed.with_timezone(&Utc),
            tz_offset_minutes: parsed.offset().local_minus_utc() / 60,
        })
    }

    pub fn to_rfc3339(self) -> String {
        let offset =
            FixedOffset::east_opt(self.tz_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        self.instant
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// The central entity. Required fields are immutable after creation; the
/// optional fields change only through the update operation. Rows are never
/// physically removed, `deleted` marks them out of every standard query.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub uuid: Uuid,
    pub sender: String,
    pub sender_type: UserType,
    pub receiver: String,
    pub receiver_type: UserType,
    pub message_type: MessageType,
    pub content: String,
    pub retrieved: Option<ZonedTimestamp>,
    pub confirmed: Option<ZonedTimestamp>,
    pub confirmed_by: Option<String>,
    pub cancelled: Option<ZonedTimestamp>,
    pub cancelled_by: Option<String>,
    pub related_message: Option<Uuid>,
    pub internal: Option<String>,
    pub deleted: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub created_by: String,
    pub modified: DateTime<Utc>,
    pub modified_by: String,
}

impl Message {
    pub fn to_dto(&self) -> MessageDto {
        MessageDto {
            uuid: self.uuid,
            sender: self.sender.clone(),
            sender_type: self.sender_type,
            receiver: self.receiver.clone(),
            receiver_type: self.receiver_type,
            message_type: self.message_type.into(),
            content: self.content.clone(),
            confirmed: self.confirmed.map(ZonedTimestamp::to_rfc3339),
            retrieved: self.retrieved.map(ZonedTimestamp::to_rfc3339),
            cancelled: self.cancelled.map(ZonedTimestamp::to_rfc3339),
            confirmed_by: self.confirmed_by.clone(),
            cancelled_by: self.cancelled_by.clone(),
            related_message: self.related_message,
            internal: self.internal.clone(),
            deleted: self
                .deleted
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            created: self.created.to_rfc3339_opts(SecondsFormat::Secs, true),
            created_by: self.created_by.clone(),
            modified: self.modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            modified_by: self.modified_by.clone(),
        }
    }
}

/// Read representation. `confirmed` is always present even when null; the
/// other optional fields appear only once set.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub uuid: Uuid,
    pub sender: String,
    pub sender_type: UserType,
    pub receiver: String,
    pub receiver_type: UserType,
    pub message_type: MessageTypeDto,
    pub content: String,
    pub confirmed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_message: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
    pub created: String,
    pub created_by: String,
    pub modified: String,
    pub modified_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        let now = Utc::now();
        Message {
            uuid: Uuid::new_v4(),
            sender: "p1".into(),
            sender_type: UserType::Patient,
            receiver: "l1".into(),
            receiver_type: UserType::Location,
            message_type: MessageType::General,
            content: "hello".into(),
            retrieved: None,
            confirmed: None,
            confirmed_by: None,
            cancelled: None,
            cancelled_by: None,
            related_message: None,
            internal: None,
            deleted: None,
            created: now,
            created_by: "p1".into(),
            modified: now,
            modified_by: "p1".into(),
        }
    }

    #[test]
    fn zoned_timestamp_keeps_the_original_offset() {
        let ts = ZonedTimestamp::parse("confirmed", "2024-06-01T10:30:00+05:30").unwrap();
        assert_eq!(ts.tz_offset_minutes, 330);
        assert_eq!(ts.to_rfc3339(), "2024-06-01T10:30:00+05:30");
    }

    #[test]
    fn zoned_timestamp_rejects_garbage() {
        let err = ZonedTimestamp::parse("retrieved", "not-a-date").unwrap_err();
        assert!(matches!(err, AppError::InvalidTimestamp { .. }));
    }

    #[test]
    fn confirmed_serializes_even_when_null() {
        let dto = sample_message().to_dto();
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("confirmed").is_some());
        assert!(json["confirmed"].is_null());
        assert!(json.get("retrieved").is_none());
        assert!(json.get("deleted").is_none());
        assert_eq!(json["message_type"]["value"], 0);
        assert_eq!(json["sender_type"], "patient");
    }

    #[test]
    fn set_optionals_appear_in_the_representation() {
        let mut message = sample_message();
        message.confirmed =
            Some(ZonedTimestamp::parse("confirmed", "2024-06-01T10:00:00+00:00").unwrap());
        message.confirmed_by = Some("c1".into());
        message.deleted = Some(Utc::now());
        let json = serde_json::to_value(message.to_dto()).unwrap();
        assert_eq!(json["confirmed"], "2024-06-01T10:00:00+00:00");
        assert_eq!(json["confirmed_by"], "c1");
        assert!(json.get("deleted").is_some());
    }
}
