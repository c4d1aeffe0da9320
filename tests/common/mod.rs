#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use messages_service::identity::{Claims, IdentityContext, UserType};
use messages_service::models::{Message, MessageType};
use messages_service::repository::memory::InMemoryMessageRepository;
use messages_service::service::MessageService;

pub fn patient_ctx(id: &str) -> IdentityContext {
    IdentityContext::new(Claims::patient(id), None)
}

pub fn clinician_ctx(id: &str, locations: &str) -> IdentityContext {
    IdentityContext::new(Claims::clinician(id), Some(locations))
}

pub fn system_ctx(id: &str) -> IdentityContext {
    IdentityContext::new(Claims::system(id), None)
}

pub fn service() -> (MessageService, Arc<InMemoryMessageRepository>) {
    let repo = Arc::new(InMemoryMessageRepository::new());
    (MessageService::new(repo.clone()), repo)
}

/// A message built directly, for repository-level seeding. `age_minutes`
/// pushes `created` into the past so ordering is deterministic.
pub fn message(
    sender: &str,
    sender_type: UserType,
    receiver: &str,
    receiver_type: UserType,
    message_type: MessageType,
    age_minutes: i64,
) -> Message {
    let created = Utc::now() - Duration::minutes(age_minutes);
    Message {
        uuid: Uuid::new_v4(),
        sender: sender.into(),
        sender_type,
        receiver: receiver.into(),
        receiver_type,
        message_type,
        content: "hello".into(),
        retrieved: None,
        confirmed: None,
        confirmed_by: None,
        cancelled: None,
        cancelled_by: None,
        related_message: None,
        internal: None,
        deleted: None,
        created,
        created_by: sender.into(),
        modified: created,
        modified_by: sender.into(),
    }
}

/// Create payload with all required fields, as the request layer would
/// deliver it.
pub fn payload(
    sender: &str,
    sender_type: &str,
    receiver: &str,
    receiver_type: &str,
    type_value: i64,
) -> Map<String, Value> {
    fields(json!({
        "sender": sender,
        "sender_type": sender_type,
        "receiver": receiver,
        "receiver_type": receiver_type,
        "message_type": {"value": type_value},
        "content": "please call back",
    }))
}

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
