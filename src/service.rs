use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::authz;
use crate::error::{AppError, AppResult};
use crate::identity::{IdentityContext, UserType};
use crate::models::message::{BUILTIN_FIELDS, REQUIRED_FIELDS, UPDATABLE_FIELDS};
use crate::models::{Message, MessageDto, MessageType, ZonedTimestamp};
use crate::repository::{MessageQuery, MessageRepository, Predicate};

/// Raw payload shape for create/update. Kept as a JSON map so unknown field
/// names and empty values are detected rather than silently dropped.
pub type Fields = Map<String, Value>;

/// Message Lifecycle Controller: orchestrates create/read/update against the
/// repository, enforcing field-level mutability and value validation.
pub struct MessageService {
    repo: Arc<dyn MessageRepository>,
    allow_builtin_fields: bool,
}

impl MessageService {
    pub fn new(repo: Arc<dyn MessageRepository>) -> Self {
        MessageService {
            repo,
            allow_builtin_fields: false,
        }
    }

    /// Accept audit fields in create payloads. Only enabled outside
    /// production, for fixture seeding.
    pub fn with_builtin_fields(mut self, allow: bool) -> Self {
        self.allow_builtin_fields = allow;
        self
    }

    pub async fn create(&self, ctx: &IdentityContext, fields: &Fields) -> AppResult<MessageDto> {
        debug!("creating message");
        let message = self.build_message(ctx, fields).await?;
        let inserted = self.repo.insert(message).await?;
        Ok(inserted.to_dto())
    }

    /// Bulk fixture seeding. Validates every payload up front, then inserts
    /// all-or-nothing.
    pub async fn create_many(&self, ctx: &IdentityContext, payloads: &[Fields]) -> AppResult<()> {
        let mut batch = Vec::with_capacity(payloads.len());
        for fields in payloads {
            batch.push(self.build_message(ctx, fields).await?);
        }
        debug!(count = batch.len(), "bulk inserting messages");
        self.repo.insert_many(batch).await
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> AppResult<MessageDto> {
        debug!(message_id = %uuid, "getting message by uuid");
        let message = self.repo.find_by_uuid(uuid).await?.ok_or(AppError::NotFound)?;
        Ok(message.to_dto())
    }

    pub async fn get_by_sender(
        &self,
        ctx: &IdentityContext,
        sender_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(sender_id, "getting messages by sender id");
        let Some(role) = ctx.user_type_to_validate(sender_id) else {
            debug!(sender_id, "sender role unresolved, no messages visible");
            return Ok(Vec::new());
        };
        self.run_query(Predicate::All(vec![
            Predicate::Sender(sender_id.to_string()),
            Predicate::SenderType(role),
        ]))
        .await
    }

    pub async fn get_by_receiver(
        &self,
        ctx: &IdentityContext,
        receiver_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(receiver_id, "getting messages by receiver id");
        self.run_query(receiver_base(ctx, receiver_id)).await
    }

    pub async fn get_active_by_sender(
        &self,
        ctx: &IdentityContext,
        sender_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(sender_id, "getting active messages by sender id");
        let Some(role) = ctx.user_type_to_validate(sender_id) else {
            debug!(sender_id, "sender role unresolved, no messages visible");
            return Ok(Vec::new());
        };
        self.run_query(Predicate::All(vec![
            Predicate::Sender(sender_id.to_string()),
            Predicate::SenderType(role),
            authz::active(),
        ]))
        .await
    }

    pub async fn get_active_by_receiver(
        &self,
        ctx: &IdentityContext,
        receiver_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(receiver_id, "getting active messages by receiver id");
        self.run_query(Predicate::All(vec![
            receiver_base(ctx, receiver_id),
            authz::active(),
        ]))
        .await
    }

    pub async fn get_active_callbacks_by_receiver(
        &self,
        receiver_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(receiver_id, "getting active callback messages by receiver id");
        self.run_query(authz::active_callback(receiver_id)).await
    }

    pub async fn get_by_sender_or_receiver(
        &self,
        ctx: &IdentityContext,
        unique_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(unique_id, "getting messages by sender or receiver id");
        let predicate =
            authz::sender_or_receiver_filter(ctx, unique_id).ok_or(AppError::Forbidden)?;
        self.run_query(predicate).await
    }

    pub async fn get_by_sender_and_receiver(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(sender_id, receiver_id, "getting messages by sender and receiver ids");
        self.run_query(Predicate::All(vec![
            Predicate::Sender(sender_id.to_string()),
            Predicate::Receiver(receiver_id.to_string()),
        ]))
        .await
    }

    pub async fn get_active_by_sender_and_receiver(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> AppResult<Vec<MessageDto>> {
        debug!(sender_id, receiver_id, "getting active messages by sender and receiver ids");
        self.run_query(Predicate::All(vec![
            Predicate::Sender(sender_id.to_string()),
            Predicate::Receiver(receiver_id.to_string()),
            authz::active(),
        ]))
        .await
    }

    /// At most one entry per sender: the most recent standing callback.
    pub async fn get_active_callbacks_for_patients(
        &self,
        patient_ids: &[String],
    ) -> AppResult<HashMap<String, MessageDto>> {
        debug!(count = patient_ids.len(), "getting active callbacks for patients");
        let latest = self.repo.latest_callback_per_sender(patient_ids).await?;
        Ok(latest
            .into_iter()
            .map(|(sender, message)| (sender, message.to_dto()))
            .collect())
    }

    pub async fn update(
        &self,
        ctx: &IdentityContext,
        uuid: Uuid,
        fields: &Fields,
    ) -> AppResult<MessageDto> {
        debug!(message_id = %uuid, "updating message");
        let mut message = self.repo.find_by_uuid(uuid).await?.ok_or(AppError::NotFound)?;
        if fields.is_empty() {
            return Err(AppError::EmptyUpdate);
        }
        for key in fields.keys() {
            if !UPDATABLE_FIELDS.contains(&key.as_str()) {
                return Err(AppError::NonUpdatableField(key.clone()));
            }
        }
        for (key, value) in fields {
            self.apply_mutable_field(&mut message, key, value).await?;
        }
        message.modified = Utc::now();
        message.modified_by = ctx.requester_id().to_string();
        self.repo.update(&message).await?;
        Ok(message.to_dto())
    }

    /// Soft-delete marker. Data-level only; not wired to any inbound surface.
    pub async fn delete(&self, uuid: Uuid) -> AppResult<()> {
        debug!(message_id = %uuid, "soft deleting message");
        self.repo.soft_delete(uuid, Utc::now()).await
    }

    async fn run_query(&self, predicate: Predicate) -> AppResult<Vec<MessageDto>> {
        let found = self.repo.query(&MessageQuery::new(predicate)).await?;
        debug!(count = found.len(), "query finished");
        Ok(found.iter().map(Message::to_dto).collect())
    }

    async fn build_message(&self, ctx: &IdentityContext, fields: &Fields) -> AppResult<Message> {
        for key in fields.keys() {
            let known = REQUIRED_FIELDS.contains(&key.as_str())
                || UPDATABLE_FIELDS.contains(&key.as_str())
                || (self.allow_builtin_fields && BUILTIN_FIELDS.contains(&key.as_str()));
            if !known {
                return Err(AppError::UnknownField(key.clone()));
            }
        }
        for name in REQUIRED_FIELDS {
            match fields.get(*name) {
                None | Some(Value::Null) => {
                    return Err(AppError::MissingRequiredField(name.to_string()))
                }
                Some(Value::String(s)) if s.is_empty() => {
                    return Err(AppError::MissingRequiredField(name.to_string()))
                }
                Some(_) => {}
            }
        }
        for (key, value) in fields {
            if value_len(value) == 0 {
                return Err(AppError::EmptyField(key.clone()));
            }
        }

        let message_type = resolve_message_type(fields)?;
        let now = Utc::now();
        let mut message = Message {
            uuid: Uuid::new_v4(),
            sender: required_string(fields, "sender")?,
            sender_type: required_user_type(fields, "sender_type")?,
            receiver: required_string(fields, "receiver")?,
            receiver_type: required_user_type(fields, "receiver_type")?,
            message_type,
            content: required_string(fields, "content")?,
            retrieved: None,
            confirmed: None,
            confirmed_by: None,
            cancelled: None,
            cancelled_by: None,
            related_message: None,
            internal: None,
            deleted: None,
            created: now,
            created_by: ctx.requester_id().to_string(),
            modified: now,
            modified_by: ctx.requester_id().to_string(),
        };

        for (key, value) in fields {
            if UPDATABLE_FIELDS.contains(&key.as_str()) {
                self.apply_mutable_field(&mut message, key, value).await?;
            }
        }
        if self.allow_builtin_fields {
            apply_builtin_fields(&mut message, fields)?;
        }
        Ok(message)
    }

    async fn apply_mutable_field(
        &self,
        message: &mut Message,
        key: &str,
        value: &Value,
    ) -> AppResult<()> {
        match key {
            "retrieved" | "confirmed" | "cancelled" => {
                let raw = match value {
                    Value::String(s) if !s.is_empty() => s,
                    Value::String(_) | Value::Null => return Err(AppError::EmptyField(key.into())),
                    other => {
                        return Err(AppError::InvalidTimestamp {
                            field: key.into(),
                            value: other.to_string(),
                        })
                    }
                };
                let ts = ZonedTimestamp::parse(key, raw)?;
                match key {
                    "retrieved" => message.retrieved = Some(ts),
                    "confirmed" => message.confirmed = Some(ts),
                    _ => message.cancelled = Some(ts),
                }
            }
            "confirmed_by" | "cancelled_by" | "internal" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| AppError::InvalidFieldValue { field: key.into() })?;
                match key {
                    "confirmed_by" => message.confirmed_by = Some(raw.to_string()),
                    "cancelled_by" => message.cancelled_by = Some(raw.to_string()),
                    _ => message.internal = Some(raw.to_string()),
                }
            }
            "related_message" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| AppError::InvalidRelatedMessage(value.to_string()))?;
                let related = Uuid::parse_str(raw)
                    .map_err(|_| AppError::InvalidRelatedMessage(raw.to_string()))?;
                if related == message.uuid {
                    return Err(AppError::InvalidRelatedMessage(raw.to_string()));
                }
                if !self.repo.exists(related).await? {
                    return Err(AppError::InvalidRelatedMessage(raw.to_string()));
                }
                message.related_message = Some(related);
            }
            other => return Err(AppError::NonUpdatableField(other.to_string())),
        }
        Ok(())
    }
}

/// Base filter for receiver listings: the role constraint applies only when
/// the caller's claims resolve one for the id.
fn receiver_base(ctx: &IdentityContext, receiver_id: &str) -> Predicate {
    let mut terms = vec![Predicate::Receiver(receiver_id.to_string())];
    if let Some(role) = ctx.user_type_to_validate(receiver_id) {
        terms.push(Predicate::ReceiverType(role));
    }
    Predicate::All(terms)
}

fn value_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
    }
}

fn required_string(fields: &Fields, name: &str) -> AppResult<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::MissingRequiredField(name.to_string()))
}

fn required_user_type(fields: &Fields, name: &str) -> AppResult<UserType> {
    let raw = required_string(fields, name)?;
    UserType::parse(&raw).ok_or_else(|| AppError::MissingRequiredField(name.to_string()))
}

fn resolve_message_type(fields: &Fields) -> AppResult<MessageType> {
    let value = fields
        .get("message_type")
        .ok_or_else(|| AppError::MissingRequiredField("message_type".into()))?;
    let code = value
        .get("value")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::InvalidMessageType(value.to_string()))?;
    i32::try_from(code)
        .ok()
        .and_then(MessageType::from_value)
        .ok_or_else(|| AppError::InvalidMessageType(code.to_string()))
}

fn apply_builtin_fields(message: &mut Message, fields: &Fields) -> AppResult<()> {
    if let Some(value) = fields.get("uuid") {
        let raw = value
            .as_str()
            .ok_or_else(|| AppError::InvalidFieldValue { field: "uuid".into() })?;
        message.uuid = Uuid::parse_str(raw)
            .map_err(|_| AppError::InvalidFieldValue { field: "uuid".into() })?;
    }
    for (name, slot) in [("created", true), ("modified", false)] {
        if let Some(value) = fields.get(name) {
            let raw = value.as_str().ok_or_else(|| AppError::InvalidTimestamp {
                field: name.into(),
                value: value.to_string(),
            })?;
            let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(raw)
                .map_err(|_| AppError::InvalidTimestamp {
                    field: name.into(),
                    value: raw.to_string(),
                })?
                .with_timezone(&Utc);
            if slot {
                message.created = parsed;
            } else {
                message.modified = parsed;
            }
        }
    }
    if let Some(value) = fields.get("created_by").and_then(Value::as_str) {
        message.created_by = value.to_string();
    }
    if let Some(value) = fields.get("modified_by").and_then(Value::as_str) {
        message.modified_by = value.to_string();
    }
    Ok(())
}
