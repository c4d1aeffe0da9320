pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::identity::UserType;
use crate::models::{Message, MessageType};

/// Declarative filter over the message set. Authorization decisions produce
/// these values; each repository implementation interprets them, so policy
/// stays testable without a database. Soft-deleted rows are excluded by the
/// repository itself, never by a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Sender(String),
    Receiver(String),
    SenderType(UserType),
    ReceiverType(UserType),
    SenderIn(Vec<String>),
    ReceiverIn(Vec<String>),
    MessageTypeIs(MessageType),
    MessageTypeNot(MessageType),
    ConfirmedIsNull,
    CancelledIsNull,
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// In-memory evaluation of the same semantics the SQL rendering produces.
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Predicate::Sender(id) => message.sender == *id,
            Predicate::Receiver(id) => message.receiver == *id,
            Predicate::SenderType(role) => message.sender_type == *role,
            Predicate::ReceiverType(role) => message.receiver_type == *role,
            Predicate::SenderIn(ids) => ids.iter().any(|id| *id == message.sender),
            Predicate::ReceiverIn(ids) => ids.iter().any(|id| *id == message.receiver),
            Predicate::MessageTypeIs(mt) => message.message_type == *mt,
            Predicate::MessageTypeNot(mt) => message.message_type != *mt,
            Predicate::ConfirmedIsNull => message.confirmed.is_none(),
            Predicate::CancelledIsNull => message.cancelled.is_none(),
            Predicate::All(ps) => ps.iter().all(|p| p.matches(message)),
            Predicate::Any(ps) => ps.iter().any(|p| p.matches(message)),
        }
    }
}

/// A filtered, ordered collection read.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub predicate: Predicate,
    pub newest_first: bool,
}

impl MessageQuery {
    pub fn new(predicate: Predicate) -> Self {
        MessageQuery {
            predicate,
            newest_first: true,
        }
    }
}

/// Storage seam for messages. The Postgres implementation backs the service;
/// the in-memory one backs tests and local seeding.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> AppResult<Message>;

    /// Bulk fixture insert, all-or-nothing. Implementations chunk statements
    /// to bound transaction size.
    async fn insert_many(&self, messages: Vec<Message>) -> AppResult<()>;

    /// Point lookup; soft-deleted rows are treated as absent.
    async fn find_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Message>>;

    async fn exists(&self, uuid: Uuid) -> AppResult<bool>;

    /// Persist the mutable fields of an existing message.
    async fn update(&self, message: &Message) -> AppResult<()>;

    async fn soft_delete(&self, uuid: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    async fn query(&self, query: &MessageQuery) -> AppResult<Vec<Message>>;

    /// For each listed sender, the most recent unconfirmed, uncancelled
    /// callback message, keyed by sender id.
    async fn latest_callback_per_sender(
        &self,
        senders: &[String],
    ) -> AppResult<HashMap<String, Message>>;
}
