use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageType};
use crate::repository::{MessageQuery, MessageRepository};

/// Vec-backed repository with the same visible semantics as the Postgres
/// implementation. Predicates are evaluated via `Predicate::matches`.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> AppResult<Message> {
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        Ok(message)
    }

    async fn insert_many(&self, batch: Vec<Message>) -> AppResult<()> {
        let mut messages = self.messages.write().await;
        messages.extend(batch);
        Ok(())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .find(|m| m.uuid == uuid && m.deleted.is_none())
            .cloned())
    }

    async fn exists(&self, uuid: Uuid) -> AppResult<bool> {
        Ok(self.find_by_uuid(uuid).await?.is_some())
    }

    async fn update(&self, updated: &Message) -> AppResult<()> {
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|m| m.uuid == updated.uuid) {
            Some(slot) => {
                *slot = updated.clone();
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn soft_delete(&self, uuid: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|m| m.uuid == uuid) {
            Some(message) => {
                message.deleted = Some(at);
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn query(&self, query: &MessageQuery) -> AppResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut found: Vec<Message> = messages
            .iter()
            .filter(|m| m.deleted.is_none() && query.predicate.matches(m))
            .cloned()
            .collect();
        if query.newest_first {
            found.sort_by(|a, b| b.created.cmp(&a.created));
        } else {
            found.sort_by(|a, b| a.created.cmp(&b.created));
        }
        Ok(found)
    }

    async fn latest_callback_per_sender(
        &self,
        senders: &[String],
    ) -> AppResult<HashMap<String, Message>> {
        let messages = self.messages.read().await;
        let mut latest: HashMap<String, Message> = HashMap::new();
        for m in messages.iter() {
            if m.deleted.is_some()
                || m.message_type != MessageType::Callback
                || m.confirmed.is_some()
                || m.cancelled.is_some()
                || !senders.contains(&m.sender)
            {
                continue;
            }
            match latest.get(&m.sender) {
                Some(current) if current.created >= m.created => {}
                _ => {
                    latest.insert(m.sender.clone(), m.clone());
                }
            }
        }
        Ok(latest)
    }
}
