use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::identity::UserType;
use crate::models::{Message, MessageType, ZonedTimestamp};
use crate::repository::{MessageQuery, MessageRepository, Predicate};

const COLUMNS: &str = "uuid, sender, sender_type, receiver, receiver_type, message_type, \
     content, retrieved, retrieved_tz, confirmed, confirmed_tz, confirmed_by, \
     cancelled, cancelled_tz, cancelled_by, related_message, internal, deleted, \
     created, created_by, modified, modified_by";

/// Bulk inserts are split into statements of this many rows to bound statement
/// size; the whole batch still commits in one transaction.
const INSERT_CHUNK: usize = 100;

pub struct PgMessageRepository {
    pool: Pool<Postgres>,
}

impl PgMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgMessageRepository { pool }
    }
}

fn decode_error(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn zoned_from_row(row: &PgRow, col: &str, tz_col: &str) -> Result<Option<ZonedTimestamp>, sqlx::Error> {
    let instant: Option<DateTime<Utc>> = row.try_get(col)?;
    let tz: Option<i32> = row.try_get(tz_col)?;
    Ok(instant.map(|instant| ZonedTimestamp {
        instant,
        tz_offset_minutes: tz.unwrap_or(0),
    }))
}

fn row_to_message(row: &PgRow) -> Result<Message, sqlx::Error> {
    let sender_type: String = row.try_get("sender_type")?;
    let receiver_type: String = row.try_get("receiver_type")?;
    let message_type: i32 = row.try_get("message_type")?;
    Ok(Message {
        uuid: row.try_get("uuid")?,
        sender: row.try_get("sender")?,
        sender_type: UserType::parse(&sender_type)
            .ok_or_else(|| decode_error(format!("unknown user type '{sender_type}'")))?,
        receiver: row.try_get("receiver")?,
        receiver_type: UserType::parse(&receiver_type)
            .ok_or_else(|| decode_error(format!("unknown user type '{receiver_type}'")))?,
        message_type: MessageType::from_value(message_type)
            .ok_or_else(|| decode_error(format!("unknown message type {message_type}")))?,
        content: row.try_get("content")?,
        retrieved: zoned_from_row(row, "retrieved", "retrieved_tz")?,
        confirmed: zoned_from_row(row, "confirmed", "confirmed_tz")?,
        confirmed_by: row.try_get("confirmed_by")?,
        cancelled: zoned_from_row(row, "cancelled", "cancelled_tz")?,
        cancelled_by: row.try_get("cancelled_by")?,
        related_message: row.try_get("related_message")?,
        internal: row.try_get("internal")?,
        deleted: row.try_get("deleted")?,
        created: row.try_get("created")?,
        created_by: row.try_get("created_by")?,
        modified: row.try_get("modified")?,
        modified_by: row.try_get("modified_by")?,
    })
}

fn push_predicate<'a>(qb: &mut QueryBuilder<'a, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::Sender(id) => {
            qb.push("sender = ");
            qb.push_bind(id.clone());
        }
        Predicate::Receiver(id) => {
            qb.push("receiver = ");
            qb.push_bind(id.clone());
        }
        Predicate::SenderType(role) => {
            qb.push("sender_type = ");
            qb.push_bind(role.as_str());
        }
        Predicate::ReceiverType(role) => {
            qb.push("receiver_type = ");
            qb.push_bind(role.as_str());
        }
        Predicate::SenderIn(ids) => {
            qb.push("sender = ANY(");
            qb.push_bind(ids.clone());
            qb.push(")");
        }
        Predicate::ReceiverIn(ids) => {
            qb.push("receiver = ANY(");
            qb.push_bind(ids.clone());
            qb.push(")");
        }
        Predicate::MessageTypeIs(mt) => {
            qb.push("message_type = ");
            qb.push_bind(mt.value());
        }
        Predicate::MessageTypeNot(mt) => {
            qb.push("message_type <> ");
            qb.push_bind(mt.value());
        }
        Predicate::ConfirmedIsNull => {
            qb.push("confirmed IS NULL");
        }
        Predicate::CancelledIsNull => {
            qb.push("cancelled IS NULL");
        }
        Predicate::All(ps) => {
            if ps.is_empty() {
                qb.push("TRUE");
                return;
            }
            qb.push("(");
            for (i, p) in ps.iter().enumerate() {
                if i > 0 {
                    qb.push(" AND ");
                }
                push_predicate(qb, p);
            }
            qb.push(")");
        }
        Predicate::Any(ps) => {
            if ps.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push("(");
            for (i, p) in ps.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_predicate(qb, p);
            }
            qb.push(")");
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> AppResult<Message> {
        sqlx::query(
            "INSERT INTO message (uuid, sender, sender_type, receiver, receiver_type, \
             message_type, content, retrieved, retrieved_tz, confirmed, confirmed_tz, \
             confirmed_by, cancelled, cancelled_tz, cancelled_by, related_message, internal, \
             deleted, created, created_by, modified, modified_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21, $22)",
        )
        .bind(message.uuid)
        .bind(&message.sender)
        .bind(message.sender_type.as_str())
        .bind(&message.receiver)
        .bind(message.receiver_type.as_str())
        .bind(message.message_type.value())
        .bind(&message.content)
        .bind(message.retrieved.map(|z| z.instant))
        .bind(message.retrieved.map(|z| z.tz_offset_minutes))
        .bind(message.confirmed.map(|z| z.instant))
        .bind(message.confirmed.map(|z| z.tz_offset_minutes))
        .bind(&message.confirmed_by)
        .bind(message.cancelled.map(|z| z.instant))
        .bind(message.cancelled.map(|z| z.tz_offset_minutes))
        .bind(&message.cancelled_by)
        .bind(message.related_message)
        .bind(&message.internal)
        .bind(message.deleted)
        .bind(message.created)
        .bind(&message.created_by)
        .bind(message.modified)
        .bind(&message.modified_by)
        .execute(&self.pool)
        .await?;
        Ok(message)
    }

    async fn insert_many(&self, messages: Vec<Message>) -> AppResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for chunk in messages.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO message (uuid, sender, sender_type, receiver, receiver_type, \
                 message_type, content, retrieved, retrieved_tz, confirmed, confirmed_tz, \
                 confirmed_by, cancelled, cancelled_tz, cancelled_by, related_message, \
                 internal, deleted, created, created_by, modified, modified_by) ",
            );
            qb.push_values(chunk, |mut b, m| {
                b.push_bind(m.uuid)
                    .push_bind(m.sender.clone())
                    .push_bind(m.sender_type.as_str())
                    .push_bind(m.receiver.clone())
                    .push_bind(m.receiver_type.as_str())
                    .push_bind(m.message_type.value())
                    .push_bind(m.content.clone())
                    .push_bind(m.retrieved.map(|z| z.instant))
                    .push_bind(m.retrieved.map(|z| z.tz_offset_minutes))
                    .push_bind(m.confirmed.map(|z| z.instant))
                    .push_bind(m.confirmed.map(|z| z.tz_offset_minutes))
                    .push_bind(m.confirmed_by.clone())
                    .push_bind(m.cancelled.map(|z| z.instant))
                    .push_bind(m.cancelled.map(|z| z.tz_offset_minutes))
                    .push_bind(m.cancelled_by.clone())
                    .push_bind(m.related_message)
                    .push_bind(m.internal.clone())
                    .push_bind(m.deleted)
                    .push_bind(m.created)
                    .push_bind(m.created_by.clone())
                    .push_bind(m.modified)
                    .push_bind(m.modified_by.clone());
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM message WHERE uuid = $1 AND deleted IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_message).transpose().map_err(AppError::from)
    }

    async fn exists(&self, uuid: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM message WHERE uuid = $1 AND deleted IS NULL)",
        )
        .bind(uuid)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn update(&self, message: &Message) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE message SET retrieved = $2, retrieved_tz = $3, confirmed = $4, \
             confirmed_tz = $5, confirmed_by = $6, cancelled = $7, cancelled_tz = $8, \
             cancelled_by = $9, related_message = $10, internal = $11, modified = $12, \
             modified_by = $13 WHERE uuid = $1 AND deleted IS NULL",
        )
        .bind(message.uuid)
        .bind(message.retrieved.map(|z| z.instant))
        .bind(message.retrieved.map(|z| z.tz_offset_minutes))
        .bind(message.confirmed.map(|z| z.instant))
        .bind(message.confirmed.map(|z| z.tz_offset_minutes))
        .bind(&message.confirmed_by)
        .bind(message.cancelled.map(|z| z.instant))
        .bind(message.cancelled.map(|z| z.tz_offset_minutes))
        .bind(&message.cancelled_by)
        .bind(message.related_message)
        .bind(&message.internal)
        .bind(message.modified)
        .bind(&message.modified_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, uuid: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query("UPDATE message SET deleted = $2 WHERE uuid = $1 AND deleted IS NULL")
            .bind(uuid)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn query(&self, query: &MessageQuery) -> AppResult<Vec<Message>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM message WHERE deleted IS NULL AND "));
        push_predicate(&mut qb, &query.predicate);
        qb.push(if query.newest_first {
            " ORDER BY created DESC"
        } else {
            " ORDER BY created ASC"
        });
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }

    async fn latest_callback_per_sender(
        &self,
        senders: &[String],
    ) -> AppResult<HashMap<String, Message>> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT ON (sender) {COLUMNS} FROM message \
             WHERE deleted IS NULL AND confirmed IS NULL AND cancelled IS NULL \
             AND message_type = $1 AND sender = ANY($2) \
             ORDER BY sender, created DESC"
        ))
        .bind(MessageType::Callback.value())
        .bind(senders)
        .fetch_all(&self.pool)
        .await?;
        let mut latest = HashMap::with_capacity(rows.len());
        for row in &rows {
            let message = row_to_message(row)?;
            latest.insert(message.sender.clone(), message);
        }
        Ok(latest)
    }
}
