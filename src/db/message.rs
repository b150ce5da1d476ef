//! Row operations for the messages table.
//!
//! Flag writes are single-row, single-column UPDATEs issued from an
//! already-resolved [`FlagColumn`]; no read-modify-write of flag state ever
//! happens in application code.

use sqlx::SqliteConnection;
use tokio_stream::StreamExt;

use crate::{
    error::Error,
    message::{FlagColumn, Message, MessageId, Party, ThreadId, UserId},
};

fn flag_update_sql(column: FlagColumn) -> &'static str {
    match column {
        FlagColumn::IsRead => "UPDATE messages SET is_read = $1 WHERE id = $2",
        FlagColumn::IsArchived => "UPDATE messages SET is_archived = $1 WHERE id = $2",
        FlagColumn::StarredBySender => "UPDATE messages SET starred_by_sender = $1 WHERE id = $2",
        FlagColumn::StarredByRecipient => {
            "UPDATE messages SET starred_by_recipient = $1 WHERE id = $2"
        }
        FlagColumn::DeletedBySender => "UPDATE messages SET deleted_by_sender = $1 WHERE id = $2",
        FlagColumn::DeletedByRecipient => {
            "UPDATE messages SET deleted_by_recipient = $1 WHERE id = $2"
        }
    }
}

// Collections of plain strings and string structs cannot fail to serialize.
fn encode_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_owned())
}

impl Message {
    pub async fn insert(&self, db: &mut SqliteConnection) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO messages (
                id, sender_id, recipient_id, subject, body, priority, is_draft,
                thread_id, reply_to_id, cc, bcc, labels, document_refs, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&self.id)
        .bind(&self.sender_id)
        .bind(&self.recipient_id)
        .bind(&self.subject)
        .bind(&self.body)
        .bind(self.priority)
        .bind(self.is_draft)
        .bind(&self.thread_id)
        .bind(&self.reply_to_id)
        .bind(encode_json(&self.cc))
        .bind(encode_json(&self.bcc))
        .bind(encode_json(&self.labels))
        .bind(encode_json(&self.document_refs))
        .bind(self.created_at.timestamp_millis())
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn fetch(
        db: &mut SqliteConnection,
        id: &MessageId,
    ) -> Result<Option<Message>, Error> {
        Ok(sqlx::query_as("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?)
    }

    /// Fetches a message and applies the visibility gate for `viewer`.
    ///
    /// Absent rows and rows hidden from the viewer (their own soft delete,
    /// or a draft viewed by its recipient) both come back as
    /// [`Error::NotFound`], so callers cannot distinguish "never existed"
    /// from "hidden from you". A viewer who is no party at all gets
    /// [`Error::Unauthorized`] instead.
    pub async fn fetch_visible(
        db: &mut SqliteConnection,
        id: &MessageId,
        viewer: &UserId,
    ) -> Result<(Message, Party), Error> {
        let message = Self::fetch(db, id)
            .await?
            .ok_or_else(|| Error::message_not_found(id))?;

        let party = message.party_role(viewer).ok_or(Error::Unauthorized)?;

        if message.hidden_from(party) {
            return Err(Error::message_not_found(id));
        }

        Ok((message, party))
    }

    /// Every message the viewer is a party to, newest first. Insertion
    /// order breaks timestamp ties.
    pub async fn list_for_viewer(
        db: &mut SqliteConnection,
        viewer: &UserId,
    ) -> Result<Vec<Message>, Error> {
        let mut stream = sqlx::query_as(
            "SELECT * FROM messages
             WHERE sender_id = $1 OR recipient_id = $2
             ORDER BY created_at DESC, seq DESC",
        )
        .bind(viewer)
        .bind(viewer)
        .fetch(db);

        let mut messages = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            messages.push(res);
        }

        Ok(messages)
    }

    /// All messages of one thread, oldest first.
    pub async fn list_thread(
        db: &mut SqliteConnection,
        thread_id: &ThreadId,
    ) -> Result<Vec<Message>, Error> {
        let mut stream = sqlx::query_as(
            "SELECT * FROM messages
             WHERE thread_id = $1
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(thread_id)
        .fetch(db);

        let mut messages = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            messages.push(res);
        }

        Ok(messages)
    }

    pub async fn set_flag(
        db: &mut SqliteConnection,
        id: &MessageId,
        column: FlagColumn,
        value: bool,
    ) -> Result<(), Error> {
        sqlx::query(flag_update_sql(column))
            .bind(value)
            .bind(id)
            .execute(db)
            .await?;

        Ok(())
    }

    /// Stamps `candidate` as the thread id of `id` unless one exists, then
    /// returns whatever id the row ended up carrying.
    ///
    /// The WHERE clause makes the stamp conditional, so when two first
    /// replies race, exactly one candidate wins and both callers read the
    /// winner back.
    pub async fn mint_thread_id(
        db: &mut SqliteConnection,
        id: &MessageId,
        candidate: &ThreadId,
    ) -> Result<ThreadId, Error> {
        sqlx::query("UPDATE messages SET thread_id = $1 WHERE id = $2 AND thread_id IS NULL")
            .bind(candidate)
            .bind(id)
            .execute(&mut *db)
            .await?;

        let winner: Option<Option<ThreadId>> =
            sqlx::query_scalar("SELECT thread_id FROM messages WHERE id = $1")
                .bind(id)
                .fetch_optional(db)
                .await?;

        winner
            .flatten()
            .ok_or_else(|| Error::message_not_found(id))
    }

    /// Removes the row outright. Attachment ledger rows cascade with it.
    pub async fn purge(db: &mut SqliteConnection, id: &MessageId) -> Result<(), Error> {
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        Ok(())
    }
}
