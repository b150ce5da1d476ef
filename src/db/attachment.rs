//! Row operations for the attachment ledger.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tokio_stream::StreamExt;

use crate::{
    attachment::{Attachment, AttachmentUpload},
    error::Error,
    message::MessageId,
};

impl Attachment {
    /// Appends a ledger row and returns it with its assigned sequence
    /// number. The bytes must already sit in the object store under
    /// `file_path`.
    pub async fn insert(
        db: &mut SqliteConnection,
        message_id: &MessageId,
        file_path: &str,
        upload: &AttachmentUpload,
        created_at: DateTime<Utc>,
    ) -> Result<Attachment, Error> {
        let file_size = upload.bytes.len() as i64;

        let result = sqlx::query_scalar(
            "INSERT INTO attachments (message_id, file_path, file_name, file_size, file_type, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING seq",
        )
        .bind(message_id)
        .bind(file_path)
        .bind(&upload.file_name)
        .bind(file_size)
        .bind(&upload.file_type)
        .bind(created_at.timestamp_millis())
        .fetch_one(db)
        .await;

        let seq: i64 = match result {
            Ok(seq) => seq,
            // The owning message vanished between the caller's check and
            // this insert.
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                return Err(Error::message_not_found(message_id));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Attachment {
            seq,
            message_id: message_id.clone(),
            file_path: file_path.to_owned(),
            file_name: upload.file_name.clone(),
            file_size,
            file_type: upload.file_type.clone(),
            created_at,
        })
    }

    /// Ledger rows for one message, in upload order.
    pub async fn list_for(
        db: &mut SqliteConnection,
        message_id: &MessageId,
    ) -> Result<Vec<Attachment>, Error> {
        let mut stream = sqlx::query_as(
            "SELECT seq, message_id, file_path, file_name, file_size, file_type, created_at
             FROM attachments
             WHERE message_id = $1
             ORDER BY seq ASC",
        )
        .bind(message_id)
        .fetch(db);

        let mut attachments = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            attachments.push(res);
        }

        Ok(attachments)
    }
}
