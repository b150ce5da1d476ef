//! Attachment ledger types.
//!
//! Attachment bytes live in an object store; the ledger rows here only
//! describe them. A row is written after the store accepted the bytes, and
//! there is no rollback path: if the ledger write fails afterwards the
//! object is orphaned, which is tolerated, while the reverse (a row with no
//! object) is not.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::message::MessageId;

/// One stored binary object, owned by exactly one message.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Ledger sequence number; doubles as upload order within a message.
    pub seq: i64,
    pub message_id: MessageId,
    /// Object store reference the bytes were put under.
    pub file_path: String,
    /// Original client-side file name.
    pub file_name: String,
    /// Size in bytes, as received.
    pub file_size: i64,
    /// Declared MIME type. Recorded, never verified.
    pub file_type: String,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Attachment {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let created_at_ms: i64 = row.try_get("created_at")?;
        let created_at = DateTime::from_timestamp_millis(created_at_ms).ok_or_else(|| {
            sqlx::Error::ColumnDecode {
                index: "created_at".to_owned(),
                source: format!("timestamp out of range: {created_at_ms}").into(),
            }
        })?;

        Ok(Self {
            seq: row.try_get("seq")?,
            message_id: row.try_get("message_id")?,
            file_path: row.try_get("file_path")?,
            file_name: row.try_get("file_name")?,
            file_size: row.try_get("file_size")?,
            file_type: row.try_get("file_type")?,
            created_at,
        })
    }
}

/// Upload payload for a single file.
#[derive(bon::Builder, Debug, Clone)]
pub struct AttachmentUpload {
    #[builder(into)]
    pub file_name: String,
    /// MIME type as declared by the client.
    #[builder(into)]
    pub file_type: String,
    pub bytes: Bytes,
}
