//! Message model and the derived-folder rules of the mailbox.
//!
//! This module defines the core message type, its classification flags, and
//! the folder predicates computed from them. A message is a single row with
//! one sender and one recipient; there is no folder column.
//!
//! # Message Lifecycle
//!
//! 1. A message is created by `send` (deliverable) or `save_draft` (visible
//!    to its author only)
//! 2. Flags are flipped one at a time (`read`, `starred`, `archived`); every
//!    flip moves the message between derived folders without copying it
//! 3. Each party can soft-delete their view; the row survives until both
//!    have done so
//! 4. A first reply mints a thread id and stamps it on both messages; later
//!    replies inherit it
//!
//! Folder membership is always recomputed from flags at read time, so a
//! message can sit in several folders at once (starred and archived, say)
//! without any duplication.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Opaque unique id of a message. Fresh ids are hyphenated v4 UUIDs, but the
/// store never interprets the value.
#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id shared by every message of one conversation. Minted lazily: a message
/// with no replies has none.
#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Portal user id, owned by the external directory. Opaque here.
#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sender-declared priority. Carried and displayed, never acted on.
#[derive(Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "text")]
pub enum Priority {
    #[serde(rename = "low")]
    #[sqlx(rename = "low")]
    Low,
    #[serde(rename = "normal")]
    #[sqlx(rename = "normal")]
    #[default]
    Normal,
    #[serde(rename = "high")]
    #[sqlx(rename = "high")]
    High,
}

/// Which side of a message a user is on.
///
/// Several flags exist once per party rather than once per message, and the
/// party decides which column a caller's flag writes land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Sender,
    Recipient,
}

impl Party {
    pub(crate) fn delete_column(self) -> FlagColumn {
        match self {
            Party::Sender => FlagColumn::DeletedBySender,
            Party::Recipient => FlagColumn::DeletedByRecipient,
        }
    }
}

/// Caller-facing name of a mutable classification flag.
///
/// `Starred` is per party: the same caller-facing name resolves to the
/// sender-side or recipient-side column depending on who is asking, so one
/// party starring a message never changes what the other party sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Flag {
    Read,
    Starred,
    Archived,
}

impl Flag {
    /// Resolves the flag to the column it writes for the given party.
    ///
    /// `Read` has no sender-side column: unread is a recipient-side concept
    /// and the sender's copy always displays read, so there is nothing for a
    /// sender to write.
    pub(crate) fn column_for(self, party: Party) -> Option<FlagColumn> {
        match (self, party) {
            (Flag::Read, Party::Recipient) => Some(FlagColumn::IsRead),
            (Flag::Read, Party::Sender) => None,
            (Flag::Archived, _) => Some(FlagColumn::IsArchived),
            (Flag::Starred, Party::Sender) => Some(FlagColumn::StarredBySender),
            (Flag::Starred, Party::Recipient) => Some(FlagColumn::StarredByRecipient),
        }
    }
}

/// Concrete flag column on the messages table. Resolution from the
/// caller-facing [`Flag`] happens before any SQL is issued, so the store
/// only ever sees single-column writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagColumn {
    IsRead,
    IsArchived,
    StarredBySender,
    StarredByRecipient,
    DeletedBySender,
    DeletedByRecipient,
}

/// A folder is a predicate over message flags, not a place. The same row can
/// satisfy several predicates at once, and satisfies none when the viewer is
/// not a party to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Starred,
    Archive,
    Trash,
}

impl Folder {
    /// Evaluates this folder's membership predicate for `viewer`.
    ///
    /// Archiving removes a message from the inbox view without touching the
    /// sender's sent view; soft deletion hides it from the deleting party's
    /// folders (except trash) while leaving the other party's intact.
    pub fn admits(self, viewer: &UserId, message: &Message) -> bool {
        let is_sender = message.sender_id == *viewer;
        let is_recipient = message.recipient_id == *viewer;

        if !is_sender && !is_recipient {
            return false;
        }

        match self {
            Folder::Inbox => {
                is_recipient
                    && !message.is_archived
                    && !message.is_draft
                    && !message.deleted_by_recipient
            }
            Folder::Sent => is_sender && !message.is_draft && !message.deleted_by_sender,
            Folder::Drafts => is_sender && message.is_draft,
            Folder::Starred => {
                (is_sender && message.starred_by_sender)
                    || (is_recipient && message.starred_by_recipient)
            }
            Folder::Archive => {
                is_recipient
                    && message.is_archived
                    && !message.is_draft
                    && !message.deleted_by_recipient
            }
            Folder::Trash => {
                (is_sender && message.deleted_by_sender)
                    || (is_recipient && message.deleted_by_recipient && !message.is_draft)
            }
        }
    }
}

/// Informational pointer to an externally generated document (certificates,
/// receipts). Carried as data only; nothing validates that the target exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A stored message.
///
/// `cc` and `bcc` are auxiliary identity lists, not extra deliverable rows;
/// folder predicates only ever consult `sender_id` and `recipient_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub subject: String,
    pub body: String,
    pub priority: Priority,

    pub is_read: bool,
    pub is_archived: bool,
    pub is_draft: bool,
    pub starred_by_sender: bool,
    pub starred_by_recipient: bool,
    pub deleted_by_sender: bool,
    pub deleted_by_recipient: bool,

    /// Set on the first reply, for both the reply and the original.
    pub thread_id: Option<ThreadId>,
    /// Direct parent, when this message was composed as a reply.
    pub reply_to_id: Option<MessageId>,

    pub cc: Vec<UserId>,
    pub bcc: Vec<UserId>,
    pub labels: BTreeSet<String>,
    pub document_refs: Vec<DocumentRef>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Role of `user` on this message, if any.
    pub fn party_role(&self, user: &UserId) -> Option<Party> {
        if self.sender_id == *user {
            Some(Party::Sender)
        } else if self.recipient_id == *user {
            Some(Party::Recipient)
        } else {
            None
        }
    }

    /// True when the row must behave as absent for `party`: the party has
    /// soft-deleted it, or it is a draft and the party is the recipient.
    pub(crate) fn hidden_from(&self, party: Party) -> bool {
        match party {
            Party::Sender => self.deleted_by_sender,
            Party::Recipient => self.deleted_by_recipient || self.is_draft,
        }
    }

    /// Read state as displayed to `viewer`. Unread is a recipient-side
    /// concept; the sender's copy always displays as read.
    pub fn read_for(&self, viewer: &UserId) -> bool {
        if self.sender_id == *viewer {
            true
        } else {
            self.is_read
        }
    }

    pub(crate) fn apply_flag(&mut self, column: FlagColumn, value: bool) {
        match column {
            FlagColumn::IsRead => self.is_read = value,
            FlagColumn::IsArchived => self.is_archived = value,
            FlagColumn::StarredBySender => self.starred_by_sender = value,
            FlagColumn::StarredByRecipient => self.starred_by_recipient = value,
            FlagColumn::DeletedBySender => self.deleted_by_sender = value,
            FlagColumn::DeletedByRecipient => self.deleted_by_recipient = value,
        }
    }
}

impl FromRow<'_, SqliteRow> for Message {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let created_at_ms: i64 = row.try_get("created_at")?;
        let created_at = DateTime::from_timestamp_millis(created_at_ms).ok_or_else(|| {
            sqlx::Error::ColumnDecode {
                index: "created_at".to_owned(),
                source: format!("timestamp out of range: {created_at_ms}").into(),
            }
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            sender_id: row.try_get("sender_id")?,
            recipient_id: row.try_get("recipient_id")?,
            subject: row.try_get("subject")?,
            body: row.try_get("body")?,
            priority: row.try_get("priority")?,

            is_read: row.try_get("is_read")?,
            is_archived: row.try_get("is_archived")?,
            is_draft: row.try_get("is_draft")?,
            starred_by_sender: row.try_get("starred_by_sender")?,
            starred_by_recipient: row.try_get("starred_by_recipient")?,
            deleted_by_sender: row.try_get("deleted_by_sender")?,
            deleted_by_recipient: row.try_get("deleted_by_recipient")?,

            thread_id: row.try_get("thread_id")?,
            reply_to_id: row.try_get("reply_to_id")?,

            cc: decode_json(row, "cc")?,
            bcc: decode_json(row, "bcc")?,
            labels: decode_json(row, "labels")?,
            document_refs: decode_json(row, "document_refs")?,

            created_at,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_owned(),
        source: Box::new(e),
    })
}

/// Compose payload accepted by `send` and `save_draft`.
///
/// Drafts may be arbitrarily incomplete, so nothing here is validated at
/// construction time; `send` enforces the deliverability rules on top.
#[derive(bon::Builder, Debug, Clone)]
pub struct Draft {
    #[builder(into)]
    pub sender: UserId,
    #[builder(into)]
    pub recipient: Option<UserId>,
    #[builder(into, default)]
    pub subject: String,
    #[builder(into, default)]
    pub body: String,
    #[builder(default)]
    pub priority: Priority,
    #[builder(default)]
    pub cc: Vec<UserId>,
    #[builder(default)]
    pub bcc: Vec<UserId>,
    #[builder(default)]
    pub labels: BTreeSet<String>,
    #[builder(default)]
    pub document_refs: Vec<DocumentRef>,
    /// Parent message id when composing a reply.
    #[builder(into)]
    pub reply_to: Option<MessageId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample(sender: &str, recipient: &str) -> Message {
        Message {
            id: MessageId::generate(),
            sender_id: sender.into(),
            recipient_id: recipient.into(),
            subject: "Enrollment".to_owned(),
            body: "See attached.".to_owned(),
            priority: Priority::Normal,
            is_read: false,
            is_archived: false,
            is_draft: false,
            starred_by_sender: false,
            starred_by_recipient: false,
            deleted_by_sender: false,
            deleted_by_recipient: false,
            thread_id: None,
            reply_to_id: None,
            cc: vec![],
            bcc: vec![],
            labels: BTreeSet::new(),
            document_refs: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_message_lands_in_inbox_and_sent_only() {
        let message = sample("alice", "bob");
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        let test_cases = vec![
            (Folder::Inbox, &alice, false),
            (Folder::Inbox, &bob, true),
            (Folder::Sent, &alice, true),
            (Folder::Sent, &bob, false),
            (Folder::Drafts, &alice, false),
            (Folder::Starred, &alice, false),
            (Folder::Starred, &bob, false),
            (Folder::Archive, &bob, false),
            (Folder::Trash, &alice, false),
            (Folder::Trash, &bob, false),
        ];

        for (folder, viewer, expected) in test_cases {
            assert_eq!(
                folder.admits(viewer, &message),
                expected,
                "admits mismatch for folder {} and viewer {}",
                folder,
                viewer
            );
        }
    }

    #[test]
    fn non_party_is_admitted_nowhere() {
        let mut message = sample("alice", "bob");
        message.is_archived = true;
        message.starred_by_sender = true;
        message.deleted_by_recipient = true;
        let carol = UserId::from("carol");

        for folder in [
            Folder::Inbox,
            Folder::Sent,
            Folder::Drafts,
            Folder::Starred,
            Folder::Archive,
            Folder::Trash,
        ] {
            assert!(
                !folder.admits(&carol, &message),
                "non-party admitted to {}",
                folder
            );
        }
    }

    #[test]
    fn archiving_moves_inbox_to_archive_without_touching_sent() {
        let mut message = sample("alice", "bob");
        message.is_archived = true;
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(!Folder::Inbox.admits(&bob, &message));
        assert!(Folder::Archive.admits(&bob, &message));
        assert!(Folder::Sent.admits(&alice, &message));
    }

    #[test]
    fn starring_is_per_party() {
        let mut message = sample("alice", "bob");
        message.starred_by_recipient = true;
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(Folder::Starred.admits(&bob, &message));
        assert!(!Folder::Starred.admits(&alice, &message));
    }

    #[test]
    fn sender_delete_hides_sent_but_not_recipient_inbox() {
        let mut message = sample("alice", "bob");
        message.deleted_by_sender = true;
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(!Folder::Sent.admits(&alice, &message));
        assert!(Folder::Trash.admits(&alice, &message));
        assert!(Folder::Inbox.admits(&bob, &message));
        assert!(!Folder::Trash.admits(&bob, &message));
    }

    #[test]
    fn draft_is_authors_drafts_folder_only() {
        let mut message = sample("alice", "bob");
        message.is_draft = true;
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(Folder::Drafts.admits(&alice, &message));
        assert!(!Folder::Sent.admits(&alice, &message));
        assert!(!Folder::Inbox.admits(&bob, &message));
        assert!(!Folder::Drafts.admits(&bob, &message));
    }

    #[test]
    fn draft_stays_out_of_recipient_folders_whatever_its_flags() {
        let mut message = sample("alice", "bob");
        message.is_draft = true;
        message.is_archived = true;
        message.deleted_by_recipient = true;
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(!Folder::Archive.admits(&bob, &message));
        assert!(!Folder::Inbox.admits(&bob, &message));
        assert!(!Folder::Trash.admits(&bob, &message));
        assert!(Folder::Drafts.admits(&alice, &message));
    }

    #[test]
    fn flag_resolution_is_party_aware() {
        let test_cases = vec![
            (Flag::Read, Party::Sender, None),
            (Flag::Read, Party::Recipient, Some(FlagColumn::IsRead)),
            (Flag::Archived, Party::Sender, Some(FlagColumn::IsArchived)),
            (
                Flag::Archived,
                Party::Recipient,
                Some(FlagColumn::IsArchived),
            ),
            (
                Flag::Starred,
                Party::Sender,
                Some(FlagColumn::StarredBySender),
            ),
            (
                Flag::Starred,
                Party::Recipient,
                Some(FlagColumn::StarredByRecipient),
            ),
        ];

        for (flag, party, expected) in test_cases {
            assert_eq!(
                flag.column_for(party),
                expected,
                "column mismatch for {:?} as {:?}",
                flag,
                party
            );
        }
    }

    #[test]
    fn folder_and_flag_names_parse_from_lowercase() {
        let test_cases = vec![
            ("inbox", Folder::Inbox),
            ("sent", Folder::Sent),
            ("drafts", Folder::Drafts),
            ("starred", Folder::Starred),
            ("archive", Folder::Archive),
            ("trash", Folder::Trash),
        ];

        for (input, expected) in test_cases {
            let result = Folder::from_str(input);
            assert_eq!(
                result.ok(),
                Some(expected),
                "failed to parse folder name: {}",
                input
            );
        }

        assert!(Folder::from_str("spam").is_err());
        assert!(Flag::from_str("read").is_ok());
        assert!(Flag::from_str("deleted").is_err(), "deletion is not a flag");
    }

    #[test]
    fn sender_copy_always_displays_read() {
        let message = sample("alice", "bob");
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert!(message.read_for(&alice));
        assert!(!message.read_for(&bob));
    }

    #[test]
    fn hidden_rules_follow_party_and_draft_state() {
        let mut draft = sample("alice", "bob");
        draft.is_draft = true;
        assert!(!draft.hidden_from(Party::Sender));
        assert!(draft.hidden_from(Party::Recipient));

        let mut deleted = sample("alice", "bob");
        deleted.deleted_by_sender = true;
        assert!(deleted.hidden_from(Party::Sender));
        assert!(!deleted.hidden_from(Party::Recipient));
    }

    #[test]
    fn document_refs_serialize_with_external_type_key() {
        let reference = DocumentRef {
            id: "doc-9".to_owned(),
            title: "Transcript".to_owned(),
            kind: "certificate".to_owned(),
        };

        let json = serde_json::to_string(&reference).unwrap();
        assert!(json.contains(r#""type":"certificate""#));

        let parsed: DocumentRef = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn draft_builder_defaults_leave_optional_fields_empty() {
        let draft = Draft::builder().sender("alice").build();

        assert_eq!(draft.sender, UserId::from("alice"));
        assert_eq!(draft.recipient, None);
        assert_eq!(draft.subject, "");
        assert_eq!(draft.priority, Priority::Normal);
        assert!(draft.cc.is_empty());
        assert!(draft.labels.is_empty());
        assert_eq!(draft.reply_to, None);
    }
}
