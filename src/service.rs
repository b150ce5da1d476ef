use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    Acquire, SqlitePool,
};
use tokio::sync::broadcast;

use crate::{
    attachment::{Attachment, AttachmentUpload},
    config::{Config, RetentionPolicy},
    db,
    error::Error,
    identity::{Directory, Identity},
    message::{Draft, Flag, Folder, Message, MessageId, ThreadId, UserId},
    notify::{ChangeEvent, ChangeFeed},
    objects::ObjectStore,
};

/// A message as listed in a folder view, enriched with both parties'
/// identities at read time.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct ProjectedMessage {
    pub message: Message,
    pub sender: Identity,
    pub recipient: Identity,
    /// Read state as displayed to the viewer; sender copies always show
    /// read.
    pub read: bool,
}

/// A message as displayed inside a thread. Thread views enrich senders
/// only.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub message: Message,
    pub sender: Identity,
}

/// The messaging service.
///
/// Owns the SQLite pool, the directory and object-store handles, and the
/// change feed. One instance is shared by every portal session.
pub struct Service {
    db: SqlitePool,
    config: Config,
    directory: Arc<dyn Directory>,
    objects: Arc<dyn ObjectStore>,
    feed: ChangeFeed,
}

impl Service {
    pub async fn connect(
        directory: Arc<dyn Directory>,
        objects: Arc<dyn ObjectStore>,
    ) -> Result<Self, Error> {
        Self::connect_with(Config::default(), directory, objects).await
    }

    pub async fn connect_with(
        config: Config,
        directory: Arc<dyn Directory>,
        objects: Arc<dyn ObjectStore>,
    ) -> Result<Self, Error> {
        let opts = if let Some(path) = config.db_path() {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        } else {
            SqliteConnectOptions::new().in_memory(true)
        }
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .optimize_on_close(true, None)
        .auto_vacuum(SqliteAutoVacuum::Full);

        let mut pool_opts = SqlitePoolOptions::new();

        // A ":memory:" database lives and dies with its connection, so the
        // pool is pinned to one connection that is never recycled.
        if config.db_path().is_none() {
            pool_opts = pool_opts
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_opts.connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let feed = ChangeFeed::new(config.feed_capacity());

        Ok(Self {
            db: pool,
            config,
            directory,
            objects,
            feed,
        })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribes to coarse change events. See [`crate::notify`].
    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Sends a message.
    ///
    /// Requires a recipient and a non-blank subject. When the draft replies
    /// to another message, the new message joins the parent's thread; if
    /// the parent has none yet, a fresh thread id is minted and stamped on
    /// both messages in the same transaction.
    pub async fn send(&self, draft: Draft) -> Result<Message, Error> {
        let recipient = draft
            .recipient
            .clone()
            .ok_or_else(|| Error::validation("recipient is required"))?;

        if draft.subject.trim().is_empty() {
            return Err(Error::validation("subject must not be blank"));
        }

        let mut tx = self.db.begin().await?;

        let thread_id = match &draft.reply_to {
            None => None,
            Some(parent_id) => {
                // The parent goes through the same visibility gate as any
                // mutation target: a stranger cannot reply to (or probe) a
                // foreign message, and a sender's own-deleted parent behaves
                // as absent.
                let (parent, _) =
                    Message::fetch_visible(tx.acquire().await?, parent_id, &draft.sender).await?;

                if parent.is_draft {
                    return Err(Error::validation("cannot reply to a draft"));
                }

                match parent.thread_id {
                    Some(existing) => Some(existing),
                    None => Some(
                        Message::mint_thread_id(
                            tx.acquire().await?,
                            parent_id,
                            &ThreadId::generate(),
                        )
                        .await?,
                    ),
                }
            }
        };

        let message = Message {
            id: MessageId::generate(),
            sender_id: draft.sender,
            recipient_id: recipient,
            subject: draft.subject,
            body: draft.body,
            priority: draft.priority,
            is_read: false,
            is_archived: false,
            is_draft: false,
            starred_by_sender: false,
            starred_by_recipient: false,
            deleted_by_sender: false,
            deleted_by_recipient: false,
            thread_id,
            reply_to_id: draft.reply_to,
            cc: draft.cc,
            bcc: draft.bcc,
            labels: draft.labels,
            document_refs: draft.document_refs,
            created_at: db::now_ms(),
        };

        message.insert(tx.acquire().await?).await?;

        tx.commit().await?;

        tracing::info!(
            id = %message.id,
            sender = %message.sender_id,
            recipient = %message.recipient_id,
            "message sent"
        );

        self.feed.publish(ChangeEvent {
            message_id: message.id.clone(),
            parties: vec![message.sender_id.clone(), message.recipient_id.clone()],
        });

        Ok(message)
    }

    /// Saves a draft.
    ///
    /// Same validation as [`Service::send`]. The draft is visible to its
    /// author only and joins no thread; `reply_to` is stored so sending it
    /// later can. The change event names the author alone, so nothing
    /// reaches the recipient's views.
    pub async fn save_draft(&self, draft: Draft) -> Result<Message, Error> {
        let recipient = draft
            .recipient
            .clone()
            .ok_or_else(|| Error::validation("recipient is required"))?;

        if draft.subject.trim().is_empty() {
            return Err(Error::validation("subject must not be blank"));
        }

        let mut tx = self.db.begin().await?;

        let message = Message {
            id: MessageId::generate(),
            sender_id: draft.sender,
            recipient_id: recipient,
            subject: draft.subject,
            body: draft.body,
            priority: draft.priority,
            is_read: false,
            is_archived: false,
            is_draft: true,
            starred_by_sender: false,
            starred_by_recipient: false,
            deleted_by_sender: false,
            deleted_by_recipient: false,
            thread_id: None,
            reply_to_id: draft.reply_to,
            cc: draft.cc,
            bcc: draft.bcc,
            labels: draft.labels,
            document_refs: draft.document_refs,
            created_at: db::now_ms(),
        };

        message.insert(tx.acquire().await?).await?;

        tx.commit().await?;

        tracing::info!(id = %message.id, sender = %message.sender_id, "draft saved");

        self.feed.publish(ChangeEvent {
            message_id: message.id.clone(),
            parties: vec![message.sender_id.clone()],
        });

        Ok(message)
    }

    /// Sets or clears one classification flag as `viewer`.
    ///
    /// The starred flag resolves to the viewer's own column, so starring
    /// never changes what the other party sees, and read state is writable
    /// by the recipient only. The write touches a single column of a single
    /// row; concurrent writers of different flags both land.
    pub async fn set_flag(
        &self,
        message_id: &MessageId,
        viewer: &UserId,
        flag: Flag,
        value: bool,
    ) -> Result<Message, Error> {
        let mut tx = self.db.begin().await?;

        let (mut message, party) =
            Message::fetch_visible(tx.acquire().await?, message_id, viewer).await?;

        let column = flag.column_for(party).ok_or(Error::Unauthorized)?;
        Message::set_flag(tx.acquire().await?, message_id, column, value).await?;

        tx.commit().await?;

        message.apply_flag(column, value);

        tracing::debug!(id = %message.id, viewer = %viewer, flag = %flag, value, "flag updated");

        self.feed.publish(ChangeEvent {
            message_id: message.id.clone(),
            parties: vec![message.sender_id.clone(), message.recipient_id.clone()],
        });

        Ok(message)
    }

    /// Soft-deletes the viewer's side of a message.
    ///
    /// The row survives until the other party deletes too; what happens
    /// then is decided by the configured [`RetentionPolicy`].
    pub async fn soft_delete(&self, message_id: &MessageId, viewer: &UserId) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        let (message, party) =
            Message::fetch_visible(tx.acquire().await?, message_id, viewer).await?;

        Message::set_flag(tx.acquire().await?, message_id, party.delete_column(), true).await?;

        let mut purged = false;

        if self.config.retention == RetentionPolicy::Purge {
            if let Some(updated) = Message::fetch(tx.acquire().await?, message_id).await? {
                if updated.deleted_by_sender && updated.deleted_by_recipient {
                    Message::purge(tx.acquire().await?, message_id).await?;
                    purged = true;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(id = %message.id, viewer = %viewer, purged, "message soft-deleted");

        self.feed.publish(ChangeEvent {
            message_id: message.id.clone(),
            parties: vec![message.sender_id.clone(), message.recipient_id.clone()],
        });

        Ok(())
    }

    /// Computes the viewer's view of a folder: every message whose flags
    /// satisfy the folder predicate, newest first, enriched with both
    /// parties' identities.
    pub async fn project(
        &self,
        viewer: &UserId,
        folder: Folder,
    ) -> Result<Vec<ProjectedMessage>, Error> {
        let rows = {
            let mut conn = self.db.acquire().await?;
            Message::list_for_viewer(conn.acquire().await?, viewer).await?
        };

        let mut cache = HashMap::new();
        let mut listing = Vec::new();

        for message in rows {
            if !folder.admits(viewer, &message) {
                continue;
            }

            let sender = self.cached_identity(&mut cache, &message.sender_id).await?;
            let recipient = self
                .cached_identity(&mut cache, &message.recipient_id)
                .await?;
            let read = message.read_for(viewer);

            listing.push(ProjectedMessage {
                sender,
                recipient,
                read,
                message,
            });
        }

        Ok(listing)
    }

    /// Assembles the flat conversation view around `message_id`, oldest
    /// first.
    ///
    /// The viewer must be able to see the entry message; the rest of the
    /// thread is then listed without per-message re-checks, matching the
    /// flat chronological display. A message with no thread id yields
    /// itself alone.
    pub async fn assemble_thread(
        &self,
        viewer: &UserId,
        message_id: &MessageId,
    ) -> Result<Vec<ThreadMessage>, Error> {
        let rows = {
            let mut conn = self.db.acquire().await?;
            let (entry, _) =
                Message::fetch_visible(conn.acquire().await?, message_id, viewer).await?;

            match entry.thread_id.clone() {
                None => vec![entry],
                Some(thread_id) => {
                    Message::list_thread(conn.acquire().await?, &thread_id).await?
                }
            }
        };

        let mut cache = HashMap::new();
        let mut thread = Vec::new();

        for message in rows {
            let sender = self.cached_identity(&mut cache, &message.sender_id).await?;
            thread.push(ThreadMessage { sender, message });
        }

        Ok(thread)
    }

    /// Counts the viewer's unread messages in a folder.
    ///
    /// Only rows where the viewer is the recipient can be unread; sender
    /// copies never count. Always a full recount against the folder
    /// predicate, so the number cannot drift from what a listing shows.
    pub async fn count_unread(&self, viewer: &UserId, folder: Folder) -> Result<u64, Error> {
        let rows = {
            let mut conn = self.db.acquire().await?;
            Message::list_for_viewer(conn.acquire().await?, viewer).await?
        };

        let count = rows
            .iter()
            .filter(|m| folder.admits(viewer, m) && m.recipient_id == *viewer && !m.is_read)
            .count();

        Ok(count as u64)
    }

    /// Stores one uploaded file and appends it to the message's ledger.
    ///
    /// The object write happens first; the ledger row is only written once
    /// the store accepted the bytes. A ledger failure after a successful
    /// put orphans the object, which is tolerated; there is no rollback.
    pub async fn attach(
        &self,
        message_id: &MessageId,
        upload: AttachmentUpload,
    ) -> Result<Attachment, Error> {
        let message = {
            let mut conn = self.db.acquire().await?;
            Message::fetch(conn.acquire().await?, message_id)
                .await?
                .ok_or_else(|| Error::message_not_found(message_id))?
        };

        // A fresh uuid keeps two same-named uploads in the same millisecond
        // from sharing an object path.
        let created_at = db::now_ms();
        let path = format!(
            "{}/{}_{}_{}",
            message.sender_id,
            created_at.timestamp_millis(),
            uuid::Uuid::new_v4(),
            upload.file_name
        );

        let stored = self.objects.put(&path, upload.bytes.clone()).await?;

        let attachment = {
            let mut conn = self.db.acquire().await?;
            Attachment::insert(conn.acquire().await?, message_id, &stored, &upload, created_at)
                .await?
        };

        tracing::info!(
            id = %message_id,
            file = %attachment.file_name,
            size = attachment.file_size,
            "attachment stored"
        );

        Ok(attachment)
    }

    /// Ledger rows for a message, in upload order.
    pub async fn attachments(&self, message_id: &MessageId) -> Result<Vec<Attachment>, Error> {
        let mut conn = self.db.acquire().await?;
        Attachment::list_for(conn.acquire().await?, message_id).await
    }

    /// Retrieves the stored bytes behind a ledger row.
    pub async fn attachment_bytes(&self, attachment: &Attachment) -> Result<Bytes, Error> {
        self.objects.get(&attachment.file_path).await
    }

    /// Resolves the display identity for a portal user, creating it on
    /// first sight.
    ///
    /// Creation consults the directory once; afterwards the stored row is
    /// authoritative and the directory is never re-read, so later renames
    /// or role changes leave existing identities untouched.
    pub async fn resolve_identity(&self, user_id: &UserId) -> Result<Identity, Error> {
        {
            let mut conn = self.db.acquire().await?;
            if let Some(identity) = Identity::fetch(conn.acquire().await?, user_id).await? {
                return Ok(identity);
            }
        }

        let record = self.directory.lookup(user_id).await?;

        let mut conn = self.db.acquire().await?;
        let identity = Identity::create(conn.acquire().await?, user_id, &record).await?;

        tracing::debug!(user = %user_id, address = %identity.internal_id, "identity provisioned");

        Ok(identity)
    }

    async fn cached_identity(
        &self,
        cache: &mut HashMap<UserId, Identity>,
        user_id: &UserId,
    ) -> Result<Identity, Error> {
        if let Some(found) = cache.get(user_id) {
            return Ok(found.clone());
        }

        let resolved = self.resolve_identity(user_id).await?;
        cache.insert(user_id.clone(), resolved.clone());

        Ok(resolved)
    }
}
