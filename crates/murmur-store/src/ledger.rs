//! Chat transcripts: creation, turn appends, renames and bulk removal.
//!
//! Every mutation is a read-modify-write of the whole chat document through
//! the [`DocumentStore`].

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::documents::{Collection, DocumentStore};
use crate::error::{Result, StoreError};
use crate::models::{derive_title, ChatRecord, ChatSummary, Role, Turn};

#[derive(Debug, Clone)]
pub struct ChatLedger {
    store: DocumentStore,
}

impl ChatLedger {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// `chat_<unix-seconds>_<8 random hex chars>`.
    pub fn new_chat_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("chat_{}_{}", Utc::now().timestamp(), &suffix[..8])
    }

    /// Create an empty chat and return its id.
    pub async fn create(&self, username: &str) -> Result<String> {
        let chat_id = Self::new_chat_id();
        self.store
            .save(&Collection::chats(username), &chat_id, &ChatRecord::default())
            .await?;

        info!(username = %username, chat_id = %chat_id, "Created chat");
        Ok(chat_id)
    }

    pub async fn load(&self, username: &str, chat_id: &str) -> Result<ChatRecord> {
        self.store
            .get(&Collection::chats(username), chat_id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Append one turn and persist the chat.
    ///
    /// A missing chat starts out empty; a corrupt one is an error and is
    /// left untouched on disk. The first user turn of a chat that still has
    /// the default title names it after its leading words.
    pub async fn append_turn(
        &self,
        username: &str,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ChatRecord> {
        let collection = Collection::chats(username);
        let mut chat = match self.store.get::<ChatRecord>(&collection, chat_id).await? {
            Some(chat) => chat,
            None => {
                debug!(username = %username, chat_id = %chat_id, "Appending to missing chat, starting empty");
                ChatRecord::default()
            }
        };

        chat.messages.push(Turn {
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        });

        if chat.messages.len() == 1 && role == Role::User && chat.has_default_title() {
            if let Some(title) = derive_title(content) {
                chat.title = title;
            }
        }

        self.store.save(&collection, chat_id, &chat).await?;
        Ok(chat)
    }

    pub async fn rename(&self, username: &str, chat_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("title must not be empty".into()));
        }

        let collection = Collection::chats(username);
        let mut chat: ChatRecord = self
            .store
            .get(&collection, chat_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        chat.title = title.to_string();
        self.store.save(&collection, chat_id, &chat).await
    }

    /// One summary per readable chat, in filesystem order.
    pub async fn list_summaries(&self, username: &str) -> Result<Vec<ChatSummary>> {
        let listing = self
            .store
            .list::<ChatRecord>(&Collection::chats(username))
            .await?;

        if !listing.unreadable.is_empty() {
            warn!(
                username = %username,
                skipped = listing.unreadable.len(),
                "Chat listing omitted unreadable chats"
            );
        }

        Ok(listing
            .documents
            .into_iter()
            .map(|(id, chat)| ChatSummary {
                id,
                title: chat.title,
            })
            .collect())
    }

    /// Idempotent: deleting an unknown chat succeeds.
    pub async fn delete(&self, username: &str, chat_id: &str) -> Result<()> {
        let removed = self
            .store
            .delete(&Collection::chats(username), chat_id)
            .await?;
        debug!(username = %username, chat_id = %chat_id, removed, "Delete chat");
        Ok(())
    }

    /// Delete every chat of `username`. Returns how many were removed.
    pub async fn clear_all(&self, username: &str) -> Result<usize> {
        let collection = Collection::chats(username);
        let mut removed = 0;
        for chat_id in self.store.ids(&collection).await? {
            if self.store.delete(&collection, &chat_id).await? {
                removed += 1;
            }
        }

        info!(username = %username, removed, "Cleared chats");
        Ok(removed)
    }

    /// Best-effort removal of everything `username` owns, used when the
    /// account goes away. Individual failures are logged and skipped.
    pub async fn delete_owner(&self, username: &str) -> Result<usize> {
        let collection = Collection::chats(username);
        let mut removed = 0;
        for chat_id in self.store.ids(&collection).await? {
            match self.store.delete(&collection, &chat_id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(username = %username, chat_id = %chat_id, error = %e, "Failed to delete chat");
                }
            }
        }

        if let Err(e) = self.store.remove_collection_if_empty(&collection).await {
            warn!(username = %username, error = %e, "Failed to remove chat directory");
        }

        info!(username = %username, removed, "Deleted all chats of owner");
        Ok(removed)
    }
}
