//! Encrypted single-document-per-file storage.
//!
//! Every document lives at `<root>/<collection>/<id>.json` and holds the
//! codec token of its JSON serialization. Writes go through a temporary
//! file in the same directory followed by a rename, so a crash never
//! leaves a torn document behind. There is no locking: concurrent writers
//! to the same id race and the last rename wins.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_shared::constants::DOCUMENT_EXTENSION;
use murmur_shared::Codec;

use crate::error::{Result, StoreError};

const USERS_DIR: &str = "users";
const CHATS_DIR: &str = "chats";

/// A namespace of documents keyed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// Flat collection of account documents, keyed by username.
    Accounts,
    /// Chats owned by one user, keyed by chat id.
    Chats(String),
}

impl Collection {
    pub fn chats(username: impl Into<String>) -> Self {
        Collection::Chats(username.into())
    }

    fn relative_dir(&self) -> Result<PathBuf> {
        match self {
            Collection::Accounts => Ok(PathBuf::from(USERS_DIR)),
            Collection::Chats(username) => {
                validate_id(username)?;
                Ok(Path::new(CHATS_DIR).join(username))
            }
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Accounts => f.write_str(USERS_DIR),
            Collection::Chats(username) => write!(f, "{CHATS_DIR}/{username}"),
        }
    }
}

/// Reject ids that could escape their collection directory.
fn validate_id(id: &str) -> Result<()> {
    let has_separator = id.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if id.is_empty() || id == "." || id == ".." || has_separator {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Result of decrypting a whole collection.
#[derive(Debug)]
pub struct Listing<T> {
    pub documents: Vec<(String, T)>,
    /// Ids whose documents could not be read. Already logged.
    pub unreadable: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    codec: Codec,
}

impl DocumentStore {
    pub async fn open(root: PathBuf, codec: Codec) -> Result<Self> {
        fs::create_dir_all(root.join(USERS_DIR)).await?;
        fs::create_dir_all(root.join(CHATS_DIR)).await?;

        info!(path = %root.display(), key = %codec.fingerprint(), "Document store initialized");

        Ok(Self { root, codec })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    fn collection_dir(&self, collection: &Collection) -> Result<PathBuf> {
        Ok(self.root.join(collection.relative_dir()?))
    }

    fn document_path(&self, collection: &Collection, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self
            .collection_dir(collection)?
            .join(format!("{id}.{DOCUMENT_EXTENSION}")))
    }

    /// Load a document. `Ok(None)` means no such document; an existing but
    /// unreadable one is [`StoreError::CorruptDocument`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<T>> {
        let path = self.document_path(collection, id)?;

        let token = match fs::read_to_string(&path).await {
            Ok(token) => token,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(corrupt(collection, id, "not valid UTF-8"));
            }
            Err(e) => return Err(e.into()),
        };

        self.codec
            .decrypt_json(&token)
            .map(Some)
            .map_err(|e| corrupt(collection, id, e))
    }

    /// Encrypt and write `document`, replacing any previous version whole.
    pub async fn save<T: Serialize>(
        &self,
        collection: &Collection,
        id: &str,
        document: &T,
    ) -> Result<()> {
        let path = self.document_path(collection, id)?;
        let dir = self.collection_dir(collection)?;
        fs::create_dir_all(&dir).await?;

        let token = self.codec.encrypt_json(document)?;
        // Unique per save: concurrent writers of one id must not share it.
        let tmp_path = dir.join(format!(
            ".{id}.{}.{DOCUMENT_EXTENSION}.tmp",
            Uuid::new_v4().simple()
        ));

        if let Err(e) = write_then_rename(&tmp_path, &path, token.as_bytes()).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(collection = %collection, id = %id, size = token.len(), "Saved document");
        Ok(())
    }

    /// Remove a document. Returns whether a file was actually removed.
    pub async fn delete(&self, collection: &Collection, id: &str) -> Result<bool> {
        let path = self.document_path(collection, id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(collection = %collection, id = %id, "Deleted document");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of every document in `collection`, in directory order.
    pub async fn ids(&self, collection: &Collection) -> Result<Vec<String>> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }

        Ok(ids)
    }

    /// Decrypt every document in `collection`. One unreadable document is
    /// reported in [`Listing::unreadable`] and never aborts the listing.
    pub async fn list<T: DeserializeOwned>(&self, collection: &Collection) -> Result<Listing<T>> {
        let mut listing = Listing {
            documents: Vec::new(),
            unreadable: Vec::new(),
        };

        for id in self.ids(collection).await? {
            match self.get::<T>(collection, &id).await {
                Ok(Some(document)) => listing.documents.push((id, document)),
                // Removed between enumeration and read.
                Ok(None) => {}
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "Skipping unreadable document");
                    listing.unreadable.push(id);
                }
            }
        }

        Ok(listing)
    }

    /// Remove the collection directory if it holds no entries at all.
    pub async fn remove_collection_if_empty(&self, collection: &Collection) -> Result<bool> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if entries.next_entry().await?.is_some() {
            return Ok(false);
        }

        fs::remove_dir(&dir).await?;
        debug!(collection = %collection, "Removed empty collection");
        Ok(true)
    }
}

async fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp_path, path).await
}

fn corrupt(collection: &Collection, id: &str, reason: impl fmt::Display) -> StoreError {
    StoreError::CorruptDocument {
        collection: collection.to_string(),
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_shared::crypto::generate_symmetric_key;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        body: String,
    }

    fn note(title: &str) -> Note {
        Note {
            title: title.to_string(),
            body: "the quick brown fox".to_string(),
        }
    }

    async fn test_store() -> (DocumentStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path().to_path_buf(), Codec::new(generate_symmetric_key()))
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let (store, _dir) = test_store().await;
        let chats = Collection::chats("ada");

        store.save(&chats, "c1", &note("first")).await.unwrap();
        let loaded: Option<Note> = store.get(&chats, "c1").await.unwrap();

        assert_eq!(loaded, Some(note("first")));
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let (store, _dir) = test_store().await;
        let loaded: Option<Note> = store.get(&Collection::Accounts, "nobody").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_file_is_not_plaintext() {
        let (store, dir) = test_store().await;
        store.save(&Collection::Accounts, "ada", &note("secret title")).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("users").join("ada.json")).unwrap();
        assert!(!raw.contains("secret title"));
        assert!(!raw.contains("quick brown fox"));
    }

    #[tokio::test]
    async fn test_save_overwrites_whole_document() {
        let (store, _dir) = test_store().await;
        let chats = Collection::chats("ada");

        store.save(&chats, "c1", &note("first")).await.unwrap();
        store.save(&chats, "c1", &note("second")).await.unwrap();

        let loaded: Note = store.get(&chats, "c1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "second");
        assert_eq!(store.ids(&chats).await.unwrap(), vec!["c1".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_of_one_id_stay_readable() {
        let (store, dir) = test_store().await;
        let chats = Collection::chats("ada");

        for round in 0..50 {
            let mut handles = Vec::new();
            for writer in 0..8 {
                let store = store.clone();
                let chats = chats.clone();
                handles.push(tokio::spawn(async move {
                    let doc = Note {
                        title: format!("round {round} writer {writer}"),
                        body: "x".repeat(writer * 4096),
                    };
                    store.save(&chats, "c1", &doc).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let loaded: Note = store.get(&chats, "c1").await.unwrap().unwrap();
            assert!(loaded.title.starts_with(&format!("round {round} ")));
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("chats").join("ada"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_distinct_from_missing() {
        let (store, dir) = test_store().await;
        std::fs::write(dir.path().join("users").join("mallory.json"), "not a token").unwrap();

        let err = store
            .get::<Note>(&Collection::Accounts, "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptDocument { ref id, .. } if id == "mallory"));
    }

    #[tokio::test]
    async fn test_document_under_other_key_is_corrupt() {
        let (store, dir) = test_store().await;
        let other = DocumentStore::open(dir.path().to_path_buf(), Codec::new(generate_symmetric_key()))
            .await
            .unwrap();
        other.save(&Collection::Accounts, "ada", &note("x")).await.unwrap();

        assert!(matches!(
            store.get::<Note>(&Collection::Accounts, "ada").await,
            Err(StoreError::CorruptDocument { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = test_store().await;
        let chats = Collection::chats("ada");
        store.save(&chats, "c1", &note("x")).await.unwrap();

        assert!(store.delete(&chats, "c1").await.unwrap());
        assert!(!store.delete(&chats, "c1").await.unwrap());
        assert!(!store.delete(&Collection::chats("nobody"), "c9").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_entries() {
        let (store, dir) = test_store().await;
        let chats = Collection::chats("ada");
        store.save(&chats, "good1", &note("one")).await.unwrap();
        store.save(&chats, "good2", &note("two")).await.unwrap();
        std::fs::write(dir.path().join("chats").join("ada").join("bad.json"), "garbage").unwrap();

        let listing: Listing<Note> = store.list(&chats).await.unwrap();

        let mut titles: Vec<_> = listing.documents.iter().map(|(_, n)| n.title.clone()).collect();
        titles.sort();
        assert_eq!(titles, vec!["one", "two"]);
        assert_eq!(listing.unreadable, vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_ids_ignore_temp_and_foreign_files() {
        let (store, dir) = test_store().await;
        let chats = Collection::chats("ada");
        store.save(&chats, "c1", &note("x")).await.unwrap();

        let user_dir = dir.path().join("chats").join("ada");
        std::fs::write(user_dir.join(".c2.json.tmp"), "partial").unwrap();
        std::fs::write(user_dir.join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(user_dir.join("nested.json")).unwrap();

        assert_eq!(store.ids(&chats).await.unwrap(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_collection_lists_empty() {
        let (store, _dir) = test_store().await;
        let listing: Listing<Note> = store.list(&Collection::chats("ghost")).await.unwrap();
        assert!(listing.documents.is_empty());
        assert!(listing.unreadable.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let (store, _dir) = test_store().await;
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(
                matches!(
                    store.save(&Collection::Accounts, bad, &note("x")).await,
                    Err(StoreError::InvalidId(_))
                ),
                "accepted id {bad:?}"
            );
        }
        assert!(matches!(
            store.ids(&Collection::chats("../users")).await,
            Err(StoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_collection_if_empty() {
        let (store, dir) = test_store().await;
        let chats = Collection::chats("ada");
        store.save(&chats, "c1", &note("x")).await.unwrap();

        assert!(!store.remove_collection_if_empty(&chats).await.unwrap());
        store.delete(&chats, "c1").await.unwrap();
        assert!(store.remove_collection_if_empty(&chats).await.unwrap());
        assert!(!dir.path().join("chats").join("ada").exists());
        assert!(!store.remove_collection_if_empty(&chats).await.unwrap());
    }
}
