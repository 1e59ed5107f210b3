//! Account registry on top of the `users` collection.
//!
//! Passwords are kept reversibly encrypted inside the (already encrypted)
//! account document and checked by equality after decryption. This keeps
//! existing account documents and the `murmur-decrypt` tool working; it is
//! not a password hashing scheme.

use subtle::ConstantTimeEq;
use tracing::{info, warn};

use murmur_shared::constants::DEFAULT_MODEL;
use murmur_shared::models::resolve_model;

use crate::documents::{Collection, DocumentStore};
use crate::error::{Result, StoreError};
use crate::ledger::ChatLedger;
use crate::models::{Account, Settings, SettingsUpdate};

#[derive(Debug, Clone)]
pub struct Accounts {
    store: DocumentStore,
    ledger: ChatLedger,
}

impl Accounts {
    pub fn new(store: DocumentStore, ledger: ChatLedger) -> Self {
        Self { store, ledger }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Account> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(StoreError::InvalidInput(
                "Username and password are required".into(),
            ));
        }

        if self
            .store
            .get::<Account>(&Collection::Accounts, username)
            .await?
            .is_some()
        {
            return Err(StoreError::AlreadyExists);
        }

        let account = Account {
            username: username.to_string(),
            password: self.store.codec().encrypt(password)?,
            settings: Settings::default(),
        };
        self.store
            .save(&Collection::Accounts, username, &account)
            .await?;

        info!(username = %username, "Registered account");
        Ok(account)
    }

    pub async fn get(&self, username: &str) -> Result<Account> {
        self.store
            .get(&Collection::Accounts, username)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Check a username/password pair. Unknown users and wrong passwords
    /// produce the same [`StoreError::InvalidCredentials`].
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Account> {
        let account = match self.store.get::<Account>(&Collection::Accounts, username).await {
            Ok(Some(account)) => account,
            Ok(None) | Err(StoreError::InvalidId(_)) => return Err(StoreError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        self.verify_password(&account, password)?;
        Ok(account)
    }

    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        if new_password.is_empty() {
            return Err(StoreError::InvalidInput("New password is required".into()));
        }

        let mut account = self.get(username).await?;
        self.verify_password(&account, old_password)?;

        account.password = self.store.codec().encrypt(new_password)?;
        self.store
            .save(&Collection::Accounts, username, &account)
            .await?;

        info!(username = %username, "Password changed");
        Ok(())
    }

    pub async fn update_settings(&self, username: &str, update: SettingsUpdate) -> Result<Settings> {
        let mut account = self.get(username).await?;
        account.settings.apply(update);
        self.store
            .save(&Collection::Accounts, username, &account)
            .await?;
        Ok(account.settings)
    }

    /// Model identifier to send to the model service for `username`.
    pub async fn resolved_model(&self, username: &str) -> Result<String> {
        let model = match self.store.get::<Account>(&Collection::Accounts, username).await? {
            Some(account) => resolve_model(&account.settings.model).to_string(),
            None => DEFAULT_MODEL.to_string(),
        };
        Ok(model)
    }

    /// Delete an account and, first, every chat it owns.
    ///
    /// Chat cleanup is best effort; only failing to remove the account
    /// document itself is an error.
    pub async fn delete(&self, username: &str) -> Result<()> {
        if self
            .store
            .get::<Account>(&Collection::Accounts, username)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound);
        }

        if let Err(e) = self.ledger.delete_owner(username).await {
            warn!(username = %username, error = %e, "Chat cleanup failed during account deletion");
        }

        self.store.delete(&Collection::Accounts, username).await?;
        info!(username = %username, "Deleted account");
        Ok(())
    }

    fn verify_password(&self, account: &Account, candidate: &str) -> Result<()> {
        let stored = self
            .store
            .codec()
            .decrypt(&account.password)
            .map_err(|e| StoreError::CorruptDocument {
                collection: Collection::Accounts.to_string(),
                id: account.username.clone(),
                reason: format!("password field: {e}"),
            })?;

        if bool::from(stored.as_bytes().ct_eq(candidate.as_bytes())) {
            Ok(())
        } else {
            Err(StoreError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use murmur_shared::crypto::generate_symmetric_key;
    use murmur_shared::Codec;
    use tempfile::TempDir;

    async fn test_accounts() -> (Accounts, ChatLedger, DocumentStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path().to_path_buf(), Codec::new(generate_symmetric_key()))
            .await
            .unwrap();
        let ledger = ChatLedger::new(store.clone());
        let accounts = Accounts::new(store.clone(), ledger.clone());
        (accounts, ledger, store, dir)
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        accounts.register("ada", "lovelace").await.unwrap();

        let account = accounts.authenticate("ada", "lovelace").await.unwrap();
        assert_eq!(account.username, "ada");
        assert_eq!(account.settings, Settings::default());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        accounts.register("ada", "one").await.unwrap();

        assert!(matches!(
            accounts.register("ada", "two").await,
            Err(StoreError::AlreadyExists)
        ));
        assert!(accounts.authenticate("ada", "one").await.is_ok());
    }

    #[tokio::test]
    async fn test_register_requires_both_fields() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        assert!(matches!(
            accounts.register("", "pw").await,
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            accounts.register("ada", "").await,
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_password_is_encrypted_inside_document() {
        let (accounts, _ledger, store, _dir) = test_accounts().await;
        accounts.register("ada", "lovelace").await.unwrap();

        let stored: Account = store.get(&Collection::Accounts, "ada").await.unwrap().unwrap();
        assert_ne!(stored.password, "lovelace");
        assert_eq!(store.codec().decrypt(&stored.password).unwrap(), "lovelace");
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        accounts.register("ada", "lovelace").await.unwrap();

        let wrong_password = accounts.authenticate("ada", "babbage").await.unwrap_err();
        let unknown_user = accounts.authenticate("bob", "lovelace").await.unwrap_err();
        let bad_name = accounts.authenticate("../ada", "lovelace").await.unwrap_err();

        assert!(matches!(wrong_password, StoreError::InvalidCredentials));
        assert!(matches!(unknown_user, StoreError::InvalidCredentials));
        assert!(matches!(bad_name, StoreError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_change_password() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        accounts.register("ada", "old").await.unwrap();

        assert!(matches!(
            accounts.change_password("ada", "wrong", "new").await,
            Err(StoreError::InvalidCredentials)
        ));
        accounts.change_password("ada", "old", "new").await.unwrap();

        assert!(accounts.authenticate("ada", "old").await.is_err());
        assert!(accounts.authenticate("ada", "new").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_settings_persists() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        accounts.register("ada", "pw").await.unwrap();

        let settings = accounts
            .update_settings(
                "ada",
                SettingsUpdate {
                    theme: Some("light".into()),
                    model: Some("phi3".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(settings.theme, "light");

        let reloaded = accounts.get("ada").await.unwrap();
        assert_eq!(reloaded.settings.model, "phi3");
        assert!(accounts.authenticate("ada", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_resolved_model() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        assert_eq!(accounts.resolved_model("nobody").await.unwrap(), DEFAULT_MODEL);

        accounts.register("ada", "pw").await.unwrap();
        assert_eq!(accounts.resolved_model("ada").await.unwrap(), "gemma3:1b");

        let cases = [
            ("deepseek-r1", "deepseek-r1:8b"),
            ("llama2-uncensored:latest", "llama2-uncensored:latest"),
        ];
        for (stored, expected) in cases {
            accounts
                .update_settings(
                    "ada",
                    SettingsUpdate {
                        model: Some(stored.into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(accounts.resolved_model("ada").await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_delete_cascades_to_chats() {
        let (accounts, ledger, _store, dir) = test_accounts().await;
        accounts.register("ada", "pw").await.unwrap();
        let chat = ledger.create("ada").await.unwrap();
        ledger.append_turn("ada", &chat, Role::User, "hello").await.unwrap();
        ledger.create("ada").await.unwrap();

        accounts.delete("ada").await.unwrap();

        assert!(ledger.list_summaries("ada").await.unwrap().is_empty());
        assert!(matches!(accounts.get("ada").await, Err(StoreError::NotFound)));
        assert!(!dir.path().join("chats").join("ada").exists());
        assert!(!dir.path().join("users").join("ada.json").exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_account() {
        let (accounts, _ledger, _store, _dir) = test_accounts().await;
        assert!(matches!(accounts.delete("ghost").await, Err(StoreError::NotFound)));
    }
}
