use thiserror::Error;

use murmur_shared::CryptoError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced account or chat does not exist.
    #[error("Record not found")]
    NotFound,

    /// An account with this username already exists.
    #[error("Record already exists")]
    AlreadyExists,

    /// A document exists on disk but cannot be decrypted or parsed.
    #[error("Corrupt document {collection}/{id}: {reason}")]
    CorruptDocument {
        collection: String,
        id: String,
        reason: String,
    },

    /// Username/password pair did not match. Deliberately does not say which.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Identifier that cannot safely be used as a file name.
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),

    /// Caller-supplied value rejected before touching storage.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Encryption of an outgoing document failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Generic I/O error (e.g. creating a collection directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
