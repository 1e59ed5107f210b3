use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum KeyFileError {
    #[error("Invalid key length in {path}: expected {expected} bytes, found {actual}")]
    InvalidLength {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
}
