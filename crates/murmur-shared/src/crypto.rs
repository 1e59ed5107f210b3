use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

use crate::constants::{NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Short, non-secret identifier of a key for log lines.
pub fn key_fingerprint(key: &SymmetricKey) -> String {
    let hash = blake3::hash(key);
    hex::encode(&hash.as_bytes()[..4])
}

/// String-level codec used for every persisted document.
///
/// Tokens are `base64(nonce || ciphertext || tag)`. Decryption never falls
/// back to treating its input as plaintext: anything that does not
/// authenticate under this key is [`CryptoError::DecryptionFailed`].
#[derive(Clone)]
pub struct Codec {
    key: SymmetricKey,
}

impl Codec {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    pub fn fingerprint(&self) -> String {
        key_fingerprint(&self.key)
    }

    pub fn encrypt(&self, plain: &str) -> Result<String, CryptoError> {
        let sealed = encrypt(&self.key, plain.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let sealed = STANDARD
            .decode(token.trim())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let plain = decrypt(&self.key, &sealed)?;
        String::from_utf8(plain).map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CryptoError> {
        let json = serde_json::to_string(value)?;
        self.encrypt(&json)
    }

    pub fn decrypt_json<T: DeserializeOwned>(&self, token: &str) -> Result<T, CryptoError> {
        let json = self.decrypt(token)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
