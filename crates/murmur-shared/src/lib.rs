//! # murmur-shared
//!
//! Primitives shared by the store and the server: the XChaCha20-Poly1305
//! document codec, the on-disk key file, and the legacy model-alias table.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod keyfile;
pub mod models;

pub use crypto::{Codec, SymmetricKey};
pub use error::{CryptoError, KeyFileError};
