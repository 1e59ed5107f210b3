//! # murmur-store
//!
//! Encrypted document storage for accounts and chat transcripts.
//!
//! Each account and each chat is one JSON document, encrypted whole with the
//! process key (XChaCha20-Poly1305) and written to its own file. The crate
//! exposes the generic [`DocumentStore`] plus the [`ChatLedger`] and
//! [`Accounts`] services built on it.

pub mod accounts;
pub mod documents;
pub mod ledger;
pub mod models;

mod error;

pub use accounts::Accounts;
pub use documents::{Collection, DocumentStore, Listing};
pub use error::{Result, StoreError};
pub use ledger::ChatLedger;
pub use models::*;
