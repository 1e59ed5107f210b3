//! Process-wide encryption key, persisted as raw bytes.
//!
//! The key file is written exactly once. An existing file is always read,
//! never replaced: regenerating it would orphan every document encrypted
//! under the old key.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::info;

use crate::constants::SYMMETRIC_KEY_SIZE;
use crate::crypto::{generate_symmetric_key, key_fingerprint, SymmetricKey};
use crate::error::KeyFileError;

/// Load the key at `path`, generating and persisting a new one if absent.
pub fn load_or_create_key(path: &Path) -> Result<SymmetricKey, KeyFileError> {
    match read_key(path) {
        Ok(key) => {
            info!(
                path = %path.display(),
                fingerprint = %key_fingerprint(&key),
                "Loaded encryption key"
            );
            return Ok(key);
        }
        Err(KeyFileError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let key = generate_symmetric_key();
    match write_new_key(path, &key) {
        Ok(()) => {
            info!(
                path = %path.display(),
                fingerprint = %key_fingerprint(&key),
                "Generated new encryption key"
            );
            Ok(key)
        }
        // Another process created it between our read and write; use theirs.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => read_key(path),
        Err(e) => Err(e.into()),
    }
}

/// Read an existing key file. The file must hold exactly the raw key bytes.
pub fn read_key(path: &Path) -> Result<SymmetricKey, KeyFileError> {
    let bytes = fs::read(path)?;
    if bytes.len() != SYMMETRIC_KEY_SIZE {
        return Err(KeyFileError::InvalidLength {
            path: path.display().to_string(),
            expected: SYMMETRIC_KEY_SIZE,
            actual: bytes.len(),
        });
    }

    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn write_new_key(path: &Path, key: &SymmetricKey) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(key)?;
    file.sync_all()
}
