//! Print one stored document in clear text.
//!
//! ```text
//! murmur-decrypt <key-file> <document-file> [--reveal-password]
//! ```
//!
//! The key file is only read; a missing or malformed key is an error.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use murmur_shared::keyfile;
use murmur_shared::Codec;

/// murmur-decrypt - print one stored murmur document in clear text
#[derive(Parser, Debug)]
#[command(name = "murmur-decrypt", version)]
struct Cli {
    /// Raw 32-byte key file the document was sealed with
    key_file: PathBuf,

    /// Document file (e.g. Data/users/<name>.json)
    document_file: PathBuf,

    /// Also decrypt the nested password field of account documents
    #[arg(long)]
    reveal_password: bool,
}

/// Decrypt a document token, optionally opening the nested password field.
fn open_document(codec: &Codec, token: &str, reveal_password: bool) -> anyhow::Result<Value> {
    let mut document: Value = codec
        .decrypt_json(token)
        .context("document could not be decrypted with this key")?;

    if reveal_password {
        if let Some(Value::String(password)) = document.get_mut("password") {
            *password = codec
                .decrypt(password)
                .context("password field could not be decrypted")?;
        }
    }

    Ok(document)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let key = keyfile::read_key(&cli.key_file)
        .with_context(|| format!("reading key file {}", cli.key_file.display()))?;
    let token = std::fs::read_to_string(&cli.document_file)
        .with_context(|| format!("reading document {}", cli.document_file.display()))?;

    let document = open_document(&Codec::new(key), &token, cli.reveal_password)?;
    println!("{}", serde_json::to_string_pretty(&document)?);

    Ok(())
}
