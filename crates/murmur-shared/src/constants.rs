/// Application name
pub const APP_NAME: &str = "murmur";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Model used when a stored model value is neither qualified nor a known alias
pub const DEFAULT_MODEL: &str = "gemma3:1b";

/// Separator between a model name and its version tag (`name:version`)
pub const MODEL_VERSION_SEPARATOR: char = ':';

/// Title given to a chat until its first user turn names it
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Number of leading words used for a derived chat title
pub const TITLE_WORDS: usize = 3;

/// Marker appended to shortened text
pub const ELLIPSIS: &str = "...";

/// File extension of every persisted document
pub const DOCUMENT_EXTENSION: &str = "json";

/// Default local model service (Ollama-compatible)
pub const DEFAULT_COMPLETION_URL: &str = "http://127.0.0.1:11434";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 5000;
