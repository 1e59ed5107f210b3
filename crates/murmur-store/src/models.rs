//! Domain model structs persisted as encrypted JSON documents.
//!
//! Field names follow the on-disk JSON format, so documents written by
//! earlier versions keep loading.

use serde::{Deserialize, Serialize};

use murmur_shared::constants::{DEFAULT_CHAT_TITLE, ELLIPSIS, TITLE_WORDS};

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A registered user. Stored in the `users` collection under its username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Username, also the document id.
    pub username: String,
    /// Ciphertext of the plaintext password (encrypted again inside the
    /// already-encrypted document).
    pub password: String,
    /// UI preferences, flattened into the same JSON object.
    #[serde(flatten)]
    pub settings: Settings,
}

/// Per-user preferences. Missing fields take their defaults, which lets
/// documents that only carry `theme` and `model` load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub theme: String,
    pub color_theme: String,
    /// Stored model value: a legacy alias or a `name:version` identifier.
    pub model: String,
    pub font_size: String,
    pub send_on_enter: bool,
    pub show_timestamps: bool,
    pub compact_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "dark".into(),
            color_theme: "default".into(),
            model: "gemma".into(),
            font_size: "medium".into(),
            send_on_enter: true,
            show_timestamps: true,
            compact_mode: false,
        }
    }
}

/// Partial settings update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub theme: Option<String>,
    pub color_theme: Option<String>,
    pub model: Option<String>,
    pub font_size: Option<String>,
    pub send_on_enter: Option<bool>,
    pub show_timestamps: Option<bool>,
    pub compact_mode: Option<bool>,
}

impl Settings {
    /// Apply `update`. Empty strings are ignored like absent values.
    pub fn apply(&mut self, update: SettingsUpdate) {
        fn set(field: &mut String, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                *field = v;
            }
        }

        set(&mut self.theme, update.theme);
        set(&mut self.color_theme, update.color_theme);
        set(&mut self.model, update.model);
        set(&mut self.font_size, update.font_size);
        if let Some(v) = update.send_on_enter {
            self.send_on_enter = v;
        }
        if let Some(v) = update.show_timestamps {
            self.show_timestamps = v;
        }
        if let Some(v) = update.compact_mode {
            self.compact_mode = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// A chat transcript. Stored in `chats/<username>` under its chat id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Turn>,
}

fn default_title() -> String {
    DEFAULT_CHAT_TITLE.to_string()
}

impl Default for ChatRecord {
    fn default() -> Self {
        Self {
            title: default_title(),
            messages: Vec::new(),
        }
    }
}

impl ChatRecord {
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CHAT_TITLE
    }
}

/// Entry of a chat listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
}

/// Title derived from the leading words of a first message.
///
/// Returns `None` when `content` has no words at all.
pub fn derive_title(content: &str) -> Option<String> {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let mut title = words[..words.len().min(TITLE_WORDS)].join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str(ELLIPSIS);
    }
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_truncates_long_content() {
        assert_eq!(
            derive_title("hello there friend how are you").as_deref(),
            Some("hello there friend...")
        );
    }

    #[test]
    fn test_derive_title_short_content() {
        assert_eq!(derive_title("hi").as_deref(), Some("hi"));
        assert_eq!(derive_title("  one   two three ").as_deref(), Some("one two three"));
    }

    #[test]
    fn test_derive_title_blank_content() {
        assert_eq!(derive_title("   \n\t"), None);
    }

    #[test]
    fn test_legacy_account_document_loads_with_defaults() {
        let json = r#"{"username":"ada","password":"gAAAA...","theme":"light","model":"phi3"}"#;
        let account: Account = serde_json::from_str(json).unwrap();

        assert_eq!(account.username, "ada");
        assert_eq!(account.settings.theme, "light");
        assert_eq!(account.settings.model, "phi3");
        assert_eq!(account.settings.color_theme, "default");
        assert!(account.settings.send_on_enter);
    }

    #[test]
    fn test_account_serializes_flat_camel_case() {
        let account = Account {
            username: "ada".into(),
            password: "cipher".into(),
            settings: Settings::default(),
        };
        let value = serde_json::to_value(&account).unwrap();

        assert_eq!(value["username"], "ada");
        assert_eq!(value["colorTheme"], "default");
        assert_eq!(value["sendOnEnter"], true);
        assert!(value.get("settings").is_none());
    }

    #[test]
    fn test_settings_apply_partial_update() {
        let mut settings = Settings::default();
        settings.apply(SettingsUpdate {
            theme: Some("light".into()),
            model: Some(String::new()),
            compact_mode: Some(true),
            ..Default::default()
        });

        assert_eq!(settings.theme, "light");
        assert_eq!(settings.model, "gemma");
        assert!(settings.compact_mode);
    }

    #[test]
    fn test_chat_document_format() {
        let chat = ChatRecord {
            title: "hi".into(),
            messages: vec![Turn {
                role: Role::Assistant,
                content: "hello".into(),
                timestamp: 1_700_000_000,
            }],
        };
        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "title": "hi",
                "messages": [{"role": "assistant", "content": "hello", "timestamp": 1700000000}]
            })
        );
    }
}
