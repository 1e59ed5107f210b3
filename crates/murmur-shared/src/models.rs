//! Legacy model aliases.
//!
//! Older account documents store a short nickname (`"gemma"`) instead of a
//! fully qualified `name:version` identifier.

use crate::constants::{DEFAULT_MODEL, MODEL_VERSION_SEPARATOR};

/// Short alias -> fully qualified model identifier.
pub const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("mistral", "mistral:latest"),
    ("gemma", "gemma3:1b"),
    ("tinyllama", "tinyllama:latest"),
    ("phi3", "phi3:3.8b"),
    ("phi", "phi:latest"),
    ("deepseek-coder", "deepseek-coder:latest"),
    ("deepseek-r1", "deepseek-r1:8b"),
    ("tinystories", "gurubot/tinystories-656k-q8:latest"),
    ("llama2-uncensored", "llama2-uncensored:latest"),
    ("llava", "llava:7b"),
    ("phi4-mini", "phi4-mini:latest"),
    ("phi4", "phi4:latest"),
    ("codellama", "codellama:latest"),
    ("smollm-1.7b", "smollm:1.7b"),
    ("smollm-135m", "smollm:135m"),
    ("qwen3-8b", "qwen3:8b"),
    ("qwen3-0.6b", "qwen3:0.6b"),
    ("deepscaler", "deepscaler:latest"),
    ("dolphin-mistral", "dolphin-mistral:latest"),
    ("dolphin-phi", "dolphin-phi:latest"),
];

/// Resolve a stored model value to the identifier sent to the model service.
///
/// Qualified values pass through; known aliases are mapped; anything else
/// falls back to [`DEFAULT_MODEL`].
pub fn resolve_model(stored: &str) -> &str {
    if stored.contains(MODEL_VERSION_SEPARATOR) {
        return stored;
    }
    LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == stored)
        .map(|(_, qualified)| *qualified)
        .unwrap_or(DEFAULT_MODEL)
}
