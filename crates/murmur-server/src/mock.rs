//! Offline replies used while the model service is unreachable.
//!
//! The category of a reply is fixed by the input; the wording is picked at
//! random among a few templates per category.

use rand::seq::SliceRandom;
use rand::Rng;

use murmur_shared::constants::ELLIPSIS;

/// Maximum characters of user input echoed back in a generic reply.
pub const ECHO_LIMIT: usize = 50;

const GREETING_WORDS: &[&str] = &[
    "hello", "hi", "hey", "hiya", "howdy", "greetings", "yo", "hallo", "hola", "bonjour",
];

const GREETING_PHRASES: &[&str] = &["good morning", "good afternoon", "good evening"];

const QUESTION_WORDS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "whom", "whose", "which", "can", "could",
    "would", "should", "is", "are", "do", "does", "did", "will",
];

const GREETING_TEMPLATES: &[&str] = &[
    "Hello! This is {model} running in offline mode. How can I help you today?",
    "Hi there! {model} is answering from offline mode right now. What would you like to talk about?",
    "Hey! I'm {model} (offline mode). Good to hear from you.",
];

const QUESTION_TEMPLATES: &[&str] = &[
    "That's a good question. {model} is in offline mode, so I can't look into \"{input}\" properly right now.",
    "You asked: \"{input}\". {model} is offline at the moment; please try again once the model service is back.",
    "I'd like to answer \"{input}\", but {model} is running in offline mode.",
];

const GENERIC_TEMPLATES: &[&str] = &[
    "You said: \"{input}\". {model} is in offline mode and can only echo for now.",
    "Offline mode ({model}): I received \"{input}\".",
    "{model} is not reachable, so here is your message back: \"{input}\".",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Greeting,
    Question,
    Other,
}

pub fn classify(input: &str) -> Category {
    let lowered = input.trim().to_lowercase();
    let first_word = lowered
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .unwrap_or("");

    if GREETING_WORDS.contains(&first_word)
        || GREETING_PHRASES.iter().any(|p| lowered.starts_with(p))
    {
        Category::Greeting
    } else if QUESTION_WORDS.contains(&first_word) || lowered.ends_with('?') {
        Category::Question
    } else {
        Category::Other
    }
}

/// First [`ECHO_LIMIT`] characters of `input`, with an ellipsis if cut.
pub fn truncate_input(input: &str) -> String {
    let input = input.trim();
    match input.char_indices().nth(ECHO_LIMIT) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &input[..cut]),
        None => input.to_string(),
    }
}

pub fn reply(input: &str, model: &str) -> String {
    reply_with(&mut rand::thread_rng(), input, model)
}

pub fn reply_with<R: Rng + ?Sized>(rng: &mut R, input: &str, model: &str) -> String {
    let templates = match classify(input) {
        Category::Greeting => GREETING_TEMPLATES,
        Category::Question => QUESTION_TEMPLATES,
        Category::Other => GENERIC_TEMPLATES,
    };
    let template = templates.choose(rng).copied().unwrap_or(GENERIC_TEMPLATES[0]);

    template
        .replace("{model}", model)
        .replace("{input}", &truncate_input(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("Hello!"), Category::Greeting);
        assert_eq!(classify("hey, you there"), Category::Greeting);
        assert_eq!(classify("Good morning to you"), Category::Greeting);
        assert_eq!(classify("What is Rust?"), Category::Question);
        assert_eq!(classify("how do lifetimes work"), Category::Question);
        assert_eq!(classify("tell me more?"), Category::Question);
        assert_eq!(classify("Write a poem about crabs"), Category::Other);
        assert_eq!(classify(""), Category::Other);
        assert_eq!(classify("history of hiking"), Category::Other);
    }

    #[test]
    fn test_truncate_input() {
        assert_eq!(truncate_input("short"), "short");

        let exact = "x".repeat(ECHO_LIMIT);
        assert_eq!(truncate_input(&exact), exact);

        let long = "y".repeat(ECHO_LIMIT + 10);
        assert_eq!(truncate_input(&long), format!("{}...", "y".repeat(ECHO_LIMIT)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(60);
        let cut = truncate_input(&long);
        assert_eq!(cut.chars().count(), ECHO_LIMIT + ELLIPSIS.len());
    }

    #[test]
    fn test_replies_reference_model_or_input() {
        for _ in 0..20 {
            let greeting = reply("hi", "gemma3:1b");
            assert!(greeting.contains("gemma3:1b"));

            let question = reply("why is the sky blue?", "gemma3:1b");
            assert!(question.contains("why is the sky blue?"));

            let generic = reply("summarise this paragraph", "phi3:3.8b");
            assert!(generic.contains("summarise this paragraph"));
            assert!(generic.contains("phi3:3.8b"));
        }
    }

    #[test]
    fn test_generic_reply_echoes_truncated_input() {
        let input = "a".repeat(80);
        let echoed = reply_with(&mut rand::thread_rng(), &input, "m");
        assert!(echoed.contains(&format!("{}...", "a".repeat(ECHO_LIMIT))));
        assert!(!echoed.contains(&"a".repeat(ECHO_LIMIT + 1)));
    }

    #[test]
    fn test_reply_never_empty() {
        for input in ["", "   ", "?", "hello", "which one"] {
            assert!(!reply(input, "gemma3:1b").is_empty());
        }
    }
}
