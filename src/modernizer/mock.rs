use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ModernizeRequest, Modernized, Modernizer, TokenUsage};

/// Archaic word → modern word, applied by the default mock.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("thee", "you"),
    ("thou", "you"),
    ("thy", "your"),
    ("thine", "yours"),
    ("ye", "you"),
    ("art", "are"),
    ("hath", "has"),
    ("doth", "does"),
    ("dost", "do"),
    ("shalt", "shall"),
    ("wilt", "will"),
    ("whilst", "while"),
    ("'tis", "it is"),
];

/// What a scripted step does.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Fail(String),
}

/// A modernizer for tests. Plays scripted replies in order, then falls back
/// to a deterministic word substitution.
pub struct MockModernizer {
    script: Vec<Script>,
    index: AtomicUsize,
    usage: Option<TokenUsage>,
    seen: Mutex<Vec<ModernizeRequest>>,
}

impl MockModernizer {
    /// Substitution only, no scripted steps.
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Script>) -> Self {
        Self {
            script,
            index: AtomicUsize::new(0),
            usage: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Report this usage for every call.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ModernizeRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Default for MockModernizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Modernizer for MockModernizer {
    async fn modernize(&self, request: &ModernizeRequest) -> Result<Modernized> {
        self.seen.lock().unwrap().push(request.clone());

        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let text = match self.script.get(i) {
            Some(Script::Reply(text)) => text.clone(),
            Some(Script::Fail(msg)) => bail!("{msg}"),
            None => modernize_words(&request.text),
        };
        Ok(Modernized {
            text,
            usage: self.usage,
        })
    }

    fn model(&self) -> String {
        "mock".to_string()
    }
}

/// Replace archaic words, keeping the capitalization of the first letter.
/// Everything that is not part of a word passes through untouched.
pub fn modernize_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    for c in text.chars() {
        if c.is_alphabetic() || c == '\'' {
            word.push(c);
            continue;
        }
        push_word(&mut out, &word);
        word.clear();
        out.push(c);
    }
    push_word(&mut out, &word);
    out
}

fn push_word(out: &mut String, word: &str) {
    if let Some(new) = substitute(word) {
        out.push_str(&new);
        return;
    }
    // Quotes around a word: 'thee'
    let core = word.trim_matches('\'');
    match substitute(core) {
        Some(new) if !core.is_empty() => {
            let lead = word.len() - word.trim_start_matches('\'').len();
            let trail = word.len() - word.trim_end_matches('\'').len();
            out.push_str(&word[..lead]);
            out.push_str(&new);
            out.push_str(&word[word.len() - trail..]);
        }
        _ => out.push_str(word),
    }
}

fn substitute(word: &str) -> Option<String> {
    let lower = word.to_lowercase();
    let (_, new) = SUBSTITUTIONS.iter().find(|(old, _)| *old == lower)?;
    let capitalized = word
        .chars()
        .find(|c| c.is_alphabetic())
        .is_some_and(char::is_uppercase);
    Some(match_case(new, capitalized))
}

fn match_case(word: &str, capitalized: bool) -> String {
    if !capitalized {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
