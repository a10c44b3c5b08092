//! Cached regex patterns for chapter and sentence detection.
//!
//! Compiled once on first use through `LazyLock`.

use regex::Regex;
use std::sync::LazyLock;

/// English ordinals accepted after a division keyword.
pub const NUMBER_WORDS: &[&str] = &[
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty", "thirty", "forty", "fifty", "first", "second", "third", "fourth",
    "fifth", "sixth", "seventh", "eighth", "ninth", "tenth", "eleventh", "twelfth", "last",
    "final",
];

/// Punctuation allowed between a heading keyword and its title.
const HEADING_PUNCT: &str = r"[.:;,\x{2014}\x{2013}-]+";

/// Matches `CHAPTER IV. The Storm`, `Book the First`, `Stave One.`
///
/// Groups: `digits`, `words` or `roman` for the ordinal, then `punct` and `title`.
pub static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Longest first, so "tenth" is not read as "ten" plus a title.
    let mut words = NUMBER_WORDS.to_vec();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    let word = format!("(?:{})", words.join("|"));
    Regex::new(&format!(
        r"(?i)^(?:chapter|book|part|volume|act|scene|canto|letter|stave)\s+(?:the\s+)?(?:(?P<digits>\d+)|(?P<words>{word}(?:-{word})*)|(?P<roman>[ivxlcdm]+))(?:\s*(?P<punct>{HEADING_PUNCT}))?(?:\s*(?P<title>.+))?$"
    ))
    .unwrap()
});

/// Matches `PREFACE`, `Introduction.`, `Epilogue: After the War`.
pub static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:prologue|epilogue|preface|introduction|foreword|afterword|conclusion)(?:\s*(?P<punct>{HEADING_PUNCT}))?(?:\s*(?P<title>.+))?$"
    ))
    .unwrap()
});

/// Matches a line holding only an uppercase roman numeral, e.g. `IV.`
pub static ROMAN_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<roman>[IVXLCDM]+)\.?$").unwrap());

/// Sentence end: `.`, `!` or `?`, any closing quotes or brackets, then whitespace.
pub static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["'\x{201d}\x{2019})\]\x{bb}]*\s"#).unwrap());
