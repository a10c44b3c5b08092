//! Chapter-heading detection for plain-text books.

use regex::Captures;
use serde::{Deserialize, Serialize};

use super::patterns::{DIVISION_RE, ROMAN_LINE_RE, SECTION_RE};

/// Longest line still considered a heading.
const MAX_HEADING_CHARS: usize = 80;

/// Bodies shorter than this (non-whitespace chars) mark a table-of-contents entry.
pub const MIN_CHAPTER_BODY_CHARS: usize = 200;

pub const FRONT_MATTER_TITLE: &str = "Front Matter";
pub const FULL_TEXT_TITLE: &str = "Full Text";

/// A detected chapter of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: usize,
    pub title: String,
    pub body: String,
}

/// Split `text` into chapters by heading lines.
///
/// Text ahead of the first heading becomes a "Front Matter" chapter. Headings
/// with almost no body (table-of-contents lines) are folded into whatever
/// precedes them. Without any heading the whole text is one "Full Text" chapter.
pub fn detect_chapters(text: &str) -> Vec<Chapter> {
    let normalized = text.replace("\r\n", "\n");
    if normalized.trim().is_empty() {
        return Vec::new();
    }
    let lines: Vec<&str> = normalized.split('\n').collect();

    let candidates: Vec<usize> = (0..lines.len())
        .filter(|&i| is_heading_at(&lines, i))
        .collect();

    let mut accepted = Vec::new();
    for (k, &line) in candidates.iter().enumerate() {
        let end = candidates.get(k + 1).copied().unwrap_or(lines.len());
        let body_chars: usize = lines[line + 1..end]
            .iter()
            .map(|l| l.chars().filter(|c| !c.is_whitespace()).count())
            .sum();
        if body_chars >= MIN_CHAPTER_BODY_CHARS {
            accepted.push(line);
        }
    }

    if accepted.is_empty() {
        return vec![Chapter {
            index: 0,
            title: FULL_TEXT_TITLE.to_string(),
            body: normalized.trim().to_string(),
        }];
    }

    let mut chapters = Vec::new();
    let front = lines[..accepted[0]].join("\n");
    if !front.trim().is_empty() {
        chapters.push(Chapter {
            index: 0,
            title: FRONT_MATTER_TITLE.to_string(),
            body: front.trim().to_string(),
        });
    }

    for (k, &line) in accepted.iter().enumerate() {
        let end = accepted.get(k + 1).copied().unwrap_or(lines.len());
        chapters.push(Chapter {
            index: chapters.len(),
            title: lines[line].trim().to_string(),
            body: lines[line + 1..end].join("\n").trim().to_string(),
        });
    }
    chapters
}

fn is_blank_at(lines: &[&str], i: Option<usize>) -> bool {
    match i {
        Some(i) => lines.get(i).is_none_or(|l| l.trim().is_empty()),
        None => true,
    }
}

fn is_heading_at(lines: &[&str], i: usize) -> bool {
    let line = lines[i].trim();
    let len = line.chars().count();
    if len == 0 || len > MAX_HEADING_CHARS {
        return false;
    }
    if !is_blank_at(lines, i.checked_sub(1)) {
        return false;
    }

    if is_roman_line(line) {
        return is_blank_at(lines, Some(i + 1));
    }
    is_division_heading(line) || is_section_heading(line)
}

/// A title may follow the keyword only after punctuation, so prose like
/// "Part two of the journey began at dawn." is not taken for a heading.
fn title_is_set_off(caps: &Captures) -> bool {
    caps.name("title").is_none() || caps.name("punct").is_some()
}

/// `CHAPTER IV. The Storm`, `Book the First`, `Part 2`, `Chapter Twenty-One`.
fn is_division_heading(line: &str) -> bool {
    let Some(caps) = DIVISION_RE.captures(line) else {
        return false;
    };
    let canonical = caps
        .name("roman")
        .is_none_or(|m| roman_value(&m.as_str().to_ascii_uppercase()).is_some());
    canonical && title_is_set_off(&caps)
}

/// `PREFACE`, `Introduction.`, `Epilogue: After the War`.
fn is_section_heading(line: &str) -> bool {
    SECTION_RE
        .captures(line)
        .is_some_and(|caps| title_is_set_off(&caps))
}

fn is_roman_line(line: &str) -> bool {
    ROMAN_LINE_RE
        .captures(line)
        .is_some_and(|caps| roman_value(&caps["roman"]).is_some())
}

/// Parse a canonical uppercase roman numeral.
fn roman_value(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 15 {
        return None;
    }
    let digit = |c: char| match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };
    let values = s.chars().map(digit).collect::<Option<Vec<u32>>>()?;

    let mut total = 0;
    for (i, &v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(&next) if next > v => total -= v as i64,
            _ => total += v as i64,
        }
    }
    if total <= 0 {
        return None;
    }
    let total = total as u32;
    // Reject non-canonical forms such as "IIII" or "VX".
    (to_roman(total) == s).then_some(total)
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, numeral) in TABLE {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(words: usize) -> String {
        vec!["lorem"; words].join(" ")
    }

    #[test]
    fn empty_text_has_no_chapters() {
        assert!(detect_chapters("").is_empty());
        assert!(detect_chapters("\n\n  \n").is_empty());
    }

    #[test]
    fn no_headings_is_full_text() {
        let chapters = detect_chapters("Just some prose.\n\nMore prose.");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, FULL_TEXT_TITLE);
        assert_eq!(chapters[0].body, "Just some prose.\n\nMore prose.");
    }

    #[test]
    fn detects_keyword_headings() {
        let text = format!(
            "CHAPTER I. The Beginning\n\n{}\n\nChapter 2\n\n{}\n\nCHAPTER THREE\n\n{}",
            body(50),
            body(50),
            body(50)
        );
        let chapters = detect_chapters(&text);
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["CHAPTER I. The Beginning", "Chapter 2", "CHAPTER THREE"]);
        assert_eq!(chapters[2].index, 2);
        assert_eq!(chapters[0].body, body(50));
    }

    #[test]
    fn front_matter_kept() {
        let text = format!("A Novel\nby Someone\n\nCHAPTER I\n\n{}", body(50));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, FRONT_MATTER_TITLE);
        assert_eq!(chapters[0].body, "A Novel\nby Someone");
        assert_eq!(chapters[1].title, "CHAPTER I");
        assert_eq!(chapters[1].index, 1);
    }

    #[test]
    fn table_of_contents_folds_into_front_matter() {
        let text = format!(
            "Contents\n\nCHAPTER I\n\nCHAPTER II\n\nCHAPTER I\n\n{}\n\nCHAPTER II\n\n{}",
            body(50),
            body(50)
        );
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, FRONT_MATTER_TITLE);
        assert!(chapters[0].body.contains("CHAPTER II"));
        assert_eq!(chapters[1].title, "CHAPTER I");
        assert_eq!(chapters[2].title, "CHAPTER II");
    }

    #[test]
    fn roman_line_needs_blank_surroundings() {
        let text = format!("I\n\n{}\n\nII\n\n{}", body(50), body(50));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title, "II");

        let squeezed = format!("{}\nIV\n{}", body(50), body(50));
        assert_eq!(detect_chapters(&squeezed)[0].title, FULL_TEXT_TITLE);
    }

    #[test]
    fn section_words_need_punctuation_before_title() {
        assert!(is_section_heading("PREFACE"));
        assert!(is_section_heading("Epilogue: After the War"));
        assert!(!is_section_heading("Introduction to chemistry"));
    }

    #[test]
    fn division_ordinals() {
        assert!(is_division_heading("Book the First"));
        assert!(is_division_heading("STAVE ONE."));
        assert!(is_division_heading("Chapter Twenty-One"));
        assert!(is_division_heading("Part iv"));
        assert!(!is_division_heading("Chapter and verse"));
        assert!(!is_division_heading("Book"));
        assert!(!is_division_heading("Chapter Civil"));
    }

    #[test]
    fn division_title_needs_punctuation() {
        assert!(is_division_heading("CHAPTER IV. The Storm"));
        assert!(is_division_heading("Part 2: The Return"));
        assert!(!is_division_heading("Part two of the journey began at dawn."));
        assert!(!is_division_heading("Book one was lost"));
    }

    #[test]
    fn prose_opening_with_division_word_stays_in_text() {
        let text = format!(
            "{}\n\nPart two of the journey began at dawn.\n\n{}",
            body(60),
            body(60)
        );
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, FULL_TEXT_TITLE);
    }

    #[test]
    fn heading_requires_blank_line_above() {
        let text = format!("{}\nChapter 1\n\n{}", body(50), body(50));
        assert_eq!(detect_chapters(&text)[0].title, FULL_TEXT_TITLE);
    }

    #[test]
    fn roman_values_are_canonical() {
        assert_eq!(roman_value("XIV"), Some(14));
        assert_eq!(roman_value("MCMXC"), Some(1990));
        assert_eq!(roman_value("IIII"), None);
        assert_eq!(roman_value("VX"), None);
        assert_eq!(roman_value("DID"), None);
    }
}
