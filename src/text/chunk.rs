//! Splits book text into bounded chunks on paragraph and sentence boundaries.
//!
//! Chunks are the unit of modernization and cost estimation. The splitter is
//! a single greedy pass: paragraphs are packed while they fit, oversized
//! paragraphs fall back to sentences, and oversized sentences fall back to
//! the last whitespace inside the limit.

use anyhow::{Result, bail};

use super::chapters::Chapter;
use super::patterns::SENTENCE_END_RE;

/// A chunk produced from a chapter, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    /// Index of the chapter this chunk was cut from.
    pub chapter: usize,
    /// Position of the chunk within the whole book.
    pub position: usize,
    pub text: String,
}

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<String>> {
    if max_chars == 0 {
        bail!("chunk size must be greater than zero");
    }

    let mut packer = Packer::new(max_chars);
    for paragraph in paragraphs(text) {
        if paragraph.chars().count() <= max_chars {
            packer.push(&paragraph, "\n\n");
            continue;
        }

        // Sentences of an oversized paragraph never join the previous paragraph.
        packer.flush();
        for sentence in sentences(&paragraph) {
            for piece in hard_split(sentence, max_chars) {
                packer.push(piece, " ");
            }
        }
    }
    Ok(packer.finish())
}

/// Chunk every chapter on its own so no chunk straddles a chapter break.
pub fn chunk_chapters(chapters: &[Chapter], max_chars: usize) -> Result<Vec<ChunkDraft>> {
    let mut drafts = Vec::new();
    for chapter in chapters {
        for text in chunk_text(&chapter.body, max_chars)? {
            drafts.push(ChunkDraft {
                chapter: chapter.index,
                position: drafts.len(),
                text,
            });
        }
    }
    Ok(drafts)
}

/// Greedy accumulator of pieces into chunks.
struct Packer {
    max: usize,
    done: Vec<String>,
    current: String,
    len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            done: Vec::new(),
            current: String::new(),
            len: 0,
        }
    }

    /// Append `piece`, starting a new chunk first if it would not fit.
    /// `piece` must itself fit in `max`.
    fn push(&mut self, piece: &str, sep: &str) {
        let piece_len = piece.chars().count();
        let sep_len = sep.chars().count();
        if self.len > 0 && self.len + sep_len + piece_len > self.max {
            self.flush();
        }
        if self.len > 0 {
            self.current.push_str(sep);
            self.len += sep_len;
        }
        self.current.push_str(piece);
        self.len += piece_len;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.done.push(std::mem::take(&mut self.current));
        }
        self.len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.done
    }
}

/// Blank-line separated paragraphs with inner whitespace collapsed.
fn paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut out = Vec::new();
    let mut words: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        if line.trim().is_empty() {
            if !words.is_empty() {
                out.push(words.join(" "));
                words.clear();
            }
            continue;
        }
        words.extend(line.split_whitespace());
    }
    if !words.is_empty() {
        out.push(words.join(" "));
    }
    out
}

/// Split a paragraph after `.`, `!` or `?` (plus trailing closers) followed by whitespace.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for end in SENTENCE_END_RE.find_iter(paragraph) {
        let sentence = paragraph[start..end.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = end.end();
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Cut `sentence` into pieces of at most `max` chars, preferring whitespace.
fn hard_split(sentence: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = sentence.trim();

    while rest.chars().count() > max {
        // Byte offset just past the first `max` chars.
        let limit = rest
            .char_indices()
            .nth(max)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..limit];

        let cut = if rest[limit..].starts_with(char::is_whitespace) {
            limit
        } else {
            match window.rfind(char::is_whitespace) {
                Some(ws) if ws > 0 => ws,
                _ => limit,
            }
        };
        let piece = rest[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(chunk_text("hello", 0).is_err());
    }

    #[test]
    fn empty_input_gives_no_chunks() {
        assert!(chunk_text("", 100).unwrap().is_empty());
        assert!(chunk_text("  \n\n \t\n", 100).unwrap().is_empty());
    }

    #[test]
    fn small_paragraphs_pack_together() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird.";
        let chunks = chunk_text(text, 100).unwrap();
        assert_eq!(
            chunks,
            vec!["First paragraph.\n\nSecond paragraph.\n\nThird.".to_string()]
        );
    }

    #[test]
    fn paragraphs_break_when_full() {
        let text = "aaaa aaaa\n\nbbbb bbbb\n\ncccc cccc";
        let chunks = chunk_text(text, 20).unwrap();
        assert_eq!(chunks, vec!["aaaa aaaa\n\nbbbb bbbb", "cccc cccc"]);
    }

    #[test]
    fn inner_whitespace_collapses() {
        let text = "It was\n   the best\tof times,\r\nit was the worst.";
        let chunks = chunk_text(text, 200).unwrap();
        assert_eq!(chunks, vec!["It was the best of times, it was the worst."]);
    }

    #[test]
    fn long_paragraph_splits_on_sentences() {
        let text = "One two three. Four five six! Seven eight nine? Ten.";
        let chunks = chunk_text(text, 30).unwrap();
        assert_eq!(
            chunks,
            vec!["One two three. Four five six!", "Seven eight nine? Ten."]
        );
    }

    #[test]
    fn closing_quotes_stay_with_sentence() {
        let text = "\u{201c}Go.\u{201d} She went. \"Why?\" he asked, loudly and at length.";
        let chunks = chunk_text(text, 20).unwrap();
        assert_eq!(chunks[0], "\u{201c}Go.\u{201d} She went.");
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn overlong_sentence_splits_on_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = chunk_text(text, 12).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert_eq!(words(&chunks.join(" ")), words(text));
        assert_eq!(chunks[0], "alpha beta");
    }

    #[test]
    fn giant_word_is_split_at_limit() {
        let text = "x".repeat(25);
        let chunks = chunk_text(&text, 10).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn limits_count_chars_not_bytes() {
        let text = "\u{e9}t\u{e9} \u{e9}t\u{e9} \u{e9}t\u{e9}";
        let chunks = chunk_text(text, 7).unwrap();
        assert_eq!(chunks, vec!["\u{e9}t\u{e9} \u{e9}t\u{e9}", "\u{e9}t\u{e9}"]);
    }

    #[test]
    fn words_preserved_in_order() {
        let text = "Call me Ishmael. Some years ago, never mind how long precisely, \
                    having little or no money in my purse.\n\nThere now is your insular \
                    city of the Manhattoes, belted round by wharves as Indian isles by \
                    coral reefs. Commerce surrounds it with her surf.";
        for max in [15, 40, 80, 500] {
            let chunks = chunk_text(text, max).unwrap();
            assert!(chunks.iter().all(|c| !c.is_empty()));
            assert!(chunks.iter().all(|c| c.chars().count() <= max));
            assert_eq!(words(&chunks.join(" ")), words(text), "max={max}");
        }
    }

    #[test]
    fn tail_of_long_paragraph_can_share_with_next() {
        let text = "Aaa aaa. Bbb bbb.\n\nC.";
        let chunks = chunk_text(text, 12).unwrap();
        assert_eq!(chunks, vec!["Aaa aaa.", "Bbb bbb.\n\nC."]);
    }

    #[test]
    fn chapters_chunk_independently() {
        let chapters = vec![
            Chapter {
                index: 0,
                title: "One".to_string(),
                body: "short".to_string(),
            },
            Chapter {
                index: 1,
                title: "Two".to_string(),
                body: "also short".to_string(),
            },
        ];
        let drafts = chunk_chapters(&chapters, 100).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].chapter, 0);
        assert_eq!(drafts[1].chapter, 1);
        assert_eq!(drafts[1].position, 1);
        assert_eq!(drafts[1].text, "also short");
    }

    #[test]
    fn sentences_ignore_inner_dots() {
        assert_eq!(sentences("Mr.Smith left. Then..."), vec!["Mr.Smith left.", "Then..."]);
    }

    #[test]
    fn sentences_keep_closing_quotes() {
        assert_eq!(
            sentences("\"Go!\" he said. \u{201c}Fine.\u{201d} So it was."),
            vec!["\"Go!\"", "he said.", "\u{201c}Fine.\u{201d}", "So it was."]
        );
    }
}
