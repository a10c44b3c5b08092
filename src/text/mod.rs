//! Plain-text processing: import cleanup, chapter detection, and chunking.

pub mod chapters;
pub mod chunk;
pub mod import;
mod patterns;

pub use chapters::{Chapter, detect_chapters};
pub use chunk::{ChunkDraft, chunk_chapters, chunk_text};
pub use import::{ImportedText, import_text, read_book_file};

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(word_count("  the  quick\n\nbrown\tfox "), 4);
        assert_eq!(word_count(""), 0);
    }
}
