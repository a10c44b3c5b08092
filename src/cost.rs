//! Up-front cost estimation for modernizing and narrating a book.

use std::fmt;

use crate::consts::{format_number, format_usd};
use crate::narration::segment::Segment;

/// Rough characters-per-token ratio for English prose.
pub const CHARS_PER_TOKEN: usize = 4;

/// System prompt tokens sent with every modernization call.
pub const PROMPT_OVERHEAD_TOKENS: u64 = 150;

/// Narration pace used for duration estimates.
pub const WORDS_PER_MINUTE: f64 = 155.0;

/// Provider prices in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    /// Per million LLM input tokens.
    pub input_per_mtok: f64,
    /// Per million LLM output tokens.
    pub output_per_mtok: f64,
    /// Per million characters sent to TTS.
    pub tts_per_mchar: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
            tts_per_mchar: 15.0,
        }
    }
}

/// Estimated size and price of processing a book.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Estimate {
    pub characters: u64,
    pub words: u64,
    pub chunks: u64,
    pub segments: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub llm_cost: f64,
    pub tts_cost: f64,
}

impl Estimate {
    pub fn total(&self) -> f64 {
        self.llm_cost + self.tts_cost
    }

    /// Narrated length in minutes.
    pub fn estimated_minutes(&self) -> f64 {
        self.words as f64 / WORDS_PER_MINUTE
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  characters  {}", format_number(self.characters))?;
        writeln!(f, "  words       {}", format_number(self.words))?;
        writeln!(f, "  chunks      {}", format_number(self.chunks))?;
        writeln!(f, "  segments    {}", format_number(self.segments))?;
        writeln!(
            f,
            "  tokens      {} in / {} out",
            format_number(self.input_tokens),
            format_number(self.output_tokens)
        )?;
        writeln!(f, "  audio       ~{:.0} min", self.estimated_minutes())?;
        writeln!(f, "  modernize   {}", format_usd(self.llm_cost))?;
        writeln!(f, "  narrate     {}", format_usd(self.tts_cost))?;
        write!(f, "  total       {}", format_usd(self.total()))
    }
}

/// Tokens for `chars` characters, rounded up.
pub fn estimate_tokens(chars: usize) -> u64 {
    chars.div_ceil(CHARS_PER_TOKEN) as u64
}

/// Price the given chunks and the segments they batch into.
pub fn estimate<S: AsRef<str>>(chunks: &[S], segments: &[Segment], pricing: &Pricing) -> Estimate {
    let mut est = Estimate {
        chunks: chunks.len() as u64,
        segments: segments.len() as u64,
        ..Estimate::default()
    };

    for chunk in chunks {
        let text = chunk.as_ref();
        let chars = text.chars().count();
        let tokens = estimate_tokens(chars);
        est.characters += chars as u64;
        est.words += crate::text::word_count(text) as u64;
        est.input_tokens += tokens + PROMPT_OVERHEAD_TOKENS;
        est.output_tokens += tokens;
    }

    let tts_chars: u64 = segments
        .iter()
        .map(|s| s.text.chars().count() as u64)
        .sum();

    est.llm_cost = est.input_tokens as f64 / 1_000_000.0 * pricing.input_per_mtok
        + est.output_tokens as f64 / 1_000_000.0 * pricing.output_per_mtok;
    est.tts_cost = tts_chars as f64 / 1_000_000.0 * pricing.tts_per_mchar;
    est
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str) -> Segment {
        Segment {
            index: 0,
            chapter: 0,
            chunk_range: 0..1,
            text: text.to_string(),
        }
    }

    #[test]
    fn tokens_round_up() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(4), 1);
        assert_eq!(estimate_tokens(5), 2);
    }

    #[test]
    fn empty_book_costs_nothing() {
        let est = estimate::<&str>(&[], &[], &Pricing::default());
        assert_eq!(est, Estimate::default());
        assert_eq!(est.total(), 0.0);
    }

    #[test]
    fn counts_and_prices() {
        let text = "a".repeat(4000);
        let chunks = vec![text.clone()];
        let segments = vec![segment(&text)];
        let pricing = Pricing {
            input_per_mtok: 1_000_000.0,
            output_per_mtok: 2_000_000.0,
            tts_per_mchar: 1_000_000.0,
        };

        let est = estimate(&chunks, &segments, &pricing);
        assert_eq!(est.characters, 4000);
        assert_eq!(est.words, 1);
        assert_eq!(est.input_tokens, 1000 + PROMPT_OVERHEAD_TOKENS);
        assert_eq!(est.output_tokens, 1000);
        assert_eq!(est.llm_cost, 1150.0 + 2000.0);
        assert_eq!(est.tts_cost, 4000.0);
        assert_eq!(est.total(), 7150.0);
    }

    #[test]
    fn minutes_follow_word_count() {
        let est = Estimate {
            words: 310,
            ..Estimate::default()
        };
        assert!((est.estimated_minutes() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn display_lists_total() {
        let est = Estimate {
            llm_cost: 1.5,
            tts_cost: 0.25,
            ..Estimate::default()
        };
        let rendered = est.to_string();
        assert!(rendered.contains("total       $1.75"));
    }
}
