//! Batching chunks into segments, one TTS call each.

use std::ops::Range;

use anyhow::{Result, bail};

use crate::text::{ChunkDraft, chunk_text};

/// Consecutive chunks of one chapter, joined for a single synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub chapter: usize,
    /// Indices into the chunk slice the segment was built from.
    pub chunk_range: Range<usize>,
    pub text: String,
}

/// Pack `chunks` greedily into segments of at most `max_chars` characters.
///
/// Segments never cross a chapter boundary. A chunk that is itself longer
/// than `max_chars` is re-split with [`chunk_text`] first.
pub fn build_segments(chunks: &[ChunkDraft], max_chars: usize) -> Result<Vec<Segment>> {
    if max_chars == 0 {
        bail!("segment size must be greater than zero");
    }

    let mut segments = Vec::new();
    let mut current: Option<Segment> = None;
    let mut len = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let pieces = if chunk.text.chars().count() > max_chars {
            chunk_text(&chunk.text, max_chars)?
        } else {
            vec![chunk.text.trim().to_string()]
        };

        for piece in pieces {
            if piece.is_empty() {
                continue;
            }
            let piece_len = piece.chars().count();

            if let Some(seg) = current
                .as_mut()
                .filter(|seg| seg.chapter == chunk.chapter && len + 2 + piece_len <= max_chars)
            {
                seg.text.push_str("\n\n");
                seg.text.push_str(&piece);
                seg.chunk_range.end = i + 1;
                len += 2 + piece_len;
                continue;
            }

            if let Some(done) = current.take() {
                segments.push(done);
            }
            current = Some(Segment {
                index: segments.len(),
                chapter: chunk.chapter,
                chunk_range: i..i + 1,
                text: piece,
            });
            len = piece_len;
        }
    }

    if let Some(done) = current {
        segments.push(done);
    }
    Ok(segments)
}
