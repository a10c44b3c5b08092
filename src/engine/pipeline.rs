use anyhow::{Context, Result, anyhow, bail};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Settings;
use crate::consts::{
    DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_SEGMENT_CHARS,
};
use crate::cost::{self, Estimate, Pricing};
use crate::events::{Event, EventBus};
use crate::library::{ChunkStatus, Edition, Library, NewEdition, StoredChunk};
use crate::modernizer::{ModernizeRequest, Modernizer, TokenUsage};
use crate::narration::Synthesizer;
use crate::narration::segment::build_segments;
use crate::text::{ChunkDraft, chunk_chapters, detect_chapters};

/// Characters of the preceding chunk handed to the modernizer for continuity.
const CONTEXT_TAIL_CHARS: usize = 400;

pub struct PipelineConfig {
    pub chunk_size: usize,
    pub segment_size: usize,
    pub concurrency: usize,
    pub chunk_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_CHARS,
            segment_size: DEFAULT_SEGMENT_CHARS,
            concurrency: DEFAULT_CONCURRENCY,
            chunk_timeout: Duration::from_secs(DEFAULT_CHUNK_TIMEOUT_SECS),
        }
    }
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            segment_size: settings.segment_size,
            concurrency: settings.concurrency,
            chunk_timeout: settings.chunk_timeout,
        }
    }
}

/// Outcome of one modernization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModernizeReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub usage: TokenUsage,
}

/// Outcome of a narration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrationReport {
    pub segments: usize,
    pub bytes: u64,
    pub files: Vec<PathBuf>,
}

/// Chunk a text and price it without calling any provider.
pub fn estimate_text(
    text: &str,
    chunk_size: usize,
    segment_size: usize,
    pricing: &Pricing,
) -> Result<Estimate> {
    let drafts = chunk_chapters(&detect_chapters(text), chunk_size)?;
    let segments = build_segments(&drafts, segment_size)?;
    let texts: Vec<&str> = drafts.iter().map(|d| d.text.as_str()).collect();
    Ok(cost::estimate(&texts, &segments, pricing))
}

/// Takes a book from stored text to modernized chunks to audio files.
pub struct Pipeline {
    modernizer: Arc<dyn Modernizer>,
    synthesizer: Arc<dyn Synthesizer>,
    library: Arc<Library>,
    config: PipelineConfig,
    events: EventBus,
    session_usage: Mutex<TokenUsage>,
}

impl Pipeline {
    pub fn new(
        modernizer: Arc<dyn Modernizer>,
        synthesizer: Arc<dyn Synthesizer>,
        library: Arc<Library>,
        config: PipelineConfig,
        events: EventBus,
    ) -> Self {
        Self {
            modernizer,
            synthesizer,
            library,
            config,
            events,
            session_usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Token usage accumulated across every run on this pipeline.
    pub fn session_usage(&self) -> TokenUsage {
        *self.session_usage.lock().unwrap()
    }

    /// Chunk a book into the store, replacing any chunks it already has.
    /// Returns the number of chunks.
    pub fn prepare(&self, book_id: i64) -> Result<usize> {
        let book = self.library.book(book_id)?;
        let drafts = chunk_chapters(&book.chapters(), self.config.chunk_size)?;
        self.library.replace_chunks(book_id, &drafts)?;
        info!("prepared book {book_id} into {} chunks", drafts.len());
        Ok(drafts.len())
    }

    /// Run every unfinished chunk through the modernizer.
    ///
    /// Failures and timeouts mark the chunk `failed` and the run carries on,
    /// so calling this again retries only what is left.
    pub async fn modernize(&self, book_id: i64) -> Result<ModernizeReport> {
        let chunks = self.library.chunks(book_id)?;
        if chunks.is_empty() {
            bail!("book {book_id} has no chunks; prepare it first");
        }
        let total = chunks.len();

        let jobs: Vec<(usize, ModernizeRequest)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.status != ChunkStatus::Modernized)
            .map(|(i, chunk)| (chunk.position, request_for(&chunks, i)))
            .collect();

        let mut report = ModernizeReport {
            attempted: jobs.len(),
            ..ModernizeReport::default()
        };
        if jobs.is_empty() {
            debug!("book {book_id} is already fully modernized");
            return Ok(report);
        }

        info!(
            "modernizing {} chunks of book {book_id} with {}",
            jobs.len(),
            self.modernizer.model()
        );
        let timeout = self.config.chunk_timeout;
        let modernizer = &self.modernizer;
        let mut results = stream::iter(jobs)
            .map(move |(position, request)| async move {
                let call = modernizer.modernize(&request);
                let outcome = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("timed out after {timeout:?}")),
                };
                (position, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((position, outcome)) = results.next().await {
            let outcome = outcome.and_then(|m| {
                if m.text.trim().is_empty() {
                    bail!("modernizer returned empty text");
                }
                Ok(m)
            });

            match outcome {
                Ok(modernized) => {
                    self.library
                        .set_chunk_modernized(book_id, position, modernized.text.trim())?;
                    if let Some(usage) = modernized.usage {
                        report.usage.add(usage);
                    }
                    report.succeeded += 1;
                    self.events.emit(Event::ChunkModernized { position, total });
                }
                Err(e) => {
                    warn!("chunk {position} of book {book_id} failed: {e:#}");
                    self.library.set_chunk_failed(book_id, position)?;
                    report.failed += 1;
                    self.events.emit(Event::ChunkFailed {
                        position,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        self.session_usage.lock().unwrap().add(report.usage);
        info!(
            "modernized book {book_id}: {} ok, {} failed",
            report.succeeded, report.failed
        );
        Ok(report)
    }

    /// Synthesize the modernized book into numbered audio files in `out_dir`.
    pub async fn narrate(&self, book_id: i64, voice: &str, out_dir: &Path) -> Result<NarrationReport> {
        let progress = self.library.progress(book_id)?;
        if progress.total == 0 {
            bail!("book {book_id} has no chunks; prepare and modernize it first");
        }
        if !progress.is_complete() {
            bail!(
                "{} of {} chunks of book {book_id} are not modernized yet",
                progress.total - progress.modernized,
                progress.total
            );
        }

        let drafts: Vec<ChunkDraft> = self
            .library
            .chunks(book_id)?
            .into_iter()
            .map(|chunk| ChunkDraft {
                chapter: chunk.chapter,
                position: chunk.position,
                text: chunk.modernized.unwrap_or(chunk.original),
            })
            .collect();
        let segments = build_segments(&drafts, self.config.segment_size)?;

        tokio::fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let total = segments.len();
        let mut report = NarrationReport::default();
        for segment in &segments {
            let audio = self
                .synthesizer
                .synthesize(&segment.text, voice)
                .await
                .with_context(|| format!("segment {} of {total} failed", segment.index + 1))?;

            let path = out_dir.join(format!(
                "segment-{:04}.{}",
                segment.index + 1,
                audio.format.extension()
            ));
            tokio::fs::write(&path, &audio.bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            debug!("wrote {} ({} bytes)", path.display(), audio.bytes.len());

            report.segments += 1;
            report.bytes += audio.bytes.len() as u64;
            report.files.push(path);
            self.events.emit(Event::SegmentSynthesized {
                index: segment.index,
                total,
            });
        }
        Ok(report)
    }

    /// Price a stored book from its original text.
    pub fn estimate(&self, book_id: i64, pricing: &Pricing) -> Result<Estimate> {
        let book = self.library.book(book_id)?;
        estimate_text(
            &book.text,
            self.config.chunk_size,
            self.config.segment_size,
            pricing,
        )
    }

    /// Publish an edition and announce it.
    pub fn publish(&self, new: &NewEdition) -> Result<Edition> {
        let edition = self.library.publish_edition(new)?;
        self.events.emit(Event::EditionPublished {
            id: edition.id,
            share_code: edition.share_code.clone(),
        });
        Ok(edition)
    }
}

/// Build the request for `chunks[i]`, carrying the tail of the previous chunk
/// when both sit in the same chapter.
fn request_for(chunks: &[StoredChunk], i: usize) -> ModernizeRequest {
    let chunk = &chunks[i];
    let request = ModernizeRequest::new(chunk.original.as_str());
    match i.checked_sub(1).map(|p| &chunks[p]) {
        Some(prev) if prev.chapter == chunk.chapter => {
            request.with_previous(tail(&prev.original, CONTEXT_TAIL_CHARS))
        }
        _ => request,
    }
}

/// Last `max` characters of `text`, starting at a word boundary when possible.
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let rest = &text[start..];
    if text[..start].ends_with(char::is_whitespace) {
        return rest.trim_start();
    }
    match rest.find(char::is_whitespace) {
        Some(ws) => rest[ws..].trim_start(),
        None => rest,
    }
}
