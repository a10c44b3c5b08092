use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use quill::auth::{self, AuthStorage, Provider, mask_key};
use quill::banner::{BannerInfo, print_banner, print_session_summary};
use quill::config::{Config, KNOWN_KEYS, Settings};
use quill::consts::{default_db_path, format_number};
use quill::engine::{Pipeline, PipelineConfig, estimate_text};
use quill::events::{Event, EventBus};
use quill::library::{FeedItem, FeedOrder, Library, NewClip, NewEdition, Visibility};
use quill::modernizer::anthropic::AnthropicModernizer;
use quill::narration::openai::OpenAiSynthesizer;
use quill::spinner::{Spinner, SpinnerLabel};
use quill::text::read_book_file;

#[derive(Parser)]
#[command(name = "quill", version, about = "Modernize, narrate, and share public-domain books.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database path (default: ~/.quill/quill.db)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Anthropic model used for modernization
    #[arg(long, global = true)]
    model: Option<String>,

    /// Modernization calls in flight at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Import a plain-text book
    Import {
        file: PathBuf,
        /// Override the detected title
        #[arg(long)]
        title: Option<String>,
        /// Override the detected author
        #[arg(long)]
        author: Option<String>,
    },
    /// List books in the library
    Books,
    /// Remove a book with its editions and clips
    Remove { book: i64 },
    /// Show the chapters detected in a book
    Chapters { book: i64 },
    /// Estimate the cost of a file or a stored book
    Estimate {
        /// A file path or a book id
        target: String,
    },
    /// Rewrite a book in modern English
    Modernize { book: i64 },
    /// Synthesize narration for a modernized book
    Narrate {
        book: i64,
        #[arg(long)]
        voice: Option<String>,
        /// Output directory (default: ./quill-audio/book-<id>)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Publish an edition of a book
    Publish {
        book: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Repeat for several tags
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, value_enum, default_value_t = VisibilityArg::Public)]
        visibility: VisibilityArg,
        /// Directory holding the narration
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Voice the narration was made with
        #[arg(long)]
        voice: Option<String>,
    },
    /// List a book's editions
    Editions { book: i64 },
    /// Change who can see an edition
    Visibility {
        edition: i64,
        #[arg(value_enum)]
        visibility: VisibilityArg,
    },
    /// Cut a clip from an edition
    Clip {
        edition: i64,
        #[arg(long)]
        quote: String,
        /// Start offset in seconds
        #[arg(long)]
        start: f64,
        /// Length in seconds
        #[arg(long)]
        duration: f64,
    },
    /// List an edition's clips
    Clips { edition: i64 },
    /// Like an edition or clip
    Like {
        #[command(subcommand)]
        target: Target,
    },
    /// Record a listen of an edition or clip
    Listen {
        #[command(subcommand)]
        target: Target,
    },
    /// Browse public editions and clips
    Feed {
        /// Order by likes and listens instead of recency
        #[arg(long)]
        popular: bool,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Look up an edition by share code
    Share { code: String },
    /// Read or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Store an API key for a provider
    Login {
        #[arg(value_enum)]
        provider: ProviderArg,
    },
    /// Remove a stored API key
    Logout {
        #[arg(value_enum)]
        provider: ProviderArg,
    },
}

#[derive(Subcommand)]
enum Target {
    Edition { id: i64 },
    Clip { id: i64 },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show one key, or every known key
    Get { key: Option<String> },
    Set { key: String, value: String },
    Unset { key: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VisibilityArg {
    Public,
    Unlisted,
    Private,
}

impl From<VisibilityArg> for Visibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Public => Visibility::Public,
            VisibilityArg::Unlisted => Visibility::Unlisted,
            VisibilityArg::Private => Visibility::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Anthropic,
    Openai,
}

impl From<ProviderArg> for Provider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Anthropic => Provider::Anthropic,
            ProviderArg::Openai => Provider::OpenAi,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let db = match cli.db.clone() {
        Some(db) => db,
        None => {
            let path = default_db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            path.to_string_lossy().into_owned()
        }
    };
    debug!("using database {db}");

    let config = Config::open(&db)?;
    // These work even when stored settings are broken.
    let command = match cli.command {
        Command::Login { provider } => return handle_login(&db, provider.into()),
        Command::Logout { provider } => return handle_logout(&db, provider.into()),
        Command::Config { action } => return handle_config(&config, action),
        command => command,
    };

    let mut settings = Settings::load(&config)?;
    if let Some(model) = cli.model.clone() {
        settings.model = model;
    }
    if let Some(concurrency) = cli.concurrency {
        settings.concurrency = concurrency;
    }
    settings.validate()?;

    match command {
        Command::Estimate { target } => handle_estimate(&db, &settings, &target),
        Command::Modernize { book } => {
            let events = EventBus::default();
            let pipeline = build_pipeline(&db, &settings, events.clone())?;
            banner(&db, &settings)?;

            if pipeline.library().progress(book)?.total == 0 {
                pipeline.prepare(book)?;
            }
            let spinner = Spinner::start("modernizing");
            let progress = spawn_progress(&events, spinner.label());
            let result = pipeline.modernize(book).await;
            let usage = pipeline.session_usage();
            finish_progress(pipeline, events, progress).await;
            spinner.stop().await;

            let report = result?;
            println!(
                "{} of {} chunks modernized, {} failed",
                report.succeeded, report.attempted, report.failed
            );
            if report.failed > 0 {
                println!("run `quill modernize {book}` again to retry the failed chunks");
            }
            print_session_summary(usage);
            Ok(())
        }
        Command::Narrate { book, voice, out } => {
            let voice = voice.unwrap_or_else(|| settings.voice.clone());
            let out = out.unwrap_or_else(|| PathBuf::from("quill-audio").join(format!("book-{book}")));
            let events = EventBus::default();
            let pipeline = build_pipeline(&db, &settings, events.clone())?;
            banner(&db, &settings)?;

            let spinner = Spinner::start("narrating");
            let progress = spawn_progress(&events, spinner.label());
            let result = pipeline.narrate(book, &voice, &out).await;
            finish_progress(pipeline, events, progress).await;
            spinner.stop().await;

            let report = result?;
            println!(
                "wrote {} segments ({} bytes) to {}",
                report.segments,
                format_number(report.bytes),
                out.display()
            );
            Ok(())
        }
        Command::Publish {
            book,
            title,
            description,
            tags,
            visibility,
            audio,
            voice,
        } => {
            let events = EventBus::default();
            let pipeline = build_pipeline(&db, &settings, events.clone())?;
            let mut new = NewEdition::new(book, title)
                .with_description(description)
                .with_tags(tags)
                .with_visibility(visibility.into());
            if let Some(dir) = audio {
                new.audio_dir = Some(dir.to_string_lossy().into_owned());
                new.voice = Some(voice.unwrap_or_else(|| settings.voice.clone()));
            }
            let edition = pipeline.publish(&new)?;
            println!("published edition {} ({})", edition.id, edition.visibility);
            println!("share code: {}", edition.share_code);
            Ok(())
        }
        command => {
            let library = Library::open(&db)?;
            handle_library(&library, &settings, command)
        }
    }
}

/// Commands that only touch the library.
fn handle_library(library: &Library, settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Import {
            file,
            title,
            author,
        } => {
            let mut imported = read_book_file(&file)?;
            if let Some(title) = title {
                imported.title = title;
            }
            if let Some(author) = author {
                imported.author = author;
            }
            let book = library.add_book(&imported)?;
            let drafts =
                quill::text::chunk_chapters(&book.chapters(), settings.chunk_size)?;
            library.replace_chunks(book.id, &drafts)?;
            println!(
                "imported book {}: {} by {} ({} chapters, {} chunks)",
                book.id,
                book.title,
                book.author,
                book.chapters().len(),
                drafts.len()
            );
        }
        Command::Books => {
            let books = library.books()?;
            if books.is_empty() {
                println!("no books yet. Import one with `quill import <file>`.");
            }
            for book in books {
                let progress = library.progress(book.id)?;
                println!(
                    "{:>4}  {} by {}  [{}/{} modernized]",
                    book.id, book.title, book.author, progress.modernized, progress.total
                );
            }
        }
        Command::Remove { book } => {
            library.remove_book(book)?;
            println!("removed book {book}");
        }
        Command::Chapters { book } => {
            let book = library.book(book)?;
            for chapter in book.chapters() {
                println!(
                    "{:>4}  {}  ({} words)",
                    chapter.index,
                    chapter.title,
                    format_number(quill::text::word_count(&chapter.body) as u64)
                );
            }
        }
        Command::Editions { book } => {
            for edition in library.editions(book)? {
                println!(
                    "{:>4}  {}  [{}]  code {}  likes {}  listens {}",
                    edition.id,
                    edition.title,
                    edition.visibility,
                    edition.share_code,
                    edition.likes,
                    edition.listens
                );
            }
        }
        Command::Visibility {
            edition,
            visibility,
        } => {
            let edition = library.set_visibility(edition, visibility.into())?;
            println!("edition {} is now {}", edition.id, edition.visibility);
        }
        Command::Clip {
            edition,
            quote,
            start,
            duration,
        } => {
            let clip = library.create_clip(&NewClip {
                edition_id: edition,
                quote,
                start_secs: start,
                duration_secs: duration,
            })?;
            println!("created clip {}", clip.id);
        }
        Command::Clips { edition } => {
            for clip in library.clips(edition)? {
                print_item(&FeedItem::Clip(clip));
            }
        }
        Command::Like { target } => match target {
            Target::Edition { id } => {
                let edition = library.like_edition(id)?;
                println!("edition {id} now has {} likes", edition.likes);
            }
            Target::Clip { id } => {
                let clip = library.like_clip(id)?;
                println!("clip {id} now has {} likes", clip.likes);
            }
        },
        Command::Listen { target } => match target {
            Target::Edition { id } => {
                let edition = library.record_listen(id)?;
                match &edition.audio_dir {
                    Some(dir) => println!("audio: {dir}"),
                    None => println!("edition {id} has no narration yet"),
                }
            }
            Target::Clip { id } => {
                let clip = library.record_clip_listen(id)?;
                println!("\"{}\" ({}s from {:.1}s)", clip.quote, clip.duration_secs, clip.start_secs);
            }
        },
        Command::Feed { popular, limit } => {
            let order = if popular {
                FeedOrder::Popular
            } else {
                FeedOrder::Recent
            };
            let items = library.feed(order, limit)?;
            if items.is_empty() {
                println!("the feed is empty.");
            }
            for item in &items {
                print_item(item);
            }
        }
        Command::Share { code } => {
            let edition = library.edition_by_share_code(&code)?;
            if edition.visibility == Visibility::Private {
                bail!("edition {} is private", code.trim());
            }
            print_item(&FeedItem::Edition(edition));
        }
        _ => unreachable!("dispatched in main"),
    }
    Ok(())
}

fn print_item(item: &FeedItem) {
    match item {
        FeedItem::Edition(e) => {
            let tags = e
                .tags
                .iter()
                .map(|t| format!("#{t}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "[edition {}] {} by {}  likes {}  listens {}  code {}  {}",
                e.id, e.title, e.author, e.likes, e.listens, e.share_code, tags
            );
            if !e.description.is_empty() {
                println!("    {}", e.description);
            }
        }
        FeedItem::Clip(c) => println!(
            "[clip {}] \"{}\"  edition {} at {:.1}s for {:.1}s  likes {}  listens {}",
            c.id, c.quote, c.edition_id, c.start_secs, c.duration_secs, c.likes, c.listens
        ),
    }
}

fn handle_estimate(db: &str, settings: &Settings, target: &str) -> Result<()> {
    let path = Path::new(target);
    let estimate = if path.is_file() {
        let imported = read_book_file(path)?;
        println!("{} by {}", imported.title, imported.author);
        estimate_text(
            &imported.text,
            settings.chunk_size,
            settings.segment_size,
            &settings.pricing,
        )?
    } else {
        let id: i64 = target
            .parse()
            .with_context(|| format!("`{target}` is neither a file nor a book id"))?;
        let book = Library::open(db)?.book(id)?;
        println!("{} by {}", book.title, book.author);
        estimate_text(
            &book.text,
            settings.chunk_size,
            settings.segment_size,
            &settings.pricing,
        )?
    };
    println!("{estimate}");
    Ok(())
}

fn build_pipeline(db: &str, settings: &Settings, events: EventBus) -> Result<Pipeline> {
    let modernizer = AnthropicModernizer::new(Some(settings.model.clone()), AuthStorage::open(db)?);
    let synthesizer =
        OpenAiSynthesizer::new(Some(settings.tts_model.clone()), AuthStorage::open(db)?);
    Ok(Pipeline::new(
        Arc::new(modernizer),
        Arc::new(synthesizer),
        Arc::new(Library::open(db)?),
        PipelineConfig::from(settings),
        events,
    ))
}

fn banner(db: &str, settings: &Settings) -> Result<()> {
    let auth = AuthStorage::open(db)?;
    let anthropic_auth = auth.status(Provider::Anthropic)?;
    let openai_auth = auth.status(Provider::OpenAi)?;
    print_banner(&BannerInfo {
        model: &settings.model,
        anthropic_auth: &anthropic_auth,
        tts_model: &settings.tts_model,
        voice: &settings.voice,
        openai_auth: &openai_auth,
        concurrency: settings.concurrency,
        db,
    });
    Ok(())
}

/// Show pipeline events on the spinner line, with failures on their own lines.
fn spawn_progress(events: &EventBus, label: SpinnerLabel) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let mut done = 0;
        let mut failed = 0;
        loop {
            match rx.recv().await {
                Ok(Event::ChunkModernized { total, .. }) => {
                    done += 1;
                    label.set(format!("modernizing {done}/{total} ({failed} failed)"));
                }
                Ok(Event::ChunkFailed { position, error }) => {
                    failed += 1;
                    // \x1b[2K clears the spinner line
                    eprintln!("\x1b[2K\r  ✗ chunk {}: {error}", position + 1);
                }
                Ok(Event::SegmentSynthesized { index, total }) => {
                    label.set(format!("narrating {}/{total}", index + 1));
                }
                Ok(Event::EditionPublished { id, share_code }) => {
                    debug!("edition {id} published as {share_code}");
                }
                Err(RecvError::Lagged(n)) => debug!("progress display skipped {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Drop every sender so the progress task drains and exits.
async fn finish_progress(pipeline: Pipeline, events: EventBus, progress: JoinHandle<()>) {
    drop(pipeline);
    drop(events);
    let _ = progress.await;
}

fn handle_config(config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key: Some(key) } => match config.get(&key)? {
            Some(value) => println!("{value}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Get { key: None } => {
            for key in KNOWN_KEYS {
                let value = config.get(key)?.unwrap_or_else(|| "(default)".to_string());
                println!("{key:<20} {value}");
            }
        }
        ConfigAction::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                bail!("unknown config key `{key}` (known: {})", KNOWN_KEYS.join(", "));
            }
            let previous = config.get(&key)?;
            config.set(&key, &value)?;
            if let Err(e) = Settings::load(config) {
                match previous {
                    Some(old) => config.set(&key, &old)?,
                    None => config.remove(&key)?,
                }
                return Err(e);
            }
            println!("{key} = {value}");
        }
        ConfigAction::Unset { key } => {
            config.remove(&key)?;
            println!("{key} reset to default");
        }
    }
    Ok(())
}

fn handle_login(db: &str, provider: Provider) -> Result<()> {
    print!("Paste your {provider} API key: ");
    io::stdout().flush()?;
    let mut key = String::new();
    io::stdin().read_line(&mut key)?;

    auth::login(db, provider, &key)?;
    println!("✓ Saved {provider} key {}", mask_key(key.trim()));
    Ok(())
}

fn handle_logout(db: &str, provider: Provider) -> Result<()> {
    auth::logout(db, provider)?;
    println!("✓ Logged out from {provider}.");
    Ok(())
}
