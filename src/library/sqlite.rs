use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use log::{debug, info};
use rand::RngExt;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::sync::Mutex;

use super::{
    Book, ChunkStatus, Clip, Edition, FeedItem, FeedOrder, LibraryError, LibraryResult, NewClip,
    NewEdition, Progress, StoredChunk, Visibility, normalize_tags, validate_clip,
};
use crate::text::{ChunkDraft, ImportedText};

/// Attempts at drawing an unused share code before giving up.
const SHARE_CODE_ATTEMPTS: usize = 5;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS ids (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS books (
        id           INTEGER PRIMARY KEY,
        title        TEXT NOT NULL,
        author       TEXT NOT NULL,
        content_hash TEXT NOT NULL UNIQUE,
        text         TEXT NOT NULL,
        created_at   TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS chunks (
        book_id    INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        position   INTEGER NOT NULL,
        chapter    INTEGER NOT NULL,
        original   TEXT NOT NULL,
        modernized TEXT,
        status     TEXT NOT NULL DEFAULT 'pending',
        PRIMARY KEY (book_id, position)
    );
    CREATE TABLE IF NOT EXISTS editions (
        id          INTEGER PRIMARY KEY,
        book_id     INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        author      TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        tags        TEXT NOT NULL DEFAULT '[]',
        visibility  TEXT NOT NULL,
        share_code  TEXT NOT NULL UNIQUE,
        voice       TEXT,
        audio_dir   TEXT,
        listens     INTEGER NOT NULL DEFAULT 0,
        likes       INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS clips (
        id            INTEGER PRIMARY KEY,
        edition_id    INTEGER NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
        quote         TEXT NOT NULL,
        start_secs    REAL NOT NULL,
        duration_secs REAL NOT NULL,
        listens       INTEGER NOT NULL DEFAULT 0,
        likes         INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL DEFAULT (datetime('now'))
    );
";

const BOOK_COLUMNS: &str = "id, title, author, content_hash, text, created_at";
const EDITION_COLUMNS: &str = "id, book_id, title, author, description, tags, visibility, \
     share_code, voice, audio_dir, listens, likes, created_at";
const CLIP_COLUMNS: &str =
    "id, edition_id, quote, start_secs, duration_secs, listens, likes, created_at";

/// SQLite-backed library of books, editions, and clips.
pub struct Library {
    conn: Mutex<Connection>,
}

impl Library {
    /// Open or create the library tables. Use `":memory:"` for tests.
    pub fn open(path: &str) -> LibraryResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> LibraryResult<Self> {
        Self::open(":memory:")
    }

    // --- Books ---

    /// Add an imported book. The same text may only be added once.
    pub fn add_book(&self, imported: &ImportedText) -> LibraryResult<Book> {
        if imported.text.trim().is_empty() {
            return Err(LibraryError::Invalid("book has no text".to_string()));
        }
        let title = imported.title.trim();
        if title.is_empty() {
            return Err(LibraryError::Invalid("book title is empty".to_string()));
        }
        let hash = imported.content_hash();

        let conn = self.conn.lock().unwrap();
        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, title FROM books WHERE content_hash = ?1",
                [&hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((id, existing_title)) = existing {
            return Err(LibraryError::Duplicate(format!(
                "this text is already in the library as book {id} ({existing_title})"
            )));
        }

        let id = next_id(&conn, "book")?;
        conn.execute(
            "INSERT INTO books (id, title, author, content_hash, text) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, title, imported.author.trim(), hash, imported.text],
        )?;
        info!("added book {id}: {title}");
        query_book(&conn, id)
    }

    pub fn book(&self, id: i64) -> LibraryResult<Book> {
        let conn = self.conn.lock().unwrap();
        query_book(&conn, id)
    }

    pub fn books(&self) -> LibraryResult<Vec<Book>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id ASC"))?;
        let books = stmt
            .query_map([], book_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    /// Remove a book with its chunks, editions, and clips.
    pub fn remove_book(&self, id: i64) -> LibraryResult<()> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM books WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(LibraryError::not_found("book", id));
        }
        Ok(())
    }

    // --- Chunks ---

    /// Replace a book's chunks with fresh, pending ones.
    pub fn replace_chunks(&self, book_id: i64, drafts: &[ChunkDraft]) -> LibraryResult<()> {
        let mut conn = self.conn.lock().unwrap();
        ensure_exists(&conn, "books", "book", book_id)?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE book_id = ?1", [book_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (book_id, position, chapter, original) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for draft in drafts {
                stmt.execute(params![
                    book_id,
                    draft.position as i64,
                    draft.chapter as i64,
                    draft.text
                ])?;
            }
        }
        tx.commit()?;
        debug!("stored {} chunks for book {book_id}", drafts.len());
        Ok(())
    }

    pub fn chunks(&self, book_id: i64) -> LibraryResult<Vec<StoredChunk>> {
        let conn = self.conn.lock().unwrap();
        ensure_exists(&conn, "books", "book", book_id)?;
        let mut stmt = conn.prepare(
            "SELECT book_id, position, chapter, original, modernized, status
             FROM chunks WHERE book_id = ?1 ORDER BY position ASC",
        )?;
        let chunks = stmt
            .query_map([book_id], chunk_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    pub fn set_chunk_modernized(&self, book_id: i64, position: usize, text: &str) -> LibraryResult<()> {
        self.update_chunk(book_id, position, Some(text), ChunkStatus::Modernized)
    }

    /// Mark a chunk failed. Any earlier modernized text is discarded.
    pub fn set_chunk_failed(&self, book_id: i64, position: usize) -> LibraryResult<()> {
        self.update_chunk(book_id, position, None, ChunkStatus::Failed)
    }

    fn update_chunk(
        &self,
        book_id: i64,
        position: usize,
        text: Option<&str>,
        status: ChunkStatus,
    ) -> LibraryResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE chunks SET modernized = ?1, status = ?2 WHERE book_id = ?3 AND position = ?4",
            params![text, status.as_str(), book_id, position as i64],
        )?;
        if updated == 0 {
            return Err(LibraryError::not_found("chunk", format!("{book_id}/{position}")));
        }
        Ok(())
    }

    pub fn progress(&self, book_id: i64) -> LibraryResult<Progress> {
        let conn = self.conn.lock().unwrap();
        ensure_exists(&conn, "books", "book", book_id)?;
        let (total, modernized, failed): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'modernized'), 0),
                    COALESCE(SUM(status = 'failed'), 0)
             FROM chunks WHERE book_id = ?1",
            [book_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(Progress {
            total: total as usize,
            modernized: modernized as usize,
            failed: failed as usize,
        })
    }

    // --- Editions ---

    /// Publish an edition of a book under a fresh share code.
    pub fn publish_edition(&self, new: &NewEdition) -> LibraryResult<Edition> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(LibraryError::Invalid("edition title is empty".to_string()));
        }
        let tags = serde_json::to_string(&normalize_tags(&new.tags))
            .map_err(|e| LibraryError::Invalid(e.to_string()))?;

        let conn = self.conn.lock().unwrap();
        let book = query_book(&conn, new.book_id)?;

        for attempt in 1..=SHARE_CODE_ATTEMPTS {
            let code = share_code();
            let id = next_id(&conn, "edition")?;
            let inserted = conn.execute(
                "INSERT INTO editions
                    (id, book_id, title, author, description, tags, visibility, share_code, voice, audio_dir)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    book.id,
                    title,
                    book.author,
                    new.description.trim(),
                    tags,
                    new.visibility.as_str(),
                    code,
                    new.voice,
                    new.audio_dir
                ],
            );
            match inserted {
                Ok(_) => {
                    info!("published edition {id} of book {} as {code}", book.id);
                    return query_edition(&conn, id);
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    debug!("share code collision on attempt {attempt}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LibraryError::Duplicate(
            "could not allocate a unique share code".to_string(),
        ))
    }

    pub fn edition(&self, id: i64) -> LibraryResult<Edition> {
        let conn = self.conn.lock().unwrap();
        query_edition(&conn, id)
    }

    pub fn edition_by_share_code(&self, code: &str) -> LibraryResult<Edition> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {EDITION_COLUMNS} FROM editions WHERE share_code = ?1"),
            [code.trim()],
            edition_from_row,
        )
        .optional()?
        .ok_or_else(|| LibraryError::not_found("edition", code))
    }

    pub fn editions(&self, book_id: i64) -> LibraryResult<Vec<Edition>> {
        let conn = self.conn.lock().unwrap();
        ensure_exists(&conn, "books", "book", book_id)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDITION_COLUMNS} FROM editions WHERE book_id = ?1 ORDER BY id ASC"
        ))?;
        let editions = stmt
            .query_map([book_id], edition_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(editions)
    }

    pub fn set_visibility(&self, id: i64, visibility: Visibility) -> LibraryResult<Edition> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE editions SET visibility = ?1 WHERE id = ?2",
            params![visibility.as_str(), id],
        )?;
        if updated == 0 {
            return Err(LibraryError::not_found("edition", id));
        }
        query_edition(&conn, id)
    }

    pub fn record_listen(&self, id: i64) -> LibraryResult<Edition> {
        let conn = self.conn.lock().unwrap();
        bump(&conn, "editions", "edition", "listens", id)?;
        query_edition(&conn, id)
    }

    pub fn like_edition(&self, id: i64) -> LibraryResult<Edition> {
        let conn = self.conn.lock().unwrap();
        bump(&conn, "editions", "edition", "likes", id)?;
        query_edition(&conn, id)
    }

    // --- Clips ---

    pub fn create_clip(&self, new: &NewClip) -> LibraryResult<Clip> {
        let quote = validate_clip(new)?;
        let conn = self.conn.lock().unwrap();
        ensure_exists(&conn, "editions", "edition", new.edition_id)?;

        let id = next_id(&conn, "clip")?;
        conn.execute(
            "INSERT INTO clips (id, edition_id, quote, start_secs, duration_secs)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, new.edition_id, quote, new.start_secs, new.duration_secs],
        )?;
        info!("created clip {id} from edition {}", new.edition_id);
        query_clip(&conn, id)
    }

    pub fn clip(&self, id: i64) -> LibraryResult<Clip> {
        let conn = self.conn.lock().unwrap();
        query_clip(&conn, id)
    }

    pub fn clips(&self, edition_id: i64) -> LibraryResult<Vec<Clip>> {
        let conn = self.conn.lock().unwrap();
        ensure_exists(&conn, "editions", "edition", edition_id)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLIP_COLUMNS} FROM clips WHERE edition_id = ?1 ORDER BY id ASC"
        ))?;
        let clips = stmt
            .query_map([edition_id], clip_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clips)
    }

    pub fn record_clip_listen(&self, id: i64) -> LibraryResult<Clip> {
        let conn = self.conn.lock().unwrap();
        bump(&conn, "clips", "clip", "listens", id)?;
        query_clip(&conn, id)
    }

    pub fn like_clip(&self, id: i64) -> LibraryResult<Clip> {
        let conn = self.conn.lock().unwrap();
        bump(&conn, "clips", "clip", "likes", id)?;
        query_clip(&conn, id)
    }

    // --- Feed ---

    /// Public editions and clips of public editions.
    pub fn feed(&self, order: FeedOrder, limit: usize) -> LibraryResult<Vec<FeedItem>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {EDITION_COLUMNS} FROM editions WHERE visibility = 'public'"
        ))?;
        let mut items = stmt
            .query_map([], edition_from_row)?
            .map(|r| r.map(FeedItem::Edition))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT c.id, c.edition_id, c.quote, c.start_secs, c.duration_secs,
                    c.listens, c.likes, c.created_at
             FROM clips c
             JOIN editions e ON e.id = c.edition_id
             WHERE e.visibility = 'public'",
        )?;
        let clips = stmt
            .query_map([], clip_from_row)?
            .map(|r| r.map(FeedItem::Clip))
            .collect::<Result<Vec<_>, _>>()?;
        items.extend(clips);

        match order {
            FeedOrder::Recent => items.sort_by(|a, b| b.id().cmp(&a.id())),
            FeedOrder::Popular => {
                items.sort_by(|a, b| b.score().cmp(&a.score()).then(b.id().cmp(&a.id())))
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}

/// Draw the next id from the sequence shared by books, editions, and clips.
fn next_id(conn: &Connection, kind: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT INTO ids (kind) VALUES (?1)", [kind])?;
    Ok(conn.last_insert_rowid())
}

/// Eight URL-safe characters.
fn share_code() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 6] = rng.random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn ensure_exists(conn: &Connection, table: &str, kind: &'static str, id: i64) -> LibraryResult<()> {
    let found: Option<i64> = conn
        .query_row(&format!("SELECT id FROM {table} WHERE id = ?1"), [id], |row| {
            row.get(0)
        })
        .optional()?;
    found.map(|_| ()).ok_or_else(|| LibraryError::not_found(kind, id))
}

fn bump(conn: &Connection, table: &str, kind: &'static str, column: &str, id: i64) -> LibraryResult<()> {
    let updated = conn.execute(
        &format!("UPDATE {table} SET {column} = {column} + 1 WHERE id = ?1"),
        [id],
    )?;
    if updated == 0 {
        return Err(LibraryError::not_found(kind, id));
    }
    Ok(())
}

fn query_book(conn: &Connection, id: i64) -> LibraryResult<Book> {
    conn.query_row(
        &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
        [id],
        book_from_row,
    )
    .optional()?
    .ok_or_else(|| LibraryError::not_found("book", id))
}

fn query_edition(conn: &Connection, id: i64) -> LibraryResult<Edition> {
    conn.query_row(
        &format!("SELECT {EDITION_COLUMNS} FROM editions WHERE id = ?1"),
        [id],
        edition_from_row,
    )
    .optional()?
    .ok_or_else(|| LibraryError::not_found("edition", id))
}

fn query_clip(conn: &Connection, id: i64) -> LibraryResult<Clip> {
    conn.query_row(
        &format!("SELECT {CLIP_COLUMNS} FROM clips WHERE id = ?1"),
        [id],
        clip_from_row,
    )
    .optional()?
    .ok_or_else(|| LibraryError::not_found("clip", id))
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn book_from_row(row: &Row) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        content_hash: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn chunk_from_row(row: &Row) -> rusqlite::Result<StoredChunk> {
    let status: String = row.get(5)?;
    Ok(StoredChunk {
        book_id: row.get(0)?,
        position: row.get::<_, i64>(1)? as usize,
        chapter: row.get::<_, i64>(2)? as usize,
        original: row.get(3)?,
        modernized: row.get(4)?,
        status: status.parse().map_err(|e| conversion_error(5, e))?,
    })
}

fn edition_from_row(row: &Row) -> rusqlite::Result<Edition> {
    let tags: String = row.get(5)?;
    let visibility: String = row.get(6)?;
    Ok(Edition {
        id: row.get(0)?,
        book_id: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        description: row.get(4)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(5, e))?,
        visibility: visibility.parse().map_err(|e| conversion_error(6, e))?,
        share_code: row.get(7)?,
        voice: row.get(8)?,
        audio_dir: row.get(9)?,
        listens: row.get::<_, i64>(10)? as u64,
        likes: row.get::<_, i64>(11)? as u64,
        created_at: row.get(12)?,
    })
}

fn clip_from_row(row: &Row) -> rusqlite::Result<Clip> {
    Ok(Clip {
        id: row.get(0)?,
        edition_id: row.get(1)?,
        quote: row.get(2)?,
        start_secs: row.get(3)?,
        duration_secs: row.get(4)?,
        listens: row.get::<_, i64>(5)? as u64,
        likes: row.get::<_, i64>(6)? as u64,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_codes_are_eight_url_safe_chars() {
        for _ in 0..50 {
            let code = share_code();
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn ids_are_shared_and_increasing() {
        let conn = Connection::open(":memory:").unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        let a = next_id(&conn, "book").unwrap();
        let b = next_id(&conn, "clip").unwrap();
        assert!(b > a);
    }
}
