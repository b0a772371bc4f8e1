//! SQLite persistence for words and their derived forms.
//!
//! Generation writes one transaction per chunk so an interrupted run leaves
//! every committed chunk intact and nothing from the chunk in progress.
//! Reconciliation opens the database read-only.
use crate::model::{ChunkTerms, NOUN_POS, RELATION_MORPHOLOGICAL};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

/// How a new derived form interacts with rows already stored for its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DerivedFormPolicy {
    /// Keep every distinct form observed for a slot.
    #[default]
    Append,
    /// Keep only the latest form per (word, slot).
    ReplaceSlot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFormRow {
    pub id: i64,
    pub lemma_id: i64,
    pub form: String,
    pub pos: String,
    pub relation_type: String,
}

/// Row counts written by one chunk commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkWrite {
    pub words_inserted: usize,
    pub forms_inserted: usize,
    pub forms_replaced: usize,
}

pub struct RelationStore {
    conn: Connection,
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS words (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lemma TEXT NOT NULL UNIQUE,
    pos TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS derived_forms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lemma_id INTEGER NOT NULL,
    form TEXT NOT NULL,
    pos TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    FOREIGN KEY (lemma_id) REFERENCES words(id)
);
"#;

impl RelationStore {
    /// Open (creating if needed) a writable store and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open relation store {}", path.display()))?;
        Self::with_schema(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory relation store")?;
        Self::with_schema(conn)
    }

    /// Open an existing store without write access.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("relation store not found: {}", path.display()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open relation store {} read-only", path.display()))?;
        Ok(Self { conn })
    }

    fn with_schema(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("create relation store schema")?;
        Ok(Self { conn })
    }

    /// Persist one chunk atomically.
    ///
    /// Words are insert-or-ignore on the unique lemma; each present form is
    /// written according to `policy`.
    pub fn commit_chunk(
        &mut self,
        terms: &ChunkTerms,
        policy: DerivedFormPolicy,
    ) -> Result<ChunkWrite> {
        let tx = self.conn.transaction().context("begin chunk transaction")?;
        let mut write = ChunkWrite::default();
        for (lemma, forms) in terms {
            write.words_inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO words (lemma, pos) VALUES (?1, ?2)",
                    params![lemma, NOUN_POS],
                )
                .with_context(|| format!("insert word {lemma:?}"))?;
            let lemma_id: i64 = tx
                .query_row(
                    "SELECT id FROM words WHERE lemma = ?1",
                    params![lemma],
                    |row| row.get(0),
                )
                .with_context(|| format!("look up word id for {lemma:?}"))?;

            for (slot, form) in forms.present() {
                if policy == DerivedFormPolicy::ReplaceSlot {
                    write.forms_replaced += tx
                        .execute(
                            "DELETE FROM derived_forms \
                             WHERE lemma_id = ?1 AND pos = ?2 AND form <> ?3",
                            params![lemma_id, slot.code(), form],
                        )
                        .with_context(|| format!("replace {slot} form for {lemma:?}"))?;
                }
                write.forms_inserted += tx
                    .execute(
                        "INSERT INTO derived_forms (lemma_id, form, pos, relation_type)
                         SELECT ?1, ?2, ?3, ?4
                         WHERE NOT EXISTS (
                             SELECT 1 FROM derived_forms
                             WHERE lemma_id = ?1 AND pos = ?3 AND form = ?2
                         )",
                        params![lemma_id, form, slot.code(), RELATION_MORPHOLOGICAL],
                    )
                    .with_context(|| format!("insert {slot} form {form:?} for {lemma:?}"))?;
            }
        }
        tx.commit().context("commit chunk transaction")?;
        Ok(write)
    }

    /// Case-insensitive lookup of a word id by lemma text.
    pub fn find_word_id(&self, lemma: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM words WHERE lemma = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                params![lemma],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("look up word {lemma:?}"))
    }

    pub fn derived_forms_for_word(&self, lemma_id: i64) -> Result<Vec<DerivedFormRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, lemma_id, form, pos, relation_type
                 FROM derived_forms WHERE lemma_id = ?1 ORDER BY id",
            )
            .context("prepare derived form lookup")?;
        let rows = stmt
            .query_map(params![lemma_id], |row| {
                Ok(DerivedFormRow {
                    id: row.get(0)?,
                    lemma_id: row.get(1)?,
                    form: row.get(2)?,
                    pos: row.get(3)?,
                    relation_type: row.get(4)?,
                })
            })
            .context("query derived forms")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read derived form rows")
    }

    pub fn count_words(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM words", [], |row| row.get(0))
            .context("count words")
    }

    pub fn count_derived_forms(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM derived_forms", [], |row| row.get(0))
            .context("count derived forms")
    }

    /// Every stored (lemma, pos, form) triple.
    #[cfg(test)]
    pub fn relation_triples(&self) -> Result<std::collections::BTreeSet<(String, String, String)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT w.lemma, d.pos, d.form
                 FROM derived_forms d JOIN words w ON w.id = d.lemma_id",
            )
            .context("prepare relation listing")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("query relations")?;
        rows.collect::<rusqlite::Result<std::collections::BTreeSet<_>>>()
            .context("read relation rows")
    }
}
