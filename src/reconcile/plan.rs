//! Dry-run deletion plan and its SQL review artifact.
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// A `derived_forms` row proposed for deletion, with the pair that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCandidate {
    pub derived: String,
    pub root: String,
    pub row_id: i64,
}

impl DeletionCandidate {
    /// `DELETE` statement annotated with the source pair. The annotation
    /// lives in a line comment, so it is kept on one line.
    pub fn statement(&self) -> String {
        format!(
            "DELETE FROM derived_forms WHERE id = {};  -- form='{}' expected_root='{}'",
            self.row_id,
            single_line(&self.derived),
            single_line(&self.root)
        )
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Write one statement per line; an empty plan writes an empty file.
pub fn write_sql_artifact(path: &Path, candidates: &[DeletionCandidate]) -> Result<()> {
    let mut sql = String::new();
    for candidate in candidates {
        sql.push_str(&candidate.statement());
        sql.push('\n');
    }
    fs::write(path, sql).with_context(|| format!("write {}", path.display()))
}
