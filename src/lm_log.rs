//! Chunk invocation log.
//!
//! When enabled, one JSON line is appended per chunk so an operator can see
//! what was asked, how many attempts it took, and what was kept:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"chunk_index":0,"start_index":0,"words":["casa","gatto"],"attempts":1,"duration_ms":4200,"outcome":"committed","accepted":1,"rejected":0}
//! ```
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version for log entries.
pub const LM_LOG_SCHEMA_VERSION: u32 = 1;

/// What happened to a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// Parsed, validated, and committed.
    Committed,
    /// The model call failed after retries.
    InvokeFailed,
    /// The answer was not the expected JSON shape.
    Unparseable,
    /// The store rejected the chunk's transaction.
    StoreFailed,
    /// Stopped by an interrupt before commit.
    Cancelled,
}

impl std::fmt::Display for ChunkOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committed => write!(f, "committed"),
            Self::InvokeFailed => write!(f, "invoke_failed"),
            Self::Unparseable => write!(f, "unparseable"),
            Self::StoreFailed => write!(f, "store_failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the chunk finished.
    pub ts: u64,

    /// Position of the chunk within this run (0-indexed).
    pub chunk_index: usize,

    /// Index of the chunk's first word in the full word list.
    pub start_index: usize,

    pub words: Vec<String>,

    pub attempts: u32,

    pub duration_ms: u64,

    pub outcome: ChunkOutcome,

    /// Derived forms kept after vocabulary validation.
    pub accepted: usize,

    /// Derived forms rejected by vocabulary validation.
    pub rejected: usize,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Append an entry as one JSON line, creating parent directories as needed.
pub fn append_entry(path: &Path, entry: &LmLogEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize lm log entry")?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
