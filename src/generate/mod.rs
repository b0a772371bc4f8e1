//! Chunked, resumable generation of derived-form relations.
//!
//! Words are processed in contiguous chunks, in list order, one model call
//! per chunk. Each chunk is parsed, filtered against the attested vocabulary
//! and committed in its own transaction before the next chunk starts, so a
//! run stopped after chunk `k` resumes with `start = start + (k + 1) * chunk_size`.
//!
//! A chunk whose call fails, whose answer does not parse, or whose commit
//! fails is skipped and reported; the run continues with the next chunk.
//! Cancellation is checked between chunks and stops the loop without
//! committing the chunk in flight.
pub mod parse;
pub mod prompt;

use crate::config::InvokeSettings;
use crate::invoke::transport::ResponseFormat;
use crate::invoke::{InvocationClient, InvokeOutcome};
use crate::lexicon::Vocabulary;
use crate::lm_log::{self, ChunkOutcome, LmLogEntry, LM_LOG_SCHEMA_VERSION};
use crate::store::{ChunkWrite, DerivedFormPolicy, RelationStore};
use anyhow::{anyhow, Result};
use parse::{parse_chunk_response, validate_terms, ValidationTally};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct GenerationSettings {
    pub invoke: InvokeSettings,
    pub policy: DerivedFormPolicy,
    /// Append one JSON line per chunk here when set.
    pub lm_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks_committed: usize,
    pub chunks_skipped: usize,
    /// Start index of every skipped chunk, for targeted re-runs.
    pub skipped_starts: Vec<usize>,
    pub words_inserted: usize,
    pub forms_inserted: usize,
    pub forms_replaced: usize,
    pub forms_accepted: usize,
    pub forms_rejected: usize,
    /// Index to pass as `start` to continue after this run.
    pub next_start: usize,
    pub cancelled: bool,
}

/// Per-chunk result before it is folded into the summary and the log.
struct ChunkReport {
    outcome: ChunkOutcome,
    tally: ValidationTally,
    write: ChunkWrite,
    error: Option<String>,
}

impl ChunkReport {
    fn skipped(outcome: ChunkOutcome, error: impl Into<String>) -> Self {
        Self {
            outcome,
            tally: ValidationTally::default(),
            write: ChunkWrite::default(),
            error: Some(error.into()),
        }
    }
}

pub struct GenerationPipeline<'a> {
    client: &'a InvocationClient,
    store: &'a mut RelationStore,
    vocabulary: &'a Vocabulary,
    settings: GenerationSettings,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(
        client: &'a InvocationClient,
        store: &'a mut RelationStore,
        vocabulary: &'a Vocabulary,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            client,
            store,
            vocabulary,
            settings,
        }
    }

    /// Process `words[start..]` in chunks of `chunk_size`.
    ///
    /// Only invalid arguments return `Err`; per-chunk failures are counted in
    /// the summary.
    pub async fn run(
        &mut self,
        words: &[String],
        start: usize,
        chunk_size: usize,
    ) -> Result<RunSummary> {
        if chunk_size == 0 {
            return Err(anyhow!("chunk size must be at least 1"));
        }
        if start > words.len() {
            return Err(anyhow!(
                "start index {start} is past the end of the word list ({} words)",
                words.len()
            ));
        }

        let cancel = self.client.cancel_signal().clone();
        let mut summary = RunSummary {
            next_start: start,
            ..RunSummary::default()
        };
        for (chunk_index, chunk) in words[start..].chunks(chunk_size).enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let chunk_start = start + chunk_index * chunk_size;
            tracing::info!(chunk_index, start = chunk_start, words = ?chunk, "processing chunk");

            let started = Instant::now();
            let prompt = prompt::build_generation_prompt(chunk);
            let invocation = self
                .client
                .invoke(
                    &prompt,
                    ResponseFormat::JsonObject,
                    self.settings.invoke.temperature,
                    self.settings.invoke.max_attempts,
                )
                .await;
            let report = if !invocation.succeeded && cancel.is_cancelled() {
                ChunkReport::skipped(ChunkOutcome::Cancelled, "interrupted before commit")
            } else {
                self.settle_chunk(&invocation)
            };

            self.record(LmLogEntry {
                schema_version: LM_LOG_SCHEMA_VERSION,
                ts: lm_log::now_epoch_ms(),
                chunk_index,
                start_index: chunk_start,
                words: chunk.to_vec(),
                attempts: invocation.attempts,
                duration_ms: started.elapsed().as_millis() as u64,
                outcome: report.outcome,
                accepted: report.tally.accepted,
                rejected: report.tally.rejected,
                error: report.error.clone(),
            });

            match report.outcome {
                ChunkOutcome::Cancelled => {
                    tracing::info!(
                        chunk_index,
                        start = chunk_start,
                        "stopping before uncommitted chunk"
                    );
                    summary.cancelled = true;
                    break;
                }
                ChunkOutcome::Committed => {
                    summary.chunks_committed += 1;
                    summary.words_inserted += report.write.words_inserted;
                    summary.forms_inserted += report.write.forms_inserted;
                    summary.forms_replaced += report.write.forms_replaced;
                    summary.forms_accepted += report.tally.accepted;
                    summary.forms_rejected += report.tally.rejected;
                    tracing::info!(
                        chunk_index,
                        accepted = report.tally.accepted,
                        rejected = report.tally.rejected,
                        forms_inserted = report.write.forms_inserted,
                        "chunk committed"
                    );
                }
                outcome => {
                    summary.chunks_skipped += 1;
                    summary.skipped_starts.push(chunk_start);
                    tracing::warn!(
                        chunk_index,
                        start = chunk_start,
                        %outcome,
                        error = report.error.as_deref().unwrap_or_default(),
                        "chunk skipped"
                    );
                }
            }
            summary.next_start = chunk_start + chunk.len();
        }
        Ok(summary)
    }

    fn settle_chunk(&mut self, invocation: &InvokeOutcome) -> ChunkReport {
        if !invocation.succeeded {
            return ChunkReport::skipped(
                ChunkOutcome::InvokeFailed,
                format!("no answer after {} attempt(s)", invocation.attempts),
            );
        }
        let mut terms = match parse_chunk_response(&invocation.text) {
            Ok(terms) => terms,
            Err(err) => return ChunkReport::skipped(ChunkOutcome::Unparseable, err.to_string()),
        };
        let tally = validate_terms(&mut terms, self.vocabulary);
        match self.store.commit_chunk(&terms, self.settings.policy) {
            Ok(write) => ChunkReport {
                outcome: ChunkOutcome::Committed,
                tally,
                write,
                error: None,
            },
            Err(err) => ChunkReport::skipped(ChunkOutcome::StoreFailed, format!("{err:#}")),
        }
    }

    fn record(&self, entry: LmLogEntry) {
        let Some(path) = self.settings.lm_log.as_deref() else {
            return;
        };
        if let Err(err) = lm_log::append_entry(path, &entry) {
            tracing::warn!(path = %path.display(), error = %err, "failed to append lm log entry");
        }
    }
}
