//! Dry-run reconciliation of batch-judged relations.
//!
//! Output records are paired with input records by `custom_id`. When the
//! model's judgment says "no", the (derived, root) pair from the question is
//! confirmed (interactively unless auto-confirmed) and matched against the
//! store. The result is a list of [`DeletionCandidate`]s; the store is only
//! read.
pub mod batch;
pub mod confirm;
pub mod plan;
pub mod template;

use crate::store::RelationStore;
use anyhow::Result;
use batch::{correlation_key, index_inputs, InputRecord, OutputRecord};
use confirm::Confirm;
use plan::DeletionCandidate;
use std::collections::HashSet;
use template::{parse_arrow_pair, QuestionTemplate, TemplateError, TermPair};

/// Which stored forms of a matched root are proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MatchScope {
    /// Every derived form of the root lemma.
    #[default]
    AllForms,
    /// Only forms equal to the derived term, ignoring case.
    DerivedOnly,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub auto_confirm: bool,
    pub scope: MatchScope,
    pub template: QuestionTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub outputs_seen: usize,
    pub missing_correlation: usize,
    pub unparseable_inputs: usize,
    pub missing_judgment: usize,
    pub negative_judgments: usize,
    pub confirmed: Vec<TermPair>,
    pub declined: usize,
    /// Confirmed roots with no `words` row.
    pub unmatched_roots: Vec<String>,
    /// Confirmed pairs whose root has no rows in scope.
    pub pairs_without_rows: usize,
    pub candidates: Vec<DeletionCandidate>,
}

/// True when the judgment contains the standalone word "no".
pub fn is_negative_judgment(judgment: &str) -> bool {
    judgment
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .any(|token| token == "no")
}

pub fn reconcile(
    inputs: Vec<InputRecord>,
    outputs: &[OutputRecord],
    store: &RelationStore,
    options: &ReconcileOptions,
    confirm: &mut dyn Confirm,
) -> Result<ReconcileReport> {
    let index = index_inputs(inputs);
    let mut report = ReconcileReport {
        outputs_seen: outputs.len(),
        ..ReconcileReport::default()
    };
    let mut decided: HashSet<TermPair> = HashSet::new();

    for output in outputs {
        let Some(key) = output.custom_id.as_ref().and_then(correlation_key) else {
            tracing::warn!("output record without custom_id");
            report.missing_correlation += 1;
            continue;
        };
        let Some(input) = index.get(&key) else {
            tracing::warn!(custom_id = %key, "no input record for output");
            report.missing_correlation += 1;
            continue;
        };
        let Some(pair) = resolve_pair(input, &options.template, &key) else {
            report.unparseable_inputs += 1;
            continue;
        };
        let Some(judgment) = output.judgment() else {
            tracing::warn!(custom_id = %key, "output record has no judgment text");
            report.missing_judgment += 1;
            continue;
        };
        if !is_negative_judgment(&judgment) {
            continue;
        }
        report.negative_judgments += 1;
        if !decided.insert(pair.clone()) {
            continue;
        }
        if options.auto_confirm || confirm.confirm(&pair)? {
            report.confirmed.push(pair);
        } else {
            report.declined += 1;
        }
    }

    let mut proposed: HashSet<i64> = HashSet::new();
    for pair in &report.confirmed {
        let Some(word_id) = store.find_word_id(&pair.root)? else {
            tracing::info!(root = %pair.root, "no word row for root");
            report.unmatched_roots.push(pair.root.clone());
            continue;
        };
        let derived = pair.derived.to_lowercase();
        let rows: Vec<_> = store
            .derived_forms_for_word(word_id)?
            .into_iter()
            .filter(|row| match options.scope {
                MatchScope::AllForms => true,
                MatchScope::DerivedOnly => row.form.to_lowercase() == derived,
            })
            .collect();
        if rows.is_empty() {
            tracing::info!(
                derived = %pair.derived,
                root = %pair.root,
                word_id,
                "no derived rows match"
            );
            report.pairs_without_rows += 1;
            continue;
        }
        for row in rows {
            if proposed.insert(row.id) {
                tracing::debug!(
                    row_id = row.id,
                    lemma_id = row.lemma_id,
                    form = %row.form,
                    pos = %row.pos,
                    relation = %row.relation_type,
                    "proposing deletion"
                );
                report.candidates.push(DeletionCandidate {
                    derived: pair.derived.clone(),
                    root: pair.root.clone(),
                    row_id: row.id,
                });
            }
        }
    }
    Ok(report)
}

/// Terms from the question template. A `derived -> root` field is consulted
/// only when the record has no question content or the template's quotes are
/// empty; a question missing either marker is unparseable.
fn resolve_pair(
    input: &InputRecord,
    template: &QuestionTemplate,
    key: &str,
) -> Option<TermPair> {
    let reason = match input.question_content() {
        None => "input record has no question content".to_string(),
        Some(content) => match template.extract(content) {
            Ok(pair) => return Some(pair),
            Err(err @ TemplateError::EmptyTerms) => err.to_string(),
            Err(err) => {
                tracing::warn!(custom_id = %key, reason = %err, "question does not match template");
                return None;
            }
        },
    };
    let fallback = input.fallback_text().and_then(parse_arrow_pair);
    if fallback.is_none() {
        tracing::warn!(
            custom_id = %key,
            reason = %reason,
            "could not determine derived/root terms"
        );
    }
    fallback
}
