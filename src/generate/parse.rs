//! Model answer parsing and vocabulary validation.
//!
//! The expected answer maps each word to `{"morpho": {"a": .., "r": .., "v": ..}}`
//! where every value is a surface form or the literal `"N/A"`. A non-object
//! answer or an entry without a `morpho` object rejects the whole chunk; a
//! missing or non-string slot value reads as `"N/A"`.
use crate::lexicon::Vocabulary;
use crate::model::{ChunkTerms, MorphoForms, Slot};
use serde_json::Value;

/// Sentinel the model uses for "this form does not exist".
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("answer is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("answer is not a JSON object")]
    NotAnObject,
    #[error("entry for {word:?} has no \"morpho\" object")]
    MissingMorpho { word: String },
}

/// Forms kept and dropped by [`validate_terms`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationTally {
    pub accepted: usize,
    pub rejected: usize,
}

pub fn parse_chunk_response(text: &str) -> Result<ChunkTerms, ParseError> {
    let value: Value = serde_json::from_str(&strip_code_fences(text))?;
    let entries = value.as_object().ok_or(ParseError::NotAnObject)?;
    let mut terms = ChunkTerms::new();
    for (word, entry) in entries {
        let morpho = entry
            .get("morpho")
            .and_then(Value::as_object)
            .ok_or_else(|| ParseError::MissingMorpho { word: word.clone() })?;
        let mut forms = MorphoForms::default();
        for slot in Slot::ALL {
            *forms.slot_mut(slot) = morpho
                .get(slot.code())
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|form| !form.is_empty() && *form != NOT_AVAILABLE)
                .map(str::to_string);
        }
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        terms.insert(word.to_string(), forms);
    }
    Ok(terms)
}

/// Downgrade every form absent from `vocabulary` to "does not exist".
pub fn validate_terms(terms: &mut ChunkTerms, vocabulary: &Vocabulary) -> ValidationTally {
    let mut tally = ValidationTally::default();
    for (word, forms) in terms.iter_mut() {
        for slot in Slot::ALL {
            let entry = forms.slot_mut(slot);
            let Some(form) = entry.as_deref() else {
                continue;
            };
            if vocabulary.contains(form) {
                tally.accepted += 1;
            } else {
                tracing::debug!(word = %word, slot = %slot, form, "rejected unattested form");
                tally.rejected += 1;
                *entry = None;
            }
        }
    }
    tally
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|first| first.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|last| last.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}
