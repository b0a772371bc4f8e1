//! Relation data model shared by generation, persistence, and reconciliation.
use std::collections::BTreeMap;
use std::fmt;

/// Part-of-speech tag stored for every lemma this tool inserts.
pub const NOUN_POS: &str = "n";
/// Relation tag stored on every derived form.
pub const RELATION_MORPHOLOGICAL: &str = "morphological";

/// Part-of-speech slot a derived form fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Adjective,
    Adverb,
    Verb,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Adjective, Slot::Adverb, Slot::Verb];

    /// Single-letter code used in the model answer and in `derived_forms.pos`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Adjective => "a",
            Self::Adverb => "r",
            Self::Verb => "v",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Derived forms proposed for one lemma; `None` means "does not exist".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MorphoForms {
    pub adjective: Option<String>,
    pub adverb: Option<String>,
    pub verb: Option<String>,
}

impl MorphoForms {
    pub fn get(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Adjective => self.adjective.as_deref(),
            Slot::Adverb => self.adverb.as_deref(),
            Slot::Verb => self.verb.as_deref(),
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut Option<String> {
        match slot {
            Slot::Adjective => &mut self.adjective,
            Slot::Adverb => &mut self.adverb,
            Slot::Verb => &mut self.verb,
        }
    }

    /// Forms that exist, in slot order.
    pub fn present(&self) -> impl Iterator<Item = (Slot, &str)> + '_ {
        Slot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|form| (slot, form)))
    }
}

/// Parsed answer for a chunk, keyed by lemma.
pub type ChunkTerms = BTreeMap<String, MorphoForms>;
