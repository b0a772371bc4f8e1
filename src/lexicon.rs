//! Word list and vocabulary initialization.
//!
//! Both inputs are loaded once by the caller and passed down as handles.
//!
//! - Lexicon: one lemma per line, optionally followed by a tab and a POS tag
//!   (default `n`). Only nouns spelled with letters, spaces and hyphens are
//!   kept; the result is sorted and de-duplicated so chunk boundaries are
//!   stable across runs.
//! - Vocabulary: a frequency list (`lemma,freq,...`); `#` lines are comments.
use crate::model::NOUN_POS;
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexicon {
    nouns: Vec<String>,
}

impl Lexicon {
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_required(path, "lexicon")?;
        Ok(Self::from_text(&text))
    }

    pub fn from_text(text: &str) -> Self {
        let nouns: BTreeSet<String> = text
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let (lemma, pos) = match line.split_once('\t') {
                    Some((lemma, pos)) => (lemma.trim(), pos.trim()),
                    None => (line, NOUN_POS),
                };
                (pos == NOUN_POS && is_plain_lemma(lemma)).then(|| lemma.to_string())
            })
            .collect();
        Self {
            nouns: nouns.into_iter().collect(),
        }
    }

    pub fn nouns(&self) -> &[String] {
        &self.nouns
    }

    pub fn len(&self) -> usize {
        self.nouns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nouns.is_empty()
    }
}

fn is_plain_lemma(lemma: &str) -> bool {
    !lemma.is_empty()
        && lemma
            .chars()
            .all(|ch| ch.is_alphabetic() || ch == ' ' || ch == '-')
}

/// Attested terms used to reject invented derived forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    terms: HashSet<String>,
}

impl Vocabulary {
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_required(path, "vocabulary")?;
        Ok(Self::from_text(&text))
    }

    pub fn from_text(text: &str) -> Self {
        let terms = text
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split(',').next())
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect();
        Self { terms }
    }

    #[cfg(test)]
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn read_required(path: &Path, label: &str) -> Result<String> {
    if !path.is_file() {
        return Err(anyhow!("{label} file not found: {}", path.display()));
    }
    fs::read_to_string(path).with_context(|| format!("read {label} {}", path.display()))
}
