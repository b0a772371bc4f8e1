//! Question template parsing.
//!
//! Batch questions embed the two terms as quoted values after fixed phrases:
//! `... La parola '<derived>' ... con il lemma '<root>'? ...`. Changing the
//! question wording means changing the markers here.

pub const DERIVED_MARKER: &str = "La parola '";
pub const ROOT_MARKER: &str = "con il lemma '";

const QUOTE: char = '\'';
const ARROW: &str = "->";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermPair {
    pub derived: String,
    pub root: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("derived term marker {0:?} not found")]
    MissingDerived(String),
    #[error("root term marker {0:?} not found")]
    MissingRoot(String),
    #[error("quoted terms are empty")]
    EmptyTerms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionTemplate {
    pub derived_marker: String,
    pub root_marker: String,
}

impl Default for QuestionTemplate {
    fn default() -> Self {
        Self {
            derived_marker: DERIVED_MARKER.to_string(),
            root_marker: ROOT_MARKER.to_string(),
        }
    }
}

impl QuestionTemplate {
    /// Pull the quoted derived and root terms out of `content`.
    ///
    /// Each term runs from its marker to the next quote, or to the end of the
    /// text when no closing quote follows. Terms are trimmed.
    pub fn extract(&self, content: &str) -> Result<TermPair, TemplateError> {
        let derived = quoted_after(content, &self.derived_marker)
            .ok_or_else(|| TemplateError::MissingDerived(self.derived_marker.clone()))?;
        let root = quoted_after(content, &self.root_marker)
            .ok_or_else(|| TemplateError::MissingRoot(self.root_marker.clone()))?;
        if derived.is_empty() || root.is_empty() {
            return Err(TemplateError::EmptyTerms);
        }
        Ok(TermPair {
            derived: derived.to_string(),
            root: root.to_string(),
        })
    }
}

fn quoted_after<'a>(content: &'a str, marker: &str) -> Option<&'a str> {
    let start = content.find(marker)? + marker.len();
    let rest = &content[start..];
    let end = rest.find(QUOTE).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Parse a `derived -> root` line.
pub fn parse_arrow_pair(text: &str) -> Option<TermPair> {
    let (derived, root) = text.split_once(ARROW)?;
    let (derived, root) = (derived.trim(), root.trim());
    if derived.is_empty() || root.is_empty() {
        return None;
    }
    Some(TermPair {
        derived: derived.to_string(),
        root: root.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUESTION: &str = "Rispondi solo sì o no. La parola 'rallegrare' è morfologicamente \
                            collegata con il lemma 'allegria'? Motiva in breve.";

    #[test]
    fn extracts_derived_and_root() {
        let pair = QuestionTemplate::default().extract(QUESTION).expect("extract");
        assert_eq!(
            pair,
            TermPair {
                derived: "rallegrare".to_string(),
                root: "allegria".to_string(),
            }
        );
    }

    #[test]
    fn missing_markers_are_reported() {
        let template = QuestionTemplate::default();
        assert!(matches!(
            template.extract("con il lemma 'allegria'?"),
            Err(TemplateError::MissingDerived(_))
        ));
        assert!(matches!(
            template.extract("La parola 'rallegrare' deriva da allegria?"),
            Err(TemplateError::MissingRoot(_))
        ));
        assert_eq!(
            template.extract("La parola '' ... con il lemma 'allegria'"),
            Err(TemplateError::EmptyTerms)
        );
    }

    #[test]
    fn unterminated_quote_takes_rest_of_text() {
        let pair = QuestionTemplate::default()
            .extract("La parola 'rallegrare' con il lemma 'allegria")
            .expect("extract");
        assert_eq!(pair.root, "allegria");
    }

    #[test]
    fn custom_markers_follow_reworded_questions() {
        let template = QuestionTemplate {
            derived_marker: "derived '".to_string(),
            root_marker: "root '".to_string(),
        };
        let pair = template
            .extract("Is derived 'happily' related to root 'happiness'?")
            .expect("extract");
        assert_eq!(pair.derived, "happily");
        assert_eq!(pair.root, "happiness");
    }

    #[test]
    fn arrow_pairs_split_once() {
        assert_eq!(
            parse_arrow_pair(" allegro -> allegria "),
            Some(TermPair {
                derived: "allegro".to_string(),
                root: "allegria".to_string(),
            })
        );
        assert_eq!(parse_arrow_pair("allegro"), None);
        assert_eq!(parse_arrow_pair(" -> allegria"), None);
    }
}
