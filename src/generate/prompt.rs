use crate::templates;

/// Marker that precedes the newline-joined word list in the prompt.
#[cfg(test)]
pub const WORD_LIST_HEADER: &str = "Parole da analizzare:";

pub fn build_generation_prompt(words: &[String]) -> String {
    templates::GENERATION_PROMPT_IT_MD.replace("{words}", &words.join("\n"))
}
