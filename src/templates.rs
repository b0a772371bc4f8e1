pub const GENERATION_PROMPT_IT_MD: &str = include_str!("../prompts/generation_it.md");
