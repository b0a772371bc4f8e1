//! Normalized model reply.
//!
//! Transports hand back whatever shape the provider produced: a typed chat
//! completion, an untyped JSON mapping, or bare text from a local command.
//! `ModelReply::content` is the only accessor downstream code needs.
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ModelReply {
    Completion(ChatCompletion),
    Mapping(Value),
    Text(String),
}

impl ModelReply {
    /// Prefer the typed completion shape, keep anything else as a mapping.
    pub fn from_value(value: Value) -> Self {
        match ChatCompletion::deserialize(&value) {
            Ok(completion) => Self::Completion(completion),
            Err(_) => Self::Mapping(value),
        }
    }

    /// Interpret raw command output: a chat-completion envelope if it looks
    /// like one, plain text otherwise.
    pub fn from_command_output(stdout: &str) -> Self {
        match serde_json::from_str::<Value>(stdout) {
            Ok(value) if value.get("choices").is_some() => Self::from_value(value),
            _ => Self::Text(stdout.to_string()),
        }
    }

    /// Text of the first choice, or `None` when the reply carries none.
    pub fn content(&self) -> Option<String> {
        match self {
            Self::Completion(completion) => completion
                .choices
                .first()
                .and_then(|choice| choice.message.as_ref())
                .and_then(|message| message.content.clone()),
            Self::Mapping(value) => mapping_content(value),
            Self::Text(text) => Some(text.clone()),
        }
    }
}

fn mapping_content(value: &Value) -> Option<String> {
    let content = value.pointer("/choices/0/message/content")?;
    match content {
        Value::String(text) => Some(text.clone()),
        // Chunked content: [{"type": "text", "text": "..."}, ...]
        Value::Array(parts) => {
            let joined: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            Some(joined)
        }
        _ => None,
    }
}
