//! JSON-lines batch records and correlation by `custom_id`.
use crate::invoke::response::ModelReply;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputRecord {
    #[serde(default)]
    pub custom_id: Option<Value>,
    #[serde(default)]
    pub body: Option<RequestBody>,
    /// Free-form `derived -> root` fallback.
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub messages: Vec<RequestMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl InputRecord {
    /// Content of the first request message.
    pub fn question_content(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .messages
            .first()?
            .content
            .as_deref()
    }

    pub fn fallback_text(&self) -> Option<&str> {
        self.question
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .or(self.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputRecord {
    #[serde(default)]
    pub custom_id: Option<Value>,
    #[serde(default)]
    pub response: Option<ResponseEnvelope>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub body: Option<Value>,
}

impl OutputRecord {
    /// The model's judgment text, read through the same reply normalization
    /// the invocation client uses.
    pub fn judgment(&self) -> Option<String> {
        let body = self.response.as_ref()?.body.clone()?;
        ModelReply::from_value(body).content()
    }
}

/// String form of a correlation id; numbers and strings with the same text
/// correlate with each other.
pub fn correlation_key(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Read a JSON-lines file, skipping blank lines and warning on lines that do
/// not decode as `T`.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(anyhow!("batch file not found: {}", path.display()));
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_jsonl(&text, &path.display().to_string()))
}

pub fn parse_jsonl<T: DeserializeOwned>(text: &str, source: &str) -> Vec<T> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(source, line = idx + 1, error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}

/// Index input records by correlation key; a later duplicate replaces an
/// earlier one.
pub fn index_inputs(inputs: Vec<InputRecord>) -> HashMap<String, InputRecord> {
    inputs
        .into_iter()
        .filter_map(|record| {
            let key = record.custom_id.as_ref().and_then(correlation_key)?;
            Some((key, record))
        })
        .collect()
}
