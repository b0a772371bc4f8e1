//! Model backend resolution and invocation settings.
//!
//! The backend is resolved in priority order:
//! 1. `--lm` CLI flag (a shell-words command line)
//! 2. `MORPHO_LM_COMMAND` environment variable
//! 3. `MISTRAL_API_KEY` (with optional `MISTRAL_MODEL` / `MISTRAL_BASE_URL`)
use crate::invoke::transport::{CommandTransport, HttpTransport, ModelTransport};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

pub const LM_COMMAND_ENV: &str = "MORPHO_LM_COMMAND";
pub const MISTRAL_API_KEY_ENV: &str = "MISTRAL_API_KEY";
pub const MISTRAL_MODEL_ENV: &str = "MISTRAL_MODEL";
pub const MISTRAL_BASE_URL_ENV: &str = "MISTRAL_BASE_URL";

pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    Command {
        command: String,
    },
    Mistral {
        api_key: String,
        model: String,
        base_url: String,
    },
}

impl ModelBackend {
    /// Short label for logs; never includes credentials.
    pub fn describe(&self) -> String {
        match self {
            Self::Command { command } => format!("command `{command}`"),
            Self::Mistral {
                model, base_url, ..
            } => format!("{model} at {base_url}"),
        }
    }
}

pub fn resolve_backend(explicit: Option<&str>) -> Result<ModelBackend> {
    resolve_backend_with(explicit, |name| std::env::var(name).ok())
}

/// Resolution with an injectable environment lookup.
pub fn resolve_backend_with<F>(explicit: Option<&str>, lookup: F) -> Result<ModelBackend>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

    if let Some(command) = explicit
        .map(str::to_string)
        .or_else(|| non_empty(lookup(LM_COMMAND_ENV)))
    {
        return Ok(ModelBackend::Command { command });
    }
    if let Some(api_key) = non_empty(lookup(MISTRAL_API_KEY_ENV)) {
        return Ok(ModelBackend::Mistral {
            api_key,
            model: non_empty(lookup(MISTRAL_MODEL_ENV))
                .unwrap_or_else(|| DEFAULT_MISTRAL_MODEL.to_string()),
            base_url: non_empty(lookup(MISTRAL_BASE_URL_ENV))
                .unwrap_or_else(|| DEFAULT_MISTRAL_BASE_URL.to_string()),
        });
    }
    Err(anyhow!(
        "no model configured; pass --lm, set {LM_COMMAND_ENV}, or set {MISTRAL_API_KEY_ENV}"
    ))
}

pub fn build_transport(
    backend: &ModelBackend,
    timeout: Duration,
) -> Result<Arc<dyn ModelTransport>> {
    Ok(match backend {
        ModelBackend::Command { command } => Arc::new(CommandTransport::new(command)?),
        ModelBackend::Mistral {
            api_key,
            model,
            base_url,
        } => Arc::new(HttpTransport::new(base_url, api_key, model, timeout)),
    })
}

/// Per-call knobs for the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvokeSettings {
    pub temperature: f32,
    pub max_attempts: u32,
}

impl Default for InvokeSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl InvokeSettings {
    pub fn new(temperature: f32, max_attempts: u32) -> Result<Self> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(anyhow!("temperature must be within [0, 1] (got {temperature})"));
        }
        if max_attempts == 0 {
            return Err(anyhow!("attempts must be at least 1"));
        }
        Ok(Self {
            temperature,
            max_attempts,
        })
    }
}
