//! Model transports.
//!
//! A transport performs exactly one request with no retries of its own and
//! classifies failures so the retry policy can decide what to do next.
//!
//! Two transports are provided:
//!
//! - [`CommandTransport`]: runs a user-configured command with the prompt on
//!   stdin and reads the answer from stdout (any local or wrapped LM CLI).
//! - [`HttpTransport`]: posts to a Mistral-compatible chat completions API.
use super::response::ModelReply;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Response format tag forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free-form answers; the generation pipeline only asks for JSON.
    #[allow(dead_code)]
    Text,
    JsonObject,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::JsonObject => "json_object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub format: ResponseFormat,
    pub temperature: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The service answered with an error or could not be reached; retryable.
    #[error("model service error: {0}")]
    Service(String),
    /// Anything else; not retried.
    #[error("unexpected model failure: {0}")]
    Unexpected(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, TransportError>;
}

/// Environment variable carrying the response format to command transports.
pub const RESPONSE_FORMAT_ENV: &str = "MORPHO_RESPONSE_FORMAT";
/// Environment variable carrying the sampling temperature to command transports.
pub const TEMPERATURE_ENV: &str = "MORPHO_TEMPERATURE";

#[derive(Debug, Clone)]
pub struct CommandTransport {
    argv: Vec<String>,
}

impl CommandTransport {
    /// Parse a shell-words command line.
    pub fn new(command: &str) -> anyhow::Result<Self> {
        let argv = shell_words::split(command)
            .map_err(|err| anyhow::anyhow!("parse LM command {command:?}: {err}"))?;
        if argv.is_empty() {
            return Err(anyhow::anyhow!("LM command is empty"));
        }
        Ok(Self { argv })
    }
}

#[async_trait]
impl ModelTransport for CommandTransport {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, TransportError> {
        let started = Instant::now();
        let mut child = tokio::process::Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .env(RESPONSE_FORMAT_ENV, request.format.as_str())
            .env(TEMPERATURE_ENV, request.temperature.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            // Not retried: the command is missing or not executable.
            .map_err(|err| {
                TransportError::Unexpected(format!("spawn LM command {}: {err}", self.argv[0]))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(request.prompt.as_bytes()).await {
                if err.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(TransportError::Service(format!(
                        "write prompt to LM stdin: {err}"
                    )));
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| TransportError::Service(format!("wait for LM command: {err}")))?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_bytes = request.prompt.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Service(format!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|err| TransportError::Unexpected(format!("decode LM stdout: {err}")))?;
        Ok(ModelReply::from_command_output(&stdout))
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
            "response_format": {"type": request.format.as_str()},
        })
    }

    fn post(&self, body: &Value) -> Result<Value, TransportError> {
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(classify_http_error)?;
        response
            .body_mut()
            .read_json::<Value>()
            .map_err(|err| TransportError::Service(format!("decode response body: {err}")))
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, TransportError> {
        let body = self.request_body(request);
        let transport = self.clone();
        let started = Instant::now();
        // ureq is blocking; keep it off the async workers.
        let value = tokio::task::spawn_blocking(move || transport.post(&body))
            .await
            .map_err(|err| TransportError::Unexpected(format!("HTTP worker failed: {err}")))??;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_bytes = request.prompt.len(),
            "lm invoke complete"
        );
        Ok(ModelReply::from_value(value))
    }
}

/// Provider errors and connectivity problems are retryable; the rest is not.
pub fn classify_http_error(err: ureq::Error) -> TransportError {
    match &err {
        ureq::Error::StatusCode(code) => TransportError::Service(format!("HTTP status {code}")),
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => TransportError::Service(err.to_string()),
        _ => TransportError::Unexpected(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> ModelRequest {
        ModelRequest {
            prompt: prompt.to_string(),
            format: ResponseFormat::JsonObject,
            temperature: 0.7,
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandTransport::new("   ").is_err());
        assert!(CommandTransport::new("llm 'unterminated").is_err());
    }

    #[test]
    fn http_status_errors_are_transient() {
        assert!(classify_http_error(ureq::Error::StatusCode(429)).is_transient());
        assert!(classify_http_error(ureq::Error::StatusCode(500)).is_transient());
        assert!(classify_http_error(ureq::Error::HostNotFound).is_transient());
    }

    #[test]
    fn request_body_carries_format_and_temperature() {
        let transport = HttpTransport::new(
            "https://api.example.test/v1/",
            "key",
            "mistral-large-latest",
            Duration::from_secs(5),
        );
        assert_eq!(
            transport.endpoint,
            "https://api.example.test/v1/chat/completions"
        );
        let body = transport.request_body(&request("ciao"));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["content"], "ciao");
        assert_eq!(body["model"], "mistral-large-latest");
    }

    #[tokio::test]
    async fn command_transport_reads_stdout() {
        let transport = CommandTransport::new("cat").expect("parse command");
        let reply = transport
            .complete(&request("{\"casa\": {}}"))
            .await
            .expect("cat succeeds");
        assert_eq!(reply.content().as_deref(), Some("{\"casa\": {}}"));
    }

    #[tokio::test]
    async fn command_transport_exports_format() {
        let transport =
            CommandTransport::new("sh -c 'cat >/dev/null; printf %s \"$MORPHO_RESPONSE_FORMAT\"'")
                .expect("parse command");
        let reply = transport.complete(&request("x")).await.expect("sh succeeds");
        assert_eq!(reply.content().as_deref(), Some("json_object"));
    }

    #[tokio::test]
    async fn failing_command_is_a_service_error() {
        let transport =
            CommandTransport::new("sh -c 'cat >/dev/null; exit 3'").expect("parse command");
        let err = transport.complete(&request("x")).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn missing_command_is_unexpected() {
        let transport =
            CommandTransport::new("/nonexistent/morpho-lm-binary").expect("parse command");
        let err = transport.complete(&request("x")).await.unwrap_err();
        assert!(!err.is_transient(), "{err}");
    }
}
