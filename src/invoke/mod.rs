//! Bounded-concurrency, retrying model invocation.
//!
//! Every call goes through one shared permit pool sized to the provider's
//! per-key concurrency limit. Failures never escape as errors: callers get an
//! [`InvokeOutcome`] and decide whether to skip their unit of work.
//!
//! # Failure handling
//!
//! - Service errors and replies without content are transient: retried with
//!   linear backoff (150 ms per failure so far) up to `max_attempts`.
//! - A reply that is empty after trimming whitespace counts as no content, so
//!   a whitespace-only answer is retried rather than returned.
//! - Any other transport error aborts the invocation after the failing attempt.
//! - Cancellation stops the loop at the next await point, including while
//!   waiting for a permit or sleeping between attempts.
pub mod cancel;
pub mod response;
pub mod retry;
pub mod transport;

use cancel::CancelSignal;
use retry::{RetryOutcome, RetryPolicy, DEFAULT_BACKOFF_STEP};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use transport::{ModelRequest, ModelTransport, ResponseFormat, TransportError};

/// Concurrent in-flight calls allowed per API key.
pub const MAX_CONCURRENT_CALLS: usize = 6;

static SHARED_PERMITS: OnceLock<Arc<Semaphore>> = OnceLock::new();

/// The process-wide pool every [`InvocationClient::new`] draws from.
fn shared_permits() -> Arc<Semaphore> {
    SHARED_PERMITS
        .get_or_init(|| Arc::new(Semaphore::new(MAX_CONCURRENT_CALLS)))
        .clone()
}

/// Result of one invocation: the trimmed answer and whether it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOutcome {
    pub text: String,
    pub succeeded: bool,
    pub attempts: u32,
}

impl InvokeOutcome {
    fn failed(attempts: u32) -> Self {
        Self {
            text: String::new(),
            succeeded: false,
            attempts,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("model reply carried no content")]
    EmptyContent,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::EmptyContent => true,
            Self::Transport(err) => err.is_transient(),
        }
    }
}

/// Cloning shares the transport and the cancel signal. All clients share one
/// permit pool.
#[derive(Clone)]
pub struct InvocationClient {
    transport: Arc<dyn ModelTransport>,
    permits: Arc<Semaphore>,
    backoff_step: Duration,
    cancel: CancelSignal,
}

impl InvocationClient {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            transport,
            permits: shared_permits(),
            backoff_step: DEFAULT_BACKOFF_STEP,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Send `prompt` and return the first non-empty answer.
    ///
    /// Exhausted retries, unexpected errors, and cancellation all yield
    /// `succeeded = false` with empty text.
    pub async fn invoke(
        &self,
        prompt: &str,
        format: ResponseFormat,
        temperature: f32,
        max_attempts: u32,
    ) -> InvokeOutcome {
        let request = ModelRequest {
            prompt: prompt.to_string(),
            format,
            temperature: temperature.clamp(0.0, 1.0),
        };
        let policy = RetryPolicy::new(max_attempts).with_backoff_step(self.backoff_step);
        let request = &request;
        let outcome = policy
            .run(&self.cancel, AttemptError::is_retryable, move |attempt| {
                self.attempt(request, attempt)
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => InvokeOutcome {
                text: value,
                succeeded: true,
                attempts,
            },
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    attempts,
                    error = %last_error,
                    "model invocation exhausted retries"
                );
                InvokeOutcome::failed(attempts)
            }
            RetryOutcome::Aborted { attempts, error } => {
                tracing::error!(
                    attempts,
                    error = %error,
                    "unexpected error during model invocation"
                );
                InvokeOutcome::failed(attempts)
            }
            RetryOutcome::Cancelled { attempts } => {
                tracing::info!(attempts, "model invocation cancelled");
                InvokeOutcome::failed(attempts)
            }
        }
    }

    async fn attempt(
        &self,
        request: &ModelRequest,
        attempt: u32,
    ) -> Result<String, AttemptError> {
        let reply = {
            let _permit = self.permits.acquire().await.map_err(|_| {
                TransportError::Unexpected("invocation permit pool closed".to_string())
            })?;
            self.transport.complete(request).await
        };
        let reply = reply.inspect_err(|err| {
            tracing::debug!(attempt, error = %err, "model call failed");
        })?;
        match reply.content() {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => {
                tracing::debug!(attempt, "model reply carried no content");
                Err(AttemptError::EmptyContent)
            }
        }
    }
}
