//! Single-retry policy for backend models that are still loading
//!
//! STT and TTS hosts cold-start their models on demand and answer with an
//! error containing "currently loading" plus an optional `estimated_time`.
//! The caller waits that long (20s when absent) and repeats the identical
//! request once; a second failure is terminal.

use std::future::Future;
use std::time::Duration;

use crate::backend::Stage;
use crate::events::{EventBus, PipelineEvent};
use crate::{Error, Result};

/// Marker the backend puts in the `error` field while a model loads
pub const MODEL_LOADING_MARKER: &str = "currently loading";

/// Retry policy for loading models
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait used when the server gives no estimate
    pub default_delay: Duration,
    /// Upper bound on any single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            default_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// Whether an error message is the model-loading signal
#[must_use]
pub fn is_model_loading(message: &str) -> bool {
    message.to_lowercase().contains(MODEL_LOADING_MARKER)
}

/// Convert an `estimated_time` in seconds into a wait
///
/// Negative and NaN values give `None`. Estimates too large for a
/// [`Duration`] saturate so that [`delay_for`] caps them.
#[must_use]
pub fn estimate_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Compute the wait before retrying
///
/// The server estimate wins when present; either way the result is capped
/// at `policy.max_delay`.
#[must_use]
pub fn delay_for(policy: &RetryPolicy, estimate: Option<Duration>) -> Duration {
    estimate
        .unwrap_or(policy.default_delay)
        .min(policy.max_delay)
}

/// Run `call`, retrying transient failures up to `policy.max_retries` times
///
/// `is_transient` decides which errors qualify, `delay_of` extracts a
/// server-provided wait, and `on_wait` fires before each sleep so the caller
/// can show a loading state. Non-transient errors and the failure of the last
/// permitted attempt are returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt
pub async fn with_transient_retry<T, E, F, Fut, P, D, W>(
    policy: &RetryPolicy,
    mut call: F,
    is_transient: P,
    delay_of: D,
    mut on_wait: W,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
    D: Fn(&E) -> Option<Duration>,
    W: FnMut(&E, Duration),
{
    let mut attempt = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && is_transient(&err) => {
                let delay = delay_for(policy, delay_of(&err));
                attempt += 1;
                tracing::info!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "transient failure, retrying after delay"
                );
                on_wait(&err, delay);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Call a pipeline stage with the model-loading retry contract
///
/// Emits [`PipelineEvent::ModelLoading`] before waiting. A loading signal
/// that survives the retry is reported as a terminal [`Error::Remote`].
///
/// # Errors
///
/// Returns the terminal error of the stage
pub async fn retry_model_loading<T, F, Fut>(
    policy: &RetryPolicy,
    events: &EventBus,
    stage: Stage,
    call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_transient_retry(
        policy,
        call,
        Error::is_model_loading,
        Error::estimated_time,
        |_, delay| {
            events.emit(PipelineEvent::ModelLoading {
                stage,
                estimate: delay,
            });
        },
    )
    .await
    .map_err(Error::into_terminal)
}
