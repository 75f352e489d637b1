//! Retry with exponential backoff for transient collaborator failures.

use std::time::Duration;

use crate::core::PipelineError;

/// Default attempt count for transient errors.
pub const DEFAULT_ATTEMPTS: u32 = 3;

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Run `operation`, retrying transient errors up to `attempts` times with
/// exponential backoff (100 ms doubling, capped at 2 s). Non-transient
/// errors return immediately.
pub fn with_retries<T>(
    what: &str,
    attempts: u32,
    mut operation: impl FnMut() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let mut delay = BASE_DELAY;
    for attempt in 1..=attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < attempts => {
                tracing::warn!(%what, attempt, %error, "transient failure, backing off");
                std::thread::sleep(delay);
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(error) => return Err(error),
        }
    }
    // attempts >= 1, so the loop always returns first.
    Err(PipelineError::DatabaseUnavailable(format!(
        "{what}: retries exhausted"
    )))
}
