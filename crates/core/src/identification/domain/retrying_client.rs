use std::time::Duration;

use crate::identification::domain::recognition_service::{
    RecognitionError, RecognitionResponse, RecognitionService,
};
use crate::shared::constants::{MAX_PAYLOAD_BYTES, MAX_SERVICE_ATTEMPTS};

/// Bounded exponential backoff: attempt `n` (0-based) waits
/// `base_delay * 2^n` after failing. No jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SERVICE_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Calls the recognition service with a payload size check and retries.
pub struct RetryingServiceClient<'a> {
    service: &'a dyn RecognitionService,
    policy: RetryPolicy,
    max_payload: usize,
}

impl<'a> RetryingServiceClient<'a> {
    pub fn new(service: &'a dyn RecognitionService, policy: RetryPolicy) -> Self {
        Self {
            service,
            policy,
            max_payload: MAX_PAYLOAD_BYTES,
        }
    }

    /// Sends `payload`, retrying transient failures.
    ///
    /// An oversized payload fails immediately without a call. Fatal errors
    /// from the service are returned as-is. Once every attempt has failed
    /// transiently the result is a `Fatal` error carrying the last reason.
    pub fn call(&self, payload: &[u8]) -> Result<RecognitionResponse, RecognitionError> {
        if payload.len() > self.max_payload {
            return Err(RecognitionError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload,
            });
        }

        let mut last_error = String::from("no attempts made");
        for attempt in 0..self.policy.max_attempts {
            match self.service.recognize(payload) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    log::warn!(
                        "Recognition attempt {} failed (retry in {}s): {e}",
                        attempt + 1,
                        delay.as_secs_f64()
                    );
                    last_error = e.to_string();
                    std::thread::sleep(delay);
                }
                Err(fatal) => return Err(fatal),
            }
        }

        Err(RecognitionError::Fatal(format!(
            "gave up after {} attempts: {last_error}",
            self.policy.max_attempts
        )))
    }
}
