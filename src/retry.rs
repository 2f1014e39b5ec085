use crate::invoker::DeadlineInvoker;
use crate::types::GenerationRequest;
use std::time::Duration;
use tracing::{error, warn};

/// Fixed attempt count with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

/// `unit * base^attempt`, saturating.
pub fn exponential_delay(unit: Duration, base: u32, attempt: u32) -> Duration {
    let factor = base.saturating_pow(attempt);
    unit.saturating_mul(factor)
}

/// Retries generation calls through a [`DeadlineInvoker`].
///
/// Every failure kind is retried the same way. Exhaustion yields `None`
/// rather than an error so callers have to decide what a missing result
/// means for them.
#[derive(Clone)]
pub struct RetryingCaller {
    invoker: DeadlineInvoker,
    policy: RetryPolicy,
}

impl RetryingCaller {
    pub fn new(invoker: DeadlineInvoker, policy: RetryPolicy) -> Self {
        Self { invoker, policy }
    }

    pub async fn call(&self, request: GenerationRequest) -> Option<String> {
        let attempts = self.policy.attempts;
        let step = request.step;
        for attempt in 1..=attempts {
            match self.invoker.invoke(request.clone()).await {
                Ok(text) => return Some(text),
                Err(cause) => {
                    if attempt < attempts {
                        warn!(
                            step,
                            attempt,
                            attempts,
                            "{step} generation attempt {attempt} failed due to {cause}. retrying in {:?}",
                            self.policy.delay
                        );
                        tokio::time::sleep(self.policy.delay).await;
                    } else {
                        warn!(step, attempt, attempts, "{step} generation attempt {attempt} failed due to {cause}");
                    }
                }
            }
        }
        error!(step, attempts, "max {step} generation retries reached");
        None
    }
}
