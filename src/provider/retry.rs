use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::Provider;
use crate::errors::Result;
use crate::wire::{ApiKey, Instruction};

/// Bounded exponential backoff for transient backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 500, max_delay_ms: 8_000 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`: base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Call `provider`, retrying only errors marked retryable. Authentication,
/// bad requests and similar permanent failures return on the first attempt.
pub async fn invoke_with_retry(
    provider: &dyn Provider,
    ins: &Instruction,
    credential: Option<&ApiKey>,
    policy: &RetryPolicy,
) -> Result<String> {
    let mut attempt = 0u32;
    loop {
        match provider.invoke(ins, credential).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
