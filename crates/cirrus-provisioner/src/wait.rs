use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ProvisionerError;

/// Backoff for polling a dependency until it is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up once this much time has passed.
    pub timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 15_000,
            multiplier: 2.0,
            timeout_secs: 600,
        }
    }
}

impl WaitConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay that follows `current`, capped at the maximum.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(current.as_secs_f64() * self.multiplier).min(self.max_delay())
    }

    pub fn validate(&self) -> Result<(), ProvisionerError> {
        if self.initial_delay_ms == 0 {
            return Err(ProvisionerError::Config(
                "wait.initial_delay_ms must be greater than zero".into(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ProvisionerError::Config(
                "wait.max_delay_ms must not be less than wait.initial_delay_ms".into(),
            ));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ProvisionerError::Config(format!(
                "wait.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// One observation of a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Ready,
    /// Not ready yet; carries the observed state.
    Pending(String),
    /// Will never become ready; carries the observed state.
    Failed(String),
}

/// Poll `probe` with exponential backoff until it reports ready, reports a
/// terminal failure, or the configured timeout elapses.
pub async fn poll_until<F, Fut>(
    config: &WaitConfig,
    dependency: &str,
    wanted: &'static str,
    mut probe: F,
) -> Result<(), ProvisionerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe, ProvisionerError>>,
{
    let started = Instant::now();
    let timeout = config.timeout();
    let mut delay = config.initial_delay();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match probe().await? {
            Probe::Ready => {
                tracing::debug!(dependency, wanted, attempt, "dependency ready");
                return Ok(());
            }
            Probe::Failed(state) => {
                return Err(ProvisionerError::DependencyFailed {
                    dependency: dependency.to_string(),
                    wanted,
                    state,
                });
            }
            Probe::Pending(state) => {
                tracing::info!(dependency, state = %state, wanted, attempt, "waiting for dependency");
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(ProvisionerError::DependencyTimeout {
                dependency: dependency.to_string(),
                wanted,
                waited: elapsed,
            });
        }

        tokio::time::sleep(delay.min(timeout - elapsed)).await;
        delay = config.next_delay(delay);
    }
}
