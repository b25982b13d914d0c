//! Fault-injecting transport for exercising error paths.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::cache::lock::acquire;

use super::{Transport, TransportError, TransportRequest, TransportResponse};

const DEFAULT_WEIGHT: f64 = 0.1;
const DEFAULT_ERROR_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT_DELAY: Duration = Duration::from_millis(5000);

/// How often and how slowly injected faults fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosConfig {
    /// Fraction of calls that fail, in `0.0..=1.0`.
    pub weight: f64,
    /// Upper bound of the random delay before an "internal error" fault.
    pub error_delay: Duration,
    /// Delay before a "timeout" fault.
    pub timeout_delay: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            weight: DEFAULT_WEIGHT,
            error_delay: DEFAULT_ERROR_DELAY,
            timeout_delay: DEFAULT_TIMEOUT_DELAY,
        }
    }
}

impl ChaosConfig {
    /// Parse a weight the way the `CHAOS` switch historically did: anything
    /// that is not a number in range falls back to the default.
    pub fn weight_or_default(raw: Option<f64>) -> f64 {
        match raw {
            Some(weight) if weight.is_finite() && (0.0..=1.0).contains(&weight) => weight,
            _ => DEFAULT_WEIGHT,
        }
    }
}

/// Wraps a transport and fails a configurable share of its calls.
pub struct ChaosTransport {
    inner: Arc<dyn Transport>,
    config: ChaosConfig,
    rng: Mutex<fastrand::Rng>,
}

impl ChaosTransport {
    pub fn new(inner: Arc<dyn Transport>, config: ChaosConfig) -> Self {
        Self::with_rng(inner, config, fastrand::Rng::new())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(inner: Arc<dyn Transport>, config: ChaosConfig, seed: u64) -> Self {
        Self::with_rng(inner, config, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(inner: Arc<dyn Transport>, config: ChaosConfig, rng: fastrand::Rng) -> Self {
        Self {
            inner,
            config,
            rng: Mutex::new(rng),
        }
    }

    fn roll(&self) -> Option<Fault> {
        let mut rng = acquire(&self.rng, "chaos.roll");
        if rng.f64() >= self.config.weight {
            return None;
        }
        if rng.bool() {
            Some(Fault::InternalError(
                self.config.error_delay.mul_f64(rng.f64()),
            ))
        } else {
            Some(Fault::Timeout(self.config.timeout_delay))
        }
    }
}

enum Fault {
    InternalError(Duration),
    Timeout(Duration),
}

#[async_trait]
impl Transport for ChaosTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        match self.roll() {
            None => self.inner.send(request).await,
            Some(Fault::InternalError(delay)) => {
                tokio::time::sleep(delay).await;
                warn!(url = %request.url, fault = "internal_error", "injected transport fault");
                Err(TransportError::new("Internal server error"))
            }
            Some(Fault::Timeout(delay)) => {
                tokio::time::sleep(delay).await;
                warn!(url = %request.url, fault = "timeout", "injected transport fault");
                Err(TransportError::timeout("Connection timeout"))
            }
        }
    }
}
