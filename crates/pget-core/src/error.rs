//! Error types surfaced by the coordinator.

use thiserror::Error;

/// Boxed error carried by batch failures (transport errors and callback errors alike).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rejected coordinator configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `max_concurrency` of zero would leave every task waiting for a slot forever.
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,
    /// Timeout from config was negative, NaN or infinite.
    #[error("timeout must be a finite, non-negative number of seconds (got {0})")]
    InvalidTimeout(f64),
}

/// The single outcome reported by a failed batch.
///
/// Only the first failure of a batch is kept; later ones are logged and dropped.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The transport could not fetch the locator.
    #[error("fetch {locator} failed")]
    Transport {
        locator: String,
        #[source]
        source: BoxError,
    },
    /// The caller's callback returned an error for the locator.
    #[error("callback for {locator} failed")]
    Callback {
        locator: String,
        #[source]
        source: BoxError,
    },
    /// Transport or callback panicked while handling the locator.
    #[error("task for {locator} panicked: {message}")]
    TaskPanicked { locator: String, message: String },
}

impl BatchError {
    /// Locator of the task that reported this error.
    pub fn locator(&self) -> &str {
        match self {
            BatchError::Transport { locator, .. }
            | BatchError::Callback { locator, .. }
            | BatchError::TaskPanicked { locator, .. } => locator,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, BatchError::Transport { .. })
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, BatchError::Callback { .. })
    }
}
