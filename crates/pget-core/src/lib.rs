//! pget core: fetch a batch of resources with bounded parallelism, a shared
//! deadline, and first-error-wins failure reporting.

pub mod config;
pub mod logging;

pub mod cancel;
pub mod checksum;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod naming;
pub mod outcome;
pub mod transport;

pub use coordinator::{BatchSummary, Coordinator};
pub use error::{BatchError, ConfigError};
pub use transport::Transport;
