//! Transport collaborator: how a single locator is fetched.
//!
//! The coordinator only needs a blocking `fetch` that returns a response
//! handle or an error. `CurlTransport` is the libcurl-backed implementation
//! used by the CLI; tests plug in their own.

mod http;

use std::fmt;

pub use self::http::{CurlOptions, CurlResponse, CurlTransport, FetchError};

/// Blocking fetch of one locator. Called concurrently from many task threads.
pub trait Transport: Sync {
    /// Identifier of a remote resource.
    type Locator: fmt::Display + Sync;
    /// Handle handed to the batch callback, which owns and drops it.
    type Response;
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch(&self, locator: &Self::Locator) -> Result<Self::Response, Self::Error>;
}
