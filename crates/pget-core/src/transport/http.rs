//! libcurl GET transport.
//!
//! One `Easy` handle per fetch, driven on the calling task thread. The body is
//! spooled into an anonymous temp file so the callback can stream it without
//! holding whole responses in memory.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::str;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use super::Transport;

/// Error from a single GET.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, DNS, ...).
    #[error(transparent)]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Spooling the body to the temp file failed.
    #[error("spool body: {0}")]
    Spool(#[from] io::Error),
}

/// Tunables applied to every Easy handle.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort when throughput stays below this many bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub max_redirections: u32,
    pub user_agent: Option<String>,
    /// Extra request headers as (name, value).
    pub headers: Vec<(String, String)>,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_redirections: 10,
            user_agent: None,
            headers: Vec::new(),
        }
    }
}

/// Fetched response: status, a few headers, and the spooled body.
#[derive(Debug)]
pub struct CurlResponse {
    pub status: u32,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    /// Bytes actually received (after decoding, if any).
    pub body_len: u64,
    body: File,
}

impl CurlResponse {
    /// Consume the response, returning the body positioned at its start.
    pub fn into_body(self) -> File {
        self.body
    }
}

impl Read for CurlResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Blocking GET over libcurl.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: CurlOptions,
}

impl CurlTransport {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }

    fn configure(&self, easy: &mut curl::easy::Easy, url: &Url) -> Result<(), curl::Error> {
        let opts = &self.options;
        easy.url(url.as_str())?;
        easy.get(true)?;
        easy.follow_location(true)?;
        easy.max_redirections(opts.max_redirections)?;
        easy.connect_timeout(opts.connect_timeout)?;
        easy.low_speed_limit(opts.low_speed_limit)?;
        easy.low_speed_time(opts.low_speed_time)?;
        if let Some(agent) = &opts.user_agent {
            easy.useragent(agent)?;
        }
        if !opts.headers.is_empty() {
            let mut list = curl::easy::List::new();
            for (k, v) in &opts.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(())
    }
}

impl Transport for CurlTransport {
    type Locator = Url;
    type Response = CurlResponse;
    type Error = FetchError;

    fn fetch(&self, url: &Url) -> Result<CurlResponse, FetchError> {
        let mut spool = tempfile::tempfile()?;
        let spool_error: Mutex<Option<io::Error>> = Mutex::new(None);
        let mut headers = ResponseHeaders::default();
        let mut body_len = 0u64;

        let mut easy = curl::easy::Easy::new();
        self.configure(&mut easy, url)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                if let Ok(s) = str::from_utf8(line) {
                    headers.observe(s.trim_end());
                }
                true
            })?;
            transfer.write_function(|data| match spool.write_all(data) {
                Ok(()) => {
                    body_len += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    tracing::warn!("spool write failed: {}", e);
                    if let Ok(mut slot) = spool_error.lock() {
                        slot.get_or_insert(e);
                    }
                    Ok(0) // abort transfer
                }
            })?;
            if let Err(e) = transfer.perform() {
                if e.is_write_error() {
                    if let Some(io_err) = spool_error.lock().ok().and_then(|mut s| s.take()) {
                        return Err(FetchError::Spool(io_err));
                    }
                }
                return Err(FetchError::Curl(e));
            }
        }

        let status = easy.response_code()?;
        if !(200..300).contains(&status) {
            return Err(FetchError::Http(status));
        }

        spool.seek(SeekFrom::Start(0))?;
        tracing::debug!(url = %url, status, bytes = body_len, "fetched");
        Ok(CurlResponse {
            status,
            content_type: headers.content_type,
            content_disposition: headers.content_disposition,
            content_length: headers.content_length,
            body_len,
            body: spool,
        })
    }
}

/// Headers of the final response; a new status line (redirect hop) resets them.
#[derive(Debug, Default)]
struct ResponseHeaders {
    content_type: Option<String>,
    content_disposition: Option<String>,
    content_length: Option<u64>,
}

impl ResponseHeaders {
    fn observe(&mut self, line: &str) {
        if line.starts_with("HTTP/") {
            *self = Self::default();
            return;
        }
        let Some((name, value)) = line.split_once(':') else {
            return;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-type" => self.content_type = Some(value.to_string()),
            "content-disposition" => self.content_disposition = Some(value.to_string()),
            "content-length" => self.content_length = value.parse().ok(),
            _ => {}
        }
    }
}
