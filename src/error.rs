//! Error type for the request channel boundary.
//!
//! A missing item ("not found") is not an error anywhere in this crate; it
//! is represented as `Ok(None)`. `ChannelError` covers genuine failures of
//! the process/network boundary only.

use thiserror::Error;

/// Failure of a request channel operation.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP transport failure (connect, timeout, decode).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with an unexpected status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The market log source could not be read or parsed.
    #[error("market log error: {0}")]
    Logs(String),

    /// The channel is no longer serviced.
    #[error("channel closed")]
    Closed,
}
