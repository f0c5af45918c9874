use std::time::Duration;
use thiserror::Error;

/// Errors shared by every channel implementation
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A bounded wait elapsed without the expected log line or message
    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout {
        /// What was being waited for, for diagnostics
        what: String,
        /// The configured wait bound
        after: Duration,
    },
    /// The channel closed while waiting, eg the poller task ended
    #[error("Channel closed")]
    Closed,
    /// `wait_msg` was called for a topic that was never subscribed
    #[error("Not subscribed to topic {0:?}")]
    NotSubscribed(String),
    /// An I/O error from the underlying port or socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A payload could not be serialized or parsed
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    /// Any other error while communicating with a transport
    #[error("Communication error: {0}")]
    Communication(String),
}

impl ChannelError {
    /// Build the timeout variant for a wait on `what`
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }
}
