use crate::attrs::UnknownAttribute;
use crate::switch::SwitchState;
use serde_json::Value;
use thiserror::Error;
use transport::ChannelError;

/// Everything that can go wrong while driving the device under test.
///
/// Failures always bubble up to the test uncaught; the harness performs no
/// retry or fallback of its own.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A transport failed or a bounded wait elapsed
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// An accessor was called with a name outside the attribute table;
    /// raised before any transport I/O
    #[error(transparent)]
    UnknownAttribute(#[from] UnknownAttribute),
    /// The gateway reported a state other than the one the command implied
    #[error("State mismatch: expected {expected}, device reported {observed}")]
    StateMismatch {
        /// State the issued command implied
        expected: SwitchState,
        /// State the gateway actually pushed
        observed: SwitchState,
    },
    /// An attribute write round-tripped to a different value
    #[error("Value mismatch for {attribute:?}: wrote {written}, device confirmed {observed}")]
    ValueMismatch {
        /// Attribute that was written
        attribute: String,
        /// Value sent to the gateway
        written: Value,
        /// Value the gateway confirmed
        observed: Value,
    },
    /// The gateway's report did not carry the requested key
    #[error("Field {0:?} missing from gateway report")]
    MissingField(String),
    /// Endpoint identity failed validation at construction
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// A state field held something other than ON/OFF
    #[error("Unrecognised switch state {0} in gateway report")]
    UnrecognisedState(String),
}
