//! Channel contracts for the smart-switch harness.
//!
//! A device under test is observed through two independent channels: the
//! firmware's textual log stream on the serial port, and the zigbee2mqtt
//! gateway's keyed state topics. This crate defines the two traits the
//! harness consumes, the [`Report`] document carried by the gateway side, and
//! the shared [`ChannelError`] taxonomy. Implementations own their timeout
//! and polling strategy; the harness only relies on the bounded-wait
//! contracts below.

mod error;
mod report;

pub use error::ChannelError;
pub use report::Report;

use serde_json::Value;

/// The serial/log side of the device under test.
///
/// A line-oriented, append-only stream of firmware debug output, plus a
/// command input the firmware parses line by line.
pub trait DeviceLink {
    /// Write a command line to the device, fire and forget
    async fn send_str(&mut self, command: &str) -> Result<(), ChannelError>;

    /// Block until a log line containing `pattern` verbatim is observed,
    /// returning that line. Bounded; a timeout means the device never
    /// produced the expected output.
    async fn wait_str(&mut self, pattern: &str) -> Result<String, ChannelError>;

    /// Force the device back to a known power-on state
    async fn reset(&mut self) -> Result<(), ChannelError>;
}

/// The pub/sub side of the device under test.
///
/// Implementations must buffer messages for a subscribed topic from the
/// moment `subscribe` returns: a subscription registered before a trigger is
/// sent observes every message published after that point, even if the
/// harness only calls [`wait_msg`](GatewayLink::wait_msg) later. Nothing
/// published before the subscription is replayed.
pub trait GatewayLink {
    /// Register interest in a topic. Must complete before the publish whose
    /// response it is meant to capture. Idempotent.
    async fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError>;

    /// Publish a keyed payload to a topic, fire and forget
    async fn publish(&mut self, topic: &str, payload: Value) -> Result<(), ChannelError>;

    /// Block until the next message for a subscribed topic, bounded
    async fn wait_msg(&mut self, topic: &str) -> Result<Report, ChannelError>;

    /// Fire-and-forget control-plane request (bind/unbind); no response
    /// correlation is performed
    async fn request(&mut self, topic: &str, payload: Value) -> Result<(), ChannelError>;
}
