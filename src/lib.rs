//! Correlation harness for a zigbee smart-switch firmware.
//!
//! The device under test is observable on two independent channels: its
//! debug log on the serial port, and its state mirrored onto zigbee2mqtt
//! topics. Neither channel carries a transaction id linking it to the other,
//! so every assertion about the device rests on a small protocol: arm a
//! listener on one channel, trigger an action, wait for the corroborating
//! log line, then collect the gateway's response
//! ([`correlated_request`]).
//!
//! [`SmartSwitch`] wraps that primitive into the named operations tests
//! drive (actuate the relay, read and write attributes, simulate button
//! input, wait for pushed reports), bound to one endpoint's
//! [`EndpointId`]. Transports are pluggable through the [`DeviceLink`] and
//! [`GatewayLink`] traits; real implementations live in the `uart` and
//! `gateway` crates, in-memory mocks in the `testing` crate.

mod attrs;
mod bind;
mod correlate;
mod error;
mod switch;

pub use attrs::{Attribute, UnknownAttribute};
pub use bind::{send_bind_request, send_unbind_request};
pub use correlate::correlated_request;
pub use error::HarnessError;
pub use switch::{EndpointId, SmartSwitch, SwitchCommand, SwitchState};
pub use transport::{ChannelError, DeviceLink, GatewayLink, Report};

/// Serial implementation of the device channel
pub mod serial {
    pub use ::uart::*;
}

/// MQTT implementation of the gateway channel
pub mod mqtt {
    pub use ::gateway::*;
}
