//! The cross-channel request/response primitive.
//!
//! The device under test has no transaction ids spanning its two observation
//! channels; the only way to tie a log line and a gateway message to the same
//! action is protocol ordering. The sequence here is the one every harness
//! operation builds on: arm, trigger, corroborate, collect.

use crate::error::HarnessError;
use serde_json::Value;
use tracing::debug;
use transport::{DeviceLink, GatewayLink, Report};

/// Perform one request correlated across both channels.
///
/// 1. Arm: subscribe to `response_topic`, strictly before the trigger so the
///    response cannot slip past unobserved.
/// 2. Trigger: publish `payload` to `request_topic`.
/// 3. Corroborate: wait until the device log contains `confirmation`, the
///    proof that the firmware itself processed the request, not merely that
///    the broker accepted it. A timeout here is a device behaviour violation.
/// 4. Collect: wait for the next message on `response_topic` and return it.
///    A timeout here points at the gateway, or at a device that silently
///    dropped the request.
///
/// The response may well arrive before the corroborating log line; the armed
/// subscription buffers it, so only arm-before-trigger ordering matters.
pub async fn correlated_request<D: DeviceLink, G: GatewayLink>(
    device: &mut D,
    gateway: &mut G,
    request_topic: &str,
    payload: Value,
    confirmation: &str,
    response_topic: &str,
) -> Result<Report, HarnessError> {
    gateway.subscribe(response_topic).await?;

    debug!(request_topic, %payload, "triggering request");
    gateway.publish(request_topic, payload).await?;

    device.wait_str(confirmation).await?;

    let response = gateway.wait_msg(response_topic).await?;
    debug!(response_topic, "correlated response received");
    Ok(response)
}
