//! Bind/unbind helpers for the gateway's control plane.
//!
//! Binding wires a cluster of one device endpoint directly to another so
//! reports and commands flow without the coordinator in the loop. The
//! gateway handles these as fire-and-forget requests; no response is
//! correlated.

use crate::error::HarnessError;
use serde::Serialize;
use transport::{ChannelError, GatewayLink};

#[derive(Debug, Serialize)]
struct BindRequest<'a> {
    clusters: &'a [&'a str],
    #[serde(rename = "from")]
    src: &'a str,
    #[serde(rename = "to")]
    dst: &'a str,
    // reporting stays configured as-is while rebinding back and forth
    skip_disable_reporting: &'static str,
}

async fn send<G: GatewayLink>(
    gateway: &mut G,
    topic: &str,
    clusters: &[&str],
    src: &str,
    dst: &str,
) -> Result<(), HarnessError> {
    let payload = serde_json::to_value(BindRequest {
        clusters,
        src,
        dst,
        skip_disable_reporting: "true",
    })
    .map_err(ChannelError::Payload)?;
    Ok(gateway.request(topic, payload).await?)
}

/// Ask the gateway to bind `clusters` from `src` to `dst`
pub async fn send_bind_request<G: GatewayLink>(
    gateway: &mut G,
    clusters: &[&str],
    src: &str,
    dst: &str,
) -> Result<(), HarnessError> {
    send(gateway, "device/bind", clusters, src, dst).await
}

/// Ask the gateway to unbind `clusters` from `src` to `dst`
pub async fn send_unbind_request<G: GatewayLink>(
    gateway: &mut G,
    clusters: &[&str],
    src: &str,
    dst: &str,
) -> Result<(), HarnessError> {
    send(gateway, "device/unbind", clusters, src, dst).await
}
