#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Panics are forgivable while testing"
)]
//! Properties of the correlator primitive and of the channel contract it
//! relies on, exercised against scripted transports

use serde_json::json;
use std::time::Duration;
use switch_harness::{
    ChannelError, GatewayLink, HarnessError, correlated_request, send_bind_request,
    send_unbind_request,
};
use testing::{mock_device, mock_gateway};

#[tokio::test]
async fn subscription_observes_messages_published_after_it() {
    let (mut gateway, probe) = mock_gateway();

    gateway.subscribe("zigbee2mqtt/switch1").await.unwrap();
    probe.publish("zigbee2mqtt/switch1", json!({"state_btn1": "ON"}));

    let report = gateway.wait_msg("zigbee2mqtt/switch1").await.unwrap();
    assert_eq!(report.get_str("state_btn1"), Some("ON"));
}

#[tokio::test]
async fn no_backlog_replay_for_late_subscribers() {
    let (mut gateway, probe) = mock_gateway();
    gateway.set_timeout(Duration::from_millis(50));

    // published before the subscription: must never be delivered
    probe.publish("zigbee2mqtt/switch1", json!({"state_btn1": "ON"}));
    gateway.subscribe("zigbee2mqtt/switch1").await.unwrap();

    let err = gateway.wait_msg("zigbee2mqtt/switch1").await.unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { .. }));
}

#[tokio::test]
async fn waiting_without_a_subscription_is_an_error() {
    let (mut gateway, _probe) = mock_gateway();
    let err = gateway.wait_msg("zigbee2mqtt/switch1").await.unwrap_err();
    assert!(matches!(err, ChannelError::NotSubscribed(_)));
}

#[tokio::test]
async fn messages_for_other_topics_do_not_satisfy_a_wait() {
    let (mut gateway, probe) = mock_gateway();
    gateway.set_timeout(Duration::from_millis(50));

    gateway.subscribe("zigbee2mqtt/switch1").await.unwrap();
    gateway.subscribe("zigbee2mqtt/switch2").await.unwrap();
    probe.publish("zigbee2mqtt/switch2", json!({"state_btn1": "ON"}));

    let err = gateway.wait_msg("zigbee2mqtt/switch1").await.unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { .. }));

    // the other topic's message was buffered, not lost
    let report = gateway.wait_msg("zigbee2mqtt/switch2").await.unwrap();
    assert_eq!(report.get_str("state_btn1"), Some("ON"));
}

#[tokio::test]
async fn correlated_request_returns_the_full_report() {
    let (mut device, device_probe) = mock_device();
    let (mut gateway, gateway_probe) = mock_gateway();

    device_probe.emit("SwitchEndpoint EP=3: do state change 1");
    // arm up front so the scripted response is buffered, proving the
    // response may arrive before the corroboration is even awaited
    gateway.subscribe("zigbee2mqtt/switch1").await.unwrap();
    gateway_probe.publish(
        "zigbee2mqtt/switch1",
        json!({"state_btn3": "ON", "linkquality": 134, "update_available": false}),
    );

    let report = correlated_request(
        &mut device,
        &mut gateway,
        "zigbee2mqtt/switch1/set",
        json!({"state_btn3": "ON"}),
        "SwitchEndpoint EP=3: do state change 1",
        "zigbee2mqtt/switch1",
    )
    .await
    .unwrap();

    // the requested key is there and the extra fields survive untouched
    assert_eq!(report.get_str("state_btn3"), Some("ON"));
    assert_eq!(report.len(), 3);

    // the trigger reached the gateway exactly once
    assert_eq!(
        gateway_probe.published(),
        vec![(
            "zigbee2mqtt/switch1/set".to_string(),
            json!({"state_btn3": "ON"})
        )]
    );
}

#[tokio::test]
async fn silent_device_fails_the_corroboration_leg() {
    let (mut device, _device_probe) = mock_device();
    let (mut gateway, gateway_probe) = mock_gateway();
    device.set_timeout(Duration::from_millis(50));

    gateway.subscribe("zigbee2mqtt/switch1").await.unwrap();
    // the gateway even answers, but the device never corroborates
    gateway_probe.publish("zigbee2mqtt/switch1", json!({"state_btn1": "ON"}));

    let err = correlated_request(
        &mut device,
        &mut gateway,
        "zigbee2mqtt/switch1/set",
        json!({"state_btn1": "ON"}),
        "SwitchEndpoint EP=1: do state change 1",
        "zigbee2mqtt/switch1",
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Channel(ChannelError::Timeout { .. })
    ));
}

#[tokio::test]
async fn silent_gateway_fails_the_collect_leg() {
    let (mut device, device_probe) = mock_device();
    let (mut gateway, _gateway_probe) = mock_gateway();
    gateway.set_timeout(Duration::from_millis(50));

    device_probe.emit("SwitchEndpoint EP=1: do state change 0");

    let err = correlated_request(
        &mut device,
        &mut gateway,
        "zigbee2mqtt/switch1/set",
        json!({"state_btn1": "OFF"}),
        "SwitchEndpoint EP=1: do state change 0",
        "zigbee2mqtt/switch1",
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Channel(ChannelError::Timeout { .. })
    ));
}

#[tokio::test]
async fn bind_requests_carry_the_control_payload() {
    let (mut gateway, probe) = mock_gateway();

    send_bind_request(
        &mut gateway,
        &["genOnOff"],
        "zigbee2mqtt/switch1/3",
        "Coordinator",
    )
    .await
    .unwrap();
    send_unbind_request(
        &mut gateway,
        &["genOnOff", "genLevelCtrl"],
        "zigbee2mqtt/switch1/3",
        "Coordinator",
    )
    .await
    .unwrap();

    let published = probe.published();
    assert_eq!(
        published[0],
        (
            "device/bind".to_string(),
            json!({
                "clusters": ["genOnOff"],
                "from": "zigbee2mqtt/switch1/3",
                "to": "Coordinator",
                "skip_disable_reporting": "true",
            })
        )
    );
    assert_eq!(published[1].0, "device/unbind");
    assert_eq!(published[1].1["clusters"], json!(["genOnOff", "genLevelCtrl"]));
}
