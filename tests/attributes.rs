#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Panics are forgivable while testing"
)]
//! Extended attribute accessors: round-trips, corroboration and the typed
//! unknown-name error

use serde_json::json;
use std::sync::Arc;
use switch_harness::{Attribute, EndpointId, HarnessError, SmartSwitch, SwitchCommand};
use testing::{MockDevice, MockGateway, MockSwitch, mock_device, mock_gateway, mock_switch};

async fn connect(
    ep: u8,
    name: &str,
    gateway: &str,
) -> (SmartSwitch<MockDevice, MockGateway>, Arc<MockSwitch>) {
    let (device, gateway_link, mock) = mock_switch(ep, name, gateway);
    let endpoint = EndpointId::builder()
        .index(ep)
        .name(name)
        .gateway(gateway)
        .build()
        .expect("valid endpoint");
    let harness = SmartSwitch::connect(device, gateway_link, endpoint)
        .await
        .expect("connect should reset the device to IDLE");
    (harness, mock)
}

#[tokio::test]
async fn every_attribute_in_the_table_round_trips() {
    let (mut harness, _mock) = connect(1, "btn1", "zigbee2mqtt/switch1").await;

    for (i, attr) in Attribute::ALL.into_iter().enumerate() {
        let value = json!(format!("value-{i}"));
        harness
            .set_attribute(attr.name(), value.clone())
            .await
            .unwrap_or_else(|err| panic!("write {}: {err}", attr.name()));
        let read = harness
            .get_attribute(attr.name())
            .await
            .unwrap_or_else(|err| panic!("read {}: {err}", attr.name()));
        assert_eq!(read, value, "{} did not round-trip", attr.name());
    }
}

#[tokio::test]
async fn switch_mode_write_is_corroborated_and_settles_to_idle() {
    let (mut harness, mock) = connect(1, "btn1", "zigbee2mqtt/switch1").await;

    harness
        .set_attribute("switch_mode", json!("toggle"))
        .await
        .expect("write switch_mode");

    assert_eq!(mock.attribute("switch_mode"), Some(json!("toggle")));
    assert_eq!(
        mock.published(),
        vec![(
            "zigbee2mqtt/switch1/set".to_string(),
            json!({"switch_mode_btn1": "toggle"})
        )]
    );
}

#[tokio::test]
async fn unknown_attribute_fails_before_any_transport_io() {
    let (mut harness, mock) = connect(1, "btn1", "zigbee2mqtt/switch1").await;

    let err = harness
        .set_attribute("brightness", json!(128))
        .await
        .expect_err("brightness is not in the table");
    assert!(matches!(err, HarnessError::UnknownAttribute(_)));

    let err = harness
        .get_attribute("brightness")
        .await
        .expect_err("brightness is not in the table");
    assert!(matches!(err, HarnessError::UnknownAttribute(_)));

    // neither channel saw a single byte
    assert!(mock.published().is_empty());
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn value_mismatch_when_device_confirms_something_else() {
    // scripted transports: a firmware that clamps the written value
    let (device, device_probe) = mock_device();
    let (gateway, gateway_probe) = mock_gateway();
    device_probe.emit("Switching button 1 state to IDLE");
    let endpoint = EndpointId::builder()
        .index(1)
        .name("btn1")
        .gateway("zigbee2mqtt/switch1")
        .build()
        .expect("valid endpoint");
    let mut harness = SmartSwitch::connect(device, gateway, endpoint)
        .await
        .expect("connect");

    device_probe.emit("ZCL Write Attribute: Cluster 0007 Attrib ff02");
    gateway_probe.publish("zigbee2mqtt/switch1", json!({"max_pause_btn1": "250"}));

    let err = harness
        .set_attribute("max_pause", json!("9999"))
        .await
        .expect_err("confirmed value differs from the written one");
    match err {
        HarnessError::ValueMismatch {
            attribute,
            written,
            observed,
        } => {
            assert_eq!(attribute, "max_pause");
            assert_eq!(written, json!("9999"));
            assert_eq!(observed, json!("250"));
        }
        other => panic!("expected ValueMismatch, got {other}"),
    }
}

#[tokio::test]
async fn attribute_traffic_does_not_disturb_switch_state() {
    let (mut harness, mock) = connect(1, "btn1", "zigbee2mqtt/switch1").await;

    harness
        .switch(SwitchCommand::On, None)
        .await
        .expect("switch ON");
    harness
        .set_attribute("relay_mode", json!("front"))
        .await
        .expect("write relay_mode");
    assert!(mock.state(), "attribute write must not actuate the relay");
}
