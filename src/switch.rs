//! The endpoint model: a stateful facade over one physical switch endpoint.
//!
//! [`EndpointId`] owns the identity (index, slug, gateway topic) and every
//! derived name and log template; [`SmartSwitch`] composes the correlator
//! into the named operations tests call. One instance drives one endpoint
//! exclusively; all protocol state is scoped to a single call.

use crate::attrs::Attribute;
use crate::correlate::correlated_request;
use crate::error::HarnessError;
use bon::bon;
use derive_more::Display;
use serde_json::{Value, json};
use std::ops::Not;
use std::str::FromStr;
use transport::{DeviceLink, GatewayLink, Report};

/// On/Off cluster id as the firmware logs it
const ON_OFF_CLUSTER: &str = "0006";
/// On/Off Configuration cluster id as the firmware logs it
const ON_OFF_CONFIG_CLUSTER: &str = "0007";
/// Attribute id of the switch state on the On/Off cluster
const ON_OFF_STATE_ATTR: &str = "0000";
/// Button state the firmware settles into when no input is active
const IDLE: &str = "IDLE";

/// State of the switch as the gateway spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SwitchState {
    /// relay closed
    #[display("ON")]
    On,
    /// relay open
    #[display("OFF")]
    Off,
}

impl SwitchState {
    // the firmware logs state changes as a 0/1 flag
    fn flag(self) -> &'static str {
        match self {
            Self::On => "1",
            Self::Off => "0",
        }
    }
}

impl Not for SwitchState {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl FromStr for SwitchState {
    type Err = HarnessError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(HarnessError::UnrecognisedState(format!("{other:?}"))),
        }
    }
}

/// Actuation command accepted by the gateway's state key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SwitchCommand {
    /// close the relay
    #[display("ON")]
    On,
    /// open the relay
    #[display("OFF")]
    Off,
    /// flip the relay, whatever its current state
    #[display("TOGGLE")]
    Toggle,
}

impl SwitchCommand {
    /// The state this command must leave the switch in, if that is knowable
    /// without asking the device
    pub fn target_state(self) -> Option<SwitchState> {
        match self {
            Self::On => Some(SwitchState::On),
            Self::Off => Some(SwitchState::Off),
            Self::Toggle => None,
        }
    }
}

impl From<SwitchState> for SwitchCommand {
    fn from(state: SwitchState) -> Self {
        match state {
            SwitchState::On => Self::On,
            SwitchState::Off => Self::Off,
        }
    }
}

/// Identity of one physical endpoint, fixed for the lifetime of a harness.
///
/// Every payload key, topic and log template the protocol needs is derived
/// from these three fields, so they are validated once here instead of
/// producing malformed strings downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointId {
    index: u8,
    name: String,
    gateway: String,
}

#[bon]
impl EndpointId {
    /// Build a validated identity. `index` is the 1-based zigbee endpoint
    /// number; `name` is the slug used in payload keys (eg "btn3");
    /// `gateway` is the device's root topic (eg "zigbee2mqtt/switch1").
    #[builder]
    pub fn new(
        index: u8,
        #[builder(into)] name: String,
        #[builder(into)] gateway: String,
    ) -> Result<Self, HarnessError> {
        if index == 0 {
            return Err(HarnessError::InvalidEndpoint(
                "endpoint index must be positive".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(HarnessError::InvalidEndpoint(
                "endpoint name must not be empty".to_string(),
            ));
        }
        if gateway.is_empty() {
            return Err(HarnessError::InvalidEndpoint(
                "gateway name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            index,
            name,
            gateway,
        })
    }
}

impl EndpointId {
    /// 1-based zigbee endpoint number
    pub fn index(&self) -> u8 {
        self.index
    }

    /// 0-based button number used by the debug command interface
    pub fn button(&self) -> u8 {
        self.index - 1
    }

    /// Payload key slug
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device's root gateway topic; state reports arrive here
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Display name of the endpoint, `<gateway>/<index>`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.gateway, self.index)
    }

    /// Payload key of the switch state, `state_<name>`
    pub fn state_key(&self) -> String {
        format!("state_{}", self.name)
    }

    /// Payload key of an attribute, `<attr>_<name>`
    pub fn attr_key(&self, attr: &str) -> String {
        format!("{attr}_{}", self.name)
    }

    /// Action name as the gateway reports it, `<action>_<name>`
    pub fn action_name(&self, action: &str) -> String {
        format!("{action}_{}", self.name)
    }

    /// Control topic for writes
    pub fn set_topic(&self) -> String {
        format!("{}/set", self.gateway)
    }

    /// Control topic for reads
    pub fn get_topic(&self) -> String {
        format!("{}/get", self.gateway)
    }

    // The log templates below must match the firmware's output byte for
    // byte; substring search is the only correctness contract.

    /// Log line for a relay state change. An unknown target (toggle) leaves
    /// the flag out, turning the template into a prefix of the real line.
    pub fn state_change_pattern(&self, expected: Option<SwitchState>) -> String {
        let flag = expected.map(SwitchState::flag).unwrap_or("");
        format!("SwitchEndpoint EP={}: do state change {flag}", self.index)
    }

    /// Log line for a ZCL attribute read on this endpoint
    pub fn zcl_read_pattern(&self, cluster: &str, attr_id: &str) -> String {
        format!(
            "ZCL Read Attribute: EP={} Cluster={cluster} Command=00 Attr={attr_id}",
            self.index
        )
    }

    /// Log line for a ZCL attribute write
    pub fn zcl_write_pattern(&self, attr_id: &str) -> String {
        format!("ZCL Write Attribute: Cluster {ON_OFF_CONFIG_CLUSTER} Attrib {attr_id}")
    }

    /// Log line for a button state-machine transition
    pub fn button_state_pattern(&self, state: &str) -> String {
        format!("Switching button {} state to {state}", self.index)
    }

    /// Log line for a multistate action report
    pub fn multistate_pattern(&self, value: u8) -> String {
        format!(
            "Reporting multistate action EP={} value={value}... status: 00",
            self.index
        )
    }

    /// Log line for a level-control command report
    pub fn level_ctrl_pattern(&self, command: &str) -> String {
        format!("Sending Level Control {command} command status: 00")
    }
}

/// A harness bound to one switch endpoint, driving it over the device log
/// channel and the gateway channel and correlating the two.
pub struct SmartSwitch<D, G> {
    device: D,
    gateway: G,
    endpoint: EndpointId,
}

impl<D: DeviceLink, G: GatewayLink> SmartSwitch<D, G> {
    /// Bind the endpoint: subscribe to its state topic, then force the
    /// device to a known reset state before any test traffic is accepted
    pub async fn connect(
        device: D,
        mut gateway: G,
        endpoint: EndpointId,
    ) -> Result<Self, HarnessError> {
        gateway.subscribe(endpoint.gateway()).await?;
        let mut harness = Self {
            device,
            gateway,
            endpoint,
        };
        harness.reset().await?;
        Ok(harness)
    }

    /// The identity this harness is bound to
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Reset the device and wait until this endpoint's button settles to
    /// IDLE. Called at construction; call again to re-baseline mid-test.
    pub async fn reset(&mut self) -> Result<(), HarnessError> {
        self.device.reset().await?;
        self.wait_button_state(IDLE).await
    }

    /// Write one gateway key and return the value the response report
    /// confirmed for it
    pub async fn set_value(
        &mut self,
        key: &str,
        value: Value,
        confirmation: &str,
    ) -> Result<Value, HarnessError> {
        let set_topic = self.endpoint.set_topic();
        let response_topic = self.endpoint.gateway().to_string();
        let response = correlated_request(
            &mut self.device,
            &mut self.gateway,
            &set_topic,
            json!({ key: value }),
            confirmation,
            &response_topic,
        )
        .await?;
        extract(&response, key)
    }

    /// Read one gateway key; the empty-string value signals a read to the
    /// gateway
    pub async fn get_value(&mut self, key: &str, confirmation: &str) -> Result<Value, HarnessError> {
        let get_topic = self.endpoint.get_topic();
        let response_topic = self.endpoint.gateway().to_string();
        let response = correlated_request(
            &mut self.device,
            &mut self.gateway,
            &get_topic,
            json!({ key: "" }),
            confirmation,
            &response_topic,
        )
        .await?;
        extract(&response, key)
    }

    /// Actuate the relay and return the state the device reported.
    ///
    /// On/Off commands are expected to land on that same state unless the
    /// caller overrides it; a toggle's outcome stays open and is returned
    /// without assertion. After the set request's own response, the device
    /// additionally pushes a state report; both are awaited in turn.
    pub async fn switch(
        &mut self,
        command: SwitchCommand,
        expected: Option<SwitchState>,
    ) -> Result<SwitchState, HarnessError> {
        let expected = expected.or_else(|| command.target_state());
        let confirmation = self.endpoint.state_change_pattern(expected);
        let state_key = self.endpoint.state_key();
        self.set_value(&state_key, json!(command.to_string()), &confirmation)
            .await?;

        let observed = self.wait_state_change().await?;
        if let Some(expected) = expected {
            if observed != expected {
                return Err(HarnessError::StateMismatch { expected, observed });
            }
        }
        Ok(observed)
    }

    /// Read the relay state back over the gateway
    pub async fn get_current_state(&mut self) -> Result<SwitchState, HarnessError> {
        let confirmation = self
            .endpoint
            .zcl_read_pattern(ON_OFF_CLUSTER, ON_OFF_STATE_ATTR);
        let state_key = self.endpoint.state_key();
        let value = self.get_value(&state_key, &confirmation).await?;
        parse_state(&value)
    }

    /// Write an extended attribute by name, assert the confirmed value
    /// round-trips, then wait for the endpoint to settle back to IDLE
    pub async fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), HarnessError> {
        let attr: Attribute = name.parse()?;
        let confirmation = self.endpoint.zcl_write_pattern(attr.wire_id());
        let key = self.endpoint.attr_key(name);
        let confirmed = self.set_value(&key, value.clone(), &confirmation).await?;
        if confirmed != value {
            return Err(HarnessError::ValueMismatch {
                attribute: name.to_string(),
                written: value,
                observed: confirmed,
            });
        }
        self.wait_button_state(IDLE).await
    }

    /// Read an extended attribute by name
    pub async fn get_attribute(&mut self, name: &str) -> Result<Value, HarnessError> {
        let attr: Attribute = name.parse()?;
        let confirmation = self
            .endpoint
            .zcl_read_pattern(ON_OFF_CONFIG_CLUSTER, attr.wire_id());
        let key = self.endpoint.attr_key(name);
        self.get_value(&key, &confirmation).await
    }

    /// Simulate pressing the physical button; fire and forget
    pub async fn press_button(&mut self) -> Result<(), HarnessError> {
        let command = format!("BTN{}_PRESS", self.endpoint.button());
        Ok(self.device.send_str(&command).await?)
    }

    /// Simulate releasing the physical button; fire and forget
    pub async fn release_button(&mut self) -> Result<(), HarnessError> {
        let command = format!("BTN{}_RELEASE", self.endpoint.button());
        Ok(self.device.send_str(&command).await?)
    }

    /// Wait until the button state machine logs a transition to `state`
    pub async fn wait_button_state(&mut self, state: &str) -> Result<(), HarnessError> {
        let pattern = self.endpoint.button_state_pattern(state);
        self.device.wait_str(&pattern).await?;
        Ok(())
    }

    /// Wait until the device logs a multistate action report for `value`
    pub async fn wait_report_multistate(&mut self, value: u8) -> Result<(), HarnessError> {
        let pattern = self.endpoint.multistate_pattern(value);
        self.device.wait_str(&pattern).await?;
        Ok(())
    }

    /// Wait until the device logs a level-control `command` report
    pub async fn wait_report_level_ctrl(&mut self, command: &str) -> Result<(), HarnessError> {
        let pattern = self.endpoint.level_ctrl_pattern(command);
        self.device.wait_str(&pattern).await?;
        Ok(())
    }

    /// Wait until the device logs a state change towards `expected`
    pub async fn wait_device_state_change(
        &mut self,
        expected: Option<SwitchState>,
    ) -> Result<(), HarnessError> {
        let pattern = self.endpoint.state_change_pattern(expected);
        self.device.wait_str(&pattern).await?;
        Ok(())
    }

    /// Wait for the next message on the gateway topic, whatever it carries
    pub async fn wait_gateway_msg(&mut self) -> Result<Report, HarnessError> {
        let topic = self.endpoint.gateway().to_string();
        Ok(self.gateway.wait_msg(&topic).await?)
    }

    /// Wait for the next state push and extract this endpoint's state
    pub async fn wait_state_change(&mut self) -> Result<SwitchState, HarnessError> {
        let key = self.endpoint.state_key();
        let report = self.wait_gateway_msg().await?;
        parse_state(&extract(&report, &key)?)
    }

    /// Wait for the next push and extract an attribute field by name
    pub async fn wait_attribute_change(&mut self, attribute: &str) -> Result<Value, HarnessError> {
        let key = self.endpoint.attr_key(attribute);
        let report = self.wait_gateway_msg().await?;
        extract(&report, &key)
    }

    /// Wait for the next push and extract the reported action
    pub async fn wait_action(&mut self) -> Result<String, HarnessError> {
        let report = self.wait_gateway_msg().await?;
        report
            .get_str("action")
            .map(str::to_string)
            .ok_or_else(|| HarnessError::MissingField("action".to_string()))
    }
}

fn extract(report: &Report, key: &str) -> Result<Value, HarnessError> {
    report
        .get(key)
        .cloned()
        .ok_or_else(|| HarnessError::MissingField(key.to_string()))
}

fn parse_state(value: &Value) -> Result<SwitchState, HarnessError> {
    match value.as_str() {
        Some(text) => text.parse(),
        None => Err(HarnessError::UnrecognisedState(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Panics are forgivable while testing")]

    use super::*;

    fn endpoint() -> EndpointId {
        EndpointId::builder()
            .index(3)
            .name("btn3")
            .gateway("zigbee2mqtt/switch1")
            .build()
            .unwrap()
    }

    #[test]
    fn derived_names() {
        let ep = endpoint();
        assert_eq!(ep.button(), 2);
        assert_eq!(ep.full_name(), "zigbee2mqtt/switch1/3");
        assert_eq!(ep.state_key(), "state_btn3");
        assert_eq!(ep.attr_key("switch_mode"), "switch_mode_btn3");
        assert_eq!(ep.action_name("single"), "single_btn3");
        assert_eq!(ep.set_topic(), "zigbee2mqtt/switch1/set");
        assert_eq!(ep.get_topic(), "zigbee2mqtt/switch1/get");
    }

    #[test]
    fn state_change_patterns() {
        let ep = endpoint();
        assert_eq!(
            ep.state_change_pattern(Some(SwitchState::On)),
            "SwitchEndpoint EP=3: do state change 1"
        );
        assert_eq!(
            ep.state_change_pattern(Some(SwitchState::Off)),
            "SwitchEndpoint EP=3: do state change 0"
        );
        // the don't-care pattern is a prefix of the real line
        assert_eq!(
            ep.state_change_pattern(None),
            "SwitchEndpoint EP=3: do state change "
        );
    }

    #[test]
    fn zcl_patterns() {
        let ep = endpoint();
        assert_eq!(
            ep.zcl_read_pattern("0006", "0000"),
            "ZCL Read Attribute: EP=3 Cluster=0006 Command=00 Attr=0000"
        );
        assert_eq!(
            ep.zcl_read_pattern("0007", "ff02"),
            "ZCL Read Attribute: EP=3 Cluster=0007 Command=00 Attr=ff02"
        );
        assert_eq!(
            ep.zcl_write_pattern("ff00"),
            "ZCL Write Attribute: Cluster 0007 Attrib ff00"
        );
    }

    #[test]
    fn device_event_patterns() {
        let ep = endpoint();
        assert_eq!(
            ep.button_state_pattern("IDLE"),
            "Switching button 3 state to IDLE"
        );
        assert_eq!(
            ep.multistate_pattern(2),
            "Reporting multistate action EP=3 value=2... status: 00"
        );
        assert_eq!(
            ep.level_ctrl_pattern("Move"),
            "Sending Level Control Move command status: 00"
        );
    }

    #[test]
    fn rejects_invalid_identity() {
        let zero = EndpointId::builder()
            .index(0)
            .name("btn1")
            .gateway("zigbee2mqtt/switch1")
            .build();
        assert!(matches!(zero, Err(HarnessError::InvalidEndpoint(_))));

        let unnamed = EndpointId::builder()
            .index(1)
            .name("")
            .gateway("zigbee2mqtt/switch1")
            .build();
        assert!(matches!(unnamed, Err(HarnessError::InvalidEndpoint(_))));

        let no_gateway = EndpointId::builder().index(1).name("btn1").gateway("").build();
        assert!(matches!(no_gateway, Err(HarnessError::InvalidEndpoint(_))));
    }

    #[test]
    fn command_wire_spellings() {
        assert_eq!(SwitchCommand::On.to_string(), "ON");
        assert_eq!(SwitchCommand::Off.to_string(), "OFF");
        assert_eq!(SwitchCommand::Toggle.to_string(), "TOGGLE");
        assert_eq!(SwitchCommand::On.target_state(), Some(SwitchState::On));
        assert_eq!(SwitchCommand::Toggle.target_state(), None);
        assert_eq!(!SwitchState::On, SwitchState::Off);
        assert_eq!("ON".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert!("dimmed".parse::<SwitchState>().is_err());
    }
}
