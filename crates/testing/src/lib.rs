//! A crate with utilities useful for testing
//!
//! In-memory stand-ins for both channels of the device under test: a
//! [`MockDevice`] for the serial log, a [`MockGateway`] for the zigbee2mqtt
//! side, and a [`MockSwitch`] firmware simulator that reacts to gateway and
//! console traffic the way the real switch does. The mock gateway reproduces
//! the property the harness depends on: a subscription observes messages
//! published after it was registered, and nothing published before.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Panics are forgivable in test support code"
)]

use futures::StreamExt;
use log::{debug, info, warn};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::spawn;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, timeout};
use tokio_stream::wrappers::BroadcastStream;
use transport::{ChannelError, DeviceLink, GatewayLink, Report};

const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// A command the harness issued to the mock device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// A command line written to the console
    Line(String),
    /// A transport-level reset
    Reset,
}

/// Create a mock serial device and the probe controlling it
pub fn mock_device() -> (MockDevice, DeviceProbe) {
    let (lines, incoming) = mpsc::unbounded_channel();
    let (commands, _) = broadcast::channel(64);
    let sent = Arc::new(Mutex::new(Vec::new()));
    let resets = Arc::new(AtomicUsize::new(0));
    (
        MockDevice {
            incoming,
            commands: commands.clone(),
            sent: sent.clone(),
            resets: resets.clone(),
            timeout: DEFAULT_WAIT,
        },
        DeviceProbe {
            lines,
            commands,
            sent,
            resets,
        },
    )
}

/// In-memory replacement for the serial console of the device under test
pub struct MockDevice {
    incoming: mpsc::UnboundedReceiver<String>,
    commands: broadcast::Sender<DeviceCommand>,
    sent: Arc<Mutex<Vec<String>>>,
    resets: Arc<AtomicUsize>,
    timeout: Duration,
}

impl MockDevice {
    /// Override the wait bound, eg to keep timeout tests fast
    pub fn set_timeout(&mut self, wait: Duration) {
        self.timeout = wait;
    }
}

impl DeviceLink for MockDevice {
    async fn send_str(&mut self, command: &str) -> Result<(), ChannelError> {
        debug!("mock device received command: {command}");
        self.sent
            .lock()
            .expect("sent log poisoned")
            .push(command.to_string());
        // send only fails when nothing simulates the firmware, which is fine
        let _ = self.commands.send(DeviceCommand::Line(command.to_string()));
        Ok(())
    }

    async fn wait_str(&mut self, pattern: &str) -> Result<String, ChannelError> {
        timeout(self.timeout, async {
            loop {
                let line = self.incoming.recv().await.ok_or(ChannelError::Closed)?;
                debug!("mock device log: {line}");
                if line.contains(pattern) {
                    return Ok(line);
                }
            }
        })
        .await
        .map_err(|_| {
            ChannelError::timeout(format!("log line containing {pattern:?}"), self.timeout)
        })?
    }

    async fn reset(&mut self) -> Result<(), ChannelError> {
        debug!("mock device reset");
        self.resets.fetch_add(1, Ordering::Relaxed);
        let _ = self.commands.send(DeviceCommand::Reset);
        Ok(())
    }
}

/// Test-side handle to a [`MockDevice`]
#[derive(Clone)]
pub struct DeviceProbe {
    lines: mpsc::UnboundedSender<String>,
    commands: broadcast::Sender<DeviceCommand>,
    sent: Arc<Mutex<Vec<String>>>,
    resets: Arc<AtomicUsize>,
}

impl DeviceProbe {
    /// Emit a log line as the firmware would
    pub fn emit(&self, line: impl Into<String>) {
        let _ = self.lines.send(line.into());
    }

    /// Every command line the harness has sent, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent log poisoned").clone()
    }

    /// Number of transport-level resets requested
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    /// Subscribe to the command stream, for firmware simulators
    pub fn commands(&self) -> broadcast::Receiver<DeviceCommand> {
        self.commands.subscribe()
    }
}

/// Create a mock gateway and the probe controlling it
pub fn mock_gateway() -> (MockGateway, GatewayProbe) {
    let (bus, incoming) = broadcast::channel(64);
    let published = Arc::new(Mutex::new(Vec::new()));
    (
        MockGateway {
            bus: bus.clone(),
            incoming,
            buffers: HashMap::new(),
            published: published.clone(),
            timeout: DEFAULT_WAIT,
        },
        GatewayProbe { bus, published },
    )
}

/// In-memory replacement for the MQTT side of the gateway
pub struct MockGateway {
    bus: broadcast::Sender<(String, Value)>,
    incoming: broadcast::Receiver<(String, Value)>,
    buffers: HashMap<String, VecDeque<Report>>,
    published: Arc<Mutex<Vec<(String, Value)>>>,
    timeout: Duration,
}

impl MockGateway {
    /// Override the wait bound, eg to keep timeout tests fast
    pub fn set_timeout(&mut self, wait: Duration) {
        self.timeout = wait;
    }

    fn route(&mut self, topic: String, payload: Value) {
        if let Some(buffer) = self.buffers.get_mut(&topic) {
            let report = Report::from_value(payload).expect("mock payloads are objects");
            buffer.push_back(report);
        } else {
            debug!("mock gateway dropping message for unsubscribed topic {topic}");
        }
    }

    // Route whatever is already on the bus under the current subscription
    // set. Called before arming a new topic, so traffic published earlier
    // can never replay into the new subscription.
    fn drain_pending(&mut self) {
        loop {
            match self.incoming.try_recv() {
                Ok((topic, payload)) => self.route(topic, payload),
                Err(broadcast::error::TryRecvError::Lagged(n)) => warn!("dropped {n} messages"),
                Err(_) => break,
            }
        }
    }
}

impl GatewayLink for MockGateway {
    async fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        self.drain_pending();
        self.buffers.entry(topic.to_string()).or_default();
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Value) -> Result<(), ChannelError> {
        info!("mock gateway publish on {topic}: {payload}");
        self.published
            .lock()
            .expect("publish log poisoned")
            .push((topic.to_string(), payload.clone()));
        let _ = self.bus.send((topic.to_string(), payload));
        Ok(())
    }

    async fn wait_msg(&mut self, topic: &str) -> Result<Report, ChannelError> {
        if !self.buffers.contains_key(topic) {
            return Err(ChannelError::NotSubscribed(topic.to_string()));
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(report) = self.buffers.get_mut(topic).and_then(|buf| buf.pop_front()) {
                return Ok(report);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.incoming.recv()).await {
                Ok(Ok((incoming, payload))) => {
                    if incoming == topic {
                        return Ok(Report::from_value(payload)?);
                    }
                    self.route(incoming, payload);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => warn!("dropped {n} messages"),
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(ChannelError::Closed),
                Err(_) => {
                    return Err(ChannelError::timeout(
                        format!("message on topic {topic:?}"),
                        self.timeout,
                    ));
                }
            }
        }
    }

    async fn request(&mut self, topic: &str, payload: Value) -> Result<(), ChannelError> {
        self.publish(topic, payload).await
    }
}

/// Test-side handle to a [`MockGateway`]
#[derive(Clone)]
pub struct GatewayProbe {
    bus: broadcast::Sender<(String, Value)>,
    published: Arc<Mutex<Vec<(String, Value)>>>,
}

impl GatewayProbe {
    /// Push a message onto the bus as zigbee2mqtt would
    pub fn publish(&self, topic: impl Into<String>, payload: Value) {
        let _ = self.bus.send((topic.into(), payload));
    }

    /// Everything the harness has published, in order
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().expect("publish log poisoned").clone()
    }

    /// Subscribe to all bus traffic, for firmware simulators
    pub fn traffic(&self) -> broadcast::Receiver<(String, Value)> {
        self.bus.subscribe()
    }
}

/// Create a simulated smart switch wired to fresh mock transports.
///
/// The simulator runs as a background task and reacts to `/set` and `/get`
/// publishes, reset requests and BTN console commands with the same log
/// lines and gateway reports the real firmware produces.
pub fn mock_switch(
    ep: u8,
    ep_name: &str,
    gateway_name: &str,
) -> (MockDevice, MockGateway, Arc<MockSwitch>) {
    let (device, device_probe) = mock_device();
    let (gateway, gateway_probe) = mock_gateway();
    let commands = device_probe.commands();
    let traffic = gateway_probe.traffic();
    let mock = Arc::new(MockSwitch {
        ep,
        ep_name: ep_name.to_string(),
        gateway_name: gateway_name.to_string(),
        state: AtomicBool::new(false),
        attrs: Mutex::new(HashMap::new()),
        device: device_probe,
        gateway: gateway_probe,
    });
    spawn(mock.clone().run(commands, traffic));
    (device, gateway, mock)
}

/// A scripted firmware simulator for one switch endpoint
pub struct MockSwitch {
    ep: u8,
    ep_name: String,
    gateway_name: String,
    state: AtomicBool,
    attrs: Mutex<HashMap<String, Value>>,
    device: DeviceProbe,
    gateway: GatewayProbe,
}

enum Input {
    Command(DeviceCommand),
    Publish((String, Value)),
}

impl MockSwitch {
    async fn run(
        self: Arc<Self>,
        commands: broadcast::Receiver<DeviceCommand>,
        traffic: broadcast::Receiver<(String, Value)>,
    ) {
        let commands = BroadcastStream::new(commands)
            .filter_map(|result| async move { result.ok() })
            .map(Input::Command);
        let traffic = BroadcastStream::new(traffic)
            .filter_map(|result| async move { result.ok() })
            .map(Input::Publish);
        let mut inputs = pin!(futures::stream::select(commands, traffic));
        while let Some(input) = inputs.next().await {
            match input {
                Input::Command(command) => self.handle_command(command),
                Input::Publish((topic, payload)) => self.handle_publish(&topic, payload),
            }
        }
    }

    fn handle_command(&self, command: DeviceCommand) {
        match command {
            DeviceCommand::Reset => {
                info!("mock firmware: reset");
                self.state.store(false, Ordering::Relaxed);
                self.emit_button_state("IDLE");
            }
            DeviceCommand::Line(line) => {
                if line == format!("BTN{}_PRESS", self.ep - 1) {
                    self.emit_button_state("PRESSED1");
                } else if line == format!("BTN{}_RELEASE", self.ep - 1) {
                    self.emit_button_state("IDLE");
                    self.emit(format!(
                        "Reporting multistate action EP={} value=1... status: 00",
                        self.ep
                    ));
                    self.push_report(json!({"action": format!("single_{}", self.ep_name)}));
                } else {
                    warn!("mock firmware: unmatched command {line:?}");
                }
            }
        }
    }

    fn handle_publish(&self, topic: &str, payload: Value) {
        let Value::Object(object) = payload else {
            return;
        };
        if topic == format!("{}/set", self.gateway_name) {
            for (key, value) in object {
                self.handle_set(&key, value);
            }
        } else if topic == format!("{}/get", self.gateway_name) {
            for key in object.keys() {
                self.handle_get(key);
            }
        }
    }

    fn handle_set(&self, key: &str, value: Value) {
        if key == self.state_key() {
            let current = self.state.load(Ordering::Relaxed);
            let target = match value.as_str() {
                Some("ON") => true,
                Some("OFF") => false,
                Some("TOGGLE") => !current,
                other => {
                    warn!("mock firmware: unknown state command {other:?}");
                    return;
                }
            };
            self.state.store(target, Ordering::Relaxed);
            let flag = if target { "1" } else { "0" };
            self.emit(format!(
                "SwitchEndpoint EP={}: do state change {flag}",
                self.ep
            ));
            // the gateway answers the set request and the device pushes its
            // own report: two messages on the state topic
            self.report_state();
            self.report_state();
        } else if let Some(attr) = key.strip_suffix(&format!("_{}", self.ep_name)) {
            let Some(id) = attr_id(attr) else {
                warn!("mock firmware: unknown attribute {attr:?}");
                return;
            };
            self.attrs
                .lock()
                .expect("attrs poisoned")
                .insert(attr.to_string(), value.clone());
            self.emit(format!("ZCL Write Attribute: Cluster 0007 Attrib {id}"));
            self.push_report(keyed(key, value));
            self.emit_button_state("IDLE");
        }
    }

    fn handle_get(&self, key: &str) {
        if key == self.state_key() {
            self.emit(format!(
                "ZCL Read Attribute: EP={} Cluster=0006 Command=00 Attr=0000",
                self.ep
            ));
            self.report_state();
        } else if let Some(attr) = key.strip_suffix(&format!("_{}", self.ep_name)) {
            let Some(id) = attr_id(attr) else {
                warn!("mock firmware: unknown attribute {attr:?}");
                return;
            };
            let value = self
                .attrs
                .lock()
                .expect("attrs poisoned")
                .get(attr)
                .cloned()
                .unwrap_or(Value::Null);
            self.emit(format!(
                "ZCL Read Attribute: EP={} Cluster=0007 Command=00 Attr={id}",
                self.ep
            ));
            self.push_report(keyed(key, value));
        }
    }

    fn state_key(&self) -> String {
        format!("state_{}", self.ep_name)
    }

    fn report_state(&self) {
        let state = if self.state.load(Ordering::Relaxed) {
            "ON"
        } else {
            "OFF"
        };
        self.push_report(keyed(&self.state_key(), json!(state)));
    }

    fn emit_button_state(&self, state: &str) {
        self.emit(format!("Switching button {} state to {state}", self.ep));
    }

    /// Emit a raw log line as the firmware would
    pub fn emit(&self, line: impl Into<String>) {
        self.device.emit(line);
    }

    /// Push a raw message onto the endpoint's gateway topic
    pub fn push_report(&self, payload: Value) {
        self.gateway.publish(self.gateway_name.clone(), payload);
    }

    /// Current relay state
    pub fn state(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }

    /// Stored attribute value, if one was written
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attrs.lock().expect("attrs poisoned").get(name).cloned()
    }

    /// Everything the harness published to the gateway, in order
    pub fn published(&self) -> Vec<(String, Value)> {
        self.gateway.published()
    }

    /// Every command line the harness sent to the device
    pub fn sent(&self) -> Vec<String> {
        self.device.sent()
    }

    /// Number of device resets requested
    pub fn resets(&self) -> usize {
        self.device.resets()
    }
}

// the firmware's own attribute table, mirrored from its cluster definition
fn attr_id(attr: &str) -> Option<&'static str> {
    Some(match attr {
        "switch_mode" => "ff00",
        "switch_actions" => "0010",
        "relay_mode" => "ff01",
        "max_pause" => "ff02",
        "min_long_press" => "ff03",
        "long_press_mode" => "ff04",
        "operation_mode" => "ff05",
        _ => return None,
    })
}

fn keyed(key: &str, value: Value) -> Value {
    let mut object = Map::new();
    object.insert(key.to_string(), value);
    Value::Object(object)
}
