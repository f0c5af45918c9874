//! MQTT access to the zigbee2mqtt gateway.
//!
//! [`MqttGateway`] wraps a [`rumqttc::AsyncClient`]; a background task polls
//! the event loop and forwards every incoming publish that parses as a JSON
//! object into an in-process queue. Subscribing arms a per-topic FIFO buffer,
//! so a message published after `subscribe` returns is never lost even when
//! the harness only asks for it later. rumqttc sends queued requests in
//! order, which means a SUBSCRIBE issued before a PUBLISH reaches the broker
//! first; that ordering is the no-lost-wakeup guarantee the harness builds
//! its arm-before-trigger protocol on.

use bon::bon;
use futures::StreamExt;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::pin::pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};
use transport::{ChannelError, GatewayLink, Report};

/// A connection to the zigbee2mqtt gateway's MQTT broker
pub struct MqttGateway {
    client: AsyncClient,
    incoming: mpsc::UnboundedReceiver<(String, Report)>,
    buffers: HashMap<String, VecDeque<Report>>,
    timeout: Duration,
    base: String,
    poller: JoinHandle<()>,
}

#[bon]
impl MqttGateway {
    /// Connect to the broker and start the event-loop poller.
    ///
    /// `timeout` bounds every [`wait_msg`](GatewayLink::wait_msg) call;
    /// `base` is the gateway's root topic, used for control-plane requests.
    /// Must be called from within a tokio runtime.
    #[builder(finish_fn = connect)]
    pub fn new(
        options: MqttOptions,
        #[builder(default = Duration::from_secs(5))] timeout: Duration,
        #[builder(into, default = String::from("zigbee2mqtt"))] base: String,
    ) -> Self {
        let (client, event_loop) = AsyncClient::new(options, 10);
        let (sender, incoming) = mpsc::unbounded_channel();
        let poller = tokio::spawn(Self::poll_job(event_loop, sender));
        Self {
            client,
            incoming,
            buffers: HashMap::new(),
            timeout,
            base,
            poller,
        }
    }

    async fn poll_job(event_loop: EventLoop, incoming: mpsc::UnboundedSender<(String, Report)>) {
        debug!("starting gateway poller");
        let events = futures::stream::unfold(event_loop, |mut event_loop| async {
            match event_loop.poll().await {
                Ok(event) => Some((event, event_loop)),
                Err(err) => {
                    warn!("Error from connection: {err}");
                    None
                }
            }
        });
        let mut events = pin!(events);
        while let Some(event) = events.next().await {
            let Event::Incoming(Incoming::Publish(publish)) = event else {
                continue;
            };
            match serde_json::from_slice::<Report>(&publish.payload) {
                Ok(report) => {
                    debug!("received publish on {}", publish.topic);
                    if incoming.send((publish.topic, report)).is_err() {
                        return;
                    }
                }
                Err(error) => {
                    warn!(
                        "failed to parse payload: '{error}' for topic: '{}'",
                        publish.topic
                    );
                }
            }
        }
    }

    fn route(&mut self, topic: String, report: Report) {
        match self.buffers.get_mut(&topic) {
            Some(buffer) => buffer.push_back(report),
            None => debug!("dropping message for unsubscribed topic {topic}"),
        }
    }
}

impl GatewayLink for MqttGateway {
    async fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        if self.buffers.contains_key(topic) {
            return Ok(());
        }
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|err| ChannelError::Communication(err.to_string()))?;
        self.buffers.insert(topic.to_string(), VecDeque::new());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Value) -> Result<(), ChannelError> {
        debug!("publishing to {topic}: {payload}");
        let body = serde_json::to_vec(&payload)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, body)
            .await
            .map_err(|err| ChannelError::Communication(err.to_string()))
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
            let (incoming_topic, report) = timeout(remaining, self.incoming.recv())
                .await
                .map_err(|_| {
                    ChannelError::timeout(format!("message on topic {topic:?}"), self.timeout)
                })?
                .ok_or(ChannelError::Closed)?;
            if incoming_topic == topic {
                return Ok(report);
            }
            self.route(incoming_topic, report);
        }
    }

    async fn request(&mut self, topic: &str, payload: Value) -> Result<(), ChannelError> {
        let topic = format!("{}/bridge/request/{topic}", self.base);
        self.publish(&topic, payload).await
    }
}

impl Drop for MqttGateway {
    fn drop(&mut self) {
        self.poller.abort();
    }
}
