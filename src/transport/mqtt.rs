//! MQTT session for the ThingsBoard-style device attribute protocol
//!
//! Wire mapping:
//! - shared-attribute pushes arrive on `v1/devices/me/attributes`
//! - client attributes are reported by publishing to the same topic
//! - fetches publish `{"clientKeys": "..."}` to
//!   `v1/devices/me/attributes/request/{id}` and the platform answers on
//!   `v1/devices/me/attributes/response/{id}`
//!
//! The event loop runs on a spawned task that decodes inbound publishes
//! into [`SessionEvent`]s and forwards them over a channel; the poll loop
//! drains that channel once per tick. A network error ends the task and
//! flips the connection state to `Disconnected` — the controller owns
//! the retry, so no reconnection happens here.

use super::{RequestId, Session, SessionEvent};
use crate::attributes::{self, AttributeKey, AttributeValue};
use crate::config::MqttSection;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Shared-attribute push topic; also the client-attribute report topic
pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
/// Fetch request topic prefix; the request id is appended
pub const ATTRIBUTE_REQUEST_PREFIX: &str = "v1/devices/me/attributes/request/";
/// Fetch response topic prefix; the request id is appended
pub const ATTRIBUTE_RESPONSE_PREFIX: &str = "v1/devices/me/attributes/response/";
/// Wildcard filter covering every fetch response
const ATTRIBUTE_RESPONSE_FILTER: &str = "v1/devices/me/attributes/response/+";

/// How long to wait for the broker's ConnAck before a connect attempt fails
const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state for the MQTT session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Attempting to connect, ConnAck not yet seen
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Build MQTT options from the broker URL and credentials
///
/// The device access token is the MQTT username per the platform's
/// convention; the password is left empty.
pub fn configure_mqtt_options(
    device_name: &str,
    config: &MqttSection,
    access_token: Option<&str>,
) -> Result<MqttOptions, SessionError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| SessionError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    // Unique client id per connection attempt to avoid broker takeover
    // conflicts when the previous session has not fully expired
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let client_id = format!("{device_name}-{timestamp}");
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(token) = access_token {
        mqtt_options.set_credentials(token, "");
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));

    Ok(mqtt_options)
}

/// Extract the request id from a fetch response topic
pub fn parse_response_topic(topic: &str) -> Option<RequestId> {
    topic
        .strip_prefix(ATTRIBUTE_RESPONSE_PREFIX)
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map(RequestId)
}

/// Build the fetch request topic for a request id
pub fn request_topic(id: RequestId) -> String {
    format!("{ATTRIBUTE_REQUEST_PREFIX}{id}")
}

/// Decode one inbound publish into a session event (pure function)
///
/// Payloads that fail to decode are dropped with a warning; a malformed
/// message must never stall the synchronization loop.
fn decode_inbound(topic: &str, payload: &[u8]) -> Option<SessionEvent> {
    if let Some(request_id) = parse_response_topic(topic) {
        match attributes::decode(payload) {
            Ok(set) => {
                return Some(SessionEvent::Response {
                    request_id: Some(request_id),
                    attributes: set,
                })
            }
            Err(e) => {
                warn!(%topic, error = %e, "Dropping malformed fetch response");
                return None;
            }
        }
    }

    if topic == ATTRIBUTES_TOPIC {
        match attributes::decode(payload) {
            Ok(set) => return Some(SessionEvent::SharedUpdate(set)),
            Err(e) => {
                warn!(%topic, error = %e, "Dropping malformed attribute push");
                return None;
            }
        }
    }

    debug!(%topic, "Ignoring message on unhandled topic");
    None
}

/// MQTT implementation of [`Session`]
pub struct MqttSession {
    device_name: String,
    config: MqttSection,
    access_token: Option<String>,
    client: Option<AsyncClient>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    event_rx: Option<mpsc::Receiver<SessionEvent>>,
    event_loop_handle: Option<JoinHandle<()>>,
    next_request_id: u32,
}

impl MqttSession {
    pub fn new(device_name: &str, config: MqttSection, access_token: Option<String>) -> Self {
        Self {
            device_name: device_name.to_string(),
            config,
            access_token,
            client: None,
            state_rx: None,
            event_rx: None,
            event_loop_handle: None,
            next_request_id: 0,
        }
    }

    /// Spawn the event loop task for one connection
    ///
    /// The task forwards decoded events to the session and ends on the
    /// first network error, marking the state `Disconnected`.
    fn spawn_event_loop(
        mut event_loop: EventLoop,
        state_tx: watch::Sender<ConnectionState>,
        event_tx: mpsc::Sender<SessionEvent>,
        device_name: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(device = %device_name, "MQTT event loop started");
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(packet)) => match packet {
                        Packet::ConnAck(_) => {
                            info!(device = %device_name, "MQTT connection acknowledged");
                            let _ = state_tx.send(ConnectionState::Connected);
                        }
                        Packet::Publish(publish) => {
                            let topic = String::from_utf8_lossy(&publish.topic).to_string();
                            if let Some(event) = decode_inbound(&topic, &publish.payload) {
                                if event_tx.send(event).await.is_err() {
                                    debug!("Event receiver dropped, stopping event loop");
                                    break;
                                }
                            }
                        }
                        Packet::Disconnect(_) => {
                            warn!(device = %device_name, "Broker sent disconnect");
                            let _ = state_tx
                                .send(ConnectionState::Disconnected("broker disconnect".into()));
                            break;
                        }
                        other => {
                            debug!(device = %device_name, packet = ?other, "MQTT event");
                        }
                    },
                    Ok(Event::Outgoing(_)) => {}
                    Err(e) => {
                        warn!(device = %device_name, error = %e, "MQTT event loop error");
                        let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                        break;
                    }
                }
            }
            debug!(device = %device_name, "MQTT event loop stopped");
        })
    }

    /// Wait for the ConnAck-driven state change, bounded by a timeout
    async fn wait_for_connection(
        mut state_rx: watch::Receiver<ConnectionState>,
    ) -> Result<(), SessionError> {
        let wait = tokio::time::timeout(CONNACK_TIMEOUT, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(SessionError::ConnectionFailed(
                        "state channel closed".to_string(),
                    ));
                }
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(SessionError::ConnectionFailed(reason.clone()));
                    }
                    ConnectionState::Connecting => continue,
                }
            }
        })
        .await;

        match wait {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectionFailed(
                "no ConnAck within timeout".to_string(),
            )),
        }
    }

    /// Tear down any previous connection's task and channels
    fn discard_previous_connection(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
        self.client = None;
        self.state_rx = None;
        self.event_rx = None;
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Guard publish/subscribe operations against a missing connection
    fn connected_client(&self) -> Result<&AsyncClient, SessionError> {
        let state = self
            .connection_state()
            .unwrap_or(ConnectionState::Disconnected("never connected".into()));
        if state != ConnectionState::Connected {
            return Err(SessionError::NotConnected { state });
        }
        self.client
            .as_ref()
            .ok_or(SessionError::NotConnected { state })
    }
}

#[async_trait::async_trait]
impl Session for MqttSession {
    type Error = SessionError;

    async fn connect(&mut self) -> Result<(), SessionError> {
        self.discard_previous_connection();

        let mqtt_options = configure_mqtt_options(
            &self.device_name,
            &self.config,
            self.access_token.as_deref(),
        )?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (event_tx, event_rx) = mpsc::channel(32);

        let handle = Self::spawn_event_loop(
            event_loop,
            state_tx,
            event_tx,
            self.device_name.clone(),
        );

        // Only report success on an actual ConnAck
        if let Err(e) = Self::wait_for_connection(state_rx.clone()).await {
            handle.abort();
            return Err(e);
        }

        self.client = Some(client);
        self.state_rx = Some(state_rx);
        self.event_rx = Some(event_rx);
        self.event_loop_handle = Some(handle);

        info!(device = %self.device_name, broker = %self.config.broker_url, "MQTT session established");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        if let Some(client) = &self.client {
            // Best effort; the broker may already be gone
            let _ = client.disconnect().await;
        }
        self.discard_previous_connection();
        info!(device = %self.device_name, "MQTT session closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    async fn subscribe_attributes(&mut self) -> Result<(), SessionError> {
        let client = self.connected_client()?;

        client
            .subscribe(ATTRIBUTES_TOPIC, QoS::AtLeastOnce)
            .await
            .map_err(|e| SessionError::SubscriptionFailed(Box::new(e)))?;
        client
            .subscribe(ATTRIBUTE_RESPONSE_FILTER, QoS::AtLeastOnce)
            .await
            .map_err(|e| SessionError::SubscriptionFailed(Box::new(e)))?;

        debug!(device = %self.device_name, "Subscribed to attribute push and response topics");
        Ok(())
    }

    async fn request_client_attributes(
        &mut self,
        keys: &BTreeSet<AttributeKey>,
    ) -> Result<RequestId, SessionError> {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let id = RequestId(self.next_request_id);

        let client = self.connected_client()?;
        let payload = attributes::encode_client_keys(keys.iter());
        client
            .publish(request_topic(id), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SessionError::PublishFailed(Box::new(e)))?;

        debug!(request_id = %id, "Issued client attribute fetch");
        Ok(id)
    }

    async fn report_attribute(
        &mut self,
        key: &AttributeKey,
        value: &AttributeValue,
    ) -> Result<(), SessionError> {
        let client = self.connected_client()?;
        let payload = attributes::encode_report(key, value);
        client
            .publish(ATTRIBUTES_TOPIC, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SessionError::PublishFailed(Box::new(e)))?;

        debug!(%key, "Reported client attribute");
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if let Some(rx) = &mut self.event_rx {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        // Cannot run async disconnect here; just stop the background task
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
