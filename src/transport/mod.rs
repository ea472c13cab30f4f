//! Transport layer for platform communication
//!
//! This module provides the session abstraction over the device-management
//! platform connection and its MQTT implementation. The synchronization
//! core talks to [`Session`] only, which enables dependency injection and
//! testing against a scripted mock.

use crate::attributes::{AttributeKey, AttributeSet, AttributeValue};
use std::collections::BTreeSet;
use std::fmt;

pub mod mqtt;

/// Opaque identity of one outstanding attribute fetch
///
/// Supplied by the transport layer at issue time. On the reference wire
/// protocol this is the integer suffix of the request/response topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound protocol events, drained once per scheduling tick
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Response to an attribute fetch request
    ///
    /// `request_id` is present when the wire protocol addressed the
    /// response; without it the request tracker attributes the payload to
    /// the oldest pending fetch that asked for one of its keys.
    Response {
        request_id: Option<RequestId>,
        attributes: AttributeSet,
    },
    /// Server-initiated push of shared attribute values
    SharedUpdate(AttributeSet),
}

/// Session trait for platform communication
///
/// Abstraction over the pub/sub + request/response attribute protocol.
/// Implementations own connectivity; reconnection policy belongs to the
/// reconciliation controller, so a lost connection simply makes
/// [`Session::is_connected`] report false until `connect` is called again.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish a fresh connection to the platform
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Tear down the current connection
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Whether the session is currently usable for publishing
    fn is_connected(&self) -> bool;

    /// Subscribe to shared-attribute pushes and fetch responses
    ///
    /// Must be called after every successful `connect`; subscriptions do
    /// not survive a connection loss.
    async fn subscribe_attributes(&mut self) -> Result<(), Self::Error>;

    /// Issue an attribute fetch for the given client-side keys
    ///
    /// Returns the opaque request identity the response (if any) will be
    /// matched against.
    async fn request_client_attributes(
        &mut self,
        keys: &BTreeSet<AttributeKey>,
    ) -> Result<RequestId, Self::Error>;

    /// Report one client attribute value outward
    async fn report_attribute(
        &mut self,
        key: &AttributeKey,
        value: &AttributeValue,
    ) -> Result<(), Self::Error>;

    /// Drain inbound events without blocking
    fn drain_events(&mut self) -> Vec<SessionEvent>;
}

/// Type alias for the MQTT session
pub type MqttSession = mqtt::MqttSession;
