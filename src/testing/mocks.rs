//! Mock implementations for testing
//!
//! Provides a scripted [`MockSession`] implementing the transport
//! [`Session`] trait: connects succeed or fail on demand, inbound events
//! are queued by the test, and every outward publish is recorded for
//! inspection.

use crate::attributes::{AttributeKey, AttributeSet, AttributeValue};
use crate::transport::{RequestId, Session, SessionEvent};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

/// Error type produced by the mock session
#[derive(Debug, Error)]
pub enum MockSessionError {
    #[error("mock connect failure")]
    ConnectFailed,
    #[error("mock subscribe failure")]
    SubscribeFailed,
    #[error("mock not connected")]
    NotConnected,
}

/// Scripted in-memory [`Session`] for tests
#[derive(Debug, Default)]
pub struct MockSession {
    connected: bool,
    connect_failures_remaining: u32,
    subscribe_should_fail: bool,
    subscribe_calls: u32,
    next_request_id: u32,
    queued_events: VecDeque<SessionEvent>,
    requests: Vec<(RequestId, BTreeSet<AttributeKey>)>,
    reported: Vec<(AttributeKey, AttributeValue)>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose connect attempts always fail
    pub fn failing_connect() -> Self {
        Self {
            connect_failures_remaining: u32::MAX,
            ..Default::default()
        }
    }

    /// Fail the next `n` connect attempts, then succeed
    pub fn fail_next_connects(&mut self, n: u32) {
        self.connect_failures_remaining = n;
    }

    /// Make subscribe calls fail until turned off again
    pub fn fail_subscribe(&mut self, fail: bool) {
        self.subscribe_should_fail = fail;
    }

    /// Simulate an unannounced connection loss
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    /// Queue a fetch response for the next event drain
    pub fn push_response(&mut self, request_id: Option<RequestId>, attributes: AttributeSet) {
        self.queued_events.push_back(SessionEvent::Response {
            request_id,
            attributes,
        });
    }

    /// Queue a shared-attribute push for the next event drain
    pub fn push_shared_update(&mut self, attributes: AttributeSet) {
        self.queued_events
            .push_back(SessionEvent::SharedUpdate(attributes));
    }

    /// Every fetch issued through this session, in order
    pub fn requests(&self) -> &[(RequestId, BTreeSet<AttributeKey>)] {
        &self.requests
    }

    /// Every outward attribute report, in order
    pub fn reported(&self) -> &[(AttributeKey, AttributeValue)] {
        &self.reported
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls
    }
}

#[async_trait::async_trait]
impl Session for MockSession {
    type Error = MockSessionError;

    async fn connect(&mut self) -> Result<(), MockSessionError> {
        if self.connect_failures_remaining > 0 {
            self.connect_failures_remaining = self.connect_failures_remaining.saturating_sub(1);
            return Err(MockSessionError::ConnectFailed);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MockSessionError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn subscribe_attributes(&mut self) -> Result<(), MockSessionError> {
        if !self.connected {
            return Err(MockSessionError::NotConnected);
        }
        if self.subscribe_should_fail {
            return Err(MockSessionError::SubscribeFailed);
        }
        self.subscribe_calls += 1;
        Ok(())
    }

    async fn request_client_attributes(
        &mut self,
        keys: &BTreeSet<AttributeKey>,
    ) -> Result<RequestId, MockSessionError> {
        if !self.connected {
            return Err(MockSessionError::NotConnected);
        }
        self.next_request_id += 1;
        let id = RequestId(self.next_request_id);
        self.requests.push((id, keys.clone()));
        Ok(id)
    }

    async fn report_attribute(
        &mut self,
        key: &AttributeKey,
        value: &AttributeValue,
    ) -> Result<(), MockSessionError> {
        if !self.connected {
            return Err(MockSessionError::NotConnected);
        }
        self.reported.push((key.clone(), value.clone()));
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.queued_events.drain(..).collect()
    }
}
