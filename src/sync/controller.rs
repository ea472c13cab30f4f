//! Reconciliation controller: the attribute synchronization state machine
//!
//! Decides when to (re)connect, when to subscribe and fetch, and how to
//! merge remote attribute values into the local actuator. One
//! [`SyncController::tick`] call is one cooperative scheduling step; the
//! per-tick order is fixed: connectivity check, then protocol
//! advancement, then local input sampling — so a transition made this
//! tick is visible to the input handler in the same tick.
//!
//! Known, deliberate behaviors:
//! - connect failures are retried every tick with no backoff;
//! - a local change made while offline is published nowhere and may be
//!   overwritten by the post-reconnect fetch (last-remote-write-wins,
//!   no offline queue).

use crate::attributes::{AttributeKey, AttributeSet, AttributeValue};
use crate::io::{InputPin, OutputPin};
use crate::sync::mirror::ActuatorMirror;
use crate::sync::registry::SubscriptionRegistry;
use crate::sync::tracker::RequestTracker;
use crate::transport::{RequestId, Session, SessionEvent};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Synchronization state machine states
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    /// No usable connection; a connect is attempted every tick
    Disconnected,
    /// Connect in progress within the current tick
    Connecting,
    /// Connected and subscribed, waiting for the initial fetch to settle
    AwaitingSync { fetch: RequestId },
    /// Steady state: pushes merge incrementally as they arrive
    Synced,
}

/// The orchestrating state machine for one mirrored attribute
pub struct SyncController<S, O, I>
where
    S: Session,
    O: OutputPin,
    I: InputPin,
{
    session: S,
    tracker: RequestTracker,
    registry: SubscriptionRegistry,
    mirror: ActuatorMirror<O>,
    button: I,
    button_was_pressed: bool,
    attribute_key: AttributeKey,
    request_timeout: Duration,
    state: SyncState,
}

impl<S, O, I> SyncController<S, O, I>
where
    S: Session,
    O: OutputPin,
    I: InputPin,
{
    pub fn new(
        session: S,
        output: O,
        button: I,
        attribute_key: AttributeKey,
        request_timeout: Duration,
    ) -> Self {
        Self {
            session,
            tracker: RequestTracker::new(),
            registry: SubscriptionRegistry::new(),
            mirror: ActuatorMirror::new(output),
            button,
            button_was_pressed: false,
            attribute_key,
            request_timeout,
            state: SyncState::Disconnected,
        }
    }

    /// Run one cooperative scheduling step
    pub async fn tick(&mut self, now: Instant) {
        self.check_connectivity(now).await;
        self.advance_protocol(now);
        self.sample_input().await;
    }

    /// Connectivity check: notice losses, attempt a (re)connect
    async fn check_connectivity(&mut self, now: Instant) {
        if self.session.is_connected() {
            return;
        }

        if self.state != SyncState::Disconnected {
            info!("Connection lost, resetting synchronization state");
            self.lose_connection();
        }

        self.state = SyncState::Connecting;
        match self.session.connect().await {
            Ok(()) => {
                info!("Connected to platform");
                self.establish_sync(now).await;
            }
            Err(e) => {
                // Retried next tick, indefinitely and without backoff
                warn!(error = %e, "Connect attempt failed");
                self.state = SyncState::Disconnected;
            }
        }
    }

    /// Post-connect handshake: subscribe, then issue the initial fetch
    ///
    /// A subscribe failure is fatal to this connection attempt: the whole
    /// handshake is abandoned and retried from `Disconnected`.
    async fn establish_sync(&mut self, now: Instant) {
        if let Err(e) = self.session.subscribe_attributes().await {
            warn!(error = %e, "Subscription failed, aborting connection attempt");
            let _ = self.session.disconnect().await;
            self.lose_connection();
            return;
        }

        let keys: BTreeSet<AttributeKey> = [self.attribute_key.clone()].into_iter().collect();
        self.registry.activate(keys.clone());

        match self.session.request_client_attributes(&keys).await {
            Ok(id) => {
                self.tracker.issue(id, keys, self.request_timeout, now);
                debug!(request_id = %id, "Awaiting initial attribute fetch");
                self.state = SyncState::AwaitingSync { fetch: id };
            }
            Err(e) => {
                warn!(error = %e, "Initial fetch could not be issued, aborting connection attempt");
                let _ = self.session.disconnect().await;
                self.lose_connection();
            }
        }
    }

    /// Protocol advancement: inbound events, then timeout deadlines
    fn advance_protocol(&mut self, now: Instant) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::Response {
                    request_id,
                    attributes,
                } => {
                    if let Some(resolved) = self.tracker.resolve(&attributes, request_id) {
                        self.apply_remote(&attributes);
                        if self.state == (SyncState::AwaitingSync { fetch: resolved }) {
                            info!("Initial fetch complete, synchronized");
                            self.state = SyncState::Synced;
                        }
                    }
                    // Unmatched responses (late or unsolicited) fall through silently
                }
                SessionEvent::SharedUpdate(attributes) => {
                    if self.registry.filter_push(&attributes).is_some() {
                        self.apply_remote(&attributes);
                    }
                }
            }
        }

        for expired in self.tracker.tick(now) {
            if self.state == (SyncState::AwaitingSync { fetch: expired }) {
                // Non-fatal: proceed with whatever local state holds
                warn!(
                    request_id = %expired,
                    "Fetch timed out, proceeding with local state"
                );
                self.state = SyncState::Synced;
            }
        }
    }

    /// Merge rule, shared by fetch responses and pushes
    ///
    /// The mirrored key with a boolean value overwrites local state and
    /// drives the output. An absent key — or a non-boolean value under it
    /// — means no authoritative value: local state is preserved.
    fn apply_remote(&mut self, set: &AttributeSet) {
        match set.get(&self.attribute_key) {
            Some(value) => match value.as_bool() {
                Some(remote) => {
                    let changed = self.mirror.set(remote);
                    info!(key = %self.attribute_key, state = remote, changed, "Merged remote value");
                }
                None => {
                    warn!(
                        key = %self.attribute_key,
                        value = ?value,
                        "Remote value is not a boolean, keeping local state"
                    );
                }
            },
            None => {
                info!(
                    key = %self.attribute_key,
                    "No authoritative value in payload, keeping local state"
                );
            }
        }
    }

    /// Local input sampling: act on the pressed edge only
    async fn sample_input(&mut self) {
        let pressed = self.button.is_active();
        let edge = pressed && !self.button_was_pressed;
        self.button_was_pressed = pressed;

        if edge {
            self.handle_local_toggle().await;
        }
    }

    /// A local toggle updates state and output immediately; the outward
    /// report happens only while connected (no offline queue)
    async fn handle_local_toggle(&mut self) {
        let new_state = self.mirror.toggle();
        info!(state = new_state, "Local toggle");

        if self.session.is_connected() {
            let value = AttributeValue::Bool(new_state);
            if let Err(e) = self.session.report_attribute(&self.attribute_key, &value).await {
                warn!(error = %e, "Failed to report attribute change");
            }
        } else {
            debug!("Not connected, skipping outward report");
        }
    }

    /// Reset every piece of per-connection state
    fn lose_connection(&mut self) {
        self.registry.reset();
        self.tracker.clear();
        self.state = SyncState::Disconnected;
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Current local actuator state
    pub fn led_state(&self) -> bool {
        self.mirror.get()
    }

    /// Watched shared-attribute keys for the current connection
    pub fn watched_keys(&self) -> &BTreeSet<AttributeKey> {
        self.registry.watched()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{SimButton, SimLed};
    use crate::testing::MockSession;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(5000);

    struct Fixture {
        controller: SyncController<MockSession, SimLed, SimButton>,
        button: SimButton,
        led_level: Arc<std::sync::atomic::AtomicBool>,
    }

    fn fixture(session: MockSession) -> Fixture {
        let led = SimLed::new(2);
        let led_level = led.level_handle();
        let button = SimButton::new();
        let controller = SyncController::new(
            session,
            led,
            button.clone(),
            AttributeKey::new("ledState").unwrap(),
            TIMEOUT,
        );
        Fixture {
            controller,
            button,
            led_level,
        }
    }

    fn bool_set(key: &str, value: bool) -> AttributeSet {
        let mut set = AttributeSet::new();
        set.insert(
            AttributeKey::new(key).unwrap(),
            AttributeValue::Bool(value),
        );
        set
    }

    #[tokio::test]
    async fn test_boot_connect_fetch_success_turns_led_on() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        // First tick: connect + subscribe + fetch issued
        f.controller.tick(t0).await;
        let fetch = match f.controller.state() {
            SyncState::AwaitingSync { fetch } => *fetch,
            other => panic!("expected AwaitingSync, got {other:?}"),
        };

        // Remote holds ledState=true; the response arrives
        f.controller
            .session_mut()
            .push_response(Some(fetch), bool_set("ledState", true));
        f.controller.tick(t0 + Duration::from_millis(200)).await;

        assert_eq!(f.controller.state(), &SyncState::Synced);
        assert!(f.controller.led_state());
        assert!(f.led_level.load(Ordering::SeqCst), "physical output reflects merge");
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_non_fatal() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        assert!(matches!(f.controller.state(), SyncState::AwaitingSync { .. }));

        // No response; advance past the 5 s deadline
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(1)).await;

        assert_eq!(f.controller.state(), &SyncState::Synced);
        assert!(!f.controller.led_state(), "pre-connect default retained");
        assert!(!f.led_level.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_has_no_effect() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        let fetch = match f.controller.state() {
            SyncState::AwaitingSync { fetch } => *fetch,
            other => panic!("expected AwaitingSync, got {other:?}"),
        };

        f.controller.tick(t0 + TIMEOUT).await;
        assert_eq!(f.controller.state(), &SyncState::Synced);

        // The response shows up after the timeout already fired
        f.controller
            .session_mut()
            .push_response(Some(fetch), bool_set("ledState", true));
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(200)).await;

        assert!(!f.controller.led_state(), "stale response must be ignored");
    }

    #[tokio::test]
    async fn test_response_without_mirrored_key_keeps_local_state() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        let fetch = match f.controller.state() {
            SyncState::AwaitingSync { fetch } => *fetch,
            other => panic!("expected AwaitingSync, got {other:?}"),
        };

        // Addressed response, but the mirrored key is absent
        f.controller
            .session_mut()
            .push_response(Some(fetch), bool_set("someOtherKey", true));
        f.controller.tick(t0 + Duration::from_millis(200)).await;

        assert_eq!(f.controller.state(), &SyncState::Synced);
        assert!(!f.controller.led_state(), "no default-to-false on absent key");
    }

    #[tokio::test]
    async fn test_push_while_synced_updates_output() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        f.controller.tick(t0 + TIMEOUT).await; // sync via timeout
        assert_eq!(f.controller.state(), &SyncState::Synced);

        f.controller
            .session_mut()
            .push_shared_update(bool_set("ledState", true));
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(200)).await;

        assert!(f.controller.led_state());
        assert!(f.led_level.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_local_toggle_while_connected_publishes_once() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        f.controller.tick(t0 + TIMEOUT).await;

        f.button.press();
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(200)).await;

        assert!(f.controller.led_state());
        let reports = f.controller.session().reported();
        assert_eq!(reports.len(), 1, "exactly one outward report");
        assert_eq!(reports[0].1, AttributeValue::Bool(true));

        // Held button produces no further edges
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(400)).await;
        assert_eq!(f.controller.session().reported().len(), 1);

        // Release and press again: a second edge, a second report
        f.button.release();
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(600)).await;
        f.button.press();
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(800)).await;
        let reports = f.controller.session().reported();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].1, AttributeValue::Bool(false));
    }

    #[tokio::test]
    async fn test_local_toggle_while_disconnected_publishes_nothing() {
        let mut f = fixture(MockSession::failing_connect());
        let t0 = Instant::now();

        f.button.press();
        f.controller.tick(t0).await;

        assert_eq!(f.controller.state(), &SyncState::Disconnected);
        assert!(f.controller.led_state(), "local state still updates");
        assert!(f.led_level.load(Ordering::SeqCst), "output still driven");
        assert!(f.controller.session().reported().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_failure_aborts_handshake() {
        let mut session = MockSession::new();
        session.fail_subscribe(true);
        let mut f = fixture(session);
        let t0 = Instant::now();

        f.controller.tick(t0).await;

        assert_eq!(f.controller.state(), &SyncState::Disconnected);
        assert!(f.controller.watched_keys().is_empty());
        assert!(!f.controller.session().is_connected(), "session torn down");
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_fresh() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        f.controller.tick(t0 + TIMEOUT).await;
        assert_eq!(f.controller.state(), &SyncState::Synced);
        assert_eq!(f.controller.session().subscribe_calls(), 1);

        // Connection drops; next tick reconnects and resubscribes
        f.controller.session_mut().drop_connection();
        f.controller.tick(t0 + TIMEOUT + Duration::from_millis(200)).await;

        assert!(matches!(f.controller.state(), SyncState::AwaitingSync { .. }));
        assert_eq!(f.controller.session().subscribe_calls(), 2);
        let expected: BTreeSet<AttributeKey> =
            [AttributeKey::new("ledState").unwrap()].into_iter().collect();
        assert_eq!(f.controller.watched_keys(), &expected);
    }

    #[tokio::test]
    async fn test_connect_failure_retries_next_tick() {
        let mut session = MockSession::new();
        session.fail_next_connects(1);
        let mut f = fixture(session);
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        assert_eq!(f.controller.state(), &SyncState::Disconnected);

        f.controller.tick(t0 + Duration::from_millis(200)).await;
        assert!(matches!(f.controller.state(), SyncState::AwaitingSync { .. }));
    }

    #[tokio::test]
    async fn test_non_boolean_remote_value_treated_as_absent() {
        let mut f = fixture(MockSession::new());
        let t0 = Instant::now();

        f.controller.tick(t0).await;
        let fetch = match f.controller.state() {
            SyncState::AwaitingSync { fetch } => *fetch,
            other => panic!("expected AwaitingSync, got {other:?}"),
        };

        let mut set = AttributeSet::new();
        set.insert(
            AttributeKey::new("ledState").unwrap(),
            AttributeValue::Text("on".to_string()),
        );
        f.controller.session_mut().push_response(Some(fetch), set);
        f.controller.tick(t0 + Duration::from_millis(200)).await;

        assert_eq!(f.controller.state(), &SyncState::Synced);
        assert!(!f.controller.led_state());
    }

    #[tokio::test]
    async fn test_push_after_disconnect_not_applied() {
        let mut session = MockSession::new();
        // Event queued while the subscription is already gone
        session.push_shared_update(bool_set("ledState", true));
        session.fail_next_connects(1);
        let mut f = fixture(session);
        let t0 = Instant::now();

        f.controller.tick(t0).await;

        assert_eq!(f.controller.state(), &SyncState::Disconnected);
        assert!(!f.controller.led_state(), "push without subscription is dropped");
    }
}
