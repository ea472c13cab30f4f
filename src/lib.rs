//! ledsync - device-side attribute synchronization agent
//!
//! Keeps a single boolean "LED state" consistent between a local physical
//! actuator and a remote device-management platform over MQTT, tolerating
//! request timeouts and connection loss.
//!
//! # Overview
//!
//! This crate provides:
//! - The reconciliation state machine that fetches remote truth on
//!   (re)connect, subscribes to live updates, and merges inbound values
//!   into the local actuator
//! - Request/timeout bookkeeping with exactly-once resolution
//! - An MQTT session speaking the ThingsBoard device attribute protocol
//! - Trait seams for the transport and for physical pin I/O
//!
//! # Quick Start
//!
//! ```rust
//! use ledsync::attributes::AttributeKey;
//! use ledsync::io::{SimButton, SimLed};
//! use ledsync::sync::SyncController;
//! use ledsync::testing::MockSession;
//! use std::time::{Duration, Instant};
//!
//! # tokio_test::block_on(async {
//! let mut controller = SyncController::new(
//!     MockSession::new(),
//!     SimLed::new(2),
//!     SimButton::new(),
//!     AttributeKey::new("ledState").unwrap(),
//!     Duration::from_millis(5000),
//! );
//!
//! // One cooperative scheduling step: connectivity, protocol, input
//! controller.tick(Instant::now()).await;
//! # });
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod io;
pub mod observability;
pub mod sync;
pub mod testing;
pub mod transport;

// Re-export the surface the binary and integration tests use
pub use attributes::{AttributeKey, AttributeSet, AttributeValue};
pub use config::AgentConfig;
pub use error::{SyncError, SyncResult};
pub use sync::{SyncController, SyncState};
pub use transport::{MqttSession, RequestId, Session, SessionEvent};
