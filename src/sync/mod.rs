//! The attribute synchronization core
//!
//! Four cooperating pieces, all driven from a single poll loop:
//! [`tracker::RequestTracker`] matches fetches to responses or timeouts,
//! [`registry::SubscriptionRegistry`] holds the live watch set,
//! [`mirror::ActuatorMirror`] binds the boolean state to its output pin,
//! and [`controller::SyncController`] is the state machine that wires
//! them to a [`crate::transport::Session`].

pub mod controller;
pub mod mirror;
pub mod registry;
pub mod tracker;

pub use controller::{SyncController, SyncState};
pub use mirror::ActuatorMirror;
pub use registry::SubscriptionRegistry;
pub use tracker::RequestTracker;
