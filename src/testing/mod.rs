//! Testing utilities and mock implementations
//!
//! This module provides a scripted [`mocks::MockSession`] so the
//! synchronization core can be exercised without an MQTT broker.

pub mod mocks;

pub use mocks::*;
