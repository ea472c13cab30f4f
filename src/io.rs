//! Physical I/O seams
//!
//! Pin access sits behind small traits so the synchronization core can be
//! driven by real GPIO on device hardware and by in-process fakes in
//! tests and host-side runs. Inputs follow the pull-up convention:
//! logic-low means pressed/active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// A writable digital output, e.g. an LED pin
pub trait OutputPin: Send {
    fn write(&mut self, high: bool);
}

/// A readable digital input, e.g. a button pin
///
/// `is_active` returns true when the input is asserted. With the pull-up
/// convention that means the line reads logic-low.
pub trait InputPin: Send {
    fn is_active(&self) -> bool;
}

/// Simulated LED backed by a shared flag, with tracing on transitions
///
/// The shared handle lets tests and the host binary observe the physical
/// output independently of the mirror's state field.
pub struct SimLed {
    pin: u8,
    level: Arc<AtomicBool>,
}

impl SimLed {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            level: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for observing the driven level
    pub fn level_handle(&self) -> Arc<AtomicBool> {
        self.level.clone()
    }
}

impl OutputPin for SimLed {
    fn write(&mut self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
        info!(pin = self.pin, state = if high { "ON" } else { "OFF" }, "LED");
    }
}

/// Simulated push button
///
/// `press`/`release` set the line level; `is_active` reports pressed.
#[derive(Clone)]
pub struct SimButton {
    pressed: Arc<AtomicBool>,
}

impl SimButton {
    pub fn new() -> Self {
        Self {
            pressed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn press(&self) {
        self.pressed.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.pressed.store(false, Ordering::SeqCst);
    }
}

impl Default for SimButton {
    fn default() -> Self {
        Self::new()
    }
}

impl InputPin for SimButton {
    fn is_active(&self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}
