//! Actuator mirror: the local boolean state and its physical output
//!
//! Every mutation path drives the output before returning, so the state
//! field and the pin level never diverge observably. The mirror is a pure
//! state holder; merge policy and publish decisions live in the
//! reconciliation controller.

use crate::io::OutputPin;
use tracing::debug;

/// Local boolean state bound to a physical output
pub struct ActuatorMirror<O: OutputPin> {
    state: bool,
    output: O,
}

impl<O: OutputPin> ActuatorMirror<O> {
    /// Create a mirror in the OFF state and drive the output to match
    pub fn new(mut output: O) -> Self {
        output.write(false);
        Self {
            state: false,
            output,
        }
    }

    pub fn get(&self) -> bool {
        self.state
    }

    /// Set the state, driving the output only on an actual change
    ///
    /// Returns true if the state changed. Idempotent: setting the current
    /// value touches neither the state nor the pin.
    pub fn set(&mut self, value: bool) -> bool {
        if self.state == value {
            return false;
        }
        self.state = value;
        self.output.write(value);
        debug!(state = value, "Actuator state updated");
        true
    }

    /// Flip the state and return the new value
    pub fn toggle(&mut self) -> bool {
        let next = !self.state;
        self.set(next);
        next
    }
}
