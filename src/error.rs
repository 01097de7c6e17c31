//! Typed errors for the one place the spec demands them: `Monitor::init`.
//!
//! Everything past setup is reported through `anyhow::Result` or silently
//! dropped per the edge-path error policy (see `recognizer` and `dedup`).

use std::fmt;

/// Failure reported from [`crate::monitor::Monitor::init`].
#[derive(Debug)]
pub enum InitError {
    /// The pin number could not be converted to a BCM GPIO number under the
    /// requested numbering scheme.
    InvalidPin { pin: i32 },
    /// Another monitor already owns this pin.
    PinBusy { pin: i32 },
    /// The GPIO driver collaborator failed to attach an edge handler.
    GpioInitFailed(String),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::InvalidPin { pin } => write!(f, "invalid pin number: {pin}"),
            InitError::PinBusy { pin } => write!(f, "pin {pin} is already in use"),
            InitError::GpioInitFailed(msg) => write!(f, "GPIO initialization failed: {msg}"),
        }
    }
}

impl std::error::Error for InitError {}
