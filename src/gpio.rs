//! The collaborator boundary: a GPIO driver, assumed external per spec.md
//! §1, that calls back into this crate on each logical edge.
//!
//! A real embedding implements [`GpioDriver`] against whatever hardware
//! access library it already uses (sysfs, a character-device GPIO crate,
//! WiringPi, ...). This crate ships only the trait, mirroring how the
//! teacher keeps `NtpSource`/`PtpNetwork` as trait boundaries to OS/network
//! collaborators it doesn't implement itself for every platform.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

/// Marks an `attach` failure as "this pin is already attached" rather than a
/// generic hardware-setup failure, so [`crate::monitor::Monitor::init`] can
/// report [`crate::error::InitError::PinBusy`] specifically. Drivers that
/// can't tell the two apart should just return any other error.
#[derive(Debug)]
pub struct PinBusyError;

impl fmt::Display for PinBusyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin is already attached")
    }
}

impl std::error::Error for PinBusyError {}

/// Pin level as reported by the driver on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// One logical edge notification: the level the pin transitioned to, and a
/// 32-bit monotonic microsecond tick that must wrap at 2^32 (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub level: Level,
    pub tick: u32,
}

/// Receives edge notifications from a [`GpioDriver`]. Implemented by
/// [`crate::monitor::Monitor`]; kept as a trait so the simulator and a real
/// driver share exactly one calling convention.
pub trait EdgeSink: Send + Sync {
    fn on_edge(&self, edge: Edge);
}

/// The GPIO driver collaborator. `attach` installs an edge handler on a BCM
/// pin number (already converted by [`crate::pins`]); `detach` removes it.
///
/// `#[cfg_attr(test, mockall::automock)]` gives unit tests a trivial mock
/// implementation, the same pattern the teacher applies to its network and
/// NTP traits.
#[cfg_attr(test, mockall::automock)]
pub trait GpioDriver: Send {
    /// Installs `sink` to receive edge notifications for `bcm_pin`. Returns
    /// an error if the pin is already attached (should be a [`PinBusyError`])
    /// or hardware setup fails for any other reason.
    fn attach(&mut self, bcm_pin: i32, sink: Arc<dyn EdgeSink>) -> Result<()>;

    /// Removes any previously attached handler. Safe to call when nothing is
    /// attached.
    fn detach(&mut self) -> Result<()>;
}
