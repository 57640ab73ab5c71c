//! Shared sample clock resolution.
//!
//! Every timed task in a session is paced by one terminal. The first bound
//! class claims it, and a later bind only takes it over when its class has a
//! strictly higher priority (lower [`IoMode`] ordinal). Analog and digital
//! classes export `<device>/<subsystem>/SampleClock`; counters fall back to
//! the onboard clock.

use std::fmt;

use crate::io_mode::IoMode;

/// Terminal name of a device's internal timebase.
pub const ONBOARD_CLOCK: &str = "OnboardClock";

/// The session's shared sample clock terminal and the bind that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSource {
    terminal: String,
    owner: Option<(IoMode, u32)>,
}

impl Default for ClockSource {
    fn default() -> Self {
        Self {
            terminal: ONBOARD_CLOCK.to_string(),
            owner: None,
        }
    }
}

impl ClockSource {
    /// Unowned onboard clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal name.
    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    /// Class that owns the clock.
    pub fn owner_mode(&self) -> Option<IoMode> {
        self.owner.map(|(mode, _)| mode)
    }

    /// Device id that owns the clock.
    pub fn owner_device(&self) -> Option<u32> {
        self.owner.map(|(_, device)| device)
    }

    /// Terminal a bind of `io_mode` on `device_name` would export.
    pub fn terminal_for(device_name: &str, io_mode: IoMode) -> String {
        if io_mode.is_counter() {
            ONBOARD_CLOCK.to_string()
        } else {
            format!("{}/{}/SampleClock", device_name, io_mode.clock_subsystem())
        }
    }

    /// Offer the clock to a bind of `io_mode` on device `device_id`.
    ///
    /// Returns whether the clock changed hands.
    pub fn resolve(&mut self, device_id: u32, device_name: &str, io_mode: IoMode) -> bool {
        let wins = match self.owner {
            None => true,
            Some((owner, _)) => io_mode.priority() < owner.priority(),
        };
        if wins {
            self.terminal = Self::terminal_for(device_name, io_mode);
            self.owner = Some((io_mode, device_id));
        }
        wins
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.terminal)
    }
}
