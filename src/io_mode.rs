//! I/O classes, sampling modes and trigger edges.
//!
//! [`IoMode`] is the role a physical channel is bound to. Its declaration
//! order doubles as the sample-clock priority: a lower ordinal always wins
//! the shared clock source (see [`crate::clock`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role assigned to a physical channel.
///
/// Variants are declared in clock-source priority order, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IoMode {
    /// Analog voltage input
    AnalogIn = 0,
    /// Analog voltage output
    AnalogOut = 1,
    /// Digital port input
    DigitalIn = 2,
    /// Digital port output
    DigitalOut = 3,
    /// Counter input decoding an angular encoder
    CounterAngleIn = 4,
    /// Counter output generating ticks
    CounterTickOut = 5,
}

impl IoMode {
    /// Number of I/O classes.
    pub const COUNT: usize = 6;

    /// All I/O classes in priority order.
    pub const ALL: [IoMode; Self::COUNT] = [
        IoMode::AnalogIn,
        IoMode::AnalogOut,
        IoMode::DigitalIn,
        IoMode::DigitalOut,
        IoMode::CounterAngleIn,
        IoMode::CounterTickOut,
    ];

    /// Clock priority ordinal. Lower is stronger.
    pub fn priority(self) -> u8 {
        self as u8
    }

    /// Dense index for per-class tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether each bound pin of this class gets its own dedicated task.
    pub fn is_counter(self) -> bool {
        matches!(self, Self::CounterAngleIn | Self::CounterTickOut)
    }

    /// Digital tasks are on-demand only and never receive sample-clock timing.
    pub fn is_on_demand(self) -> bool {
        matches!(self, Self::DigitalIn | Self::DigitalOut)
    }

    /// Physical channel kind used when naming a channel, e.g. `ai` in `Dev1/ai0`.
    pub fn channel_kind(self) -> &'static str {
        match self {
            Self::AnalogIn => "ai",
            Self::AnalogOut => "ao",
            Self::DigitalIn | Self::DigitalOut => "port",
            Self::CounterAngleIn | Self::CounterTickOut => "ctr",
        }
    }

    /// Terminal subsystem used in sample clock names, e.g. `ai` in `Dev1/ai/SampleClock`.
    pub fn clock_subsystem(self) -> &'static str {
        match self {
            Self::AnalogIn => "ai",
            Self::AnalogOut => "ao",
            Self::DigitalIn => "di",
            Self::DigitalOut => "do",
            Self::CounterAngleIn => "ci",
            Self::CounterTickOut => "co",
        }
    }

    /// Short column label used in the device table.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::AnalogIn => "AI",
            Self::AnalogOut => "AO",
            Self::DigitalIn => "DI",
            Self::DigitalOut => "DO",
            Self::CounterAngleIn => "CIN",
            Self::CounterTickOut => "COUT",
        }
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnalogIn => write!(f, "Analog In"),
            Self::AnalogOut => write!(f, "Analog Out"),
            Self::DigitalIn => write!(f, "Digital In"),
            Self::DigitalOut => write!(f, "Digital Out"),
            Self::CounterAngleIn => write!(f, "Counter Angle In"),
            Self::CounterTickOut => write!(f, "Counter Tick Out"),
        }
    }
}

/// Sample timing mode applied to every timed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Acquire a finite number of samples
    Finite,
    /// Hardware-timed single point: each sample paced by `sync_sampling`
    #[default]
    HwClocked,
    /// Continuously acquire samples
    Continuous,
    /// Acquire samples on demand
    OnDemand,
}

impl SamplingMode {
    /// Vendor constant for this mode.
    pub fn raw(self) -> i32 {
        match self {
            Self::Finite => 10178,
            Self::HwClocked => 12522,
            Self::Continuous => 10123,
            Self::OnDemand => 10390,
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite => write!(f, "Finite"),
            Self::HwClocked => write!(f, "Hardware Timed"),
            Self::Continuous => write!(f, "Continuous"),
            Self::OnDemand => write!(f, "On Demand"),
        }
    }
}

/// Active clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEdge {
    /// Sample on rising edge
    #[default]
    Rising,
    /// Sample on falling edge
    Falling,
}

impl TriggerEdge {
    /// Vendor constant for this edge.
    pub fn raw(self) -> i32 {
        match self {
            Self::Rising => 10280,
            Self::Falling => 10171,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_follows_declaration_order() {
        let priorities: Vec<u8> = IoMode::ALL.iter().map(|m| m.priority()).collect();
        assert_eq!(priorities, vec![0, 1, 2, 3, 4, 5]);
        assert!(IoMode::AnalogIn < IoMode::AnalogOut);
        assert!(IoMode::DigitalOut < IoMode::CounterAngleIn);
    }

    #[test]
    fn test_channel_kinds() {
        assert_eq!(IoMode::AnalogIn.channel_kind(), "ai");
        assert_eq!(IoMode::DigitalOut.channel_kind(), "port");
        assert_eq!(IoMode::CounterAngleIn.channel_kind(), "ctr");
        assert!(IoMode::CounterTickOut.is_counter());
        assert!(!IoMode::AnalogOut.is_counter());
        assert!(IoMode::DigitalOut.is_on_demand());
    }

    #[test]
    fn test_sampling_mode_display() {
        assert_eq!(SamplingMode::Finite.to_string(), "Finite");
        assert_eq!(SamplingMode::HwClocked.to_string(), "Hardware Timed");
        assert_eq!(SamplingMode::OnDemand.to_string(), "On Demand");
        assert_eq!(SamplingMode::default(), SamplingMode::HwClocked);
    }
}
