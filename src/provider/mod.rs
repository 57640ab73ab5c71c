//! Hardware provider seam.
//!
//! The vendor driver is an opaque collaborator: quickDAQ never talks to
//! hardware except through [`HardwareProvider`]. A provider exposes the
//! handful of primitives a DAQmx-style driver offers (device queries, task and
//! channel creation, sample clock timing, vectorized reads/writes and the
//! sample-clock wait). Everything above it (task allocation, clock
//! resolution, the status machine) lives in [`crate::session::Session`].
//!
//! - [`simulated`] - in-memory loopback provider used by tests and the CLI

pub mod simulated;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::io_mode::{IoMode, SamplingMode, TriggerEdge};

pub use simulated::{Operation, SimulatedDevice, SimulatedProvider};

/// Opaque provider task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Attributes reported for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAttributes {
    /// Product type, e.g. "PXIe-6363"
    pub product_type: String,
    /// Serial number
    pub serial: u64,
    /// Whether the device is simulated by the driver
    pub is_simulated: bool,
}

/// Analog input terminal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalConfig {
    /// Driver default for the channel
    #[default]
    Default,
    /// Referenced single-ended
    Rse,
    /// Non-referenced single-ended
    Nrse,
    /// Differential
    Differential,
    /// Pseudo-differential
    PseudoDifferential,
}

impl TerminalConfig {
    /// Vendor constant for this configuration.
    pub fn raw(self) -> i32 {
        match self {
            Self::Default => -1,
            Self::Rse => 10083,
            Self::Nrse => 10078,
            Self::Differential => 10106,
            Self::PseudoDifferential => 12529,
        }
    }
}

/// Digital line grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineGrouping {
    /// One channel per line
    PerLine,
    /// One channel for all lines of a port
    #[default]
    AllLines,
}

/// Quadrature decoding of an angular encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderDecoding {
    /// X1 decoding
    X1,
    /// X2 decoding
    X2,
    /// X4 decoding
    #[default]
    X4,
    /// Two-pulse counting
    TwoPulse,
}

/// Encoder phase states at which the Z index resets the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZIndexPhase {
    /// A high, B high
    #[default]
    AHighBHigh,
    /// A high, B low
    AHighBLow,
    /// A low, B high
    ALowBHigh,
    /// A low, B low
    ALowBLow,
}

/// Units of angular counter measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnits {
    /// Degrees
    #[default]
    Degrees,
    /// Radians
    Radians,
    /// Raw encoder ticks
    Ticks,
}

/// Channel to create on a task.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSpec {
    /// Analog voltage input channel
    AnalogInVoltage {
        /// Physical channel, e.g. `PXI1Slot2/ai0`
        physical: String,
        /// Terminal configuration
        terminal_config: TerminalConfig,
        /// Expected minimum value in volts
        min: f64,
        /// Expected maximum value in volts
        max: f64,
    },
    /// Analog voltage output channel
    AnalogOutVoltage {
        /// Physical channel, e.g. `PXI1Slot2/ao0`
        physical: String,
        /// Minimum output in volts
        min: f64,
        /// Maximum output in volts
        max: f64,
    },
    /// Digital output port
    DigitalOut {
        /// Physical port, e.g. `PXI1Slot2/port0`
        lines: String,
        /// Line grouping
        grouping: LineGrouping,
    },
    /// Angular encoder counter input
    CounterAngleEncoder {
        /// Physical counter, e.g. `PXI1Slot3/ctr0`
        physical: String,
        /// Quadrature decoding
        decoding: EncoderDecoding,
        /// Whether the Z index resets the count
        z_index_enabled: bool,
        /// Value loaded on Z index
        z_index_value: f64,
        /// Phase at which Z index is honoured
        z_index_phase: ZIndexPhase,
        /// Measurement units
        units: AngleUnits,
        /// Encoder pulses per revolution
        pulses_per_revolution: u32,
        /// Initial angle
        initial_angle: f64,
    },
}

impl ChannelSpec {
    /// Physical channel the channel is created on.
    pub fn physical(&self) -> &str {
        match self {
            Self::AnalogInVoltage { physical, .. }
            | Self::AnalogOutVoltage { physical, .. }
            | Self::CounterAngleEncoder { physical, .. } => physical,
            Self::DigitalOut { lines, .. } => lines,
        }
    }
}

/// Sample clock timing for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleClock {
    /// Clock source terminal; empty means the task's own onboard clock
    pub source: String,
    /// Sampling rate in Hz
    pub rate: f64,
    /// Active edge
    pub edge: TriggerEdge,
    /// Sampling mode
    pub mode: SamplingMode,
    /// Samples per channel
    pub samples_per_channel: u64,
}

/// Primitives a vendor DAQ driver must offer.
///
/// Calls are synchronous and blocking; `timeout` bounds every transfer. All
/// methods take `&mut self` because the session is the single controlling
/// owner and providers are not expected to be reentrant.
pub trait HardwareProvider {
    /// Names of all devices known to the driver.
    fn device_names(&mut self) -> ProviderResult<Vec<String>>;

    /// Product type, serial number and simulation flag of a device.
    fn device_attributes(&mut self, device: &str) -> ProviderResult<DeviceAttributes>;

    /// Physical channels of one I/O class on a device.
    fn physical_channels(&mut self, device: &str, io_mode: IoMode) -> ProviderResult<Vec<String>>;

    /// All routable terminals of a device.
    fn device_terminals(&mut self, device: &str) -> ProviderResult<Vec<String>>;

    /// Create an empty task.
    fn create_task(&mut self) -> ProviderResult<TaskHandle>;

    /// Add a channel to a task.
    fn create_channel(&mut self, task: TaskHandle, channel: &ChannelSpec) -> ProviderResult<()>;

    /// Configure sample clock timing on a task.
    fn configure_sample_clock(&mut self, task: TaskHandle, clock: &SampleClock)
        -> ProviderResult<()>;

    /// Report late hardware-timed samples as warnings instead of errors.
    fn set_late_errors_to_warnings(&mut self, task: TaskHandle, enabled: bool)
        -> ProviderResult<()>;

    /// Start a task.
    fn start_task(&mut self, task: TaskHandle) -> ProviderResult<()>;

    /// Stop a task.
    fn stop_task(&mut self, task: TaskHandle) -> ProviderResult<()>;

    /// Release a task and its channels.
    fn clear_task(&mut self, task: TaskHandle) -> ProviderResult<()>;

    /// Read one scan of analog samples into `data`, one element per channel.
    fn read_analog_f64(
        &mut self,
        task: TaskHandle,
        samples_per_channel: i32,
        timeout: Duration,
        data: &mut [f64],
    ) -> ProviderResult<usize>;

    /// Write one scan of analog samples.
    fn write_analog_f64(
        &mut self,
        task: TaskHandle,
        samples_per_channel: i32,
        auto_start: bool,
        timeout: Duration,
        data: &[f64],
    ) -> ProviderResult<usize>;

    /// Write one scan of digital port words.
    fn write_digital_u32(
        &mut self,
        task: TaskHandle,
        samples_per_channel: i32,
        auto_start: bool,
        timeout: Duration,
        data: &[u32],
    ) -> ProviderResult<usize>;

    /// Read counter measurements.
    fn read_counter_f64(
        &mut self,
        task: TaskHandle,
        samples_per_channel: i32,
        timeout: Duration,
        data: &mut [f64],
    ) -> ProviderResult<usize>;

    /// Block until the task's next sample clock tick.
    ///
    /// Returns `true` when the provider flagged the sample as late.
    fn wait_for_next_sample_clock(&mut self, task: TaskHandle, timeout: Duration)
        -> ProviderResult<bool>;
}
