//! Configuration using Figment
//!
//! [`DaqConfig`] holds every default a session falls back to: device name
//! prefix, channel ranges, counter decoding, sample timing, transfer
//! timeouts, logging and the simulated device set. It is layered from:
//! 1. Built-in defaults ([`DaqConfig::default`])
//! 2. A TOML file (`config/quickdaq.toml` unless a path is given)
//! 3. Environment variables prefixed with `QUICKDAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use quick_daq::config::DaqConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // QUICKDAQ_TIMING__SAMPLING_RATE=500 overrides the file
//! let config = DaqConfig::load()?;
//! config.validate()?;
//! println!("Prefix: {}", config.device_prefix);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{QuickDaqError, Result};
use crate::io_mode::{SamplingMode, TriggerEdge};
use crate::logging::OutputFormat;
use crate::provider::{AngleUnits, EncoderDecoding, LineGrouping, TerminalConfig, ZIndexPhase};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/quickdaq.toml";

/// Longest device prefix accepted by the driver.
pub const MAX_PREFIX_LEN: usize = 14;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    /// Device name prefix; device ids are the numeric suffix after it
    pub device_prefix: String,
    /// Analog input channel defaults
    pub analog_in: AnalogInConfig,
    /// Analog output channel defaults
    pub analog_out: AnalogOutConfig,
    /// Digital output defaults
    pub digital: DigitalConfig,
    /// Angular encoder defaults
    pub counter: CounterConfig,
    /// Sample clock defaults
    pub timing: TimingConfig,
    /// Transfer settings
    pub io: IoConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Simulated hardware
    pub simulation: SimulationConfig,
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            device_prefix: "PXI1Slot".to_string(),
            analog_in: AnalogInConfig::default(),
            analog_out: AnalogOutConfig::default(),
            digital: DigitalConfig::default(),
            counter: CounterConfig::default(),
            timing: TimingConfig::default(),
            io: IoConfig::default(),
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Analog input channel defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogInConfig {
    /// Expected minimum input in volts
    pub min: f64,
    /// Expected maximum input in volts
    pub max: f64,
    /// Terminal configuration
    pub terminal_config: TerminalConfig,
    /// Samples per channel per read; -1 reads whatever is available
    pub samples_per_channel: i32,
}

impl Default for AnalogInConfig {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 10.0,
            terminal_config: TerminalConfig::Default,
            samples_per_channel: -1,
        }
    }
}

/// Analog output channel defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogOutConfig {
    /// Minimum output in volts
    pub min: f64,
    /// Maximum output in volts
    pub max: f64,
}

impl Default for AnalogOutConfig {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 10.0,
        }
    }
}

/// Digital output defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitalConfig {
    /// Line grouping of digital channels
    pub line_grouping: LineGrouping,
}

/// Angular encoder defaults, sized for a CUI AMT103 encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Quadrature decoding
    pub decoding: EncoderDecoding,
    /// Whether the Z index resets the count
    pub z_index_enabled: bool,
    /// Value loaded on Z index
    pub z_index_value: f64,
    /// Phase at which the Z index is honoured
    pub z_index_phase: ZIndexPhase,
    /// Measurement units
    pub units: AngleUnits,
    /// Encoder pulses per revolution
    pub pulses_per_revolution: u32,
    /// Initial angle
    pub initial_angle: f64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            decoding: EncoderDecoding::X4,
            z_index_enabled: false,
            z_index_value: 0.0,
            z_index_phase: ZIndexPhase::AHighBHigh,
            units: AngleUnits::Degrees,
            pulses_per_revolution: 2048,
            initial_angle: 0.0,
        }
    }
}

/// Sample clock defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Sampling mode
    pub sampling_mode: SamplingMode,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Samples per channel per transfer
    pub samples_per_channel: u64,
    /// Active clock edge
    pub trigger_edge: TriggerEdge,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sampling_mode: SamplingMode::HwClocked,
            sampling_rate: 1000.0,
            samples_per_channel: 1,
            trigger_edge: TriggerEdge::Rising,
        }
    }
}

/// Transfer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Timeout of every blocking provider call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Whether analog writes start their task implicitly
    pub analog_auto_start: bool,
    /// Whether digital writes start their task implicitly
    pub digital_auto_start: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            analog_auto_start: false,
            digital_auto_start: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

/// Simulated hardware
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Devices exposed by the simulated provider
    pub devices: Vec<SimulatedDeviceConfig>,
}

/// One simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    /// Numeric id appended to the device prefix
    pub id: u32,
    /// Product type reported for the device
    #[serde(default = "default_product_type")]
    pub product_type: String,
    /// Serial number
    #[serde(default)]
    pub serial: u64,
    /// Analog input channels
    #[serde(default)]
    pub analog_in: u32,
    /// Analog output channels
    #[serde(default)]
    pub analog_out: u32,
    /// Digital input ports
    #[serde(default)]
    pub digital_in: u32,
    /// Digital output ports
    #[serde(default)]
    pub digital_out: u32,
    /// Counter inputs
    #[serde(default)]
    pub counter_in: u32,
    /// Counter outputs
    #[serde(default)]
    pub counter_out: u32,
    /// Feed analog outputs back into analog inputs
    #[serde(default)]
    pub loopback: bool,
}

fn default_product_type() -> String {
    "PXIe-6363".to_string()
}

impl DaqConfig {
    /// Load configuration from `config/quickdaq.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `QUICKDAQ_`.
    /// Example: `QUICKDAQ_LOGGING__LEVEL=debug`
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("QUICKDAQ_").split("__"))
            .extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        if self.device_prefix.is_empty() || self.device_prefix.len() > MAX_PREFIX_LEN {
            return Err(QuickDaqError::InvalidConfig(format!(
                "Invalid device_prefix '{}'. Must be 1-{} characters",
                self.device_prefix, MAX_PREFIX_LEN
            )));
        }

        if self.analog_in.min >= self.analog_in.max {
            return Err(QuickDaqError::InvalidConfig(format!(
                "Invalid analog_in range [{}, {}]",
                self.analog_in.min, self.analog_in.max
            )));
        }
        if self.analog_out.min >= self.analog_out.max {
            return Err(QuickDaqError::InvalidConfig(format!(
                "Invalid analog_out range [{}, {}]",
                self.analog_out.min, self.analog_out.max
            )));
        }

        let rate = self.timing.sampling_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(QuickDaqError::InvalidConfig(format!(
                "Invalid sampling_rate {rate}. Must be a positive number of Hz"
            )));
        }

        if self.io.timeout.is_zero() {
            return Err(QuickDaqError::InvalidConfig(
                "io.timeout must be non-zero".to_string(),
            ));
        }

        crate::logging::parse_log_level(&self.logging.level)
            .map_err(QuickDaqError::InvalidConfig)?;

        let mut ids = HashSet::new();
        for device in &self.simulation.devices {
            if !ids.insert(device.id) {
                return Err(QuickDaqError::InvalidConfig(format!(
                    "Duplicate simulated device id: {}",
                    device.id
                )));
            }
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
