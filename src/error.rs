//! Error types for quickDAQ sessions.
//!
//! This module defines the primary error type, [`QuickDaqError`], for the whole
//! library. Using the `thiserror` crate it keeps two very different failure
//! families apart:
//!
//! - **Configuration errors** are caller bugs: an out-of-range pin, an I/O class
//!   that cannot be bound, no devices matching the prefix. Some of them are
//!   plain precondition checks ([`QuickDaqError::PinNotBound`]) and leave the
//!   session untouched; the ones the hardware cannot recover from
//!   ([`QuickDaqError::InvalidIo`], [`QuickDaqError::Unsupported`],
//!   [`QuickDaqError::NoDevices`]) tear the session down first.
//! - **Hardware faults** ([`QuickDaqError::Hardware`]) are reported by the
//!   provider. The session is terminated and left in the `Unknown` status
//!   before the error is returned.
//!
//! Every error maps to a numeric [`ErrorCode`] so that a host can mirror the
//! sticky error code and process exit status of classic DAQ front-ends via
//! [`QuickDaqError::exit_code`].

use std::fmt;

use thiserror::Error;

use crate::io_mode::IoMode;

/// Result type alias for quickDAQ operations.
pub type Result<T> = std::result::Result<T, QuickDaqError>;

/// Result type alias for raw provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Sticky numeric error code of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ErrorCode {
    /// Library has encountered an unknown error
    Unknown = -99,
    /// Library is not ready to run
    NotReady = -7,
    /// Unsupported feature requested
    Unsupported = -6,
    /// Invalid or unsupported I/O requested
    InvalidIo = -5,
    /// The hardware provider reported an error
    Hardware = -4,
    /// Detected device list has changed
    DevicesChanged = -3,
    /// No devices detected
    NoDevices = -2,
    /// Pin and task configuration altered outside the configuration state
    NotConfigurable = -1,
    /// No error
    #[default]
    None = 0,
}

impl ErrorCode {
    /// Raw numeric value.
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Unknown => "Undefined error code detected!",
            Self::NotReady => {
                "Library is not ready to run. Configure library, sample clock and pin mode first!"
            }
            Self::Unsupported => {
                "A feature or functionality that is unsupported by quickDAQ requested."
            }
            Self::InvalidIo => "An invalid or unsupported I/O type has been selected.",
            Self::Hardware => "The hardware provider has generated an error.",
            Self::DevicesChanged => "List of devices detected by quickDAQ library has changed.",
            Self::NoDevices => "No devices detected by quickDAQ library.",
            Self::NotConfigurable => {
                "Pin and task configuration may be altered only in the preconfigure state."
            }
            Self::None => "No error has occured.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {}: {}", self.raw(), self.description())
    }
}

/// Failure reported by a [`crate::provider::HardwareProvider`].
///
/// `code` is the provider's own (negative) status code and `message` its
/// extended error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    /// Provider status code
    pub code: i32,
    /// Extended error information
    pub message: String,
}

impl ProviderError {
    /// Create a provider error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can occur while driving a quickDAQ session.
#[derive(Error, Debug)]
pub enum QuickDaqError {
    /// Pin number outside the device's channel count, or unknown device.
    #[error("Invalid I/O requested: Dev {device} | IO mode {io_mode} | pin {pin}")]
    InvalidIo {
        /// Numeric device id
        device: u32,
        /// Requested I/O class
        io_mode: IoMode,
        /// Requested pin
        pin: u32,
    },

    /// I/O class that cannot be bound by this library.
    #[error("Binding {io_mode} pins is not supported")]
    Unsupported {
        /// Requested I/O class
        io_mode: IoMode,
    },

    /// No devices matched the configured prefix.
    #[error("No devices detected with prefix '{prefix}'")]
    NoDevices {
        /// Device name prefix in effect
        prefix: String,
    },

    /// Provider device list differs from the enumerated catalog.
    #[error("Device list has changed since enumeration: expected {expected:?}, found {found:?}")]
    DevicesChanged {
        /// Names in the catalog
        expected: Vec<String>,
        /// Names reported now
        found: Vec<String>,
    },

    /// Single-element accessor used on a pin that was never bound.
    #[error("Pin {pin} of Dev {device} is not bound as {io_mode}")]
    PinNotBound {
        /// Numeric device id
        device: u32,
        /// I/O class of the accessor
        io_mode: IoMode,
        /// Pin number
        pin: u32,
    },

    /// Device prefix may only change before enumeration.
    #[error("Device prefix can only be changed on a reset session before enumeration")]
    PrefixLocked,

    /// Hardware provider failure.
    #[error("Hardware error: {0}")]
    Hardware(#[from] ProviderError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    InvalidConfig(String),

    /// Cleanup completed but some provider calls failed.
    #[error("Shutdown failed with {} errors", .0.len())]
    ShutdownFailed(Vec<QuickDaqError>),
}

impl QuickDaqError {
    /// Sticky error code this error sets on the session.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidIo { .. } | Self::PinNotBound { .. } => ErrorCode::InvalidIo,
            Self::Unsupported { .. } => ErrorCode::Unsupported,
            Self::NoDevices { .. } => ErrorCode::NoDevices,
            Self::DevicesChanged { .. } => ErrorCode::DevicesChanged,
            Self::PrefixLocked => ErrorCode::NotConfigurable,
            Self::Hardware(_) | Self::ShutdownFailed(_) => ErrorCode::Hardware,
            Self::Config(_) | Self::InvalidConfig(_) => ErrorCode::Unknown,
        }
    }

    /// Process exit status for hosts that abort on this error.
    ///
    /// Hardware faults exit with the provider's own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Hardware(err) => err.code,
            other => other.code().raw(),
        }
    }

    /// Whether the session was torn down before this error was returned.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidIo { .. }
                | Self::Unsupported { .. }
                | Self::NoDevices { .. }
                | Self::Hardware(_)
        )
    }

    /// Check if this is a caller-side configuration mistake.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidIo { .. }
                | Self::Unsupported { .. }
                | Self::NoDevices { .. }
                | Self::PinNotBound { .. }
                | Self::PrefixLocked
                | Self::Config(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Check if this is a provider-reported fault.
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware(_) | Self::ShutdownFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuickDaqError::InvalidIo {
            device: 2,
            io_mode: IoMode::AnalogIn,
            pin: 16,
        };
        assert!(err.to_string().contains("Dev 2"));
        assert!(err.to_string().contains("pin 16"));
    }

    #[test]
    fn test_exit_codes() {
        let hw = QuickDaqError::from(ProviderError::new(-200279, "sample clock timeout"));
        assert_eq!(hw.exit_code(), -200279);
        assert_eq!(hw.code(), ErrorCode::Hardware);
        assert!(hw.is_fatal());
        assert!(hw.is_hardware());

        let unsupported = QuickDaqError::Unsupported {
            io_mode: IoMode::DigitalIn,
        };
        assert_eq!(unsupported.exit_code(), -6);
        assert!(unsupported.is_configuration());
    }

    #[test]
    fn test_precondition_errors_are_not_fatal() {
        let err = QuickDaqError::PinNotBound {
            device: 0,
            io_mode: IoMode::AnalogOut,
            pin: 1,
        };
        assert!(!err.is_fatal());
        assert!(!QuickDaqError::PrefixLocked.is_fatal());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::None.raw(), 0);
        assert_eq!(ErrorCode::default(), ErrorCode::None);
        assert!(ErrorCode::NoDevices.to_string().starts_with("ERROR -2"));
    }
}
