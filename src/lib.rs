//! # quickDAQ
//!
//! An Arduino-style `pin_mode` / read / write layer over multi-channel data
//! acquisition devices. Callers bind physical channels to roles, pick a
//! sample rate and then move samples with one call per class, while the
//! library creates the underlying tasks, routes one shared sample clock
//! through all of them and keeps their buffers.
//!
//! ## Crate Structure
//!
//! - **`session`**: The owning [`Session`] object and its [`Status`] machine.
//! - **`lifecycle`**: `initialize`, `configure_sampling`, `start`, `stop`, `terminate`.
//! - **`binding`**: `set_pin_mode`, task allocation and the pin-to-buffer mapping.
//! - **`dispatch`**: Bulk transfers, single-pin accessors and `sync_sampling`.
//! - **`catalog`**: Enumerated devices and their pin descriptors.
//! - **`task`**: Tasks, task buffers and the ordered task registry.
//! - **`clock`**: Shared sample clock resolution by class priority.
//! - **`provider`**: The [`HardwareProvider`] seam and the in-memory
//!   [`SimulatedProvider`].
//! - **`config`**: Figment-backed [`DaqConfig`].
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: [`QuickDaqError`] and the numeric [`ErrorCode`]s.
//!
//! ## Example
//!
//! ```
//! use quick_daq::{IoMode, Session, SimulatedDevice, SimulatedProvider, Status};
//!
//! # fn main() -> quick_daq::Result<()> {
//! let provider = SimulatedProvider::new(vec![SimulatedDevice::new("PXI1Slot2")
//!     .channels(IoMode::AnalogIn, 4)
//!     .channels(IoMode::AnalogOut, 4)
//!     .loopback(true)]);
//! let mut daq = Session::with_defaults(provider);
//!
//! daq.initialize()?;
//! daq.set_pin_mode(2, IoMode::AnalogIn, 0)?;
//! daq.set_pin_mode(2, IoMode::AnalogOut, 0)?;
//! daq.configure_sampling_from_config()?;
//! daq.start()?;
//!
//! daq.set_analog_out_pin(2, 0, 1.25)?;
//! daq.write_analog(2)?;
//! daq.read_analog(2)?;
//! assert_eq!(daq.get_analog_in_pin(2, 0)?, Some(1.25));
//!
//! daq.stop()?;
//! daq.terminate()?;
//! assert_eq!(daq.status(), Status::Nascent);
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod io_mode;
pub mod lifecycle;
pub mod logging;
pub mod provider;
pub mod session;
pub mod task;

pub use config::DaqConfig;
pub use error::{ErrorCode, QuickDaqError, Result};
pub use io_mode::{IoMode, SamplingMode, TriggerEdge};
pub use provider::{HardwareProvider, SimulatedDevice, SimulatedProvider};
pub use session::{Session, Status};
