//! The owning session object.
//!
//! A [`Session`] holds everything a quickDAQ run needs: the hardware
//! provider, the device catalog, every task and its buffer, the task
//! registry, the shared clock source and the status machine. Operations are
//! split by concern across [`crate::lifecycle`], [`crate::binding`] and
//! [`crate::dispatch`]; this module keeps the state and the two failure
//! paths they share.
//!
//! # Status machine
//!
//! ```text
//! Nascent --initialize--> Initialized --configure_sampling--> Ready
//!                                                  Ready <--stop-- Running
//!                                                  Ready --start--> Running
//! any --terminate--> Nascent        fatal misuse --> Shutdown
//! provider fault --> Unknown
//! ```
//!
//! Calls made in the wrong status are ignored and return `Ok`.

use std::fmt;

use tracing::{error, info, warn};

use crate::catalog::DeviceCatalog;
use crate::clock::ClockSource;
use crate::config::DaqConfig;
use crate::error::{ErrorCode, ProviderError, ProviderResult, QuickDaqError, Result};
use crate::io_mode::{SamplingMode, TriggerEdge};
use crate::provider::HardwareProvider;
use crate::task::{TaskRegistry, TaskSet};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Fault state entered after a provider error
    Unknown = -99,
    /// Not initialized
    Nascent = -2,
    /// Devices enumerated, pins may be bound
    Initialized = -1,
    /// Sample clock configured
    Ready = 0,
    /// Tasks started
    Running = 1,
    /// Torn down after a fatal configuration error
    Shutdown = 2,
}

impl Status {
    /// Raw numeric value.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Nascent => "quickDAQ is nascent and uninitialized.",
            Self::Initialized => {
                "quickDAQ has been initialized and ready to configure with active I/O."
            }
            Self::Ready => {
                "quickDAQ is ready to run. I/O, sync, clock, and trigger resources reserved."
            }
            Self::Running => "quickDAQ is running and data is being collected now.",
            Self::Shutdown => "quickDAQ has been stopped and resources freed.",
            Self::Unknown => "quickDAQ in an unknown status mode.",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Nascent => "NASCENT",
            Self::Initialized => "INITIALIZED",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Shutdown => "SHUTDOWN",
        };
        write!(f, "STATUS {} (code {})", name, self.code())
    }
}

/// A quickDAQ session over one hardware provider.
///
/// Dropping a session that still owns tasks terminates it.
pub struct Session<P: HardwareProvider> {
    pub(crate) provider: P,
    pub(crate) config: DaqConfig,
    pub(crate) status: Status,
    pub(crate) error: ErrorCode,
    pub(crate) prefix: String,
    pub(crate) catalog: Option<DeviceCatalog>,
    pub(crate) tasks: TaskSet,
    pub(crate) registry: TaskRegistry,
    pub(crate) clock: ClockSource,
    pub(crate) sampling_mode: SamplingMode,
    pub(crate) trigger_edge: TriggerEdge,
    pub(crate) late_sample: bool,
}

impl<P: HardwareProvider> Session<P> {
    /// Create a nascent session.
    pub fn new(provider: P, config: DaqConfig) -> Self {
        Self {
            provider,
            prefix: config.device_prefix.clone(),
            sampling_mode: config.timing.sampling_mode,
            trigger_edge: config.timing.trigger_edge,
            config,
            status: Status::Nascent,
            error: ErrorCode::None,
            catalog: None,
            tasks: TaskSet::default(),
            registry: TaskRegistry::new(),
            clock: ClockSource::new(),
            late_sample: false,
        }
    }

    /// Create a nascent session with default configuration.
    pub fn with_defaults(provider: P) -> Self {
        Self::new(provider, DaqConfig::default())
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Sticky error code of the last failure.
    pub fn error_code(&self) -> ErrorCode {
        self.error
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &DaqConfig {
        &self.config
    }

    /// Hardware provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Device name prefix in effect.
    pub fn device_prefix(&self) -> &str {
        &self.prefix
    }

    /// Enumerated devices, once initialized.
    pub fn catalog(&self) -> Option<&DeviceCatalog> {
        self.catalog.as_ref()
    }

    /// Shared sample clock.
    pub fn clock_source(&self) -> &ClockSource {
        &self.clock
    }

    /// Task registry in timing/start order.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Every task in the session.
    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// Active sampling mode.
    pub fn sampling_mode(&self) -> SamplingMode {
        self.sampling_mode
    }

    /// Active clock edge.
    pub fn trigger_edge(&self) -> TriggerEdge {
        self.trigger_edge
    }

    /// Whether the last `sync_sampling` saw a late sample.
    pub fn late_sample_warning(&self) -> bool {
        self.late_sample
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        if self.status != status {
            info!(code = status.code(), "{}: {}", status, status.description());
        }
        self.status = status;
    }

    pub(crate) fn set_error(&mut self, code: ErrorCode) {
        self.error = code;
    }

    /// Unwrap a provider result, taking the hardware fault path on error.
    pub(crate) fn check<T>(&mut self, result: ProviderResult<T>) -> Result<T> {
        result.map_err(|err| self.hardware_fault(err))
    }

    /// Tear down after a provider error and leave the session `Unknown`.
    pub(crate) fn hardware_fault(&mut self, err: ProviderError) -> QuickDaqError {
        error!(code = err.code, "Provider error {}: {}", err.code, err.message);
        if let Err(cleanup) = self.terminate() {
            warn!(error = %cleanup, "Cleanup after provider error was incomplete");
        }
        self.set_status(Status::Unknown);
        self.set_error(ErrorCode::Hardware);
        QuickDaqError::Hardware(err)
    }

    /// Tear down after invalid I/O and leave the session `Shutdown`.
    pub(crate) fn fatal(&mut self, err: QuickDaqError) -> QuickDaqError {
        error!(error = %err, "FATAL: {}", err.code().description());
        if let Err(cleanup) = self.terminate() {
            warn!(error = %cleanup, "Cleanup after fatal error was incomplete");
        }
        self.set_status(Status::Shutdown);
        self.set_error(err.code());
        err
    }
}

impl<P: HardwareProvider> Drop for Session<P> {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            if let Err(err) = self.terminate() {
                warn!(error = %err, "Session dropped with incomplete cleanup");
            }
        }
    }
}

impl<P: HardwareProvider> fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .field("error", &self.error)
            .field("prefix", &self.prefix)
            .field("devices", &self.catalog.as_ref().map(DeviceCatalog::len))
            .field("tasks", &self.tasks.len())
            .field("clock", &self.clock.terminal())
            .finish()
    }
}
