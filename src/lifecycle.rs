//! Lifecycle controller.
//!
//! Drives a [`Session`] through its status machine: enumerate devices,
//! apply sample clock timing, start and stop the registered tasks and tear
//! everything down again. Each operation checks the status first and is a
//! logged no-op when called out of order.

use tracing::{debug, info, warn};

use crate::catalog::{matching_devices, DeviceCatalog};
use crate::clock::ClockSource;
use crate::config::MAX_PREFIX_LEN;
use crate::error::{ErrorCode, QuickDaqError, Result};
use crate::io_mode::{IoMode, SamplingMode, TriggerEdge};
use crate::provider::{HardwareProvider, SampleClock};
use crate::session::{Session, Status};
use crate::task::TaskId;

impl<P: HardwareProvider> Session<P> {
    /// Enumerate devices and enter `Initialized`.
    ///
    /// A session that is not nascent is terminated first. Finding no device
    /// with the configured prefix is fatal.
    pub fn initialize(&mut self) -> Result<()> {
        if self.status != Status::Nascent {
            warn!(
                status = %self.status,
                "Library was active and will be reset before enumerating devices"
            );
            if let Err(err) = self.terminate() {
                warn!(error = %err, "Reset before enumeration was incomplete");
            }
        }

        let enumerated = DeviceCatalog::enumerate(&mut self.provider, &self.prefix);
        let catalog = self.check(enumerated)?;
        if catalog.is_empty() {
            return Err(self.fatal(QuickDaqError::NoDevices {
                prefix: self.prefix.clone(),
            }));
        }
        info!("Enumerated devices\n{catalog}");

        self.catalog = Some(catalog);
        self.registry.clear();
        self.clock = ClockSource::new();
        self.late_sample = false;
        self.set_error(ErrorCode::None);
        self.set_status(Status::Initialized);
        Ok(())
    }

    /// Change the device name prefix.
    ///
    /// Only allowed on a nascent session before enumeration.
    pub fn set_device_prefix(&mut self, prefix: &str) -> Result<()> {
        if self.status != Status::Nascent || self.catalog.is_some() {
            warn!(
                prefix,
                "Before setting a new device prefix the library must be reset and devices not enumerated"
            );
            return Err(QuickDaqError::PrefixLocked);
        }
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
            return Err(QuickDaqError::InvalidConfig(format!(
                "Device prefix '{prefix}' must be 1-{MAX_PREFIX_LEN} characters"
            )));
        }
        debug!(prefix, "Device prefix set");
        self.prefix = prefix.to_string();
        Ok(())
    }

    /// Sample on the rising clock edge.
    pub fn set_active_edge_rising(&mut self) {
        self.set_active_edge(TriggerEdge::Rising);
    }

    /// Sample on the falling clock edge.
    pub fn set_active_edge_falling(&mut self) {
        self.set_active_edge(TriggerEdge::Falling);
    }

    fn set_active_edge(&mut self, edge: TriggerEdge) {
        if matches!(self.status, Status::Nascent | Status::Initialized) {
            self.trigger_edge = edge;
        } else {
            debug!(status = %self.status, ?edge, "Ignoring trigger edge change");
        }
    }

    /// Apply sample clock timing to every registered task.
    ///
    /// The first timed task in the registry runs from its own clock; every
    /// other timed task is slaved to `trigger_source`, or to the resolved
    /// shared clock when none is given. Digital tasks are on-demand and keep
    /// no timing. Enters `Ready` when at least one task is registered.
    pub fn configure_sampling(
        &mut self,
        mode: SamplingMode,
        rate: f64,
        trigger_source: Option<&str>,
        edge: TriggerEdge,
        samples_per_channel: u64,
    ) -> Result<()> {
        if self.status != Status::Initialized {
            debug!(status = %self.status, "Ignoring sample clock configuration");
            return Ok(());
        }

        self.sampling_mode = mode;
        self.trigger_edge = edge;
        let shared = trigger_source
            .map(str::to_string)
            .unwrap_or_else(|| self.clock.terminal().to_string());
        info!(
            mode = mode.raw(),
            rate,
            "Setting up sample clock timing with sample mode {mode} at {rate:.2} Hz"
        );

        let order: Vec<TaskId> = self.registry.iter().collect();
        let mut first = true;
        for id in order {
            let (handle, io_mode) = {
                let task = &self.tasks[id];
                (task.handle(), task.io_mode())
            };
            if io_mode.is_on_demand() {
                debug!(task = handle.0, %io_mode, "On-demand task, no sample clock");
                continue;
            }

            let source = if first { String::new() } else { shared.clone() };
            first = false;
            let clock = SampleClock {
                source,
                rate,
                edge,
                mode,
                samples_per_channel,
            };
            let configured = self.provider.configure_sample_clock(handle, &clock);
            self.check(configured)?;
            if mode == SamplingMode::HwClocked {
                let late = self.provider.set_late_errors_to_warnings(handle, true);
                self.check(late)?;
            }
            debug!(task = handle.0, %io_mode, clock = %clock.source, "Sample clock configured");
        }

        if !self.registry.is_empty() {
            self.set_status(Status::Ready);
        }
        Ok(())
    }

    /// [`configure_sampling`](Self::configure_sampling) with the `timing`
    /// section of the configuration and the session's active edge.
    pub fn configure_sampling_from_config(&mut self) -> Result<()> {
        let timing = self.config.timing.clone();
        self.configure_sampling(
            timing.sampling_mode,
            timing.sampling_rate,
            None,
            self.trigger_edge,
            timing.samples_per_channel,
        )
    }

    /// Allocate task buffers and start every registered task.
    pub fn start(&mut self) -> Result<()> {
        if self.status != Status::Ready {
            debug!(status = %self.status, "Ignoring start");
            return Ok(());
        }

        info!("Starting {} tasks", self.registry.len());
        if let Some(catalog) = &self.catalog {
            info!(
                ai_pins = catalog.bound_count(IoMode::AnalogIn),
                ao_pins = catalog.bound_count(IoMode::AnalogOut),
                di_pins = catalog.bound_count(IoMode::DigitalIn),
                do_pins = catalog.bound_count(IoMode::DigitalOut),
                ci_pins = catalog.bound_count(IoMode::CounterAngleIn),
                co_pins = catalog.bound_count(IoMode::CounterTickOut),
                "Detected bound pins"
            );
        }

        let order: Vec<TaskId> = self.registry.iter().collect();
        for id in order {
            self.tasks[id].allocate_buffer();
            let handle = self.tasks[id].handle();
            let started = self.provider.start_task(handle);
            self.check(started)?;
            debug!(task = handle.0, "Started task");
        }

        self.set_status(Status::Running);
        Ok(())
    }

    /// Stop every registered task and release its buffer.
    pub fn stop(&mut self) -> Result<()> {
        if self.status != Status::Running {
            debug!(status = %self.status, "Ignoring stop");
            return Ok(());
        }

        let order: Vec<TaskId> = self.registry.iter().collect();
        for id in order {
            let handle = self.tasks[id].handle();
            let stopped = self.provider.stop_task(handle);
            self.check(stopped)?;
            self.tasks[id].release_buffer();
        }

        self.set_status(Status::Ready);
        Ok(())
    }

    /// Stop and clear every task and forget the catalog.
    ///
    /// Cleanup always runs to completion; provider failures along the way
    /// are collected into [`QuickDaqError::ShutdownFailed`]. The session ends
    /// `Nascent` and can be initialized again.
    pub fn terminate(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for task in self.tasks.drain() {
            let handle = task.handle();
            if let Err(err) = self.provider.stop_task(handle) {
                warn!(task = handle.0, error = %err, "Failed to stop task");
                failures.push(QuickDaqError::Hardware(err));
            }
            if let Err(err) = self.provider.clear_task(handle) {
                warn!(task = handle.0, error = %err, "Failed to clear task");
                failures.push(QuickDaqError::Hardware(err));
            }
        }

        self.registry.clear();
        self.catalog = None;
        self.clock = ClockSource::new();
        self.late_sample = false;
        self.set_status(Status::Nascent);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(QuickDaqError::ShutdownFailed(failures))
        }
    }

    /// Check that the provider still reports the enumerated devices.
    pub fn verify_devices(&mut self) -> Result<()> {
        let Some(expected) = self.catalog.as_ref().map(DeviceCatalog::names) else {
            debug!("No catalog to verify");
            return Ok(());
        };

        let names = self.provider.device_names();
        let mut found: Vec<String> = matching_devices(self.check(names)?, &self.prefix)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        let mut sorted = expected.clone();
        sorted.sort();
        found.sort();

        if sorted != found {
            warn!(?expected, ?found, "{}", ErrorCode::DevicesChanged.description());
            self.set_error(ErrorCode::DevicesChanged);
            return Err(QuickDaqError::DevicesChanged { expected, found });
        }
        Ok(())
    }

    /// List and log the routable terminals of a device.
    pub fn enumerate_terminals(&mut self, device: u32) -> Result<Vec<String>> {
        let name = format!("{}{}", self.prefix, device);
        let listed = self.provider.device_terminals(&name);
        let terminals = self.check(listed)?;
        for (i, terminal) in terminals.iter().enumerate() {
            debug!(device = %name, "Terminal {}: {}", i + 1, terminal);
        }
        info!(device = %name, count = terminals.len(), "Enumerated terminals");
        Ok(terminals)
    }
}
