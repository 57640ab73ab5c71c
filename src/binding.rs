//! Pin binding and task allocation.
//!
//! `set_pin_mode` turns a (device, class, pin) request into a provider
//! channel. Analog-in, analog-out and digital-out pins of every device share
//! one task per class; each counter pin gets its own task. Binding the same
//! pin twice reuses the first binding.
//!
//! After every bind the shared clock is offered to the pin's class. A task
//! whose bind took over the clock moves to the front of the registry so that
//! the primary (clock-owning) task is always first.

use tracing::{debug, info};

use crate::catalog::Pin;
use crate::error::{QuickDaqError, Result};
use crate::io_mode::IoMode;
use crate::provider::{ChannelSpec, HardwareProvider};
use crate::session::{Session, Status};
use crate::task::{Task, TaskId};

impl<P: HardwareProvider> Session<P> {
    /// Bind physical channel `pin` of `device` as `io_mode`.
    ///
    /// Only legal while `Initialized`; otherwise a logged no-op. An unknown
    /// device or out-of-range pin takes the fatal [`QuickDaqError::InvalidIo`]
    /// path, and digital-in / counter-out requests the fatal
    /// [`QuickDaqError::Unsupported`] path.
    pub fn set_pin_mode(&mut self, device: u32, io_mode: IoMode, pin: u32) -> Result<()> {
        if self.status != Status::Initialized {
            debug!(status = %self.status, device, %io_mode, pin, "Ignoring pin mode request");
            return Ok(());
        }
        if matches!(io_mode, IoMode::DigitalIn | IoMode::CounterTickOut) {
            return Err(self.fatal(QuickDaqError::Unsupported { io_mode }));
        }

        let lookup = self.catalog.as_ref().and_then(|catalog| {
            let dev = catalog.device(device)?;
            let existing = dev.pin(io_mode, pin)?.task();
            Some((
                dev.name().to_string(),
                dev.physical_channel(io_mode, pin),
                existing,
            ))
        });
        let Some((device_name, physical, existing)) = lookup else {
            return Err(self.fatal(QuickDaqError::InvalidIo {
                device,
                io_mode,
                pin,
            }));
        };

        let task_id = match existing {
            Some(task_id) => {
                debug!(device, %io_mode, pin, "Pin already bound");
                task_id
            }
            None => self.bind_new_pin(device, io_mode, pin, physical)?,
        };

        if self.clock.resolve(device, &device_name, io_mode) {
            self.registry.push_front(task_id);
        } else {
            self.registry.push_back(task_id);
        }
        info!(device, %io_mode, pin, clock = %self.clock, "Set pin mode");
        Ok(())
    }

    fn bind_new_pin(
        &mut self,
        device: u32,
        io_mode: IoMode,
        pin: u32,
        physical: String,
    ) -> Result<TaskId> {
        let task_id = match self.tasks.singleton(io_mode) {
            Some(task_id) if !io_mode.is_counter() => task_id,
            _ => {
                let created = self.provider.create_task();
                let handle = self.check(created)?;
                debug!(task = handle.0, %io_mode, "Created task");
                self.tasks.insert(Task::new(handle, io_mode))
            }
        };

        let spec = self.channel_spec(io_mode, physical);
        let handle = self.tasks[task_id].handle();
        let created = self.provider.create_channel(handle, &spec);
        self.check(created)?;

        let offset = self.tasks[task_id].add_pin();
        if let Some(slot) = self
            .catalog
            .as_mut()
            .and_then(|catalog| catalog.device_mut(device))
            .and_then(|dev| dev.pin_mut(io_mode, pin))
        {
            slot.bind(task_id, offset);
        }
        debug!(device, %io_mode, pin, offset, channel = %spec.physical(), "Created channel");
        Ok(task_id)
    }

    fn channel_spec(&self, io_mode: IoMode, physical: String) -> ChannelSpec {
        let config = &self.config;
        match io_mode {
            IoMode::AnalogIn => ChannelSpec::AnalogInVoltage {
                physical,
                terminal_config: config.analog_in.terminal_config,
                min: config.analog_in.min,
                max: config.analog_in.max,
            },
            IoMode::AnalogOut => ChannelSpec::AnalogOutVoltage {
                physical,
                min: config.analog_out.min,
                max: config.analog_out.max,
            },
            IoMode::DigitalIn | IoMode::DigitalOut => ChannelSpec::DigitalOut {
                lines: physical,
                grouping: config.digital.line_grouping,
            },
            IoMode::CounterAngleIn | IoMode::CounterTickOut => ChannelSpec::CounterAngleEncoder {
                physical,
                decoding: config.counter.decoding,
                z_index_enabled: config.counter.z_index_enabled,
                z_index_value: config.counter.z_index_value,
                z_index_phase: config.counter.z_index_phase,
                units: config.counter.units,
                pulses_per_revolution: config.counter.pulses_per_revolution,
                initial_angle: config.counter.initial_angle,
            },
        }
    }

    /// Binding record of a pin, if the session is initialized and the pin exists.
    pub fn pin(&self, device: u32, io_mode: IoMode, pin: u32) -> Option<&Pin> {
        self.catalog.as_ref()?.device(device)?.pin(io_mode, pin)
    }
}
