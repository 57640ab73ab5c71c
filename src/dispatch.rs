//! Read/write dispatch.
//!
//! Bulk transfers move a whole task buffer to or from the provider. The
//! `*_into` / `*_from` variants copy between a caller buffer and the task
//! buffer around the same transfer, over the prefix both buffers share.
//!
//! Single-element accessors only touch the task buffer at the pin's offset;
//! nothing reaches the hardware until the next bulk transfer. Everything
//! here is a no-op unless the session is `Running`.
//!
//! The `device` argument of a bulk transfer picks the task through the
//! device's bound pins. Since analog and digital tasks are shared by all
//! devices, such a transfer moves every bound pin of that class.

use tracing::{debug, warn};

use crate::error::{QuickDaqError, Result};
use crate::io_mode::{IoMode, SamplingMode};
use crate::provider::HardwareProvider;
use crate::session::{Session, Status};
use crate::task::{TaskBuffer, TaskId};

/// Bits in a digital port word.
pub const PORT_WIDTH: u8 = 32;

impl<P: HardwareProvider> Session<P> {
    fn running(&self, op: &'static str) -> bool {
        let running = self.status == Status::Running;
        if !running {
            debug!(status = %self.status, op, "Ignoring transfer outside Running");
        }
        running
    }

    /// Task holding `device`'s bound pins of a non-counter class.
    fn class_task(&self, device: u32, io_mode: IoMode) -> Option<TaskId> {
        let task = self
            .catalog
            .as_ref()?
            .device(device)?
            .pins(io_mode)
            .iter()
            .find_map(|pin| pin.task());
        if task.is_none() {
            debug!(device, %io_mode, "No bound pins for transfer");
        }
        task
    }

    /// Task and buffer offset of a bound pin.
    fn bound_pin(&self, device: u32, io_mode: IoMode, pin: u32) -> Result<(TaskId, usize)> {
        self.pin(device, io_mode, pin)
            .and_then(|p| p.task().zip(p.offset()))
            .ok_or(QuickDaqError::PinNotBound {
                device,
                io_mode,
                pin,
            })
    }

    /// Read one scan of every bound analog input into the task buffer.
    pub fn read_analog(&mut self, device: u32) -> Result<()> {
        if !self.running("read_analog") {
            return Ok(());
        }
        let Some(id) = self.class_task(device, IoMode::AnalogIn) else {
            return Ok(());
        };
        let samples = self.config.analog_in.samples_per_channel;
        let timeout = self.config.io.timeout;
        let task = &mut self.tasks[id];
        let handle = task.handle();
        let Some(buffer) = task.buffer_mut().and_then(TaskBuffer::as_float_mut) else {
            return Ok(());
        };
        let read = self.provider.read_analog_f64(handle, samples, timeout, buffer);
        self.check(read)?;
        Ok(())
    }

    /// [`read_analog`](Self::read_analog), then copy the samples out.
    pub fn read_analog_into(&mut self, device: u32, out: &mut [f64]) -> Result<()> {
        if !self.running("read_analog_into") {
            return Ok(());
        }
        self.read_analog(device)?;
        if let Some(samples) = self.float_buffer(device, IoMode::AnalogIn) {
            let n = samples.len().min(out.len());
            out[..n].copy_from_slice(&samples[..n]);
        }
        Ok(())
    }

    /// Write the analog output task buffer to the hardware.
    pub fn write_analog(&mut self, device: u32) -> Result<()> {
        if !self.running("write_analog") {
            return Ok(());
        }
        let Some(id) = self.class_task(device, IoMode::AnalogOut) else {
            return Ok(());
        };
        let auto_start = self.config.io.analog_auto_start;
        let timeout = self.config.io.timeout;
        let task = &self.tasks[id];
        let Some(buffer) = task.buffer().and_then(TaskBuffer::as_float) else {
            return Ok(());
        };
        let written = self
            .provider
            .write_analog_f64(task.handle(), 1, auto_start, timeout, buffer);
        self.check(written)?;
        Ok(())
    }

    /// Copy `data` into the analog output buffer, then write it.
    pub fn write_analog_from(&mut self, device: u32, data: &[f64]) -> Result<()> {
        if !self.running("write_analog_from") {
            return Ok(());
        }
        if let Some(buffer) = self.float_buffer_mut(device, IoMode::AnalogOut) {
            let n = buffer.len().min(data.len());
            buffer[..n].copy_from_slice(&data[..n]);
        }
        self.write_analog(device)
    }

    /// Write the digital output task buffer to the hardware.
    pub fn write_digital(&mut self, device: u32) -> Result<()> {
        if !self.running("write_digital") {
            return Ok(());
        }
        let Some(id) = self.class_task(device, IoMode::DigitalOut) else {
            return Ok(());
        };
        let auto_start = self.config.io.digital_auto_start;
        let timeout = self.config.io.timeout;
        let task = &self.tasks[id];
        let Some(buffer) = task.buffer().and_then(TaskBuffer::as_digital) else {
            return Ok(());
        };
        let written = self
            .provider
            .write_digital_u32(task.handle(), 1, auto_start, timeout, buffer);
        self.check(written)?;
        Ok(())
    }

    /// Copy `data` into the digital output buffer, then write it.
    pub fn write_digital_from(&mut self, device: u32, data: &[u32]) -> Result<()> {
        if !self.running("write_digital_from") {
            return Ok(());
        }
        if let Some(id) = self.class_task(device, IoMode::DigitalOut) {
            if let Some(buffer) = self.tasks[id]
                .buffer_mut()
                .and_then(TaskBuffer::as_digital_mut)
            {
                let n = buffer.len().min(data.len());
                buffer[..n].copy_from_slice(&data[..n]);
            }
        }
        self.write_digital(device)
    }

    /// Read counter `counter` of `device` into its task buffer.
    pub fn read_counter_angle(&mut self, device: u32, counter: u32) -> Result<()> {
        if !self.running("read_counter_angle") {
            return Ok(());
        }
        let Some(id) = self.pin(device, IoMode::CounterAngleIn, counter).and_then(|p| p.task())
        else {
            debug!(device, counter, "Counter not bound");
            return Ok(());
        };
        let timeout = self.config.io.timeout;
        let task = &mut self.tasks[id];
        let handle = task.handle();
        let Some(buffer) = task.buffer_mut().and_then(TaskBuffer::as_float_mut) else {
            return Ok(());
        };
        let read = self.provider.read_counter_f64(handle, 1, timeout, buffer);
        self.check(read)?;
        Ok(())
    }

    /// [`read_counter_angle`](Self::read_counter_angle), then copy the angle out.
    pub fn read_counter_angle_into(
        &mut self,
        device: u32,
        counter: u32,
        out: &mut [f64],
    ) -> Result<()> {
        if !self.running("read_counter_angle_into") {
            return Ok(());
        }
        self.read_counter_angle(device, counter)?;
        let angles = self
            .pin(device, IoMode::CounterAngleIn, counter)
            .and_then(|p| p.task())
            .and_then(|id| self.tasks[id].buffer())
            .and_then(TaskBuffer::as_float);
        if let Some(angles) = angles {
            let n = angles.len().min(out.len());
            out[..n].copy_from_slice(&angles[..n]);
        }
        Ok(())
    }

    /// Last sample read for an analog input pin.
    ///
    /// `Ok(None)` outside `Running`.
    pub fn get_analog_in_pin(&self, device: u32, pin: u32) -> Result<Option<f64>> {
        self.get_float(device, IoMode::AnalogIn, pin)
    }

    /// Stage a value for an analog output pin.
    pub fn set_analog_out_pin(&mut self, device: u32, pin: u32, value: f64) -> Result<()> {
        if !self.running("set_analog_out_pin") {
            return Ok(());
        }
        let (id, offset) = self.bound_pin(device, IoMode::AnalogOut, pin)?;
        if let Some(slot) = self.tasks[id]
            .buffer_mut()
            .and_then(TaskBuffer::as_float_mut)
            .and_then(|b| b.get_mut(offset))
        {
            *slot = value;
        }
        Ok(())
    }

    /// Last angle read for a counter.
    ///
    /// `Ok(None)` outside `Running`.
    pub fn get_counter_angle(&self, device: u32, counter: u32) -> Result<Option<f64>> {
        self.get_float(device, IoMode::CounterAngleIn, counter)
    }

    /// Stage a whole word for a digital output port.
    pub fn set_digital_out_port(&mut self, device: u32, port: u32, word: u32) -> Result<()> {
        if !self.running("set_digital_out_port") {
            return Ok(());
        }
        let (id, offset) = self.bound_pin(device, IoMode::DigitalOut, port)?;
        if let Some(slot) = self.digital_slot(id, offset) {
            *slot = word;
        }
        Ok(())
    }

    /// Set or clear one line of a digital output port in the staged word.
    ///
    /// A line outside the port width takes the fatal invalid I/O path.
    pub fn set_digital_out_pin(
        &mut self,
        device: u32,
        port: u32,
        line: u8,
        state: bool,
    ) -> Result<()> {
        if !self.running("set_digital_out_pin") {
            return Ok(());
        }
        if line >= PORT_WIDTH {
            return Err(self.fatal(QuickDaqError::InvalidIo {
                device,
                io_mode: IoMode::DigitalOut,
                pin: u32::from(line),
            }));
        }
        let (id, offset) = self.bound_pin(device, IoMode::DigitalOut, port)?;
        if let Some(slot) = self.digital_slot(id, offset) {
            let mask = 1u32 << line;
            if state {
                *slot |= mask;
            } else {
                *slot &= !mask;
            }
        }
        Ok(())
    }

    /// Set one digital line and write the port out immediately.
    pub fn write_digital_pin(&mut self, device: u32, port: u32, line: u8, state: bool) -> Result<()> {
        if !self.running("write_digital_pin") {
            return Ok(());
        }
        self.set_digital_out_pin(device, port, line, state)?;
        self.write_digital(device)
    }

    /// Block until the primary task's next sample clock tick.
    ///
    /// Only waits in hardware-timed mode while running. A late sample is
    /// recorded in [`late_sample_warning`](Self::late_sample_warning).
    pub fn sync_sampling(&mut self) -> Result<()> {
        if !self.running("sync_sampling") || self.sampling_mode != SamplingMode::HwClocked {
            return Ok(());
        }
        let Some(primary) = self.registry.first() else {
            return Ok(());
        };
        let handle = self.tasks[primary].handle();
        let waited = self
            .provider
            .wait_for_next_sample_clock(handle, self.config.io.timeout);
        self.late_sample = self.check(waited)?;
        if self.late_sample {
            warn!(task = handle.0, "Sample clock tick was late");
        }
        Ok(())
    }

    fn get_float(&self, device: u32, io_mode: IoMode, pin: u32) -> Result<Option<f64>> {
        if self.status != Status::Running {
            return Ok(None);
        }
        let (id, offset) = self.bound_pin(device, io_mode, pin)?;
        Ok(self.tasks[id]
            .buffer()
            .and_then(TaskBuffer::as_float)
            .and_then(|b| b.get(offset))
            .copied())
    }

    fn float_buffer(&self, device: u32, io_mode: IoMode) -> Option<&[f64]> {
        let id = self.class_task(device, io_mode)?;
        self.tasks[id].buffer().and_then(TaskBuffer::as_float)
    }

    fn float_buffer_mut(&mut self, device: u32, io_mode: IoMode) -> Option<&mut [f64]> {
        let id = self.class_task(device, io_mode)?;
        self.tasks[id].buffer_mut().and_then(TaskBuffer::as_float_mut)
    }

    fn digital_slot(&mut self, id: TaskId, offset: usize) -> Option<&mut u32> {
        self.tasks[id]
            .buffer_mut()
            .and_then(TaskBuffer::as_digital_mut)
            .and_then(|b| b.get_mut(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Operation, SimulatedDevice, SimulatedProvider};

    fn running() -> (SimulatedProvider, Session<SimulatedProvider>) {
        let provider = SimulatedProvider::new(vec![SimulatedDevice::new("PXI1Slot2")
            .channels(IoMode::AnalogIn, 4)
            .channels(IoMode::AnalogOut, 4)
            .channels(IoMode::DigitalOut, 2)
            .channels(IoMode::CounterAngleIn, 2)
            .loopback(true)]);
        let mut session = Session::with_defaults(provider.clone());
        session.initialize().unwrap();
        for pin in 0..2 {
            session.set_pin_mode(2, IoMode::AnalogIn, pin).unwrap();
            session.set_pin_mode(2, IoMode::AnalogOut, pin).unwrap();
        }
        session.set_pin_mode(2, IoMode::DigitalOut, 1).unwrap();
        session.set_pin_mode(2, IoMode::CounterAngleIn, 0).unwrap();
        session.configure_sampling_from_config().unwrap();
        session.start().unwrap();
        (provider, session)
    }

    #[test]
    fn test_analog_loopback_round_trip() {
        let (_, mut session) = running();
        session.set_analog_out_pin(2, 1, 2.5).unwrap();
        session.write_analog(2).unwrap();
        session.read_analog(2).unwrap();
        assert_eq!(session.get_analog_in_pin(2, 1).unwrap(), Some(2.5));
        assert_eq!(session.get_analog_in_pin(2, 0).unwrap(), Some(0.0));
    }

    #[test]
    fn test_external_buffers_copy_overlapping_prefix() {
        let (provider, mut session) = running();
        session.write_analog_from(2, &[1.0, -1.0, 9.0]).unwrap();
        assert_eq!(provider.analog_out_value("PXI1Slot2/ao0"), Some(1.0));
        assert_eq!(provider.analog_out_value("PXI1Slot2/ao1"), Some(-1.0));

        let mut out = [f64::NAN; 1];
        session.read_analog_into(2, &mut out).unwrap();
        assert_eq!(out, [1.0]);
    }

    #[test]
    fn test_digital_read_modify_write() {
        let (provider, mut session) = running();
        session.set_digital_out_port(2, 1, 0b1000).unwrap();
        session.write_digital_pin(2, 1, 0, true).unwrap();
        assert_eq!(provider.digital_out_value("PXI1Slot2/port1"), Some(0b1001));

        session.write_digital_pin(2, 1, 3, false).unwrap();
        assert_eq!(provider.digital_out_value("PXI1Slot2/port1"), Some(0b0001));

        session.write_digital_from(2, &[0xFF]).unwrap();
        assert_eq!(provider.digital_out_value("PXI1Slot2/port1"), Some(0xFF));
    }

    #[test]
    fn test_counter_angle() {
        let (provider, mut session) = running();
        provider.set_counter_angle("PXI1Slot2/ctr0", 90.0);
        session.read_counter_angle(2, 0).unwrap();
        assert_eq!(session.get_counter_angle(2, 0).unwrap(), Some(90.0));

        let mut out = [0.0; 4];
        session.read_counter_angle_into(2, 0, &mut out).unwrap();
        assert_eq!(out, [90.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unbound_accessor_is_not_fatal() {
        let (_, mut session) = running();
        let err = session.set_analog_out_pin(2, 3, 1.0).unwrap_err();
        assert!(matches!(err, QuickDaqError::PinNotBound { pin: 3, .. }));
        assert!(!err.is_fatal());
        assert_eq!(session.status(), Status::Running);
    }

    #[test]
    fn test_transfers_are_noops_when_not_running() {
        let (provider, mut session) = running();
        session.stop().unwrap();
        let writes = provider.calls(Operation::WriteAnalog);
        session.write_analog(2).unwrap();
        session.set_analog_out_pin(2, 0, 1.0).unwrap();
        session.sync_sampling().unwrap();
        assert_eq!(provider.calls(Operation::WriteAnalog), writes);
        assert_eq!(session.get_analog_in_pin(2, 0).unwrap(), None);
    }

    #[test]
    fn test_sync_sampling_waits_on_primary() {
        let (provider, mut session) = running();
        session.sync_sampling().unwrap();
        assert_eq!(provider.ticks(), 1);
        assert!(!session.late_sample_warning());

        provider.set_late(true);
        session.sync_sampling().unwrap();
        assert!(session.late_sample_warning());
    }

    #[test]
    fn test_line_outside_port_is_fatal() {
        let (_, mut session) = running();
        let err = session.set_digital_out_pin(2, 1, 32, true).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(session.status(), Status::Shutdown);
    }

    #[test]
    fn test_read_fault_leaves_unknown() {
        let (provider, mut session) = running();
        provider.fail_on(
            Operation::ReadAnalog,
            -200279,
            "Attempted to read samples that are no longer available",
        );
        let err = session.read_analog(2).unwrap_err();
        assert!(err.is_hardware());
        assert_eq!(session.status(), Status::Unknown);
        assert_eq!(provider.live_tasks(), 0);
    }
}
