//! In-memory loopback provider.
//!
//! [`SimulatedProvider`] behaves like a driver with a fixed set of simulated
//! devices. It keeps just enough state to make sessions observable in tests:
//!
//! - Loopback devices feed analog output channel `n` back into analog input
//!   channel `n` of the same device.
//! - Counter reads return the channel's initial angle plus any injected angle.
//! - Every call is counted per [`Operation`], and per-task channels, timing and
//!   run state can be inspected after the provider was handed to a session.
//! - [`SimulatedProvider::fail_on`] arms a one-shot provider error for the next
//!   call of an operation.
//!
//! The provider is a cheap handle: clones share the same simulated hardware.
//!
//! # Example
//!
//! ```
//! use quick_daq::io_mode::IoMode;
//! use quick_daq::provider::{SimulatedDevice, SimulatedProvider};
//!
//! let provider = SimulatedProvider::new(vec![
//!     SimulatedDevice::new("PXI1Slot2")
//!         .channels(IoMode::AnalogIn, 4)
//!         .channels(IoMode::AnalogOut, 4)
//!         .loopback(true),
//! ]);
//! assert_eq!(provider.device_count(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::SimulatedDeviceConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::io_mode::IoMode;
use crate::provider::{ChannelSpec, DeviceAttributes, HardwareProvider, SampleClock, TaskHandle};

const ERR_INVALID_DEVICE: i32 = -200220;
const ERR_INVALID_TASK: i32 = -200088;
const ERR_NO_SUCH_CHANNEL: i32 = -200170;
const ERR_TASK_NOT_RUNNING: i32 = -200479;

/// Provider entry points, used for call counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `device_names`
    DeviceNames,
    /// `device_attributes`
    DeviceAttributes,
    /// `physical_channels`
    PhysicalChannels,
    /// `device_terminals`
    DeviceTerminals,
    /// `create_task`
    CreateTask,
    /// `create_channel`
    CreateChannel,
    /// `configure_sample_clock`
    ConfigureSampleClock,
    /// `set_late_errors_to_warnings`
    SetLateErrorsToWarnings,
    /// `start_task`
    StartTask,
    /// `stop_task`
    StopTask,
    /// `clear_task`
    ClearTask,
    /// `read_analog_f64`
    ReadAnalog,
    /// `write_analog_f64`
    WriteAnalog,
    /// `write_digital_u32`
    WriteDigital,
    /// `read_counter_f64`
    ReadCounter,
    /// `wait_for_next_sample_clock`
    WaitForNextSampleClock,
}

/// Description of one simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    name: String,
    product_type: String,
    serial: u64,
    channel_counts: [u32; IoMode::COUNT],
    loopback: bool,
}

impl SimulatedDevice {
    /// A device with no channels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            product_type: "PXIe-6363".to_string(),
            serial: 0,
            channel_counts: [0; IoMode::COUNT],
            loopback: false,
        }
    }

    /// Build from a `[[simulation.devices]]` entry.
    pub fn from_config(prefix: &str, config: &SimulatedDeviceConfig) -> Self {
        Self::new(format!("{}{}", prefix, config.id))
            .product_type(config.product_type.clone())
            .serial(config.serial)
            .channels(IoMode::AnalogIn, config.analog_in)
            .channels(IoMode::AnalogOut, config.analog_out)
            .channels(IoMode::DigitalIn, config.digital_in)
            .channels(IoMode::DigitalOut, config.digital_out)
            .channels(IoMode::CounterAngleIn, config.counter_in)
            .channels(IoMode::CounterTickOut, config.counter_out)
            .loopback(config.loopback)
    }

    /// Set the product type.
    pub fn product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = product_type.into();
        self
    }

    /// Set the serial number.
    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// Set the number of physical channels of one class.
    pub fn channels(mut self, io_mode: IoMode, count: u32) -> Self {
        self.channel_counts[io_mode.index()] = count;
        self
    }

    /// Wire analog outputs back into analog inputs.
    pub fn loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn physical_channels(&self, io_mode: IoMode) -> Vec<String> {
        let mut channels: Vec<String> = (0..self.channel_counts[io_mode.index()])
            .map(|n| format!("{}/{}{}", self.name, io_mode.channel_kind(), n))
            .collect();
        // Frequency scalers show up among counter outputs on real hardware.
        if io_mode == IoMode::CounterTickOut && !channels.is_empty() {
            channels.push(format!("{}/freqout", self.name));
        }
        channels
    }

    fn terminals(&self) -> Vec<String> {
        let mut terminals: Vec<String> = (0..16).map(|n| format!("/{}/PFI{}", self.name, n)).collect();
        for io_mode in IoMode::ALL {
            if self.channel_counts[io_mode.index()] > 0 {
                terminals.push(format!(
                    "/{}/{}/SampleClock",
                    self.name,
                    io_mode.clock_subsystem()
                ));
            }
        }
        terminals
    }
}

#[derive(Debug, Default)]
struct SimTask {
    channels: Vec<ChannelSpec>,
    clock: Option<SampleClock>,
    late_errors_to_warnings: bool,
    running: bool,
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<SimulatedDevice>,
    tasks: HashMap<TaskHandle, SimTask>,
    next_handle: u64,
    analog_out: HashMap<String, f64>,
    analog_in: HashMap<String, f64>,
    digital_out: HashMap<String, u32>,
    counter_angle: HashMap<String, f64>,
    faults: HashMap<Operation, ProviderError>,
    calls: HashMap<Operation, usize>,
    ticks: u64,
    late: bool,
}

impl SimState {
    fn enter(&mut self, op: Operation) -> ProviderResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        trace!(?op, "simulated provider call");
        match self.faults.remove(&op) {
            Some(err) => {
                debug!(?op, code = err.code, "Injected provider fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn device(&self, name: &str) -> ProviderResult<&SimulatedDevice> {
        self.devices
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| {
                ProviderError::new(
                    ERR_INVALID_DEVICE,
                    format!("Device identifier is invalid. Device Specified: {name}"),
                )
            })
    }

    fn task(&self, handle: TaskHandle) -> ProviderResult<&SimTask> {
        self.tasks.get(&handle).ok_or_else(|| invalid_task(handle))
    }

    fn task_mut(&mut self, handle: TaskHandle) -> ProviderResult<&mut SimTask> {
        self.tasks.get_mut(&handle).ok_or_else(|| invalid_task(handle))
    }

    fn analog_in_value(&self, physical: &str) -> f64 {
        if let Some(value) = self.analog_in.get(physical) {
            return *value;
        }
        let Some((device, channel)) = physical.split_once('/') else {
            return 0.0;
        };
        let loopback = self
            .devices
            .iter()
            .any(|d| d.name == device && d.loopback);
        match channel.strip_prefix("ai") {
            Some(n) if loopback => self
                .analog_out
                .get(&format!("{device}/ao{n}"))
                .copied()
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

fn invalid_task(handle: TaskHandle) -> ProviderError {
    ProviderError::new(
        ERR_INVALID_TASK,
        format!("Task specified is invalid or does not exist. Handle: {}", handle.0),
    )
}

fn io_mode_of(channel: &ChannelSpec) -> IoMode {
    match channel {
        ChannelSpec::AnalogInVoltage { .. } => IoMode::AnalogIn,
        ChannelSpec::AnalogOutVoltage { .. } => IoMode::AnalogOut,
        ChannelSpec::DigitalOut { .. } => IoMode::DigitalOut,
        ChannelSpec::CounterAngleEncoder { .. } => IoMode::CounterAngleIn,
    }
}

/// Loopback-capable in-memory provider. See the module docs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedProvider {
    /// Provider exposing the given devices.
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices,
                next_handle: 1,
                ..SimState::default()
            })),
        }
    }

    /// Provider built from the `simulation.devices` section of a config.
    pub fn from_config(config: &crate::config::DaqConfig) -> Self {
        Self::new(
            config
                .simulation
                .devices
                .iter()
                .map(|d| SimulatedDevice::from_config(&config.device_prefix, d))
                .collect(),
        )
    }

    /// Number of simulated devices.
    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }

    /// Add a device after construction (hot-plug).
    pub fn attach(&self, device: SimulatedDevice) {
        self.state.lock().devices.push(device);
    }

    /// Remove a device by name (unplug).
    pub fn detach(&self, name: &str) {
        self.state.lock().devices.retain(|d| d.name != name);
    }

    /// Make the next call of `op` fail with the given code and message.
    pub fn fail_on(&self, op: Operation, code: i32, message: impl Into<String>) {
        self.state
            .lock()
            .faults
            .insert(op, ProviderError::new(code, message));
    }

    /// Number of times `op` was called.
    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of tasks created and not yet cleared.
    pub fn live_tasks(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Physical channel names of a task, in creation order.
    pub fn task_channels(&self, task: TaskHandle) -> Vec<String> {
        self.state
            .lock()
            .tasks
            .get(&task)
            .map(|t| t.channels.iter().map(|c| c.physical().to_string()).collect())
            .unwrap_or_default()
    }

    /// Sample clock configured on a task, if any.
    pub fn task_clock(&self, task: TaskHandle) -> Option<SampleClock> {
        self.state.lock().tasks.get(&task).and_then(|t| t.clock.clone())
    }

    /// Whether late-sample errors are reported as warnings on a task.
    pub fn late_errors_to_warnings(&self, task: TaskHandle) -> bool {
        self.state
            .lock()
            .tasks
            .get(&task)
            .is_some_and(|t| t.late_errors_to_warnings)
    }

    /// Whether a task is running.
    pub fn is_running(&self, task: TaskHandle) -> bool {
        self.state.lock().tasks.get(&task).is_some_and(|t| t.running)
    }

    /// Last value written to an analog output channel.
    pub fn analog_out_value(&self, physical: &str) -> Option<f64> {
        self.state.lock().analog_out.get(physical).copied()
    }

    /// Force the value read from an analog input channel.
    pub fn set_analog_in(&self, physical: impl Into<String>, value: f64) {
        self.state.lock().analog_in.insert(physical.into(), value);
    }

    /// Last word written to a digital output port.
    pub fn digital_out_value(&self, physical: &str) -> Option<u32> {
        self.state.lock().digital_out.get(physical).copied()
    }

    /// Rotate an encoder: add `angle` to what the counter reports.
    pub fn set_counter_angle(&self, physical: impl Into<String>, angle: f64) {
        self.state.lock().counter_angle.insert(physical.into(), angle);
    }

    /// Number of sample clock ticks waited for.
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Report subsequent samples as late.
    pub fn set_late(&self, late: bool) {
        self.state.lock().late = late;
    }
}

impl HardwareProvider for SimulatedProvider {
    fn device_names(&mut self) -> ProviderResult<Vec<String>> {
        let mut state = self.state.lock();
        state.enter(Operation::DeviceNames)?;
        Ok(state.devices.iter().map(|d| d.name.clone()).collect())
    }

    fn device_attributes(&mut self, device: &str) -> ProviderResult<DeviceAttributes> {
        let mut state = self.state.lock();
        state.enter(Operation::DeviceAttributes)?;
        let device = state.device(device)?;
        Ok(DeviceAttributes {
            product_type: device.product_type.clone(),
            serial: device.serial,
            is_simulated: true,
        })
    }

    fn physical_channels(&mut self, device: &str, io_mode: IoMode) -> ProviderResult<Vec<String>> {
        let mut state = self.state.lock();
        state.enter(Operation::PhysicalChannels)?;
        Ok(state.device(device)?.physical_channels(io_mode))
    }

    fn device_terminals(&mut self, device: &str) -> ProviderResult<Vec<String>> {
        let mut state = self.state.lock();
        state.enter(Operation::DeviceTerminals)?;
        Ok(state.device(device)?.terminals())
    }

    fn create_task(&mut self) -> ProviderResult<TaskHandle> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateTask)?;
        let handle = TaskHandle(state.next_handle);
        state.next_handle += 1;
        state.tasks.insert(handle, SimTask::default());
        Ok(handle)
    }

    fn create_channel(&mut self, task: TaskHandle, channel: &ChannelSpec) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateChannel)?;
        let physical = channel.physical();
        let device_name = physical.split('/').next().unwrap_or_default();
        let exists = state
            .device(device_name)?
            .physical_channels(io_mode_of(channel))
            .iter()
            .any(|c| c == physical);
        if !exists {
            return Err(ProviderError::new(
                ERR_NO_SUCH_CHANNEL,
                format!("Physical channel specified does not exist on this device: {physical}"),
            ));
        }
        state.task_mut(task)?.channels.push(channel.clone());
        Ok(())
    }

    fn configure_sample_clock(
        &mut self,
        task: TaskHandle,
        clock: &SampleClock,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::ConfigureSampleClock)?;
        state.task_mut(task)?.clock = Some(clock.clone());
        Ok(())
    }

    fn set_late_errors_to_warnings(
        &mut self,
        task: TaskHandle,
        enabled: bool,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::SetLateErrorsToWarnings)?;
        state.task_mut(task)?.late_errors_to_warnings = enabled;
        Ok(())
    }

    fn start_task(&mut self, task: TaskHandle) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::StartTask)?;
        state.task_mut(task)?.running = true;
        Ok(())
    }

    fn stop_task(&mut self, task: TaskHandle) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::StopTask)?;
        state.task_mut(task)?.running = false;
        Ok(())
    }

    fn clear_task(&mut self, task: TaskHandle) -> ProviderResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::ClearTask)?;
        state.tasks.remove(&task).map(|_| ()).ok_or_else(|| invalid_task(task))
    }

    fn read_analog_f64(
        &mut self,
        task: TaskHandle,
        _samples_per_channel: i32,
        _timeout: Duration,
        data: &mut [f64],
    ) -> ProviderResult<usize> {
        let mut state = self.state.lock();
        state.enter(Operation::ReadAnalog)?;
        let physical: Vec<String> = state
            .task(task)?
            .channels
            .iter()
            .map(|c| c.physical().to_string())
            .collect();
        let n = physical.len().min(data.len());
        for (slot, name) in data.iter_mut().zip(&physical) {
            *slot = state.analog_in_value(name);
        }
        Ok(n)
    }

    fn write_analog_f64(
        &mut self,
        task: TaskHandle,
        _samples_per_channel: i32,
        _auto_start: bool,
        _timeout: Duration,
        data: &[f64],
    ) -> ProviderResult<usize> {
        let mut state = self.state.lock();
        state.enter(Operation::WriteAnalog)?;
        let physical: Vec<String> = state
            .task(task)?
            .channels
            .iter()
            .map(|c| c.physical().to_string())
            .collect();
        let n = physical.len().min(data.len());
        for (name, value) in physical.into_iter().zip(data) {
            state.analog_out.insert(name, *value);
        }
        Ok(n)
    }

    fn write_digital_u32(
        &mut self,
        task: TaskHandle,
        _samples_per_channel: i32,
        _auto_start: bool,
        _timeout: Duration,
        data: &[u32],
    ) -> ProviderResult<usize> {
        let mut state = self.state.lock();
        state.enter(Operation::WriteDigital)?;
        let physical: Vec<String> = state
            .task(task)?
            .channels
            .iter()
            .map(|c| c.physical().to_string())
            .collect();
        let n = physical.len().min(data.len());
        for (name, word) in physical.into_iter().zip(data) {
            state.digital_out.insert(name, *word);
        }
        Ok(n)
    }

    fn read_counter_f64(
        &mut self,
        task: TaskHandle,
        _samples_per_channel: i32,
        _timeout: Duration,
        data: &mut [f64],
    ) -> ProviderResult<usize> {
        let mut state = self.state.lock();
        state.enter(Operation::ReadCounter)?;
        let angles: Vec<f64> = state
            .task(task)?
            .channels
            .iter()
            .map(|c| match c {
                ChannelSpec::CounterAngleEncoder {
                    physical,
                    initial_angle,
                    ..
                } => initial_angle + state.counter_angle.get(physical).copied().unwrap_or(0.0),
                _ => 0.0,
            })
            .collect();
        let n = angles.len().min(data.len());
        data[..n].copy_from_slice(&angles[..n]);
        Ok(n)
    }

    fn wait_for_next_sample_clock(
        &mut self,
        task: TaskHandle,
        _timeout: Duration,
    ) -> ProviderResult<bool> {
        let mut state = self.state.lock();
        state.enter(Operation::WaitForNextSampleClock)?;
        if !state.task(task)?.running {
            return Err(ProviderError::new(
                ERR_TASK_NOT_RUNNING,
                "Specified operation cannot be performed when the task is not running.",
            ));
        }
        state.ticks += 1;
        Ok(state.late)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> SimulatedProvider {
        SimulatedProvider::new(vec![SimulatedDevice::new("Dev1")
            .channels(IoMode::AnalogIn, 2)
            .channels(IoMode::AnalogOut, 2)
            .channels(IoMode::CounterTickOut, 2)
            .loopback(true)])
    }

    #[test]
    fn test_counter_out_lists_frequency_scaler() {
        let mut provider = rig();
        let channels = provider
            .physical_channels("Dev1", IoMode::CounterTickOut)
            .unwrap();
        assert_eq!(channels, vec!["Dev1/ctr0", "Dev1/ctr1", "Dev1/freqout"]);
    }

    #[test]
    fn test_unknown_device_is_provider_error() {
        let mut provider = rig();
        let err = provider.device_attributes("Dev9").unwrap_err();
        assert_eq!(err.code, ERR_INVALID_DEVICE);
    }

    #[test]
    fn test_create_channel_rejects_missing_channel() {
        let mut provider = rig();
        let task = provider.create_task().unwrap();
        let err = provider
            .create_channel(
                task,
                &ChannelSpec::AnalogOutVoltage {
                    physical: "Dev1/ao7".to_string(),
                    min: -10.0,
                    max: 10.0,
                },
            )
            .unwrap_err();
        assert_eq!(err.code, ERR_NO_SUCH_CHANNEL);
    }

    #[test]
    fn test_injected_fault_is_one_shot() {
        let mut provider = rig();
        provider.fail_on(Operation::CreateTask, -50103, "The specified resource is reserved.");
        assert_eq!(provider.create_task().unwrap_err().code, -50103);
        assert!(provider.create_task().is_ok());
        assert_eq!(provider.calls(Operation::CreateTask), 2);
    }
}
