//! Device/channel catalog.
//!
//! Enumeration asks the provider for every device, keeps the ones whose name
//! is `<prefix><id>` and records, per I/O class, how many physical channels
//! each device has. Devices are stored densely by numeric id so that
//! `catalog.device(id)` is an index, with `None` for ids the provider did not
//! report.
//!
//! Each device owns one [`Pin`] descriptor per physical channel and class.
//! Pins start unbound; binding fills in the owning task and buffer offset.

use std::fmt;

use tracing::{debug, warn};

use crate::error::ProviderResult;
use crate::io_mode::IoMode;
use crate::provider::HardwareProvider;
use crate::task::TaskId;

/// Largest device id kept in the dense catalog.
pub const MAX_DEVICE_ID: u32 = 255;

/// Binding record of one physical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    io_mode: IoMode,
    binding: Option<(TaskId, usize)>,
}

impl Pin {
    fn unbound(io_mode: IoMode) -> Self {
        Self {
            io_mode,
            binding: None,
        }
    }

    /// I/O class this descriptor belongs to.
    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    /// Whether the pin has been bound to a task.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Task the pin is bound to.
    pub fn task(&self) -> Option<TaskId> {
        self.binding.map(|(task, _)| task)
    }

    /// Offset of the pin's sample in its task buffer.
    pub fn offset(&self) -> Option<usize> {
        self.binding.map(|(_, offset)| offset)
    }

    pub(crate) fn bind(&mut self, task: TaskId, offset: usize) {
        self.binding = Some((task, offset));
    }
}

/// One enumerated acquisition device.
#[derive(Debug, Clone)]
pub struct Device {
    id: u32,
    name: String,
    product_type: String,
    serial: u64,
    is_simulated: bool,
    pins: [Vec<Pin>; IoMode::COUNT],
}

impl Device {
    /// Numeric id (suffix after the device prefix).
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Device name as reported by the provider.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Product type.
    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    /// Serial number.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Whether the driver simulates this device.
    pub fn is_simulated(&self) -> bool {
        self.is_simulated
    }

    /// Number of physical channels of a class.
    pub fn channel_count(&self, io_mode: IoMode) -> u32 {
        u32::try_from(self.pins[io_mode.index()].len()).unwrap_or(u32::MAX)
    }

    /// Pin descriptors of a class.
    pub fn pins(&self, io_mode: IoMode) -> &[Pin] {
        &self.pins[io_mode.index()]
    }

    /// Pin descriptor, if `pin` is in range.
    pub fn pin(&self, io_mode: IoMode, pin: u32) -> Option<&Pin> {
        self.pins[io_mode.index()].get(pin as usize)
    }

    pub(crate) fn pin_mut(&mut self, io_mode: IoMode, pin: u32) -> Option<&mut Pin> {
        self.pins[io_mode.index()].get_mut(pin as usize)
    }

    /// Physical channel name of a pin, e.g. `PXI1Slot2/ai3` or `PXI1Slot2/port0`.
    pub fn physical_channel(&self, io_mode: IoMode, pin: u32) -> String {
        format!("{}/{}{}", self.name, io_mode.channel_kind(), pin)
    }

    /// Number of bound pins of a class.
    pub fn bound_count(&self, io_mode: IoMode) -> usize {
        self.pins(io_mode).iter().filter(|p| p.is_bound()).count()
    }
}

/// Enumerated devices, indexed by numeric id.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    prefix: String,
    devices: Vec<Option<Device>>,
}

impl DeviceCatalog {
    /// Query the provider for every device named `<prefix><id>`.
    ///
    /// Devices whose name does not carry the prefix followed by a number are
    /// skipped. Zero matching devices yields an empty catalog, not an error.
    pub fn enumerate<P: HardwareProvider + ?Sized>(
        provider: &mut P,
        prefix: &str,
    ) -> ProviderResult<Self> {
        let mut found = Vec::new();
        for (id, name) in matching_devices(provider.device_names()?, prefix) {

            let attributes = provider.device_attributes(&name)?;
            let mut pins: [Vec<Pin>; IoMode::COUNT] = Default::default();
            for io_mode in IoMode::ALL {
                let count = provider
                    .physical_channels(&name, io_mode)?
                    .iter()
                    .filter(|channel| !channel.contains("freqout"))
                    .count();
                pins[io_mode.index()] = vec![Pin::unbound(io_mode); count];
            }

            debug!(device = %name, id, product_type = %attributes.product_type, "Enumerated device");
            found.push(Device {
                id,
                name,
                product_type: attributes.product_type,
                serial: attributes.serial,
                is_simulated: attributes.is_simulated,
                pins,
            });
        }

        let slots = found.iter().map(|d| d.id as usize + 1).max().unwrap_or(0);
        let mut devices: Vec<Option<Device>> = vec![None; slots];
        for device in found {
            let slot = device.id as usize;
            devices[slot] = Some(device);
        }

        Ok(Self {
            prefix: prefix.to_string(),
            devices,
        })
    }

    /// Prefix used for enumeration.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of valid devices.
    pub fn len(&self) -> usize {
        self.devices.iter().flatten().count()
    }

    /// Whether no device was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest device id plus one.
    pub fn id_slots(&self) -> usize {
        self.devices.len()
    }

    /// Device by numeric id.
    pub fn device(&self, id: u32) -> Option<&Device> {
        self.devices.get(id as usize).and_then(Option::as_ref)
    }

    pub(crate) fn device_mut(&mut self, id: u32) -> Option<&mut Device> {
        self.devices.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Valid devices in id order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().flatten()
    }

    /// Device names in id order.
    pub fn names(&self) -> Vec<String> {
        self.devices().map(|d| d.name.clone()).collect()
    }

    /// Total bound pins of a class across all devices.
    pub fn bound_count(&self, io_mode: IoMode) -> usize {
        self.devices().map(|d| d.bound_count(io_mode)).sum()
    }
}

/// Ids and names of the devices a catalog keeps, in provider order.
///
/// A name must be `<prefix><id>` with `id <= MAX_DEVICE_ID`. When two names
/// parse to the same id the first one wins.
pub fn matching_devices(
    names: impl IntoIterator<Item = String>,
    prefix: &str,
) -> Vec<(u32, String)> {
    let mut kept: Vec<(u32, String)> = Vec::new();
    for name in names {
        let Some(id) = name
            .strip_prefix(prefix)
            .and_then(|suffix| suffix.parse::<u32>().ok())
        else {
            debug!(device = %name, prefix, "Skipping device without prefix");
            continue;
        };
        if id > MAX_DEVICE_ID {
            warn!(device = %name, id, max = MAX_DEVICE_ID, "Skipping device with out-of-range id");
            continue;
        }
        if kept.iter().any(|(seen, _)| *seen == id) {
            warn!(device = %name, id, "Duplicate device id, keeping the first");
            continue;
        }
        kept.push((id, name));
    }
    kept
}

const RULE: &str = "*********************************************************************************************************************";

impl fmt::Display for DeviceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** DEVICE LIST {}", &RULE[16..])?;
        write!(
            f,
            "Device Number ||    Device Name || Device type || Device Serial # || Sim? || Pins:"
        )?;
        for (i, io_mode) in IoMode::ALL.iter().enumerate() {
            let sep = if i == 0 { " " } else { " | " };
            write!(f, "{sep}{:<3}", io_mode.short_name())?;
        }
        writeln!(f)?;
        writeln!(f, "{RULE}")?;
        for device in self.devices() {
            write!(
                f,
                "{:>13} || {:>14} || {:>11} || {:>15} || {} ||       ",
                device.id,
                device.name,
                device.product_type,
                device.serial,
                if device.is_simulated { "Yeah" } else { "Nope" }
            )?;
            let counts: Vec<String> = IoMode::ALL
                .iter()
                .map(|m| format!("{:>3}", device.channel_count(*m)))
                .collect();
            writeln!(f, "{}", counts.join(" | "))?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "Number of device IDs: {}", self.id_slots())?;
        writeln!(f, "Number of valid devices: {}", self.len())
    }
}
