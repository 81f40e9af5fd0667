//! Audio device discovery and selection
//!
//! Devices are matched by case-insensitive substring against a preferred
//! list (USB chipset names and the like). The first enumerated device that
//! matches any entry wins; otherwise the host default is used.

use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::{Error, Result};

/// Which side of the device to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

impl DeviceDirection {
    const fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Outcome of matching device names against the preferred list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Index into the enumerated device list
    Preferred(usize),
    /// Host default device
    Default,
}

/// Pick a device from enumerated names
///
/// Returns `None` only when nothing matches and no default exists.
#[must_use]
pub fn choose_device<S: AsRef<str>>(
    names: &[S],
    preferred: &[String],
    has_default: bool,
) -> Option<DeviceSelection> {
    let wanted: Vec<String> = preferred
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    let matched = names.iter().position(|name| {
        let name = name.as_ref().to_lowercase();
        wanted.iter().any(|w| name.contains(w))
    });

    match matched {
        Some(index) => Some(DeviceSelection::Preferred(index)),
        None if has_default => Some(DeviceSelection::Default),
        None => None,
    }
}

/// Open a device on the default host
///
/// # Errors
///
/// Returns `DeviceNotFound` if no preferred device matches and the host has
/// no default device for `direction`
pub fn select_device(direction: DeviceDirection, preferred: &[String]) -> Result<(Device, String)> {
    let host = cpal::default_host();

    let devices: Vec<Device> = match direction {
        DeviceDirection::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        DeviceDirection::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    }
    .map_err(|e| Error::Audio(e.to_string()))?;

    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();

    let default = match direction {
        DeviceDirection::Input => host.default_input_device(),
        DeviceDirection::Output => host.default_output_device(),
    };

    let selection = choose_device(&names, preferred, default.is_some()).ok_or_else(|| {
        Error::DeviceNotFound(format!(
            "no {} device matching {preferred:?} and no default",
            direction.label()
        ))
    })?;

    let (device, name) = match (selection, default) {
        (DeviceSelection::Preferred(index), _) => {
            let name = names[index].clone();
            let device = devices
                .into_iter()
                .nth(index)
                .ok_or_else(|| Error::DeviceNotFound(name.clone()))?;
            (device, name)
        }
        (DeviceSelection::Default, Some(device)) => {
            let name = device.name().unwrap_or_else(|_| "default".to_string());
            if !preferred.is_empty() {
                tracing::info!(
                    direction = direction.label(),
                    preferred = ?preferred,
                    "no preferred device found, using default"
                );
            }
            (device, name)
        }
        (DeviceSelection::Default, None) => {
            return Err(Error::DeviceNotFound(format!(
                "no default {} device",
                direction.label()
            )));
        }
    };

    tracing::debug!(direction = direction.label(), device = %name, "selected audio device");
    Ok((device, name))
}

/// Summary of an audio device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: Option<u32>,
}

/// Enumerate all devices on the default host
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let devices = host.devices().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let max_input_channels = device
                .supported_input_configs()
                .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            let max_output_channels = device
                .supported_output_configs()
                .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            let default_sample_rate = device
                .default_input_config()
                .or_else(|_| device.default_output_config())
                .map(|c| c.sample_rate().0)
                .ok();

            DeviceInfo {
                index,
                name: device.name().unwrap_or_else(|_| "unknown".to_string()),
                max_input_channels,
                max_output_channels,
                default_sample_rate,
            }
        })
        .collect())
}
